// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the cronwatch server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`CRONWATCH_*`)
//!
//! # Usage
//!
//! ```ignore
//! use cronwatch_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub events: EventsConfig,
	pub monitoring: MonitoringConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`CRONWATCH_*`)
/// 2. Config file (`/etc/cronwatch/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		events: layer.events.unwrap_or_default().finalize(),
		monitoring: layer.monitoring.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		events_enabled = config.events.enabled,
		max_subscribers = config.events.max_subscribers,
		deadline_check_interval_secs = config.monitoring.deadline_check_interval_secs,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
pub fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	config.events.validate()?;

	if config.monitoring.deadline_check_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"monitoring.deadline_check_interval_secs must be greater than 0".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_defaults_are_valid() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.database.url, "sqlite:cronwatch.db");
		assert_eq!(config.logging.format, LogFormat::Text);
		assert_eq!(config.monitoring.deadline_check_interval_secs, 60);
	}

	#[test]
	fn test_later_layers_win() {
		let defaults = DefaultsSource.load().unwrap();
		let file: ServerConfigLayer = toml::from_str(
			r#"
[http]
host = "127.0.0.1"
port = 9000

[events]
max_subscribers = 10
"#,
		)
		.unwrap();
		let env = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: None,
				port: Some(9500),
			}),
			..Default::default()
		};

		let mut merged = ServerConfigLayer::default();
		merged.merge(defaults);
		merged.merge(file);
		merged.merge(env);
		let config = finalize(merged).unwrap();

		assert_eq!(config.socket_addr(), "127.0.0.1:9500");
		assert_eq!(config.events.max_subscribers, 10);
	}

	#[test]
	fn test_invalid_events_rejected() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
[events]
heartbeat_interval_secs = 60
idle_timeout_secs = 30
"#,
		)
		.unwrap();
		let err = finalize(layer).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_zero_deadline_interval_rejected() {
		let config = ServerConfig {
			monitoring: MonitoringConfig {
				deadline_check_interval_secs: 0,
			},
			..Default::default()
		};
		assert!(validate_config(&config).is_err());
	}

	#[test]
	fn test_load_config_with_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"[database]\nurl = \"sqlite::memory:\"\n\n[logging]\nlevel = \"debug\""
		)
		.unwrap();

		let config = load_config_with_file(file.path()).unwrap();
		// Environment may override, but only when the variable is set.
		if std::env::var("CRONWATCH_DATABASE_URL").is_err() {
			assert_eq!(config.database.url, "sqlite::memory:");
		}
		if std::env::var("CRONWATCH_LOG_LEVEL").is_err() {
			assert_eq!(config.logging.level, "debug");
		}
	}
}
