// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial server configuration as produced by a single source.

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, EventsConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	MonitoringConfigLayer,
};

/// One source's view of the configuration. Absent sections leave lower
/// precedence values untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub events: Option<EventsConfigLayer>,
	#[serde(default)]
	pub monitoring: Option<MonitoringConfigLayer>,
}

fn merge_section<T, F>(base: &mut Option<T>, other: Option<T>, merge: F)
where
	F: FnOnce(&mut T, T),
{
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		(_, None) => {}
	}
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.events, other.events, EventsConfigLayer::merge);
		merge_section(&mut self.monitoring, other.monitoring, MonitoringConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn merge_keeps_base_fields_not_in_overlay() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
[http]
host = "127.0.0.1"
port = 9000
"#,
		)
		.unwrap();
		let overlay: ServerConfigLayer = toml::from_str(
			r#"
[http]
port = 9100

[events]
max_subscribers = 5
"#,
		)
		.unwrap();

		base.merge(overlay);

		let http = base.http.unwrap();
		assert_eq!(http.host.as_deref(), Some("127.0.0.1"));
		assert_eq!(http.port, Some(9100));
		assert_eq!(base.events.unwrap().max_subscribers, Some(5));
		assert!(base.database.is_none());
	}

	#[test]
	fn empty_document_is_empty_layer() {
		let layer: ServerConfigLayer = toml::from_str("").unwrap();
		assert!(layer.http.is_none());
		assert!(layer.events.is_none());
		assert!(layer.monitoring.is_none());
	}

	#[test]
	fn unknown_keys_inside_sections_are_rejected() {
		let result: Result<ServerConfigLayer, _> = toml::from_str(
			r#"
[events]
max_subscriber = 5
"#,
		);
		assert!(result.is_err());
	}
}
