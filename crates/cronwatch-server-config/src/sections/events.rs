// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Live event stream configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_MAX_SUBSCRIBERS: usize = 100;
const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 256;
const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 32;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
const DEFAULT_MAX_CONNECTION_SECS: u64 = 3600;

/// Event stream configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsConfig {
	pub enabled: bool,
	pub max_subscribers: usize,
	pub dispatch_queue_capacity: usize,
	pub subscriber_queue_capacity: usize,
	pub heartbeat_interval_secs: u64,
	pub idle_timeout_secs: u64,
	pub max_connection_secs: u64,
}

impl Default for EventsConfig {
	fn default() -> Self {
		EventsConfigLayer::default().finalize()
	}
}

impl EventsConfig {
	pub fn heartbeat_interval(&self) -> Duration {
		Duration::from_secs(self.heartbeat_interval_secs)
	}

	pub fn idle_timeout(&self) -> Duration {
		Duration::from_secs(self.idle_timeout_secs)
	}

	pub fn max_connection_duration(&self) -> Duration {
		Duration::from_secs(self.max_connection_secs)
	}

	/// Check the cross-field rules the broadcaster depends on.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.heartbeat_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"events.heartbeat_interval_secs must be greater than 0".to_string(),
			));
		}
		if self.idle_timeout_secs <= self.heartbeat_interval_secs {
			return Err(ConfigError::Validation(format!(
				"events.idle_timeout_secs ({}) must be greater than events.heartbeat_interval_secs ({})",
				self.idle_timeout_secs, self.heartbeat_interval_secs
			)));
		}
		if self.max_subscribers == 0 {
			return Err(ConfigError::Validation(
				"events.max_subscribers must be greater than 0".to_string(),
			));
		}
		if self.dispatch_queue_capacity == 0 || self.subscriber_queue_capacity == 0 {
			return Err(ConfigError::Validation(
				"event queue capacities must be greater than 0".to_string(),
			));
		}
		Ok(())
	}
}

/// Event stream configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub max_subscribers: Option<usize>,
	#[serde(default)]
	pub dispatch_queue_capacity: Option<usize>,
	#[serde(default)]
	pub subscriber_queue_capacity: Option<usize>,
	#[serde(default)]
	pub heartbeat_interval_secs: Option<u64>,
	#[serde(default)]
	pub idle_timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_connection_secs: Option<u64>,
}

impl EventsConfigLayer {
	pub fn merge(&mut self, other: EventsConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.max_subscribers.is_some() {
			self.max_subscribers = other.max_subscribers;
		}
		if other.dispatch_queue_capacity.is_some() {
			self.dispatch_queue_capacity = other.dispatch_queue_capacity;
		}
		if other.subscriber_queue_capacity.is_some() {
			self.subscriber_queue_capacity = other.subscriber_queue_capacity;
		}
		if other.heartbeat_interval_secs.is_some() {
			self.heartbeat_interval_secs = other.heartbeat_interval_secs;
		}
		if other.idle_timeout_secs.is_some() {
			self.idle_timeout_secs = other.idle_timeout_secs;
		}
		if other.max_connection_secs.is_some() {
			self.max_connection_secs = other.max_connection_secs;
		}
	}

	pub fn finalize(self) -> EventsConfig {
		EventsConfig {
			enabled: self.enabled.unwrap_or(true),
			max_subscribers: self.max_subscribers.unwrap_or(DEFAULT_MAX_SUBSCRIBERS),
			dispatch_queue_capacity: self
				.dispatch_queue_capacity
				.unwrap_or(DEFAULT_DISPATCH_QUEUE_CAPACITY),
			subscriber_queue_capacity: self
				.subscriber_queue_capacity
				.unwrap_or(DEFAULT_SUBSCRIBER_QUEUE_CAPACITY),
			heartbeat_interval_secs: self
				.heartbeat_interval_secs
				.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
			idle_timeout_secs: self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
			max_connection_secs: self.max_connection_secs.unwrap_or(DEFAULT_MAX_CONNECTION_SECS),
		}
	}
}
