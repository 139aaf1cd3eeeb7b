// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background monitoring configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_DEADLINE_CHECK_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
	/// How often every job is re-evaluated against its deadline.
	pub deadline_check_interval_secs: u64,
}

impl MonitoringConfig {
	pub fn deadline_check_interval(&self) -> Duration {
		Duration::from_secs(self.deadline_check_interval_secs)
	}
}

impl Default for MonitoringConfig {
	fn default() -> Self {
		Self {
			deadline_check_interval_secs: DEFAULT_DEADLINE_CHECK_INTERVAL_SECS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfigLayer {
	#[serde(default)]
	pub deadline_check_interval_secs: Option<u64>,
}

impl MonitoringConfigLayer {
	pub fn merge(&mut self, other: MonitoringConfigLayer) {
		if other.deadline_check_interval_secs.is_some() {
			self.deadline_check_interval_secs = other.deadline_check_interval_secs;
		}
	}

	pub fn finalize(self) -> MonitoringConfig {
		MonitoringConfig {
			deadline_check_interval_secs: self
				.deadline_check_interval_secs
				.unwrap_or(DEFAULT_DEADLINE_CHECK_INTERVAL_SECS),
		}
	}
}
