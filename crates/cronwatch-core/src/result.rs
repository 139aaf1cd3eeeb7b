// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job result types for cron monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::JobId;

/// Outcome of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
	Success,
	Failure,
}

impl fmt::Display for ResultStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Success => write!(f, "success"),
			Self::Failure => write!(f, "failure"),
		}
	}
}

impl FromStr for ResultStatus {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"success" => Ok(Self::Success),
			"failure" => Ok(Self::Failure),
			_ => Err(CoreError::UnknownResultStatus(s.to_string())),
		}
	}
}

/// A single recorded job execution. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
	pub id: i64,
	pub job_id: JobId,
	pub status: ResultStatus,
	pub duration_ms: Option<u64>,
	/// Truncated stdout/stderr (max 10KB)
	pub output: Option<String>,
	pub reported_at: DateTime<Utc>,
}

/// A result submission before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJobResult {
	pub status: ResultStatus,
	#[serde(default)]
	pub duration_ms: Option<u64>,
	#[serde(default)]
	pub output: Option<String>,
	/// Defaults to the time the submission is recorded.
	#[serde(default)]
	pub reported_at: Option<DateTime<Utc>>,
}

impl NewJobResult {
	pub fn new(status: ResultStatus) -> Self {
		Self {
			status,
			duration_ms: None,
			output: None,
			reported_at: None,
		}
	}

	/// Output clipped to [`MAX_OUTPUT_BYTES`].
	pub fn truncated_output(&self) -> Option<String> {
		self.output.as_deref().map(truncate_output)
	}
}

/// Maximum output size in bytes (10KB).
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024;

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Truncate output to the maximum size on a UTF-8 boundary.
pub fn truncate_output(output: &str) -> String {
	if output.len() <= MAX_OUTPUT_BYTES {
		return output.to_string();
	}
	let mut end = MAX_OUTPUT_BYTES;
	while !output.is_char_boundary(end) {
		end -= 1;
	}
	format!("{}{}", &output[..end], TRUNCATION_MARKER)
}
