// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job types for cron monitoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Label names owned by the exporter; user labels may not shadow them.
pub const RESERVED_LABELS: &[&str] = &["job_name", "host", "status"];

/// Default silence threshold for new jobs (one hour).
pub const DEFAULT_FAILURE_THRESHOLD_SECS: i64 = 3600;

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for JobId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(Self(s.parse()?))
	}
}

/// Operator-controlled lifecycle of a job.
///
/// `Maintenance` and `Paused` suppress health evaluation. Any other string is
/// kept verbatim and evaluated like `Active`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobLifecycle {
	#[default]
	Active,
	Maintenance,
	Paused,
	Other(String),
}

impl JobLifecycle {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Active => "active",
			Self::Maintenance => "maintenance",
			Self::Paused => "paused",
			Self::Other(s) => s,
		}
	}
}

impl fmt::Display for JobLifecycle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl From<String> for JobLifecycle {
	fn from(s: String) -> Self {
		match s.as_str() {
			"active" => Self::Active,
			"maintenance" => Self::Maintenance,
			"paused" => Self::Paused,
			_ => Self::Other(s),
		}
	}
}

impl From<&str> for JobLifecycle {
	fn from(s: &str) -> Self {
		Self::from(s.to_string())
	}
}

impl From<JobLifecycle> for String {
	fn from(status: JobLifecycle) -> Self {
		match status {
			JobLifecycle::Other(s) => s,
			other => other.as_str().to_string(),
		}
	}
}

/// A monitored external scheduled task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
	pub id: JobId,
	pub name: String,
	pub host: String,

	/// Opaque key used by ping-style reporters instead of the numeric id.
	pub key: String,

	/// User-defined labels, exported verbatim on every status line.
	pub labels: BTreeMap<String, String>,

	pub status: JobLifecycle,

	/// Seconds of silence tolerated before the job counts as overdue.
	/// A value of zero or below is always exceeded.
	pub automatic_failure_threshold: i64,

	pub last_reported_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Job {
	/// Generate a unique report key (UUIDv4).
	pub fn generate_key() -> String {
		Uuid::new_v4().to_string()
	}

	/// Apply a validated partial update, bumping `updated_at`.
	pub fn apply_update(&mut self, update: &JobUpdate, now: DateTime<Utc>) {
		if let Some(name) = &update.name {
			self.name = name.trim().to_string();
		}
		if let Some(host) = &update.host {
			self.host = host.trim().to_string();
		}
		if let Some(labels) = &update.labels {
			self.labels = labels.clone();
		}
		if let Some(status) = &update.status {
			self.status = status.clone();
		}
		if let Some(threshold) = update.automatic_failure_threshold {
			self.automatic_failure_threshold = threshold;
		}
		self.updated_at = now;
	}
}

/// Check that a label name is usable as a Prometheus label.
pub fn validate_label_name(name: &str) -> Result<()> {
	let mut chars = name.chars();
	let valid = match chars.next() {
		Some(c) if c.is_ascii_alphabetic() || c == '_' => {
			chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
		}
		_ => false,
	};
	if !valid || name.starts_with("__") {
		return Err(CoreError::InvalidLabelName(name.to_string()));
	}
	if RESERVED_LABELS.contains(&name) {
		return Err(CoreError::ReservedLabelName(name.to_string()));
	}
	Ok(())
}

fn validate_labels(labels: &BTreeMap<String, String>) -> Result<()> {
	labels.keys().try_for_each(|name| validate_label_name(name))
}

fn default_threshold() -> i64 {
	DEFAULT_FAILURE_THRESHOLD_SECS
}

/// Request to register a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
	pub name: String,
	pub host: String,
	#[serde(default)]
	pub key: Option<String>,
	#[serde(default)]
	pub labels: BTreeMap<String, String>,
	#[serde(default)]
	pub status: JobLifecycle,
	#[serde(default = "default_threshold")]
	pub automatic_failure_threshold: i64,
}

impl NewJob {
	pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			host: host.into(),
			key: None,
			labels: BTreeMap::new(),
			status: JobLifecycle::Active,
			automatic_failure_threshold: DEFAULT_FAILURE_THRESHOLD_SECS,
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.name.trim().is_empty() {
			return Err(CoreError::EmptyName);
		}
		if self.host.trim().is_empty() {
			return Err(CoreError::EmptyHost);
		}
		if self.status.as_str().is_empty() {
			return Err(CoreError::EmptyStatus);
		}
		validate_labels(&self.labels)
	}
}

/// Partial update of a job; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
	pub name: Option<String>,
	pub host: Option<String>,
	pub labels: Option<BTreeMap<String, String>>,
	pub status: Option<JobLifecycle>,
	pub automatic_failure_threshold: Option<i64>,
}

impl JobUpdate {
	pub fn validate(&self) -> Result<()> {
		if matches!(&self.name, Some(n) if n.trim().is_empty()) {
			return Err(CoreError::EmptyName);
		}
		if matches!(&self.host, Some(h) if h.trim().is_empty()) {
			return Err(CoreError::EmptyHost);
		}
		if matches!(&self.status, Some(s) if s.as_str().is_empty()) {
			return Err(CoreError::EmptyStatus);
		}
		match &self.labels {
			Some(labels) => validate_labels(labels),
			None => Ok(()),
		}
	}
}

/// Selection criteria for listing jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
	/// Every pair must be present on the job with the same value.
	pub labels: BTreeMap<String, String>,
	/// Case-insensitive substring of name or host.
	pub search: Option<String>,
}

impl JobFilter {
	pub fn matches(&self, job: &Job) -> bool {
		let labels_match = self
			.labels
			.iter()
			.all(|(k, v)| job.labels.get(k) == Some(v));
		if !labels_match {
			return false;
		}
		match self.search.as_deref().map(str::trim) {
			Some(term) if !term.is_empty() => {
				let term = term.to_lowercase();
				job.name.to_lowercase().contains(&term) || job.host.to_lowercase().contains(&term)
			}
			_ => true,
		}
	}
}
