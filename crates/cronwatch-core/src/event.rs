// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event types streamed to live dashboard clients.
//!
//! Each event goes over the wire as one server-sent-events frame:
//!
//! ```text
//! event: job-status-change
//! data: {"job_id":123,"name":"backup","host":"db1","status":"active",...}
//!
//! ```
//!
//! # Events
//!
//! - `connection` - Sent once on connect with the subscriber's session id
//! - `job-status-change` - A job's derived health (also used for the snapshot
//!   pushed right after `connection`)
//! - `job-created` / `job-updated` - Job configuration changed
//! - `job-deleted` - Job removed
//! - `heartbeat` - Keep-alive

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Job, JobHealth, JobId, JobLifecycle, StatusReason};

/// Identity of one live subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Stream event types.
///
/// Serialized as `{"event": <type>, "data": <payload>}`; the SSE layer writes
/// the type on the `event:` line and only the payload on the `data:` line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum StreamEvent {
	#[serde(rename = "job-status-change")]
	JobStatusChange(JobStatusData),

	#[serde(rename = "job-created")]
	JobCreated(JobSnapshotData),

	#[serde(rename = "job-updated")]
	JobUpdated(JobSnapshotData),

	#[serde(rename = "job-deleted")]
	JobDeleted(JobDeletedData),

	#[serde(rename = "heartbeat")]
	Heartbeat(HeartbeatData),

	#[serde(rename = "connection")]
	Connection(ConnectionData),
}

impl StreamEvent {
	/// Returns the event type name as written on the `event:` line.
	pub fn event_type(&self) -> &'static str {
		match self {
			StreamEvent::JobStatusChange(_) => "job-status-change",
			StreamEvent::JobCreated(_) => "job-created",
			StreamEvent::JobUpdated(_) => "job-updated",
			StreamEvent::JobDeleted(_) => "job-deleted",
			StreamEvent::Heartbeat(_) => "heartbeat",
			StreamEvent::Connection(_) => "connection",
		}
	}

	/// Serializes the payload alone, for the `data:` line.
	pub fn data_json(&self) -> serde_json::Result<String> {
		match self {
			StreamEvent::JobStatusChange(d) => serde_json::to_string(d),
			StreamEvent::JobCreated(d) | StreamEvent::JobUpdated(d) => serde_json::to_string(d),
			StreamEvent::JobDeleted(d) => serde_json::to_string(d),
			StreamEvent::Heartbeat(d) => serde_json::to_string(d),
			StreamEvent::Connection(d) => serde_json::to_string(d),
		}
	}

	/// The job this event is about, if any.
	pub fn job_id(&self) -> Option<JobId> {
		match self {
			StreamEvent::JobStatusChange(d) => Some(d.job_id),
			StreamEvent::JobCreated(d) | StreamEvent::JobUpdated(d) => Some(d.job.job_id),
			StreamEvent::JobDeleted(d) => Some(d.job_id),
			StreamEvent::Heartbeat(_) | StreamEvent::Connection(_) => None,
		}
	}

	pub fn job_status_change(job: &Job, health: JobHealth) -> Self {
		StreamEvent::JobStatusChange(JobStatusData::new(job, health))
	}

	pub fn job_created(job: &Job, health: JobHealth) -> Self {
		StreamEvent::JobCreated(JobSnapshotData::new(job, health))
	}

	pub fn job_updated(job: &Job, health: JobHealth) -> Self {
		StreamEvent::JobUpdated(JobSnapshotData::new(job, health))
	}

	pub fn job_deleted(job: &Job) -> Self {
		StreamEvent::JobDeleted(JobDeletedData {
			job_id: job.id,
			name: job.name.clone(),
			host: job.host.clone(),
		})
	}

	pub fn heartbeat() -> Self {
		StreamEvent::Heartbeat(HeartbeatData {
			timestamp: Utc::now(),
		})
	}

	pub fn connection(session_id: SessionId) -> Self {
		StreamEvent::Connection(ConnectionData {
			session_id,
			timestamp: Utc::now(),
		})
	}
}

/// Payload of `job-status-change`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusData {
	pub job_id: JobId,
	pub name: String,
	pub host: String,
	/// Lifecycle status as configured, not the derived health.
	pub status: JobLifecycle,
	pub last_reported_at: DateTime<Utc>,
	pub is_failure: bool,
	/// Derived health value: 1, 0 or -1.
	pub value: i8,
	pub reason: StatusReason,
}

impl JobStatusData {
	pub fn new(job: &Job, health: JobHealth) -> Self {
		Self {
			job_id: job.id,
			name: job.name.clone(),
			host: job.host.clone(),
			status: job.status.clone(),
			last_reported_at: job.last_reported_at,
			is_failure: health.is_failure(),
			value: health.value.as_i8(),
			reason: health.reason,
		}
	}
}

/// Payload of `job-created` and `job-updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshotData {
	#[serde(flatten)]
	pub job: JobStatusData,
	pub labels: BTreeMap<String, String>,
	pub automatic_failure_threshold: i64,
}

impl JobSnapshotData {
	pub fn new(job: &Job, health: JobHealth) -> Self {
		Self {
			job: JobStatusData::new(job, health),
			labels: job.labels.clone(),
			automatic_failure_threshold: job.automatic_failure_threshold,
		}
	}
}

/// Payload of `job-deleted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDeletedData {
	pub job_id: JobId,
	pub name: String,
	pub host: String,
}

/// Payload of `heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatData {
	pub timestamp: DateTime<Utc>,
}

/// Payload of `connection`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionData {
	pub session_id: SessionId,
	pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::StatusValue;

	fn job() -> Job {
		let at = DateTime::from_timestamp(1_698_696_960, 0).unwrap();
		Job {
			id: JobId(123),
			name: "backup".to_string(),
			host: "db1".to_string(),
			key: "k".to_string(),
			labels: BTreeMap::from([("env".to_string(), "prod".to_string())]),
			status: JobLifecycle::Active,
			automatic_failure_threshold: 3600,
			last_reported_at: at,
			created_at: at,
			updated_at: at,
		}
	}

	fn healthy() -> JobHealth {
		JobHealth {
			value: StatusValue::Healthy,
			reason: StatusReason::Success,
		}
	}

	#[test]
	fn test_event_type() {
		let job = job();
		assert_eq!(
			StreamEvent::job_status_change(&job, healthy()).event_type(),
			"job-status-change"
		);
		assert_eq!(StreamEvent::job_created(&job, healthy()).event_type(), "job-created");
		assert_eq!(StreamEvent::job_updated(&job, healthy()).event_type(), "job-updated");
		assert_eq!(StreamEvent::job_deleted(&job).event_type(), "job-deleted");
		assert_eq!(StreamEvent::heartbeat().event_type(), "heartbeat");
		assert_eq!(
			StreamEvent::connection(SessionId::new()).event_type(),
			"connection"
		);
	}

	#[test]
	fn status_change_payload_shape() {
		let event = StreamEvent::job_status_change(&job(), healthy());
		let json = event.data_json().unwrap();
		assert!(json.starts_with(
			r#"{"job_id":123,"name":"backup","host":"db1","status":"active","last_reported_at":"2023-10-30T20:16:00Z","is_failure":false"#
		));
		assert!(json.contains(r#""value":1"#));
		assert!(json.contains(r#""reason":"success""#));
	}

	#[test]
	fn failing_health_sets_is_failure() {
		let health = JobHealth {
			value: StatusValue::Failing,
			reason: StatusReason::MissedDeadline,
		};
		let json = StreamEvent::job_status_change(&job(), health)
			.data_json()
			.unwrap();
		assert!(json.contains(r#""is_failure":true"#));
		assert!(json.contains(r#""reason":"missed_deadline""#));
	}

	#[test]
	fn snapshot_payload_is_flat() {
		let json = StreamEvent::job_updated(&job(), healthy())
			.data_json()
			.unwrap();
		let value: serde_json::Value = serde_json::from_str(&json).unwrap();
		assert_eq!(value["job_id"], 123);
		assert_eq!(value["labels"]["env"], "prod");
		assert_eq!(value["automatic_failure_threshold"], 3600);
	}

	#[test]
	fn deleted_payload() {
		let json = StreamEvent::job_deleted(&job()).data_json().unwrap();
		assert_eq!(json, r#"{"job_id":123,"name":"backup","host":"db1"}"#);
	}

	#[test]
	fn tagged_serialization() {
		let json = serde_json::to_string(&StreamEvent::heartbeat()).unwrap();
		assert!(json.contains(r#""event":"heartbeat""#));
		assert!(json.contains(r#""timestamp""#));
	}

	#[test]
	fn job_id_accessor() {
		let job = job();
		assert_eq!(StreamEvent::job_deleted(&job).job_id(), Some(JobId(123)));
		assert_eq!(StreamEvent::job_created(&job, healthy()).job_id(), Some(JobId(123)));
		assert_eq!(StreamEvent::heartbeat().job_id(), None);
	}

	#[test]
	fn deserialization_roundtrip() {
		let event = StreamEvent::job_created(&job(), healthy());
		let json = serde_json::to_string(&event).unwrap();
		let parsed: StreamEvent = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, event);
	}
}
