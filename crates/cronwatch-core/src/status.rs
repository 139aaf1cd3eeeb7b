// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Point-in-time health derivation for a job.
//!
//! [`evaluate`] is the single source of truth for job health. The metrics
//! exporter calls it for every job on every scrape and the live event feed
//! calls it whenever a job changes, so both always agree.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Job, JobLifecycle, JobResult, ResultStatus};

/// Tri-state numeric health value as exported to Prometheus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusValue {
	/// Operator suppressed (maintenance or paused).
	Suppressed,
	Failing,
	Healthy,
}

impl StatusValue {
	pub fn as_i8(self) -> i8 {
		match self {
			Self::Suppressed => -1,
			Self::Failing => 0,
			Self::Healthy => 1,
		}
	}
}

impl fmt::Display for StatusValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_i8())
	}
}

/// Why a job has the health value it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReason {
	Maintenance,
	Paused,
	MissedDeadline,
	Success,
	Failure,
}

impl StatusReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Maintenance => "maintenance",
			Self::Paused => "paused",
			Self::MissedDeadline => "missed_deadline",
			Self::Success => "success",
			Self::Failure => "failure",
		}
	}
}

impl fmt::Display for StatusReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Derived health of a job. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHealth {
	pub value: StatusValue,
	pub reason: StatusReason,
}

impl JobHealth {
	const fn new(value: StatusValue, reason: StatusReason) -> Self {
		Self { value, reason }
	}

	pub fn is_failure(&self) -> bool {
		self.value == StatusValue::Failing
	}

	pub fn is_suppressed(&self) -> bool {
		self.value == StatusValue::Suppressed
	}
}

/// Derive a job's health from its configuration, latest result and the clock.
///
/// Rules, first match wins:
/// 1. maintenance lifecycle -> `(-1, maintenance)`
/// 2. paused lifecycle -> `(-1, paused)`
/// 3. silent for longer than the threshold -> `(0, missed_deadline)`,
///    whatever the last result said
/// 4. latest result success/failure -> `(1, success)` / `(0, failure)`
/// 5. no result yet -> `(1, success)`
///
/// The threshold comparison is strict, so a report exactly at the boundary is
/// still on time. A non-positive threshold is always exceeded.
pub fn evaluate(job: &Job, latest: Option<&JobResult>, now: DateTime<Utc>) -> JobHealth {
	match job.status {
		JobLifecycle::Maintenance => {
			return JobHealth::new(StatusValue::Suppressed, StatusReason::Maintenance);
		}
		JobLifecycle::Paused => {
			return JobHealth::new(StatusValue::Suppressed, StatusReason::Paused);
		}
		JobLifecycle::Active | JobLifecycle::Other(_) => {}
	}

	if deadline_exceeded(job, now) {
		return JobHealth::new(StatusValue::Failing, StatusReason::MissedDeadline);
	}

	match latest.map(|r| r.status) {
		Some(ResultStatus::Failure) => JobHealth::new(StatusValue::Failing, StatusReason::Failure),
		Some(ResultStatus::Success) | None => {
			JobHealth::new(StatusValue::Healthy, StatusReason::Success)
		}
	}
}

fn deadline_exceeded(job: &Job, now: DateTime<Utc>) -> bool {
	if job.automatic_failure_threshold <= 0 {
		return true;
	}
	let elapsed = now.signed_duration_since(job.last_reported_at);
	elapsed > Duration::seconds(job.automatic_failure_threshold)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::JobId;
	use proptest::prelude::*;
	use std::collections::BTreeMap;

	fn now() -> DateTime<Utc> {
		DateTime::from_timestamp(1_698_696_960, 0).unwrap()
	}

	fn job(status: JobLifecycle, threshold: i64, silent_for: i64) -> Job {
		let now = now();
		Job {
			id: JobId(1),
			name: "backup".to_string(),
			host: "db1".to_string(),
			key: "key".to_string(),
			labels: BTreeMap::new(),
			status,
			automatic_failure_threshold: threshold,
			last_reported_at: now - Duration::seconds(silent_for),
			created_at: now,
			updated_at: now,
		}
	}

	fn result(status: ResultStatus) -> JobResult {
		JobResult {
			id: 1,
			job_id: JobId(1),
			status,
			duration_ms: None,
			output: None,
			reported_at: now(),
		}
	}

	fn any_result() -> impl Strategy<Value = Option<ResultStatus>> {
		prop_oneof![
			Just(None),
			Just(Some(ResultStatus::Success)),
			Just(Some(ResultStatus::Failure)),
		]
	}

	fn unsuppressed_status() -> impl Strategy<Value = JobLifecycle> {
		prop_oneof![
			Just(JobLifecycle::Active),
			"[a-z]{1,10}"
				.prop_filter("not a suppression state", |s| s != "maintenance" && s != "paused")
				.prop_map(JobLifecycle::from),
		]
	}

	proptest! {
		#[test]
		fn suppressed_jobs_always_minus_one(
			paused in any::<bool>(),
			threshold in -10_000i64..10_000,
			silent_for in 0i64..1_000_000,
			latest in any_result(),
		) {
			let status = if paused { JobLifecycle::Paused } else { JobLifecycle::Maintenance };
			let job = job(status, threshold, silent_for);
			let latest = latest.map(result);
			let health = evaluate(&job, latest.as_ref(), now());
			prop_assert_eq!(health.value.as_i8(), -1);
			let expected = if paused { StatusReason::Paused } else { StatusReason::Maintenance };
			prop_assert_eq!(health.reason, expected);
		}

		#[test]
		fn overdue_jobs_missed_deadline_regardless_of_result(
			status in unsuppressed_status(),
			threshold in -10_000i64..10_000,
			extra in 1i64..100_000,
			latest in any_result(),
		) {
			let silent_for = threshold.max(0) + extra;
			let job = job(status, threshold, silent_for);
			let latest = latest.map(result);
			let health = evaluate(&job, latest.as_ref(), now());
			prop_assert_eq!(health, JobHealth::new(StatusValue::Failing, StatusReason::MissedDeadline));
		}

		#[test]
		fn within_threshold_follows_latest_result(
			status in unsuppressed_status(),
			threshold in 1i64..100_000,
			fraction in 0.0f64..=1.0,
			latest in any_result(),
		) {
			let silent_for = (threshold as f64 * fraction) as i64;
			let job = job(status, threshold, silent_for);
			let latest_result = latest.map(result);
			let health = evaluate(&job, latest_result.as_ref(), now());
			match latest {
				Some(ResultStatus::Failure) => {
					prop_assert_eq!(health, JobHealth::new(StatusValue::Failing, StatusReason::Failure));
				}
				_ => {
					prop_assert_eq!(health, JobHealth::new(StatusValue::Healthy, StatusReason::Success));
				}
			}
		}

		#[test]
		fn minus_one_iff_suppression_reason(
			status in prop_oneof![Just(JobLifecycle::Paused), Just(JobLifecycle::Maintenance), unsuppressed_status()],
			threshold in -100i64..10_000,
			silent_for in 0i64..20_000,
			latest in any_result(),
		) {
			let job = job(status, threshold, silent_for);
			let latest = latest.map(result);
			let health = evaluate(&job, latest.as_ref(), now());
			let suppression_reason = matches!(health.reason, StatusReason::Maintenance | StatusReason::Paused);
			prop_assert_eq!(health.value == StatusValue::Suppressed, suppression_reason);
		}
	}

	#[test]
	fn overdue_job_without_results_missed_deadline() {
		let job = job(JobLifecycle::Active, 3600, 7200);
		let health = evaluate(&job, None, now());
		assert_eq!(health.value.as_i8(), 0);
		assert_eq!(health.reason, StatusReason::MissedDeadline);
		assert!(health.is_failure());
	}

	#[test]
	fn recent_success_is_healthy() {
		let job = job(JobLifecycle::Active, 3600, 10);
		let ok = result(ResultStatus::Success);
		let health = evaluate(&job, Some(&ok), now());
		assert_eq!(health.value.as_i8(), 1);
		assert_eq!(health.reason, StatusReason::Success);
	}

	#[test]
	fn maintenance_beats_deadline() {
		let job = job(JobLifecycle::Maintenance, 3600, 999_999);
		let health = evaluate(&job, None, now());
		assert_eq!(health.value.as_i8(), -1);
		assert_eq!(health.reason, StatusReason::Maintenance);
		assert!(health.is_suppressed());
	}

	#[test]
	fn report_exactly_at_threshold_is_on_time() {
		let job = job(JobLifecycle::Active, 3600, 3600);
		assert_eq!(evaluate(&job, None, now()).reason, StatusReason::Success);

		let job = job_one_past(3600);
		assert_eq!(evaluate(&job, None, now()).reason, StatusReason::MissedDeadline);
	}

	fn job_one_past(threshold: i64) -> Job {
		let mut j = job(JobLifecycle::Active, threshold, threshold);
		j.last_reported_at -= Duration::milliseconds(1);
		j
	}

	#[test]
	fn non_positive_threshold_always_overdue() {
		for threshold in [0, -1, -3600] {
			let job = job(JobLifecycle::Active, threshold, 0);
			let ok = result(ResultStatus::Success);
			assert_eq!(
				evaluate(&job, Some(&ok), now()).reason,
				StatusReason::MissedDeadline
			);
		}
	}

	#[test]
	fn recent_failure_is_failing() {
		let job = job(JobLifecycle::Other("custom".to_string()), 3600, 10);
		let failed = result(ResultStatus::Failure);
		let health = evaluate(&job, Some(&failed), now());
		assert_eq!(health.value.as_i8(), 0);
		assert_eq!(health.reason, StatusReason::Failure);
	}

	#[test]
	fn reason_strings() {
		assert_eq!(StatusReason::MissedDeadline.to_string(), "missed_deadline");
		assert_eq!(StatusReason::Maintenance.as_str(), "maintenance");
		assert_eq!(StatusValue::Suppressed.to_string(), "-1");
	}
}
