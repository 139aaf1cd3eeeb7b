// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prometheus text exposition of job health.
//!
//! Three gauge families are rendered:
//!
//! ```text
//! # HELP cronjob_status Status of cron job: 1=success, 0=failure, -1=maintenance/paused
//! # TYPE cronjob_status gauge
//! cronjob_status{job_name="backup",host="db1",env="prod",status="success"} 1
//! # HELP cronjob_last_run_timestamp Timestamp of last job execution
//! # TYPE cronjob_last_run_timestamp gauge
//! cronjob_last_run_timestamp{job_name="backup",host="db1"} 1698696960
//! # HELP cronjob_total Total number of registered cron jobs
//! # TYPE cronjob_total gauge
//! cronjob_total 5
//! ```
//!
//! Jobs are rendered in the order given and user labels in key order, so a
//! fixed job set and clock always produce identical text.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use cronwatch_core::{evaluate, Job, JobFilter, JobId, JobResult, RESERVED_LABELS};

use crate::error::Result;
use crate::repository::JobRepository;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const STATUS_METRIC: &str = "cronjob_status";
const STATUS_HELP: &str = "Status of cron job: 1=success, 0=failure, -1=maintenance/paused";
const LAST_RUN_METRIC: &str = "cronjob_last_run_timestamp";
const LAST_RUN_HELP: &str = "Timestamp of last job execution";
const TOTAL_METRIC: &str = "cronjob_total";
const TOTAL_HELP: &str = "Total number of registered cron jobs";

/// Render the exposition text for `jobs` as of `now`.
///
/// `latest_result` returns the most recent result of a job, if it has any.
pub fn render<'a, F>(jobs: &[Job], mut latest_result: F, now: DateTime<Utc>) -> String
where
	F: FnMut(JobId) -> Option<&'a JobResult>,
{
	let mut output = String::new();

	push_header(&mut output, STATUS_METRIC, STATUS_HELP);
	for job in jobs {
		let health = evaluate(job, latest_result(job.id), now);

		let mut labels = identity_labels(job);
		for (name, value) in &job.labels {
			if RESERVED_LABELS.contains(&name.as_str()) {
				debug!(job_id = %job.id, label = %name, "skipping reserved user label");
				continue;
			}
			push_label(&mut labels, name, value);
		}
		push_label(&mut labels, "status", health.reason.as_str());

		output.push_str(&format!(
			"{STATUS_METRIC}{{{labels}}} {}\n",
			health.value.as_i8()
		));
	}

	push_header(&mut output, LAST_RUN_METRIC, LAST_RUN_HELP);
	for job in jobs {
		output.push_str(&format!(
			"{LAST_RUN_METRIC}{{{}}} {}\n",
			identity_labels(job),
			job.last_reported_at.timestamp()
		));
	}

	push_header(&mut output, TOTAL_METRIC, TOTAL_HELP);
	output.push_str(&format!("{TOTAL_METRIC} {}\n", jobs.len()));

	output
}

/// Load every job and its latest result from `repo`, then render.
///
/// Any repository failure fails the whole render; no partial text is returned.
#[instrument(skip(repo))]
pub async fn render_from_repository(repo: &dyn JobRepository, now: DateTime<Utc>) -> Result<String> {
	let jobs = repo.list_jobs(&JobFilter::default()).await?;
	let latest = repo.latest_results().await?;
	debug!(job_count = jobs.len(), "rendering job status exposition");
	Ok(render(&jobs, |id| latest.get(&id), now))
}

fn push_header(output: &mut String, name: &str, help: &str) {
	output.push_str(&format!("# HELP {name} {help}\n# TYPE {name} gauge\n"));
}

fn identity_labels(job: &Job) -> String {
	let mut labels = String::new();
	push_label(&mut labels, "job_name", &job.name);
	push_label(&mut labels, "host", &job.host);
	labels
}

fn push_label(labels: &mut String, name: &str, value: &str) {
	if !labels.is_empty() {
		labels.push(',');
	}
	labels.push_str(&format!("{name}=\"{}\"", escape_label_value(value)));
}

/// Escape the characters a quoted label value cannot hold verbatim.
fn escape_label_value(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'\\' => escaped.push_str("\\\\"),
			'"' => escaped.push_str("\\\""),
			'\n' => escaped.push_str("\\n"),
			c => escaped.push(c),
		}
	}
	escaped
}
