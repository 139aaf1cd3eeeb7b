// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic deadline checks.
//!
//! A job that stops reporting never triggers a mutation, so nothing else
//! would tell subscribers it has gone overdue. The watcher re-evaluates every
//! job on a fixed interval and publishes `job-status-change` when a job newly
//! crosses its deadline. Every other health transition is caused by a
//! mutation and already published by [`JobNotifier`](crate::JobNotifier).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cronwatch_core::{evaluate, JobFilter, JobHealth, JobId, StatusReason, StreamEvent};

use crate::broadcast::EventBroadcaster;
use crate::error::Result;
use crate::repository::JobRepository;

/// Default interval between deadline checks in seconds.
pub const DEFAULT_DEADLINE_CHECK_INTERVAL_SECS: u64 = 60;

pub struct DeadlineWatcher {
	repo: Arc<dyn JobRepository>,
	broadcaster: Arc<EventBroadcaster>,
	interval: Duration,
	/// Health from the previous check, keyed with the report time it saw.
	last_seen: HashMap<JobId, (JobHealth, DateTime<Utc>)>,
}

impl DeadlineWatcher {
	pub fn new(
		repo: Arc<dyn JobRepository>,
		broadcaster: Arc<EventBroadcaster>,
		interval: Duration,
	) -> Self {
		Self {
			repo,
			broadcaster,
			interval,
			last_seen: HashMap::new(),
		}
	}

	/// Evaluate every job once and publish newly overdue ones.
	///
	/// Returns the number of events published.
	#[instrument(skip(self))]
	pub async fn check(&mut self, now: DateTime<Utc>) -> Result<usize> {
		let jobs = self.repo.list_jobs(&JobFilter::default()).await?;
		let latest = self.repo.latest_results().await?;

		let mut current = HashMap::with_capacity(jobs.len());
		let mut published = 0;
		for job in &jobs {
			let health = evaluate(job, latest.get(&job.id), now);
			// A report since the last check means the job recovered in between,
			// so going overdue again is a new transition.
			let was_overdue = self.last_seen.get(&job.id).is_some_and(|(h, reported)| {
				h.reason == StatusReason::MissedDeadline && *reported == job.last_reported_at
			});

			if health.reason == StatusReason::MissedDeadline && !was_overdue {
				info!(job_id = %job.id, job_name = %job.name, host = %job.host, "Job missed its deadline");
				if self.broadcaster.publish(StreamEvent::job_status_change(job, health)) {
					published += 1;
				}
			}
			current.insert(job.id, (health, job.last_reported_at));
		}

		self.last_seen = current;
		debug!(jobs = jobs.len(), published, "Deadline check complete");
		Ok(published)
	}

	/// Run checks until `shutdown` is cancelled.
	pub async fn run(mut self, shutdown: CancellationToken) {
		info!(interval_secs = self.interval.as_secs(), "Deadline watcher started");
		loop {
			tokio::select! {
				_ = shutdown.cancelled() => break,
				_ = tokio::time::sleep(self.interval) => {
					if let Err(e) = self.check(Utc::now()).await {
						warn!(error = %e, "Deadline check failed");
					}
				}
			}
		}
		info!("Deadline watcher stopped");
	}

	pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(self.run(shutdown))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::broadcast::BroadcasterConfig;
	use crate::metrics::BroadcasterMetrics;
	use crate::repository::tests::memory_repo;
	use cronwatch_core::{JobLifecycle, JobUpdate, NewJob, NewJobResult, ResultStatus};
	use tokio::time::timeout;

	async fn setup() -> (Arc<dyn JobRepository>, Arc<EventBroadcaster>) {
		let repo: Arc<dyn JobRepository> = Arc::new(memory_repo().await);
		let broadcaster = EventBroadcaster::start(
			BroadcasterConfig {
				heartbeat_interval: Duration::from_secs(3600),
				..BroadcasterConfig::default()
			},
			BroadcasterMetrics::new().unwrap(),
		);
		(repo, broadcaster)
	}

	fn new_job(name: &str, threshold: i64) -> NewJob {
		let mut job = NewJob::new(name, "db1");
		job.automatic_failure_threshold = threshold;
		job
	}

	#[tokio::test]
	async fn publishes_once_when_job_goes_overdue() {
		let (repo, broadcaster) = setup().await;
		let mut session = broadcaster.register().unwrap();
		let job = repo.create_job(&new_job("backup", 60)).await.unwrap();
		let mut watcher = DeadlineWatcher::new(Arc::clone(&repo), Arc::clone(&broadcaster), Duration::from_secs(60));

		let start = job.last_reported_at;
		assert_eq!(watcher.check(start).await.unwrap(), 0);
		assert_eq!(watcher.check(start + chrono::Duration::seconds(120)).await.unwrap(), 1);
		assert_eq!(watcher.check(start + chrono::Duration::seconds(180)).await.unwrap(), 0);

		let event = timeout(Duration::from_secs(2), session.recv()).await.unwrap().unwrap();
		let data: serde_json::Value = serde_json::from_str(&event.data_json().unwrap()).unwrap();
		assert_eq!(event.event_type(), "job-status-change");
		assert_eq!(data["reason"], "missed_deadline");
		assert_eq!(data["is_failure"], true);
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn reports_again_after_recovery_between_checks() {
		let (repo, broadcaster) = setup().await;
		let mut session = broadcaster.register().unwrap();
		let job = repo.create_job(&new_job("backup", 60)).await.unwrap();
		let mut watcher = DeadlineWatcher::new(Arc::clone(&repo), Arc::clone(&broadcaster), Duration::from_secs(60));

		let start = job.last_reported_at;
		assert_eq!(watcher.check(start + chrono::Duration::seconds(120)).await.unwrap(), 1);

		tokio::time::sleep(Duration::from_millis(10)).await;
		repo.record_result(job.id, &NewJobResult::new(ResultStatus::Success))
			.await
			.unwrap();
		let recovered = repo.get_job(job.id).await.unwrap().unwrap();
		assert!(recovered.last_reported_at > start);

		let overdue_again = recovered.last_reported_at + chrono::Duration::seconds(300);
		assert_eq!(watcher.check(overdue_again).await.unwrap(), 1);
		assert_eq!(watcher.check(overdue_again).await.unwrap(), 0);

		for _ in 0..2 {
			let event = timeout(Duration::from_secs(2), session.recv()).await.unwrap().unwrap();
			let data: serde_json::Value = serde_json::from_str(&event.data_json().unwrap()).unwrap();
			assert_eq!(data["reason"], "missed_deadline");
		}
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn suppressed_jobs_are_not_reported() {
		let (repo, broadcaster) = setup().await;
		let job = repo.create_job(&new_job("report", 60)).await.unwrap();
		let update = JobUpdate {
			status: Some(JobLifecycle::Maintenance),
			..JobUpdate::default()
		};
		repo.update_job(job.id, &update).await.unwrap();

		let mut watcher = DeadlineWatcher::new(Arc::clone(&repo), Arc::clone(&broadcaster), Duration::from_secs(60));
		let later = job.last_reported_at + chrono::Duration::seconds(600);
		assert_eq!(watcher.check(later).await.unwrap(), 0);
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn forgets_deleted_jobs() {
		let (repo, broadcaster) = setup().await;
		let job = repo.create_job(&new_job("sync", 60)).await.unwrap();
		let mut watcher = DeadlineWatcher::new(Arc::clone(&repo), Arc::clone(&broadcaster), Duration::from_secs(60));

		let later = job.last_reported_at + chrono::Duration::seconds(600);
		assert_eq!(watcher.check(later).await.unwrap(), 1);
		repo.delete_job(job.id).await.unwrap();
		assert_eq!(watcher.check(later).await.unwrap(), 0);
		assert!(watcher.last_seen.is_empty());
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn run_stops_on_shutdown() {
		let (repo, broadcaster) = setup().await;
		let shutdown = CancellationToken::new();
		let handle = DeadlineWatcher::new(repo, Arc::clone(&broadcaster), Duration::from_millis(10))
			.spawn(shutdown.clone());

		tokio::time::sleep(Duration::from_millis(50)).await;
		shutdown.cancel();
		timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
		broadcaster.shutdown().await;
	}
}
