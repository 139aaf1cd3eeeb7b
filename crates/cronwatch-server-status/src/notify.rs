// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Translate job mutations into stream events.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use cronwatch_core::{evaluate, Job, JobHealth, JobResult, StreamEvent};

use crate::broadcast::EventBroadcaster;
use crate::error::Result;
use crate::repository::JobRepository;

/// A job mutation that subscribers should hear about.
#[derive(Debug, Clone)]
pub enum JobNotification {
	Created(Job),
	Updated(Job),
	Deleted(Job),
	ResultRecorded(Job, JobResult),
}

impl JobNotification {
	fn job(&self) -> &Job {
		match self {
			Self::Created(job) | Self::Updated(job) | Self::Deleted(job) => job,
			Self::ResultRecorded(job, _) => job,
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			Self::Created(_) => "created",
			Self::Updated(_) => "updated",
			Self::Deleted(_) => "deleted",
			Self::ResultRecorded(..) => "result_recorded",
		}
	}
}

/// Evaluates job health and publishes the matching events.
#[derive(Clone)]
pub struct JobNotifier {
	repo: Arc<dyn JobRepository>,
	broadcaster: Arc<EventBroadcaster>,
}

impl JobNotifier {
	pub fn new(repo: Arc<dyn JobRepository>, broadcaster: Arc<EventBroadcaster>) -> Self {
		Self { repo, broadcaster }
	}

	/// Publish the events for one mutation.
	///
	/// Failures are logged and the notification is skipped; the mutation
	/// itself has already succeeded.
	#[instrument(skip(self, notification), fields(job_id = %notification.job().id, kind = notification.kind()))]
	pub async fn notify(&self, notification: JobNotification) {
		if !self.broadcaster.is_enabled() {
			return;
		}

		let events = match self.events_for(&notification).await {
			Ok(events) => events,
			Err(e) => {
				warn!(error = %e, "Failed to build job events, skipping notification");
				return;
			}
		};

		for event in events {
			let event_type = event.event_type();
			if !self.broadcaster.publish(event) {
				debug!(event_type, "Job event not published");
			}
		}
	}

	async fn events_for(&self, notification: &JobNotification) -> Result<Vec<StreamEvent>> {
		let events = match notification {
			JobNotification::Created(job) => {
				let health = self.health(job).await?;
				vec![StreamEvent::job_created(job, health)]
			}
			JobNotification::Updated(job) => {
				let health = self.health(job).await?;
				vec![
					StreamEvent::job_updated(job, health),
					StreamEvent::job_status_change(job, health),
				]
			}
			JobNotification::Deleted(job) => vec![StreamEvent::job_deleted(job)],
			JobNotification::ResultRecorded(job, result) => {
				let health = evaluate(job, Some(result), Utc::now());
				vec![StreamEvent::job_status_change(job, health)]
			}
		};
		Ok(events)
	}

	async fn health(&self, job: &Job) -> Result<JobHealth> {
		let latest = self.repo.latest_result(job.id).await?;
		Ok(evaluate(job, latest.as_ref(), Utc::now()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::broadcast::BroadcasterConfig;
	use crate::metrics::BroadcasterMetrics;
	use crate::repository::tests::memory_repo;
	use cronwatch_core::{JobLifecycle, JobUpdate, NewJob, NewJobResult, ResultStatus, StatusReason};
	use std::time::Duration;
	use tokio::time::timeout;

	async fn setup() -> (Arc<dyn JobRepository>, Arc<EventBroadcaster>, JobNotifier) {
		let repo: Arc<dyn JobRepository> = Arc::new(memory_repo().await);
		let broadcaster = EventBroadcaster::start(
			BroadcasterConfig {
				heartbeat_interval: Duration::from_secs(3600),
				..BroadcasterConfig::default()
			},
			BroadcasterMetrics::new().unwrap(),
		);
		let notifier = JobNotifier::new(Arc::clone(&repo), Arc::clone(&broadcaster));
		(repo, broadcaster, notifier)
	}

	async fn next_type(session: &mut crate::SubscriberSession) -> (String, serde_json::Value) {
		let event = timeout(Duration::from_secs(2), session.recv())
			.await
			.unwrap()
			.unwrap();
		let data = serde_json::from_str(&event.data_json().unwrap()).unwrap();
		(event.event_type().to_string(), data)
	}

	#[tokio::test]
	async fn created_job_publishes_job_created() {
		let (repo, broadcaster, notifier) = setup().await;
		let mut session = broadcaster.register().unwrap();

		let job = repo.create_job(&NewJob::new("backup", "db1")).await.unwrap();
		notifier.notify(JobNotification::Created(job.clone())).await;

		let (event_type, data) = next_type(&mut session).await;
		assert_eq!(event_type, "job-created");
		assert_eq!(data["job_id"], job.id.0);
		assert_eq!(data["name"], "backup");
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn update_publishes_update_then_status_change() {
		let (repo, broadcaster, notifier) = setup().await;
		let mut session = broadcaster.register().unwrap();

		let job = repo.create_job(&NewJob::new("backup", "db1")).await.unwrap();
		let update = JobUpdate {
			status: Some(JobLifecycle::Paused),
			..JobUpdate::default()
		};
		let job = repo.update_job(job.id, &update).await.unwrap();
		notifier.notify(JobNotification::Updated(job)).await;

		let (first, _) = next_type(&mut session).await;
		let (second, data) = next_type(&mut session).await;
		assert_eq!(first, "job-updated");
		assert_eq!(second, "job-status-change");
		assert_eq!(data["reason"], "paused");
		assert_eq!(data["value"], -1);
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn failed_result_publishes_failing_status() {
		let (repo, broadcaster, notifier) = setup().await;
		let mut session = broadcaster.register().unwrap();

		let job = repo.create_job(&NewJob::new("backup", "db1")).await.unwrap();
		let result = repo
			.record_result(job.id, &NewJobResult::new(ResultStatus::Failure))
			.await
			.unwrap();
		let job = repo.get_job(job.id).await.unwrap().unwrap();
		notifier.notify(JobNotification::ResultRecorded(job, result)).await;

		let (event_type, data) = next_type(&mut session).await;
		assert_eq!(event_type, "job-status-change");
		assert_eq!(data["is_failure"], true);
		assert_eq!(data["reason"], StatusReason::Failure.as_str());
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn deleted_job_publishes_job_deleted() {
		let (repo, broadcaster, notifier) = setup().await;
		let mut session = broadcaster.register().unwrap();

		let job = repo.create_job(&NewJob::new("backup", "db1")).await.unwrap();
		let removed = repo.delete_job(job.id).await.unwrap().unwrap();
		notifier.notify(JobNotification::Deleted(removed)).await;

		let (event_type, data) = next_type(&mut session).await;
		assert_eq!(event_type, "job-deleted");
		assert_eq!(data["job_id"], job.id.0);
		broadcaster.shutdown().await;
	}

	#[tokio::test]
	async fn repository_failure_skips_notification() {
		let (repo, broadcaster, notifier) = setup().await;
		let mut session = broadcaster.register().unwrap();

		let job = repo.create_job(&NewJob::new("backup", "db1")).await.unwrap();
		let pool = memory_repo().await.pool().clone();
		pool.close().await;
		let broken = JobNotifier::new(
			Arc::new(crate::SqliteJobRepository::new(pool)),
			Arc::clone(&broadcaster),
		);
		broken.notify(JobNotification::Created(job.clone())).await;

		notifier.notify(JobNotification::Deleted(job)).await;
		let (event_type, _) = next_type(&mut session).await;
		assert_eq!(event_type, "job-deleted");
		broadcaster.shutdown().await;
	}
}
