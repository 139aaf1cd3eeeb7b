// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;

use cronwatch_server_config::EventsConfig;
use cronwatch_server_status::{
	BroadcasterConfig, BroadcasterMetrics, EventBroadcaster, JobNotifier, JobRepository,
	SqliteJobRepository,
};

use crate::routes;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
	pub repo: Arc<dyn JobRepository>,
	pub broadcaster: Arc<EventBroadcaster>,
	pub notifier: JobNotifier,
}

impl AppState {
	pub fn new(repo: Arc<dyn JobRepository>, broadcaster: Arc<EventBroadcaster>) -> Self {
		let notifier = JobNotifier::new(Arc::clone(&repo), Arc::clone(&broadcaster));
		Self {
			repo,
			broadcaster,
			notifier,
		}
	}
}

/// Translate the events config section into broadcaster settings.
pub fn broadcaster_config(events: &EventsConfig) -> BroadcasterConfig {
	BroadcasterConfig {
		enabled: events.enabled,
		max_subscribers: events.max_subscribers,
		dispatch_queue_capacity: events.dispatch_queue_capacity,
		subscriber_queue_capacity: events.subscriber_queue_capacity,
		heartbeat_interval: events.heartbeat_interval(),
		idle_timeout: events.idle_timeout(),
		max_connection_duration: events.max_connection_duration(),
	}
}

/// Build application state over a migrated pool and start the broadcaster.
///
/// Must be called from within a Tokio runtime.
pub fn create_app_state(
	pool: SqlitePool,
	events: &EventsConfig,
) -> prometheus::Result<AppState> {
	let metrics = BroadcasterMetrics::new()?;
	let broadcaster = EventBroadcaster::start(broadcaster_config(events), metrics);
	let repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool));
	Ok(AppState::new(repo, broadcaster))
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/metrics", get(routes::metrics::prometheus_metrics))
		.route("/api/events", get(routes::events::stream_events))
		.route(
			"/api/jobs",
			get(routes::jobs::list_jobs).post(routes::jobs::create_job),
		)
		.route(
			"/api/jobs/{id}",
			get(routes::jobs::get_job)
				.put(routes::jobs::update_job)
				.delete(routes::jobs::delete_job),
		)
		.route("/api/jobs/{id}/results", post(routes::jobs::record_result))
		.route("/ping/{key}", get(routes::jobs::ping))
		.with_state(state)
}
