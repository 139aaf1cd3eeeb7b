// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-sent event stream of job changes.

use std::convert::Infallible;

use axum::{
	extract::State,
	http::header,
	response::{
		sse::{Event, Sse},
		IntoResponse,
	},
};
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use cronwatch_core::{evaluate, JobFilter, StreamEvent};

use crate::{api::AppState, error::ServerError};

fn to_frame(event: &StreamEvent) -> Option<Event> {
	match event.data_json() {
		Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
		Err(e) => {
			warn!(error = %e, event_type = event.event_type(), "Failed to serialize stream event");
			None
		}
	}
}

/// GET /api/events - live job event stream.
///
/// The first frame is `connection`, followed by one `job-status-change`
/// per known job, then live events until the session ends.
#[instrument(skip(state))]
pub async fn stream_events(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
	if !state.broadcaster.is_enabled() {
		return Err(ServerError::ServiceUnavailable(
			"event streaming is disabled".to_string(),
		));
	}

	let mut session = state.broadcaster.register().ok_or_else(|| {
		ServerError::ServiceUnavailable("subscriber limit reached".to_string())
	})?;

	// Registered before the snapshot is read, so nothing published in between is lost.
	let jobs = state
		.repo
		.list_jobs(&JobFilter::default())
		.await
		.map_err(|e| {
			error!(error = %e, "Failed to list jobs for stream snapshot");
			ServerError::Internal("failed to load job snapshot".to_string())
		})?;
	let latest = state.repo.latest_results().await.map_err(|e| {
		error!(error = %e, "Failed to load latest results for stream snapshot");
		ServerError::Internal("failed to load job snapshot".to_string())
	})?;

	let now = Utc::now();
	let snapshot: Vec<StreamEvent> = jobs
		.iter()
		.map(|job| StreamEvent::job_status_change(job, evaluate(job, latest.get(&job.id), now)))
		.collect();

	let session_id = session.id();
	info!(
		session_id = %session_id,
		snapshot_jobs = snapshot.len(),
		subscribers = state.broadcaster.subscriber_count(),
		"Client connected to event stream"
	);

	let stream = async_stream::stream! {
		if let Some(frame) = to_frame(&StreamEvent::connection(session_id)) {
			yield Ok::<_, Infallible>(frame);
		}
		for event in &snapshot {
			if let Some(frame) = to_frame(event) {
				yield Ok(frame);
			}
		}
		while let Some(event) = session.recv().await {
			if let Some(frame) = to_frame(&event) {
				yield Ok(frame);
			}
		}
		debug!(session_id = %session_id, "Event stream ended");
	};

	Ok(([(header::CONNECTION, "keep-alive")], Sse::new(stream)))
}
