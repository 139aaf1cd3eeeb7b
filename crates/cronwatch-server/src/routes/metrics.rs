// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Prometheus scrape endpoint.

use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::{debug, error, instrument, warn};

use cronwatch_server_status::exposition;

use crate::{api::AppState, error::ServerError};

/// GET /metrics - job status exposition followed by broadcaster self-metrics.
///
/// A repository failure fails the whole scrape; no partial body is sent.
#[instrument(skip(state))]
pub async fn prometheus_metrics(
	State(state): State<AppState>,
) -> Result<impl IntoResponse, ServerError> {
	let mut body = exposition::render_from_repository(state.repo.as_ref(), Utc::now())
		.await
		.map_err(|e| {
			error!(error = %e, "prometheus_metrics: failed to render job status");
			ServerError::Internal(format!("Failed to render metrics: {e}"))
		})?;

	match state.broadcaster.metrics().gather() {
		Ok(text) => body.push_str(&text),
		Err(e) => warn!(error = %e, "prometheus_metrics: failed to gather broadcaster metrics"),
	}

	debug!(bytes = body.len(), "prometheus_metrics: rendered");
	Ok((
		StatusCode::OK,
		[(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
		body,
	))
}
