// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use cronwatch_server_status::StatusError;

#[derive(Debug, Error)]
pub enum ServerError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("service unavailable: {0}")]
	ServiceUnavailable(String),

	#[error("internal error: {0}")]
	Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ServerError {
	fn parts(&self) -> (StatusCode, &'static str, &str) {
		match self {
			ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
			ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
			ServerError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
			ServerError::ServiceUnavailable(msg) => {
				(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
			}
			ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
		}
	}
}

impl From<StatusError> for ServerError {
	fn from(e: StatusError) -> Self {
		match e {
			StatusError::JobNotFound => ServerError::NotFound("job not found".to_string()),
			StatusError::DuplicateKey => {
				ServerError::Conflict("a job with this key already exists".to_string())
			}
			StatusError::Validation(e) => ServerError::BadRequest(e.to_string()),
			other => {
				tracing::error!(error = %other, "repository operation failed");
				ServerError::Internal(other.to_string())
			}
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, error, message) = self.parts();
		let body = ErrorResponse {
			error: error.to_string(),
			message: message.to_string(),
		};
		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use cronwatch_core::CoreError;

	#[test]
	fn status_errors_map_to_http_codes() {
		let cases = [
			(StatusError::JobNotFound, StatusCode::NOT_FOUND),
			(StatusError::DuplicateKey, StatusCode::CONFLICT),
			(StatusError::Validation(CoreError::EmptyName), StatusCode::BAD_REQUEST),
			(StatusError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
		];
		for (err, expected) in cases {
			let response = ServerError::from(err).into_response();
			assert_eq!(response.status(), expected);
		}
	}

	#[tokio::test]
	async fn body_has_error_and_message() {
		let response = ServerError::ServiceUnavailable("subscriber limit reached".into()).into_response();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

		let body = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(json["error"], "service_unavailable");
		assert_eq!(json["message"], "subscriber limit reached");
	}
}
