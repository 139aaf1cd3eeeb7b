// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job management and result reporting endpoints.
//!
//! Every successful mutation is handed to the notifier after it commits, so
//! stream subscribers see it without polling.

use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use cronwatch_core::{
	evaluate, Job, JobFilter, JobHealth, JobId, JobResult, JobUpdate, NewJob, NewJobResult,
	ResultStatus, StatusReason,
};
use cronwatch_server_status::JobNotification;

use crate::{api::AppState, error::ServerError};

/// Derived health as returned by the API.
#[derive(Debug, Serialize)]
pub struct HealthView {
	pub value: i8,
	pub reason: StatusReason,
	pub is_failure: bool,
}

impl From<JobHealth> for HealthView {
	fn from(health: JobHealth) -> Self {
		Self {
			value: health.value.as_i8(),
			reason: health.reason,
			is_failure: health.is_failure(),
		}
	}
}

/// A job together with its current health.
#[derive(Debug, Serialize)]
pub struct JobResponse {
	#[serde(flatten)]
	pub job: Job,
	pub health: HealthView,
	pub latest_result: Option<JobResult>,
}

impl JobResponse {
	fn new(job: Job, latest_result: Option<JobResult>) -> Self {
		let health = evaluate(&job, latest_result.as_ref(), Utc::now());
		Self {
			job,
			health: health.into(),
			latest_result,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
	pub jobs: Vec<JobResponse>,
	pub total: usize,
}

/// Build a filter from `search=<term>` and repeated `label=<name>:<value>`.
fn parse_filter(params: Vec<(String, String)>) -> Result<JobFilter, ServerError> {
	let mut filter = JobFilter::default();
	for (key, value) in params {
		match key.as_str() {
			"search" => filter.search = Some(value),
			"label" => {
				let (name, label_value) = value.split_once(':').ok_or_else(|| {
					ServerError::BadRequest(format!("label filter '{value}' must be name:value"))
				})?;
				filter
					.labels
					.insert(name.to_string(), label_value.to_string());
			}
			_ => {}
		}
	}
	Ok(filter)
}

async fn load_job(state: &AppState, id: JobId) -> Result<Job, ServerError> {
	state
		.repo
		.get_job(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("job {id} not found")))
}

/// GET /api/jobs
#[instrument(skip(state, params))]
pub async fn list_jobs(
	State(state): State<AppState>,
	Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ListJobsResponse>, ServerError> {
	let filter = parse_filter(params)?;
	let jobs = state.repo.list_jobs(&filter).await?;
	let mut latest = state.repo.latest_results().await?;

	let jobs: Vec<JobResponse> = jobs
		.into_iter()
		.map(|job| {
			let result = latest.remove(&job.id);
			JobResponse::new(job, result)
		})
		.collect();

	Ok(Json(ListJobsResponse {
		total: jobs.len(),
		jobs,
	}))
}

/// POST /api/jobs
#[instrument(skip(state, new_job), fields(name = %new_job.name, host = %new_job.host))]
pub async fn create_job(
	State(state): State<AppState>,
	Json(new_job): Json<NewJob>,
) -> Result<(StatusCode, Json<JobResponse>), ServerError> {
	let job = state.repo.create_job(&new_job).await?;
	info!(job_id = %job.id, "Job created");

	state
		.notifier
		.notify(JobNotification::Created(job.clone()))
		.await;

	Ok((StatusCode::CREATED, Json(JobResponse::new(job, None))))
}

/// GET /api/jobs/{id}
#[instrument(skip(state))]
pub async fn get_job(
	State(state): State<AppState>,
	Path(id): Path<i64>,
) -> Result<Json<JobResponse>, ServerError> {
	let job = load_job(&state, JobId(id)).await?;
	let latest = state.repo.latest_result(job.id).await?;
	Ok(Json(JobResponse::new(job, latest)))
}

/// PUT /api/jobs/{id}
#[instrument(skip(state, update))]
pub async fn update_job(
	State(state): State<AppState>,
	Path(id): Path<i64>,
	Json(update): Json<JobUpdate>,
) -> Result<Json<JobResponse>, ServerError> {
	let job = state.repo.update_job(JobId(id), &update).await?;
	info!(job_id = %job.id, "Job updated");

	state
		.notifier
		.notify(JobNotification::Updated(job.clone()))
		.await;

	let latest = state.repo.latest_result(job.id).await?;
	Ok(Json(JobResponse::new(job, latest)))
}

/// DELETE /api/jobs/{id}
#[instrument(skip(state))]
pub async fn delete_job(
	State(state): State<AppState>,
	Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
	let job = state
		.repo
		.delete_job(JobId(id))
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("job {id} not found")))?;
	info!(job_id = %job.id, "Job deleted");

	state.notifier.notify(JobNotification::Deleted(job)).await;

	Ok(StatusCode::NO_CONTENT)
}

/// POST /api/jobs/{id}/results
#[instrument(skip(state, result), fields(status = %result.status))]
pub async fn record_result(
	State(state): State<AppState>,
	Path(id): Path<i64>,
	Json(result): Json<NewJobResult>,
) -> Result<(StatusCode, Json<JobResult>), ServerError> {
	let recorded = record(&state, JobId(id), &result).await?;
	Ok((StatusCode::CREATED, Json(recorded)))
}

#[derive(Debug, Default, Deserialize)]
pub struct PingParams {
	pub status: Option<String>,
	pub exit_code: Option<i32>,
	pub duration_ms: Option<u64>,
}

impl PingParams {
	fn result_status(&self) -> Result<ResultStatus, ServerError> {
		let status = match self.status.as_deref() {
			Some(s) => s
				.parse()
				.map_err(|e: cronwatch_core::CoreError| ServerError::BadRequest(e.to_string()))?,
			None => ResultStatus::Success,
		};
		match self.exit_code {
			Some(code) if code != 0 => Ok(ResultStatus::Failure),
			_ => Ok(status),
		}
	}
}

/// GET /ping/{key} - report a run by job key.
///
/// Succeeds by default; `?status=failure` or a non-zero `?exit_code=`
/// records a failure.
#[instrument(skip(state, key, params))]
pub async fn ping(
	State(state): State<AppState>,
	Path(key): Path<String>,
	Query(params): Query<PingParams>,
) -> Result<Json<JobResult>, ServerError> {
	let status = params.result_status()?;
	let job = state
		.repo
		.get_job_by_key(&key)
		.await?
		.ok_or_else(|| ServerError::NotFound("no job with this key".to_string()))?;

	let result = NewJobResult {
		status,
		duration_ms: params.duration_ms,
		output: None,
		reported_at: None,
	};
	let recorded = record(&state, job.id, &result).await?;
	Ok(Json(recorded))
}

async fn record(
	state: &AppState,
	id: JobId,
	result: &NewJobResult,
) -> Result<JobResult, ServerError> {
	let recorded = state.repo.record_result(id, result).await?;
	let job = load_job(state, id).await?;
	info!(job_id = %id, status = %recorded.status, "Job result recorded");

	state
		.notifier
		.notify(JobNotification::ResultRecorded(job, recorded.clone()))
		.await;

	Ok(recorded)
}
