// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Repository layer for job and result persistence.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use cronwatch_core::{Job, JobFilter, JobId, JobResult, JobUpdate, NewJob, NewJobResult};

use crate::error::{Result, StatusError};

/// Repository trait for job operations.
#[async_trait]
pub trait JobRepository: Send + Sync {
	// Job operations
	async fn create_job(&self, job: &NewJob) -> Result<Job>;
	async fn get_job(&self, id: JobId) -> Result<Option<Job>>;
	async fn get_job_by_key(&self, key: &str) -> Result<Option<Job>>;
	async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;
	async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<Job>;
	async fn delete_job(&self, id: JobId) -> Result<Option<Job>>;

	// Result operations
	/// Store a result and advance the job's `last_reported_at`.
	async fn record_result(&self, id: JobId, result: &NewJobResult) -> Result<JobResult>;
	/// Most recent result by report time.
	async fn latest_result(&self, id: JobId) -> Result<Option<JobResult>>;
	/// Most recent result of every job that has one.
	async fn latest_results(&self) -> Result<HashMap<JobId, JobResult>>;
}

/// Create the job tables if they do not exist.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for statement in SCHEMA {
		sqlx::query(statement).execute(pool).await?;
	}
	Ok(())
}

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS jobs (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		name TEXT NOT NULL,
		host TEXT NOT NULL,
		job_key TEXT NOT NULL UNIQUE,
		labels TEXT NOT NULL DEFAULT '{}',
		status TEXT NOT NULL,
		automatic_failure_threshold INTEGER NOT NULL,
		last_reported_at TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS job_results (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
		status TEXT NOT NULL,
		duration_ms INTEGER,
		output TEXT,
		reported_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE INDEX IF NOT EXISTS idx_job_results_job_reported
		ON job_results (job_id, reported_at)
	"#,
];

// Fixed-width timestamps so that TEXT ordering matches time ordering.
fn format_ts(dt: DateTime<Utc>) -> String {
	dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str, field: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|_| StatusError::Internal(format!("Invalid {field}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
	matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

const JOB_COLUMNS: &str = "id, name, host, job_key, labels, status, automatic_failure_threshold, \
	last_reported_at, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, job_id, status, duration_ms, output, reported_at";

/// SQLite implementation of the job repository.
#[derive(Clone)]
pub struct SqliteJobRepository {
	pool: SqlitePool,
}

impl SqliteJobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
	#[instrument(skip(self, job), fields(name = %job.name, host = %job.host))]
	async fn create_job(&self, job: &NewJob) -> Result<Job> {
		job.validate()?;

		let now = Utc::now();
		let key = job.key.clone().unwrap_or_else(Job::generate_key);
		let labels_json = serde_json::to_string(&job.labels)?;

		let result = sqlx::query(
			r#"
			INSERT INTO jobs (
				name, host, job_key, labels, status, automatic_failure_threshold,
				last_reported_at, created_at, updated_at
			)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(job.name.trim())
		.bind(job.host.trim())
		.bind(&key)
		.bind(labels_json)
		.bind(job.status.as_str())
		.bind(job.automatic_failure_threshold)
		.bind(format_ts(now))
		.bind(format_ts(now))
		.bind(format_ts(now))
		.execute(&self.pool)
		.await
		.map_err(|e| {
			if is_unique_violation(&e) {
				StatusError::DuplicateKey
			} else {
				StatusError::Database(e)
			}
		})?;

		let id = JobId(result.last_insert_rowid());
		self
			.get_job(id)
			.await?
			.ok_or_else(|| StatusError::Internal(format!("job {id} vanished after insert")))
	}

	#[instrument(skip(self), fields(job_id = %id))]
	async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
			.bind(id.0)
			.fetch_optional(&self.pool)
			.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self, key))]
	async fn get_job_by_key(&self, key: &str) -> Result<Option<Job>> {
		let row = sqlx::query_as::<_, JobRow>(&format!(
			"SELECT {JOB_COLUMNS} FROM jobs WHERE job_key = ?"
		))
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self, filter))]
	async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
		let rows = sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY id"))
			.fetch_all(&self.pool)
			.await?;

		let mut jobs = Vec::with_capacity(rows.len());
		for row in rows {
			let job: Job = row.try_into()?;
			if filter.matches(&job) {
				jobs.push(job);
			}
		}
		Ok(jobs)
	}

	#[instrument(skip(self, update), fields(job_id = %id))]
	async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<Job> {
		update.validate()?;

		let mut job = self.get_job(id).await?.ok_or(StatusError::JobNotFound)?;
		job.apply_update(update, Utc::now());
		let labels_json = serde_json::to_string(&job.labels)?;

		sqlx::query(
			r#"
			UPDATE jobs
			SET name = ?, host = ?, labels = ?, status = ?,
				automatic_failure_threshold = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(&job.name)
		.bind(&job.host)
		.bind(labels_json)
		.bind(job.status.as_str())
		.bind(job.automatic_failure_threshold)
		.bind(format_ts(job.updated_at))
		.bind(id.0)
		.execute(&self.pool)
		.await?;

		Ok(job)
	}

	#[instrument(skip(self), fields(job_id = %id))]
	async fn delete_job(&self, id: JobId) -> Result<Option<Job>> {
		let Some(job) = self.get_job(id).await? else {
			return Ok(None);
		};

		let mut tx = self.pool.begin().await?;
		sqlx::query("DELETE FROM job_results WHERE job_id = ?")
			.bind(id.0)
			.execute(&mut *tx)
			.await?;
		let deleted = sqlx::query("DELETE FROM jobs WHERE id = ?")
			.bind(id.0)
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;

		Ok((deleted.rows_affected() > 0).then_some(job))
	}

	#[instrument(skip(self, result), fields(job_id = %id, status = %result.status))]
	async fn record_result(&self, id: JobId, result: &NewJobResult) -> Result<JobResult> {
		let now = Utc::now();
		let reported_at = result.reported_at.unwrap_or(now);
		// A clock-skewed reporter must not push the deadline into the future.
		let deadline_from = reported_at.min(now);
		let output = result.truncated_output();

		let mut tx = self.pool.begin().await?;

		let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM jobs WHERE id = ?")
			.bind(id.0)
			.fetch_optional(&mut *tx)
			.await?;
		if exists.is_none() {
			return Err(StatusError::JobNotFound);
		}

		let inserted = sqlx::query(
			r#"
			INSERT INTO job_results (job_id, status, duration_ms, output, reported_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(id.0)
		.bind(result.status.to_string())
		.bind(result.duration_ms.map(|d| d as i64))
		.bind(&output)
		.bind(format_ts(reported_at))
		.execute(&mut *tx)
		.await?;

		// Backfilled results must not move the deadline backwards.
		sqlx::query(
			r#"
			UPDATE jobs
			SET last_reported_at = ?
			WHERE id = ? AND last_reported_at < ?
			"#,
		)
		.bind(format_ts(deadline_from))
		.bind(id.0)
		.bind(format_ts(deadline_from))
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;

		Ok(JobResult {
			id: inserted.last_insert_rowid(),
			job_id: id,
			status: result.status,
			duration_ms: result.duration_ms,
			output,
			reported_at,
		})
	}

	#[instrument(skip(self), fields(job_id = %id))]
	async fn latest_result(&self, id: JobId) -> Result<Option<JobResult>> {
		let row = sqlx::query_as::<_, JobResultRow>(&format!(
			r#"
			SELECT {RESULT_COLUMNS}
			FROM job_results
			WHERE job_id = ?
			ORDER BY reported_at DESC, id DESC
			LIMIT 1
			"#
		))
		.bind(id.0)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self))]
	async fn latest_results(&self) -> Result<HashMap<JobId, JobResult>> {
		let rows = sqlx::query_as::<_, JobResultRow>(&format!(
			r#"
			SELECT {RESULT_COLUMNS}
			FROM job_results r
			WHERE r.id = (
				SELECT r2.id FROM job_results r2
				WHERE r2.job_id = r.job_id
				ORDER BY r2.reported_at DESC, r2.id DESC
				LIMIT 1
			)
			"#
		))
		.fetch_all(&self.pool)
		.await?;

		rows
			.into_iter()
			.map(|row| {
				let result: JobResult = row.try_into()?;
				Ok((result.job_id, result))
			})
			.collect()
	}
}

// Database row types for sqlx

#[derive(sqlx::FromRow)]
struct JobRow {
	id: i64,
	name: String,
	host: String,
	job_key: String,
	labels: String,
	status: String,
	automatic_failure_threshold: i64,
	last_reported_at: String,
	created_at: String,
	updated_at: String,
}

impl TryFrom<JobRow> for Job {
	type Error = StatusError;

	fn try_from(row: JobRow) -> Result<Self> {
		let labels: BTreeMap<String, String> = serde_json::from_str(&row.labels)?;

		Ok(Job {
			id: JobId(row.id),
			name: row.name,
			host: row.host,
			key: row.job_key,
			labels,
			status: row.status.into(),
			automatic_failure_threshold: row.automatic_failure_threshold,
			last_reported_at: parse_ts(&row.last_reported_at, "last_reported_at")?,
			created_at: parse_ts(&row.created_at, "created_at")?,
			updated_at: parse_ts(&row.updated_at, "updated_at")?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct JobResultRow {
	id: i64,
	job_id: i64,
	status: String,
	duration_ms: Option<i64>,
	output: Option<String>,
	reported_at: String,
}

impl TryFrom<JobResultRow> for JobResult {
	type Error = StatusError;

	fn try_from(row: JobResultRow) -> Result<Self> {
		Ok(JobResult {
			id: row.id,
			job_id: JobId(row.job_id),
			status: row
				.status
				.parse()
				.map_err(|_| StatusError::Internal("Invalid result status".to_string()))?,
			duration_ms: row.duration_ms.map(|d| d as u64),
			output: row.output,
			reported_at: parse_ts(&row.reported_at, "reported_at")?,
		})
	}
}
