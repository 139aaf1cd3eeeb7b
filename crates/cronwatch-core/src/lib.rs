// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for cronwatch job monitoring.
//!
//! Externally-run scheduled jobs report execution results; this crate holds
//! the data model those reports populate, the status derivation that turns a
//! job plus its most recent result into a tri-state health value, and the
//! event types streamed to live dashboard clients.

pub mod error;
pub mod event;
pub mod job;
pub mod result;
pub mod status;

pub use error::{CoreError, Result};
pub use event::{
	ConnectionData, HeartbeatData, JobDeletedData, JobSnapshotData, JobStatusData, SessionId,
	StreamEvent,
};
pub use job::{
	validate_label_name, Job, JobFilter, JobId, JobLifecycle, JobUpdate, NewJob,
	DEFAULT_FAILURE_THRESHOLD_SECS, RESERVED_LABELS,
};
pub use result::{truncate_output, JobResult, NewJobResult, ResultStatus, MAX_OUTPUT_BYTES};
pub use status::{evaluate, JobHealth, StatusReason, StatusValue};
