// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for cronwatch core.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating or parsing core types.
#[derive(Debug, Error)]
pub enum CoreError {
	#[error("job name must not be empty")]
	EmptyName,

	#[error("job host must not be empty")]
	EmptyHost,

	#[error("job status must not be empty")]
	EmptyStatus,

	#[error("invalid label name: {0}")]
	InvalidLabelName(String),

	#[error("reserved label name: {0}")]
	ReservedLabelName(String),

	#[error("unknown result status: {0}")]
	UnknownResultStatus(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}
