// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server for cronwatch.
//!
//! Serves the Prometheus job status exposition, the live job event stream,
//! and the job management and result reporting API.

pub mod api;
pub mod db;
pub mod error;
pub mod routes;
pub mod shutdown;

pub use api::{broadcaster_config, create_app_state, create_router, AppState};
pub use error::{ErrorResponse, ServerError};
