// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod database;
mod events;
mod http;
mod logging;
mod monitoring;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use events::{EventsConfig, EventsConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use monitoring::{MonitoringConfig, MonitoringConfigLayer};
