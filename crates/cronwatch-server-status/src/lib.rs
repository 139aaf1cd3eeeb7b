// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-side status export and live event streaming for cronwatch.
//!
//! This crate provides:
//! - Job storage behind the [`JobRepository`] trait, backed by SQLite
//! - Prometheus text exposition of job health
//! - The [`EventBroadcaster`] that fans job events out to stream subscribers
//! - [`JobNotifier`] and [`DeadlineWatcher`], which feed the broadcaster

pub mod broadcast;
pub mod error;
pub mod exposition;
pub mod metrics;
pub mod notify;
pub mod repository;
pub mod session;
pub mod watcher;

pub use broadcast::{BroadcasterConfig, EventBroadcaster};
pub use error::{Result, StatusError};
pub use exposition::{render, render_from_repository, CONTENT_TYPE};
pub use metrics::{BroadcasterMetrics, DropStage, EvictReason};
pub use notify::{JobNotification, JobNotifier};
pub use repository::{run_migrations, JobRepository, SqliteJobRepository};
pub use session::SubscriberSession;
pub use watcher::DeadlineWatcher;
