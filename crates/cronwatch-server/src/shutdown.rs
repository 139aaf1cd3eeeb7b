// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process signal handling.

use tokio_util::sync::CancellationToken;

/// Install a handler for SIGTERM and SIGINT.
///
/// The returned token is cancelled when either signal arrives. Every
/// background task and the HTTP server watch this token.
#[cfg(unix)]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
	use tokio::signal::unix::{signal, SignalKind};

	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigint = signal(SignalKind::interrupt())?;

	let token = CancellationToken::new();
	let trigger = token.clone();
	tokio::spawn(async move {
		tokio::select! {
			_ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
			_ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown"),
		}
		trigger.cancel();
	});

	Ok(token)
}

#[cfg(not(unix))]
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
	let token = CancellationToken::new();
	let trigger = token.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => tracing::info!("Received Ctrl-C, initiating graceful shutdown"),
			Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
		}
		trigger.cancel();
	});
	Ok(token)
}
