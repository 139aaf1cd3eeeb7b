// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! cronwatch server binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cronwatch_server::{create_app_state, create_router, shutdown};
use cronwatch_server_config::{LogFormat, LoggingConfig};
use cronwatch_server_status::DeadlineWatcher;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// cronwatch server - status export and live events for scheduled jobs.
#[derive(Parser, Debug)]
#[command(name = "cronwatch-server", about = "Cron job status monitor", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/cronwatch/server.toml)
	#[arg(long, env = "CRONWATCH_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);

	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("cronwatch-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => cronwatch_server_config::load_config_with_file(path)?,
		None => cronwatch_server_config::load_config()?,
	};

	init_tracing(&config.logging);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting cronwatch-server"
	);

	let pool = cronwatch_server::db::create_pool(&config.database.url).await?;
	cronwatch_server::db::run_migrations(&pool).await?;

	let state = create_app_state(pool.clone(), &config.events)?;
	let broadcaster = state.broadcaster.clone();

	let shutdown = shutdown::install_shutdown_handler()?;

	let watcher = DeadlineWatcher::new(
		state.repo.clone(),
		broadcaster.clone(),
		config.monitoring.deadline_check_interval(),
	)
	.spawn(shutdown.clone());

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	tracing::info!("listening on {}", addr);

	// Open event streams never finish on their own, so close them as soon as
	// the signal arrives instead of waiting for the server to drain.
	let stream_closer = {
		let shutdown = shutdown.clone();
		let broadcaster = broadcaster.clone();
		tokio::spawn(async move {
			shutdown.cancelled().await;
			tracing::info!("Shutting down event broadcaster...");
			broadcaster.shutdown().await;
		})
	};

	let server_shutdown = shutdown.clone();
	if let Err(e) = axum::serve(listener, app)
		.with_graceful_shutdown(async move { server_shutdown.cancelled().await })
		.await
	{
		tracing::error!(error = %e, "Server error");
	}

	shutdown.cancel();
	if let Err(e) = stream_closer.await {
		tracing::warn!(error = %e, "Broadcaster shutdown task failed");
	}
	if let Err(e) = watcher.await {
		tracing::warn!(error = %e, "Deadline watcher ended abnormally");
	}
	pool.close().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}
