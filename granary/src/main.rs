// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Granary Server
//!
//! Entry point for the ingestion service. Startup order matters:
//!
//! 1. Parse CLI flags and install the tracing subscriber.
//! 2. Load configuration from the environment (`DATABASE_URL` required).
//! 3. Create/open the database and ensure the schema; failures here are
//!    fatal and exit non-zero.
//! 4. Compose the ingestion system (one per process).
//! 5. Run the recovery pass: reclaim in-flight chunks, re-plan interrupted
//!    files, re-enqueue the durable backlog.
//! 6. Serve HTTP until SIGINT/SIGTERM, then drain workers gracefully.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use granary::application::IngestSystem;
use granary::infrastructure::config::AppConfig;
use granary::infrastructure::repositories::{
    ensure_schema, initialize_database, SqliteIngestRepository,
};
use granary_bootstrap::{shutdown_signal, BootstrapLogger, ConsoleLogger};

#[derive(Parser)]
#[command(name = "granary")]
#[command(about = "Granary - asynchronous CSV ingestion service")]
#[command(version)]
struct Cli {
    /// Override the HTTP bind address (falls back to BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not have seen this; make sure it reaches
            // the operator either way.
            ConsoleLogger::new().error(&format!("{:#}", e));
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::from_env().context("configuration error")?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let pool = initialize_database(&config.database_url)
        .await
        .context("database initialization failed")?;
    ensure_schema(&pool).await.context("schema bootstrap failed")?;

    let repository = Arc::new(SqliteIngestRepository::new(pool));
    let system = IngestSystem::builder(config)
        .repository(repository)
        .build()
        .context("failed to compose ingestion system")?;

    system.recover().await.context("startup recovery failed")?;

    let listener = tokio::net::TcpListener::bind(&system.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", system.config.bind_addr))?;
    info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        workers = system.config.effective_concurrency(),
        chunk_size = %system.config.chunk_size,
        "granary listening"
    );

    axum::serve(listener, system.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped, draining workers");
    system.shutdown().await;
    Ok(())
}
