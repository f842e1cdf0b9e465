//! bkmk-ingest - Bookmark ingest service
//!
//! Polls the bookmark source, runs every new item through triage, enrichment and
//! analysis, and records the outcome in the SQLite ledger. A weekly digest
//! summarizes what was processed.
//!
//! Subcommands:
//! - `run` (default): scheduler plus the `/health` and `/stats` HTTP API
//! - `once`: a single batch pass
//! - `digest`: send the weekly digest now
//! - `health`: open the ledger read-only and print the handled count

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bkmk_common::config::{
    load_toml_config, prepare_root_folder, resolve_root_folder, TomlConfig,
};
use bkmk_common::db::{init_database, open_database_readonly, DatabaseOptions};
use bkmk_common::events::EventBus;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use bkmk_ingest::app::{build_ledger, build_notifier, build_scheduler, EVENT_BUS_CAPACITY};
use bkmk_ingest::config::IngestConfig;
use bkmk_ingest::db::Ledger;
use bkmk_ingest::services::digest::send_weekly_digest;
use bkmk_ingest::services::TickOutcome;
use bkmk_ingest::{build_router, AppState};

const ROOT_FOLDER_ENV: &str = "BKMK_ROOT_FOLDER";

#[derive(Parser, Debug)]
#[command(name = "bkmk-ingest")]
#[command(about = "Bookmark ingest pipeline")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long, env = "BKMK_CONFIG")]
    config: Option<PathBuf>,

    /// Data folder holding bkmk.db (falls back to BKMK_ROOT_FOLDER, then TOML)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the scheduler and HTTP API until Ctrl-C
    Run,
    /// Run a single batch pass and exit
    Once,
    /// Send the weekly digest now
    Digest,
    /// Print the ledger's handled count; non-zero exit if it cannot be opened
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = load_toml_config(cli.config.as_deref());
    let log_level = toml_config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    info!(
        "Starting bkmk-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let toml_config = toml_config.context("Failed to load configuration")?;
    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Health => health(root_folder).await,
        Command::Digest => {
            let (config, pool) = open_service(&toml_config, &root_folder).await?;
            let events = EventBus::new(EVENT_BUS_CAPACITY);
            let ledger = build_ledger(pool, &config);
            let notifier = build_notifier(&config)?;
            let stats = send_weekly_digest(&ledger, &notifier, &events, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Once => {
            let (config, pool) = open_service(&toml_config, &root_folder).await?;
            let cancel = CancellationToken::new();
            let scheduler = build_scheduler(
                pool,
                &config,
                EventBus::new(EVENT_BUS_CAPACITY),
                cancel.clone(),
            )?;
            spawn_ctrl_c(cancel);

            scheduler.startup().await?;
            match scheduler.tick().await {
                TickOutcome::Ran(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    Ok(())
                }
                TickOutcome::Failed(kind) => {
                    let status = scheduler.status().await;
                    anyhow::bail!(
                        "Pass failed ({}): {}",
                        kind,
                        status.last_error.unwrap_or_default()
                    )
                }
                other => {
                    warn!(?other, "Pass did not run");
                    Ok(())
                }
            }
        }
        Command::Run => {
            let (config, pool) = open_service(&toml_config, &root_folder).await?;
            run(pool, &config).await
        }
    }
}

/// Validated runtime settings and the writable ledger pool
async fn open_service(
    toml_config: &TomlConfig,
    root_folder: &Path,
) -> Result<(IngestConfig, sqlx::SqlitePool)> {
    let config = IngestConfig::from_toml(toml_config).context("Invalid configuration")?;
    let db_path = prepare_root_folder(root_folder)?;
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path, &DatabaseOptions::default())
        .await
        .context("Failed to open ledger database")?;
    Ok((config, pool))
}

/// Read-only ledger probe
async fn health(root_folder: PathBuf) -> Result<()> {
    let db_path = root_folder.join(bkmk_common::config::DATABASE_FILE_NAME);
    let pool = open_database_readonly(&db_path)
        .await
        .with_context(|| format!("Cannot open ledger at {}", db_path.display()))?;

    let handled = Ledger::new(pool)
        .handled_count()
        .await
        .context("Cannot read ledger")?;
    println!("ok: {} items handled ({})", handled, db_path.display());
    Ok(())
}

async fn run(pool: sqlx::SqlitePool, config: &IngestConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let scheduler = build_scheduler(
        pool,
        config,
        EventBus::new(EVENT_BUS_CAPACITY),
        cancel.clone(),
    )?;

    scheduler.startup().await?;
    spawn_ctrl_c(cancel.clone());

    let state = AppState::new(scheduler.orchestrator().ledger().clone(), scheduler.clone());
    let app = build_router(state);

    let bind = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    let scheduler_task = tokio::spawn(scheduler.clone().run());

    let server_cancel = cancel.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await });
    if let Err(e) = server.await {
        error!(error = %e, "HTTP server failed");
        cancel.cancel();
    }

    match scheduler_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e).context("Scheduler failed"),
        Err(e) => return Err(e).context("Scheduler task panicked"),
    }

    info!("bkmk-ingest stopped");
    Ok(())
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down after the current item");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
