//! Packed Content Verifier (pcv-server) - Main entry point
//!
//! Serves the upload page and history API, and runs the verification
//! workers that expand, fingerprint and score uploaded files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcv_common::config::{load_toml_config, resolve_root_folder, RootFolderInitializer};
use pcv_common::db::init_database;
use pcv_server::config::ServiceConfig;
use pcv_server::content::FsContentStore;
use pcv_server::{build_router, AppState};

/// Command-line arguments for pcv-server
#[derive(Parser, Debug)]
#[command(name = "pcv-server")]
#[command(about = "Packed content verification service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and stored uploads
    #[arg(short, long, env = "PCV_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "PCV_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config file)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        load_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting pcv-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut config =
        ServiceConfig::from_toml(&toml_config).context("Invalid pipeline configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to prepare root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let db_pool = init_database(&initializer.database_path())
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", initializer.database_path().display());

    let content = Arc::new(FsContentStore::new(initializer.blob_path()));
    let state = AppState::new(db_pool, content, config);

    // Jobs a previous process was running when it stopped
    let recovered = state
        .queue
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted jobs")?;
    if recovered > 0 {
        info!("Recovered {} interrupted verification jobs", recovered);
    }

    info!(
        expected_fingerprint = %state.config.pipeline.expected_fingerprint,
        delay_ms = state.config.pipeline.verification_delay_ms,
        workers = state.config.pipeline.worker_count,
        "Verification pipeline configured"
    );
    let workers = state.spawn_workers();

    let bind_address = state.config.bind_address.clone();
    let app = build_router(state);

    info!("Starting HTTP server on {}", bind_address);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    workers.shutdown().await;
    served?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
