use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use tollgate::config::TollgateConfig;
use tollgate::http::HttpServer;
use tollgate::ratelimit::BucketStore;

/// Interval for the best-effort idle-entry sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Per-client admission control for HTTP APIs")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Tollgate Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration, failing fast on invalid limits
    let config = match args.config {
        Some(path) => TollgateConfig::from_file(&path)?,
        None => TollgateConfig::default(),
    };
    config.rate_limiting.validate()?;
    info!(
        listen_addr = %config.server.listen_addr,
        requests_per_hour = config.rate_limiting.requests_per_hour,
        requests_per_minute = config.rate_limiting.requests_per_minute,
        "Configuration loaded"
    );

    // Initialize the bucket store
    let store = Arc::new(BucketStore::new(
        config.rate_limiting.limits()?,
        config.rate_limiting.max_cache_entries,
        config.rate_limiting.idle_ttl(),
    )?);
    info!("Bucket store initialized");

    // Low-priority sweep of idle client entries. Not required for
    // correctness, only for the memory bound.
    let sweeper = Arc::clone(&store);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.purge_idle(Instant::now());
        }
    });

    // The downstream API is supplied by the embedding application; the
    // binary serves the health route behind the admission layer.
    let server = HttpServer::new(config.server.listen_addr, store, Router::new());

    info!("Starting HTTP server on {}", config.server.listen_addr);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate Admission Control Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
