//! Transit analytics API server
//!
//! Module structure:
//! - `domain/` - Routes, events, telemetry samples, geodesy
//! - `services/` - Validation, stores, aggregation, retention
//! - `io/` - HTTP API, Prometheus exposition, API client
//! - `infra/` - Config, clock, metrics, SQLite store
//! - `tracker/` - Client-side offline event buffer

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use transit_analytics::infra::{Config, Metrics, Store, SystemClock};
use transit_analytics::io::{start_api_server, AppState};
use transit_analytics::services::RetentionSweeper;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Transit analytics - route catalog, usage events and vehicle telemetry API
#[derive(Parser, Debug)]
#[command(name = "transit-analytics", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-request logs
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "transit-analytics starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        database_url = %config.database_url(),
        events_retention_days = %config.events_retention_days(),
        metrics_retention_days = %config.metrics_retention_days(),
        "config_loaded"
    );

    let store = Store::open(config.database_url())
        .with_context(|| format!("Failed to open store at {}", config.database_url()))?;

    let addr: SocketAddr = format!("{}:{}", config.bind_address(), config.port())
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address(), config.port()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new());

    // Retention sweeper
    let sweeper = RetentionSweeper::new(
        store.clone(),
        clock.clone(),
        metrics.clone(),
        config.events_retention_days(),
        config.metrics_retention_days(),
    );
    tokio::spawn(sweeper.run(Duration::from_secs(config.sweep_interval_secs()), shutdown_rx.clone()));

    // Periodic metrics summary in the log
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(METRICS_LOG_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.snapshot().log();
        }
    });

    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    let state = AppState::new(store, clock, metrics.clone());
    if let Err(e) = start_api_server(addr, state, shutdown_rx).await {
        error!(addr = %addr, error = %e, "api_server_error");
        return Err(e).with_context(|| format!("API server on {addr} failed"));
    }

    metrics.snapshot().log();
    info!("transit-analytics shutdown complete");
    Ok(())
}
