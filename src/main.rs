//! Junction hub - aggregation side of the intersection telemetry system
//!
//! Subscribes to `<prefix>/+/counts`, keeps the latest reading and active
//! override per intersection, and serves them over HTTP.
//!
//! Module structure:
//! - `domain/` - Readings, overrides, wire messages and topic scheme
//! - `io/` - External interfaces (MQTT ingestion, publisher, HTTP)
//! - `services/` - Aggregation store, counters, agent loop
//! - `infra/` - Infrastructure (Config, Metrics, Broker, errors)

use clap::Parser;
use junction_telemetry::infra::{broker, Config, Metrics};
use junction_telemetry::io::{start_http_server, start_ingestion, HttpState};
use junction_telemetry::services::AggregationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Junction hub - per-intersection count aggregation
#[derive(Parser, Debug)]
#[command(name = "junction-hub", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Default: INFO, use RUST_LOG=debug for per-message visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(build = %env!("JUNCTION_BUILD_ID"), "junction-hub starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        topic_prefix = %config.topic_prefix(),
        broker_embedded = %config.broker_embedded(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    if config.broker_embedded() {
        broker::start_embedded_broker(&config)?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(AggregationStore::new(config.topic_prefix()));
    let metrics = Arc::new(Metrics::new());

    // Ingestion failing to connect leaves the HTTP surface up with an empty store
    let ingestion = match start_ingestion(&config, store.clone(), metrics.clone()).await {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "ingestion_not_started");
            None
        }
    };

    // Metrics reporter
    let reporter_metrics = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => reporter_metrics.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
    });

    let state = Arc::new(HttpState {
        store,
        metrics,
        link: ingestion.as_ref().map(|handle| handle.status_watch()),
        default_issuer: config.default_issuer().to_string(),
    });

    let http_port = config.http_port();
    let http_shutdown = shutdown_rx.clone();
    let mut http_task =
        tokio::spawn(async move { start_http_server(http_port, state, http_shutdown).await });

    // Runs until Ctrl+C, or until the HTTP server fails (e.g. port in use)
    let http_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown_signal_received");
            None
        }
        result = &mut http_task => Some(match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(e.to_string()),
        }),
    };
    let _ = shutdown_tx.send(true);

    if let Some(handle) = ingestion {
        info!(link = %handle.status(), "ingestion_stopping");
        handle.stop();
        if let Err(e) = handle.join().await {
            warn!(error = %e, "ingestion_ended_with_error");
        }
    }

    match http_exit {
        None => {
            let _ = http_task.await;
        }
        Some(Ok(())) => {}
        Some(Err(reason)) => {
            error!(error = %reason, "http_server_failed");
            return Err(format!("http server failed: {reason}").into());
        }
    }

    info!("junction-hub shutdown complete");
    Ok(())
}
