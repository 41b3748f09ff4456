//! Junction agent - sensing side of the intersection telemetry system
//!
//! Produces vehicle counts for one intersection, either from the motion
//! counter over a directory of frames or from the random simulator, and
//! publishes each count to `<prefix>/<intersection>/counts`.
//!
//! Usage:
//!   junction-agent --simulate --intersection A
//!   junction-agent --camera --frame-dir frames/ --intersection B

use clap::Parser;
use junction_telemetry::infra::{AgentMode, Config};
use junction_telemetry::io::TelemetryPublisher;
use junction_telemetry::services::counter::ImageDirSource;
use junction_telemetry::services::{run_agent, AgentStats, CameraCounter, SimulatedSource};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Junction agent - publishes intersection vehicle counts
#[derive(Parser, Debug)]
#[command(name = "junction-agent", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Publish random counts instead of reading frames
    #[arg(long, conflicts_with = "camera")]
    simulate: bool,

    /// Count vehicles in frames read from --frame-dir
    #[arg(long)]
    camera: bool,

    /// Intersection this agent reports for
    #[arg(short, long)]
    intersection: Option<String>,

    /// Directory of frame images for camera mode
    #[arg(long)]
    frame_dir: Option<String>,

    /// MQTT broker host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        if self.simulate {
            config = config.with_agent_mode(AgentMode::Simulate);
        } else if self.camera {
            config = config.with_agent_mode(AgentMode::Camera);
        }
        if let Some(intersection) = &self.intersection {
            config = config.with_intersection(intersection.as_str());
        }
        if let Some(dir) = &self.frame_dir {
            config = config.with_frame_dir(dir.as_str());
        }
        if self.mqtt_host.is_some() || self.mqtt_port.is_some() {
            let host = self.mqtt_host.clone().unwrap_or_else(|| config.mqtt_host().to_string());
            let port = self.mqtt_port.unwrap_or(config.mqtt_port());
            config = config.with_mqtt_endpoint(host, port);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.apply(Config::load_from_path(&Config::resolve_config_path(
        args.config.as_deref(),
    )));

    info!(
        config_file = %config.config_file(),
        intersection = %config.intersection(),
        mode = ?config.agent_mode(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        build = %env!("JUNCTION_BUILD_ID"),
        "junction-agent starting"
    );

    // Agents need a reachable broker; a failed connect ends the process
    let publisher = TelemetryPublisher::connect(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let stats: AgentStats = match config.agent_mode() {
        AgentMode::Camera => {
            let source = ImageDirSource::open(config.frame_dir())?;
            info!(
                frame_dir = %config.frame_dir(),
                frames = %source.remaining(),
                "camera_source_opened"
            );
            let mut counter = CameraCounter::new(
                source,
                *config.counter(),
                Duration::from_millis(config.frame_interval_ms()),
            );
            run_agent(&mut counter, &publisher, shutdown_rx).await
        }
        AgentMode::Simulate => {
            let period = Duration::from_secs(config.simulate_interval_secs().max(1));
            let mut source = SimulatedSource::new(period);
            run_agent(&mut source, &publisher, shutdown_rx).await
        }
    };

    info!(
        produced = %stats.produced,
        published = %stats.published,
        failed = %stats.failed,
        link = %publisher.status(),
        "junction-agent shutdown complete"
    );
    Ok(())
}
