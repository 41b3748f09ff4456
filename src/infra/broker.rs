//! Embedded MQTT broker using rumqttd
//!
//! Lets a hub run without an external broker. Sensing agents then point
//! their `[mqtt]` host at the hub.

use crate::infra::config::Config as AppConfig;
use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Count payloads are tiny; keep the limits small
const MAX_PAYLOAD_SIZE: usize = 16 * 1024;
const MAX_CONNECTIONS: usize = 1024;

fn broker_config(listen: SocketAddr) -> Config {
    let router = RouterConfig {
        max_segment_size: 10 * 1024 * 1024,
        max_segment_count: 4,
        max_connections: MAX_CONNECTIONS,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let server = ServerSettings {
        name: "v4".to_string(),
        listen,
        tls: None,
        next_connection_delay_ms: 1,
        connections: ConnectionSettings {
            connection_timeout_ms: 5000,
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_inflight_count: 100,
            auth: None,
            dynamic_filters: false,
            external_auth: None,
        },
    };

    Config {
        id: 0,
        router,
        v4: Some(HashMap::from([("v4".to_string(), server)])),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded broker on a dedicated thread
///
/// `Broker::start` blocks for the life of the broker, so it gets its own
/// OS thread rather than a tokio task.
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen: SocketAddr =
        addr.parse().with_context(|| format!("invalid broker bind address {addr}"))?;

    let config = broker_config(listen);
    thread::Builder::new()
        .name("mqtt-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("failed to spawn broker thread")?;

    // Give the listener a moment before local clients connect
    thread::sleep(std::time::Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    Ok(())
}
