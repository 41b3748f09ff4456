//! MQTT connection setup shared by the ingestion task and the publisher

use crate::infra::config::Config;
use crate::infra::error::TransportError;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use std::time::Duration;
use tracing::{debug, info};

/// Request channel capacity between client handles and the event loop
const REQUEST_CAPACITY: usize = 100;

/// Build client options from config
pub fn mqtt_options(config: &Config, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs().max(1)));
    options.set_clean_session(true);

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        options.set_credentials(username, password);
    }
    options
}

/// Open a connection and wait for the broker's CONNACK
///
/// Bounded by `connect_timeout_ms`. On failure nothing is left running.
pub async fn connect(
    config: &Config,
    client_id: &str,
) -> Result<(AsyncClient, EventLoop), TransportError> {
    let options = mqtt_options(config, client_id);
    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let timeout_ms = config.connect_timeout_ms();

    let handshake = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(code = ?ack.code, "mqtt_connack");
                    return Ok(());
                }
                Ok(_) => {}
                Err(source) => return Err(source),
            }
        }
    };

    let result = tokio::time::timeout(Duration::from_millis(timeout_ms), handshake).await;
    match result {
        Ok(Ok(())) => {
            info!(
                client_id = %client_id,
                host = %config.mqtt_host(),
                port = %config.mqtt_port(),
                "mqtt_connected"
            );
            Ok((client, eventloop))
        }
        Ok(Err(source)) => Err(TransportError::Connect {
            host: config.mqtt_host().to_string(),
            port: config.mqtt_port(),
            source,
        }),
        Err(_) => Err(TransportError::ConnectTimeout {
            host: config.mqtt_host().to_string(),
            port: config.mqtt_port(),
            timeout_ms,
        }),
    }
}

/// Client id unique to this process and role
pub fn client_id(role: &str) -> String {
    format!("junction-{role}-{}", std::process::id())
}
