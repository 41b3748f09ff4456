//! Telemetry publisher for sensing agents
//!
//! Wraps each count as a `CountMessage` stamped with the current time and
//! publishes it at QoS 0 on `<prefix>/<intersection>/counts`. Nothing is
//! acknowledged and nothing is retried; a failed publish is returned to the
//! caller.

use crate::domain::topic::counts_topic;
use crate::domain::types::{CountMessage, LinkStatus};
use crate::infra::config::Config;
use crate::infra::error::TransportError;
use crate::io::mqtt;
use crate::services::agent::CountSink;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Packet, QoS};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct TelemetryPublisher {
    client: AsyncClient,
    intersection: String,
    topic: String,
    status: watch::Receiver<LinkStatus>,
}

impl TelemetryPublisher {
    /// Connect (bounded by the configured timeout) and start the event loop driver
    pub async fn connect(config: &Config) -> Result<Self, TransportError> {
        let (client, mut eventloop) = mqtt::connect(config, &mqtt::client_id("agent")).await?;
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connected);

        // The event loop must be polled for queued publishes to reach the
        // socket. It stops on the first connection error; later publishes
        // then fail because the request channel is closed.
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(outgoing)) => {
                        debug!(packet = ?outgoing, "mqtt_publisher_outgoing");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("mqtt_publisher_broker_disconnect");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_publisher_connection_lost");
                        break;
                    }
                }
            }
            // Close the request channel first so publishes fail from here on
            drop(eventloop);
            let _ = status_tx.send(LinkStatus::Disconnected);
        });

        let intersection = config.intersection().to_string();
        let topic = counts_topic(config.topic_prefix(), &intersection);
        info!(topic = %topic, "publisher_ready");

        Ok(Self { client, intersection, topic, status: status_rx })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// `Disconnected` once the event loop driver has stopped
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Stamp, encode and publish one count
    pub async fn publish(&self, count: u32) -> Result<CountMessage, TransportError> {
        let message = CountMessage::now(&self.intersection, count);
        let payload = message.encode()?;

        self.client
            .publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
            .await
            .map_err(|source| TransportError::Publish { topic: self.topic.clone(), source })?;

        debug!(topic = %self.topic, count = %count, "published");
        Ok(message)
    }
}

#[async_trait]
impl CountSink for TelemetryPublisher {
    async fn send_count(&self, count: u32) -> Result<(), TransportError> {
        self.publish(count).await.map(|_| ())
    }
}
