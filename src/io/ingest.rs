//! Telemetry ingestion task
//!
//! One supervised task owns the channel subscription and applies every
//! inbound message to the store in arrival order. Decode failures drop the
//! message and continue; a transport failure after start marks the link
//! disconnected and ends the task (no reconnect).

use crate::domain::topic::counts_filter;
use crate::domain::types::LinkStatus;
use crate::infra::config::Config;
use crate::infra::error::TransportError;
use crate::infra::metrics::Metrics;
use crate::io::mqtt;
use crate::services::store::AggregationStore;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Apply one inbound message; never fails past this boundary
pub fn handle_publish(store: &AggregationStore, metrics: &Metrics, topic: &str, payload: &[u8]) {
    metrics.record_message_received();

    match store.apply_reading(topic, payload) {
        Ok(applied) => {
            metrics.record_reading_applied();
            if applied.unknown_topic {
                metrics.record_unknown_topic();
                warn!(topic = %topic, "topic_unknown_intersection");
            }
            debug!(
                intersection = %applied.reading.intersection_id,
                count = %applied.reading.count,
                "reading_applied"
            );
        }
        Err(e) => {
            metrics.record_decode_error();
            warn!(
                topic = %topic,
                intersection = %e.intersection(),
                error = %e,
                "payload_decode_failed"
            );
        }
    }
}

/// Handle to the running ingestion task
pub struct IngestionHandle {
    status: watch::Receiver<LinkStatus>,
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<(), TransportError>>,
}

impl IngestionHandle {
    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    /// Receiver that follows link status changes
    pub fn status_watch(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Ask the task to unsubscribe and exit
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait for the task; returns the transport error that ended it, if any
    pub async fn join(self) -> Result<(), TransportError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "ingestion_task_panicked");
                Ok(())
            }
        }
    }
}

/// Connect, subscribe and spawn the ingestion task
///
/// The initial connect is bounded by the configured timeout. If it fails the
/// task is not started and the error is returned to the caller.
pub async fn start_ingestion(
    config: &Config,
    store: Arc<AggregationStore>,
    metrics: Arc<Metrics>,
) -> Result<IngestionHandle, TransportError> {
    let filter = counts_filter(config.topic_prefix());
    let (client, eventloop) = mqtt::connect(config, &mqtt::client_id("hub")).await?;

    client
        .subscribe(filter.as_str(), QoS::AtMostOnce)
        .await
        .map_err(|source| TransportError::Subscribe { filter: filter.clone(), source })?;

    let (status_tx, status_rx) = watch::channel(LinkStatus::Connected);
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(filter = %filter, "ingestion_started");
    let task = tokio::spawn(ingest_loop(client, eventloop, store, metrics, status_tx, stop_rx));

    Ok(IngestionHandle { status: status_rx, stop: stop_tx, task })
}

async fn ingest_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    store: Arc<AggregationStore>,
    metrics: Arc<Metrics>,
    status: watch::Sender<LinkStatus>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), TransportError> {
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("ingestion_shutdown");
                    let _ = client.try_disconnect();
                    let _ = status.send(LinkStatus::Disconnected);
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_publish(&store, &metrics, &publish.topic, &publish.payload);
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        info!("ingestion_subscribed");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("ingestion_broker_disconnect");
                        let _ = status.send(LinkStatus::Disconnected);
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "ingestion_connection_lost");
                        let _ = status.send(LinkStatus::Disconnected);
                        return Err(e.into());
                    }
                }
            }
        }
    }
}
