//! Sensing agent loop - counts in, telemetry out
//!
//! A count source (camera counter or simulator) is drained one count at a
//! time and every count is handed to a sink, normally the MQTT publisher.
//! Publish failures are logged and the sample is skipped; the loop ends
//! when the source ends or shutdown is signalled.

use crate::infra::error::TransportError;
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Integer vehicle count per tick; `None` once the source has ended
#[async_trait]
pub trait CountSource: Send {
    async fn next_count(&mut self) -> Option<u32>;
}

/// Destination for counts produced by an agent
#[async_trait]
pub trait CountSink: Send + Sync {
    async fn send_count(&self, count: u32) -> Result<(), TransportError>;
}

/// Totals for one agent run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub produced: u64,
    pub published: u64,
    pub failed: u64,
}

/// Drive `source` into `sink` until the source ends or shutdown
pub async fn run_agent<S, K>(
    source: &mut S,
    sink: &K,
    mut shutdown: watch::Receiver<bool>,
) -> AgentStats
where
    S: CountSource + ?Sized,
    K: CountSink + ?Sized,
{
    let mut stats = AgentStats::default();
    info!("agent_started");

    loop {
        let count = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("agent_shutdown");
                    break;
                }
                continue;
            }
            next = source.next_count() => match next {
                Some(count) => count,
                None => {
                    info!("count_source_ended");
                    break;
                }
            },
        };

        stats.produced += 1;
        match sink.send_count(count).await {
            Ok(()) => {
                stats.published += 1;
                debug!(count = %count, "count_published");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(error = %e, count = %count, "count_publish_failed");
            }
        }
    }

    info!(
        produced = %stats.produced,
        published = %stats.published,
        failed = %stats.failed,
        "agent_stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedSource(VecDeque<u32>);

    #[async_trait]
    impl CountSource for ScriptedSource {
        async fn next_count(&mut self) -> Option<u32> {
            self.0.pop_front()
        }
    }

    /// Records counts; fails every count listed in `reject`
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<u32>>,
        reject: Vec<u32>,
    }

    #[async_trait]
    impl CountSink for RecordingSink {
        async fn send_count(&self, count: u32) -> Result<(), TransportError> {
            if self.reject.contains(&count) {
                return Err(TransportError::ConnectTimeout {
                    host: "localhost".to_string(),
                    port: 1883,
                    timeout_ms: 10,
                });
            }
            self.sent.lock().push(count);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forwards_every_count_until_source_ends() {
        let mut source = ScriptedSource(VecDeque::from([4, 0, 17]));
        let sink = RecordingSink::default();
        let (_tx, rx) = watch::channel(false);

        let stats = run_agent(&mut source, &sink, rx).await;
        assert_eq!(*sink.sent.lock(), vec![4, 0, 17]);
        assert_eq!(stats, AgentStats { produced: 3, published: 3, failed: 0 });
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_fatal() {
        let mut source = ScriptedSource(VecDeque::from([1, 2, 3]));
        let sink = RecordingSink { reject: vec![2], ..Default::default() };
        let (_tx, rx) = watch::channel(false);

        let stats = run_agent(&mut source, &sink, rx).await;
        assert_eq!(*sink.sent.lock(), vec![1, 3]);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_endless_source() {
        let mut source = crate::services::simulated::SimulatedSource::seeded(
            std::time::Duration::from_secs(3),
            9,
        );
        let sink = RecordingSink::default();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            let _ = tx.send(true);
        });

        let stats = run_agent(&mut source, &sink, rx).await;
        // ticks at 0, 3, 6, 9 seconds
        assert_eq!(stats.produced, 4);
    }
}
