//! Live leader order-event feed: connect, normalize, detect gaps, recover,
//! hand events to the replicator.

pub mod gap_detector;
pub mod gap_recovery;
pub mod health;
pub mod reconnect;

use crate::broker::stream::BrokerEventStream;
use crate::broker::BrokerClient;
use crate::errors::{ErrorKind, ReplicationError, Result};
use crate::model::{AccountRole, EventKind, NormalizedEvent};
use crate::store::Store;
use gap_detector::GapDetector;
use gap_recovery::{GapRecoveryConfig, GapRecoveryManager};
use health::{FeedHealth, HealthConfig, HealthStatus};
use reconnect::{ConnectionState, ReconnectConfig, ReconnectTracker};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Configuration for the stream coordinator.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub access_token: String,
    pub health: HealthConfig,
    pub reconnect: ReconnectConfig,
    pub gap_recovery: GapRecoveryConfig,
    pub events_buffer: usize,
}

/// Maintains the leader feed connection and emits normalized events onto a
/// bounded channel the replicator consumes.
pub struct StreamCoordinator {
    config: StreamConfig,
    broker: Arc<dyn BrokerClient>,
    store: Store,
    health: FeedHealth,
    reconnect: ReconnectTracker,
    gap_recovery: GapRecoveryManager,
    sequences: HashMap<String, GapDetector>,
}

impl StreamCoordinator {
    pub fn new(config: StreamConfig, broker: Arc<dyn BrokerClient>, store: Store) -> Self {
        let health = FeedHealth::new(config.health.clone());
        let reconnect = ReconnectTracker::new(config.reconnect.clone());
        let gap_recovery = GapRecoveryManager::new(config.gap_recovery.clone());
        Self { config, broker, store, health, reconnect, gap_recovery, sequences: HashMap::new() }
    }

    pub fn health_status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.reconnect.state()
    }

    /// Run the coordinator until `shutdown` is signalled, pushing normalized
    /// events onto `tx`. Reconnects with backoff on disconnect; runs gap
    /// recovery whenever a reconnect follows a degraded or disconnected
    /// period.
    pub async fn run(&mut self, tx: mpsc::Sender<NormalizedEvent>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let mut was_degraded = false;

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            self.reconnect.mark_connecting();
            self.health.mark_connected();

            let mut socket = match BrokerEventStream::connect(&self.config.url, &self.config.access_token).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("stream connect failed: {e}");
                    self.reconnect.mark_failed_attempt();
                    if self.reconnect.wait_before_retry().await.is_none() {
                        error!("stream reconnect attempts exhausted");
                        return Err(ReplicationError::new(ErrorKind::Stream, "reconnect attempts exhausted"));
                    }
                    continue;
                }
            };

            self.reconnect.mark_live();

            if was_degraded {
                if let Err(e) = self.recover_gap(&tx).await {
                    warn!("gap recovery failed after reconnect: {e}");
                }
            }
            was_degraded = false;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            let _ = socket.close().await;
                            return Ok(());
                        }
                    }
                    frame = socket.next_event() => {
                        match frame {
                            Ok(Some(raw)) => {
                                self.health.report_message();
                                if let Some(event) = self.normalize(raw) {
                                    if tx.send(event).await.is_err() {
                                        return Ok(());
                                    }
                                }
                            }
                            Ok(None) => {
                                warn!("stream closed by broker");
                                break;
                            }
                            Err(e) => {
                                error!("stream read error: {e}");
                                break;
                            }
                        }
                    }
                }

                if self.health.status() == HealthStatus::Degraded {
                    self.reconnect.mark_degraded();
                    was_degraded = true;
                    break;
                }
            }

            if *shutdown.borrow() {
                return Ok(());
            }
            self.reconnect.mark_failed_attempt();
            if self.reconnect.wait_before_retry().await.is_none() {
                error!("stream reconnect attempts exhausted");
                return Err(ReplicationError::new(ErrorKind::Stream, "reconnect attempts exhausted"));
            }
        }
    }

    async fn recover_gap(&mut self, tx: &mpsc::Sender<NormalizedEvent>) -> Result<u64> {
        let watermark = self.store.get_watermark()?;
        let broker = self.broker.clone();
        let tx = tx.clone();
        self.gap_recovery
            .recover(
                watermark,
                || {
                    let broker = broker.clone();
                    async move { broker.order_list(AccountRole::Leader).await }
                },
                |event| {
                    tx.try_send(event).map_err(|e| ReplicationError::stream(format!("event queue full during recovery: {e}")))
                },
            )
            .await
    }

    /// Map a raw broker payload to a normalized event, assigning a
    /// per-order sequence if the broker stream doesn't supply one.
    fn normalize(&mut self, raw: Value) -> Option<NormalizedEvent> {
        let order_id = raw.get("orderId")?.as_str()?.to_string();
        let status = raw.get("orderStatus").and_then(|v| v.as_str()).unwrap_or("");
        let created_at_ts = raw.get("createTime").and_then(|v| v.as_i64()).unwrap_or_else(|| chrono::Utc::now().timestamp());

        let detector = self.sequences.entry(order_id.clone()).or_default();
        let sequence = match raw.get("sequence").and_then(|v| v.as_u64()) {
            Some(seq) => {
                detector.check(seq);
                seq
            }
            None => {
                let next = detector.last_sequence() + if detector.is_ready() { 1 } else { 0 };
                detector.check(next);
                next
            }
        };

        Some(NormalizedEvent { order_id, sequence, kind: EventKind::classify(status), payload: raw, created_at_ts })
    }

    pub fn reconnect_stats(&self) -> &reconnect::ReconnectionStats {
        self.reconnect.stats()
    }

    pub fn gap_recovery_stats(&self) -> &gap_recovery::GapRecoveryStats {
        self.gap_recovery.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_assigns_sequence_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("t.db")).unwrap();
        let broker = Arc::new(crate::broker::mock::MockBroker::new());
        let config = StreamConfig {
            url: "ws://localhost".into(),
            access_token: "tok".into(),
            health: HealthConfig::default(),
            reconnect: ReconnectConfig::default(),
            gap_recovery: GapRecoveryConfig::default(),
            events_buffer: 64,
        };
        let mut coordinator = StreamCoordinator::new(config, broker, store);

        let e1 = coordinator.normalize(serde_json::json!({"orderId": "L1", "orderStatus": "open"})).unwrap();
        let e2 = coordinator.normalize(serde_json::json!({"orderId": "L1", "orderStatus": "modified"})).unwrap();
        assert_eq!(e1.sequence, 0);
        assert_eq!(e2.sequence, 1);
    }

    #[test]
    fn normalize_trusts_explicit_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("t.db")).unwrap();
        let broker = Arc::new(crate::broker::mock::MockBroker::new());
        let config = StreamConfig {
            url: "ws://localhost".into(),
            access_token: "tok".into(),
            health: HealthConfig::default(),
            reconnect: ReconnectConfig::default(),
            gap_recovery: GapRecoveryConfig::default(),
            events_buffer: 64,
        };
        let mut coordinator = StreamCoordinator::new(config, broker, store);

        let event = coordinator.normalize(serde_json::json!({"orderId": "L1", "orderStatus": "open", "sequence": 7})).unwrap();
        assert_eq!(event.sequence, 7);
    }
}
