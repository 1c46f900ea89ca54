//! Wires the store, sizer, broker, dispatcher, stream coordinator, and
//! replicator into one running process, and owns graceful shutdown.

use crate::broker::http::{BrokerCredentials, HttpBrokerClient};
use crate::broker::BrokerClient;
use crate::config::Config;
use crate::control::KillSwitch;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::errors::Result;
use crate::model::NormalizedEvent;
use crate::monitoring::{MetricsRegistry, MetricsServer, MetricsServerConfig};
use crate::replicator::{Replicator, ReplicatorConfig};
use crate::sizer::Sizer;
use crate::store::Store;
use crate::stream::{StreamConfig, StreamCoordinator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// A fully constructed, runnable pipeline.
pub struct Orchestrator {
    config: Config,
    store: Store,
    broker: Arc<dyn BrokerClient>,
    kill_switch: KillSwitch,
    metrics: Arc<MetricsRegistry>,
}

impl Orchestrator {
    /// Build every component from configuration. Opens the store and
    /// constructs the HTTP broker client; does not connect the stream yet.
    pub fn build(config: Config) -> Result<Self> {
        let store = Store::open(&config.store_path)?;

        let credentials = BrokerCredentials {
            leader_client_id: config.leader_client_id.clone(),
            leader_access_token: config.leader_access_token.clone(),
            follower_client_id: config.follower_client_id.clone(),
            follower_access_token: config.follower_access_token.clone(),
        };
        let broker: Arc<dyn BrokerClient> = Arc::new(HttpBrokerClient::new(
            config.environment.base_url(),
            credentials,
            config.request_timeout(),
        )?);

        let metrics = Arc::new(MetricsRegistry::default());
        let kill_switch = if config.enable_copy_trading {
            KillSwitch::install()
        } else {
            let ks = KillSwitch::install();
            ks.pause();
            ks
        };

        Ok(Self { config, store, broker, kill_switch, metrics })
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    /// Run the stream coordinator and the replicator loop until shutdown is
    /// requested. Also serves `/metrics` when `metrics_addr` is configured.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::channel::<NormalizedEvent>(1024);

        if let Some(addr) = &self.config.metrics_addr {
            if let Ok(listen_addr) = addr.parse() {
                let server = MetricsServer::new(
                    MetricsServerConfig { listen_addr, metrics_path: "/metrics".to_string() },
                    self.metrics.clone(),
                );
                tokio::spawn(async move {
                    if let Err(e) = server.serve().await {
                        error!("metrics server exited: {e}");
                    }
                });
            } else {
                warn!("invalid METRICS_ADDR {addr}, metrics server disabled");
            }
        }

        let stream_config = StreamConfig {
            url: self.config.environment.stream_url().to_string(),
            access_token: self.config.leader_access_token.clone(),
            health: self.config.health_config(),
            reconnect: self.config.reconnect_config(),
            gap_recovery: self.config.gap_recovery_config(),
            events_buffer: 1024,
        };
        let mut coordinator = StreamCoordinator::new(stream_config, self.broker.clone(), self.store.clone());

        let stream_shutdown = shutdown_rx.clone();
        let stream_task = tokio::spawn(async move { coordinator.run(events_tx, stream_shutdown).await });

        let dispatcher = Dispatcher::new(
            self.broker.clone(),
            self.store.clone(),
            DispatcherConfig {
                rate_limit: self.config.rate_limiter_config(),
                retry: self.config.backoff_config(),
                circuit_breaker: self.config.circuit_breaker_config(),
                request_timeout: self.config.request_timeout(),
            },
        );
        let sizer = Sizer::new(self.config.sizer_config());
        let replicator = Replicator::new(
            ReplicatorConfig { freeze_limit_qty: self.config.freeze_limit_qty, ..ReplicatorConfig::default() },
            self.store.clone(),
            sizer,
            dispatcher,
            self.broker.clone(),
        );

        let kill_switch = self.kill_switch.clone();
        info!("orchestrator running");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                maybe_event = events_rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    if kill_switch.is_paused() {
                        continue;
                    }
                    if let Err(e) = replicator.handle(event).await {
                        error!("replication decision failed: {e}");
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(200)) => {
                    if kill_switch.should_stop() {
                        let _ = shutdown_tx.send(true);
                        break;
                    }
                }
            }
        }

        let _ = shutdown_tx.send(true);
        let stream_result = match stream_task.await {
            Ok(result) => result,
            Err(e) => {
                error!("stream task panicked: {e}");
                Ok(())
            }
        };

        info!("orchestrator stopped");
        stream_result
    }
}
