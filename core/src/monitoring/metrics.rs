//! Prometheus metrics for the replication pipeline.
//!
//! Groups mirror the components in [`crate::replicator`], [`crate::dispatcher`],
//! and [`crate::stream`]: replication decisions and mapping outcomes, dispatcher
//! rate-limit/retry/circuit-breaker activity, and stream health/reconnect/gap
//! statistics.

use prometheus::{Counter, Gauge, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    replication: Arc<ReplicationMetrics>,
    dispatcher: Arc<DispatcherMetrics>,
    stream: Arc<StreamMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let replication = Arc::new(ReplicationMetrics::new(&registry)?);
        let dispatcher = Arc::new(DispatcherMetrics::new(&registry)?);
        let stream = Arc::new(StreamMetrics::new(&registry)?);

        info!("metrics registry initialized");

        Ok(Self { registry, replication, dispatcher, stream })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn replication(&self) -> &ReplicationMetrics {
        &self.replication
    }

    pub fn dispatcher(&self) -> &DispatcherMetrics {
        &self.dispatcher
    }

    pub fn stream(&self) -> &StreamMetrics {
        &self.stream
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("failed to create metrics registry: {}", e);
            panic!("cannot create metrics registry")
        })
    }
}

/// Replicator decision and correspondence-map outcome counters.
pub struct ReplicationMetrics {
    pub decisions_total: IntCounterVec,
    pub mappings_placed_total: Counter,
    pub mappings_failed_total: IntCounterVec,
    pub oco_cancels_total: Counter,
    pub oco_ambiguous_total: Counter,
    pub reconciliation_drift_total: Counter,
    pub watermark_ts: Gauge,
}

impl ReplicationMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let decisions_total = IntCounterVec::new(
            Opts::new("replication_decisions_total", "Replicator decisions by event kind").namespace("copytrader"),
            &["kind"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let mappings_placed_total =
            Counter::new("copytrader_replication_mappings_placed_total", "Correspondence mappings that reached placed")?;
        registry.register(Box::new(mappings_placed_total.clone()))?;

        let mappings_failed_total = IntCounterVec::new(
            Opts::new("replication_mappings_failed_total", "Correspondence mappings that reached failed, by reason kind").namespace("copytrader"),
            &["reason"],
        )?;
        registry.register(Box::new(mappings_failed_total.clone()))?;

        let oco_cancels_total = Counter::new("copytrader_replication_oco_cancels_total", "OCO sibling-leg cancels issued")?;
        registry.register(Box::new(oco_cancels_total.clone()))?;

        let oco_ambiguous_total = Counter::new("copytrader_replication_oco_ambiguous_total", "Executed legs that could not be matched to the leg graph")?;
        registry.register(Box::new(oco_ambiguous_total.clone()))?;

        let reconciliation_drift_total = Counter::new("copytrader_replication_reconciliation_drift_total", "Drift reconciliation mismatches beyond max_mismatch")?;
        registry.register(Box::new(reconciliation_drift_total.clone()))?;

        let watermark_ts = Gauge::new("copytrader_replication_watermark_timestamp", "Current durable watermark (last_leader_event_ts)")?;
        registry.register(Box::new(watermark_ts.clone()))?;

        Ok(Self { decisions_total, mappings_placed_total, mappings_failed_total, oco_cancels_total, oco_ambiguous_total, reconciliation_drift_total, watermark_ts })
    }
}

/// Dispatcher rate-limit, retry, and circuit-breaker activity.
pub struct DispatcherMetrics {
    pub commands_total: IntCounterVec,
    pub rate_limit_rejections_total: Counter,
    pub retries_total: Counter,
    pub circuit_open_total: Counter,
    pub circuit_state: IntGauge,
}

impl DispatcherMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let commands_total = IntCounterVec::new(
            Opts::new("dispatcher_commands_total", "Dispatcher commands issued, by action and outcome").namespace("copytrader"),
            &["action", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let rate_limit_rejections_total = Counter::new("copytrader_dispatcher_rate_limit_rejections_total", "Commands that exhausted the rate-limit wait deadline")?;
        registry.register(Box::new(rate_limit_rejections_total.clone()))?;

        let retries_total = Counter::new("copytrader_dispatcher_retries_total", "Retry attempts issued for transient failures")?;
        registry.register(Box::new(retries_total.clone()))?;

        let circuit_open_total = Counter::new("copytrader_dispatcher_circuit_open_total", "Times the circuit breaker tripped open")?;
        registry.register(Box::new(circuit_open_total.clone()))?;

        let circuit_state = IntGauge::new("copytrader_dispatcher_circuit_state", "Circuit breaker state (0=closed, 1=open, 2=half-open)")?;
        registry.register(Box::new(circuit_state.clone()))?;

        Ok(Self { commands_total, rate_limit_rejections_total, retries_total, circuit_open_total, circuit_state })
    }
}

/// Stream coordinator health and reconnect statistics.
pub struct StreamMetrics {
    pub connection_state: IntGauge,
    pub reconnects_total: Counter,
    pub gaps_detected_total: Counter,
    pub events_replayed_total: Counter,
    pub heartbeat_age_seconds: Gauge,
}

impl StreamMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let connection_state = IntGauge::new("copytrader_stream_connection_state", "Stream connection state (0=disconnected..5=failed)")?;
        registry.register(Box::new(connection_state.clone()))?;

        let reconnects_total = Counter::new("copytrader_stream_reconnects_total", "Successful stream reconnections")?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let gaps_detected_total = Counter::new("copytrader_stream_gaps_detected_total", "Sequence gaps detected across all order ids")?;
        registry.register(Box::new(gaps_detected_total.clone()))?;

        let events_replayed_total = Counter::new("copytrader_stream_events_replayed_total", "Events replayed by gap recovery")?;
        registry.register(Box::new(events_replayed_total.clone()))?;

        let heartbeat_age_seconds = Gauge::new("copytrader_stream_heartbeat_age_seconds", "Seconds since the last inbound stream message")?;
        registry.register(Box::new(heartbeat_age_seconds.clone()))?;

        Ok(Self { connection_state, reconnects_total, gaps_detected_total, events_replayed_total, heartbeat_age_seconds })
    }
}
