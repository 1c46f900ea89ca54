//! Rate-limited, retrying, circuit-broken command issuer.
//!
//! Every outbound follower command passes through the token bucket, then
//! the broker call, with transient failures retried under exponential
//! backoff and circuit-breaker protection. Non-transient failures (the
//! broker rejected the order, validation, insufficient funds) surface on
//! the first attempt.

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limiter;

use crate::broker::{BracketPlacement, BrokerClient, ModifyPatch, PlaceOrderParams, PlacedOrder};
use crate::errors::{ErrorKind, ReplicationError, Result};
use crate::model::AccountRole;
use crate::store::Store;
use backoff::{BackoffConfig, ExponentialBackoff};
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use rate_limiter::{RateLimiter, RateLimiterConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Dispatcher-wide configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub rate_limit: RateLimiterConfig,
    pub retry: BackoffConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimiterConfig::standard(),
            retry: BackoffConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Issues follower commands under rate limiting, retry, and circuit-breaker control.
pub struct Dispatcher {
    broker: Arc<dyn BrokerClient>,
    store: Store,
    rate_limiter: RateLimiter,
    circuit: CircuitBreaker,
    retry_config: BackoffConfig,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(broker: Arc<dyn BrokerClient>, store: Store, config: DispatcherConfig) -> Self {
        Self {
            broker,
            store,
            rate_limiter: RateLimiter::new(config.rate_limit),
            circuit: CircuitBreaker::new(config.circuit_breaker),
            retry_config: config.retry,
            request_timeout: config.request_timeout,
        }
    }

    pub fn circuit_state(&self) -> circuit_breaker::CircuitState {
        self.circuit.state()
    }

    async fn gate<T, F, Fut>(&self, action: &str, role: AccountRole, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.circuit.is_call_permitted() {
            return Err(ReplicationError::transient(format!("circuit-open: refusing {action}")));
        }

        let deadline = Instant::now() + self.request_timeout;
        if !self.rate_limiter.acquire(deadline).await {
            return Err(ReplicationError::rate_limited(format!("rate limit exhausted for {action}"), None));
        }

        let mut backoff = ExponentialBackoff::with_config(self.retry_config.clone());
        loop {
            let started = Instant::now();
            let result = tokio::time::timeout(self.request_timeout, call())
                .await
                .unwrap_or_else(|_| Err(ReplicationError::transient(format!("{action} timed out"))));
            let duration_ms = started.elapsed().as_millis() as i64;

            match &result {
                Ok(_) => {
                    self.circuit.record_success();
                    self.audit(action, role, "ok", duration_ms, None).await;
                    return result;
                }
                Err(e) if e.kind().trips_circuit() => {
                    self.circuit.record_failure();
                }
                Err(_) => {}
            }

            if let Err(e) = &result {
                if e.kind().is_retryable() {
                    if let Some(delay) = backoff.next_delay() {
                        warn!("{action} failed ({e}), retrying in {:?}", delay);
                        self.audit(action, role, "retrying", duration_ms, Some(e.message())).await;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                self.audit(action, role, "failed", duration_ms, Some(e.message())).await;
            }
            return result;
        }
    }

    async fn audit(&self, action: &str, role: AccountRole, status: &str, duration_ms: i64, error: Option<&str>) {
        let ts = chrono::Utc::now().timestamp();
        if let Err(e) = self.store.append_audit(action, role, action, None, status, duration_ms, error, ts).await {
            warn!("failed to write audit row for {action}: {e}");
        }
    }

    pub async fn place_single(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        let role = params.account_role;
        self.gate("place_single", role, || self.broker.place_single(params.clone())).await
    }

    pub async fn place_cover(&self, params: PlaceOrderParams) -> Result<PlacedOrder> {
        let role = params.account_role;
        self.gate("place_cover", role, || self.broker.place_cover(params.clone())).await
    }

    pub async fn place_bracket(&self, params: PlaceOrderParams) -> Result<BracketPlacement> {
        let role = params.account_role;
        self.gate("place_bracket", role, || self.broker.place_bracket(params.clone())).await
    }

    pub async fn place_sliced(&self, params: PlaceOrderParams) -> Result<Vec<PlacedOrder>> {
        let role = params.account_role;
        self.gate("place_sliced", role, || self.broker.place_sliced(params.clone())).await
    }

    pub async fn modify(&self, order_id: &str, patch: ModifyPatch) -> Result<()> {
        self.gate("modify", AccountRole::Follower, || self.broker.modify_order(order_id, patch.clone())).await
    }

    pub async fn cancel(&self, order_id: &str) -> Result<()> {
        let result = self.gate("cancel", AccountRole::Follower, || self.broker.cancel_order(order_id)).await;
        if result.is_ok() {
            info!("cancelled follower order {order_id}");
        }
        result
    }
}

/// Quantity above which the broker rejects a single order; `place_sliced`
/// must be used instead.
pub fn exceeds_freeze_limit(quantity: i64, freeze_limit: i64) -> bool {
    quantity > freeze_limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBroker;
    use crate::model::{OrderKind, Product, Side, Validity};
    use rust_decimal_macros::dec;

    fn params() -> PlaceOrderParams {
        PlaceOrderParams {
            account_role: AccountRole::Follower,
            side: Side::Buy,
            product: Product::Intraday,
            kind: OrderKind::Limit,
            validity: Validity::Day,
            security_id: "SEC1".into(),
            exchange_segment: "NSE_FNO".into(),
            quantity: 50,
            disclosed_quantity: 0,
            price: dec!(1500),
            trigger_price: None,
            stop_loss_value: None,
            profit_target_value: None,
        }
    }

    async fn dispatcher(broker: Arc<MockBroker>) -> (Dispatcher, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let dispatcher = Dispatcher::new(broker, store, DispatcherConfig::default());
        (dispatcher, dir)
    }

    #[tokio::test]
    async fn place_single_succeeds_and_audits() {
        let broker = Arc::new(MockBroker::new());
        let (dispatcher, _dir) = dispatcher(broker).await;
        let placed = dispatcher.place_single(params()).await.unwrap();
        assert!(placed.order_id.starts_with("MOCK"));
    }

    #[tokio::test]
    async fn non_retryable_failure_surfaces_immediately() {
        let broker = Arc::new(MockBroker::new());
        broker.fail_next_placement(ReplicationError::non_retryable("rejected"));
        let (dispatcher, _dir) = dispatcher(broker).await;
        let result = dispatcher.place_single(params()).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NonRetryable);
    }

    #[test]
    fn freeze_limit_check() {
        assert!(exceeds_freeze_limit(2000, 1800));
        assert!(!exceeds_freeze_limit(100, 1800));
    }
}
