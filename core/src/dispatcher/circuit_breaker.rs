//! Three-state circuit breaker guarding follower broker calls.
//!
//! `Dispatcher::gate` consults this before every command and only feeds it
//! the subset of failures `ErrorKind::trips_circuit` calls circuit-worthy
//! (transient/rate-limited, not a rejected order or a validation failure) —
//! Closed (normal) -> Open (fail fast) -> HalfOpen (probe recovery).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            2 => Self::HalfOpen,
            _ => Self::Closed,
        }
    }
}

/// Tunables, loaded from `CIRCUIT_THRESHOLD`/`CIRCUIT_TIMEOUT_SECS` by `Config::circuit_breaker_config`.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Circuit-worthy failures before tripping to Open.
    pub failure_threshold: u64,
    /// Only failures within this window count toward the threshold.
    pub failure_window: Duration,
    /// Time spent Open before a probe call is let through as HalfOpen.
    pub timeout: Duration,
    /// Consecutive HalfOpen successes required to close the circuit again.
    pub success_threshold: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Per-broker-connection circuit state, shared across `Dispatcher` clones.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<AtomicU8>,
    failure_count: Arc<AtomicU64>,
    success_count: Arc<AtomicU64>,
    last_failure_time: Arc<parking_lot::Mutex<Option<Instant>>>,
    last_state_change: Arc<parking_lot::Mutex<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        debug!("circuit breaker configured: {:?}", config);
        Self {
            config,
            state: Arc::new(AtomicU8::new(CircuitState::Closed as u8)),
            failure_count: Arc::new(AtomicU64::new(0)),
            success_count: Arc::new(AtomicU64::new(0)),
            last_failure_time: Arc::new(parking_lot::Mutex::new(None)),
            last_state_change: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Whether `Dispatcher::gate` may attempt the call.
    pub fn is_call_permitted(&self) -> bool {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();

        match state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_change = *self.last_state_change.lock();
                if last_change.elapsed() >= self.config.timeout {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();

        match state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Called only for failures `ErrorKind::trips_circuit` reports true for.
    pub fn record_failure(&self) {
        let state: CircuitState = self.state.load(Ordering::Acquire).into();

        *self.last_failure_time.lock() = Some(Instant::now());

        match state {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    if let Some(last_failure) = *self.last_failure_time.lock() {
                        if last_failure.elapsed() <= self.config.failure_window {
                            self.transition_to_open();
                        }
                    }
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open();
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self) {
        info!("follower circuit CLOSED, resuming normal dispatch");
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    fn transition_to_open(&self) {
        warn!("follower circuit OPEN, refusing dispatch until probe timeout");
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    fn transition_to_half_open(&self) {
        debug!("follower circuit HALF-OPEN, probing recovery");
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.last_state_change.lock() = Instant::now();
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }
}

impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            failure_count: Arc::clone(&self.failure_count),
            success_count: Arc::clone(&self.success_count),
            last_failure_time: Arc::clone(&self.last_failure_time),
            last_state_change: Arc::clone(&self.last_state_change),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_closed_and_permits_calls() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig::default());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_call_permitted());
    }

    #[test]
    fn trips_open_after_threshold_circuit_worthy_failures() {
        let config = CircuitBreakerConfig { failure_threshold: 3, ..Default::default() };
        let cb = CircuitBreaker::new(config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_call_permitted());
    }

    #[test]
    fn half_open_probe_recovers_after_enough_successes() {
        let config =
            CircuitBreakerConfig { failure_threshold: 2, timeout: Duration::from_millis(10), success_threshold: 2, ..Default::default() };
        let cb = CircuitBreaker::new(config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(15));

        assert!(cb.is_call_permitted());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let config = CircuitBreakerConfig { failure_threshold: 2, timeout: Duration::from_millis(10), ..Default::default() };
        let cb = CircuitBreaker::new(config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(15));
        assert!(cb.is_call_permitted());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_while_closed_resets_failure_count() {
        let config = CircuitBreakerConfig { failure_threshold: 3, ..Default::default() };
        let cb = CircuitBreaker::new(config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn clones_share_the_same_underlying_state() {
        let cb1 = CircuitBreaker::new(CircuitBreakerConfig::default());
        let cb2 = cb1.clone();

        cb1.record_failure();
        assert_eq!(cb2.failure_count(), 1);
    }
}
