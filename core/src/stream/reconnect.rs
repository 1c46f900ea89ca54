//! Reconnection bookkeeping for the stream coordinator.
//!
//! Wraps [`ExponentialBackoff`] with the connection-state machine named in
//! the specification (`disconnected -> connecting -> live -> degraded ->
//! reconnecting`) and tracks simple stats an operator can read off the
//! metrics endpoint.

use super::super::dispatcher::backoff::{BackoffConfig, ExponentialBackoff};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Connection state of the leader event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Live,
    Degraded,
    Reconnecting,
    /// Reconnection attempts exhausted; fatal for the orchestrator.
    Failed,
}

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub backoff: BackoffConfig,
    pub max_attempts: usize,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { backoff: BackoffConfig::default(), max_attempts: 10 }
    }
}

/// Statistics about reconnection activity.
#[derive(Debug, Clone, Default)]
pub struct ReconnectionStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_reconnect: Option<Instant>,
}

/// Tracks connection state and drives the reconnect backoff.
pub struct ReconnectTracker {
    config: ReconnectConfig,
    state: ConnectionState,
    backoff: ExponentialBackoff,
    stats: ReconnectionStats,
    connected_at: Option<Instant>,
}

impl ReconnectTracker {
    pub fn new(config: ReconnectConfig) -> Self {
        let backoff = ExponentialBackoff::with_config(config.backoff.clone());
        Self {
            config,
            state: ConnectionState::Disconnected,
            backoff,
            stats: ReconnectionStats::default(),
            connected_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.stats.attempts += 1;
    }

    pub fn mark_live(&mut self) {
        info!("stream connection established");
        self.state = ConnectionState::Live;
        self.stats.successes += 1;
        self.stats.last_reconnect = Some(Instant::now());
        self.connected_at = Some(Instant::now());
        self.backoff.reset();
    }

    pub fn mark_degraded(&mut self) {
        if self.state == ConnectionState::Live {
            warn!("stream heartbeat lost, marking degraded");
            self.state = ConnectionState::Degraded;
        }
    }

    pub fn mark_failed_attempt(&mut self) {
        self.stats.failures += 1;
        self.state = ConnectionState::Reconnecting;
    }

    /// Whether the caller should give up and surface a fatal error.
    pub fn exhausted(&self) -> bool {
        !self.backoff.can_retry()
    }

    /// Wait the next backoff interval before retrying, or mark `Failed` and
    /// return `None` if attempts are exhausted.
    pub async fn wait_before_retry(&mut self) -> Option<Duration> {
        if !self.backoff.can_retry() {
            self.state = ConnectionState::Failed;
            return None;
        }
        let delay = self.backoff.next_delay()?;
        tokio::time::sleep(delay).await;
        Some(delay)
    }

    pub fn stats(&self) -> &ReconnectionStats {
        &self.stats
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let tracker = ReconnectTracker::new(ReconnectConfig::default());
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn live_resets_backoff_and_records_success() {
        let mut tracker = ReconnectTracker::new(ReconnectConfig::default());
        tracker.mark_connecting();
        tracker.mark_live();
        assert_eq!(tracker.state(), ConnectionState::Live);
        assert_eq!(tracker.stats().successes, 1);
    }

    #[test]
    fn degraded_only_transitions_from_live() {
        let mut tracker = ReconnectTracker::new(ReconnectConfig::default());
        tracker.mark_degraded();
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        tracker.mark_connecting();
        tracker.mark_live();
        tracker.mark_degraded();
        assert_eq!(tracker.state(), ConnectionState::Degraded);
    }

    #[tokio::test]
    async fn wait_before_retry_exhausts_after_max_attempts() {
        let config = ReconnectConfig {
            backoff: BackoffConfig { max_retries: Some(1), initial_delay: Duration::from_millis(1), ..BackoffConfig::default() },
            max_attempts: 1,
        };
        let mut tracker = ReconnectTracker::new(config);
        assert!(tracker.wait_before_retry().await.is_some());
        assert!(tracker.wait_before_retry().await.is_none());
        assert_eq!(tracker.state(), ConnectionState::Failed);
    }
}
