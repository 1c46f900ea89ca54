//! Heartbeat-based health tracking for the leader event stream.
//!
//! The watchdog task polls [`FeedHealth::status`] and schedules a reconnect
//! once the stream has gone quiet for longer than `heartbeat_timeout`.

use std::time::{Duration, Instant};

/// Configuration for heartbeat monitoring.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Minimum time before the stream is considered warmed up.
    pub warmup_duration: Duration,
    /// No message for longer than this marks the feed `Degraded`.
    pub heartbeat_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            warmup_duration: Duration::from_millis(500),
            heartbeat_timeout: Duration::from_secs(30),
        }
    }
}

/// Overall health of the leader event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Just connected, still inside the warmup window.
    Initializing,
    /// Receiving heartbeats within the timeout.
    Ready,
    /// No heartbeat within `heartbeat_timeout`; a reconnect should be scheduled.
    Degraded,
    /// No connection at all.
    Offline,
}

/// Tracks the last heartbeat and message count for the active stream connection.
pub struct FeedHealth {
    config: HealthConfig,
    start_time: Instant,
    last_heartbeat: Option<Instant>,
    message_count: u64,
    connected: bool,
}

impl FeedHealth {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            last_heartbeat: None,
            message_count: 0,
            connected: false,
        }
    }

    /// Mark the connection as established; resets the warmup clock.
    pub fn mark_connected(&mut self) {
        self.connected = true;
        self.start_time = Instant::now();
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.last_heartbeat = None;
    }

    /// Report an inbound message (any frame counts as a heartbeat).
    pub fn report_message(&mut self) {
        self.message_count += 1;
        self.last_heartbeat = Some(Instant::now());
    }

    pub fn status(&self) -> HealthStatus {
        if !self.connected {
            return HealthStatus::Offline;
        }

        if self.start_time.elapsed() < self.config.warmup_duration {
            return HealthStatus::Initializing;
        }

        match self.last_heartbeat {
            Some(t) if t.elapsed() <= self.config.heartbeat_timeout => HealthStatus::Ready,
            _ => HealthStatus::Degraded,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == HealthStatus::Ready
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_before_connecting() {
        let health = FeedHealth::new(HealthConfig::default());
        assert_eq!(health.status(), HealthStatus::Offline);
    }

    #[test]
    fn initializing_during_warmup() {
        let mut health = FeedHealth::new(HealthConfig::default());
        health.mark_connected();
        assert_eq!(health.status(), HealthStatus::Initializing);
    }

    #[test]
    fn ready_after_warmup_with_recent_heartbeat() {
        let config = HealthConfig { warmup_duration: Duration::from_millis(5), ..Default::default() };
        let mut health = FeedHealth::new(config);
        health.mark_connected();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(health.status(), HealthStatus::Ready);
    }

    #[test]
    fn degraded_after_heartbeat_timeout() {
        let config = HealthConfig {
            warmup_duration: Duration::from_millis(5),
            heartbeat_timeout: Duration::from_millis(20),
        };
        let mut health = FeedHealth::new(config);
        health.mark_connected();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(health.status(), HealthStatus::Degraded);
    }

    #[test]
    fn message_resets_heartbeat_clock() {
        let config = HealthConfig {
            warmup_duration: Duration::from_millis(5),
            heartbeat_timeout: Duration::from_millis(30),
        };
        let mut health = FeedHealth::new(config);
        health.mark_connected();
        std::thread::sleep(Duration::from_millis(10));
        health.report_message();
        assert_eq!(health.message_count(), 1);
        assert!(health.is_ready());
    }
}
