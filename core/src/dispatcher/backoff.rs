//! Exponential backoff for dispatcher retries and stream reconnects.
//!
//! `base * 2^(k-1)` with jitter, capped at `max_delay`. Shared by the
//! dispatcher's transient-failure retry policy (`RETRY_*` env keys) and the
//! stream coordinator's reconnect policy (`MAX_RECONNECT_ATTEMPTS`) so both
//! back off the same way.

use rand::Rng;
use std::time::Duration;

/// Built from `Config::backoff_config`/`Config::reconnect_config`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// `None` means retry without limit (the stream reconnect loop does this).
    pub max_retries: Option<usize>,
    /// Randomization applied to each delay, 0.0 to 1.0.
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: Some(10),
            jitter_factor: 0.1,
        }
    }
}

/// Tracks attempt count and current delay for one retry sequence.
pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_attempt: usize,
    current_delay: Duration,
}

impl ExponentialBackoff {
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { current_delay: config.initial_delay, current_attempt: 0, config }
    }

    /// Next delay to sleep before retrying, or `None` if `max_retries` is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_retries) = self.config.max_retries {
            if self.current_attempt >= max_retries {
                return None;
            }
        }

        let delay = self.jittered_delay();

        self.current_attempt += 1;
        self.current_delay =
            std::cmp::min(Duration::from_secs_f64(self.current_delay.as_secs_f64() * self.config.multiplier), self.config.max_delay);

        Some(delay)
    }

    fn jittered_delay(&self) -> Duration {
        if self.config.jitter_factor == 0.0 {
            return self.current_delay;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen::<f64>() * self.config.jitter_factor;
        let jitter_multiplier = 1.0 + (jitter - self.config.jitter_factor / 2.0);

        Duration::from_secs_f64(self.current_delay.as_secs_f64() * jitter_multiplier)
    }

    /// Back to attempt zero, e.g. after a reconnect succeeds.
    pub fn reset(&mut self) {
        self.current_attempt = 0;
        self.current_delay = self.config.initial_delay;
    }

    pub fn attempt_number(&self) -> usize {
        self.current_attempt
    }

    pub fn can_retry(&self) -> bool {
        match self.config.max_retries {
            Some(max) => self.current_attempt < max,
            None => true,
        }
    }
}
