//! Environment-driven configuration.
//!
//! Every recognized option is read once at startup via `env::var`; a missing
//! required key or an unparsable value is a [`ErrorKind::Configuration`]
//! error, fatal before the orchestrator starts any task.

use crate::dispatcher::backoff::BackoffConfig;
use crate::dispatcher::circuit_breaker::CircuitBreakerConfig;
use crate::dispatcher::rate_limiter::RateLimiterConfig;
use crate::errors::{ReplicationError, Result};
use crate::sizer::{SizerConfig, SizingStrategy};
use crate::stream::gap_recovery::GapRecoveryConfig;
use crate::stream::health::HealthConfig;
use crate::stream::reconnect::ReconnectConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which base/stream URLs to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Sandbox,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Prod => "https://api.broker.example/v2",
            Environment::Sandbox => "https://sandbox-api.broker.example/v2",
        }
    }

    pub fn stream_url(&self) -> &'static str {
        match self {
            Environment::Prod => "wss://stream.broker.example/v2/orders",
            Environment::Sandbox => "wss://sandbox-stream.broker.example/v2/orders",
        }
    }
}

/// Fully resolved process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub leader_client_id: String,
    pub leader_access_token: String,
    pub follower_client_id: String,
    pub follower_access_token: String,
    pub environment: Environment,
    pub sizing_strategy: SizingStrategy,
    pub copy_ratio: Option<f64>,
    pub max_position_pct: f64,
    pub rate_limit_per_second: u64,
    pub retry_attempts: usize,
    pub retry_base_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub circuit_threshold: u64,
    pub circuit_timeout_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub max_reconnect_attempts: usize,
    pub store_path: String,
    pub enable_copy_trading: bool,
    pub log_level: String,
    pub metrics_addr: Option<String>,
    pub request_timeout_ms: u64,
    pub freeze_limit_qty: i64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| ReplicationError::configuration(format!("missing required environment variable {key}")))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ReplicationError::configuration(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let environment = match optional("ENVIRONMENT", "sandbox").to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Prod,
            _ => Environment::Sandbox,
        };

        let sizing_strategy: SizingStrategy = optional("SIZING_STRATEGY", "capital_proportional").parse()?;

        let copy_ratio = match env::var("COPY_RATIO") {
            Ok(raw) => Some(raw.parse::<f64>().map_err(|_| ReplicationError::configuration("invalid COPY_RATIO"))?),
            Err(_) => None,
        };

        Ok(Self {
            leader_client_id: required("LEADER_CLIENT_ID")?,
            leader_access_token: required("LEADER_ACCESS_TOKEN")?,
            follower_client_id: required("FOLLOWER_CLIENT_ID")?,
            follower_access_token: required("FOLLOWER_ACCESS_TOKEN")?,
            environment,
            sizing_strategy,
            copy_ratio,
            max_position_pct: parse_env("MAX_POSITION_PCT", 1.0)?,
            rate_limit_per_second: parse_env("RATE_LIMIT_PER_SECOND", 10)?,
            retry_attempts: parse_env("RETRY_ATTEMPTS", 5)?,
            retry_base_ms: parse_env("RETRY_BASE_MS", 100)?,
            retry_backoff_multiplier: parse_env("RETRY_BACKOFF_MULTIPLIER", 2.0)?,
            max_backoff_ms: parse_env("MAX_BACKOFF_MS", 30_000)?,
            circuit_threshold: parse_env("CIRCUIT_THRESHOLD", 5)?,
            circuit_timeout_secs: parse_env("CIRCUIT_TIMEOUT_SECS", 30)?,
            heartbeat_timeout_secs: parse_env("HEARTBEAT_TIMEOUT_SECS", 30)?,
            max_reconnect_attempts: parse_env("MAX_RECONNECT_ATTEMPTS", 10)?,
            store_path: optional("STORE_PATH", "copytrader.db"),
            enable_copy_trading: parse_env("ENABLE_COPY_TRADING", true)?,
            log_level: optional("LOG_LEVEL", "info"),
            metrics_addr: env::var("METRICS_ADDR").ok(),
            request_timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 10_000)?,
            freeze_limit_qty: parse_env("FREEZE_LIMIT_QTY", 1_800)?,
        })
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::from_rate(self.rate_limit_per_second)
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.retry_backoff_multiplier,
            max_retries: Some(self.retry_attempts),
            jitter_factor: 0.25,
        }
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_threshold,
            failure_window: Duration::from_secs(self.circuit_timeout_secs * 2),
            timeout: Duration::from_secs(self.circuit_timeout_secs),
            success_threshold: 2,
        }
    }

    pub fn sizer_config(&self) -> SizerConfig {
        SizerConfig {
            strategy: self.sizing_strategy,
            copy_ratio: self.copy_ratio,
            max_position_pct: self.max_position_pct,
            funds_ttl: Duration::from_secs(30),
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig { warmup_duration: Duration::from_millis(500), heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs) }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig { backoff: self.backoff_config(), max_attempts: self.max_reconnect_attempts }
    }

    pub fn gap_recovery_config(&self) -> GapRecoveryConfig {
        GapRecoveryConfig::default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "LEADER_CLIENT_ID", "LEADER_ACCESS_TOKEN", "FOLLOWER_CLIENT_ID", "FOLLOWER_ACCESS_TOKEN",
            "ENVIRONMENT", "SIZING_STRATEGY", "COPY_RATIO", "MAX_POSITION_PCT", "RATE_LIMIT_PER_SECOND",
            "ENABLE_COPY_TRADING",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn loads_with_defaults_when_optional_keys_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("LEADER_CLIENT_ID", "L");
        env::set_var("LEADER_ACCESS_TOKEN", "la");
        env::set_var("FOLLOWER_CLIENT_ID", "F");
        env::set_var("FOLLOWER_ACCESS_TOKEN", "fa");

        let config = Config::from_env().unwrap();
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.sizing_strategy, SizingStrategy::CapitalProportional);
        assert!(config.enable_copy_trading);
        clear_env();
    }

    #[test]
    fn invalid_sizing_strategy_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("LEADER_CLIENT_ID", "L");
        env::set_var("LEADER_ACCESS_TOKEN", "la");
        env::set_var("FOLLOWER_CLIENT_ID", "F");
        env::set_var("FOLLOWER_ACCESS_TOKEN", "fa");
        env::set_var("SIZING_STRATEGY", "not-a-strategy");

        let result = Config::from_env();
        assert!(result.is_err());
        clear_env();
    }
}
