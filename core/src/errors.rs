//! Error taxonomy for the replication pipeline.
//!
//! Every fallible operation in this crate returns a [`ReplicationError`]
//! tagged with one of the kinds below so callers can decide whether to
//! retry, record a failed mapping, or treat the error as fatal, without
//! string-matching messages.

use std::fmt;

/// The classification of a replication failure.
///
/// See the propagation table in the specification: `configuration` and
/// `authentication` are fatal at startup; `validation`, `sizing`, and
/// `insufficient-funds` terminate replication for that one leader order;
/// `rate-limited` and `transient` are retried by the dispatcher; `stream`
/// triggers a reconnect; `store` is fatal for the in-flight decision;
/// `oco-ambiguous` only produces a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration at load time.
    Configuration,
    /// Credentials rejected or token expired.
    Authentication,
    /// Missing or invalid fields on an incoming event or outgoing command.
    Validation,
    /// Sizer produced a zero or cap-violating quantity.
    Sizing,
    /// Margin validation failed for the computed quantity.
    InsufficientFunds,
    /// Broker throttled the request; a `retry-after` hint may be present.
    RateLimited,
    /// Network failure or 5xx-equivalent broker response.
    Transient,
    /// Broker rejected the request outright; retrying will not help.
    NonRetryable,
    /// Stream disconnect or heartbeat loss.
    Stream,
    /// Persistence failure in the store.
    Store,
    /// An executed bracket leg could not be matched to the leg graph.
    OcoAmbiguous,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Validation => "validation",
            ErrorKind::Sizing => "sizing",
            ErrorKind::InsufficientFunds => "insufficient-funds",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::Transient => "transient",
            ErrorKind::NonRetryable => "non-retryable",
            ErrorKind::Stream => "stream",
            ErrorKind::Store => "store",
            ErrorKind::OcoAmbiguous => "oco-ambiguous",
        };
        f.write_str(s)
    }
}

impl ErrorKind {
    /// Whether the dispatcher should retry an operation that failed with this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Transient)
    }

    /// Whether this kind should count as a circuit-breaker failure.
    pub fn trips_circuit(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::RateLimited)
    }
}

/// A replication-pipeline error.
#[derive(Debug, Clone)]
pub struct ReplicationError {
    kind: ErrorKind,
    message: String,
    /// Present only for `RateLimited` when the broker supplied a hint.
    retry_after: Option<std::time::Duration>,
}

impl ReplicationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after: None }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn sizing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sizing, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientFunds, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<std::time::Duration>) -> Self {
        Self { kind: ErrorKind::RateLimited, message: message.into(), retry_after }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NonRetryable, message)
    }

    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stream, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    pub fn oco_ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OcoAmbiguous, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        self.retry_after
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ReplicationError {}

impl From<rusqlite::Error> for ReplicationError {
    fn from(e: rusqlite::Error) -> Self {
        ReplicationError::store(e.to_string())
    }
}

impl From<reqwest::Error> for ReplicationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            ReplicationError::transient(e.to_string())
        } else if e.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            ReplicationError::rate_limited(e.to_string(), None)
        } else {
            ReplicationError::non_retryable(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_prefix() {
        let err = ReplicationError::sizing("quantity rounded to zero");
        assert_eq!(err.to_string(), "sizing: quantity rounded to zero");
    }

    #[test]
    fn retryable_kinds_are_transient_and_rate_limited() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::NonRetryable.is_retryable());
    }

    #[test]
    fn circuit_trips_only_on_transient_and_rate_limited() {
        assert!(ErrorKind::Transient.trips_circuit());
        assert!(!ErrorKind::Sizing.trips_circuit());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = ReplicationError::rate_limited("throttled", Some(std::time::Duration::from_secs(2)));
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(2)));
    }
}
