//! copytrader-core - leader-to-follower order replication.
//!
//! Mirrors order events from a leader brokerage account onto a follower
//! account: the [`stream`] coordinator maintains the leader feed and detects
//! sequence gaps, [`replicator`] classifies and idempotency-gates each event,
//! [`sizer`] scales leader quantity to the follower's available funds, and
//! [`dispatcher`] issues the resulting command to the follower account under
//! rate limiting, retry, and circuit-breaker control. [`store`] is the
//! single source of durable state (orders, correspondence mappings, bracket
//! legs, the replication watermark).
//!
//! ## Modules
//! - `errors`: the [`ErrorKind`] taxonomy every fallible operation returns
//! - `model`: shared domain types (orders, events, mappings, bracket legs)
//! - `config`: environment-driven process configuration
//! - `control`: graceful shutdown and the `enable_copy_trading` pause switch
//! - `store`: single-writer SQLite persistence
//! - `sizer`: quantity scaling strategies and margin validation
//! - `broker`: the `BrokerClient` trait, HTTP/WebSocket implementations, and a test double
//! - `dispatcher`: rate-limited, retrying, circuit-broken command issuer
//! - `replicator`: the event classification and dispatch state machine
//! - `stream`: leader feed connection, gap detection, and recovery
//! - `orchestrator`: wires every component into one running process
//! - `monitoring`: Prometheus metrics and the scrape HTTP server
//! - `utils`: logging setup

pub mod errors;
pub mod model;

pub mod config;
pub mod control;
pub mod store;

pub mod sizer;

pub mod broker;
pub mod dispatcher;

pub mod replicator;
pub mod stream;

pub mod orchestrator;

pub mod monitoring;
pub mod utils;

pub use errors::{ErrorKind, ReplicationError, Result};
pub use orchestrator::Orchestrator;

/// Convenient imports for binaries built on top of this crate.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::control::{KillSwitch, KillSwitchState};
    pub use crate::errors::{ErrorKind, ReplicationError, Result};
    pub use crate::model::{
        AccountRole, CorrespondenceMapping, EventKind, NormalizedEvent, Order, OrderStatus,
    };
    pub use crate::orchestrator::Orchestrator;
}
