//! Monitoring and observability module.
//!
//! Provides Prometheus metrics export and an HTTP server for scraping.

pub mod metrics;
pub mod server;

pub use metrics::{DispatcherMetrics, MetricsRegistry, ReplicationMetrics, StreamMetrics};
pub use server::{MetricsServer, MetricsServerConfig};
