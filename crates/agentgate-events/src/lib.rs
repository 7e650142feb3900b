//! agentgate-events — the progress & metrics bus: typed publish/
//! subscribe over `ProgressEvent` with rate-limited batching, plus a
//! Prometheus-compatible metrics collector.

pub mod bus;
pub mod metrics;

pub use bus::{BusConfig, ProgressBus};
pub use metrics::MetricsCollector;
