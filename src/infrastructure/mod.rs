//! Infrastructure - cold path only
//!
//! Non-latency-critical plumbing:
//! - Configuration from process environment
//! - Logging setup
//! - Metrics counters
//! - Venue health tracking

pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;

pub use config::{Config, ConfigError};
pub use health::HealthMonitor;
pub use metrics::{Metrics, MetricsSnapshot};
