//! Cross-exchange and triangular arbitrage scanner
//!
//! Streams public order books from spot venues, keeps a shared in-memory
//! book store, and scans it for cross-venue spreads and intra-venue
//! triangular cycles that clear the configured thresholds net of taker
//! fees. Detections are deduplicated and forwarded to a notifier and an
//! append-only log.
//!
//! # Architecture
//! - **core**: pairs, venues, books, opportunities
//! - **connectors**: per-venue feeds plus the lifecycle driver
//! - **store**: atomically replaceable book snapshots
//! - **engines**: the cross and tri scanners
//! - **emitter**: dedup, throttling, sink dispatch
//! - **infrastructure**: config, logging, metrics, health

pub mod app;
pub mod connectors;
pub mod core;
pub mod depth;
pub mod emitter;
pub mod engines;
pub mod fees;
pub mod infrastructure;
pub mod notify;
pub mod persist;
pub mod registry;
pub mod rest;
pub mod store;
pub mod ws;

pub use app::{App, ExitOutcome};
pub use infrastructure::{Config, ConfigError};

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("persistence error: {0}")]
    Persist(#[from] persist::PersistError),

    #[error("no venues enabled after include/exclude filtering")]
    NoVenues,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
