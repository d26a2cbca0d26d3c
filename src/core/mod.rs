//! Core types for the arbitrage scanner
//!
//! This module contains the fundamental types used throughout the system:
//! - VenueId: closed set of supported exchanges
//! - Pair: canonical trading pair (BASE/QUOTE)
//! - Market: per-venue instrument metadata
//! - BookSnapshot: validated order book state
//! - Opportunity: detected cross/tri arbitrage candidates

pub mod book;
pub mod market;
pub mod opportunity;
pub mod pair;
pub mod venue;

pub use book::{BookError, BookSnapshot, PriceLevel};
pub use market::Market;
pub use opportunity::{CrossOpportunity, Leg, Opportunity, Side, TriOpportunity};
pub use pair::Pair;
pub use venue::VenueId;
