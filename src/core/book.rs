//! Order book snapshot
//!
//! Snapshots are validated once, when a connector publishes them to the
//! book store. Everything downstream may assume sorted, uncrossed sides
//! with positive prices and sizes.

use std::time::Instant;

use rust_decimal::Decimal;

use super::{Pair, VenueId};

/// One price level: `size` base units offered at `price` quote-per-base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Quote value of the full level
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Point-in-time order book for one (venue, pair)
///
/// `ts_local` is taken from a monotonic clock at publish time and drives
/// staleness checks. `ts_exchange` is whatever the venue reported, kept for
/// diagnostics only. `seq` is present where the venue exposes a monotonic
/// update sequence.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub venue: VenueId,
    pub pair: Pair,
    /// Sorted descending by price
    pub bids: Vec<PriceLevel>,
    /// Sorted ascending by price
    pub asks: Vec<PriceLevel>,
    pub ts_exchange: Option<u64>,
    pub ts_local: Instant,
    pub seq: Option<u64>,
}

/// Reasons a snapshot is rejected at publish time
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("book is crossed (best bid >= best ask)")]
    Crossed,
    #[error("side is not strictly sorted")]
    Unsorted,
    #[error("level with non-positive price or size")]
    NonPositive,
    #[error("both sides empty")]
    Empty,
    #[error("snapshot not newer than the published one")]
    NotNewer,
}

impl BookSnapshot {
    pub fn new(venue: VenueId, pair: Pair, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            venue,
            pair,
            bids,
            asks,
            ts_exchange: None,
            ts_local: Instant::now(),
            seq: None,
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Age of the snapshot against the local monotonic clock
    #[inline]
    pub fn age(&self) -> std::time::Duration {
        self.ts_local.elapsed()
    }

    /// Check ordering, positivity and the crossed-book invariant
    pub fn validate(&self) -> Result<(), BookError> {
        if self.bids.is_empty() && self.asks.is_empty() {
            return Err(BookError::Empty);
        }

        for level in self.bids.iter().chain(self.asks.iter()) {
            if level.price <= Decimal::ZERO || level.size <= Decimal::ZERO {
                return Err(BookError::NonPositive);
            }
        }

        // Bids strictly descending
        for window in self.bids.windows(2) {
            if window[0].price <= window[1].price {
                return Err(BookError::Unsorted);
            }
        }
        // Asks strictly ascending
        for window in self.asks.windows(2) {
            if window[0].price >= window[1].price {
                return Err(BookError::Unsorted);
            }
        }

        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(BookError::Crossed);
            }
        }

        Ok(())
    }
}
