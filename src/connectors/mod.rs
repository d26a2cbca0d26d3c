//! Per-venue market data connectors
//!
//! Each venue implements the [`VenueFeed`] capability contract: discover,
//! connect, subscribe/unsubscribe, pull events, shutdown. The venue-
//! agnostic [`driver::ConnectorDriver`] owns the lifecycle state machine,
//! shadow books, coalescing and reconnect policy; feeds only speak their
//! venue's wire protocol.
//!
//! Feeds are selected by a factory keyed on the venue id: binance and
//! bybit stream depth over WebSocket, the remaining venues poll REST.

pub mod binance;
pub mod bybit;
pub mod driver;
pub mod poll;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Market, Pair, PriceLevel, VenueId};
use crate::registry::SymbolRegistry;
use crate::rest::{RestClient, RestError};
use crate::ws::WsError;

pub use driver::ConnectorDriver;

/// Connector lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Init,
    Discover,
    Subscribing,
    Streaming,
    Degraded,
    Reconnecting,
    Stopped,
}

impl ConnectorState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectorState::Init => "init",
            ConnectorState::Discover => "discover",
            ConnectorState::Subscribing => "subscribing",
            ConnectorState::Streaming => "streaming",
            ConnectorState::Degraded => "degraded",
            ConnectorState::Reconnecting => "reconnecting",
            ConnectorState::Stopped => "stopped",
        }
    }
}

/// One depth update from a venue, already canonicalized
///
/// A snapshot replaces the shadow book; a delta merges into it, with zero
/// sizes removing levels. Sides arrive best-first.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub pair: Pair,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub is_snapshot: bool,
    pub seq: Option<u64>,
    pub ts_exchange: Option<u64>,
}

/// What a feed hands to the driver
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Book(BookEvent),
    /// Subscription or control acknowledgement
    Ack,
    /// Liveness without payload (pongs, ignorable frames)
    Heartbeat,
}

/// Feed-level faults; the driver maps these to reconnects
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("transport: {0}")]
    Transport(String),
    #[error(transparent)]
    Ws(#[from] WsError),
    #[error(transparent)]
    Rest(#[from] RestError),
}

/// Capability contract implemented per venue
#[async_trait]
pub trait VenueFeed: Send {
    fn venue(&self) -> VenueId;

    /// Open the transport; a no-op for polled venues
    async fn connect(&mut self) -> Result<(), FeedError>;

    /// Fetch the venue's instruments
    async fn discover(&mut self) -> Result<Vec<Market>, FeedError>;

    /// Start depth delivery for the given markets
    async fn subscribe(&mut self, markets: &[Market]) -> Result<(), FeedError>;

    /// Stop depth delivery for the given markets
    async fn unsubscribe(&mut self, markets: &[Market]) -> Result<(), FeedError>;

    /// Next event; `Ok(None)` means the transport closed gracefully
    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError>;

    /// How often [`VenueFeed::keepalive`] must run, if the venue needs one
    fn keepalive_interval(&self) -> Option<Duration> {
        None
    }

    async fn keepalive(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    /// Close the transport and drain in-flight state
    async fn shutdown(&mut self) -> Result<(), FeedError>;
}

/// Select the feed implementation for a venue
pub fn feed_for(
    venue: VenueId,
    rest: RestClient,
    registry: Arc<SymbolRegistry>,
    depth_levels: usize,
) -> Box<dyn VenueFeed> {
    match venue {
        VenueId::Binance => Box::new(binance::BinanceFeed::new(rest, registry, depth_levels)),
        VenueId::Bybit => Box::new(bybit::BybitFeed::new(rest, registry, depth_levels)),
        _ => Box::new(poll::RestPollFeed::new(venue, rest, depth_levels)),
    }
}

/// Pairs a venue should track
///
/// An explicit `SYMBOL_UNIVERSE` is intersected with the venue's listings.
/// With no universe configured, the venue tracks every pair it shares with
/// at least one other discovered venue, plus every pair touching a tri
/// base so the cycle graph has edges to walk.
pub fn resolve_tracked(
    registry: &SymbolRegistry,
    venue: VenueId,
    universe: &[Pair],
    tri_bases: &[String],
) -> Vec<Market> {
    let listed = registry.pairs_of(venue);

    let mut pairs: Vec<Pair> = if universe.is_empty() {
        listed
            .into_iter()
            .filter(|pair| {
                registry.venues_of(pair).len() >= 2
                    || tri_bases.iter().any(|base| pair.touches(base))
            })
            .collect()
    } else {
        universe
            .iter()
            .filter(|pair| listed.contains(pair))
            .cloned()
            .collect()
    };

    pairs.sort();
    pairs
        .into_iter()
        .filter_map(|pair| registry.market(venue, &pair))
        .filter(|market| market.active)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(venue: VenueId, base: &str, quote: &str) -> Market {
        let native = format!("{base}{quote}");
        Market::new(venue, Pair::new(base, quote), native)
    }

    fn registry() -> SymbolRegistry {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Binance,
            vec![
                market(VenueId::Binance, "BTC", "USDT"),
                market(VenueId::Binance, "ETH", "USDT"),
                market(VenueId::Binance, "SOL", "USDT"),
            ],
        );
        registry.load(
            VenueId::Bybit,
            vec![
                market(VenueId::Bybit, "BTC", "USDT"),
                market(VenueId::Bybit, "DOGE", "TRY"),
            ],
        );
        registry
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectorState::Init.name(), "init");
        assert_eq!(ConnectorState::Reconnecting.name(), "reconnecting");
    }

    #[test]
    fn test_explicit_universe_intersected() {
        let registry = registry();
        let universe = vec![Pair::new("BTC", "USDT"), Pair::new("XRP", "USDT")];
        let tracked = resolve_tracked(&registry, VenueId::Binance, &universe, &[]);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].pair, Pair::new("BTC", "USDT"));
    }

    #[test]
    fn test_default_universe_needs_second_venue_or_tri_base() {
        let registry = registry();
        // BTC/USDT is shared; ETH/USDT and SOL/USDT are binance-only
        let tracked = resolve_tracked(&registry, VenueId::Binance, &[], &[]);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].pair, Pair::new("BTC", "USDT"));

        // A tri base pulls in single-venue pairs touching it
        let tracked =
            resolve_tracked(&registry, VenueId::Binance, &[], &["ETH".to_string()]);
        let pairs: Vec<&Pair> = tracked.iter().map(|m| &m.pair).collect();
        assert!(pairs.contains(&&Pair::new("BTC", "USDT")));
        assert!(pairs.contains(&&Pair::new("ETH", "USDT")));
        assert!(!pairs.contains(&&Pair::new("SOL", "USDT")));
    }

    #[test]
    fn test_usdt_base_pulls_quote_pairs() {
        let registry = registry();
        let tracked =
            resolve_tracked(&registry, VenueId::Binance, &[], &["USDT".to_string()]);
        assert_eq!(tracked.len(), 3);
    }
}
