//! Connector lifecycle driver
//!
//! One driver task per venue. Owns the state machine
//! init -> discover -> subscribing -> streaming -> degraded -> reconnecting
//! -> stopped, the per-market shadow books, coalesced publishing into the
//! book store, sequence-gap resyncs and reconnect backoff. The venue feed
//! underneath only moves protocol frames.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::core::{BookError, BookSnapshot, Pair, PriceLevel, VenueId};
use crate::infrastructure::{Config, HealthMonitor, Metrics};
use crate::registry::SymbolRegistry;
use crate::store::BookStore;
use crate::ws::Backoff;

use super::{resolve_tracked, BookEvent, ConnectorState, FeedEvent, VenueFeed};

/// A silent transport is torn down and reconnected after this long
const WS_INACTIVITY: Duration = Duration::from_secs(30);
/// Pause before re-running discovery when a venue lists nothing we track
const EMPTY_DISCOVERY_PAUSE: Duration = Duration::from_secs(30);

/// Shadow book: the connector-private mutable side of one market
#[derive(Debug, Default)]
struct ShadowBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_seq: Option<u64>,
    ts_exchange: Option<u64>,
    /// A snapshot has arrived since (re)subscription
    synced: bool,
    dirty: bool,
    last_published: Option<Instant>,
}

enum Applied {
    Changed,
    /// Delta before snapshot or replayed sequence; nothing to do
    Skipped,
    /// Sequence discontinuity; the market needs a resync
    Gap,
}

impl ShadowBook {
    fn apply(&mut self, event: &BookEvent) -> Applied {
        if event.is_snapshot {
            self.bids = event.bids.iter().map(|l| (l.price, l.size)).collect();
            self.asks = event.asks.iter().map(|l| (l.price, l.size)).collect();
            self.last_seq = event.seq;
            self.ts_exchange = event.ts_exchange;
            self.synced = true;
            self.dirty = true;
            return Applied::Changed;
        }

        if !self.synced {
            return Applied::Skipped;
        }

        if let (Some(seq), Some(last)) = (event.seq, self.last_seq) {
            if seq <= last {
                return Applied::Skipped;
            }
            if seq != last + 1 {
                return Applied::Gap;
            }
        }

        for level in &event.bids {
            if level.size.is_zero() {
                self.bids.remove(&level.price);
            } else {
                self.bids.insert(level.price, level.size);
            }
        }
        for level in &event.asks {
            if level.size.is_zero() {
                self.asks.remove(&level.price);
            } else {
                self.asks.insert(level.price, level.size);
            }
        }
        self.last_seq = event.seq.or(self.last_seq);
        self.ts_exchange = event.ts_exchange.or(self.ts_exchange);
        self.dirty = true;
        Applied::Changed
    }

    fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_seq = None;
        self.synced = false;
        self.dirty = false;
    }

    /// Top-of-book slices, bids descending and asks ascending
    fn top(&self, depth: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(price, size)| PriceLevel::new(*price, *size))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, size)| PriceLevel::new(*price, *size))
            .collect();
        (bids, asks)
    }
}

/// Venue-agnostic connector task
pub struct ConnectorDriver {
    feed: Box<dyn VenueFeed>,
    store: Arc<BookStore>,
    registry: Arc<SymbolRegistry>,
    health: Arc<HealthMonitor>,
    metrics: Arc<Metrics>,
    universe: Vec<Pair>,
    tri_bases: Vec<String>,
    depth_levels: usize,
    coalesce: Duration,
    grace: Duration,
    state: ConnectorState,
    shadows: HashMap<Pair, ShadowBook>,
    backoff: Backoff,
}

impl ConnectorDriver {
    pub fn new(
        feed: Box<dyn VenueFeed>,
        store: Arc<BookStore>,
        registry: Arc<SymbolRegistry>,
        health: Arc<HealthMonitor>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> Self {
        Self {
            feed,
            store,
            registry,
            health,
            metrics,
            universe: config.symbol_universe.clone(),
            tri_bases: config.tri_bases.clone(),
            depth_levels: config.depth_levels,
            coalesce: config.coalesce,
            grace: config.grace_shutdown,
            state: ConnectorState::Init,
            shadows: HashMap::new(),
            backoff: Backoff::new(),
        }
    }

    fn venue(&self) -> VenueId {
        self.feed.venue()
    }

    fn enter(&mut self, state: ConnectorState) {
        if self.state != state {
            tracing::debug!("{}: {} -> {}", self.venue(), self.state.name(), state.name());
            self.state = state;
            self.health.set_state(self.venue(), state.name());
        }
    }

    /// Drive the venue until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let venue = self.venue();
        tracing::info!("{}: connector starting", venue);

        while !*shutdown.borrow() {
            match self.state {
                ConnectorState::Init => self.enter(ConnectorState::Discover),
                ConnectorState::Discover => self.discover_step(&mut shutdown).await,
                ConnectorState::Subscribing => {
                    if self.subscribe_step(&mut shutdown).await {
                        let next = self.stream_loop(&mut shutdown).await;
                        self.enter(next);
                    }
                }
                ConnectorState::Streaming | ConnectorState::Degraded => {
                    self.enter(ConnectorState::Reconnecting)
                }
                ConnectorState::Reconnecting => self.reconnect_step(&mut shutdown).await,
                ConnectorState::Stopped => break,
            }
        }

        if timeout(self.grace, self.feed.shutdown()).await.is_err() {
            tracing::warn!("{}: transport did not close within grace period", venue);
        }
        self.enter(ConnectorState::Stopped);
        tracing::info!("{}: connector stopped", venue);
    }

    /// Load instruments, retrying with backoff while the venue is down
    async fn discover_step(&mut self, shutdown: &mut watch::Receiver<bool>) {
        match self.feed.discover().await {
            Ok(markets) => {
                self.registry.load(self.venue(), markets);
                self.backoff.reset();
                self.enter(ConnectorState::Subscribing);
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                tracing::warn!(
                    "{}: discovery failed ({}), retrying in {:?}",
                    self.venue(),
                    e,
                    delay
                );
                self.enter(ConnectorState::Degraded);
                if sleep_or_shutdown(delay, shutdown).await {
                    return;
                }
                self.enter(ConnectorState::Discover);
            }
        }
    }

    /// Connect and subscribe; true when the stream loop should start.
    /// Streaming proper begins with the first valid published snapshot.
    async fn subscribe_step(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let venue = self.venue();
        let markets = resolve_tracked(&self.registry, venue, &self.universe, &self.tri_bases);
        if markets.is_empty() {
            tracing::warn!("{}: no tracked markets, re-running discovery", venue);
            if !sleep_or_shutdown(EMPTY_DISCOVERY_PAUSE, shutdown).await {
                self.enter(ConnectorState::Discover);
            }
            return false;
        }

        let result = async {
            self.feed.connect().await?;
            self.feed.subscribe(&markets).await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("{}: subscribed to {} markets", venue, markets.len());
                self.shadows.clear();
                true
            }
            Err(e) => {
                tracing::warn!("{}: subscribe failed: {}", venue, e);
                self.enter(ConnectorState::Reconnecting);
                false
            }
        }
    }

    async fn reconnect_step(&mut self, shutdown: &mut watch::Receiver<bool>) {
        self.metrics.record_reconnect(self.venue());
        for shadow in self.shadows.values_mut() {
            shadow.reset();
        }
        let delay = self.backoff.next_delay();
        tracing::info!("{}: reconnecting in {:?}", self.venue(), delay);
        if sleep_or_shutdown(delay, shutdown).await {
            return;
        }
        self.enter(ConnectorState::Subscribing);
    }

    /// Pump feed events until a fault or shutdown; returns the next state
    async fn stream_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> ConnectorState {
        let venue = self.venue();
        let keepalive_period = self
            .feed
            .keepalive_interval()
            .unwrap_or(Duration::from_secs(3600));
        let mut keepalive = tokio::time::interval(keepalive_period);
        keepalive.reset();

        loop {
            tokio::select! {
                event = timeout(WS_INACTIVITY, self.feed.next_event()) => {
                    match event {
                        Err(_) => {
                            tracing::warn!("{}: no events for {:?}", venue, WS_INACTIVITY);
                            return ConnectorState::Reconnecting;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!("{}: feed error: {}", venue, e);
                            return ConnectorState::Reconnecting;
                        }
                        Ok(Ok(None)) => {
                            tracing::warn!("{}: transport closed", venue);
                            return ConnectorState::Reconnecting;
                        }
                        Ok(Ok(Some(FeedEvent::Book(event)))) => {
                            self.metrics.record_message(venue);
                            self.health.record_activity(venue);
                            if let Err(pair) = self.handle_book(event) {
                                self.enter(ConnectorState::Degraded);
                                if let Err(e) = self.resync(&pair).await {
                                    tracing::warn!("{}: resync of {} failed: {}", venue, pair, e);
                                    return ConnectorState::Reconnecting;
                                }
                            }
                            self.flush_due();
                        }
                        Ok(Ok(Some(_))) => {
                            self.health.record_activity(venue);
                        }
                    }
                }
                _ = keepalive.tick() => {
                    if let Err(e) = self.feed.keepalive().await {
                        tracing::warn!("{}: keepalive failed: {}", venue, e);
                        return ConnectorState::Reconnecting;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return ConnectorState::Stopped;
                    }
                }
            }
        }
    }

    /// Apply one event to its shadow book; `Err(pair)` signals a gap
    fn handle_book(&mut self, event: BookEvent) -> Result<(), Pair> {
        let pair = event.pair.clone();
        let shadow = self.shadows.entry(pair.clone()).or_default();

        match shadow.apply(&event) {
            Applied::Gap => {
                tracing::warn!("{}: sequence gap on {}", self.venue(), pair);
                return Err(pair);
            }
            Applied::Skipped => return Ok(()),
            Applied::Changed => {}
        }

        self.publish_if_due(&pair);
        Ok(())
    }

    /// Publish a dirty shadow if its coalescing window has elapsed
    fn publish_if_due(&mut self, pair: &Pair) {
        let venue = self.venue();
        let Some(shadow) = self.shadows.get_mut(pair) else {
            return;
        };
        if !shadow.dirty {
            return;
        }
        let due = shadow
            .last_published
            .map(|t| t.elapsed() >= self.coalesce)
            .unwrap_or(true);
        if !due {
            return;
        }

        let (bids, asks) = shadow.top(self.depth_levels);
        let mut snapshot = BookSnapshot::new(venue, pair.clone(), bids, asks);
        snapshot.seq = shadow.last_seq;
        snapshot.ts_exchange = shadow.ts_exchange;

        match self.store.put(snapshot) {
            Ok(()) => {
                shadow.dirty = false;
                shadow.last_published = Some(Instant::now());
                self.metrics.record_book_published();
                if self.state != ConnectorState::Streaming {
                    self.backoff.reset();
                    self.enter(ConnectorState::Streaming);
                }
            }
            Err(BookError::NotNewer) => {}
            Err(e) => {
                // Invalid until the next full refresh
                tracing::debug!("{}: rejected snapshot for {}: {}", venue, pair, e);
                shadow.dirty = false;
                shadow.synced = false;
                self.store.remove(venue, pair);
            }
        }
    }

    /// Flush any other dirty shadows whose window has elapsed
    fn flush_due(&mut self) {
        let due: Vec<Pair> = self
            .shadows
            .iter()
            .filter(|(_, shadow)| {
                shadow.dirty
                    && shadow
                        .last_published
                        .map(|t| t.elapsed() >= self.coalesce)
                        .unwrap_or(true)
            })
            .map(|(pair, _)| pair.clone())
            .collect();
        for pair in due {
            self.publish_if_due(&pair);
        }
    }

    /// Targeted resubscribe after a sequence gap; the venue answers a fresh
    /// subscription with a full snapshot
    async fn resync(&mut self, pair: &Pair) -> Result<(), super::FeedError> {
        let venue = self.venue();
        self.store.remove(venue, pair);
        if let Some(shadow) = self.shadows.get_mut(pair) {
            shadow.reset();
        }

        let Some(market) = self.registry.market(venue, pair) else {
            return Ok(());
        };
        let markets = [market];
        self.feed.unsubscribe(&markets).await?;
        self.feed.subscribe(&markets).await
    }
}

/// Sleep that honors shutdown; returns true when shutting down
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}
