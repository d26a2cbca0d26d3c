//! Triangular cycle detection
//!
//! Per venue, each live book contributes two directed edges to an asset
//! graph: selling the base into the quote at the bid VWAP, and buying the
//! base with the quote at the reciprocal of the ask VWAP. Cycles of length
//! three from each configured base asset are enumerated and scored with
//! one taker fee per leg.
//!
//! Enumeration is O(d^2) per base where d is the base's neighbor count;
//! bases beyond the safety bound are skipped with a warning.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};

use crate::core::{Leg, Opportunity, Pair, Side, TriOpportunity, VenueId};
use crate::depth::vwap;
use crate::fees::FeeTable;
use crate::infrastructure::{Config, Metrics};
use crate::store::BookStore;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Safety bound on a base asset's neighbor count
const DEFAULT_MAX_NEIGHBORS: usize = 200;

/// One directed conversion: `rate` units of `to` per unit of `from`
#[derive(Debug, Clone)]
struct Edge {
    to: String,
    pair: Pair,
    side: Side,
    rate: Decimal,
    taker: Decimal,
    levels: usize,
}

/// Periodic per-venue cycle scanner
pub struct TriEngine {
    store: Arc<BookStore>,
    fees: Arc<FeeTable>,
    metrics: Arc<Metrics>,
    min_notional: Decimal,
    min_gain_bps: Decimal,
    bases: Vec<String>,
    exclude: HashSet<String>,
    interval: Duration,
    max_neighbors: usize,
    tx: mpsc::Sender<Opportunity>,
}

impl TriEngine {
    pub fn new(
        store: Arc<BookStore>,
        fees: Arc<FeeTable>,
        metrics: Arc<Metrics>,
        config: &Config,
        tx: mpsc::Sender<Opportunity>,
    ) -> Self {
        Self {
            store,
            fees,
            metrics,
            min_notional: config.min_notional,
            min_gain_bps: config.min_tri_gain_bps,
            bases: config.tri_bases.clone(),
            exclude: config.tri_exclude_quotes.iter().cloned().collect(),
            interval: config.tri_scan,
            max_neighbors: DEFAULT_MAX_NEIGHBORS,
            tx,
        }
    }

    /// Scan loop; returns on shutdown with the in-progress scan completed
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!("tri engine started, scanning every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.metrics.record_tri_scan();
                    for opp in self.scan() {
                        self.metrics.record_tri_found();
                        if self.tx.try_send(Opportunity::Tri(opp)).is_err() {
                            tracing::warn!("tri engine: emitter channel full, dropping");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("tri engine stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One full scan; every venue is scanned independently
    pub fn scan(&self) -> Vec<TriOpportunity> {
        let mut found = Vec::new();
        for venue in VenueId::ALL {
            self.scan_venue(venue, &mut found);
        }
        // Highest net gain first, fewer levels walked breaking ties
        found.sort_by(|a, b| {
            b.net_bps
                .cmp(&a.net_bps)
                .then(a.levels_used.cmp(&b.levels_used))
        });
        found
    }

    fn scan_venue(&self, venue: VenueId, found: &mut Vec<TriOpportunity>) {
        let adjacency = self.build_graph(venue);
        if adjacency.is_empty() {
            return;
        }

        for base in &self.bases {
            let Some(edges) = adjacency.get(base.as_str()) else {
                continue;
            };
            if edges.len() > self.max_neighbors {
                tracing::warn!(
                    "{}: base {} has {} neighbors (bound {}), skipping",
                    venue,
                    base,
                    edges.len(),
                    self.max_neighbors
                );
                continue;
            }

            for e1 in edges {
                // Intermediates must differ from the base and be allowed
                if e1.to == *base || self.exclude.contains(&e1.to) {
                    continue;
                }
                let Some(second) = adjacency.get(e1.to.as_str()) else {
                    continue;
                };
                for e2 in second {
                    if e2.to == *base || e2.to == e1.to || self.exclude.contains(&e2.to) {
                        continue;
                    }
                    let Some(third) = adjacency.get(e2.to.as_str()) else {
                        continue;
                    };
                    for e3 in third.iter().filter(|e| e.to == *base) {
                        if let Some(opp) = self.score_cycle(venue, base, e1, e2, e3) {
                            found.push(opp);
                        }
                    }
                }
            }
        }
    }

    /// Directed rate graph over a venue's live, fee-covered books
    fn build_graph(&self, venue: VenueId) -> HashMap<String, Vec<Edge>> {
        let mut adjacency: HashMap<String, Vec<Edge>> = HashMap::new();

        for book in self.store.live_books_of(venue) {
            let Some(taker) = self.fees.taker(venue, &book.pair) else {
                continue;
            };
            let base = book.pair.base().to_string();
            let quote = book.pair.quote().to_string();

            // Sell base into quote at the bid VWAP
            if let Some(fill) = vwap(&book.bids, self.min_notional) {
                adjacency.entry(base.clone()).or_default().push(Edge {
                    to: quote.clone(),
                    pair: book.pair.clone(),
                    side: Side::Sell,
                    rate: fill.vwap,
                    taker,
                    levels: fill.levels_used,
                });
            }
            // Buy base with quote at the reciprocal of the ask VWAP
            if let Some(fill) = vwap(&book.asks, self.min_notional) {
                adjacency.entry(quote).or_default().push(Edge {
                    to: base,
                    pair: book.pair.clone(),
                    side: Side::Buy,
                    rate: Decimal::ONE / fill.vwap,
                    taker,
                    levels: fill.levels_used,
                });
            }
        }

        adjacency
    }

    fn score_cycle(
        &self,
        venue: VenueId,
        base: &str,
        e1: &Edge,
        e2: &Edge,
        e3: &Edge,
    ) -> Option<TriOpportunity> {
        let r = e1.rate * e2.rate * e3.rate;
        let net_factor = r
            * (Decimal::ONE - e1.taker)
            * (Decimal::ONE - e2.taker)
            * (Decimal::ONE - e3.taker);

        let gross_bps = (r - Decimal::ONE) * BPS;
        let net_bps = (net_factor - Decimal::ONE) * BPS;

        if net_bps < self.min_gain_bps {
            return None;
        }

        Some(TriOpportunity {
            venue,
            legs: [
                Leg { pair: e1.pair.clone(), side: e1.side },
                Leg { pair: e2.pair.clone(), side: e2.side },
                Leg { pair: e3.pair.clone(), side: e3.side },
            ],
            base: base.to_string(),
            gross_bps,
            net_bps,
            levels_used: e1.levels + e2.levels + e3.levels,
            t_detected: Utc::now(),
        })
    }
}
