//! Cross-exchange spread detection
//!
//! Every scan walks the pairs with live books on at least two venues and
//! scores every ordered venue pair: buy against the asks on one venue,
//! sell against the bids on another, both at the configured target
//! notional. At most one opportunity survives per pair and scan.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};

use crate::core::{CrossOpportunity, Opportunity, Pair, VenueId};
use crate::depth::vwap;
use crate::fees::FeeTable;
use crate::infrastructure::{Config, Metrics};
use crate::store::BookStore;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Periodic cross-venue scanner
pub struct CrossEngine {
    store: Arc<BookStore>,
    fees: Arc<FeeTable>,
    metrics: Arc<Metrics>,
    min_notional: Decimal,
    min_spread_bps: Decimal,
    interval: Duration,
    tx: mpsc::Sender<Opportunity>,
}

impl CrossEngine {
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
            min_spread_bps: config.min_spread_bps,
            interval: config.cross_scan,
            tx,
        }
    }

    /// Scan loop; returns on shutdown with the in-progress scan completed
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!("cross engine started, scanning every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.metrics.record_cross_scan();
                    for opp in self.scan() {
                        self.metrics.record_cross_found();
                        if self.tx.try_send(Opportunity::Cross(opp)).is_err() {
                            tracing::warn!("cross engine: emitter channel full, dropping");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("cross engine stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One full scan over the store; best opportunity per pair
    pub fn scan(&self) -> Vec<CrossOpportunity> {
        let mut found = Vec::new();

        for (pair, venues) in self.store.pairs_with_min_venues(2) {
            let mut best: Option<CrossOpportunity> = None;

            for &buy in &venues {
                for &sell in &venues {
                    if buy == sell {
                        continue;
                    }
                    if let Some(candidate) = self.score(&pair, buy, sell) {
                        let replace = match &best {
                            None => true,
                            Some(current) => prefer(&candidate, current),
                        };
                        if replace {
                            best = Some(candidate);
                        }
                    }
                }
            }

            if let Some(opp) = best {
                found.push(opp);
            }
        }

        found
    }

    /// Score one ordered venue pair for one trading pair
    fn score(&self, pair: &Pair, buy_venue: VenueId, sell_venue: VenueId) -> Option<CrossOpportunity> {
        // Missing fee means the market is not scoreable
        let buy_taker = self.fees.taker(buy_venue, pair)?;
        let sell_taker = self.fees.taker(sell_venue, pair)?;

        // get() already hides stale books
        let buy_book = self.store.get(buy_venue, pair)?;
        let sell_book = self.store.get(sell_venue, pair)?;

        let buy = vwap(&buy_book.asks, self.min_notional)?;
        let sell = vwap(&sell_book.bids, self.min_notional)?;

        let gross_bps = (sell.vwap / buy.vwap - Decimal::ONE) * BPS;
        let net_bps = gross_bps - (buy_taker + sell_taker) * BPS;

        if net_bps < self.min_spread_bps {
            return None;
        }

        let fillable = buy.filled_notional.min(sell.filled_notional);
        Some(CrossOpportunity {
            pair: pair.clone(),
            buy_venue,
            sell_venue,
            notional: fillable,
            gross_bps,
            net_bps,
            buy_vwap: buy.vwap,
            sell_vwap: sell.vwap,
            fillable_notional: fillable,
            buy_levels: buy.levels_used,
            sell_levels: sell.levels_used,
            t_detected: Utc::now(),
        })
    }
}

/// Tie-break: max net_bps, then max fillable notional, then lexicographic
/// (buy_venue, sell_venue)
fn prefer(candidate: &CrossOpportunity, current: &CrossOpportunity) -> bool {
    if candidate.net_bps != current.net_bps {
        return candidate.net_bps > current.net_bps;
    }
    if candidate.fillable_notional != current.fillable_notional {
        return candidate.fillable_notional > current.fillable_notional;
    }
    (candidate.buy_venue.name(), candidate.sell_venue.name())
        < (current.buy_venue.name(), current.sell_venue.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BookSnapshot, PriceLevel};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Instant;

    fn book(venue: VenueId, bid: Decimal, ask: Decimal) -> BookSnapshot {
        BookSnapshot::new(
            venue,
            Pair::new("BTC", "USDT"),
            vec![PriceLevel::new(bid, dec!(1))],
            vec![PriceLevel::new(ask, dec!(1))],
        )
    }

    fn engine(store: Arc<BookStore>, overrides: &[(&str, &str)]) -> CrossEngine {
        let mut vars: HashMap<String, String> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.insert("MIN_SPREAD_BPS".to_string(), "10".to_string());
        vars.insert("MIN_NOTIONAL".to_string(), "100".to_string());
        let config = Config::from_vars(vars).unwrap();
        let fees = Arc::new(config.fees.clone());
        let (tx, _rx) = mpsc::channel(16);
        CrossEngine::new(store, fees, Arc::new(Metrics::new()), &config, tx)
    }

    fn flat_fee_engine(store: Arc<BookStore>, taker: &str) -> CrossEngine {
        let overrides: Vec<(String, String)> = VenueId::ALL
            .iter()
            .map(|v| {
                (
                    format!("FEE_OVERRIDE_{}_TAKER", v.name().to_ascii_uppercase()),
                    taker.to_string(),
                )
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = overrides
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        engine(store, &borrowed)
    }

    #[test]
    fn test_positive_spread_detected() {
        // S1: buy binance @30000, sell bybit @30100, 10 bps taker each
        let store = Arc::new(BookStore::new(Duration::from_secs(5)));
        store.put(book(VenueId::Binance, dec!(29990), dec!(30000))).unwrap();
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();

        let engine = flat_fee_engine(Arc::clone(&store), "0.001");
        let found = engine.scan();
        assert_eq!(found.len(), 1);

        let opp = &found[0];
        assert_eq!(opp.buy_venue, VenueId::Binance);
        assert_eq!(opp.sell_venue, VenueId::Bybit);
        assert_eq!(opp.notional, dec!(100));
        // gross = (30100/30000 - 1) * 10000 = 33.33..
        assert!(opp.gross_bps > dec!(33.3) && opp.gross_bps < dec!(33.4));
        // net = gross - 20
        assert!(opp.net_bps > dec!(13.3) && opp.net_bps < dec!(13.4));
        assert!(opp.net_bps <= opp.gross_bps);
    }

    #[test]
    fn test_fee_suppressed_spread() {
        // S2: same prices, 20 bps taker each eats the whole spread
        let store = Arc::new(BookStore::new(Duration::from_secs(5)));
        store.put(book(VenueId::Binance, dec!(29990), dec!(30000))).unwrap();
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();

        let engine = flat_fee_engine(store, "0.002");
        assert!(engine.scan().is_empty());
    }

    #[test]
    fn test_crossed_book_never_scored() {
        // S3: the crossed snapshot is rejected upstream, so the pair has
        // one live venue and never reaches scoring
        let store = Arc::new(BookStore::new(Duration::from_secs(5)));
        assert!(store.put(book(VenueId::Binance, dec!(30000), dec!(29900))).is_err());
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();

        let engine = flat_fee_engine(store, "0.001");
        assert!(engine.scan().is_empty());
    }

    #[test]
    fn test_stale_book_invisible() {
        let store = Arc::new(BookStore::new(Duration::from_millis(50)));
        let mut old = book(VenueId::Binance, dec!(29990), dec!(30000));
        old.ts_local = Instant::now() - Duration::from_millis(200);
        store.put(old).unwrap();
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();

        let engine = flat_fee_engine(store, "0.001");
        assert!(engine.scan().is_empty());
    }

    #[test]
    fn test_unfillable_depth_skipped() {
        // Asks hold only 0.001 BTC ~ 30 quote units, below MIN_NOTIONAL
        let store = Arc::new(BookStore::new(Duration::from_secs(5)));
        let mut thin = book(VenueId::Binance, dec!(29990), dec!(30000));
        thin.asks[0].size = dec!(0.001);
        store.put(thin).unwrap();
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();

        let engine = flat_fee_engine(store, "0.001");
        assert!(engine.scan().is_empty());
    }

    #[test]
    fn test_best_venue_pair_wins() {
        // okx sells higher than bybit; the okx leg must win the tie-break
        let store = Arc::new(BookStore::new(Duration::from_secs(5)));
        store.put(book(VenueId::Binance, dec!(29990), dec!(30000))).unwrap();
        store.put(book(VenueId::Bybit, dec!(30100), dec!(30110))).unwrap();
        store.put(book(VenueId::Okx, dec!(30200), dec!(30210))).unwrap();

        let engine = flat_fee_engine(store, "0.001");
        let found = engine.scan();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].buy_venue, VenueId::Binance);
        assert_eq!(found[0].sell_venue, VenueId::Okx);
    }

    #[test]
    fn test_prefer_ordering() {
        let mk = |net: Decimal, fillable: Decimal, buy: VenueId, sell: VenueId| CrossOpportunity {
            pair: Pair::new("BTC", "USDT"),
            buy_venue: buy,
            sell_venue: sell,
            notional: fillable,
            gross_bps: net,
            net_bps: net,
            buy_vwap: dec!(1),
            sell_vwap: dec!(1),
            fillable_notional: fillable,
            buy_levels: 1,
            sell_levels: 1,
            t_detected: Utc::now(),
        };

        let base = mk(dec!(20), dec!(100), VenueId::Bybit, VenueId::Okx);
        assert!(prefer(&mk(dec!(21), dec!(100), VenueId::Okx, VenueId::Bybit), &base));
        assert!(prefer(&mk(dec!(20), dec!(200), VenueId::Okx, VenueId::Bybit), &base));
        // Equal bps and notional: lexicographic venue names win
        assert!(prefer(&mk(dec!(20), dec!(100), VenueId::Binance, VenueId::Okx), &base));
        assert!(!prefer(&mk(dec!(19), dec!(999), VenueId::Binance, VenueId::Okx), &base));
    }
}
