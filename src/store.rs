//! Shared book store
//!
//! Concurrent map from (venue, canonical pair) to the latest validated
//! snapshot. Values are atomically replaceable `Arc` pointers: writers
//! publish a new pointer, readers clone it and release the lock, so no
//! lock is held across engine work.
//!
//! Snapshots older than the staleness window are invisible to readers;
//! they are dropped lazily on the next write to the same key.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::{BookError, BookSnapshot, Pair, VenueId};

/// In-memory store of the freshest book per (venue, pair)
pub struct BookStore {
    books: RwLock<HashMap<(VenueId, Pair), Arc<BookSnapshot>>>,
    max_staleness: Duration,
    rejected: AtomicU64,
}

impl BookStore {
    pub fn new(max_staleness: Duration) -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            max_staleness,
            rejected: AtomicU64::new(0),
        }
    }

    /// Atomically replace the snapshot for its (venue, pair)
    ///
    /// Rejects crossed, unsorted or non-positive books, and snapshots whose
    /// `ts_local` does not advance past the published one. Rejections are
    /// counted; the caller decides whether to invalidate the existing entry.
    pub fn put(&self, snapshot: BookSnapshot) -> Result<(), BookError> {
        if let Err(e) = snapshot.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let key = (snapshot.venue, snapshot.pair.clone());
        let mut books = self.books.write();

        if let Some(prev) = books.get(&key) {
            if snapshot.ts_local <= prev.ts_local {
                drop(books);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(BookError::NotNewer);
            }
        }

        books.insert(key, Arc::new(snapshot));
        Ok(())
    }

    /// Latest snapshot, or `None` if absent or older than the staleness
    /// window
    pub fn get(&self, venue: VenueId, pair: &Pair) -> Option<Arc<BookSnapshot>> {
        let books = self.books.read();
        let snapshot = books.get(&(venue, pair.clone()))?;
        if snapshot.age() > self.max_staleness {
            return None;
        }
        Some(Arc::clone(snapshot))
    }

    /// Drop the entry for (venue, pair), making the book invalid until the
    /// next full refresh
    pub fn remove(&self, venue: VenueId, pair: &Pair) {
        self.books.write().remove(&(venue, pair.clone()));
    }

    /// Pairs with a live (non-stale) book on this venue
    pub fn pairs_of(&self, venue: VenueId) -> HashSet<Pair> {
        self.books
            .read()
            .iter()
            .filter(|((v, _), snap)| *v == venue && snap.age() <= self.max_staleness)
            .map(|((_, pair), _)| pair.clone())
            .collect()
    }

    /// Venues with a live book for this pair, in stable order
    pub fn venues_of(&self, pair: &Pair) -> Vec<VenueId> {
        let mut venues: Vec<VenueId> = self
            .books
            .read()
            .iter()
            .filter(|((_, p), snap)| p == pair && snap.age() <= self.max_staleness)
            .map(|((v, _), _)| *v)
            .collect();
        venues.sort();
        venues
    }

    /// Pairs carried live by at least `min_venues` venues, with those venues
    pub fn pairs_with_min_venues(&self, min_venues: usize) -> Vec<(Pair, Vec<VenueId>)> {
        let books = self.books.read();
        let mut by_pair: HashMap<&Pair, Vec<VenueId>> = HashMap::new();
        for ((venue, pair), snap) in books.iter() {
            if snap.age() <= self.max_staleness {
                by_pair.entry(pair).or_default().push(*venue);
            }
        }

        let mut out: Vec<(Pair, Vec<VenueId>)> = by_pair
            .into_iter()
            .filter(|(_, venues)| venues.len() >= min_venues)
            .map(|(pair, mut venues)| {
                venues.sort();
                (pair.clone(), venues)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// All live snapshots on a venue
    pub fn live_books_of(&self, venue: VenueId) -> Vec<Arc<BookSnapshot>> {
        self.books
            .read()
            .iter()
            .filter(|((v, _), snap)| *v == venue && snap.age() <= self.max_staleness)
            .map(|(_, snap)| Arc::clone(snap))
            .collect()
    }

    /// Snapshots rejected since startup
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PriceLevel;
    use rust_decimal_macros::dec;
    use std::time::Instant;

    fn snapshot(venue: VenueId, base: &str) -> BookSnapshot {
        BookSnapshot::new(
            venue,
            Pair::new(base, "USDT"),
            vec![PriceLevel::new(dec!(100), dec!(1))],
            vec![PriceLevel::new(dec!(101), dec!(1))],
        )
    }

    fn store() -> BookStore {
        BookStore::new(Duration::from_millis(5000))
    }

    #[test]
    fn test_put_get() {
        let store = store();
        store.put(snapshot(VenueId::Binance, "BTC")).unwrap();

        let snap = store.get(VenueId::Binance, &Pair::new("BTC", "USDT")).unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(100));
        assert!(store.get(VenueId::Bybit, &Pair::new("BTC", "USDT")).is_none());
    }

    #[test]
    fn test_crossed_snapshot_rejected() {
        let store = store();
        let mut snap = snapshot(VenueId::Binance, "BTC");
        snap.bids[0].price = dec!(102);
        assert_eq!(store.put(snap), Err(BookError::Crossed));
        assert_eq!(store.rejected_count(), 1);
        assert!(store.get(VenueId::Binance, &Pair::new("BTC", "USDT")).is_none());
    }

    #[test]
    fn test_non_advancing_ts_rejected() {
        let store = store();
        let first = snapshot(VenueId::Binance, "BTC");
        let ts = first.ts_local;
        store.put(first).unwrap();

        let mut replay = snapshot(VenueId::Binance, "BTC");
        replay.ts_local = ts;
        assert_eq!(store.put(replay), Err(BookError::NotNewer));
    }

    #[test]
    fn test_newer_snapshot_replaces() {
        let store = store();
        store.put(snapshot(VenueId::Binance, "BTC")).unwrap();

        let mut newer = snapshot(VenueId::Binance, "BTC");
        newer.bids[0].price = dec!(100.5);
        store.put(newer).unwrap();

        let snap = store.get(VenueId::Binance, &Pair::new("BTC", "USDT")).unwrap();
        assert_eq!(snap.best_bid().unwrap().price, dec!(100.5));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_stale_book_invisible() {
        let store = BookStore::new(Duration::from_millis(10));
        let mut old = snapshot(VenueId::Binance, "BTC");
        old.ts_local = Instant::now() - Duration::from_millis(50);
        store.put(old).unwrap();

        let pair = Pair::new("BTC", "USDT");
        assert!(store.get(VenueId::Binance, &pair).is_none());
        assert!(store.pairs_of(VenueId::Binance).is_empty());
        assert!(store.venues_of(&pair).is_empty());
        // The entry still exists, it is just invisible
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_invalidates() {
        let store = store();
        store.put(snapshot(VenueId::Binance, "BTC")).unwrap();
        store.remove(VenueId::Binance, &Pair::new("BTC", "USDT"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_pairs_with_min_venues() {
        let store = store();
        store.put(snapshot(VenueId::Binance, "BTC")).unwrap();
        store.put(snapshot(VenueId::Bybit, "BTC")).unwrap();
        store.put(snapshot(VenueId::Binance, "ETH")).unwrap();

        let pairs = store.pairs_with_min_venues(2);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, Pair::new("BTC", "USDT"));
        assert_eq!(pairs[0].1, vec![VenueId::Binance, VenueId::Bybit]);
    }

    #[test]
    fn test_live_books_of() {
        let store = store();
        store.put(snapshot(VenueId::Okx, "BTC")).unwrap();
        store.put(snapshot(VenueId::Okx, "ETH")).unwrap();
        store.put(snapshot(VenueId::Bybit, "BTC")).unwrap();
        assert_eq!(store.live_books_of(VenueId::Okx).len(), 2);
    }
}
