//! Symbol registry
//!
//! Translates venue-native pair spellings (`BTCUSDT`, `BTC-USDT`,
//! `BTC_USDT`, `XBTUSDT`, ...) to canonical pairs and back, and tracks the
//! markets each venue supports. Populated from venue instruments endpoints
//! at startup; rebuilt atomically per venue on reload.
//!
//! Quote detection uses a preferred-suffix list ordered longest-first, so
//! `BTCUSDT` resolves as BTC/USDT rather than BTCUSD + T. Asset aliases
//! (XBT, XDG) are applied before canonicalization.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::core::{Market, Pair, VenueId};

/// Recognized quote assets, longest spelling first
const QUOTE_ASSETS: [&str; 10] = [
    "FDUSD", "USDT", "USDC", "TUSD", "TRY", "EUR", "USD", "BTC", "ETH", "BNB",
];

/// Venue-specific asset spellings mapped to canonical codes
fn apply_alias(asset: &str) -> &str {
    match asset {
        "XBT" => "BTC",
        "XDG" => "DOGE",
        _ => asset,
    }
}

/// Split a native symbol into a canonical pair
///
/// Handles explicit separators (`BTC-USDT`, `BTC_USDT`, `BTC/USDT`) and the
/// concatenated form (`BTCUSDT`) via longest-suffix quote matching. Returns
/// `None` when the quote is not in the recognized set or the base would be
/// empty.
pub fn split_native(symbol: &str) -> Option<Pair> {
    let upper = symbol.trim().to_ascii_uppercase();

    for sep in ['/', '-', '_'] {
        if let Some((base, quote)) = upper.split_once(sep) {
            if base.is_empty() || !QUOTE_ASSETS.contains(&apply_alias(quote)) {
                return None;
            }
            return Some(Pair::new(apply_alias(base), apply_alias(quote)));
        }
    }

    // Concatenated form: longest recognized suffix wins
    for quote in QUOTE_ASSETS {
        if let Some(base) = upper.strip_suffix(quote) {
            if base.is_empty() {
                return None;
            }
            return Some(Pair::new(apply_alias(base), quote));
        }
    }

    None
}

/// Canonicalize explicit base/quote codes from an instruments endpoint
///
/// Same alias and quote-set rules as [`split_native`], for venues that
/// report the assets separately instead of a joined symbol.
pub fn canonical_pair(base: &str, quote: &str) -> Option<Pair> {
    let base_up = base.trim().to_ascii_uppercase();
    let quote_up = quote.trim().to_ascii_uppercase();
    let base_canon = apply_alias(&base_up);
    let quote_canon = apply_alias(&quote_up);
    if base_canon.is_empty() || !QUOTE_ASSETS.contains(&quote_canon) {
        return None;
    }
    Some(Pair::new(base_canon, quote_canon))
}

#[derive(Default)]
struct Inner {
    /// One market per (venue, canonical pair)
    markets: HashMap<(VenueId, Pair), Market>,
    /// native spelling -> canonical, per venue
    by_native: HashMap<VenueId, HashMap<String, Pair>>,
    /// Symbols already reported as unresolvable, to log once per venue
    skipped: HashSet<(VenueId, String)>,
}

/// Per-venue native <-> canonical mapping plus market metadata
pub struct SymbolRegistry {
    inner: RwLock<Inner>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Replace a venue's markets with a fresh discovery result
    ///
    /// Duplicate canonical pairs keep the first market seen; the rest are
    /// counted as skipped. The swap is atomic per venue: readers see either
    /// the old or the new mapping, never a mix.
    pub fn load(&self, venue: VenueId, markets: Vec<Market>) {
        let mut by_native = HashMap::with_capacity(markets.len());
        let mut by_pair = HashMap::with_capacity(markets.len());
        let mut duplicates = 0usize;

        for market in markets {
            debug_assert_eq!(market.venue, venue);
            if by_pair.contains_key(&(venue, market.pair.clone())) {
                duplicates += 1;
                continue;
            }
            by_native.insert(market.native_symbol.clone(), market.pair.clone());
            by_pair.insert((venue, market.pair.clone()), market);
        }

        if duplicates > 0 {
            tracing::warn!("{}: dropped {} duplicate canonical pairs", venue, duplicates);
        }

        let count = by_native.len();
        let mut inner = self.inner.write();
        inner.markets.retain(|(v, _), _| *v != venue);
        inner.markets.extend(by_pair);
        inner.by_native.insert(venue, by_native);
        tracing::info!("{}: registry loaded {} markets", venue, count);
    }

    /// Native spelling to canonical pair; unresolvable symbols are logged
    /// once per (venue, symbol) and skipped
    pub fn canonicalize(&self, venue: VenueId, native: &str) -> Option<Pair> {
        {
            let inner = self.inner.read();
            if let Some(pair) = inner.by_native.get(&venue).and_then(|m| m.get(native)) {
                return Some(pair.clone());
            }
            if inner.skipped.contains(&(venue, native.to_string())) {
                return None;
            }
        }

        let mut inner = self.inner.write();
        if inner.skipped.insert((venue, native.to_string())) {
            tracing::warn!("{}: unresolvable symbol {:?}, skipping", venue, native);
        }
        None
    }

    /// Canonical pair to the venue's native spelling
    pub fn native(&self, venue: VenueId, pair: &Pair) -> Option<String> {
        self.inner
            .read()
            .markets
            .get(&(venue, pair.clone()))
            .map(|m| m.native_symbol.clone())
    }

    pub fn market(&self, venue: VenueId, pair: &Pair) -> Option<Market> {
        self.inner.read().markets.get(&(venue, pair.clone())).cloned()
    }

    /// Active markets for one venue
    pub fn markets_of(&self, venue: VenueId) -> Vec<Market> {
        self.inner
            .read()
            .markets
            .values()
            .filter(|m| m.venue == venue && m.active)
            .cloned()
            .collect()
    }

    /// Canonical pairs a venue supports
    pub fn pairs_of(&self, venue: VenueId) -> HashSet<Pair> {
        self.inner
            .read()
            .markets
            .values()
            .filter(|m| m.venue == venue && m.active)
            .map(|m| m.pair.clone())
            .collect()
    }

    /// Venues listing a given canonical pair
    pub fn venues_of(&self, pair: &Pair) -> Vec<VenueId> {
        let inner = self.inner.read();
        let mut venues: Vec<VenueId> = inner
            .markets
            .keys()
            .filter(|(_, p)| p == pair)
            .map(|(v, _)| *v)
            .collect();
        venues.sort();
        venues
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(venue: VenueId, base: &str, quote: &str, native: &str) -> Market {
        Market::new(venue, Pair::new(base, quote), native)
    }

    #[test]
    fn test_split_concatenated() {
        assert_eq!(split_native("BTCUSDT"), Some(Pair::new("BTC", "USDT")));
        assert_eq!(split_native("ETHBTC"), Some(Pair::new("ETH", "BTC")));
        assert_eq!(split_native("BTCFDUSD"), Some(Pair::new("BTC", "FDUSD")));
    }

    #[test]
    fn test_split_longest_suffix_wins() {
        // USDT must win over USD despite USD also being a suffix of the string
        assert_eq!(split_native("SOLUSDT"), Some(Pair::new("SOL", "USDT")));
        assert_eq!(split_native("SOLUSD"), Some(Pair::new("SOL", "USD")));
    }

    #[test]
    fn test_split_separators() {
        assert_eq!(split_native("BTC-USDT"), Some(Pair::new("BTC", "USDT")));
        assert_eq!(split_native("btc_usdt"), Some(Pair::new("BTC", "USDT")));
        assert_eq!(split_native("ETH/BTC"), Some(Pair::new("ETH", "BTC")));
    }

    #[test]
    fn test_split_applies_aliases() {
        assert_eq!(split_native("XBTUSD"), Some(Pair::new("BTC", "USD")));
        assert_eq!(split_native("XDG-USDT"), Some(Pair::new("DOGE", "USDT")));
    }

    #[test]
    fn test_canonical_pair() {
        assert_eq!(canonical_pair("btc", "usdt"), Some(Pair::new("BTC", "USDT")));
        assert_eq!(canonical_pair("XBT", "USD"), Some(Pair::new("BTC", "USD")));
        assert!(canonical_pair("BTC", "XYZ").is_none());
        assert!(canonical_pair("", "USDT").is_none());
    }

    #[test]
    fn test_split_unrecognized_quote_dropped() {
        assert!(split_native("BTCXYZ").is_none());
        assert!(split_native("ABC-XYZ").is_none());
        assert!(split_native("USDT").is_none());
        assert!(split_native("").is_none());
    }

    #[test]
    fn test_canonicalize_and_native_roundtrip() {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Okx,
            vec![
                market(VenueId::Okx, "BTC", "USDT", "BTC-USDT"),
                market(VenueId::Okx, "ETH", "BTC", "ETH-BTC"),
            ],
        );

        for native in ["BTC-USDT", "ETH-BTC"] {
            let pair = registry.canonicalize(VenueId::Okx, native).unwrap();
            assert_eq!(registry.native(VenueId::Okx, &pair).unwrap(), native);
        }
    }

    #[test]
    fn test_unresolvable_symbol_skipped() {
        let registry = SymbolRegistry::new();
        registry.load(VenueId::Binance, vec![]);
        assert!(registry.canonicalize(VenueId::Binance, "NOPEUSDT").is_none());
        // Second lookup hits the skip cache
        assert!(registry.canonicalize(VenueId::Binance, "NOPEUSDT").is_none());
    }

    #[test]
    fn test_duplicate_canonical_keeps_first() {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Binance,
            vec![
                market(VenueId::Binance, "BTC", "USDT", "BTCUSDT"),
                market(VenueId::Binance, "BTC", "USDT", "XBTUSDT"),
            ],
        );
        assert_eq!(
            registry.native(VenueId::Binance, &Pair::new("BTC", "USDT")).unwrap(),
            "BTCUSDT"
        );
    }

    #[test]
    fn test_reload_replaces_venue() {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Bybit,
            vec![market(VenueId::Bybit, "BTC", "USDT", "BTCUSDT")],
        );
        registry.load(
            VenueId::Bybit,
            vec![market(VenueId::Bybit, "ETH", "USDT", "ETHUSDT")],
        );

        assert!(registry.native(VenueId::Bybit, &Pair::new("BTC", "USDT")).is_none());
        assert!(registry.native(VenueId::Bybit, &Pair::new("ETH", "USDT")).is_some());
    }

    #[test]
    fn test_venues_of() {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Binance,
            vec![market(VenueId::Binance, "BTC", "USDT", "BTCUSDT")],
        );
        registry.load(
            VenueId::Okx,
            vec![market(VenueId::Okx, "BTC", "USDT", "BTC-USDT")],
        );

        assert_eq!(
            registry.venues_of(&Pair::new("BTC", "USDT")),
            vec![VenueId::Binance, VenueId::Okx]
        );
        assert!(registry.venues_of(&Pair::new("ETH", "USDT")).is_empty());
    }
}
