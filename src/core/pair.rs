//! Canonical trading pair
//!
//! A pair is `(base, quote)` with uppercase asset codes. The canonical
//! string form is `BASE/QUOTE`. Venue-native spellings (`BTCUSDT`,
//! `BTC-USDT`, ...) are translated by the symbol registry; everything past
//! the connectors speaks canonical pairs only.

use std::fmt;
use std::str::FromStr;

/// Canonical trading pair: uppercase `base` priced in uppercase `quote`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    /// Create a pair, normalizing both assets to uppercase
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.trim().to_ascii_uppercase(),
            quote: quote.trim().to_ascii_uppercase(),
        }
    }

    #[inline(always)]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[inline(always)]
    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// True if either side of the pair is `asset`
    pub fn touches(&self, asset: &str) -> bool {
        self.base == asset || self.quote == asset
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.trim().is_empty() && !quote.trim().is_empty() => {
                Ok(Pair::new(base, quote))
            }
            _ => Err(PairParseError(s.to_string())),
        }
    }
}

/// Error for strings that are not `BASE/QUOTE`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pair: {0:?} (expected BASE/QUOTE)")]
pub struct PairParseError(pub String);

impl serde::Serialize for Pair {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uppercases() {
        let pair = Pair::new("btc", "usdt");
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.quote(), "USDT");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }

    #[test]
    fn test_parse() {
        let pair: Pair = "ETH/BTC".parse().unwrap();
        assert_eq!(pair, Pair::new("ETH", "BTC"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("BTCUSDT".parse::<Pair>().is_err());
        assert!("BTC/".parse::<Pair>().is_err());
        assert!("/USDT".parse::<Pair>().is_err());
        assert!("A/B/C".parse::<Pair>().is_err());
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(Pair::new("btc", "USDT"), Pair::new("BTC", "usdt"));
        assert_ne!(Pair::new("BTC", "USDT"), Pair::new("USDT", "BTC"));
    }

    #[test]
    fn test_touches() {
        let pair = Pair::new("ETH", "BTC");
        assert!(pair.touches("ETH"));
        assert!(pair.touches("BTC"));
        assert!(!pair.touches("USDT"));
    }
}
