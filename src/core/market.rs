//! Instrument metadata discovered from venue REST endpoints

use rust_decimal::Decimal;

use super::{Pair, VenueId};

/// One tradable instrument on one venue
///
/// Created at connector startup from the venue's public instruments
/// endpoint and never deleted; a delisted instrument is marked inactive on
/// the next discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    pub venue: VenueId,
    pub pair: Pair,
    /// Spelling the venue uses on the wire (`BTCUSDT`, `BTC-USDT`, ...)
    pub native_symbol: String,
    pub price_precision: u32,
    pub size_precision: u32,
    /// Smallest order value the venue accepts, in quote units
    pub min_notional: Option<Decimal>,
    pub active: bool,
}

impl Market {
    pub fn new(venue: VenueId, pair: Pair, native_symbol: impl Into<String>) -> Self {
        Self {
            venue,
            pair,
            native_symbol: native_symbol.into(),
            price_precision: 8,
            size_precision: 8,
            min_notional: None,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_defaults() {
        let market = Market::new(VenueId::Okx, Pair::new("BTC", "USDT"), "BTC-USDT");
        assert!(market.active);
        assert_eq!(market.native_symbol, "BTC-USDT");
        assert_eq!(market.price_precision, 8);
        assert!(market.min_notional.is_none());
    }
}
