//! Maker/taker fee table
//!
//! Per-venue defaults with optional per-pair overrides from the
//! environment. Arbitrage legs are always charged the taker rate because
//! detections assume immediate execution.
//!
//! Override keys:
//! - `FEE_OVERRIDE_<VENUE>_MAKER` / `FEE_OVERRIDE_<VENUE>_TAKER`
//! - `FEE_OVERRIDE_<VENUE>_<BASE>_<QUOTE>_MAKER` / `..._TAKER`
//!
//! Lookup order when scoring: (venue, pair) override, then (venue) default,
//! then refusal; engines skip markets without a fee.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::{Pair, VenueId};

/// Fee rates as decimal fractions (0.001 = 10 bps)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRate {
    pub maker: Decimal,
    pub taker: Decimal,
}

/// Errors raised while loading overrides; all fatal at startup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    #[error("fee override {key}: unknown venue {venue:?}")]
    UnknownVenue { key: String, venue: String },
    #[error("fee override {key}: invalid value {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("fee override {key}: malformed key")]
    MalformedKey { key: String },
}

/// Fee table with venue defaults and per-pair overrides
#[derive(Debug, Clone)]
pub struct FeeTable {
    venue_default: HashMap<VenueId, FeeRate>,
    pair_override: HashMap<(VenueId, Pair), FeeRate>,
}

impl FeeTable {
    /// Published spot taker/maker schedules, with a conservative fallback
    /// for venues that do not publish one
    pub fn with_defaults() -> Self {
        let mut venue_default = HashMap::new();
        venue_default.insert(VenueId::Binance, FeeRate { maker: dec!(0.0002), taker: dec!(0.0005) });
        venue_default.insert(VenueId::Bybit, FeeRate { maker: dec!(0.0001), taker: dec!(0.0006) });
        venue_default.insert(VenueId::Okx, FeeRate { maker: dec!(0.0008), taker: dec!(0.0010) });
        venue_default.insert(VenueId::Kucoin, FeeRate { maker: dec!(0.0008), taker: dec!(0.0010) });
        venue_default.insert(VenueId::Mexc, FeeRate { maker: dec!(0.0000), taker: dec!(0.0020) });
        venue_default.insert(VenueId::Huobi, FeeRate { maker: dec!(0.0015), taker: dec!(0.0020) });
        venue_default.insert(VenueId::Cointr, FeeRate { maker: dec!(0.0008), taker: dec!(0.0015) });

        Self {
            venue_default,
            pair_override: HashMap::new(),
        }
    }

    /// Build the table from defaults plus `FEE_OVERRIDE_*` variables
    pub fn from_vars<I>(vars: I) -> Result<Self, FeeError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::with_defaults();

        for (key, value) in vars {
            if !key.starts_with("FEE_OVERRIDE_") {
                continue;
            }
            table.apply_override(&key, &value)?;
        }

        Ok(table)
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<(), FeeError> {
        let rest = &key["FEE_OVERRIDE_".len()..];
        let parts: Vec<&str> = rest.split('_').collect();

        // VENUE_MAKER, VENUE_TAKER, or VENUE_BASE_QUOTE_MAKER|TAKER
        let (venue_str, pair, field) = match parts.as_slice() {
            [venue, field] => (*venue, None, *field),
            [venue, base, quote, field] => (*venue, Some(Pair::new(base, quote)), *field),
            _ => return Err(FeeError::MalformedKey { key: key.to_string() }),
        };

        let venue: VenueId = venue_str.parse().map_err(|_| FeeError::UnknownVenue {
            key: key.to_string(),
            venue: venue_str.to_string(),
        })?;

        let rate: Decimal = value.trim().parse().map_err(|_| FeeError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(FeeError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        let default = self.venue_default[&venue];
        let slot = match pair {
            Some(pair) => self
                .pair_override
                .entry((venue, pair))
                .or_insert(default),
            None => self.venue_default.entry(venue).or_insert(default),
        };

        match field {
            "MAKER" => slot.maker = rate,
            "TAKER" => slot.taker = rate,
            _ => return Err(FeeError::MalformedKey { key: key.to_string() }),
        }

        Ok(())
    }

    /// (venue, pair) override, falling back to the venue default
    pub fn lookup(&self, venue: VenueId, pair: &Pair) -> Option<FeeRate> {
        if let Some(rate) = self.pair_override.get(&(venue, pair.clone())) {
            return Some(*rate);
        }
        self.venue_default.get(&venue).copied()
    }

    /// Taker rate used for every arbitrage leg
    pub fn taker(&self, venue: VenueId, pair: &Pair) -> Option<Decimal> {
        self.lookup(venue, pair).map(|rate| rate.taker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_every_venue_has_a_default() {
        let table = FeeTable::with_defaults();
        let pair = Pair::new("BTC", "USDT");
        for venue in VenueId::ALL {
            assert!(table.lookup(venue, &pair).is_some(), "{venue} has no default fee");
        }
    }

    #[test]
    fn test_venue_override() {
        let table =
            FeeTable::from_vars(vars(&[("FEE_OVERRIDE_BINANCE_TAKER", "0.001")])).unwrap();
        let pair = Pair::new("BTC", "USDT");
        let rate = table.lookup(VenueId::Binance, &pair).unwrap();
        assert_eq!(rate.taker, dec!(0.001));
        // Maker keeps the default
        assert_eq!(rate.maker, dec!(0.0002));
    }

    #[test]
    fn test_pair_override_wins_over_venue() {
        let table = FeeTable::from_vars(vars(&[
            ("FEE_OVERRIDE_BYBIT_TAKER", "0.002"),
            ("FEE_OVERRIDE_BYBIT_BTC_USDT_TAKER", "0.0001"),
        ]))
        .unwrap();

        assert_eq!(
            table.taker(VenueId::Bybit, &Pair::new("BTC", "USDT")).unwrap(),
            dec!(0.0001)
        );
        assert_eq!(
            table.taker(VenueId::Bybit, &Pair::new("ETH", "USDT")).unwrap(),
            dec!(0.002)
        );
    }

    #[test]
    fn test_unknown_venue_is_fatal() {
        let err = FeeTable::from_vars(vars(&[("FEE_OVERRIDE_KRAKEN_TAKER", "0.001")]))
            .unwrap_err();
        assert!(matches!(err, FeeError::UnknownVenue { .. }));
    }

    #[test]
    fn test_invalid_value_is_fatal() {
        let err =
            FeeTable::from_vars(vars(&[("FEE_OVERRIDE_BINANCE_TAKER", "lots")])).unwrap_err();
        assert!(matches!(err, FeeError::InvalidValue { .. }));

        let err =
            FeeTable::from_vars(vars(&[("FEE_OVERRIDE_BINANCE_TAKER", "1.5")])).unwrap_err();
        assert!(matches!(err, FeeError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_key_is_fatal() {
        let err = FeeTable::from_vars(vars(&[("FEE_OVERRIDE_BINANCE", "0.001")])).unwrap_err();
        assert!(matches!(err, FeeError::MalformedKey { .. }));
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let table = FeeTable::from_vars(vars(&[("PATH", "/usr/bin"), ("MIN_NOTIONAL", "100")]));
        assert!(table.is_ok());
    }
}
