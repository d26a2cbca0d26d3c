//! Detected arbitrage opportunities
//!
//! Opportunities live from detection until the emitter flushes them; there
//! is no in-core history. The dedup key buckets `net_bps` so that small
//! oscillations around a level do not defeat the cooldown.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{Pair, VenueId};

/// Width of the net-bps dedup bucket
const DEDUP_BUCKET_BPS: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Direction of one trade leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn name(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl Serialize for Side {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// One leg of a triangular cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    pub pair: Pair,
    pub side: Side,
}

/// Same pair buyable on one venue below its sell price on another
#[derive(Debug, Clone, Serialize)]
pub struct CrossOpportunity {
    pub pair: Pair,
    pub buy_venue: VenueId,
    pub sell_venue: VenueId,
    /// Executable size, min of the fillable notionals on both legs
    pub notional: Decimal,
    pub gross_bps: Decimal,
    pub net_bps: Decimal,
    pub buy_vwap: Decimal,
    pub sell_vwap: Decimal,
    pub fillable_notional: Decimal,
    pub buy_levels: usize,
    pub sell_levels: usize,
    pub t_detected: DateTime<Utc>,
}

/// Three-leg intra-venue cycle returning to `base` at a net gain
#[derive(Debug, Clone, Serialize)]
pub struct TriOpportunity {
    pub venue: VenueId,
    pub legs: [Leg; 3],
    pub base: String,
    pub gross_bps: Decimal,
    pub net_bps: Decimal,
    /// Total book levels walked across all three VWAPs, used as tie-breaker
    pub levels_used: usize,
    pub t_detected: DateTime<Utc>,
}

/// Either kind of detection, as handed to the emitter
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Opportunity {
    Cross(CrossOpportunity),
    Tri(TriOpportunity),
}

impl Opportunity {
    pub fn kind(&self) -> &'static str {
        match self {
            Opportunity::Cross(_) => "cross",
            Opportunity::Tri(_) => "tri",
        }
    }

    pub fn net_bps(&self) -> Decimal {
        match self {
            Opportunity::Cross(o) => o.net_bps,
            Opportunity::Tri(o) => o.net_bps,
        }
    }

    pub fn t_detected(&self) -> DateTime<Utc> {
        match self {
            Opportunity::Cross(o) => o.t_detected,
            Opportunity::Tri(o) => o.t_detected,
        }
    }

    /// Cooldown key; direction-swapped cross detections keep distinct keys
    pub fn dedup_key(&self) -> String {
        match self {
            Opportunity::Cross(o) => format!(
                "cross:{}:{}:{}:{}",
                o.pair,
                o.buy_venue,
                o.sell_venue,
                bucket(o.net_bps, DEDUP_BUCKET_BPS),
            ),
            Opportunity::Tri(o) => {
                let mut pairs: Vec<String> = o.legs.iter().map(|l| l.pair.to_string()).collect();
                pairs.sort();
                format!(
                    "tri:{}:{}:{}:{}",
                    o.venue,
                    pairs.join("|"),
                    o.base,
                    bucket(o.net_bps, DEDUP_BUCKET_BPS),
                )
            }
        }
    }
}

/// `floor(x / w) * w`
pub fn bucket(x: Decimal, width: Decimal) -> Decimal {
    (x / width).floor() * width
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cross(net_bps: Decimal) -> Opportunity {
        Opportunity::Cross(CrossOpportunity {
            pair: Pair::new("BTC", "USDT"),
            buy_venue: VenueId::Binance,
            sell_venue: VenueId::Bybit,
            notional: dec!(100),
            gross_bps: net_bps + dec!(20),
            net_bps,
            buy_vwap: dec!(30000),
            sell_vwap: dec!(30100),
            fillable_notional: dec!(100),
            buy_levels: 1,
            sell_levels: 1,
            t_detected: Utc::now(),
        })
    }

    fn tri(net_bps: Decimal, legs: [Leg; 3]) -> Opportunity {
        Opportunity::Tri(TriOpportunity {
            venue: VenueId::Okx,
            legs,
            base: "USDT".to_string(),
            gross_bps: net_bps + dec!(30),
            net_bps,
            levels_used: 3,
            t_detected: Utc::now(),
        })
    }

    fn legs(a: (&str, &str), b: (&str, &str), c: (&str, &str)) -> [Leg; 3] {
        [
            Leg { pair: Pair::new(a.0, a.1), side: Side::Buy },
            Leg { pair: Pair::new(b.0, b.1), side: Side::Buy },
            Leg { pair: Pair::new(c.0, c.1), side: Side::Sell },
        ]
    }

    #[test]
    fn test_bucket() {
        assert_eq!(bucket(dec!(13.33), dec!(5)), dec!(10));
        assert_eq!(bucket(dec!(15), dec!(5)), dec!(15));
        assert_eq!(bucket(dec!(19.99), dec!(5)), dec!(15));
        assert_eq!(bucket(dec!(-3), dec!(5)), dec!(-5));
    }

    #[test]
    fn test_cross_key_same_bucket() {
        assert_eq!(cross(dec!(26)).dedup_key(), cross(dec!(29.9)).dedup_key());
    }

    #[test]
    fn test_cross_key_different_bucket() {
        assert_ne!(cross(dec!(26)).dedup_key(), cross(dec!(31)).dedup_key());
    }

    #[test]
    fn test_cross_key_direction_sensitive() {
        let forward = cross(dec!(26));
        let mut swapped = match cross(dec!(26)) {
            Opportunity::Cross(o) => o,
            _ => unreachable!(),
        };
        std::mem::swap(&mut swapped.buy_venue, &mut swapped.sell_venue);
        assert_ne!(forward.dedup_key(), Opportunity::Cross(swapped).dedup_key());
    }

    #[test]
    fn test_tri_key_ignores_leg_order() {
        let a = tri(dec!(16), legs(("BTC", "USDT"), ("ETH", "BTC"), ("ETH", "USDT")));
        let b = tri(dec!(16), legs(("ETH", "USDT"), ("BTC", "USDT"), ("ETH", "BTC")));
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_kind() {
        assert_eq!(cross(dec!(26)).kind(), "cross");
        assert_eq!(
            tri(dec!(16), legs(("BTC", "USDT"), ("ETH", "BTC"), ("ETH", "USDT"))).kind(),
            "tri"
        );
    }

    #[test]
    fn test_payload_serializes() {
        let json = serde_json::to_string(&cross(dec!(26))).unwrap();
        assert!(json.contains("\"pair\":\"BTC/USDT\""));
        assert!(json.contains("\"buy_venue\":\"binance\""));
    }
}
