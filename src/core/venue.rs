//! Venue identifiers
//!
//! The set of supported exchanges is closed. Adding a venue means adding a
//! variant here plus a feed implementation in `connectors`.

use std::fmt;
use std::str::FromStr;

/// Exchange identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VenueId {
    Binance,
    Bybit,
    Okx,
    Kucoin,
    Mexc,
    Huobi,
    Cointr,
}

impl VenueId {
    /// All supported venues, in stable order
    pub const ALL: [VenueId; 7] = [
        VenueId::Binance,
        VenueId::Bybit,
        VenueId::Okx,
        VenueId::Kucoin,
        VenueId::Mexc,
        VenueId::Huobi,
        VenueId::Cointr,
    ];

    /// Short lowercase identifier used in config and logs
    pub fn name(&self) -> &'static str {
        match self {
            VenueId::Binance => "binance",
            VenueId::Bybit => "bybit",
            VenueId::Okx => "okx",
            VenueId::Kucoin => "kucoin",
            VenueId::Mexc => "mexc",
            VenueId::Huobi => "huobi",
            VenueId::Cointr => "cointr",
        }
    }

    /// Venues with a native WebSocket depth feed; the rest poll REST
    pub fn supports_ws(&self) -> bool {
        matches!(self, VenueId::Binance | VenueId::Bybit)
    }

    /// Stable index for metrics arrays
    #[inline(always)]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VenueId {
    type Err = UnknownVenue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(VenueId::Binance),
            "bybit" => Ok(VenueId::Bybit),
            "okx" => Ok(VenueId::Okx),
            "kucoin" => Ok(VenueId::Kucoin),
            "mexc" => Ok(VenueId::Mexc),
            "huobi" => Ok(VenueId::Huobi),
            "cointr" => Ok(VenueId::Cointr),
            other => Err(UnknownVenue(other.to_string())),
        }
    }
}

/// Error for venue ids outside the closed set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown venue: {0}")]
pub struct UnknownVenue(pub String);

impl serde::Serialize for VenueId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
