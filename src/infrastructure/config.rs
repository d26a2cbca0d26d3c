//! Configuration from process environment
//!
//! Every tunable comes from an environment variable with a documented
//! default; a missing variable is never an error, a malformed one always
//! is. Config faults are fatal at startup (exit code 2).

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::{Pair, VenueId};
use crate::fees::{FeeError, FeeTable};

/// Fatal configuration faults
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Fee(#[from] FeeError),
}

/// Application configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// Cross-engine emission threshold in bps
    pub min_spread_bps: Decimal,
    /// Tri-engine emission threshold in bps
    pub min_tri_gain_bps: Decimal,
    /// VWAP target notional in quote units
    pub min_notional: Decimal,
    /// Tracked canonical pairs; empty means venue-default policy
    pub symbol_universe: Vec<Pair>,
    /// Base assets the tri engine cycles through
    pub tri_bases: Vec<String>,
    /// Assets forbidden as tri intermediates
    pub tri_exclude_quotes: Vec<String>,
    pub include_exchanges: Vec<VenueId>,
    pub exclude_exchanges: Vec<VenueId>,
    /// Levels requested per book side
    pub depth_levels: usize,
    pub coalesce: Duration,
    pub cross_scan: Duration,
    pub tri_scan: Duration,
    pub max_staleness: Duration,
    pub alert_cooldown: Duration,
    pub grace_shutdown: Duration,
    pub log_level: String,
    /// Append-only opportunity log
    pub db_path: PathBuf,
    pub notifier_token: Option<String>,
    pub notifier_chat: Option<i64>,
    pub fees: FeeTable,
}

impl Config {
    /// Resolve from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Resolve from an explicit variable map (used by tests)
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let fees = FeeTable::from_vars(vars.clone())?;

        Ok(Self {
            min_spread_bps: parse_or(&vars, "MIN_SPREAD_BPS", dec!(25))?,
            min_tri_gain_bps: parse_or(&vars, "MIN_TRI_GAIN_BPS", dec!(15))?,
            min_notional: parse_or(&vars, "MIN_NOTIONAL", dec!(100))?,
            symbol_universe: parse_list(&vars, "SYMBOL_UNIVERSE", "")?,
            tri_bases: parse_assets(&vars, "TRI_BASES", "BTC,ETH,USDT"),
            tri_exclude_quotes: parse_assets(&vars, "TRI_EXCLUDE_QUOTES", ""),
            include_exchanges: parse_list(&vars, "INCLUDE_EXCHANGES", "")?,
            exclude_exchanges: parse_list(&vars, "EXCLUDE_EXCHANGES", "")?,
            depth_levels: parse_or(&vars, "DEPTH_LEVELS", 20usize)?,
            coalesce: millis(&vars, "COALESCE_MS", 100)?,
            cross_scan: millis(&vars, "CROSS_SCAN_MS", 1000)?,
            tri_scan: millis(&vars, "TRI_SCAN_MS", 2000)?,
            max_staleness: millis(&vars, "MAX_STALENESS_MS", 5000)?,
            alert_cooldown: Duration::from_secs(parse_or(&vars, "ALERT_COOLDOWN_SEC", 60u64)?),
            grace_shutdown: millis(&vars, "GRACE_SHUTDOWN_MS", 2000)?,
            log_level: vars.get("LOG_LEVEL").cloned().unwrap_or_else(|| "info".to_string()),
            db_path: vars
                .get("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./opportunities.jsonl")),
            notifier_token: vars.get("NOTIFIER_TOKEN").filter(|v| !v.is_empty()).cloned(),
            notifier_chat: match vars.get("NOTIFIER_CHAT").filter(|v| !v.is_empty()) {
                Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "NOTIFIER_CHAT",
                    value: raw.clone(),
                })?),
                None => None,
            },
            fees,
        })
    }

    /// Include list (default: all venues) minus the exclude list
    pub fn enabled_venues(&self) -> Vec<VenueId> {
        let included: Vec<VenueId> = if self.include_exchanges.is_empty() {
            VenueId::ALL.to_vec()
        } else {
            self.include_exchanges.clone()
        };

        included
            .into_iter()
            .filter(|v| !self.exclude_exchanges.contains(v))
            .collect()
    }
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key).map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
        None => Ok(default),
    }
}

fn millis(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_or(vars, key, default)?))
}

/// Comma-separated list of parseable items
fn parse_list<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: &str,
) -> Result<Vec<T>, ConfigError> {
    let raw = vars.get(key).map(String::as_str).unwrap_or(default);
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            item.parse().map_err(|_| ConfigError::InvalidValue {
                key,
                value: item.to_string(),
            })
        })
        .collect()
}

/// Comma-separated asset codes, uppercased
fn parse_assets(vars: &HashMap<String, String>, key: &str, default: &str) -> Vec<String> {
    let raw = vars.get(key).map(String::as_str).unwrap_or(default);
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.min_spread_bps, dec!(25));
        assert_eq!(config.min_tri_gain_bps, dec!(15));
        assert_eq!(config.min_notional, dec!(100));
        assert!(config.symbol_universe.is_empty());
        assert_eq!(config.tri_bases, vec!["BTC", "ETH", "USDT"]);
        assert_eq!(config.depth_levels, 20);
        assert_eq!(config.coalesce, Duration::from_millis(100));
        assert_eq!(config.cross_scan, Duration::from_millis(1000));
        assert_eq!(config.tri_scan, Duration::from_millis(2000));
        assert_eq!(config.max_staleness, Duration::from_millis(5000));
        assert_eq!(config.alert_cooldown, Duration::from_secs(60));
        assert_eq!(config.grace_shutdown, Duration::from_millis(2000));
        assert!(config.notifier_token.is_none());
        assert_eq!(config.enabled_venues(), VenueId::ALL.to_vec());
    }

    #[test]
    fn test_symbol_universe() {
        let config =
            Config::from_vars(vars(&[("SYMBOL_UNIVERSE", "BTC/USDT, ETH/USDT")])).unwrap();
        assert_eq!(
            config.symbol_universe,
            vec![Pair::new("BTC", "USDT"), Pair::new("ETH", "USDT")]
        );
    }

    #[test]
    fn test_malformed_universe_is_fatal() {
        assert!(Config::from_vars(vars(&[("SYMBOL_UNIVERSE", "BTCUSDT")])).is_err());
    }

    #[test]
    fn test_malformed_number_is_fatal() {
        assert!(Config::from_vars(vars(&[("MIN_SPREAD_BPS", "abc")])).is_err());
        assert!(Config::from_vars(vars(&[("CROSS_SCAN_MS", "-5")])).is_err());
    }

    #[test]
    fn test_include_exclude() {
        let config = Config::from_vars(vars(&[
            ("INCLUDE_EXCHANGES", "binance,bybit,okx"),
            ("EXCLUDE_EXCHANGES", "okx"),
        ]))
        .unwrap();
        assert_eq!(config.enabled_venues(), vec![VenueId::Binance, VenueId::Bybit]);
    }

    #[test]
    fn test_exclude_only() {
        let config = Config::from_vars(vars(&[("EXCLUDE_EXCHANGES", "cointr,huobi")])).unwrap();
        let venues = config.enabled_venues();
        assert_eq!(venues.len(), 5);
        assert!(!venues.contains(&VenueId::Cointr));
        assert!(!venues.contains(&VenueId::Huobi));
    }

    #[test]
    fn test_unknown_exchange_is_fatal() {
        assert!(Config::from_vars(vars(&[("INCLUDE_EXCHANGES", "binance,kraken")])).is_err());
    }

    #[test]
    fn test_notifier_settings() {
        let config = Config::from_vars(vars(&[
            ("NOTIFIER_TOKEN", "123:abc"),
            ("NOTIFIER_CHAT", "-100200300"),
        ]))
        .unwrap();
        assert_eq!(config.notifier_token.as_deref(), Some("123:abc"));
        assert_eq!(config.notifier_chat, Some(-100200300));
    }

    #[test]
    fn test_bad_notifier_chat_is_fatal() {
        assert!(Config::from_vars(vars(&[("NOTIFIER_CHAT", "not-a-chat")])).is_err());
    }

    #[test]
    fn test_tri_assets_uppercased() {
        let config = Config::from_vars(vars(&[
            ("TRI_BASES", "usdt,btc"),
            ("TRI_EXCLUDE_QUOTES", "try"),
        ]))
        .unwrap();
        assert_eq!(config.tri_bases, vec!["USDT", "BTC"]);
        assert_eq!(config.tri_exclude_quotes, vec!["TRY"]);
    }

    #[test]
    fn test_fee_override_flows_through() {
        let config =
            Config::from_vars(vars(&[("FEE_OVERRIDE_MEXC_TAKER", "0.001")])).unwrap();
        assert_eq!(
            config.fees.taker(VenueId::Mexc, &Pair::new("BTC", "USDT")).unwrap(),
            dec!(0.001)
        );
    }
}
