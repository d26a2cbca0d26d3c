//! REST clients for venue public endpoints
//!
//! Two concerns: instrument discovery (every venue) and depth snapshots
//! (polled venues, plus resyncs). All requests share one pooled client
//! with a 5 s timeout. Parsing is venue-specific; binance and mexc share a
//! wire format.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::core::{Market, PriceLevel, VenueId};
use crate::registry::canonical_pair;

/// REST-layer errors; discovery faults are retried by the caller
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    Http(u16),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("api error: {0}")]
    Api(String),
}

/// Depth snapshot as fetched, before shadow-book application
#[derive(Debug, Clone)]
pub struct RawDepth {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub ts_exchange: Option<u64>,
    pub seq: Option<u64>,
}

/// Shared HTTP client for venue public APIs
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
}

impl RestClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .user_agent("arbscan/0.1")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Fetch and canonicalize the venue's tradable spot instruments
    pub async fn fetch_instruments(&self, venue: VenueId) -> Result<Vec<Market>, RestError> {
        let markets = match venue {
            VenueId::Binance => {
                self.binance_like_instruments(venue, "https://api.binance.com/api/v3/exchangeInfo")
                    .await?
            }
            VenueId::Mexc => {
                self.binance_like_instruments(venue, "https://api.mexc.com/api/v3/exchangeInfo")
                    .await?
            }
            VenueId::Bybit => self.bybit_instruments().await?,
            VenueId::Okx => self.okx_instruments().await?,
            VenueId::Kucoin => self.kucoin_instruments().await?,
            VenueId::Huobi => self.huobi_instruments().await?,
            VenueId::Cointr => self.cointr_instruments().await?,
        };

        tracing::info!("{}: discovered {} instruments", venue, markets.len());
        Ok(markets)
    }

    /// Fetch a depth snapshot for one native symbol
    pub async fn fetch_depth(
        &self,
        venue: VenueId,
        native: &str,
        levels: usize,
    ) -> Result<RawDepth, RestError> {
        match venue {
            VenueId::Binance => {
                let url = format!(
                    "https://api.binance.com/api/v3/depth?symbol={native}&limit={levels}"
                );
                self.binance_like_depth(&url, levels).await
            }
            VenueId::Mexc => {
                let url =
                    format!("https://api.mexc.com/api/v3/depth?symbol={native}&limit={levels}");
                self.binance_like_depth(&url, levels).await
            }
            VenueId::Bybit => self.bybit_depth(native, levels).await,
            VenueId::Okx => self.okx_depth(native, levels).await,
            VenueId::Kucoin => self.kucoin_depth(native, levels).await,
            VenueId::Huobi => self.huobi_depth(native, levels).await,
            VenueId::Cointr => self.cointr_depth(native, levels).await,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RestError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RestError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RestError::Http(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| RestError::Parse(e.to_string()))
    }

    // === binance / mexc ===

    async fn binance_like_instruments(
        &self,
        venue: VenueId,
        url: &str,
    ) -> Result<Vec<Market>, RestError> {
        let info: BinanceExchangeInfo = self.get_json(url).await?;

        Ok(info
            .symbols
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_asset, &s.quote_asset)?;
                let min_notional = s.min_notional();
                let mut market = Market::new(venue, pair, s.symbol);
                market.price_precision = s.quote_precision.or(s.quote_asset_precision).unwrap_or(8);
                market.size_precision = s.base_asset_precision.unwrap_or(8);
                market.min_notional = min_notional;
                market.active = matches!(s.status.as_str(), "TRADING" | "ENABLED" | "1");
                Some(market)
            })
            .collect())
    }

    async fn binance_like_depth(&self, url: &str, levels: usize) -> Result<RawDepth, RestError> {
        let depth: BinanceDepth = self.get_json(url).await?;
        Ok(RawDepth {
            bids: parse_levels(&depth.bids, levels, true),
            asks: parse_levels(&depth.asks, levels, false),
            ts_exchange: None,
            seq: Some(depth.last_update_id),
        })
    }

    // === bybit ===

    async fn bybit_instruments(&self) -> Result<Vec<Market>, RestError> {
        let url = "https://api.bybit.com/v5/market/instruments-info?category=spot&limit=1000";
        let response: BybitResponse<BybitList<BybitInstrument>> = self.get_json(url).await?;
        if response.ret_code != 0 {
            return Err(RestError::Api(response.ret_msg));
        }

        Ok(response
            .result
            .list
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_coin, &s.quote_coin)?;
                let mut market = Market::new(VenueId::Bybit, pair, s.symbol);
                if let Some(filter) = &s.price_filter {
                    market.price_precision = precision_from_step(&filter.tick_size);
                }
                if let Some(filter) = &s.lot_size_filter {
                    market.size_precision = precision_from_step(&filter.base_precision);
                    market.min_notional =
                        filter.min_order_amt.as_deref().and_then(|v| v.parse().ok());
                }
                market.active = s.status == "Trading";
                Some(market)
            })
            .collect())
    }

    async fn bybit_depth(&self, native: &str, levels: usize) -> Result<RawDepth, RestError> {
        let url = format!(
            "https://api.bybit.com/v5/market/orderbook?category=spot&symbol={native}&limit={levels}"
        );
        let response: BybitResponse<BybitDepth> = self.get_json(&url).await?;
        if response.ret_code != 0 {
            return Err(RestError::Api(response.ret_msg));
        }

        let depth = response.result;
        Ok(RawDepth {
            bids: parse_levels(&depth.b, levels, true),
            asks: parse_levels(&depth.a, levels, false),
            ts_exchange: depth.ts,
            seq: depth.u,
        })
    }

    // === okx ===

    async fn okx_instruments(&self) -> Result<Vec<Market>, RestError> {
        let url = "https://www.okx.com/api/v5/public/instruments?instType=SPOT";
        let response: OkxResponse<OkxInstrument> = self.get_json(url).await?;
        if response.code != "0" {
            return Err(RestError::Api(response.code));
        }

        Ok(response
            .data
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_ccy, &s.quote_ccy)?;
                let mut market = Market::new(VenueId::Okx, pair, s.inst_id);
                market.price_precision = precision_from_step(&s.tick_sz);
                market.size_precision = precision_from_step(&s.lot_sz);
                market.active = s.state == "live";
                Some(market)
            })
            .collect())
    }

    async fn okx_depth(&self, native: &str, levels: usize) -> Result<RawDepth, RestError> {
        let url = format!("https://www.okx.com/api/v5/market/books?instId={native}&sz={levels}");
        let response: OkxResponse<OkxDepth> = self.get_json(&url).await?;
        if response.code != "0" {
            return Err(RestError::Api(response.code));
        }
        let depth = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| RestError::Parse("empty okx book payload".to_string()))?;

        Ok(RawDepth {
            bids: parse_levels(&depth.bids, levels, true),
            asks: parse_levels(&depth.asks, levels, false),
            ts_exchange: depth.ts.parse().ok(),
            seq: None,
        })
    }

    // === kucoin ===

    async fn kucoin_instruments(&self) -> Result<Vec<Market>, RestError> {
        let url = "https://api.kucoin.com/api/v2/symbols";
        let response: KucoinResponse<Vec<KucoinSymbol>> = self.get_json(url).await?;
        if response.code != "200000" {
            return Err(RestError::Api(response.code));
        }

        Ok(response
            .data
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_currency, &s.quote_currency)?;
                let mut market = Market::new(VenueId::Kucoin, pair, s.symbol);
                market.price_precision = precision_from_step(&s.price_increment);
                market.size_precision = precision_from_step(&s.base_increment);
                market.min_notional = s.min_funds.as_deref().and_then(|v| v.parse().ok());
                market.active = s.enable_trading;
                Some(market)
            })
            .collect())
    }

    async fn kucoin_depth(&self, native: &str, levels: usize) -> Result<RawDepth, RestError> {
        let tier = if levels <= 20 { 20 } else { 100 };
        let url = format!(
            "https://api.kucoin.com/api/v1/market/orderbook/level2_{tier}?symbol={native}"
        );
        let response: KucoinResponse<KucoinDepth> = self.get_json(&url).await?;
        if response.code != "200000" {
            return Err(RestError::Api(response.code));
        }

        let depth = response.data;
        Ok(RawDepth {
            bids: parse_levels(&depth.bids, levels, true),
            asks: parse_levels(&depth.asks, levels, false),
            ts_exchange: depth.time,
            seq: depth.sequence.and_then(|s| s.parse().ok()),
        })
    }

    // === huobi ===

    async fn huobi_instruments(&self) -> Result<Vec<Market>, RestError> {
        let url = "https://api.huobi.pro/v1/common/symbols";
        let response: HuobiResponse<Vec<HuobiSymbol>> = self.get_json(url).await?;
        if response.status != "ok" {
            return Err(RestError::Api(response.status));
        }

        Ok(response
            .data
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_currency, &s.quote_currency)?;
                let mut market = Market::new(VenueId::Huobi, pair, s.symbol);
                market.price_precision = s.price_precision;
                market.size_precision = s.amount_precision;
                market.min_notional =
                    s.min_order_value.and_then(|v| Decimal::try_from(v).ok());
                market.active = s.state == "online";
                Some(market)
            })
            .collect())
    }

    async fn huobi_depth(&self, native: &str, levels: usize) -> Result<RawDepth, RestError> {
        let url = format!("https://api.huobi.pro/market/depth?symbol={native}&type=step0");
        let response: HuobiDepthResponse = self.get_json(&url).await?;
        if response.status != "ok" {
            return Err(RestError::Api(response.status));
        }

        Ok(RawDepth {
            bids: parse_levels(&response.tick.bids, levels, true),
            asks: parse_levels(&response.tick.asks, levels, false),
            ts_exchange: response.ts,
            seq: None,
        })
    }

    // === cointr ===

    async fn cointr_instruments(&self) -> Result<Vec<Market>, RestError> {
        let url = "https://api.cointr.com/api/v2/spot/public/symbols";
        let response: CointrResponse<Vec<CointrSymbol>> = self.get_json(url).await?;
        if response.code != "00000" {
            return Err(RestError::Api(response.code));
        }

        Ok(response
            .data
            .into_iter()
            .filter_map(|s| {
                let pair = canonical_pair(&s.base_coin, &s.quote_coin)?;
                let mut market = Market::new(VenueId::Cointr, pair, s.symbol);
                if let Some(precision) = s.price_precision.as_deref().and_then(|p| p.parse().ok()) {
                    market.price_precision = precision;
                }
                if let Some(precision) = s.quantity_precision.as_deref().and_then(|p| p.parse().ok())
                {
                    market.size_precision = precision;
                }
                market.active = s.status == "online";
                Some(market)
            })
            .collect())
    }

    async fn cointr_depth(&self, native: &str, levels: usize) -> Result<RawDepth, RestError> {
        let url = format!(
            "https://api.cointr.com/api/v2/spot/market/orderbook?symbol={native}&limit={levels}"
        );
        let response: CointrResponse<CointrDepth> = self.get_json(&url).await?;
        if response.code != "00000" {
            return Err(RestError::Api(response.code));
        }

        let depth = response.data;
        Ok(RawDepth {
            bids: parse_levels(&depth.bids, levels, true),
            asks: parse_levels(&depth.asks, levels, false),
            ts_exchange: depth.ts.as_deref().and_then(|t| t.parse().ok()),
            seq: None,
        })
    }
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `[price, size]` rows, drop non-positive entries, sort and truncate
///
/// Venues send levels as strings or numbers; both are accepted. Bids sort
/// descending, asks ascending, regardless of wire order.
pub fn parse_levels(
    raw: &[Vec<serde_json::Value>],
    depth_levels: usize,
    descending: bool,
) -> Vec<PriceLevel> {
    let mut levels: Vec<PriceLevel> = raw
        .iter()
        .filter_map(|row| {
            let price = decimal_value(row.first()?)?;
            let size = decimal_value(row.get(1)?)?;
            (price > Decimal::ZERO && size > Decimal::ZERO).then(|| PriceLevel::new(price, size))
        })
        .collect();

    if descending {
        levels.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.cmp(&b.price));
    }
    levels.truncate(depth_levels);
    levels
}

/// Parse delta rows, where a zero size marks a level for removal
///
/// Unlike [`parse_levels`], zero sizes survive and nothing is sorted or
/// truncated: dropping a removal row would leave a phantom level in the
/// shadow book.
pub fn parse_delta_levels(raw: &[Vec<serde_json::Value>]) -> Vec<PriceLevel> {
    raw.iter()
        .filter_map(|row| {
            let price = decimal_value(row.first()?)?;
            let size = decimal_value(row.get(1)?)?;
            (price > Decimal::ZERO && size >= Decimal::ZERO)
                .then(|| PriceLevel::new(price, size))
        })
        .collect()
}

fn decimal_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => Decimal::try_from(n.as_f64()?).ok(),
        _ => None,
    }
}

/// Decimal places of a step like "0.001"; unknown steps fall back to 8
pub fn precision_from_step(step: &str) -> u32 {
    step.parse::<Decimal>()
        .map(|d| d.normalize().scale())
        .unwrap_or(8)
}

// === Wire types ===

#[derive(Debug, Deserialize)]
struct BinanceExchangeInfo {
    symbols: Vec<BinanceSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceSymbol {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    base_asset_precision: Option<u32>,
    quote_precision: Option<u32>,
    quote_asset_precision: Option<u32>,
    #[serde(default)]
    filters: Vec<serde_json::Value>,
}

impl BinanceSymbol {
    fn min_notional(&self) -> Option<Decimal> {
        self.filters.iter().find_map(|f| {
            let kind = f.get("filterType")?.as_str()?;
            if kind != "NOTIONAL" && kind != "MIN_NOTIONAL" {
                return None;
            }
            f.get("minNotional")?.as_str()?.parse().ok()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceDepth {
    last_update_id: u64,
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i32,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: T,
}

#[derive(Debug, Deserialize)]
struct BybitList<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
    price_filter: Option<BybitPriceFilter>,
    lot_size_filter: Option<BybitLotFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitPriceFilter {
    tick_size: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitLotFilter {
    base_precision: String,
    min_order_amt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitDepth {
    b: Vec<Vec<serde_json::Value>>,
    a: Vec<Vec<serde_json::Value>>,
    ts: Option<u64>,
    u: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxInstrument {
    inst_id: String,
    base_ccy: String,
    quote_ccy: String,
    state: String,
    tick_sz: String,
    lot_sz: String,
}

#[derive(Debug, Deserialize)]
struct OkxDepth {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct KucoinResponse<T> {
    code: String,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinSymbol {
    symbol: String,
    base_currency: String,
    quote_currency: String,
    enable_trading: bool,
    price_increment: String,
    base_increment: String,
    min_funds: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KucoinDepth {
    time: Option<u64>,
    sequence: Option<String>,
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct HuobiResponse<T> {
    status: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct HuobiSymbol {
    symbol: String,
    #[serde(rename = "base-currency")]
    base_currency: String,
    #[serde(rename = "quote-currency")]
    quote_currency: String,
    state: String,
    #[serde(rename = "price-precision")]
    price_precision: u32,
    #[serde(rename = "amount-precision")]
    amount_precision: u32,
    #[serde(rename = "min-order-value")]
    min_order_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HuobiDepthResponse {
    status: String,
    ts: Option<u64>,
    tick: HuobiTick,
}

#[derive(Debug, Deserialize)]
struct HuobiTick {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CointrResponse<T> {
    code: String,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CointrSymbol {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
    price_precision: Option<String>,
    quantity_precision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CointrDepth {
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
    ts: Option<String>,
}
