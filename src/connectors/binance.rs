//! Binance spot WebSocket feed
//!
//! Uses the combined-stream endpoint so every frame names its stream, and
//! the partial depth channel (`<sym>@depth20@100ms`), which delivers whole
//! top-of-book snapshots; no delta application or resync protocol is
//! needed. Subscribe requests are chunked to stay inside the per-message
//! limits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{Market, VenueId};
use crate::registry::SymbolRegistry;
use crate::rest::{parse_levels, RestClient};
use crate::ws::WsConnection;

use super::{BookEvent, FeedError, FeedEvent, VenueFeed};

const WS_URL: &str = "wss://stream.binance.com:9443/stream";
/// Streams per SUBSCRIBE request
const SUBSCRIBE_CHUNK: usize = 50;

pub struct BinanceFeed {
    conn: Option<WsConnection>,
    rest: RestClient,
    registry: Arc<SymbolRegistry>,
    depth_levels: usize,
    next_request_id: u64,
}

impl BinanceFeed {
    pub fn new(rest: RestClient, registry: Arc<SymbolRegistry>, depth_levels: usize) -> Self {
        Self {
            conn: None,
            rest,
            registry,
            depth_levels,
            next_request_id: 1,
        }
    }

    /// Partial depth streams come in 5/10/20 flavours
    fn stream_depth(&self) -> usize {
        match self.depth_levels {
            0..=5 => 5,
            6..=10 => 10,
            _ => 20,
        }
    }

    fn stream_name(&self, market: &Market) -> String {
        format!(
            "{}@depth{}@100ms",
            market.native_symbol.to_ascii_lowercase(),
            self.stream_depth()
        )
    }

    async fn send_op(&mut self, method: &str, markets: &[Market]) -> Result<(), FeedError> {
        let streams: Vec<String> = markets.iter().map(|m| self.stream_name(m)).collect();
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;

        for chunk in streams.chunks(SUBSCRIBE_CHUNK) {
            let request = serde_json::json!({
                "method": method,
                "params": chunk,
                "id": self.next_request_id,
            });
            self.next_request_id += 1;
            conn.send_text(&request.to_string()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VenueFeed for BinanceFeed {
    fn venue(&self) -> VenueId {
        VenueId::Binance
    }

    async fn connect(&mut self) -> Result<(), FeedError> {
        self.conn = Some(WsConnection::connect(WS_URL).await?);
        Ok(())
    }

    async fn discover(&mut self) -> Result<Vec<Market>, FeedError> {
        Ok(self.rest.fetch_instruments(VenueId::Binance).await?)
    }

    async fn subscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        self.send_op("SUBSCRIBE", markets).await
    }

    async fn unsubscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        self.send_op("UNSUBSCRIBE", markets).await
    }

    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;

        loop {
            let Some(text) = conn.recv_text().await? else {
                return Ok(None);
            };

            match parse_frame(&text, &self.registry, self.depth_levels) {
                Parsed::Book(event) => return Ok(Some(FeedEvent::Book(event))),
                Parsed::Ack => return Ok(Some(FeedEvent::Ack)),
                Parsed::Unknown => return Ok(Some(FeedEvent::Heartbeat)),
                Parsed::Skip => {}
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), FeedError> {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
        Ok(())
    }
}

enum Parsed {
    Book(BookEvent),
    Ack,
    /// Frame for a symbol we do not track
    Skip,
    Unknown,
}

#[derive(Debug, Deserialize)]
struct CombinedFrame {
    stream: String,
    data: DepthPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepthPayload {
    last_update_id: u64,
    bids: Vec<Vec<serde_json::Value>>,
    asks: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct AckFrame {
    #[allow(dead_code)]
    id: u64,
}

fn parse_frame(text: &str, registry: &SymbolRegistry, depth_levels: usize) -> Parsed {
    if let Ok(frame) = serde_json::from_str::<CombinedFrame>(text) {
        let Some(native) = frame.stream.split('@').next() else {
            return Parsed::Unknown;
        };
        let native = native.to_ascii_uppercase();
        let Some(pair) = registry.canonicalize(VenueId::Binance, &native) else {
            return Parsed::Skip;
        };

        return Parsed::Book(BookEvent {
            pair,
            bids: parse_levels(&frame.data.bids, depth_levels, true),
            asks: parse_levels(&frame.data.asks, depth_levels, false),
            is_snapshot: true,
            seq: Some(frame.data.last_update_id),
            ts_exchange: None,
        });
    }

    if serde_json::from_str::<AckFrame>(text).is_ok() {
        return Parsed::Ack;
    }

    tracing::debug!("binance: unhandled frame: {}", truncate(text, 120));
    Parsed::Unknown
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Pair;
    use rust_decimal_macros::dec;

    fn registry() -> Arc<SymbolRegistry> {
        let registry = SymbolRegistry::new();
        registry.load(
            VenueId::Binance,
            vec![Market::new(VenueId::Binance, Pair::new("BTC", "USDT"), "BTCUSDT")],
        );
        Arc::new(registry)
    }

    #[test]
    fn test_parse_depth_frame() {
        let text = r#"{
            "stream": "btcusdt@depth20@100ms",
            "data": {
                "lastUpdateId": 160,
                "bids": [["30000.00", "0.5"], ["29999.00", "1.0"]],
                "asks": [["30001.00", "0.4"]]
            }
        }"#;

        match parse_frame(text, &registry(), 20) {
            Parsed::Book(event) => {
                assert_eq!(event.pair, Pair::new("BTC", "USDT"));
                assert!(event.is_snapshot);
                assert_eq!(event.seq, Some(160));
                assert_eq!(event.bids.len(), 2);
                assert_eq!(event.bids[0].price, dec!(30000));
                assert_eq!(event.asks[0].size, dec!(0.4));
            }
            _ => panic!("expected a book event"),
        }
    }

    #[test]
    fn test_parse_untracked_symbol_skipped() {
        let text = r#"{
            "stream": "xrpusdt@depth20@100ms",
            "data": {"lastUpdateId": 1, "bids": [], "asks": []}
        }"#;
        assert!(matches!(parse_frame(text, &registry(), 20), Parsed::Skip));
    }

    #[test]
    fn test_parse_ack_frame() {
        let text = r#"{"result": null, "id": 1}"#;
        assert!(matches!(parse_frame(text, &registry(), 20), Parsed::Ack));
    }

    #[test]
    fn test_parse_garbage_is_unknown() {
        assert!(matches!(parse_frame("{}", &registry(), 20), Parsed::Unknown));
        assert!(matches!(parse_frame("not json", &registry(), 20), Parsed::Unknown));
    }

    #[test]
    fn test_stream_depth_tiers() {
        let feed = BinanceFeed::new(RestClient::new(), registry(), 5);
        assert_eq!(feed.stream_depth(), 5);
        let feed = BinanceFeed::new(RestClient::new(), registry(), 20);
        assert_eq!(feed.stream_depth(), 20);
        let feed = BinanceFeed::new(RestClient::new(), registry(), 50);
        assert_eq!(feed.stream_depth(), 20);
    }
}
