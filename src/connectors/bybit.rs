//! Bybit spot WebSocket feed
//!
//! v5 public spot stream, `orderbook.50.<SYM>` topics. The server sends a
//! full snapshot on subscription and contiguous deltas after it, keyed by
//! the `u` update id; the driver detects gaps and resubscribes the topic,
//! which yields a fresh snapshot. The venue requires an application-level
//! ping every 20 seconds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{Market, VenueId};
use crate::registry::SymbolRegistry;
use crate::rest::{parse_delta_levels, parse_levels, RestClient};
use crate::ws::WsConnection;

use super::{BookEvent, FeedError, FeedEvent, VenueFeed};

const WS_URL: &str = "wss://stream.bybit.com/v5/public/spot";
/// Topics per subscribe request
const SUBSCRIBE_CHUNK: usize = 10;
const PING_INTERVAL: Duration = Duration::from_secs(20);

pub struct BybitFeed {
    conn: Option<WsConnection>,
    rest: RestClient,
    registry: Arc<SymbolRegistry>,
    depth_levels: usize,
}

impl BybitFeed {
    pub fn new(rest: RestClient, registry: Arc<SymbolRegistry>, depth_levels: usize) -> Self {
        Self {
            conn: None,
            rest,
            registry,
            depth_levels,
        }
    }

    /// Spot orderbook topics come in 1/50/200 flavours
    fn topic_depth(&self) -> usize {
        match self.depth_levels {
            0..=1 => 1,
            2..=50 => 50,
            _ => 200,
        }
    }

    async fn send_op(&mut self, op: &str, markets: &[Market]) -> Result<(), FeedError> {
        let depth = self.topic_depth();
        let topics: Vec<String> = markets
            .iter()
            .map(|m| format!("orderbook.{}.{}", depth, m.native_symbol))
            .collect();

        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;

        for chunk in topics.chunks(SUBSCRIBE_CHUNK) {
            let request = serde_json::json!({ "op": op, "args": chunk });
            conn.send_text(&request.to_string()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl VenueFeed for BybitFeed {
    fn venue(&self) -> VenueId {
        VenueId::Bybit
    }

    async fn connect(&mut self) -> Result<(), FeedError> {
        self.conn = Some(WsConnection::connect(WS_URL).await?);
        Ok(())
    }

    async fn discover(&mut self) -> Result<Vec<Market>, FeedError> {
        Ok(self.rest.fetch_instruments(VenueId::Bybit).await?)
    }

    async fn subscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        self.send_op("subscribe", markets).await
    }

    async fn unsubscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        self.send_op("unsubscribe", markets).await
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

    fn keepalive_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    async fn keepalive(&mut self) -> Result<(), FeedError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| FeedError::Transport("not connected".to_string()))?;
        conn.send_text(r#"{"op":"ping"}"#).await?;
        Ok(())
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
    Skip,
    Unknown,
}

#[derive(Debug, Deserialize)]
struct TopicFrame {
    topic: String,
    #[serde(rename = "type")]
    kind: String,
    ts: Option<u64>,
    data: OrderbookPayload,
}

#[derive(Debug, Deserialize)]
struct OrderbookPayload {
    s: String,
    b: Vec<Vec<serde_json::Value>>,
    a: Vec<Vec<serde_json::Value>>,
    u: u64,
}

#[derive(Debug, Deserialize)]
struct ControlFrame {
    op: String,
    #[serde(default)]
    success: Option<bool>,
}

fn parse_frame(text: &str, registry: &SymbolRegistry, depth_levels: usize) -> Parsed {
    if let Ok(frame) = serde_json::from_str::<TopicFrame>(text) {
        if !frame.topic.starts_with("orderbook.") {
            return Parsed::Unknown;
        }
        let Some(pair) = registry.canonicalize(VenueId::Bybit, &frame.data.s) else {
            return Parsed::Skip;
        };

        let is_snapshot = frame.kind == "snapshot";
        let (bids, asks) = if is_snapshot {
            (
                parse_levels(&frame.data.b, depth_levels, true),
                parse_levels(&frame.data.a, depth_levels, false),
            )
        } else {
            (
                parse_delta_levels(&frame.data.b),
                parse_delta_levels(&frame.data.a),
            )
        };

        return Parsed::Book(BookEvent {
            pair,
            bids,
            asks,
            is_snapshot,
            seq: Some(frame.data.u),
            ts_exchange: frame.ts,
        });
    }

    if let Ok(frame) = serde_json::from_str::<ControlFrame>(text) {
        if frame.success == Some(false) {
            tracing::warn!("bybit: {} rejected: {}", frame.op, text);
        }
        return Parsed::Ack;
    }

    tracing::debug!("bybit: unhandled frame");
    Parsed::Unknown
}
