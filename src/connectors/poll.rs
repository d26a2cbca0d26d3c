//! REST-polling feed
//!
//! Fallback for venues without a WebSocket implementation (okx, kucoin,
//! mexc, huobi, cointr). Each poll cycle fetches a batch of depth
//! snapshots concurrently and drains them through `next_event` one at a
//! time, round-robin over the subscribed markets. With the default pacing
//! a few dozen markets refresh comfortably inside the staleness window.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::Instant;

use crate::core::{Market, VenueId};
use crate::rest::RestClient;

use super::{BookEvent, FeedError, FeedEvent, VenueFeed};

/// One batch of fetches per interval
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Markets fetched concurrently per batch
const BATCH_SIZE: usize = 8;

pub struct RestPollFeed {
    venue: VenueId,
    rest: RestClient,
    depth_levels: usize,
    markets: Vec<Market>,
    cursor: usize,
    buffer: VecDeque<BookEvent>,
    next_poll: Option<Instant>,
}

impl RestPollFeed {
    pub fn new(venue: VenueId, rest: RestClient, depth_levels: usize) -> Self {
        Self {
            venue,
            rest,
            depth_levels,
            markets: Vec::new(),
            cursor: 0,
            buffer: VecDeque::new(),
            next_poll: None,
        }
    }

    /// Next batch of markets, round-robin with wrap-around
    fn batch(&mut self) -> Vec<Market> {
        let len = self.markets.len();
        if len == 0 {
            return Vec::new();
        }
        let take = BATCH_SIZE.min(len);
        let batch = (0..take)
            .map(|i| self.markets[(self.cursor + i) % len].clone())
            .collect();
        self.cursor = (self.cursor + take) % len;
        batch
    }

    async fn poll_batch(&mut self) -> Result<(), FeedError> {
        let batch = self.batch();
        if batch.is_empty() {
            return Ok(());
        }

        let fetches: Vec<_> = batch
            .iter()
            .map(|market| {
                let rest = self.rest.clone();
                let venue = self.venue;
                let native = market.native_symbol.clone();
                let levels = self.depth_levels;
                async move { rest.fetch_depth(venue, &native, levels).await }
            })
            .collect();
        let results = join_all(fetches).await;

        let mut failures = 0usize;
        let mut first_error = None;
        for (market, result) in batch.iter().zip(results) {
            match result {
                Ok(depth) => self.buffer.push_back(BookEvent {
                    pair: market.pair.clone(),
                    bids: depth.bids,
                    asks: depth.asks,
                    is_snapshot: true,
                    seq: depth.seq,
                    ts_exchange: depth.ts_exchange,
                }),
                Err(e) => {
                    tracing::debug!("{}: depth fetch {} failed: {}", self.venue, market.pair, e);
                    failures += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        // A fully failed batch means the venue itself is unreachable
        if failures == batch.len() {
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VenueFeed for RestPollFeed {
    fn venue(&self) -> VenueId {
        self.venue
    }

    async fn connect(&mut self) -> Result<(), FeedError> {
        Ok(())
    }

    async fn discover(&mut self) -> Result<Vec<Market>, FeedError> {
        Ok(self.rest.fetch_instruments(self.venue).await?)
    }

    async fn subscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        for market in markets {
            if !self.markets.iter().any(|m| m.pair == market.pair) {
                self.markets.push(market.clone());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, markets: &[Market]) -> Result<(), FeedError> {
        self.markets
            .retain(|m| !markets.iter().any(|r| r.pair == m.pair));
        self.cursor = 0;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<FeedEvent>, FeedError> {
        loop {
            if let Some(event) = self.buffer.pop_front() {
                return Ok(Some(FeedEvent::Book(event)));
            }

            // Pace the next batch; the first one fires immediately
            if let Some(at) = self.next_poll {
                tokio::time::sleep_until(at).await;
            }
            self.next_poll = Some(Instant::now() + POLL_INTERVAL);

            if self.markets.is_empty() {
                return Ok(Some(FeedEvent::Heartbeat));
            }
            self.poll_batch().await?;
        }
    }

    async fn shutdown(&mut self) -> Result<(), FeedError> {
        self.buffer.clear();
        Ok(())
    }
}
