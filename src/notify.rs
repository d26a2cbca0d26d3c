//! Outbound notifier
//!
//! One human-readable message per opportunity. The Telegram transport is
//! used when credentials are configured; otherwise messages land in the
//! log at info level, which keeps the pipeline identical either way.

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::core::Opportunity;
use crate::infrastructure::Config;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    Send(String),
}

/// Outbound message transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Telegram bot transport
pub struct TelegramNotifier {
    bot: Bot,
    chat: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.bot
            .send_message(self.chat, text)
            .await
            .map(|_| ())
            .map_err(|e| NotifyError::Send(e.to_string()))
    }
}

/// Fallback transport when no credentials are configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!("alert: {}", text.replace('\n', " | "));
        Ok(())
    }
}

/// Pick the transport the configuration asks for
pub fn notifier_from_config(config: &Config) -> std::sync::Arc<dyn Notifier> {
    match (&config.notifier_token, config.notifier_chat) {
        (Some(token), Some(chat)) => {
            tracing::info!("telegram notifier enabled (chat {})", chat);
            std::sync::Arc::new(TelegramNotifier::new(token, chat))
        }
        _ => {
            tracing::warn!("notifier credentials not set, alerts go to the log");
            std::sync::Arc::new(LogNotifier)
        }
    }
}

/// Render one opportunity as an alert message
pub fn format_opportunity(opp: &Opportunity, id: u64) -> String {
    match opp {
        Opportunity::Cross(o) => format!(
            "[ARB #{id}] {pair} {buy}->{sell}\n\
             net {net} bps (gross {gross}) | notional {notional} {quote}\n\
             buy@{bvwap} sell@{svwap} | depth {bl}/{sl} levels\n\
             {ts} UTC",
            pair = o.pair,
            buy = o.buy_venue,
            sell = o.sell_venue,
            net = o.net_bps.round_dp(2),
            gross = o.gross_bps.round_dp(2),
            notional = o.notional.round_dp(2),
            quote = o.pair.quote(),
            bvwap = o.buy_vwap.normalize(),
            svwap = o.sell_vwap.normalize(),
            bl = o.buy_levels,
            sl = o.sell_levels,
            ts = o.t_detected.format("%H:%M:%S"),
        ),
        Opportunity::Tri(o) => {
            let legs: Vec<String> = o
                .legs
                .iter()
                .map(|leg| format!("{} {}", leg.side.name(), leg.pair))
                .collect();
            format!(
                "[TRI #{id}] {venue} {base} cycle\n\
                 net {net} bps (gross {gross}) | {legs}\n\
                 {ts} UTC",
                venue = o.venue,
                base = o.base,
                net = o.net_bps.round_dp(2),
                gross = o.gross_bps.round_dp(2),
                legs = legs.join(" -> "),
                ts = o.t_detected.format("%H:%M:%S"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CrossOpportunity, Leg, Pair, Side, TriOpportunity, VenueId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_cross() {
        let opp = Opportunity::Cross(CrossOpportunity {
            pair: Pair::new("BTC", "USDT"),
            buy_venue: VenueId::Binance,
            sell_venue: VenueId::Bybit,
            notional: dec!(100),
            gross_bps: dec!(33.333),
            net_bps: dec!(13.333),
            buy_vwap: dec!(30000),
            sell_vwap: dec!(30100),
            fillable_notional: dec!(100),
            buy_levels: 1,
            sell_levels: 2,
            t_detected: Utc::now(),
        });

        let text = format_opportunity(&opp, 7);
        assert!(text.starts_with("[ARB #7] BTC/USDT binance->bybit"));
        assert!(text.contains("net 13.33 bps (gross 33.33)"));
        assert!(text.contains("depth 1/2 levels"));
    }

    #[test]
    fn test_format_tri() {
        let opp = Opportunity::Tri(TriOpportunity {
            venue: VenueId::Okx,
            legs: [
                Leg { pair: Pair::new("ETH", "USDT"), side: Side::Buy },
                Leg { pair: Pair::new("ETH", "BTC"), side: Side::Sell },
                Leg { pair: Pair::new("BTC", "USDT"), side: Side::Sell },
            ],
            base: "USDT".to_string(),
            gross_bps: dec!(155),
            net_bps: dec!(124.58),
            levels_used: 3,
            t_detected: Utc::now(),
        });

        let text = format_opportunity(&opp, 8);
        assert!(text.starts_with("[TRI #8] okx USDT cycle"));
        assert!(text.contains("buy ETH/USDT -> sell ETH/BTC -> sell BTC/USDT"));
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        assert!(LogNotifier.send("hello").await.is_ok());
    }
}
