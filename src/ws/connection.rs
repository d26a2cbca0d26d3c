//! WebSocket connection
//!
//! Thin wrapper over tokio-tungstenite with a connect timeout, TCP_NODELAY
//! on plaintext streams, and protocol ping handling. Reconnection policy
//! lives in the connector driver, not here.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket transport errors
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("not connected")]
    NotConnected,
}

/// A live WebSocket stream to one venue
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    connected: bool,
    last_activity: Instant,
    url: String,
}

impl WsConnection {
    /// Connect with a 10 s timeout; Nagle is disabled on plain TCP
    pub async fn connect(url: &str) -> Result<Self, WsError> {
        let (stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| WsError::ConnectTimeout)?
            .map_err(|e| WsError::ConnectFailed(e.to_string()))?;

        if let MaybeTlsStream::Plain(tcp) = stream.get_ref() {
            tcp.set_nodelay(true)
                .map_err(|e| WsError::ConnectFailed(e.to_string()))?;
        }

        Ok(Self {
            stream,
            connected: true,
            last_activity: Instant::now(),
            url: url.to_string(),
        })
    }

    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        if !self.connected {
            return Err(WsError::NotConnected);
        }
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| WsError::SendFailed(e.to_string()))
    }

    /// Next text payload
    ///
    /// Protocol pings are answered inline and skipped; `Ok(None)` means the
    /// peer closed the stream gracefully.
    pub async fn recv_text(&mut self) -> Result<Option<String>, WsError> {
        loop {
            if !self.connected {
                return Err(WsError::NotConnected);
            }

            match self.stream.next().await {
                Some(Ok(msg)) => {
                    self.last_activity = Instant::now();
                    match msg {
                        Message::Text(text) => return Ok(Some(text.to_string())),
                        Message::Ping(payload) => {
                            self.stream
                                .send(Message::Pong(payload))
                                .await
                                .map_err(|e| WsError::SendFailed(e.to_string()))?;
                        }
                        Message::Close(_) => {
                            self.connected = false;
                            return Ok(None);
                        }
                        // Binary and pong frames carry nothing for us
                        _ => {}
                    }
                }
                Some(Err(e)) => {
                    self.connected = false;
                    return Err(WsError::ReceiveFailed(e.to_string()));
                }
                None => {
                    self.connected = false;
                    return Ok(None);
                }
            }
        }
    }

    #[inline(always)]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Time since the last frame arrived
    #[inline]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn close(&mut self) {
        if self.connected {
            let _ = self.stream.close(None).await;
            self.connected = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(WsError::NotConnected.to_string(), "not connected");
        assert_eq!(WsError::ConnectTimeout.to_string(), "connect timed out");
    }
}
