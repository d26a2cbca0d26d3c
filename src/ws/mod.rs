//! WebSocket transport for venue depth streams

pub mod backoff;
pub mod connection;

pub use backoff::Backoff;
pub use connection::{WsConnection, WsError};
