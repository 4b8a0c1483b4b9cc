//! Error types for the hub.
//!
//! None of these are fatal to the process. Each one is scoped to the
//! connection or message it came from and is logged where it happens.

use thiserror::Error;

use crate::client::ConnectionId;
use crate::relay::RelayError;

#[derive(Error, Debug)]
pub enum HubError {
    /// The WebSocket handshake never completed.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(#[source] tungstenite::Error),

    /// Reading from an open connection failed.
    #[error("read from {conn} failed: {source}")]
    Read {
        conn: ConnectionId,
        #[source]
        source: tungstenite::Error,
    },

    #[error("relay failed: {0}")]
    Relay(#[from] RelayError),

    /// A single recipient could not take a broadcast frame.
    #[error("write to {conn} failed: {reason}")]
    BroadcastWrite { conn: ConnectionId, reason: String },

    /// The dispatcher is gone and the inbound queue no longer accepts messages.
    #[error("inbound queue closed")]
    QueueClosed,

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
