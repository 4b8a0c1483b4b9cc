//! Connection handle
//!
//! `Connection` is the registry's view of one live WebSocket session: an id
//! plus the sending side of that session's bounded outbound queue. The
//! transport owns the matching receiver and a writer task that drains it into
//! the socket, so a broadcast "write" never waits on the network.

use std::fmt;

use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::error::HubError;

/// Identity of a connection, stable for the connection's whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(format!("conn-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: Sender<WsMessage>,
}

impl Connection {
    /// Create a connection with a fresh id around the outbound queue sender.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self::with_id(ConnectionId::generate(), sender)
    }

    pub fn with_id(id: ConnectionId, sender: Sender<WsMessage>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// False once the writer task has gone away.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a frame for this connection without waiting.
    ///
    /// A full outbound queue counts as a failed write: one slow reader must not
    /// hold up a broadcast pass for everybody else.
    pub fn deliver(&self, frame: WsMessage) -> Result<(), HubError> {
        self.sender.try_send(frame).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "outbound queue full",
                TrySendError::Closed(_) => "connection closed",
            };
            HubError::BroadcastWrite {
                conn: self.id.clone(),
                reason: reason.to_string(),
            }
        })
    }
}
