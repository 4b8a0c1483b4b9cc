use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ConnectionId;

/// A chat message as it travels through the hub.
///
/// The hub stamps `timestamp` once, when the frame is read off the
/// connection. Whatever time the client put in its frame is discarded, and
/// the persistence backend never gets to set it.
///
/// On the wire the message is a JSON object with camel-cased keys:
///
/// ```json
/// {"channelId":"c1","message":"hi","messageFrom":"u1","timeStamp":"2025-01-01T12:00:00Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub channel_id: String,
    pub message: String,
    pub message_from: String,
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        channel_id: impl Into<String>,
        message: impl Into<String>,
        message_from: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            message: message.into(),
            message_from: message_from.into(),
            timestamp,
        }
    }
}

/// A message together with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: ConnectionId,
    pub message: ChatMessage,
}

impl Envelope {
    pub fn new(origin: ConnectionId, message: ChatMessage) -> Self {
        Self { origin, message }
    }
}
