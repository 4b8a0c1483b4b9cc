use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hub::ChatMessage;

/// A chat frame as sent by a client.
///
/// Clients may include `timeStamp`; it is accepted and ignored, since the hub
/// stamps messages itself on receipt. Missing fields decode as empty strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InboundFrame {
    pub channel_id: String,
    pub message: String,
    pub message_from: String,
}

impl InboundFrame {
    /// Parses a frame from text. Any JSON object is a frame; anything else is an error.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_str(text)?;
        serde_json::from_value(Value::Object(object))
    }

    pub fn into_message(self, received_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage::new(
            self.channel_id,
            self.message,
            self.message_from,
            received_at,
        )
    }
}
