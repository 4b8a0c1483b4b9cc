use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hub::ChatMessage;

/// Body of the persistence call.
///
/// The hub's timestamp is not sent; the backend records its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistRequest<'a> {
    pub channel_id: &'a str,
    pub message: &'a str,
    pub message_from: &'a str,
}

impl<'a> From<&'a ChatMessage> for PersistRequest<'a> {
    fn from(msg: &'a ChatMessage) -> Self {
        Self {
            channel_id: &msg.channel_id,
            message: &msg.message,
            message_from: &msg.message_from,
        }
    }
}

/// What the persistence backend returns for a stored message: the channel the
/// message was appended to, with its message history.
///
/// Fields the backend leaves out decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Confirmation {
    pub id: String,
    pub user_email: String,
    pub rep_email: String,
    pub current_status: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoredMessage {
    pub message_from: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}
