//! Request and response bodies of the mail RPC surface, plus the change
//! events streamed to watchers. All bodies are JSON; byte fields travel as
//! standard base64.

use serde::{Deserialize, Serialize};

use crate::envelope::MessageRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMailboxResponse {
    pub mailbox: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Sender's mailbox (receives the sentbox copy)
    pub mailbox: String,
    /// Recipient public key
    pub to: String,
    #[serde(with = "base64_bytes")]
    pub to_body: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub to_signature: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub from_body: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub from_signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub id: String,
    /// Nanoseconds since the Unix epoch
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListInboxMessagesRequest {
    pub mailbox: String,
    #[serde(default)]
    pub seek: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub ascending: bool,
    /// Wire value of [`crate::types::MessageStatus`]
    #[serde(default)]
    pub status: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSentboxMessagesRequest {
    pub mailbox: String,
    #[serde(default)]
    pub seek: String,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub ascending: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageRecord>,
}

/// Addresses one message in one of the caller's collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub mailbox: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadInboxMessageResponse {
    pub read_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Set when a send delivered the recipient's copy and then failed; the
    /// id of that delivered message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// One raw change from a collection's change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ChangeEvent {
    Create {
        instance_id: String,
        instance: serde_json::Value,
    },
    Save {
        instance_id: String,
        instance: serde_json::Value,
    },
    Delete {
        instance_id: String,
    },
}

impl ChangeEvent {
    pub fn instance_id(&self) -> &str {
        match self {
            Self::Create { instance_id, .. }
            | Self::Save { instance_id, .. }
            | Self::Delete { instance_id } => instance_id,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}
