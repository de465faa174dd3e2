use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{INBOX_COLLECTION, MAILBOX_ID_SIZE, SENTBOX_COLLECTION};
use crate::error::IdentityError;

/// Identifier shared by the inbox and sentbox copies of one message.
///
/// Backed by a UUIDv7, so the hyphenated string form sorts in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IdentityError::InvalidMessageId(format!("{s:?}: {e}")))
    }

    /// The greatest id that can ever be issued. Seeking backwards from it
    /// starts at the newest message.
    pub fn ceiling() -> Self {
        Self(Uuid::from_u128(u128::MAX))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for MessageId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MessageId {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

/// Identifier of a mailbox database: 32 random bytes, rendered as hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MailboxId([u8; MAILBOX_ID_SIZE]);

impl MailboxId {
    pub fn random() -> Self {
        let mut bytes = [0u8; MAILBOX_ID_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidMailboxId(format!("{s:?}: {e}")))?;
        let arr: [u8; MAILBOX_ID_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            IdentityError::InvalidMailboxId(format!(
                "expected {MAILBOX_ID_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for MailboxId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MailboxId {
    type Error = IdentityError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<MailboxId> for String {
    fn from(id: MailboxId) -> Self {
        id.to_hex()
    }
}

/// The two collections every mailbox holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Inbox,
    Sentbox,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inbox => INBOX_COLLECTION,
            Self::Sentbox => SENTBOX_COLLECTION,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            INBOX_COLLECTION => Some(Self::Inbox),
            SENTBOX_COLLECTION => Some(Self::Sentbox),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-status filter for inbox listings. Travels as an integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum MessageStatus {
    #[default]
    Unspecified = 0,
    All = 1,
    Read = 2,
    Unread = 3,
}

impl MessageStatus {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::All),
            2 => Some(Self::Read),
            3 => Some(Self::Unread),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        self as i32
    }
}
