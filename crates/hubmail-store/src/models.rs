//! Descriptors persisted alongside the documents themselves.

use serde::{Deserialize, Serialize};

/// A registered database (one per mailbox).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Hex-encoded 32-byte id.
    pub id: String,
    pub name: String,
    /// Hex-encoded public key of the owning identity.
    pub owner: String,
    /// Nanoseconds since the Unix epoch.
    pub created_at: i64,
}

/// Schema of one collection: its name and the document fields to index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionConfig {
    pub name: String,
    /// Top-level JSON field names.
    pub indexes: Vec<String>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, indexes: &[&str]) -> Self {
        Self {
            name: name.into(),
            indexes: indexes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Whether `name` may be spliced into SQL as a JSON path or index suffix.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
