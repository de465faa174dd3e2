use thiserror::Error;

/// Text SQLite reports when a uniqueness constraint rejects a write.
pub const DUPLICATE_ERR_MSG: &str = "UNIQUE constraint failed";

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one instance but found none.
    #[error("Instance not found")]
    NotFound,

    /// No database is registered under the requested id or owner.
    #[error("Database not found")]
    DatabaseNotFound,

    /// The database exists but does not hold the named collection.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Instance JSON could not be (de)serialized or lacks an `_id`.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Rejected index path, collection name or query field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A change-feed listener fell behind and missed events.
    #[error("Change feed lagged, {0} events dropped")]
    Lagged(u64),

    /// The connection mutex was poisoned by a panicking writer.
    #[error("Store connection poisoned")]
    Poisoned,

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    Task(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    /// Whether the store refused a write because the key already exists.
    pub fn is_duplicate(&self) -> bool {
        self.to_string().contains(DUPLICATE_ERR_MSG)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
