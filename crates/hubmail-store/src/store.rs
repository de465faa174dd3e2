//! The document-store seam the mail service is written against.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::feed::ChangeStream;
use crate::models::{CollectionConfig, DatabaseInfo};
use crate::query::Query;

/// Databases of named collections holding JSON instances keyed by `_id`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a database with its collections. A second database with the
    /// same `(name, owner)` fails with a duplicate-key error.
    async fn new_db(
        &self,
        id: &str,
        name: &str,
        owner: &str,
        collections: &[CollectionConfig],
    ) -> Result<DatabaseInfo>;

    async fn get_db(&self, id: &str) -> Result<DatabaseInfo>;

    async fn find_db(&self, name: &str, owner: &str) -> Result<DatabaseInfo>;

    /// Insert a new instance and return its `_id`.
    async fn create(&self, db: &str, collection: &str, instance: &Value) -> Result<String>;

    /// Replace an existing instance, matched by its `_id`.
    async fn save(&self, db: &str, collection: &str, instance: &Value) -> Result<()>;

    async fn get(&self, db: &str, collection: &str, id: &str) -> Result<Value>;

    async fn delete(&self, db: &str, collection: &str, id: &str) -> Result<()>;

    async fn list(&self, db: &str, collection: &str, query: &Query) -> Result<Vec<Value>>;

    /// Subscribe to changes made after this call returns.
    fn listen(&self, db: &str, collection: &str) -> ChangeStream;
}
