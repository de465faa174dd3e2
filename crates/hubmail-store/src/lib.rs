//! # hubmail-store
//!
//! Document storage for the hubmail service.
//!
//! A store holds databases, each made of named collections of JSON
//! instances keyed by their `_id` field. The service talks to it through the
//! async [`DocumentStore`] trait; [`SqliteStore`] is the SQLite-backed
//! implementation, with schema migrations and an in-process change feed.

pub mod database;
pub mod feed;
pub mod migrations;
pub mod models;
pub mod query;
pub mod store;

mod documents;
mod error;

pub use database::SqliteStore;
pub use error::{Result, StoreError, DUPLICATE_ERR_MSG};
pub use feed::ChangeStream;
pub use models::{CollectionConfig, DatabaseInfo};
pub use query::Query;
pub use store::DocumentStore;
