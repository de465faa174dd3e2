//! # hubmail-server
//!
//! RPC service for store-and-forward encrypted mailboxes.
//!
//! Each identity owns one mailbox database holding an inbox and a sentbox.
//! The service authenticates callers by identity token, checks mailbox
//! ownership and signatures, and persists both copies of every message.
//! It never sees plaintext.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod query;
pub mod schema;

pub use api::{build_router, serve, serve_listener, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
pub use mail::{Mail, MailError};
