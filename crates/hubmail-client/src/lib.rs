//! # hubmail-client
//!
//! Client side of the hubmail service: an HTTP transport, the
//! identity-bound [`Mailbox`] facade and live [`watch`] sessions.
//!
//! Every message handed out by this crate has had its signature checked
//! against its declared sender.

pub mod api;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod mailbox;
pub mod watch;

pub use api::MailApi;
pub use client::HttpClient;
pub use config::ClientConfig;
pub use credentials::Credentials;
pub use error::ClientError;
pub use mailbox::{ListOptions, Mailbox, SentMessage};
pub use watch::{
    classify, next_step, spawn_watch, ChangeSource, MailboxEvent, WatchConfig, WatchError,
    WatchHandle, WatchState,
};
