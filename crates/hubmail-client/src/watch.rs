//! Live watch sessions over one mailbox collection.
//!
//! A session subscribes to the collection's change feed, turns each raw
//! change into a [`MailboxEvent`] and reports its connectivity as a
//! sequence of [`WatchState`]s:
//!
//! ```text
//! Connecting -> Online -> Disconnected -> (wait) -> Connecting -> ...
//!            \-> Aborted                           (fatal error)
//!            \-> Stopped                           (shutdown signal)
//! ```
//!
//! Only connection-class failures are retried, and only when the session is
//! resilient. The retry decision is the pure function [`next_step`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use hubmail_shared::protocol::ChangeEvent;
use hubmail_shared::{decode_instance, CodecError, Collection, IdentityToken, MailboxId, Message, TokenError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::Credentials;
use crate::error::ClientError;

const CHANNEL_CAPACITY: usize = 64;

/// Raw changes of one collection, in delivery order.
pub type ChangeFeed = BoxStream<'static, Result<ChangeEvent, WatchError>>;

/// Opens change feeds. Implemented over HTTP by [`crate::HttpClient`].
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn subscribe(
        &self,
        token: &IdentityToken,
        mailbox: &MailboxId,
        collection: Collection,
    ) -> Result<ChangeFeed, WatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchState {
    Connecting,
    Online,
    Disconnected,
    /// Terminal: a non-recoverable failure.
    Aborted,
    /// Terminal: the caller asked the session to stop.
    Stopped,
}

/// A typed change to a watched collection. `id` is the store's instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxEvent {
    NewMessage { id: String, message: Message },
    MessageRead { id: String, message: Message },
    MessageDeleted { id: String },
}

impl MailboxEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::NewMessage { id, .. } | Self::MessageRead { id, .. } | Self::MessageDeleted { id } => {
                id
            }
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum WatchError {
    /// Transport-level failure; worth retrying.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Watch failed: {0}")]
    Fatal(String),

    /// A change carried a record that does not verify.
    #[error("Undecodable change: {0}")]
    Decode(#[from] CodecError),
}

impl WatchError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<ClientError> for WatchError {
    fn from(e: ClientError) -> Self {
        if e.is_connection_error() {
            Self::Connection(e.to_string())
        } else {
            Self::Fatal(e.to_string())
        }
    }
}

impl From<TokenError> for WatchError {
    fn from(e: TokenError) -> Self {
        Self::Fatal(e.to_string())
    }
}

/// Translate one raw change. Creates and saves are verified through the
/// codec; deletes carry only the id.
pub fn classify(change: ChangeEvent) -> Result<MailboxEvent, WatchError> {
    Ok(match change {
        ChangeEvent::Create {
            instance_id,
            instance,
        } => MailboxEvent::NewMessage {
            id: instance_id,
            message: decode_instance(&instance)?,
        },
        ChangeEvent::Save {
            instance_id,
            instance,
        } => MailboxEvent::MessageRead {
            id: instance_id,
            message: decode_instance(&instance)?,
        },
        ChangeEvent::Delete { instance_id } => MailboxEvent::MessageDeleted { id: instance_id },
    })
}

/// What the supervisor does once a session has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Report `Disconnected`, wait, then reconnect.
    Retry,
    /// Report `Disconnected` and end.
    Finish,
    /// Report `Aborted` and end.
    Abort,
}

pub fn next_step(error: &WatchError, resilient: bool) -> Step {
    match (error.is_recoverable(), resilient) {
        (false, _) => Step::Abort,
        (true, true) => Step::Retry,
        (true, false) => Step::Finish,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// Reconnect after connection failures instead of ending.
    pub resilient: bool,
    pub reconnect_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// A resilient session reconnecting at `config.reconnect_interval`.
impl From<&ClientConfig> for WatchConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            resilient: true,
            reconnect_interval: config.reconnect_interval,
        }
    }
}

/// Receiving ends of a running session. Both channels close exactly once,
/// when the session ends.
///
/// Every state transition is delivered, the terminal one included. A caller
/// that neither drains `states` nor drops it holds the session at its next
/// transition.
pub struct WatchHandle {
    pub events: mpsc::Receiver<MailboxEvent>,
    pub states: mpsc::Receiver<WatchState>,
    pub task: JoinHandle<()>,
}

/// Start a watch session in its own task. Setting `shutdown` to `true` (or
/// dropping its sender) stops the session.
pub fn spawn_watch(
    source: Arc<dyn ChangeSource>,
    credentials: Credentials,
    mailbox: MailboxId,
    collection: Collection,
    config: WatchConfig,
    shutdown: watch::Receiver<bool>,
) -> WatchHandle {
    let (events_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
    let (states_tx, states) = mpsc::channel(CHANNEL_CAPACITY);

    let supervisor = Supervisor {
        source,
        credentials,
        mailbox,
        collection,
        config,
        shutdown,
        events: events_tx,
        states: states_tx,
    };
    let task = tokio::spawn(supervisor.run());

    WatchHandle {
        events,
        states,
        task,
    }
}

enum Exit {
    Stopped,
    Failed(WatchError),
}

struct Supervisor {
    source: Arc<dyn ChangeSource>,
    credentials: Credentials,
    mailbox: MailboxId,
    collection: Collection,
    config: WatchConfig,
    shutdown: watch::Receiver<bool>,
    events: mpsc::Sender<MailboxEvent>,
    states: mpsc::Sender<WatchState>,
}

impl Supervisor {
    async fn run(mut self) {
        info!(mailbox = %self.mailbox.short(), collection = %self.collection, "watch started");

        loop {
            self.set_state(WatchState::Connecting).await;

            let error = match self.session().await {
                Exit::Stopped => {
                    self.set_state(WatchState::Stopped).await;
                    return;
                }
                Exit::Failed(e) => e,
            };

            match next_step(&error, self.config.resilient) {
                Step::Abort => {
                    warn!(collection = %self.collection, error = %error, "watch aborted");
                    self.set_state(WatchState::Aborted).await;
                    return;
                }
                Step::Finish => {
                    info!(collection = %self.collection, error = %error, "watch disconnected");
                    self.set_state(WatchState::Disconnected).await;
                    return;
                }
                Step::Retry => {
                    debug!(
                        collection = %self.collection,
                        error = %error,
                        retry_in = ?self.config.reconnect_interval,
                        "watch disconnected, retrying"
                    );
                    self.set_state(WatchState::Disconnected).await;

                    let stopped = tokio::select! {
                        biased;
                        _ = cancelled(&mut self.shutdown) => true,
                        _ = tokio::time::sleep(self.config.reconnect_interval) => false,
                    };
                    if stopped {
                        self.set_state(WatchState::Stopped).await;
                        return;
                    }
                }
            }
        }
    }

    /// One subscribe-then-consume cycle. The feed is dropped on return.
    async fn session(&mut self) -> Exit {
        let token = match self.credentials.mint() {
            Ok(token) => token,
            Err(e) => return Exit::Failed(e.into()),
        };

        let subscribe = self.source.subscribe(&token, &self.mailbox, self.collection);
        let mut feed = tokio::select! {
            biased;
            _ = cancelled(&mut self.shutdown) => return Exit::Stopped,
            result = subscribe => match result {
                Ok(feed) => feed,
                Err(e) => return Exit::Failed(e),
            },
        };

        self.set_state(WatchState::Online).await;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut self.shutdown) => return Exit::Stopped,
                next = feed.next() => next,
            };

            let event = match next {
                Some(Ok(change)) => match classify(change) {
                    Ok(event) => event,
                    Err(e) => return Exit::Failed(e),
                },
                Some(Err(e)) => return Exit::Failed(e),
                None => return Exit::Failed(WatchError::Connection("change feed closed".into())),
            };

            let delivered = tokio::select! {
                biased;
                _ = cancelled(&mut self.shutdown) => return Exit::Stopped,
                sent = self.events.send(event) => sent.is_ok(),
            };
            if !delivered {
                // Nobody is listening any more.
                return Exit::Stopped;
            }
        }
    }

    async fn set_state(&self, state: WatchState) {
        debug!(collection = %self.collection, ?state, "watch state");
        if self.states.send(state).await.is_err() {
            debug!(collection = %self.collection, "state receiver dropped");
        }
    }
}

/// Resolves once shutdown is requested or its sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
