//! Connection management.
//!
//! [`SqliteStore`] owns a single [`rusqlite::Connection`] behind a mutex and
//! the sending half of the change feed. Migrations run before the store is
//! handed out. Cloning is cheap and every clone shares the same connection
//! and feed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::error::{Result, StoreError};
use crate::feed::FeedItem;
use crate::migrations;

/// Buffered change events per listener before it is considered lagging.
const FEED_CAPACITY: usize = 1024;

/// SQLite-backed document store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    pub(crate) feed: broadcast::Sender<FeedItem>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the default database file in the platform data
    /// directory:
    /// - Linux:   `~/.local/share/hubmail/hubmail.db`
    /// - macOS:   `~/Library/Application Support/org.hubmail.hubmail/hubmail.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\hubmail\hubmail\data\hubmail.db`
    pub fn open_default() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", "hubmail", "hubmail").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Self::open_at(&data_dir.join("hubmail.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "journal mode set");

        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database. Nothing survives the last clone.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&mut conn)?;

        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            feed,
            path,
        })
    }

    /// Filesystem path of the open database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
