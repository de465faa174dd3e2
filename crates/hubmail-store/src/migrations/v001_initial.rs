//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `databases`, `collections` and `instances`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Databases (one per mailbox)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS databases (
    id         TEXT PRIMARY KEY NOT NULL,   -- hex-encoded 32-byte id
    name       TEXT NOT NULL,
    owner      TEXT NOT NULL,               -- hex-encoded Ed25519 pubkey
    created_at INTEGER NOT NULL,            -- unix nanoseconds

    UNIQUE (name, owner)
);

-- ----------------------------------------------------------------
-- Collections
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS collections (
    db_id   TEXT NOT NULL,                  -- FK -> databases(id)
    name    TEXT NOT NULL,
    indexes TEXT NOT NULL,                  -- JSON array of field paths

    PRIMARY KEY (db_id, name),
    FOREIGN KEY (db_id) REFERENCES databases(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Instances (JSON documents)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS instances (
    db_id      TEXT NOT NULL,
    collection TEXT NOT NULL,
    id         TEXT NOT NULL,               -- value of the document's `_id`
    data       TEXT NOT NULL,               -- JSON document

    PRIMARY KEY (db_id, collection, id),
    FOREIGN KEY (db_id, collection) REFERENCES collections(db_id, name) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
