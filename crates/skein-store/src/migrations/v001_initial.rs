//! v001 -- Initial schema creation.
//!
//! Creates the four index tables: `threads`, `blocks`, `thread_peers`, and
//! `notifications`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS threads (
    id         TEXT PRIMARY KEY NOT NULL,   -- base58 thread public key
    name       TEXT NOT NULL,
    secret_key TEXT NOT NULL,               -- hex-encoded 32-byte Ed25519 secret
    head       TEXT NOT NULL DEFAULT '',    -- comma-joined block ids, '' before genesis
    created_at TEXT NOT NULL                -- RFC-3339
);

-- ----------------------------------------------------------------
-- Blocks
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blocks (
    id                     TEXT PRIMARY KEY NOT NULL,  -- content address
    thread_id              TEXT NOT NULL,
    author_id              TEXT NOT NULL,              -- base58 peer id
    date                   TEXT NOT NULL,              -- RFC-3339, fixed width
    parents                TEXT NOT NULL DEFAULT '',   -- comma-joined block ids
    block_type             TEXT NOT NULL,
    author_username_cipher BLOB,
    data_id                TEXT,
    data_key_cipher        BLOB,
    data_caption_cipher    BLOB
);

CREATE INDEX IF NOT EXISTS idx_blocks_thread_date ON blocks(thread_id, date DESC);
CREATE INDEX IF NOT EXISTS idx_blocks_data_id ON blocks(data_id);

-- ----------------------------------------------------------------
-- Thread peers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS thread_peers (
    id        TEXT NOT NULL,                -- base58 peer id
    thread_id TEXT NOT NULL,
    welcomed  INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1

    PRIMARY KEY (id, thread_id)
);

CREATE INDEX IF NOT EXISTS idx_thread_peers_thread ON thread_peers(thread_id);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    date       TEXT NOT NULL,
    actor_id   TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    block_id   TEXT,
    kind       TEXT NOT NULL,
    body       TEXT NOT NULL,
    read       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_notifications_date ON notifications(date DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
