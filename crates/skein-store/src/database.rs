//! The SQLite metadata index: connection setup, data directory resolution
//! and the column codecs shared by the per-table modules.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::types::Type;
use rusqlite::Connection;

use skein_shared::types::{PeerId, ThreadId};

use crate::error::{Result, StoreError};
use crate::migrations;

/// File name of the metadata index inside a data directory.
pub const DB_FILE_NAME: &str = "skein.db";

/// An open, migrated index connection.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default metadata index.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/skein/skein.db`
    /// - macOS:   `~/Library/Application Support/org.skein.skein/skein.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\skein\skein\data\skein.db`
    pub fn new() -> Result<Self> {
        Self::open_in(&default_data_dir()?)
    }

    /// Open (or create) the index inside `data_dir`, creating the directory
    /// if needed.
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE_NAME);

        tracing::info!(path = %db_path.display(), "Opening thread index");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `None` for in-memory indexes.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

/// Platform data directory for skein.
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("org", "skein", "skein").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 so that text ordering matches time ordering.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parse_peer_id(idx: usize, s: &str) -> rusqlite::Result<PeerId> {
    PeerId::from_base58(s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parse_thread_id(idx: usize, s: &str) -> rusqlite::Result<ThreadId> {
    ThreadId::from_base58(s).map_err(|e| conversion_err(idx, e))
}
