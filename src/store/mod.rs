//! SQLite-backed persistence.
//!
//! One database file holds everything that outlives a request:
//!
//! - wizard session state, keyed by session id and `"<site>:<key>"`
//! - saved report definitions
//! - per-site column registrations
//!
//! The file lives at `<data dir>/reportkit/reports.db` unless configured
//! otherwise.
//!
//! # Design
//!
//! - JSON values in TEXT columns
//! - No expiry: session rows live as long as the host session does
//! - Versioned: a schema version mismatch refuses to open rather than
//!   silently dropping saved reports

mod columns;
mod reports;
mod session;

pub use columns::{default_human_name, is_valid_relation, ReportColumn};
pub use reports::{ReportDefinition, UNTITLED_REPORT};
pub use session::{session_key, SessionStore, SiteSession, WizardState, COLUMNS, FILTER_CRITERIA, FILTER_QUERY};

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

/// Current store schema version. Bump this when the schema changes.
const STORE_VERSION: i32 = 1;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store schema version {found} does not match expected version {expected}")]
    VersionMismatch { found: i32, expected: i32 },

    #[error("Report {id} not found for site '{site}'")]
    NotFound { site: String, id: String },

    #[error("Report {id} is not owned by the requesting user")]
    PermissionDenied { id: String },

    #[error("Invalid column relation: {0}")]
    InvalidRelation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// SQLite-backed store for sessions, reports and column registrations.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init()?;

        tracing::debug!(path = %path.display(), "opened report store");
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Initialize the schema and check the version.
    fn init(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_state (
                session_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, key)
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                app_label TEXT NOT NULL,
                name TEXT,
                description TEXT,
                data TEXT NOT NULL,
                added_by TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS reports_by_owner ON reports (app_label, added_by);

            CREATE TABLE IF NOT EXISTS report_columns (
                site_label TEXT NOT NULL,
                relation TEXT NOT NULL,
                human_name TEXT NOT NULL,
                PRIMARY KEY (site_label, relation)
            );
            ",
        )?;

        let stored_version: Option<i32> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == STORE_VERSION => {}
            Some(found) => {
                return Err(StoreError::VersionMismatch {
                    found,
                    expected: STORE_VERSION,
                })
            }
            None => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION.to_string()],
                )?;
            }
        }

        Ok(())
    }

    /// Drop every session row (used by maintenance commands).
    pub fn clear_sessions(&self) -> StoreResult<usize> {
        Ok(self.conn.execute("DELETE FROM session_state", [])?)
    }
}

/// Seconds since the unix epoch.
fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
