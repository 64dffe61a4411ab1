//! Local persistence for the operation snapshot and the mutation outbox.
//!
//! Everything lives in one `SQLite` file under the data directory:
//!
//! ```text
//! <root>/device.sqlite
//!   blobs(key, value)          # "operation" snapshot, "sync_state" record
//!   outbox(seq, entry_id, body) # pending mutations in insertion order
//! ```
//!
//! The connection sits behind a mutex. Every read-modify-write runs inside
//! one transaction while the lock is held, so a pull and a local write can
//! never interleave.

mod operation;
mod outbox;
mod state;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::{fs, io};

use jiff::Timestamp;
use rusqlite::Connection;

use crate::model::{Change, Operation};

pub use operation::ReplaceOutcome;
pub use state::SyncState;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A snapshot is malformed, e.g. one of its collections is missing.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blobs (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS outbox (
        seq      INTEGER PRIMARY KEY AUTOINCREMENT,
        entry_id TEXT NOT NULL UNIQUE,
        body     TEXT NOT NULL
    );
";

/// The device's durable store: one per device, shared by reference.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (or creates) the database inside `root`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let conn = Connection::open(root.join("device.sqlite"))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the default storage root: `~/.fieldsync/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fieldsync"))
    }

    /// Applies a local write and queues the changes it produced, atomically.
    ///
    /// `apply` mutates the snapshot and returns the changes the remote
    /// authority must eventually see. Either the new snapshot and all of its
    /// outbox entries are persisted, or nothing is.
    pub fn record<T, E>(
        &self,
        apply: impl FnOnce(&mut Operation) -> core::result::Result<(T, Vec<Change>), E>,
    ) -> core::result::Result<T, E>
    where
        E: From<StorageError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StorageError::from)?;
        let mut op = operation::read(&tx)?;
        let (value, changes) = apply(&mut op)?;
        operation::write(&tx, &op)?;
        let now = Timestamp::now();
        for change in &changes {
            outbox::insert(&tx, change, now)?;
        }
        tx.commit().map_err(StorageError::from)?;
        tracing::debug!(queued = changes.len(), "recorded local write");
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

#[cfg(test)]
pub(crate) fn test_storage() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("device")).unwrap();
    (dir, storage)
}
