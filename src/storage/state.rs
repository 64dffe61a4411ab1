//! Sync state: when the device last talked to the remote, and how it went.

use jiff::Timestamp;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{Result, Storage};

const KEY: &str = "sync_state";

/// Bookkeeping about past synchronization cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SyncState {
    pub last_push_at: Option<Timestamp>,
    pub last_pull_at: Option<Timestamp>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl Storage {
    /// Loads the sync state, or the default if none was recorded yet.
    pub fn sync_state(&self) -> Result<SyncState> {
        let conn = self.lock()?;
        read(&conn)
    }

    /// Applies `f` to the sync state and persists the result.
    pub fn update_sync_state(&self, f: impl FnOnce(&mut SyncState)) -> Result<SyncState> {
        let conn = self.lock()?;
        let mut state = read(&conn)?;
        f(&mut state);
        let json = serde_json::to_string(&state)?;
        conn.execute(
            "INSERT INTO blobs (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![KEY, json],
        )?;
        Ok(state)
    }
}

fn read(conn: &Connection) -> Result<SyncState> {
    let json: Option<String> = conn
        .query_row("SELECT value FROM blobs WHERE key = ?1", [KEY], |row| {
            row.get(0)
        })
        .optional()?;
    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(SyncState::default()),
    }
}
