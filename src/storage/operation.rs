//! Operation store: read and replace the whole snapshot.
//!
//! There are no per-entity queries here. Callers read the snapshot and
//! filter in memory.

use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;

use crate::model::Operation;

use super::{Result, Storage, StorageError, outbox};

const KEY: &str = "operation";
const COLLECTIONS: [&str; 3] = ["Processes", "Subprocesses", "Tasks"];

/// Result of a replace that only proceeds when nothing is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// The outbox still held this many deliverable entries; the snapshot
    /// was left alone.
    Refused { pending: usize },
}

impl Storage {
    /// Returns the current snapshot.
    ///
    /// An empty snapshot is returned when nothing has been persisted yet.
    pub fn operation(&self) -> Result<Operation> {
        let conn = self.lock()?;
        read(&conn)
    }

    /// Overwrites the snapshot.
    pub fn replace_operation(&self, op: &Operation) -> Result<()> {
        let conn = self.lock()?;
        write(&conn, op)
    }

    /// Overwrites the snapshot from untyped JSON.
    ///
    /// All three collections must be present, even if empty.
    pub fn replace_operation_json(&self, value: &serde_json::Value) -> Result<()> {
        let op = decode(value)?;
        self.replace_operation(&op)
    }

    /// Overwrites the snapshot only if no deliverable entry is queued.
    ///
    /// Entries with no handler are ignored: a push skips them, so waiting
    /// for them would block pulls for good. The check and the write happen
    /// in one transaction, so a local write racing with this call either
    /// lands first (and refuses the replace) or lands on top of the new
    /// snapshot.
    pub fn replace_operation_if_synced(&self, op: &Operation) -> Result<ReplaceOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let pending = outbox::pending(&tx)?;
        if pending > 0 {
            return Ok(ReplaceOutcome::Refused { pending });
        }
        write(&tx, op)?;
        tx.commit()?;
        Ok(ReplaceOutcome::Replaced)
    }

    /// Resets the snapshot to the empty structure.
    ///
    /// Idempotent: the key stays in place holding `{[], [], []}`.
    pub fn clear_operation(&self) -> Result<()> {
        self.replace_operation(&Operation::default())
    }
}

pub(super) fn read(conn: &Connection) -> Result<Operation> {
    let json: Option<String> = conn
        .query_row("SELECT value FROM blobs WHERE key = ?1", [KEY], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(json) = json else {
        return Ok(Operation::default());
    };
    let value: serde_json::Value = serde_json::from_str(&json)?;
    decode(&value)
}

pub(super) fn write(conn: &Connection, op: &Operation) -> Result<()> {
    let json = serde_json::to_string(op)?;
    conn.execute(
        "INSERT INTO blobs (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![KEY, json],
    )?;
    Ok(())
}

fn decode(value: &serde_json::Value) -> Result<Operation> {
    let object = value
        .as_object()
        .ok_or_else(|| StorageError::InvalidState("snapshot is not an object".into()))?;
    let missing: Vec<&str> = COLLECTIONS
        .into_iter()
        .filter(|c| !object.get(*c).is_some_and(serde_json::Value::is_array))
        .collect();
    if !missing.is_empty() {
        return Err(StorageError::InvalidState(format!(
            "snapshot is missing {}",
            missing.join(", ")
        )));
    }
    Operation::deserialize(value)
        .map_err(|e| StorageError::InvalidState(format!("malformed snapshot: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{Change, Mutation, fixtures};
    use crate::storage::test_storage;

    fn sample() -> Operation {
        Operation {
            processes: vec![fixtures::process("P1")],
            subprocesses: vec![fixtures::subprocess("P1", "S1")],
            tasks: vec![fixtures::task("P1", Some("S1"), "T1")],
        }
    }

    #[test]
    fn empty_when_nothing_persisted() {
        let (_dir, storage) = test_storage();
        assert_eq!(storage.operation().unwrap(), Operation::default());
    }

    #[test]
    fn replace_is_idempotent() {
        let (_dir, storage) = test_storage();
        let op = sample();

        storage.replace_operation(&op).unwrap();
        assert_eq!(storage.operation().unwrap(), op);
        storage.replace_operation(&op).unwrap();
        assert_eq!(storage.operation().unwrap(), op);
    }

    #[test]
    fn replace_json_requires_every_collection() {
        let (_dir, storage) = test_storage();
        storage.replace_operation(&sample()).unwrap();

        let err = storage
            .replace_operation_json(&serde_json::json!({ "Processes": [], "Tasks": [] }))
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidState(ref m) if m.contains("Subprocesses")));
        // Nothing was written.
        assert_eq!(storage.operation().unwrap(), sample());
    }

    #[test]
    fn replace_json_accepts_empty_collections() {
        let (_dir, storage) = test_storage();
        storage
            .replace_operation_json(&serde_json::json!({
                "Processes": [], "Subprocesses": [], "Tasks": []
            }))
            .unwrap();
        assert!(storage.operation().unwrap().is_empty());
    }

    #[test]
    fn clear_is_idempotent() {
        let (_dir, storage) = test_storage();
        storage.replace_operation(&sample()).unwrap();

        storage.clear_operation().unwrap();
        storage.clear_operation().unwrap();

        assert!(storage.operation().unwrap().is_empty());
    }

    #[test]
    fn guarded_replace_refuses_while_outbox_pending() {
        let (_dir, storage) = test_storage();
        storage.replace_operation(&sample()).unwrap();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();

        let outcome = storage
            .replace_operation_if_synced(&Operation::default())
            .unwrap();

        assert_eq!(outcome, ReplaceOutcome::Refused { pending: 1 });
        assert_eq!(storage.operation().unwrap(), sample());
    }

    #[test]
    fn guarded_replace_ignores_entries_without_handler() {
        let (_dir, storage) = test_storage();
        let mut unknown = Mutation::new(
            &Change::CreateProcess(fixtures::process("P1")),
            jiff::Timestamp::now(),
        )
        .unwrap();
        unknown.object_type = "Invoice".into();
        storage.insert_raw_mutation(&unknown).unwrap();

        let outcome = storage.replace_operation_if_synced(&sample()).unwrap();

        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(storage.operation().unwrap(), sample());
        assert_eq!(storage.outbox_len().unwrap(), 1);
    }

    #[test]
    fn guarded_replace_writes_when_outbox_empty() {
        let (_dir, storage) = test_storage();
        let outcome = storage.replace_operation_if_synced(&sample()).unwrap();

        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(storage.operation().unwrap(), sample());
    }
}
