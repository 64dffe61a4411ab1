//! Mutation outbox: an ordered, persisted list of pending mutations.
//!
//! Rows are only ever appended or deleted. `seq` preserves insertion order;
//! draining sorts by each entry's `Date` on top of that.

use jiff::Timestamp;
use rusqlite::Connection;
use uuid::Uuid;

use crate::model::{Change, Mutation};

use super::{Result, Storage};

impl Storage {
    /// Appends a mutation for `change`, stamped with the current time.
    ///
    /// Local writes queue their changes through [`Storage::record`]; this
    /// appends without touching the snapshot.
    #[cfg(test)]
    pub(crate) fn append_mutation(&self, change: &Change) -> Result<Mutation> {
        self.append_mutation_at(change, Timestamp::now())
    }

    /// Appends a mutation for `change` with an explicit date.
    #[cfg(test)]
    pub(crate) fn append_mutation_at(&self, change: &Change, date: Timestamp) -> Result<Mutation> {
        let conn = self.lock()?;
        insert(&conn, change, date)
    }

    /// Lists entries in storage (insertion) order.
    pub fn list_mutations(&self) -> Result<Vec<Mutation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT body FROM outbox ORDER BY seq")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for body in rows {
            entries.push(serde_json::from_str(&body?)?);
        }
        Ok(entries)
    }

    /// Removes a single entry by identity.
    ///
    /// Returns whether an entry was removed. Removing an entry that is not
    /// there is not an error.
    pub fn remove_mutation(&self, entry_id: Uuid) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM outbox WHERE entry_id = ?1",
            [entry_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Empties the outbox, returning how many entries were dropped.
    pub fn clear_outbox(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM outbox", [])?)
    }

    pub fn outbox_len(&self) -> Result<usize> {
        let conn = self.lock()?;
        count(&conn)
    }

    /// Counts the entries a push can still deliver.
    ///
    /// Entries with no handler are never uploaded, so they do not count.
    pub fn pending_len(&self) -> Result<usize> {
        let conn = self.lock()?;
        pending(&conn)
    }

    /// Stores an already-built record verbatim, e.g. one from another app
    /// version.
    #[cfg(test)]
    pub(crate) fn insert_raw_mutation(&self, mutation: &Mutation) -> Result<()> {
        let conn = self.lock()?;
        write_record(&conn, mutation)
    }
}

pub(super) fn insert(conn: &Connection, change: &Change, date: Timestamp) -> Result<Mutation> {
    let mutation = Mutation::new(change, date)?;
    write_record(conn, &mutation)?;
    tracing::debug!(entry = %mutation.entry_id, %change, "queued mutation");
    Ok(mutation)
}

fn count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
    Ok(usize::try_from(n).unwrap_or_default())
}

/// Entries whose kind and payload decode into a `Change`.
pub(super) fn pending(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare("SELECT body FROM outbox")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut n = 0;
    for body in rows {
        let handled = serde_json::from_str::<Mutation>(&body?)
            .ok()
            .is_some_and(|m| m.change().is_ok());
        if handled {
            n += 1;
        }
    }
    Ok(n)
}

fn write_record(conn: &Connection, mutation: &Mutation) -> Result<()> {
    let body = serde_json::to_string(mutation)?;
    conn.execute(
        "INSERT INTO outbox (entry_id, body) VALUES (?1, ?2)",
        rusqlite::params![mutation.entry_id.to_string(), body],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::fixtures;
    use crate::storage::test_storage;

    #[test]
    fn append_stamps_date_and_payload_id() {
        let (_dir, storage) = test_storage();
        let before = Timestamp::now();

        let m = storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();

        assert_eq!(m.id, "P1");
        assert!(m.date >= before);
        assert_eq!(storage.list_mutations().unwrap(), vec![m]);
    }

    #[test]
    fn list_preserves_insertion_order() {
        let (_dir, storage) = test_storage();
        let late = Timestamp::new(2_000_000_000, 0).unwrap();
        let early = Timestamp::new(1_000_000_000, 0).unwrap();

        storage
            .append_mutation_at(&Change::CreateProcess(fixtures::process("P2")), late)
            .unwrap();
        storage
            .append_mutation_at(&Change::CreateProcess(fixtures::process("P1")), early)
            .unwrap();

        let ids: Vec<_> = storage
            .list_mutations()
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, ["P2", "P1"]);
    }

    #[test]
    fn append_then_remove_restores_outbox() {
        let (_dir, storage) = test_storage();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();
        let before = storage.list_mutations().unwrap();

        let m = storage
            .append_mutation(&Change::CreateTask(fixtures::task("P1", None, "T1")))
            .unwrap();
        assert!(storage.remove_mutation(m.entry_id).unwrap());

        assert_eq!(storage.list_mutations().unwrap(), before);
    }

    #[test]
    fn remove_missing_entry_is_noop() {
        let (_dir, storage) = test_storage();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();

        assert!(!storage.remove_mutation(Uuid::new_v4()).unwrap());
        assert_eq!(storage.outbox_len().unwrap(), 1);
    }

    #[test]
    fn remove_targets_one_entry_among_same_payload_id() {
        let (_dir, storage) = test_storage();
        let create = storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();
        let update = storage
            .append_mutation(&Change::UpdateProcess(fixtures::process("P1")))
            .unwrap();

        storage.remove_mutation(create.entry_id).unwrap();

        assert_eq!(storage.list_mutations().unwrap(), vec![update]);
    }

    #[test]
    fn pending_ignores_entries_without_handler() {
        let (_dir, storage) = test_storage();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("P1")))
            .unwrap();
        let mut delete =
            Mutation::new(&Change::UpdateProcess(fixtures::process("P1")), Timestamp::now())
                .unwrap();
        delete.crud = "D".into();
        storage.insert_raw_mutation(&delete).unwrap();

        assert_eq!(storage.outbox_len().unwrap(), 2);
        assert_eq!(storage.pending_len().unwrap(), 1);
    }

    #[test]
    fn clear_empties_outbox() {
        let (_dir, storage) = test_storage();
        for id in ["P1", "P2"] {
            storage
                .append_mutation(&Change::CreateProcess(fixtures::process(id)))
                .unwrap();
        }

        assert_eq!(storage.clear_outbox().unwrap(), 2);
        assert_eq!(storage.outbox_len().unwrap(), 0);
        assert_eq!(storage.clear_outbox().unwrap(), 0);
    }
}
