//! Upload and drain: replay the outbox against the remote.
//!
//! ```text
//! Idle -> Draining -> Idle (drained)
//!                  -> Idle (blocked at entry N)
//! ```
//!
//! Entries go out oldest first. A success removes exactly that entry. The
//! first failure stops the drain and leaves that entry and everything after
//! it queued, in order, for the next cycle. Entries with no handler are
//! skipped: they can never succeed and cannot regress remote state.

use jiff::Timestamp;
use uuid::Uuid;

use crate::model::Change;
use crate::transport::{Ack, Remote, TransportError};

use super::{Coordinator, Result};

/// An entry the drain stepped over.
#[derive(Debug)]
pub struct SkippedEntry {
    pub entry_id: Uuid,
    pub reason: String,
}

/// The entry that stopped the drain.
#[derive(Debug)]
pub struct BlockedEntry {
    pub entry_id: Uuid,
    /// The change being uploaded, e.g. `Task/U T1`.
    pub change: String,
    pub error: TransportError,
}

/// Outcome of one drain.
#[derive(Debug, Default)]
pub struct DrainReport {
    /// Entries accepted by the remote and removed from the outbox.
    pub applied: usize,
    pub skipped: Vec<SkippedEntry>,
    pub blocked: Option<BlockedEntry>,
}

impl DrainReport {
    /// True unless a remote failure halted the drain.
    pub fn is_drained(&self) -> bool {
        self.blocked.is_none()
    }
}

impl<R: Remote> Coordinator<'_, R> {
    /// Uploads queued mutations in chronological order.
    ///
    /// Remote failures never surface as errors: they end the drain and are
    /// reported in the returned [`DrainReport`]. Only local storage
    /// failures are returned as `Err`.
    pub fn push(&self) -> Result<DrainReport> {
        let mut entries = self.storage.list_mutations()?;
        // Stable: equal dates keep insertion order.
        entries.sort_by_key(|m| m.date);

        let mut report = DrainReport::default();
        for entry in entries {
            let change = match entry.change() {
                Ok(change) => change,
                Err(e) => {
                    tracing::warn!(entry = %entry.entry_id, error = %e, "skipping outbox entry");
                    report.skipped.push(SkippedEntry {
                        entry_id: entry.entry_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match self.dispatch(&change) {
                Ok(ack) => {
                    if let Some(assigned) = ack.assigned_id.as_deref()
                        && assigned != change.key()
                    {
                        tracing::warn!(%change, assigned, "remote assigned a different id");
                    }
                    self.storage.remove_mutation(entry.entry_id)?;
                    report.applied += 1;
                    tracing::debug!(%change, "uploaded");
                }
                Err(error) => {
                    tracing::warn!(%change, error = %error, "upload failed, drain stopped");
                    report.blocked = Some(BlockedEntry {
                        entry_id: entry.entry_id,
                        change: change.to_string(),
                        error,
                    });
                    break;
                }
            }
        }

        match &report.blocked {
            Some(blocked) => {
                self.note_failure(&blocked.error)?;
            }
            None => {
                self.storage.update_sync_state(|s| {
                    s.last_push_at = Some(Timestamp::now());
                    s.last_error = None;
                    s.consecutive_failures = 0;
                })?;
            }
        }
        tracing::info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            drained = report.is_drained(),
            "push finished"
        );
        Ok(report)
    }

    fn dispatch(&self, change: &Change) -> core::result::Result<Ack, TransportError> {
        match change {
            Change::CreateProcess(p) => self.remote.create_process(p),
            Change::UpdateProcess(p) => self.remote.update_process(p),
            Change::UpdateProcessStart(p) => self.remote.update_process_start(p),
            Change::CreateSubprocess(s) => self.remote.create_subprocess(s),
            Change::UpdateSubprocess(s) => self.remote.update_subprocess(s),
            Change::CreateTask(t) => self.remote.create_task(t),
            Change::UpdateTask(t) => self.remote.update_task(t),
            Change::EmitCertificate(s) => self.remote.emit_certificate(s),
        }
    }
}
