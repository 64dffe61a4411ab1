//! Synchronization coordinator: reconciles the device with the remote.
//!
//! Two independent operations:
//!
//! - `pull` downloads the remote hierarchy, flattens it, and replaces the
//!   local snapshot. The remote always wins.
//! - `push` drains the outbox in chronological order and stops at the
//!   first remote failure, so the remote sees writes in the order they
//!   were made.
//!
//! `sync` runs both: a pull only follows a push that drained everything.

mod pull;
mod push;

use crate::storage::{Storage, StorageError};
use crate::transport::{Remote, TransportError};

pub use pull::{PullMode, PullReport};
pub use push::{BlockedEntry, DrainReport, SkippedEntry};

/// Errors that stop a synchronization step.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("remote unavailable: {0}")]
    Transport(#[from] TransportError),

    /// A pull would overwrite local writes that have not been uploaded.
    #[error("{0} local change(s) not yet uploaded; push first or pull with --force")]
    PendingMutations(usize),
}

pub type Result<T> = core::result::Result<T, SyncError>;

/// Outcome of a full cycle.
#[derive(Debug)]
pub struct SyncReport {
    pub drain: DrainReport,
    /// `None` when the drain was blocked and the pull was not attempted.
    pub pull: Option<PullReport>,
}

/// Drives the remote on behalf of one device store.
pub struct Coordinator<'a, R> {
    storage: &'a Storage,
    remote: &'a R,
}

impl<'a, R: Remote> Coordinator<'a, R> {
    pub fn new(storage: &'a Storage, remote: &'a R) -> Self {
        Self { storage, remote }
    }

    /// Pushes pending writes, then refreshes the snapshot if nothing is
    /// left blocking.
    pub fn sync(&self) -> Result<SyncReport> {
        let drain = self.push()?;
        if !drain.is_drained() {
            return Ok(SyncReport { drain, pull: None });
        }
        let pull = match self.pull(PullMode::Guarded) {
            Ok(report) => Some(report),
            // A write landed between the drain and the pull; it goes out
            // next cycle.
            Err(SyncError::PendingMutations(n)) => {
                tracing::info!(pending = n, "skipping pull, new local changes queued");
                None
            }
            Err(e) => return Err(e),
        };
        Ok(SyncReport { drain, pull })
    }

    fn note_failure(&self, error: &TransportError) -> Result<()> {
        self.storage.update_sync_state(|s| {
            s.last_error = Some(error.to_string());
            s.consecutive_failures += 1;
        })?;
        Ok(())
    }
}
