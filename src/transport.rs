//! Remote transport: the network surface the sync coordinator drives.
//!
//! The coordinator only sees the [`Remote`] trait. [`HttpRemote`] talks to
//! the real service; tests use an in-memory fake.

mod http;
#[cfg(test)]
pub(crate) mod memory;
mod wire;

use crate::model::{Process, Subprocess, Task};

pub use http::HttpRemote;
pub use wire::{RemoteProcess, decode_hierarchy};
#[cfg(test)]
pub(crate) use wire::RemoteSubprocess;

/// Errors from a remote call. All of them are transient from the
/// coordinator's point of view: the entry stays queued.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("remote answered with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => Self::Status(code),
            other => Self::Request(other.to_string()),
        }
    }
}

pub type Result<T> = core::result::Result<T, TransportError>;

/// A successful remote write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Identifier the remote assigned, when it reports one.
    pub assigned_id: Option<String>,
}

/// The remote authority's operations.
pub trait Remote {
    /// Downloads the hierarchical snapshot: processes with nested legs and
    /// tasks.
    fn fetch_hierarchy(&self) -> Result<Vec<RemoteProcess>>;

    fn create_process(&self, process: &Process) -> Result<Ack>;
    fn update_process(&self, process: &Process) -> Result<Ack>;
    /// Updates only the start stamp (date and coordinates) of a process.
    fn update_process_start(&self, process: &Process) -> Result<Ack>;

    fn create_subprocess(&self, subprocess: &Subprocess) -> Result<Ack>;
    fn update_subprocess(&self, subprocess: &Subprocess) -> Result<Ack>;

    fn create_task(&self, task: &Task) -> Result<Ack>;
    fn update_task(&self, task: &Task) -> Result<Ack>;

    /// Asks the remote to issue the certificate for a finished leg.
    fn emit_certificate(&self, subprocess: &Subprocess) -> Result<Ack>;
}
