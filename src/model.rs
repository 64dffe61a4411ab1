//! Core data model for fieldsync.
//!
//! The device keeps a flat snapshot of in-flight work: processes,
//! subprocesses, and tasks linked only by foreign keys. Every local write
//! that must reach the remote authority is captured as a mutation.

mod mutation;
mod operation;
mod process;
mod status;
mod subprocess;
mod task;

pub use mutation::{Change, Mutation};
pub use operation::{Dangling, Operation};
pub use process::Process;
pub use status::{Direction, Status, Totals};
pub use subprocess::Subprocess;
pub use task::Task;

#[cfg(test)]
pub(crate) use operation::fixtures;
