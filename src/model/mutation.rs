//! Mutation types: the outbox's record of pending local writes.
//!
//! `Change` is what the rest of the crate produces and consumes; it is a
//! closed sum type, so a new kind without a remote handler does not compile.
//! `Mutation` is the persisted form. It keeps the `(ObjectType, CRUD)` tag
//! as plain strings so records written by other app versions still load,
//! and only becomes a `Change` again when the outbox is drained.

use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Process, Subprocess, Task};

/// Which kind of entity (or remote action) a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Process,
    /// The start stamp of a process, updated on its own route.
    ProcessStart,
    Subprocess,
    Task,
    Certificate,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Process => "Process",
            Self::ProcessStart => "ProcessStart",
            Self::Subprocess => "Subprocess",
            Self::Task => "Task",
            Self::Certificate => "Certificate",
        }
    }
}

impl FromStr for ObjectType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Process" => Ok(Self::Process),
            "ProcessStart" => Ok(Self::ProcessStart),
            "Subprocess" => Ok(Self::Subprocess),
            "Task" => Ok(Self::Task),
            "Certificate" => Ok(Self::Certificate),
            _ => Err(()),
        }
    }
}

/// Create, update, or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crud {
    Create,
    Update,
    Delete,
}

impl Crud {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "C",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }
}

impl FromStr for Crud {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(Self::Create),
            "U" => Ok(Self::Update),
            "D" => Ok(Self::Delete),
            _ => Err(()),
        }
    }
}

/// One local write destined for the remote authority.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    CreateProcess(Process),
    UpdateProcess(Process),
    UpdateProcessStart(Process),
    CreateSubprocess(Subprocess),
    UpdateSubprocess(Subprocess),
    CreateTask(Task),
    UpdateTask(Task),
    EmitCertificate(Subprocess),
}

impl Change {
    /// The persisted `(ObjectType, CRUD)` tag.
    pub fn tag(&self) -> (ObjectType, Crud) {
        match self {
            Self::CreateProcess(_) => (ObjectType::Process, Crud::Create),
            Self::UpdateProcess(_) => (ObjectType::Process, Crud::Update),
            Self::UpdateProcessStart(_) => (ObjectType::ProcessStart, Crud::Update),
            Self::CreateSubprocess(_) => (ObjectType::Subprocess, Crud::Create),
            Self::UpdateSubprocess(_) => (ObjectType::Subprocess, Crud::Update),
            Self::CreateTask(_) => (ObjectType::Task, Crud::Create),
            Self::UpdateTask(_) => (ObjectType::Task, Crud::Update),
            Self::EmitCertificate(_) => (ObjectType::Certificate, Crud::Create),
        }
    }

    /// Primary key of the payload.
    pub fn key(&self) -> &str {
        match self {
            Self::CreateProcess(p) | Self::UpdateProcess(p) | Self::UpdateProcessStart(p) => {
                &p.process_id
            }
            Self::CreateSubprocess(s) | Self::UpdateSubprocess(s) | Self::EmitCertificate(s) => {
                &s.subprocess_id
            }
            Self::CreateTask(t) | Self::UpdateTask(t) => &t.task_id,
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::CreateProcess(p) | Self::UpdateProcess(p) | Self::UpdateProcessStart(p) => {
                serde_json::to_value(p)
            }
            Self::CreateSubprocess(s) | Self::UpdateSubprocess(s) | Self::EmitCertificate(s) => {
                serde_json::to_value(s)
            }
            Self::CreateTask(t) | Self::UpdateTask(t) => serde_json::to_value(t),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (object_type, crud) = self.tag();
        write!(f, "{}/{} {}", object_type.as_str(), crud.as_str(), self.key())
    }
}

/// A persisted outbox entry.
///
/// Entries are never edited after they are appended; they are only
/// removed, by `entry_id`, once the remote accepted them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mutation {
    /// Identity of this entry within the outbox.
    pub entry_id: Uuid,
    pub object_type: String,
    #[serde(rename = "CRUD")]
    pub crud: String,
    pub data: serde_json::Value,
    pub date: Timestamp,
    /// Primary key of the payload. Several entries may share it.
    pub id: String,
}

/// An outbox entry with no remote handler.
///
/// Such an entry can never succeed, so draining skips it.
#[derive(Debug, thiserror::Error)]
pub enum UnknownMutationKind {
    #[error("no handler for {object_type}/{crud}")]
    NoHandler { object_type: String, crud: String },

    #[error("undecodable {object_type}/{crud} payload: {source}")]
    Payload {
        object_type: String,
        crud: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Mutation {
    /// Builds the persisted record for a change, stamped with `date`.
    pub fn new(change: &Change, date: Timestamp) -> serde_json::Result<Self> {
        let (object_type, crud) = change.tag();
        Ok(Self {
            entry_id: Uuid::new_v4(),
            object_type: object_type.as_str().to_string(),
            crud: crud.as_str().to_string(),
            data: change.payload()?,
            date,
            id: change.key().to_string(),
        })
    }

    /// Decodes the record back into the change it was built from.
    pub fn change(&self) -> Result<Change, UnknownMutationKind> {
        let tag = (
            self.object_type.parse::<ObjectType>(),
            self.crud.parse::<Crud>(),
        );
        match tag {
            (Ok(ObjectType::Process), Ok(Crud::Create)) => self.data().map(Change::CreateProcess),
            (Ok(ObjectType::Process), Ok(Crud::Update)) => self.data().map(Change::UpdateProcess),
            (Ok(ObjectType::ProcessStart), Ok(Crud::Update)) => {
                self.data().map(Change::UpdateProcessStart)
            }
            (Ok(ObjectType::Subprocess), Ok(Crud::Create)) => {
                self.data().map(Change::CreateSubprocess)
            }
            (Ok(ObjectType::Subprocess), Ok(Crud::Update)) => {
                self.data().map(Change::UpdateSubprocess)
            }
            (Ok(ObjectType::Task), Ok(Crud::Create)) => self.data().map(Change::CreateTask),
            (Ok(ObjectType::Task), Ok(Crud::Update)) => self.data().map(Change::UpdateTask),
            (Ok(ObjectType::Certificate), Ok(Crud::Create)) => {
                self.data().map(Change::EmitCertificate)
            }
            _ => Err(UnknownMutationKind::NoHandler {
                object_type: self.object_type.clone(),
                crud: self.crud.clone(),
            }),
        }
    }

    fn data<T: DeserializeOwned>(&self) -> Result<T, UnknownMutationKind> {
        T::deserialize(&self.data).map_err(|source| UnknownMutationKind::Payload {
            object_type: self.object_type.clone(),
            crud: self.crud.clone(),
            source,
        })
    }
}
