//! Operation: the flat aggregate of local operational state.

use serde::{Deserialize, Serialize};

use super::{Process, Subprocess, Task};

/// The device's snapshot of in-flight work.
///
/// A flat collection, not a tree: parent/child relations exist only through
/// the `process_id`/`subprocess_id` foreign keys. All three collections are
/// required when deserializing; a missing one is a malformed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Operation {
    pub processes: Vec<Process>,
    pub subprocesses: Vec<Subprocess>,
    pub tasks: Vec<Task>,
}

/// A foreign key in the snapshot that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dangling {
    /// Subprocess whose process is missing.
    Subprocess {
        process_id: String,
        subprocess_id: String,
    },
    /// Task whose process is missing.
    Task { process_id: String, task_id: String },
    /// Task whose process exists but whose leg does not.
    TaskLeg {
        process_id: String,
        subprocess_id: String,
        task_id: String,
    },
}

impl Operation {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.subprocesses.is_empty() && self.tasks.is_empty()
    }

    pub fn process(&self, process_id: &str) -> Option<&Process> {
        self.processes.iter().find(|p| p.process_id == process_id)
    }

    pub fn process_mut(&mut self, process_id: &str) -> Option<&mut Process> {
        self.processes
            .iter_mut()
            .find(|p| p.process_id == process_id)
    }

    pub fn subprocess(&self, process_id: &str, subprocess_id: &str) -> Option<&Subprocess> {
        self.subprocesses
            .iter()
            .find(|s| s.process_id == process_id && s.subprocess_id == subprocess_id)
    }

    pub fn subprocess_mut(
        &mut self,
        process_id: &str,
        subprocess_id: &str,
    ) -> Option<&mut Subprocess> {
        self.subprocesses
            .iter_mut()
            .find(|s| s.process_id == process_id && s.subprocess_id == subprocess_id)
    }

    pub fn task_mut(&mut self, process_id: &str, task_id: &str) -> Option<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.process_id == process_id && t.task_id == task_id)
    }

    /// Legs of a process, in snapshot order.
    pub fn subprocesses_of<'a>(
        &'a self,
        process_id: &'a str,
    ) -> impl Iterator<Item = &'a Subprocess> + 'a {
        self.subprocesses
            .iter()
            .filter(move |s| s.process_id == process_id)
    }

    /// Every task of a process, attached directly or through a leg.
    pub fn tasks_of<'a>(&'a self, process_id: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.iter().filter(move |t| t.process_id == process_id)
    }

    /// Tasks of one leg.
    pub fn tasks_of_subprocess<'a>(
        &'a self,
        process_id: &'a str,
        subprocess_id: &'a str,
    ) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .iter()
            .filter(move |t| t.belongs_to(process_id, Some(subprocess_id)))
    }

    /// Foreign keys that do not resolve within this snapshot.
    ///
    /// The store accepts such snapshots (the remote authority may send
    /// them); derived views above simply never surface the orphans.
    pub fn dangling(&self) -> Vec<Dangling> {
        let mut found = Vec::new();
        for s in &self.subprocesses {
            if self.process(&s.process_id).is_none() {
                found.push(Dangling::Subprocess {
                    process_id: s.process_id.clone(),
                    subprocess_id: s.subprocess_id.clone(),
                });
            }
        }
        for t in &self.tasks {
            if self.process(&t.process_id).is_none() {
                found.push(Dangling::Task {
                    process_id: t.process_id.clone(),
                    task_id: t.task_id.clone(),
                });
            } else if let Some(sid) = &t.subprocess_id
                && self.subprocess(&t.process_id, sid).is_none()
            {
                found.push(Dangling::TaskLeg {
                    process_id: t.process_id.clone(),
                    subprocess_id: sid.clone(),
                    task_id: t.task_id.clone(),
                });
            }
        }
        found
    }
}
