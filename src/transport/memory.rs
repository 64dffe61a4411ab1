//! In-memory remote for tests: records every call and can be told to fail.

use std::cell::{Cell, RefCell};

use crate::model::{Process, Subprocess, Task};

use super::{Ack, Remote, RemoteProcess, RemoteSubprocess, Result, TransportError};

#[derive(Default)]
struct State {
    processes: Vec<Process>,
    subprocesses: Vec<Subprocess>,
    tasks: Vec<Task>,
    certificates: Vec<(String, String)>,
    calls: Vec<String>,
}

/// A remote authority living in memory.
///
/// Updates of unknown entities answer 404, like the real service.
#[derive(Default)]
pub struct MemoryRemote {
    state: RefCell<State>,
    served: RefCell<Option<Vec<RemoteProcess>>>,
    fail_at: Cell<Option<usize>>,
    writes: Cell<usize>,
}

impl MemoryRemote {
    /// A remote whose hierarchy download returns `hierarchy` verbatim.
    pub fn serving(hierarchy: Vec<RemoteProcess>) -> Self {
        let remote = Self::default();
        *remote.served.borrow_mut() = Some(hierarchy);
        remote
    }

    /// Makes the `n`-th write (1-based) fail with a 503.
    pub fn failing_at(self, n: usize) -> Self {
        self.fail_at.set(Some(n));
        self
    }

    pub fn heal(&self) {
        self.fail_at.set(None);
    }

    /// Calls received so far, e.g. `"create_process P1"`.
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn certificates(&self) -> Vec<(String, String)> {
        self.state.borrow().certificates.clone()
    }

    fn write(&self, call: &str, key: &str) -> Result<()> {
        let n = self.writes.get() + 1;
        self.writes.set(n);
        self.state.borrow_mut().calls.push(format!("{call} {key}"));
        if self.fail_at.get() == Some(n) {
            return Err(TransportError::Status(503));
        }
        Ok(())
    }
}

fn not_found() -> TransportError {
    TransportError::Status(404)
}

impl Remote for MemoryRemote {
    fn fetch_hierarchy(&self) -> Result<Vec<RemoteProcess>> {
        if let Some(served) = self.served.borrow().as_ref() {
            return Ok(served.clone());
        }
        let state = self.state.borrow();
        Ok(state
            .processes
            .iter()
            .map(|p| {
                let legs = state
                    .subprocesses
                    .iter()
                    .filter(|s| s.process_id == p.process_id)
                    .map(|s| RemoteSubprocess {
                        subprocess: s.clone(),
                        tasks: state
                            .tasks
                            .iter()
                            .filter(|t| t.belongs_to(&p.process_id, Some(&s.subprocess_id)))
                            .cloned()
                            .collect(),
                    })
                    .collect();
                RemoteProcess {
                    process: p.clone(),
                    subprocesses: legs,
                    tasks: state
                        .tasks
                        .iter()
                        .filter(|t| t.belongs_to(&p.process_id, None))
                        .cloned()
                        .collect(),
                }
            })
            .collect())
    }

    fn create_process(&self, process: &Process) -> Result<Ack> {
        self.write("create_process", &process.process_id)?;
        self.state.borrow_mut().processes.push(process.clone());
        Ok(Ack::default())
    }

    fn update_process(&self, process: &Process) -> Result<Ack> {
        self.write("update_process", &process.process_id)?;
        let mut state = self.state.borrow_mut();
        let slot = state
            .processes
            .iter_mut()
            .find(|p| p.process_id == process.process_id)
            .ok_or_else(not_found)?;
        *slot = process.clone();
        Ok(Ack::default())
    }

    fn update_process_start(&self, process: &Process) -> Result<Ack> {
        self.write("update_process_start", &process.process_id)?;
        let mut state = self.state.borrow_mut();
        let slot = state
            .processes
            .iter_mut()
            .find(|p| p.process_id == process.process_id)
            .ok_or_else(not_found)?;
        slot.start_date = process.start_date;
        slot.initial_latitude = process.initial_latitude;
        slot.initial_longitude = process.initial_longitude;
        Ok(Ack::default())
    }

    fn create_subprocess(&self, subprocess: &Subprocess) -> Result<Ack> {
        self.write("create_subprocess", &subprocess.subprocess_id)?;
        self.state.borrow_mut().subprocesses.push(subprocess.clone());
        Ok(Ack::default())
    }

    fn update_subprocess(&self, subprocess: &Subprocess) -> Result<Ack> {
        self.write("update_subprocess", &subprocess.subprocess_id)?;
        let mut state = self.state.borrow_mut();
        let slot = state
            .subprocesses
            .iter_mut()
            .find(|s| {
                s.process_id == subprocess.process_id
                    && s.subprocess_id == subprocess.subprocess_id
            })
            .ok_or_else(not_found)?;
        *slot = subprocess.clone();
        Ok(Ack::default())
    }

    fn create_task(&self, task: &Task) -> Result<Ack> {
        self.write("create_task", &task.task_id)?;
        self.state.borrow_mut().tasks.push(task.clone());
        Ok(Ack::default())
    }

    fn update_task(&self, task: &Task) -> Result<Ack> {
        self.write("update_task", &task.task_id)?;
        let mut state = self.state.borrow_mut();
        let slot = state
            .tasks
            .iter_mut()
            .find(|t| t.process_id == task.process_id && t.task_id == task.task_id)
            .ok_or_else(not_found)?;
        *slot = task.clone();
        Ok(Ack::default())
    }

    fn emit_certificate(&self, subprocess: &Subprocess) -> Result<Ack> {
        self.write("emit_certificate", &subprocess.subprocess_id)?;
        self.state.borrow_mut().certificates.push((
            subprocess.process_id.clone(),
            subprocess.subprocess_id.clone(),
        ));
        Ok(Ack::default())
    }
}
