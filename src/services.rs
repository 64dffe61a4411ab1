//! Domain services: the state transitions field workers trigger.
//!
//! Each transition goes through [`Storage::record`], so the snapshot write
//! and the outbox entries it produces land together or not at all.
//!
//! Creating something under a parent that does not exist is an error.
//! Updating something that is no longer in the snapshot (e.g. a pull
//! removed it) is logged and skipped, returning `Ok(None)`.

use jiff::Timestamp;
use uuid::Uuid;

use crate::model::{Change, Direction, Operation, Process, Status, Subprocess, Task, Totals};
use crate::storage::{Storage, StorageError};

/// Errors from a domain transition.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = core::result::Result<T, ServiceError>;

/// Where and when something happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub timestamp: Timestamp,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Clock and geolocation provider.
pub trait Locator {
    fn fix(&self) -> Fix;
}

/// Input for a new process.
#[derive(Debug, Clone, Default)]
pub struct NewProcess {
    pub service_type_id: String,
    pub resource_id: String,
    pub order_id: Option<String>,
    pub title: String,
    pub notes: Option<String>,
}

/// The leg a task belongs to, matched by direction and facility.
#[derive(Debug, Clone)]
pub struct Leg {
    pub direction: Direction,
    pub facility_id: Option<String>,
    pub party_id: Option<String>,
}

/// Input for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub material_id: String,
    pub direction: Direction,
    pub quantity: Option<f64>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
    pub package_id: Option<String>,
    pub photos: Vec<String>,
    pub scheduled_date: Option<Timestamp>,
}

/// Measures of a task before it is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Measures {
    pub quantity: Option<f64>,
    pub weight: Option<f64>,
    pub volume: Option<f64>,
}

/// Starts a unit of work at the current fix.
pub fn start_process(storage: &Storage, locator: &impl Locator, new: NewProcess) -> Result<Process> {
    let fix = locator.fix();
    let process = Process {
        process_id: Uuid::new_v4().to_string(),
        service_type_id: new.service_type_id,
        resource_id: new.resource_id,
        status: Status::Pending,
        order_id: new.order_id,
        start_date: fix.timestamp,
        end_date: None,
        initial_latitude: fix.latitude,
        initial_longitude: fix.longitude,
        final_latitude: None,
        final_longitude: None,
        title: new.title,
        notes: new.notes,
        totals: Totals::default(),
    };
    storage.record(|op| {
        op.processes.push(process.clone());
        Ok::<_, ServiceError>(((), vec![Change::CreateProcess(process.clone())]))
    })?;
    tracing::info!(process = %process.process_id, "process started");
    Ok(process)
}

/// Re-stamps the start of an open process with the current fix.
pub fn restart_process(
    storage: &Storage,
    locator: &impl Locator,
    process_id: &str,
) -> Result<Option<Process>> {
    let fix = locator.fix();
    storage.record(|op| {
        let Some(process) = op.process_mut(process_id) else {
            return Ok(skip("process", process_id));
        };
        ensure_open(process)?;
        process.start_date = fix.timestamp;
        process.initial_latitude = fix.latitude;
        process.initial_longitude = fix.longitude;
        let process = process.clone();
        Ok((
            Some(process.clone()),
            vec![Change::UpdateProcessStart(process)],
        ))
    })
}

/// Adds a task to an open process.
///
/// With a `leg`, the task joins the pending leg of the same direction and
/// facility, or a new leg is created for it.
pub fn add_task(
    storage: &Storage,
    locator: &impl Locator,
    process_id: &str,
    leg: Option<Leg>,
    new: NewTask,
) -> Result<Task> {
    let fix = locator.fix();
    storage.record(|op| {
        let process = op.process(process_id).ok_or_else(|| ServiceError::NotFound {
            kind: "process",
            id: process_id.to_string(),
        })?;
        ensure_open(process)?;

        let mut changes = Vec::new();
        let subprocess_id = match leg {
            Some(leg) => Some(match find_leg(op, process_id, &leg) {
                Some(id) => id,
                None => {
                    let subprocess = new_leg(process_id, leg, fix.timestamp);
                    let id = subprocess.subprocess_id.clone();
                    op.subprocesses.push(subprocess.clone());
                    changes.push(Change::CreateSubprocess(subprocess));
                    id
                }
            }),
            None => None,
        };

        let task = Task {
            process_id: process_id.to_string(),
            subprocess_id,
            task_id: Uuid::new_v4().to_string(),
            material_id: new.material_id,
            status: Status::Pending,
            direction: new.direction,
            quantity: new.quantity,
            weight: new.weight,
            volume: new.volume,
            package_id: new.package_id,
            photos: new.photos,
            execution_date: None,
            request_date: Some(fix.timestamp),
            scheduled_date: new.scheduled_date,
        };
        op.tasks.push(task.clone());
        changes.push(Change::CreateTask(task.clone()));
        Ok((task, changes))
    })
}

/// Corrects the measures of a pending task.
///
/// Resolved tasks are frozen.
pub fn measure_task(
    storage: &Storage,
    process_id: &str,
    task_id: &str,
    measures: Measures,
) -> Result<Option<Task>> {
    storage.record(|op| {
        let Some(task) = op.task_mut(process_id, task_id) else {
            return Ok(skip("task", task_id));
        };
        if task.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "task {task_id} is {} and its measures are frozen",
                task.status
            )));
        }
        if measures.quantity.is_some() {
            task.quantity = measures.quantity;
        }
        if measures.weight.is_some() {
            task.weight = measures.weight;
        }
        if measures.volume.is_some() {
            task.volume = measures.volume;
        }
        let task = task.clone();
        Ok((Some(task.clone()), vec![Change::UpdateTask(task)]))
    })
}

/// Approves or rejects a task and rolls its measures into the totals of
/// its leg and process.
pub fn resolve_task(
    storage: &Storage,
    locator: &impl Locator,
    process_id: &str,
    task_id: &str,
    status: Status,
) -> Result<Option<Task>> {
    let fix = locator.fix();
    storage.record(|op| {
        match op.process(process_id) {
            Some(process) => ensure_open(process)?,
            None => return Ok(skip("process", process_id)),
        }
        let Some(task) = op.task_mut(process_id, task_id) else {
            return Ok(skip("task", task_id));
        };
        if !task.status.can_become(status) {
            return Err(ServiceError::InvalidState(format!(
                "task {task_id} cannot go from {} to {status}",
                task.status
            )));
        }
        task.status = status;
        task.execution_date.get_or_insert(fix.timestamp);
        let task = task.clone();

        let mut changes = vec![Change::UpdateTask(task.clone())];
        if let Some(sid) = &task.subprocess_id
            && let Some(leg) = op.subprocess_mut(process_id, sid)
        {
            leg.totals.add(task.quantity, task.weight, task.volume);
            changes.push(Change::UpdateSubprocess(leg.clone()));
        }
        if let Some(process) = op.process_mut(process_id) {
            process.totals.add(task.quantity, task.weight, task.volume);
            changes.push(Change::UpdateProcess(process.clone()));
        }
        Ok((Some(task), changes))
    })
}

/// Closes a process.
///
/// Every pending leg is closed too: approved if it holds at least one
/// approved task, rejected otherwise.
pub fn finish_process(
    storage: &Storage,
    locator: &impl Locator,
    process_id: &str,
    status: Status,
) -> Result<Option<Process>> {
    let fix = locator.fix();
    storage.record(|op| {
        let Some(process) = op.process(process_id) else {
            return Ok(skip("process", process_id));
        };
        if !process.status.can_become(status) {
            return Err(ServiceError::InvalidState(format!(
                "process {process_id} cannot go from {} to {status}",
                process.status
            )));
        }

        let outcomes: Vec<(String, Status)> = op
            .subprocesses_of(process_id)
            .filter(|s| !s.status.is_terminal())
            .map(|s| {
                let approved = op
                    .tasks_of_subprocess(process_id, &s.subprocess_id)
                    .any(|t| t.status == Status::Approved);
                let outcome = if approved {
                    Status::Approved
                } else {
                    Status::Rejected
                };
                (s.subprocess_id.clone(), outcome)
            })
            .collect();

        let mut changes = Vec::new();
        for (sid, leg_status) in outcomes {
            if let Some(leg) = op.subprocess_mut(process_id, &sid) {
                leg.status = leg_status;
                leg.end_date = Some(fix.timestamp);
                changes.push(Change::UpdateSubprocess(leg.clone()));
            }
        }

        let Some(process) = op.process_mut(process_id) else {
            return Ok(skip("process", process_id));
        };
        process.status = status;
        process.end_date = Some(fix.timestamp);
        process.final_latitude = fix.latitude;
        process.final_longitude = fix.longitude;
        let process = process.clone();
        changes.push(Change::UpdateProcess(process.clone()));
        tracing::info!(process = %process_id, %status, legs = changes.len() - 1, "process finished");
        Ok((Some(process), changes))
    })
}

/// Queues the certificate for an approved leg.
pub fn emit_certificate(
    storage: &Storage,
    process_id: &str,
    subprocess_id: &str,
) -> Result<Option<Subprocess>> {
    storage.record(|op| {
        let Some(leg) = op.subprocess(process_id, subprocess_id) else {
            return Ok(skip("subprocess", subprocess_id));
        };
        if leg.status != Status::Approved {
            return Err(ServiceError::InvalidState(format!(
                "subprocess {subprocess_id} is {}; only approved legs get a certificate",
                leg.status
            )));
        }
        let leg = leg.clone();
        Ok((Some(leg.clone()), vec![Change::EmitCertificate(leg)]))
    })
}

fn skip<T>(kind: &str, id: &str) -> (Option<T>, Vec<Change>) {
    tracing::warn!(kind, id, "not in the local snapshot, skipping");
    (None, Vec::new())
}

fn ensure_open(process: &Process) -> Result<()> {
    if process.is_closed() {
        return Err(ServiceError::InvalidState(format!(
            "process {} is closed ({})",
            process.process_id, process.status
        )));
    }
    Ok(())
}

fn find_leg(op: &Operation, process_id: &str, leg: &Leg) -> Option<String> {
    op.subprocesses_of(process_id)
        .find(|s| {
            s.status == Status::Pending
                && s.direction == leg.direction
                && s.facility_id() == leg.facility_id.as_deref()
        })
        .map(|s| s.subprocess_id.clone())
}

fn new_leg(process_id: &str, leg: Leg, at: Timestamp) -> Subprocess {
    let (source_facility_id, destination_facility_id, source_party_id, destination_party_id) =
        match leg.direction {
            Direction::Input => (leg.facility_id, None, leg.party_id, None),
            Direction::Output => (None, leg.facility_id, None, leg.party_id),
        };
    Subprocess {
        process_id: process_id.to_string(),
        subprocess_id: Uuid::new_v4().to_string(),
        direction: leg.direction,
        status: Status::Pending,
        source_facility_id,
        destination_facility_id,
        source_party_id,
        destination_party_id,
        start_date: Some(at),
        end_date: None,
        title: String::new(),
        notes: None,
        totals: Totals::default(),
    }
}
