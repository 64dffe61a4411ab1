//! CLI interface for fieldsync.
//!
//! Every subcommand is non-interactive: arguments in, plain text out.
//! Local commands (`process`, `task`, `certificate`) only touch the device
//! store and queue mutations; `push`, `pull`, and `sync` talk to the remote.
//!
//! Process and task arguments take a full id or an unambiguous prefix.

mod format;

use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use jiff::Timestamp;
use uuid::Uuid;

use crate::config::Config;
use crate::model::{Direction, Operation, Status};
use crate::services::{self, Fix, Leg, Locator, Measures, NewProcess, NewTask};
use crate::storage::Storage;
use crate::sync::{Coordinator, PullMode, SyncError};
use crate::transport::HttpRemote;

use format::{
    format_dangling, format_drain, format_mutation, format_process, format_pull,
    format_sync_state, format_task,
};

/// fieldsync: offline-first operation tracking for field crews.
#[derive(Debug, Parser)]
#[command(name = "fieldsync", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r"Workflow: one transport run
  1. fieldsync process start --service transport --resource truck-7 --lat 4.61 --lon=-74.08
     → prints a process ID (e.g. 3f2a9c01)
  2. fieldsync task add 3f2 --material cardboard --direction input --quantity 5 --facility plant-1
  3. fieldsync task resolve 3f2 a91 --status approved
  4. fieldsync process finish 3f2 --status approved
  5. fieldsync sync

Offline: every step above is queued locally. `fieldsync outbox list` shows
what has not reached the remote yet; `fieldsync push` retries it.";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replace the local snapshot with the remote's.
    ///
    /// Refuses while local changes are queued, unless `--force`.
    Pull {
        /// Overwrite even if queued local changes are not on the remote yet.
        #[arg(long)]
        force: bool,
    },

    /// Upload queued changes, oldest first, stopping at the first failure.
    Push,

    /// Push, then pull if everything went through.
    Sync,

    /// Show queued changes and the last synchronization results.
    Status,

    /// Start, restart, finish, or list processes.
    Process {
        #[command(subcommand)]
        command: ProcessCommand,
    },

    /// Add, measure, or resolve tasks.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },

    /// Queue the certificate for an approved leg.
    Certificate {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        /// Subprocess ID (full).
        subprocess: String,
    },

    /// Inspect or edit the outbox of queued changes.
    Outbox {
        #[command(subcommand)]
        command: OutboxCommand,
    },

    /// Inspect or replace the local snapshot.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProcessCommand {
    /// Start a new process. Prints its ID.
    Start {
        #[arg(long)]
        service: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        order: Option<String>,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        notes: Option<String>,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Re-stamp the start date and position of an open process.
    Restart {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Approve or reject a process, closing its open legs.
    Finish {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        #[arg(long, value_enum)]
        status: StatusArg,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// List processes in the local snapshot.
    List,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Add a task to a process. Prints its ID.
    ///
    /// With `--facility` or `--party` the task joins (or opens) a leg.
    Add {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        #[arg(long)]
        material: String,
        #[arg(long, value_enum)]
        direction: DirectionArg,
        #[command(flatten)]
        measures: MeasureArgs,
        #[arg(long)]
        package: Option<String>,
        /// Encoded image. Can be specified multiple times.
        #[arg(long)]
        photo: Vec<String>,
        #[arg(long)]
        facility: Option<String>,
        #[arg(long)]
        party: Option<String>,
        /// When the task is planned to happen (RFC 3339).
        #[arg(long)]
        scheduled: Option<Timestamp>,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Correct the measures of a pending task.
    Measure {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        /// Task ID: full UUID or unambiguous prefix.
        task: String,
        #[command(flatten)]
        measures: MeasureArgs,
    },

    /// Approve or reject a task.
    Resolve {
        /// Process ID: full UUID or unambiguous prefix (e.g. `3f2`).
        process: String,
        /// Task ID: full UUID or unambiguous prefix.
        task: String,
        #[arg(long, value_enum)]
        status: StatusArg,
        #[command(flatten)]
        position: PositionArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum OutboxCommand {
    /// List queued changes in storage order.
    List,
    /// Drop one queued change for good.
    Discard { entry: Uuid },
    /// Drop every queued change.
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// Print the snapshot as JSON.
    Show,
    /// Replace the snapshot with a JSON file. Nothing is queued.
    Import { file: PathBuf },
    /// Reset the snapshot to empty.
    Clear,
}

/// Where the worker is. Omitted coordinates stay unset.
#[derive(Debug, Clone, Copy, Args)]
pub struct PositionArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    lon: Option<f64>,
}

impl Locator for PositionArgs {
    fn fix(&self) -> Fix {
        Fix {
            timestamp: Timestamp::now(),
            latitude: self.lat,
            longitude: self.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, Args)]
pub struct MeasureArgs {
    #[arg(long)]
    quantity: Option<f64>,
    #[arg(long)]
    weight: Option<f64>,
    #[arg(long)]
    volume: Option<f64>,
}

impl MeasureArgs {
    fn to_domain(self) -> Measures {
        Measures {
            quantity: self.quantity,
            weight: self.weight,
            volume: self.volume,
        }
    }
}

/// CLI-facing terminal status, mapped to the domain `Status`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Approved,
    Rejected,
}

impl StatusArg {
    fn to_domain(self) -> Status {
        match self {
            Self::Approved => Status::Approved,
            Self::Rejected => Status::Rejected,
        }
    }
}

/// CLI-facing direction, mapped to the domain `Direction`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Input,
    Output,
}

impl DirectionArg {
    fn to_domain(self) -> Direction {
        match self {
            Self::Input => Direction::Input,
            Self::Output => Direction::Output,
        }
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(config: &Config, storage: &Storage) -> Result<(), String> {
    let cli = Cli::parse();

    match cli.command {
        Command::Pull { force } => cmd_pull(config, storage, force),
        Command::Push => cmd_push(config, storage),
        Command::Sync => cmd_sync(config, storage),
        Command::Status => cmd_status(storage),
        Command::Process { command } => match command {
            ProcessCommand::Start {
                service,
                resource,
                order,
                title,
                notes,
                position,
            } => {
                let new = NewProcess {
                    service_type_id: service,
                    resource_id: resource,
                    order_id: order,
                    title,
                    notes,
                };
                let process = services::start_process(storage, &position, new)
                    .map_err(|e| format!("failed to start process: {e}"))?;
                println!("{}", process.process_id);
                Ok(())
            }
            ProcessCommand::Restart { process, position } => {
                let id = resolve_process_id(storage, &process)?;
                let restarted = services::restart_process(storage, &position, &id)
                    .map_err(|e| format!("failed to restart process: {e}"))?;
                report_skip(restarted.is_some(), "process", &id);
                Ok(())
            }
            ProcessCommand::Finish {
                process,
                status,
                position,
            } => {
                let id = resolve_process_id(storage, &process)?;
                let finished =
                    services::finish_process(storage, &position, &id, status.to_domain())
                        .map_err(|e| format!("failed to finish process: {e}"))?;
                if let Some(p) = finished {
                    eprintln!("Process {} {}", short(&p.process_id), p.status);
                }
                Ok(())
            }
            ProcessCommand::List => cmd_list(storage),
        },
        Command::Task { command } => cmd_task(storage, command),
        Command::Certificate {
            process,
            subprocess,
        } => {
            let process_id = resolve_process_id(storage, &process)?;
            let queued = services::emit_certificate(storage, &process_id, &subprocess)
                .map_err(|e| format!("failed to queue certificate: {e}"))?;
            report_skip(queued.is_some(), "subprocess", &subprocess);
            Ok(())
        }
        Command::Outbox { command } => cmd_outbox(storage, &command),
        Command::Snapshot { command } => cmd_snapshot(storage, command),
    }
}

fn coordinator_remote(config: &Config) -> Result<HttpRemote, String> {
    let url = config.remote_url()?;
    Ok(HttpRemote::new(
        url,
        config.auth_token.clone(),
        config.timeout(),
    ))
}

fn cmd_pull(config: &Config, storage: &Storage, force: bool) -> Result<(), String> {
    let remote = coordinator_remote(config)?;
    let mode = if force {
        PullMode::Force
    } else {
        PullMode::Guarded
    };
    let report = Coordinator::new(storage, &remote)
        .pull(mode)
        .map_err(|e| describe_sync_error(&e))?;
    eprintln!("{}", format_pull(&report));
    Ok(())
}

fn cmd_push(config: &Config, storage: &Storage) -> Result<(), String> {
    let remote = coordinator_remote(config)?;
    let report = Coordinator::new(storage, &remote)
        .push()
        .map_err(|e| describe_sync_error(&e))?;
    eprintln!("{}", format_drain(&report));
    if report.is_drained() {
        Ok(())
    } else {
        Err("push stopped early; queued changes are kept, run `fieldsync push` to retry".into())
    }
}

fn cmd_sync(config: &Config, storage: &Storage) -> Result<(), String> {
    let remote = coordinator_remote(config)?;
    let report = Coordinator::new(storage, &remote)
        .sync()
        .map_err(|e| describe_sync_error(&e))?;
    eprintln!("{}", format_drain(&report.drain));
    if let Some(pull) = &report.pull {
        eprintln!("{}", format_pull(pull));
    }
    if report.drain.is_drained() {
        Ok(())
    } else {
        Err("sync stopped early; queued changes are kept, run `fieldsync sync` to retry".into())
    }
}

fn cmd_status(storage: &Storage) -> Result<(), String> {
    let queued = storage
        .outbox_len()
        .map_err(|e| format!("failed to read outbox: {e}"))?;
    let pending = storage
        .pending_len()
        .map_err(|e| format!("failed to read outbox: {e}"))?;
    let state = storage
        .sync_state()
        .map_err(|e| format!("failed to read sync state: {e}"))?;
    let op = storage
        .operation()
        .map_err(|e| format!("failed to read snapshot: {e}"))?;

    println!("{}", format_sync_state(&state, queued, pending));
    if op.is_empty() {
        println!("snapshot:       empty");
    } else {
        println!(
            "snapshot:       {} process(es), {} subprocess(es), {} task(s)",
            op.processes.len(),
            op.subprocesses.len(),
            op.tasks.len()
        );
    }
    let dangling = op.dangling();
    if !dangling.is_empty() {
        println!("unresolved references: {}", dangling.len());
        for d in &dangling {
            println!("  {}", format_dangling(d));
        }
    }
    Ok(())
}

fn cmd_list(storage: &Storage) -> Result<(), String> {
    let op = storage
        .operation()
        .map_err(|e| format!("failed to read snapshot: {e}"))?;

    if op.processes.is_empty() {
        println!("No processes");
        return Ok(());
    }
    for p in &op.processes {
        println!("{}", format_process(p));
        for t in op.tasks_of(&p.process_id) {
            println!("    {}", format_task(t));
        }
    }
    Ok(())
}

fn cmd_task(storage: &Storage, command: TaskCommand) -> Result<(), String> {
    match command {
        TaskCommand::Add {
            process,
            material,
            direction,
            measures,
            package,
            photo,
            facility,
            party,
            scheduled,
            position,
        } => {
            let process_id = resolve_process_id(storage, &process)?;
            let direction = direction.to_domain();
            let leg = (facility.is_some() || party.is_some()).then(|| Leg {
                direction,
                facility_id: facility,
                party_id: party,
            });
            let new = NewTask {
                material_id: material,
                direction,
                quantity: measures.quantity,
                weight: measures.weight,
                volume: measures.volume,
                package_id: package,
                photos: photo,
                scheduled_date: scheduled,
            };
            let task = services::add_task(storage, &position, &process_id, leg, new)
                .map_err(|e| format!("failed to add task: {e}"))?;
            println!("{}", task.task_id);
            Ok(())
        }
        TaskCommand::Measure {
            process,
            task,
            measures,
        } => {
            let process_id = resolve_process_id(storage, &process)?;
            let task_id = resolve_task_id(storage, &process_id, &task)?;
            let measured =
                services::measure_task(storage, &process_id, &task_id, measures.to_domain())
                    .map_err(|e| format!("failed to measure task: {e}"))?;
            report_skip(measured.is_some(), "task", &task_id);
            Ok(())
        }
        TaskCommand::Resolve {
            process,
            task,
            status,
            position,
        } => {
            let process_id = resolve_process_id(storage, &process)?;
            let task_id = resolve_task_id(storage, &process_id, &task)?;
            let resolved = services::resolve_task(
                storage,
                &position,
                &process_id,
                &task_id,
                status.to_domain(),
            )
            .map_err(|e| format!("failed to resolve task: {e}"))?;
            if let Some(t) = resolved {
                eprintln!("Task {} {}", short(&t.task_id), t.status);
            }
            Ok(())
        }
    }
}

fn cmd_outbox(storage: &Storage, command: &OutboxCommand) -> Result<(), String> {
    match command {
        OutboxCommand::List => {
            let entries = storage
                .list_mutations()
                .map_err(|e| format!("failed to read outbox: {e}"))?;
            if entries.is_empty() {
                println!("Outbox empty");
            }
            for m in &entries {
                println!("{}", format_mutation(m));
            }
            Ok(())
        }
        OutboxCommand::Discard { entry } => {
            let removed = storage
                .remove_mutation(*entry)
                .map_err(|e| format!("failed to discard entry: {e}"))?;
            if removed {
                eprintln!("Discarded {entry}");
            } else {
                eprintln!("No queued entry {entry}");
            }
            Ok(())
        }
        OutboxCommand::Clear => {
            let n = storage
                .clear_outbox()
                .map_err(|e| format!("failed to clear outbox: {e}"))?;
            eprintln!("Discarded {n} queued change(s)");
            Ok(())
        }
    }
}

fn cmd_snapshot(storage: &Storage, command: SnapshotCommand) -> Result<(), String> {
    match command {
        SnapshotCommand::Show => {
            let op = storage
                .operation()
                .map_err(|e| format!("failed to read snapshot: {e}"))?;
            let json = serde_json::to_string_pretty(&op)
                .map_err(|e| format!("failed to serialize snapshot: {e}"))?;
            println!("{json}");
            Ok(())
        }
        SnapshotCommand::Import { file } => {
            let contents = fs::read_to_string(&file)
                .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&contents)
                .map_err(|e| format!("{} is not JSON: {e}", file.display()))?;
            storage
                .replace_operation_json(&value)
                .map_err(|e| format!("failed to import snapshot: {e}"))?;
            eprintln!("Imported {}", file.display());
            Ok(())
        }
        SnapshotCommand::Clear => {
            storage
                .clear_operation()
                .map_err(|e| format!("failed to clear snapshot: {e}"))?;
            eprintln!("Snapshot cleared");
            Ok(())
        }
    }
}

fn describe_sync_error(e: &SyncError) -> String {
    match e {
        SyncError::Transport(_) => format!("{e}\nNothing was lost; try again when online."),
        _ => e.to_string(),
    }
}

fn report_skip(applied: bool, kind: &str, id: &str) {
    if !applied {
        eprintln!("No {kind} {} in the local snapshot; nothing queued", short(id));
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn resolve_process_id(storage: &Storage, reference: &str) -> Result<String, String> {
    let op = storage
        .operation()
        .map_err(|e| format!("failed to read snapshot: {e}"))?;
    resolve_id(
        op.processes.iter().map(|p| p.process_id.as_str()),
        reference,
        "process",
    )
}

fn resolve_task_id(storage: &Storage, process_id: &str, reference: &str) -> Result<String, String> {
    let op: Operation = storage
        .operation()
        .map_err(|e| format!("failed to read snapshot: {e}"))?;
    resolve_id(
        op.tasks_of(process_id).map(|t| t.task_id.as_str()),
        reference,
        "task",
    )
}

/// Resolve a full id or an unambiguous prefix among `ids`.
fn resolve_id<'a>(
    ids: impl Iterator<Item = &'a str>,
    reference: &str,
    kind: &str,
) -> Result<String, String> {
    let matches: Vec<&str> = ids.filter(|id| id.starts_with(reference)).collect();
    if let Some(exact) = matches.iter().find(|id| **id == reference) {
        return Ok((*exact).to_string());
    }
    match matches.len() {
        0 => Err(format!("no {kind} matching '{reference}'")),
        1 => Ok(matches[0].to_string()),
        n => {
            let ids: Vec<&str> = matches.iter().map(|id| short(id)).collect();
            Err(format!(
                "'{reference}' is ambiguous: matches {n} {kind} ids: {}",
                ids.join(", ")
            ))
        }
    }
}
