//! Output formatting for CLI display.

use crate::model::{Dangling, Mutation, Process, Task, Totals};
use crate::storage::SyncState;
use crate::sync::{BlockedEntry, DrainReport, PullReport, SkippedEntry};

pub(super) fn format_process(p: &Process) -> String {
    let title = if p.title.is_empty() {
        String::new()
    } else {
        format!(" {}", p.title)
    };
    let closed = if p.is_closed() { " (closed)" } else { "" };
    format!(
        "{} [{}]{title} {} on {}{closed} {}",
        short(&p.process_id),
        p.status,
        p.service_type_id,
        p.resource_id,
        format_totals(&p.totals),
    )
}

pub(super) fn format_task(t: &Task) -> String {
    let leg = t
        .subprocess_id
        .as_deref()
        .map_or_else(String::new, |s| format!(" leg {}", short(s)));
    format!(
        "{} [{}] {} {}{leg} {}",
        short(&t.task_id),
        t.status,
        t.direction,
        t.material_id,
        format_totals(&Totals {
            quantity: t.quantity.unwrap_or_default(),
            weight: t.weight.unwrap_or_default(),
            volume: t.volume.unwrap_or_default(),
        }),
    )
}

fn format_totals(totals: &Totals) -> String {
    format!(
        "qty {} / {} kg / {} m3",
        totals.quantity, totals.weight, totals.volume
    )
}

/// One outbox entry. Entries this build cannot interpret are flagged.
pub(super) fn format_mutation(m: &Mutation) -> String {
    match m.change() {
        Ok(change) => format!("{} {} {change}", m.entry_id, m.date),
        Err(e) => format!("{} {} {}/{} {} ({e})", m.entry_id, m.date, m.object_type, m.crud, m.id),
    }
}

pub(super) fn format_drain(report: &DrainReport) -> String {
    let mut lines = vec![format!("Pushed {} change(s)", report.applied)];
    lines.extend(report.skipped.iter().map(format_skipped));
    lines.extend(report.blocked.as_ref().map(format_blocked));
    lines.join("\n")
}

fn format_skipped(skipped: &SkippedEntry) -> String {
    format!(
        "Skipped {}: {} (left queued; `fieldsync outbox discard` drops it)",
        skipped.entry_id, skipped.reason
    )
}

fn format_blocked(blocked: &BlockedEntry) -> String {
    format!(
        "Stopped at {} ({}): {}",
        blocked.entry_id, blocked.change, blocked.error
    )
}

/// Status block: queue sizes and how the last cycles went.
pub(super) fn format_sync_state(state: &SyncState, queued: usize, pending: usize) -> String {
    let never = || "never".to_string();
    let mut lines = vec![format!("queued changes: {queued}")];
    if pending < queued {
        lines.push(format!(
            "                {} without handler, never uploaded",
            queued - pending
        ));
    }
    lines.push(format!(
        "last push:      {}",
        state.last_push_at.map_or_else(never, |t| t.to_string())
    ));
    lines.push(format!(
        "last pull:      {}",
        state.last_pull_at.map_or_else(never, |t| t.to_string())
    ));
    if let Some(error) = &state.last_error {
        lines.push(format!(
            "last error:     {error} ({} consecutive failure(s))",
            state.consecutive_failures
        ));
    }
    lines.join("\n")
}

pub(super) fn format_dangling(d: &Dangling) -> String {
    match d {
        Dangling::Subprocess {
            process_id,
            subprocess_id,
        } => format!("subprocess {subprocess_id}: no process {process_id}"),
        Dangling::Task {
            process_id,
            task_id,
        } => format!("task {task_id}: no process {process_id}"),
        Dangling::TaskLeg {
            process_id,
            subprocess_id,
            task_id,
        } => format!("task {task_id}: no subprocess {subprocess_id} in process {process_id}"),
    }
}

pub(super) fn format_pull(report: &PullReport) -> String {
    format!(
        "Pulled {} process(es), {} subprocess(es), {} task(s)",
        report.processes, report.subprocesses, report.tasks
    )
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
