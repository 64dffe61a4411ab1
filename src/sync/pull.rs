//! Download and flatten: remote hierarchy in, flat snapshot out.

use jiff::Timestamp;

use crate::model::Operation;
use crate::storage::ReplaceOutcome;
use crate::transport::{Remote, RemoteProcess};

use super::{Coordinator, Result, SyncError};

/// How a pull treats local changes that have not been uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullMode {
    /// Refuse to overwrite while the outbox holds entries a push can
    /// still deliver.
    #[default]
    Guarded,
    /// Overwrite unconditionally; queued entries still upload later, but
    /// the local snapshot loses anything the remote does not know yet.
    Force,
}

/// What a pull stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullReport {
    pub processes: usize,
    pub subprocesses: usize,
    pub tasks: usize,
}

/// Flattens the remote hierarchy into three collections.
///
/// Children are stamped with the foreign keys of the parent they were
/// nested under; tasks attached directly to a process carry no
/// `subprocess_id`.
pub fn flatten(hierarchy: Vec<RemoteProcess>) -> Operation {
    let mut op = Operation::default();
    for remote in hierarchy {
        let process_id = remote.process.process_id.clone();

        for mut task in remote.tasks {
            task.process_id.clone_from(&process_id);
            task.subprocess_id = None;
            op.tasks.push(task);
        }

        for leg in remote.subprocesses {
            let mut subprocess = leg.subprocess;
            subprocess.process_id.clone_from(&process_id);
            for mut task in leg.tasks {
                task.process_id.clone_from(&process_id);
                task.subprocess_id = Some(subprocess.subprocess_id.clone());
                op.tasks.push(task);
            }
            op.subprocesses.push(subprocess);
        }

        op.processes.push(remote.process);
    }
    op
}

impl<R: Remote> Coordinator<'_, R> {
    /// Replaces the local snapshot with the remote's.
    pub fn pull(&self, mode: PullMode) -> Result<PullReport> {
        if mode == PullMode::Guarded {
            let pending = self.storage.pending_len()?;
            if pending > 0 {
                return Err(SyncError::PendingMutations(pending));
            }
        }

        let hierarchy = match self.remote.fetch_hierarchy() {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "hierarchy download failed");
                self.note_failure(&e)?;
                return Err(e.into());
            }
        };

        let op = flatten(hierarchy);
        let report = PullReport {
            processes: op.processes.len(),
            subprocesses: op.subprocesses.len(),
            tasks: op.tasks.len(),
        };
        let dangling = op.dangling();
        if !dangling.is_empty() {
            tracing::warn!(count = dangling.len(), "remote snapshot has unresolved references");
        }

        match mode {
            PullMode::Guarded => {
                if let ReplaceOutcome::Refused { pending } =
                    self.storage.replace_operation_if_synced(&op)?
                {
                    return Err(SyncError::PendingMutations(pending));
                }
            }
            PullMode::Force => self.storage.replace_operation(&op)?,
        }

        self.storage.update_sync_state(|s| {
            s.last_pull_at = Some(Timestamp::now());
            s.last_error = None;
            s.consecutive_failures = 0;
        })?;
        tracing::info!(
            processes = report.processes,
            subprocesses = report.subprocesses,
            tasks = report.tasks,
            "pulled snapshot"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::{Change, fixtures};
    use crate::storage::test_storage;
    use crate::transport::memory::MemoryRemote;
    use crate::transport::{RemoteSubprocess, decode_hierarchy};

    /// `m` processes, each with `s` legs of `t` tasks and `t` direct tasks.
    fn hierarchy(m: usize, s: usize, t: usize) -> Vec<RemoteProcess> {
        (0..m)
            .map(|pi| {
                let pid = format!("P{pi}");
                RemoteProcess {
                    process: fixtures::process(&pid),
                    subprocesses: (0..s)
                        .map(|si| {
                            let sid = format!("S{si}");
                            // Remote children arrive without foreign keys.
                            RemoteSubprocess {
                                subprocess: fixtures::subprocess("", &sid),
                                tasks: (0..t)
                                    .map(|ti| fixtures::task("", None, &format!("{sid}-T{ti}")))
                                    .collect(),
                            }
                        })
                        .collect(),
                    tasks: (0..t)
                        .map(|ti| fixtures::task("", None, &format!("D-T{ti}")))
                        .collect(),
                }
            })
            .collect()
    }

    #[test]
    fn flatten_counts_every_level() {
        let op = flatten(hierarchy(3, 2, 4));

        assert_eq!(op.processes.len(), 3);
        assert_eq!(op.subprocesses.len(), 3 * 2);
        assert_eq!(op.tasks.len(), 3 * 4 + 3 * 2 * 4);
    }

    #[test]
    fn flatten_stamps_foreign_keys() {
        let op = flatten(hierarchy(2, 2, 2));

        for s in &op.subprocesses {
            assert!(!s.process_id.is_empty());
            assert!(op.process(&s.process_id).is_some());
        }
        for t in &op.tasks {
            assert!(!t.process_id.is_empty());
            match &t.subprocess_id {
                Some(sid) => {
                    assert!(t.task_id.starts_with(sid.as_str()));
                    assert!(op.subprocess(&t.process_id, sid).is_some());
                }
                None => assert!(t.task_id.starts_with("D-")),
            }
        }
        assert!(op.dangling().is_empty());
    }

    #[test]
    fn flatten_clears_stray_leg_on_direct_tasks() {
        let mut h = hierarchy(1, 0, 1);
        h[0].tasks[0].subprocess_id = Some("bogus".into());

        let op = flatten(h);
        assert_eq!(op.tasks[0].subprocess_id, None);
    }

    #[test]
    fn pull_replaces_snapshot() {
        let (_dir, storage) = test_storage();
        storage
            .replace_operation(&Operation {
                processes: vec![fixtures::process("STALE")],
                ..Default::default()
            })
            .unwrap();
        let remote = MemoryRemote::serving(hierarchy(2, 1, 1));

        let report = Coordinator::new(&storage, &remote)
            .pull(PullMode::Guarded)
            .unwrap();

        assert_eq!(
            report,
            PullReport {
                processes: 2,
                subprocesses: 2,
                tasks: 4,
            }
        );
        let op = storage.operation().unwrap();
        assert!(op.process("STALE").is_none());
        assert!(storage.sync_state().unwrap().last_pull_at.is_some());
    }

    #[test]
    fn pull_from_legacy_schema() {
        let (_dir, storage) = test_storage();
        let body = serde_json::json!([{
            "IdProceso": "P-old",
            "ServiceTypeId": "storage",
            "ResourceId": "yard",
            "StartDate": "2023-11-02T10:00:00Z",
            "Subprocesses": [{
                "SubprocessId": "S1",
                "DirectionId": "input",
                "Tasks": [{ "TaskId": "T1", "MaterialId": "metal", "DirectionId": "input" }]
            }]
        }]);
        let remote = MemoryRemote::serving(decode_hierarchy(body).unwrap());

        Coordinator::new(&storage, &remote)
            .pull(PullMode::Guarded)
            .unwrap();

        let op = storage.operation().unwrap();
        assert_eq!(op.processes[0].process_id, "P-old");
        assert_eq!(op.subprocesses[0].process_id, "P-old");
        assert_eq!(op.tasks[0].process_id, "P-old");
        assert_eq!(op.tasks[0].subprocess_id.as_deref(), Some("S1"));
    }

    #[test]
    fn guarded_pull_refuses_with_pending_outbox() {
        let (_dir, storage) = test_storage();
        let local = Operation {
            processes: vec![fixtures::process("LOCAL")],
            ..Default::default()
        };
        storage.replace_operation(&local).unwrap();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("LOCAL")))
            .unwrap();
        let remote = MemoryRemote::serving(hierarchy(1, 0, 0));

        let err = Coordinator::new(&storage, &remote)
            .pull(PullMode::Guarded)
            .unwrap_err();

        assert!(matches!(err, SyncError::PendingMutations(1)));
        assert_eq!(storage.operation().unwrap(), local);
    }

    #[test]
    fn forced_pull_overwrites_and_keeps_outbox() {
        let (_dir, storage) = test_storage();
        storage
            .append_mutation(&Change::CreateProcess(fixtures::process("LOCAL")))
            .unwrap();
        let remote = MemoryRemote::serving(hierarchy(1, 0, 0));

        Coordinator::new(&storage, &remote)
            .pull(PullMode::Force)
            .unwrap();

        assert_eq!(storage.operation().unwrap().processes[0].process_id, "P0");
        assert_eq!(storage.outbox_len().unwrap(), 1);
    }
}
