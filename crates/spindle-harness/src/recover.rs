//! Startup sweep: age-based cleanup plus orphan recovery.
//!
//! Runs once when the daemon starts, before the facade serves its first
//! call. Records older than 24 hours are removed with their transient
//! siblings; every surviving `running` record gets a finalization pass so
//! children that completed while the daemon was down are reaped.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use spindle_core::SpoolStatus;
use spindle_store::SpoolStore;

use crate::{finalize, proc};

const MAX_RECORD_AGE_HOURS: i64 = 24;

/// Run the startup sweep. Returns the ids of spools still running, which
/// need their monitors respawned.
pub fn startup_sweep(store: &SpoolStore) -> Vec<String> {
    cleanup_old_spools(store);
    recover_orphans(store)
}

/// Remove records older than 24 hours together with their siblings.
///
/// A `running` record whose pid is still alive is spared: a long task
/// started before a restart keeps its slot until it finishes.
fn cleanup_old_spools(store: &SpoolStore) {
    let cutoff = Utc::now() - Duration::hours(MAX_RECORD_AGE_HOURS);

    for spool in store.list() {
        if spool.created_at >= cutoff {
            continue;
        }
        if spool.status == SpoolStatus::Running {
            if let Some(pid) = spool.pid {
                if proc::is_pid_alive(pid) {
                    debug!(id = %spool.id, pid, "sparing old running spool with live child");
                    continue;
                }
            }
        }
        info!(id = %spool.id, created_at = %spool.created_at, "sweeping old spool");
        store.delete_record(&spool.id);
    }
}

/// Finalize every `running` record whose child is already done.
///
/// Returns the ids that remain running and still need monitoring.
fn recover_orphans(store: &SpoolStore) -> Vec<String> {
    let mut still_running = Vec::new();
    for spool in store.list() {
        if spool.status != SpoolStatus::Running {
            continue;
        }
        if finalize::check_and_finalize(store, &spool.id) {
            debug!(id = %spool.id, "recovered orphaned spool");
        } else {
            still_running.push(spool.id);
        }
    }
    still_running
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::Spool;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, SpoolStore) {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        (dir, store)
    }

    fn aged(mut spool: Spool, hours: i64) -> Spool {
        spool.created_at = Utc::now() - Duration::hours(hours);
        spool
    }

    #[test]
    fn old_terminal_records_are_swept_with_siblings() {
        let (_dir, store) = store();
        let mut spool = aged(Spool::new("old1", "x", "/tmp"), 30);
        spool.status = SpoolStatus::Complete;
        store.write(&spool).unwrap();
        std::fs::write(store.stdout_path("old1"), "leftover").unwrap();

        startup_sweep(&store);

        assert!(store.read("old1").is_none());
        assert!(!store.stdout_path("old1").exists());
    }

    #[test]
    fn fresh_records_survive_the_sweep() {
        let (_dir, store) = store();
        let mut spool = Spool::new("new1", "x", "/tmp");
        spool.status = SpoolStatus::Complete;
        store.write(&spool).unwrap();

        startup_sweep(&store);
        assert!(store.read("new1").is_some());
    }

    #[test]
    fn old_running_with_live_pid_is_spared() {
        let (_dir, store) = store();
        let mut spool = aged(Spool::new("live1", "x", "/tmp"), 30);
        spool.status = SpoolStatus::Running;
        spool.pid = Some(std::process::id());
        store.write(&spool).unwrap();
        std::fs::write(store.stdout_path("live1"), "").unwrap();

        let still_running = startup_sweep(&store);

        assert!(store.read("live1").is_some());
        assert_eq!(still_running, vec!["live1".to_string()]);
    }

    #[test]
    fn old_running_with_dead_pid_is_swept() {
        let (_dir, store) = store();
        let mut spool = aged(Spool::new("dead1", "x", "/tmp"), 30);
        spool.status = SpoolStatus::Running;
        spool.pid = Some(999_999_999);
        store.write(&spool).unwrap();

        startup_sweep(&store);
        assert!(store.read("dead1").is_none());
    }

    #[test]
    fn running_with_complete_stdout_is_finalized_on_startup() {
        let (_dir, store) = store();
        let mut spool = Spool::new("r1", "x", "/tmp");
        spool.status = SpoolStatus::Running;
        spool.pid = Some(999_999_999);
        store.write(&spool).unwrap();
        std::fs::write(store.stdout_path("r1"), r#"{"result": "finished offline"}"#).unwrap();

        let still_running = startup_sweep(&store);

        assert!(still_running.is_empty());
        let spool = store.read("r1").unwrap();
        assert_eq!(spool.status, SpoolStatus::Complete);
        assert_eq!(spool.result.as_deref(), Some("finished offline"));
    }

    #[test]
    fn running_with_empty_stdout_and_dead_pid_becomes_error() {
        let (_dir, store) = store();
        let mut spool = Spool::new("r1", "x", "/tmp");
        spool.status = SpoolStatus::Running;
        spool.pid = Some(999_999_999);
        store.write(&spool).unwrap();

        startup_sweep(&store);
        let spool = store.read("r1").unwrap();
        assert_eq!(spool.status, SpoolStatus::Error);
    }

    #[test]
    fn live_running_spools_are_reported_for_monitoring() {
        let (_dir, store) = store();
        let mut spool = Spool::new("r1", "x", "/tmp");
        spool.status = SpoolStatus::Running;
        spool.pid = Some(std::process::id());
        store.write(&spool).unwrap();
        std::fs::write(store.stdout_path("r1"), "streaming").unwrap();

        let still_running = startup_sweep(&store);
        assert_eq!(still_running, vec!["r1".to_string()]);
        assert_eq!(store.read("r1").unwrap().status, SpoolStatus::Running);
    }
}
