//! Per-spool monitor: one daemon-lifetime task per running spool.
//!
//! Polls at a fixed 2-second cadence, enforces the wall-clock deadline,
//! watches a respin's stderr for the upstream session-expiry sentinel, and
//! drives finalization.

use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::time::Duration;
use tracing::{info, warn};

use spindle_core::{SpindleError, Spool, SpoolStatus};
use spindle_store::SpoolStore;

use crate::{argv, finalize, proc, spawn};

pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Grace between SIGTERM and SIGKILL on a deadline kill.
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Stderr marker the upstream emits when a resume target has expired.
pub const SESSION_EXPIRED_SENTINEL: &str = "No conversation found with session ID";

/// Start the monitor task for a running spool.
pub fn spawn_monitor(store: SpoolStore, id: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move { monitor_loop(store, id).await })
}

async fn monitor_loop(store: SpoolStore, id: String) {
    loop {
        let Some(spool) = store.read(&id) else {
            return;
        };
        if spool.status != SpoolStatus::Running {
            return;
        }

        if spool.deadline_exceeded() {
            enforce_timeout(&store, &id, &spool).await;
            return;
        }

        // A respin that has not yet fallen back watches for session expiry.
        if spool.session_id.is_some() && !spool.used_transcript_fallback {
            let stderr = fs::read_to_string(store.stderr_path(&id)).unwrap_or_default();
            if stderr.contains(SESSION_EXPIRED_SENTINEL) {
                handle_session_expiry(&store, &id, &spool);
            }
        }

        if finalize::check_and_finalize(&store, &id) {
            return;
        }
        tokio::time::sleep(MONITOR_POLL_INTERVAL).await;
    }
}

/// Deadline reached: signal the process group and mark the record.
async fn enforce_timeout(store: &SpoolStore, id: &str, spool: &Spool) {
    let limit = spool.timeout.unwrap_or(0);
    if let Some(pid) = spool.pid {
        if proc::is_pid_alive(pid) {
            proc::terminate_group(pid);
            tokio::time::sleep(TERM_GRACE).await;
            if proc::is_pid_alive(pid) {
                proc::kill_group(pid);
            }
        }
    }

    let Some(mut spool) = store.read(id) else {
        return;
    };
    if spool.status != SpoolStatus::Running {
        return;
    }
    spool.status = SpoolStatus::Timeout;
    spool.error = Some(format!("Timeout after {limit}s"));
    spool.completed_at = Some(Utc::now());
    if let Err(e) = store.write(&spool) {
        warn!(id, error = %e, "failed to persist timeout");
        return;
    }
    store.delete_transients(id);
    info!(id, limit, "spool timed out");
}

/// Upstream session expired mid-respin: replay the transcript if one exists.
///
/// Kills the failing child either way. With a transcript, the prompt is
/// rewritten to carry the previous conversation and the spool is respawned
/// without any resume flag. Without one, the child is left to finalize as
/// an error on the next pass.
fn handle_session_expiry(store: &SpoolStore, id: &str, spool: &Spool) {
    if let Some(pid) = spool.pid {
        if proc::is_pid_alive(pid) {
            proc::terminate_group(pid);
        }
    }

    let Some(session_id) = spool.session_id.as_deref() else {
        return;
    };

    let Some(transcript) = originating_transcript(store, id, session_id) else {
        info!(id, session_id, "session expired and no transcript exists");
        return;
    };

    // The record's prompt carries the "Continue <sid>: " prefix; the child
    // only needs the new message.
    let new_message = spool
        .prompt
        .strip_prefix(&format!("Continue {session_id}: "))
        .unwrap_or(&spool.prompt);
    let effective_prompt = format!(
        "Previous conversation transcript:\n\n{transcript}\n\n---\n\nContinue from above. New message: {new_message}"
    );

    let spec = match argv::compose(store, spool, &effective_prompt, None) {
        Ok(spec) => spec,
        Err(e) => {
            warn!(id, error = %e, "failed to compose fallback argv");
            return;
        }
    };

    match spawn::spawn_detached(store, id, &spec) {
        Ok(pid) => {
            let Some(mut spool) = store.read(id) else {
                return;
            };
            spool.pid = Some(pid);
            spool.used_transcript_fallback = true;
            if let Err(e) = store.write(&spool) {
                warn!(id, error = %e, "failed to persist transcript fallback");
            }
            info!(id, pid, "respawned with transcript fallback");
        }
        Err(e) => warn!(id, error = %e, "transcript fallback respawn failed"),
    }
}

/// Transcript of the spool that originally produced `session_id`.
fn originating_transcript(store: &SpoolStore, respin_id: &str, session_id: &str) -> Option<String> {
    let origin = store
        .list()
        .into_iter()
        .find(|s| s.id != respin_id && s.session_id.as_deref() == Some(session_id))?;
    store.read_transcript(&origin.id)
}

/// Cancel a running spool (`spin_drop`).
pub fn cancel(store: &SpoolStore, id: &str) -> Result<String> {
    let Some(mut spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };
    if spool.status != SpoolStatus::Running {
        return Err(SpindleError::NotRunning {
            id: id.to_string(),
            status: spool.status.to_string(),
        }
        .into());
    }
    let Some(pid) = spool.pid else {
        return Err(SpindleError::NoPid(id.to_string()).into());
    };

    proc::terminate_group(pid);

    spool.status = SpoolStatus::Error;
    spool.error = Some("Cancelled by user".to_string());
    spool.completed_at = Some(Utc::now());
    store.write(&spool)?;
    store.delete_transients(id);

    Ok(format!("Dropped spool {id}"))
}
