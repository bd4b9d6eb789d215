//! Finalization: the `running -> terminal` transition.
//!
//! Two finalizers may race (the per-spool monitor and an `unspool` caller);
//! the per-spool lock guarantees exactly one authoritative terminal write.
//! Contended callers yield; the holder will complete the work.

use chrono::Utc;
use std::fs;
use tracing::{debug, warn};

use spindle_core::{Spool, SpoolStatus};
use spindle_store::{SpoolLock, SpoolStore};

/// Cap on stderr captured into the record's error field.
const STDERR_ERROR_LIMIT: usize = 500;

/// Whether stdout already holds a complete terminal document.
///
/// The claude binary is observed not to exit promptly after writing its
/// result, so a parseable JSON with a `result` or `error` key counts as
/// done even while the pid is alive.
pub fn stdout_is_complete(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return false;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => value.get("result").is_some() || value.get("error").is_some(),
        Err(_) => false,
    }
}

/// Finalize a spool if its child is done.
///
/// Returns `true` iff this caller observed the spool terminal (either it
/// already was, or finalization just happened here). Returns `false` while
/// the child is still running or another finalizer holds the lock.
pub fn check_and_finalize(store: &SpoolStore, id: &str) -> bool {
    let Some(spool) = store.read(id) else {
        // Missing or unparseable record: nothing left to finalize.
        return true;
    };
    if spool.status != SpoolStatus::Running {
        return true;
    }
    if spool.pid.is_none() {
        // No pid yet, still starting.
        return false;
    }

    let _guard = match SpoolLock::try_acquire(store, id) {
        Ok(Some(guard)) => guard,
        Ok(None) => return false,
        Err(e) => {
            warn!(id, error = %e, "failed to open finalize lock");
            return false;
        }
    };

    // Re-read under the lock: the competing finalizer may have won.
    let Some(mut spool) = store.read(id) else {
        return true;
    };
    if spool.status != SpoolStatus::Running {
        return true;
    }
    let Some(pid) = spool.pid else {
        return false;
    };

    let stdout = fs::read_to_string(store.stdout_path(id)).unwrap_or_default();
    if crate::proc::is_pid_alive(pid) && !stdout_is_complete(&stdout) {
        return false;
    }

    let stderr = fs::read_to_string(store.stderr_path(id)).unwrap_or_default();
    apply_child_output(&mut spool, &stdout, &stderr);
    spool.completed_at = Some(Utc::now());

    if let Err(e) = store.write(&spool) {
        warn!(id, error = %e, "failed to persist terminal record");
        return false;
    }

    // Durable transcript for resumable sessions; best-effort.
    if spool.session_id.is_some() && !stdout.trim().is_empty() {
        if let Err(e) = store.save_transcript(id, &stdout) {
            warn!(id, error = %e, "failed to save transcript");
        }
    }

    store.delete_transients(id);
    debug!(id, status = %spool.status, "finalized spool");
    true
}

/// Map the child's captured output onto the record's terminal fields.
fn apply_child_output(spool: &mut Spool, stdout: &str, stderr: &str) {
    match serde_json::from_str::<serde_json::Value>(stdout.trim()) {
        Ok(data) if data.get("result").is_some() => {
            spool.result = Some(json_field_text(&data, "result"));
            if let Some(session_id) = data.get("session_id").and_then(|v| v.as_str()) {
                spool.session_id = Some(session_id.to_string());
            }
            spool.cost = data.get("cost").filter(|v| !v.is_null()).cloned();
            spool.status = SpoolStatus::Complete;
        }
        _ if !stdout.trim().is_empty() => {
            spool.result = Some(stdout.to_string());
            spool.status = SpoolStatus::Complete;
        }
        _ if !stderr.trim().is_empty() => {
            spool.status = SpoolStatus::Error;
            spool.error = Some(truncate_chars(stderr, STDERR_ERROR_LIMIT));
        }
        _ => {
            spool.status = SpoolStatus::Error;
            spool.error = Some("Process exited with no output".to_string());
        }
    }
}

fn json_field_text(data: &serde_json::Value, key: &str) -> String {
    match data.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
#[path = "finalize_tests.rs"]
mod tests;
