//! Spin-family operations: admission, shard setup, spawn, wait, retry.
//!
//! The admission sequence is fixed: reserve a slot (stub record under the
//! global lock) first, then shard creation and spawning. Any failure after
//! the reservation finalizes the stub as `error`, which releases the slot.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use spindle_core::{duration, new_spool_id, Harness, SpindleError, Spool, SpoolStatus};
use spindle_harness::{argv, sandbox, spawn_monitor};
use spindle_shard::{effective_shard_prompt, spawn_shard, worktree::main_repo_of};
use spindle_store::{try_reserve_slot_and_create, SlotReservation};

use crate::daemon::Daemon;
use crate::settings;

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Arguments to `spin`, mirroring the tool schema.
#[derive(Debug, Default, Clone)]
pub struct SpinArgs {
    pub prompt: String,
    pub permission: Option<String>,
    pub shard: bool,
    pub system_prompt: Option<String>,
    pub working_dir: Option<String>,
    pub allowed_tools: Option<String>,
    pub tags: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<serde_json::Value>,
    pub skeinless: bool,
    pub harness: Harness,
}

/// Admit and spawn a new spool. Returns its id.
pub async fn spin(daemon: &Daemon, args: SpinArgs) -> Result<String> {
    let Some(working_dir) = args.working_dir.clone().filter(|d| !d.is_empty()) else {
        return Err(SpindleError::WorkingDirRequired.into());
    };

    // The gemini harness cannot start without a key; fail before any
    // record exists.
    if args.harness == Harness::Gemini && !settings::gemini_key_present() {
        return Err(SpindleError::MissingGeminiKey.into());
    }

    let timeout = resolve_timeout(args.timeout.as_ref())?;
    let (resolved_tools, auto_shard) =
        spindle_core::permission::resolve(args.permission.as_deref(), args.allowed_tools.as_deref());
    let use_shard = args.shard || auto_shard;

    let id = new_spool_id();
    let mut spool = Spool::new(&id, &args.prompt, &working_dir);
    spool.harness = args.harness;
    spool.allowed_tools = resolved_tools;
    spool.permission = args
        .permission
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| spindle_core::permission::DEFAULT_PROFILE.to_string());
    spool.system_prompt = args.system_prompt.clone();
    spool.tags = split_tags(args.tags.as_deref());
    spool.model = args.model.clone();
    spool.timeout = timeout;

    match try_reserve_slot_and_create(&daemon.store, &spool, daemon.settings.max_concurrent)? {
        SlotReservation::Reserved => {}
        SlotReservation::Rejected(err) => return Err(err.into()),
    }

    // From here on the stub occupies a slot: every failure path must
    // finalize it as error to give the slot back.
    let mut effective_prompt = args.prompt.clone();
    if use_shard {
        match spawn_shard(&daemon.skein, &id, Path::new(&working_dir)).await {
            Some(shard) => {
                let with_skein = daemon.skein.is_available().await && !args.skeinless;
                effective_prompt = effective_shard_prompt(&args.prompt, &id, with_skein);
                spool.working_dir = shard.worktree_path.clone();
                spool.shard = Some(shard);
            }
            None => {
                release_as_error(daemon, &mut spool, SpindleError::ShardSpawnFailed.to_string());
                return Err(SpindleError::ShardSpawnFailed.into());
            }
        }
    }

    let mut spec = match argv::compose(&daemon.store, &spool, &effective_prompt, None) {
        Ok(spec) => spec,
        Err(e) => {
            release_as_error(daemon, &mut spool, format!("Spawn failed: {e}"));
            return Err(e);
        }
    };
    if let Some(shard) = &spool.shard {
        spec = sandbox::wrap(spec, Path::new(&shard.worktree_path));
    }

    match spindle_harness::spawn_detached(&daemon.store, &id, &spec) {
        Ok(pid) => {
            spool.pid = Some(pid);
            spool.status = SpoolStatus::Running;
            daemon.store.write(&spool)?;
        }
        Err(e) => {
            release_as_error(daemon, &mut spool, format!("Spawn failed: {e}"));
            return Err(e);
        }
    }

    spawn_monitor(daemon.store.clone(), id.clone());
    info!(id, shard = spool.shard.is_some(), harness = %spool.harness, "spun spool");
    Ok(id)
}

/// Continue an existing session with a new message.
pub async fn respin(daemon: &Daemon, session_id: &str, prompt: &str) -> Result<String> {
    let origin = daemon.store.find_by_session(session_id);
    let working_dir = origin
        .as_ref()
        .map(|o| o.working_dir.clone())
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|d| d.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "/".to_string());
    let transcript_available = origin
        .as_ref()
        .is_some_and(|o| daemon.store.transcript_size(&o.id).is_some());

    let id = new_spool_id();
    let mut spool = Spool::new(&id, format!("Continue {session_id}: {prompt}"), working_dir);
    spool.session_id = Some(session_id.to_string());
    spool.transcript_fallback_available = transcript_available;

    match try_reserve_slot_and_create(&daemon.store, &spool, daemon.settings.max_concurrent)? {
        SlotReservation::Reserved => {}
        SlotReservation::Rejected(err) => return Err(err.into()),
    }

    let spec = match argv::compose(&daemon.store, &spool, prompt, Some(session_id)) {
        Ok(spec) => spec,
        Err(e) => {
            release_as_error(daemon, &mut spool, format!("Spawn failed: {e}"));
            return Err(e);
        }
    };
    match spindle_harness::spawn_detached(&daemon.store, &id, &spec) {
        Ok(pid) => {
            spool.pid = Some(pid);
            spool.status = SpoolStatus::Running;
            daemon.store.write(&spool)?;
        }
        Err(e) => {
            release_as_error(daemon, &mut spool, format!("Spawn failed: {e}"));
            return Err(e);
        }
    }

    spawn_monitor(daemon.store.clone(), id.clone());
    info!(id, session_id, transcript_available, "respun session");
    Ok(id)
}

/// Finalize-if-ready, then report result or status.
pub fn unspool(daemon: &Daemon, id: &str) -> String {
    spindle_harness::check_and_finalize(&daemon.store, id);
    let Some(spool) = daemon.store.read(id) else {
        return format!("Error: Unknown spool_id '{id}'");
    };
    match spool.status {
        SpoolStatus::Pending => format!("Spool {id} pending (not yet started)"),
        SpoolStatus::Running => {
            let preview: String = spool.prompt.chars().take(50).collect();
            format!("Spool {id} still running: {preview}...")
        }
        SpoolStatus::Complete => spool.result.unwrap_or_else(|| "No result".to_string()),
        SpoolStatus::Error | SpoolStatus::Timeout => format!(
            "Spool {id} failed: {}",
            spool.error.unwrap_or_else(|| "Unknown error".to_string())
        ),
    }
}

/// Block until spools complete (`gather`) or the first one does (`yield`).
pub async fn spin_wait(
    daemon: &Daemon,
    spool_ids: &str,
    mode: &str,
    timeout: Option<serde_json::Value>,
) -> Result<String> {
    let ids: Vec<String> = spool_ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let timeout = resolve_timeout(timeout.as_ref())?;
    let started = Utc::now();

    if mode == "yield" {
        loop {
            for id in &ids {
                spindle_harness::check_and_finalize(&daemon.store, id);
                let Some(spool) = daemon.store.read(id) else {
                    return Ok(format!("Error: Unknown spool_id '{id}'"));
                };
                match spool.status {
                    SpoolStatus::Complete => {
                        return Ok(spool.result.unwrap_or_else(|| "No result".to_string()));
                    }
                    SpoolStatus::Error | SpoolStatus::Timeout => {
                        return Ok(format!(
                            "Error: {}",
                            spool.error.unwrap_or_else(|| "Unknown error".to_string())
                        ));
                    }
                    _ => {}
                }
            }
            if let Some(limit) = timeout {
                let elapsed = Utc::now().signed_duration_since(started).num_seconds();
                if elapsed >= limit as i64 {
                    return Ok(format!(
                        "Timeout after {limit}s. Spools still running: {}",
                        ids.join(", ")
                    ));
                }
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    // gather mode: wait for all.
    let mut results = serde_json::Map::new();
    let mut pending: Vec<String> = ids.clone();
    loop {
        pending.retain(|id| {
            spindle_harness::check_and_finalize(&daemon.store, id);
            match daemon.store.read(id) {
                Some(spool) => match spool.status {
                    SpoolStatus::Complete => {
                        results.insert(
                            id.clone(),
                            serde_json::Value::String(
                                spool.result.unwrap_or_else(|| "No result".to_string()),
                            ),
                        );
                        false
                    }
                    SpoolStatus::Error | SpoolStatus::Timeout => {
                        results.insert(
                            id.clone(),
                            serde_json::Value::String(format!(
                                "Error: {}",
                                spool.error.unwrap_or_else(|| "Unknown error".to_string())
                            )),
                        );
                        false
                    }
                    _ => true,
                },
                None => {
                    results.insert(
                        id.clone(),
                        serde_json::Value::String(format!("Error: Unknown spool_id '{id}'")),
                    );
                    false
                }
            }
        });

        if pending.is_empty() {
            return Ok(serde_json::to_string_pretty(&results)?);
        }
        if let Some(limit) = timeout {
            let elapsed = Utc::now().signed_duration_since(started).num_seconds();
            if elapsed >= limit as i64 {
                return Ok(format!(
                    "Timeout after {limit}s. Still pending: {}. Completed: {}",
                    pending.join(", "),
                    serde_json::to_string(&results)?
                ));
            }
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

/// Re-run a spool with the same parameters.
///
/// A sharded spool is retried against the base repository (two levels above
/// the recorded worktree) with a fresh shard; the old worktree path is
/// usually gone by retry time.
pub async fn retry(daemon: &Daemon, id: &str) -> Result<String> {
    let Some(old) = daemon.store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };

    let (working_dir, shard) = match &old.shard {
        Some(info) => (
            main_repo_of(Path::new(&info.worktree_path))
                .to_string_lossy()
                .into_owned(),
            true,
        ),
        None => (old.working_dir.clone(), false),
    };

    spin(
        daemon,
        SpinArgs {
            prompt: old.prompt.clone(),
            permission: Some(old.permission.clone()),
            shard,
            system_prompt: old.system_prompt.clone(),
            working_dir: Some(working_dir),
            allowed_tools: old.allowed_tools.clone(),
            tags: if old.tags.is_empty() {
                None
            } else {
                Some(old.tags.join(","))
            },
            model: old.model.clone(),
            timeout: old.timeout.map(serde_json::Value::from),
            skeinless: false,
            harness: old.harness,
        },
    )
    .await
}

/// Spin an internal triage agent against an orphan worktree.
pub async fn triage(daemon: &Daemon, worktree_path: &str) -> Result<String> {
    let path = Path::new(worktree_path);
    if !path.exists() {
        anyhow::bail!("Path does not exist: {worktree_path}");
    }
    let worktree_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| worktree_path.to_string());

    let prompt = triage_prompt(worktree_path, &worktree_name);
    spin(
        daemon,
        SpinArgs {
            prompt,
            permission: Some("careful".to_string()),
            working_dir: Some(worktree_path.to_string()),
            tags: Some("triage".to_string()),
            skeinless: true,
            ..Default::default()
        },
    )
    .await
}

fn triage_prompt(worktree_path: &str, worktree_name: &str) -> String {
    format!(
        r#"## Worktree Triage

Assess the work in this worktree and create a tender.

**Worktree:** {worktree_path}
**Name:** {worktree_name}

### Steps:

1. Run `git log --oneline master..HEAD` to see commits
2. Run `git diff --stat master` to see scope of changes
3. Run `git status` to see uncommitted work
4. Read key files if needed to understand intent

### Then tender with your assessment:

```bash
skein shard tender {worktree_name} --status <status> --confidence <1-10> --summary "<summary>"
```

**Status options:**
- `complete` - Work is done, ready for merge consideration
- `incomplete` - Partial work, may be salvageable
- `abandoned` - Nothing useful, recommend discard

**Confidence scale (merge risk):**
- 10: Safe, additive, isolated (auto-merge candidate)
- 7-9: Small changes, low-risk, clear intent
- 4-6: Moderate changes, needs review
- 1-3: Big refactor, critical path, risky

If status is `incomplete` and work is worth continuing, create a brief for the remaining work.

Be honest about confidence - low confidence is fine, it just means human review needed."#
    )
}

/// Finalize a reserved-but-unstartable stub so its slot is released.
fn release_as_error(daemon: &Daemon, spool: &mut Spool, message: String) {
    spool.status = SpoolStatus::Error;
    spool.error = Some(message);
    spool.completed_at = Some(Utc::now());
    if let Err(e) = daemon.store.write(spool) {
        warn!(id = %spool.id, error = %e, "failed to release reserved slot");
    }
    daemon.store.delete_transients(&spool.id);
}

/// Timeout argument: integer seconds, or a duration string (`30s`, `5m`,
/// `2h`, `HH:MM`).
fn resolve_timeout(value: Option<&serde_json::Value>) -> Result<Option<u64>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => match n.as_u64() {
            Some(secs) if secs > 0 => Ok(Some(secs)),
            _ => Err(SpindleError::InvalidTimeout(n.to_string()).into()),
        },
        Some(serde_json::Value::String(s)) => match duration::parse_duration(s) {
            Some(secs) => Ok(Some(secs)),
            None => Err(SpindleError::InvalidTimeout(s.clone()).into()),
        },
        Some(other) => Err(SpindleError::InvalidTimeout(other.to_string()).into()),
    }
}

fn split_tags(tags: Option<&str>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
#[path = "spin_tests.rs"]
mod tests;
