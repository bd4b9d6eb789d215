//! Shard status / merge / abandon.
//!
//! Merge and abandon are destructive to the worktree, so both refuse to run
//! when the caller's shell is inside it or when another running spool still
//! works there. The spool record itself is only ever touched through the
//! explicit `merged` / `abandoned` bookkeeping flags (plus the error state
//! a killed child gets on abandon).

use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use spindle_core::{SpindleError, Spool, SpoolStatus};
use spindle_harness::proc;
use spindle_skein::SkeinClient;
use spindle_store::SpoolStore;

use crate::git::run_git;
use crate::worktree::{
    cleanup_shard, commits_ahead, default_branch, git_changes, main_repo_of,
};

/// Inspect the shard bound to a spool.
pub async fn shard_status(store: &SpoolStore, id: &str) -> Result<String> {
    let Some(spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };
    let Some(shard) = &spool.shard else {
        return Ok(format!(
            "Spool {id} has no shard (was not run with shard=true)"
        ));
    };

    let worktree = Path::new(&shard.worktree_path);
    if !worktree.exists() {
        let reply = serde_json::json!({
            "spool_id": id,
            "shard": shard,
            "exists": false,
            "message": "Worktree no longer exists",
        });
        return Ok(serde_json::to_string_pretty(&reply)?);
    }

    let base = default_branch(worktree).await;
    let reply = serde_json::json!({
        "spool_id": id,
        "shard": shard,
        "exists": true,
        "spool_status": spool.status,
        "git_changes": git_changes(worktree).await,
        "commits_ahead": commits_ahead(worktree, &base).await,
    });
    Ok(serde_json::to_string_pretty(&reply)?)
}

/// Merge a shard's branch back into the main repository and clean up.
pub async fn shard_merge(
    store: &SpoolStore,
    skein: &SkeinClient,
    id: &str,
    keep_branch: bool,
    caller_cwd: Option<&str>,
) -> Result<String> {
    let Some(caller_cwd) = caller_cwd else {
        return Err(SpindleError::CallerCwdRequired.into());
    };

    let Some(mut spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };
    if spool.status == SpoolStatus::Running {
        return Err(SpindleError::StillRunning(id.to_string()).into());
    }
    let Some(shard) = spool.shard.clone() else {
        return Err(SpindleError::NoShard(id.to_string()).into());
    };

    let worktree = PathBuf::from(&shard.worktree_path);
    if !worktree.exists() {
        return Err(SpindleError::WorktreeGone(shard.worktree_path.clone()).into());
    }

    guard_caller_outside(&worktree, caller_cwd)?;
    guard_no_running_occupant(store, id, &worktree)?;

    let changes = run_git(&worktree, &["status", "--porcelain"], 10).await?;
    if !changes.stdout.trim().is_empty() {
        return Err(SpindleError::UncommittedChanges.into());
    }

    let main_repo = main_repo_of(&worktree);
    let target = default_branch(&main_repo).await;
    let summary: String = spool.prompt.chars().take(50).collect();
    let message = format!("Merge shard {id}: {summary}");
    let merge = run_git(
        &main_repo,
        &["merge", &shard.branch_name, "--no-ff", "-m", &message],
        30,
    )
    .await?;
    if !merge.success() {
        return Err(SpindleError::MergeFailed(merge.stderr.trim().to_string()).into());
    }

    if let Err(e) = cleanup_shard(&shard, &main_repo, keep_branch).await {
        warn!(id, error = %e, "post-merge cleanup incomplete");
    }

    if let Some(shard) = spool.shard.as_mut() {
        shard.merged = Some(true);
        shard.merged_at = Some(Utc::now());
    }
    store.write(&spool)?;

    // Close any tender folios tracking this worktree; bookkeeping only.
    if skein.is_available().await {
        if let Some(name) = worktree.file_name().and_then(|n| n.to_str()) {
            skein.close_tenders(name).await;
        }
    }

    info!(id, branch = %shard.branch_name, "merged shard");
    Ok(format!("Successfully merged shard {id} to {target}"))
}

/// Remove a shard's worktree without merging.
pub async fn shard_abandon(
    store: &SpoolStore,
    id: &str,
    keep_branch: bool,
    caller_cwd: Option<&str>,
) -> Result<String> {
    let Some(caller_cwd) = caller_cwd else {
        return Err(SpindleError::CallerCwdRequired.into());
    };

    let Some(mut spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };
    let Some(shard) = spool.shard.clone() else {
        return Err(SpindleError::NoShard(id.to_string()).into());
    };

    let worktree = PathBuf::from(&shard.worktree_path);
    if worktree.exists() {
        guard_caller_outside(&worktree, caller_cwd)?;
    }
    guard_no_running_occupant(store, id, &worktree)?;

    // A still-running child loses its workspace: kill it and record why.
    if spool.status == SpoolStatus::Running {
        if let Some(pid) = spool.pid {
            proc::terminate_group(pid);
        }
        spool.status = SpoolStatus::Error;
        spool.error = Some("Shard abandoned".to_string());
        spool.completed_at = Some(Utc::now());
        store.write(&spool)?;
        store.delete_transients(id);
    }

    let main_repo = main_repo_of(&worktree);
    match cleanup_shard(&shard, &main_repo, keep_branch).await {
        Ok(()) => {
            if let Some(shard) = spool.shard.as_mut() {
                shard.abandoned = Some(true);
                shard.abandoned_at = Some(Utc::now());
            }
            store.write(&spool)?;
            info!(id, "abandoned shard");
            let suffix = if keep_branch { " (branch kept)" } else { "" };
            Ok(format!("Abandoned shard {id}{suffix}"))
        }
        Err(e) => {
            warn!(id, error = %e, "shard cleanup incomplete");
            Ok(format!(
                "Warning: Shard cleanup may have been incomplete for {id}"
            ))
        }
    }
}

/// Refuse when the caller's cwd is the worktree or inside it.
fn guard_caller_outside(worktree: &Path, caller_cwd: &str) -> Result<()> {
    let caller = resolve(Path::new(caller_cwd));
    let wt = resolve(worktree);
    if caller == wt || caller.starts_with(&wt) {
        let main_repo = main_repo_of(&wt);
        return Err(SpindleError::CallerInsideWorktree {
            main_repo: main_repo.to_string_lossy().into_owned(),
        }
        .into());
    }
    Ok(())
}

/// Refuse when another running spool's working_dir resolves into the worktree.
fn guard_no_running_occupant(store: &SpoolStore, id: &str, worktree: &Path) -> Result<()> {
    let wt = resolve(worktree);
    let occupant = store.list().into_iter().find(|other: &Spool| {
        other.id != id
            && other.status == SpoolStatus::Running
            && resolve(Path::new(&other.working_dir)).starts_with(&wt)
    });
    match occupant {
        Some(other) => Err(SpindleError::WorktreeBusy { other: other.id }.into()),
        None => Ok(()),
    }
}

fn resolve(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
