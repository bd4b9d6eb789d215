//! Worktree creation, cleanup, and read-side git probes.

use anyhow::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use spindle_core::ShardInfo;
use spindle_skein::SkeinClient;

use crate::git::run_git;

/// Create an isolated worktree for an agent.
///
/// Prefers SKEIN when the peer service is up; falls back to a plain
/// `git worktree add` under `<base_dir>/worktrees/`. The worktree name
/// carries a microsecond suffix so rapid parallel creation never collides.
pub async fn spawn_shard(
    skein: &SkeinClient,
    agent_id: &str,
    base_dir: &Path,
) -> Option<ShardInfo> {
    if skein.is_available().await {
        if let Some(info) = skein.spawn_shard(agent_id, base_dir).await {
            return Some(info);
        }
        debug!(agent_id, "skein spawn failed, falling back to plain worktree");
    }

    let worktrees_dir = base_dir.join("worktrees");
    if let Err(e) = std::fs::create_dir_all(&worktrees_dir) {
        warn!(error = %e, "failed to create worktrees directory");
        return None;
    }

    let name = format!("{agent_id}-{}", Local::now().format("%Y%m%d-%H%M%S-%6f"));
    let worktree_path = worktrees_dir.join(&name);
    let branch_name = format!("shard-{name}");

    let result = run_git(
        base_dir,
        &[
            "worktree",
            "add",
            &worktree_path.to_string_lossy(),
            "-b",
            &branch_name,
        ],
        30,
    )
    .await;

    match result {
        Ok(out) if out.success() => Some(ShardInfo {
            worktree_path: worktree_path.to_string_lossy().into_owned(),
            branch_name,
            shard_id: name,
            merged: None,
            merged_at: None,
            abandoned: None,
            abandoned_at: None,
        }),
        Ok(out) => {
            warn!(agent_id, stderr = %out.stderr.trim(), "git worktree add failed");
            None
        }
        Err(e) => {
            warn!(agent_id, error = %e, "git worktree add errored");
            None
        }
    }
}

/// Remove a shard's worktree and optionally its branch.
///
/// A failed removal is a cleanup failure and is returned as an error; a
/// failed branch delete only warns; the worktree is already gone.
pub async fn cleanup_shard(info: &ShardInfo, base_dir: &Path, keep_branch: bool) -> Result<()> {
    let removal = run_git(
        base_dir,
        &["worktree", "remove", "--force", &info.worktree_path],
        30,
    )
    .await?;
    if !removal.success() {
        warn!(
            worktree = %info.worktree_path,
            stderr = %removal.stderr.trim(),
            "worktree removal failed"
        );
        anyhow::bail!(
            "worktree removal failed: {}",
            removal.stderr.trim()
        );
    }

    if !keep_branch {
        match run_git(base_dir, &["branch", "-D", &info.branch_name], 10).await {
            Ok(out) if !out.success() => {
                warn!(branch = %info.branch_name, stderr = %out.stderr.trim(), "branch delete failed");
            }
            Err(e) => warn!(branch = %info.branch_name, error = %e, "branch delete errored"),
            _ => {}
        }
    }

    if let Err(e) = run_git(base_dir, &["worktree", "prune"], 10).await {
        warn!(error = %e, "worktree prune errored");
    }

    Ok(())
}

/// The integration branch of a repository: `master` if it exists, else `main`.
pub async fn default_branch(repo: &Path) -> String {
    match run_git(repo, &["rev-parse", "--verify", "master"], 10).await {
        Ok(out) if out.success() => "master".to_string(),
        _ => "main".to_string(),
    }
}

/// Porcelain status lines of a worktree, or `None` when git fails.
pub async fn git_changes(worktree: &Path) -> Option<Vec<String>> {
    let out = run_git(worktree, &["status", "--porcelain"], 10).await.ok()?;
    if !out.success() {
        return None;
    }
    Some(
        out.stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Commits on the worktree's branch that are not on `base`.
pub async fn commits_ahead(worktree: &Path, base: &str) -> Option<u64> {
    let out = run_git(
        worktree,
        &["rev-list", "--count", &format!("{base}..HEAD")],
        10,
    )
    .await
    .ok()?;
    if !out.success() {
        return None;
    }
    out.stdout.trim().parse().ok()
}

/// Whether merging `branch` into `base` would conflict.
///
/// `git merge-tree --write-tree` exits non-zero on conflicts without
/// touching the index or the working tree.
pub async fn merge_would_conflict(main_repo: &Path, base: &str, branch: &str) -> bool {
    match run_git(
        main_repo,
        &["merge-tree", "--write-tree", base, branch],
        10,
    )
    .await
    {
        Ok(out) => !out.success(),
        Err(_) => false,
    }
}

/// `(files_changed, insertions + deletions)` of a worktree against `base`.
pub async fn changeset_size(worktree: &Path, base: &str) -> Option<(u64, u64)> {
    let out = run_git(worktree, &["diff", "--shortstat", base], 10).await.ok()?;
    if !out.success() {
        return None;
    }
    Some(parse_shortstat(&out.stdout))
}

/// Parse `N files changed, X insertions(+), Y deletions(-)`.
///
/// Any of the three clauses may be absent; an empty diff yields `(0, 0)`.
fn parse_shortstat(stdout: &str) -> (u64, u64) {
    let mut files = 0u64;
    let mut lines = 0u64;
    for part in stdout.trim().split(',') {
        let part = part.trim();
        let Some(count) = part
            .split_whitespace()
            .next()
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        if part.contains("file") {
            files = count;
        } else if part.contains("insertion") || part.contains("deletion") {
            lines += count;
        }
    }
    (files, lines)
}

/// The main repository of a worktree at `<repo>/worktrees/<name>`.
pub fn main_repo_of(worktree_path: &Path) -> PathBuf {
    worktree_path
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| worktree_path.to_path_buf())
}
