//! Dashboard: one-call summary of daemon activity and shards needing a
//! human decision.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::path::Path;

use spindle_core::{Spool, SpoolStatus};
use spindle_shard::worktree::{
    changeset_size, commits_ahead, default_branch, git_changes, main_repo_of,
    merge_would_conflict,
};
use spindle_store::SpoolStore;

use crate::truncate_chars;

/// Changesets above either bound are flagged for review.
const LARGE_CHANGESET_LINES: u64 = 500;
const LARGE_CHANGESET_FILES: u64 = 10;

/// Build the dashboard projection.
pub async fn dashboard(store: &SpoolStore) -> String {
    let spools = store.list();
    let hour_ago = Utc::now() - Duration::hours(1);

    let running = spools
        .iter()
        .filter(|s| s.status == SpoolStatus::Running)
        .count();
    let complete_last_hour = spools
        .iter()
        .filter(|s| {
            s.status == SpoolStatus::Complete
                && s.completed_at.is_some_and(|t| t >= hour_ago)
        })
        .count();
    let errors_total = spools
        .iter()
        .filter(|s| s.status == SpoolStatus::Error)
        .count();

    let mut completions: Vec<&Spool> = spools
        .iter()
        .filter(|s| s.status == SpoolStatus::Complete && s.completed_at.is_some())
        .collect();
    completions.sort_by_key(|s| std::cmp::Reverse(s.completed_at));
    let recent_completions: Vec<_> = completions
        .iter()
        .take(10)
        .map(|s| {
            json!({
                "id": s.id,
                "prompt": truncate_chars(&s.prompt, 60),
                "completed_at": s.completed_at,
                "age": s.completed_at.map(age_string),
            })
        })
        .collect();

    let mut needing_attention = Vec::new();
    for spool in &spools {
        if let Some(reasons) = shard_attention_reasons(spool).await {
            needing_attention.push(json!({
                "type": "shard",
                "id": spool.id,
                "worktree": spool.shard.as_ref().map(|s| s.worktree_path.clone()),
                "reasons": reasons,
            }));
        }
    }
    for spool in &spools {
        if spool.status == SpoolStatus::Error
            && spool.completed_at.is_some_and(|t| t >= hour_ago)
        {
            needing_attention.push(json!({
                "type": "error",
                "id": spool.id,
                "error": spool.error,
                "age": spool.completed_at.map(age_string),
            }));
        }
    }

    let reply = json!({
        "running": running,
        "complete_last_hour": complete_last_hour,
        "errors_total": errors_total,
        "recent_completions": recent_completions,
        "needing_attention": needing_attention,
    });
    serde_json::to_string_pretty(&reply).unwrap_or_else(|_| "{}".to_string())
}

/// Why a live shard needs attention, or `None` when it doesn't.
async fn shard_attention_reasons(spool: &Spool) -> Option<Vec<String>> {
    let shard = spool.shard.as_ref()?;
    if shard.merged.unwrap_or(false) || shard.abandoned.unwrap_or(false) {
        return None;
    }
    let worktree = Path::new(&shard.worktree_path);
    if !worktree.exists() {
        return None;
    }

    let main_repo = main_repo_of(worktree);
    let base = default_branch(&main_repo).await;
    let mut reasons = Vec::new();

    if git_changes(worktree).await.is_some_and(|c| !c.is_empty()) {
        reasons.push("uncommitted changes".to_string());
    }

    let ahead = commits_ahead(worktree, &base).await.unwrap_or(0);
    if ahead > 0 && merge_would_conflict(&main_repo, &base, &shard.branch_name).await {
        reasons.push("merge conflict".to_string());
    }

    if let Some((files, lines)) = changeset_size(worktree, &base).await {
        if lines > LARGE_CHANGESET_LINES || files > LARGE_CHANGESET_FILES {
            reasons.push(format!("large changeset ({files} files, {lines} lines)"));
        }
    }

    if reasons.is_empty() { None } else { Some(reasons) }
}

fn age_string(completed_at: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(completed_at);
    if age.num_hours() > 0 {
        format!("{}h ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{}m ago", age.num_minutes())
    } else {
        format!("{}s ago", age.num_seconds().max(0))
    }
}
