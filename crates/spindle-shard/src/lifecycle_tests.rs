use super::*;
use spindle_core::ShardInfo;
use tempfile::tempdir;

fn store() -> (tempfile::TempDir, SpoolStore) {
    let dir = tempdir().unwrap();
    let store = SpoolStore::new(dir.path().join("spools"));
    (dir, store)
}

fn skein() -> SkeinClient {
    // Points at nothing; availability probe fails fast when consulted.
    SkeinClient::new("http://localhost:1", "test")
}

/// Spool with a shard whose worktree directory actually exists on disk.
fn sharded_spool(dir: &Path, store: &SpoolStore, id: &str, status: SpoolStatus) -> PathBuf {
    let worktree = dir.join("repo").join("worktrees").join(format!("{id}-wt"));
    std::fs::create_dir_all(&worktree).unwrap();

    let mut spool = Spool::new(id, "fix the bug", worktree.to_string_lossy());
    spool.status = status;
    spool.shard = Some(ShardInfo {
        worktree_path: worktree.to_string_lossy().into_owned(),
        branch_name: format!("shard-{id}-wt"),
        shard_id: format!("{id}-wt"),
        merged: None,
        merged_at: None,
        abandoned: None,
        abandoned_at: None,
    });
    store.write(&spool).unwrap();
    worktree
}

#[tokio::test]
async fn status_of_unknown_spool_errors() {
    let (_dir, store) = store();
    let err = shard_status(&store, "missing").await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown spool_id 'missing'");
}

#[tokio::test]
async fn status_without_shard_says_so() {
    let (_dir, store) = store();
    store.write(&Spool::new("plain123", "x", "/tmp")).unwrap();
    let reply = shard_status(&store, "plain123").await.unwrap();
    assert!(reply.contains("has no shard"));
}

#[tokio::test]
async fn status_of_vanished_worktree_reports_missing() {
    let (dir, store) = store();
    let worktree = sharded_spool(dir.path(), &store, "gone1234", SpoolStatus::Complete);
    std::fs::remove_dir_all(&worktree).unwrap();

    let reply = shard_status(&store, "gone1234").await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["exists"], false);
    assert_eq!(parsed["message"], "Worktree no longer exists");
}

#[tokio::test]
async fn merge_requires_caller_cwd() {
    let (_dir, store) = store();
    let err = shard_merge(&store, &skein(), "any", false, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("caller_cwd required"));
}

#[tokio::test]
async fn merge_refuses_running_spool() {
    let (dir, store) = store();
    sharded_spool(dir.path(), &store, "run12345", SpoolStatus::Running);
    let err = shard_merge(&store, &skein(), "run12345", false, Some("/elsewhere"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("still running"));
}

#[tokio::test]
async fn merge_refuses_caller_inside_worktree() {
    let (dir, store) = store();
    let worktree = sharded_spool(dir.path(), &store, "in123456", SpoolStatus::Complete);
    let inside = worktree.join("sub");
    std::fs::create_dir_all(&inside).unwrap();

    let err = shard_merge(
        &store,
        &skein(),
        "in123456",
        false,
        Some(&inside.to_string_lossy()),
    )
    .await
    .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("your working directory is inside it"), "{msg}");
    assert!(msg.contains("cd "), "{msg}");
    // Worktree untouched.
    assert!(worktree.exists());
}

#[tokio::test]
async fn merge_refuses_worktree_with_running_occupant() {
    let (dir, store) = store();
    let worktree = sharded_spool(dir.path(), &store, "tgt12345", SpoolStatus::Complete);

    let mut other = Spool::new("occ12345", "other task", worktree.to_string_lossy());
    other.status = SpoolStatus::Running;
    store.write(&other).unwrap();

    let err = shard_merge(&store, &skein(), "tgt12345", false, Some("/elsewhere"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("occ12345"));
}

#[tokio::test]
async fn abandon_requires_caller_cwd() {
    let (_dir, store) = store();
    let err = shard_abandon(&store, "any", false, None).await.unwrap_err();
    assert!(err.to_string().contains("caller_cwd required"));
}

#[tokio::test]
async fn abandon_without_shard_errors() {
    let (_dir, store) = store();
    store.write(&Spool::new("plain123", "x", "/tmp")).unwrap();
    let err = shard_abandon(&store, "plain123", false, Some("/elsewhere"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("has no shard"));
}

#[tokio::test]
async fn abandon_kills_running_spool_and_records_reason() {
    let (dir, store) = store();
    sharded_spool(dir.path(), &store, "run12345", SpoolStatus::Running);
    // Pid that does not exist: the kill is a no-op, the bookkeeping is not.
    let mut spool = store.read("run12345").unwrap();
    spool.pid = Some(999_999_999);
    store.write(&spool).unwrap();

    // Cleanup will fail (not a real git repo) but the record must already
    // carry the abandon reason.
    let reply = shard_abandon(&store, "run12345", false, Some("/elsewhere"))
        .await
        .unwrap();
    assert!(reply.contains("run12345"));

    let spool = store.read("run12345").unwrap();
    assert_eq!(spool.status, SpoolStatus::Error);
    assert_eq!(spool.error.as_deref(), Some("Shard abandoned"));
}

#[tokio::test]
async fn guard_tolerates_nonexistent_caller_path() {
    let (dir, store) = store();
    let worktree = sharded_spool(dir.path(), &store, "ok123456", SpoolStatus::Complete);
    // Uncanonicalizable caller path falls back to literal comparison and
    // passes the guard.
    let err = shard_merge(
        &store,
        &skein(),
        "ok123456",
        false,
        Some("/no/such/dir/anywhere"),
    )
    .await;
    // Fails later (not a git repo), never on the cwd guard.
    let msg = err.unwrap_err().to_string();
    assert!(!msg.contains("your working directory is inside it"), "{msg}");
    assert!(worktree.exists());
}
