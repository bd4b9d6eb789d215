//! Sandbox wrapping for sharded spools.
//!
//! When `bwrap` is installed and the spool runs in a shard, the child argv
//! is wrapped so the root filesystem is read-only and only the worktree,
//! its git metadata, and a short allow-list of paths are writable. If the
//! binary is absent the child runs unwrapped; the worktree still gives it a
//! distinct filesystem view.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::argv::SpawnSpec;

/// Home config directories bound through when present.
const HOME_BIND_DIRS: &[&str] = &[".claude", ".anthropic", ".spindle", ".config"];

pub fn bwrap_available() -> bool {
    which::which("bwrap").is_ok()
}

/// Wrap a spawn spec in a bwrap invocation scoped to `worktree`.
///
/// Returns the spec unchanged when bwrap is not installed.
pub fn wrap(spec: SpawnSpec, worktree: &Path) -> SpawnSpec {
    if !bwrap_available() {
        debug!("bwrap not found; running sharded child unwrapped");
        return spec;
    }
    wrap_unchecked(spec, worktree, home_dir())
}

/// Build the bwrap argv without probing for the binary (testable core).
fn wrap_unchecked(spec: SpawnSpec, worktree: &Path, home: Option<PathBuf>) -> SpawnSpec {
    let wt = worktree.to_string_lossy().into_owned();

    let mut args: Vec<String> = vec![
        "--ro-bind".into(),
        "/".into(),
        "/".into(),
        "--bind".into(),
        wt.clone(),
        wt.clone(),
        "--bind".into(),
        "/tmp".into(),
        "/tmp".into(),
        "--dev".into(),
        "/dev".into(),
        "--proc".into(),
        "/proc".into(),
        "--chdir".into(),
        wt,
    ];

    // Worktrees keep their index/HEAD under the main repo's
    // .git/worktrees/<name>/; commits also need the shared object store
    // and the branch refs. Everything else of the repo stays read-only.
    if let Some(git_dir) = worktree_git_dir(worktree) {
        bind_if_exists(&mut args, &git_dir);
        if let Some(main_git) = main_git_dir(&git_dir) {
            bind_if_exists(&mut args, &main_git.join("objects"));
            bind_if_exists(&mut args, &main_git.join("refs").join("heads"));
            bind_if_exists(&mut args, &main_git.join("logs").join("refs").join("heads"));
        }
    }

    if let Some(home) = home {
        for dir in HOME_BIND_DIRS {
            bind_if_exists(&mut args, &home.join(dir));
        }
    }

    args.extend(spec.argv());

    SpawnSpec {
        program: "bwrap".to_string(),
        args,
        cwd: spec.cwd,
    }
}

fn bind_if_exists(args: &mut Vec<String>, path: &Path) {
    if path.exists() {
        let p = path.to_string_lossy().into_owned();
        args.push("--bind".into());
        args.push(p.clone());
        args.push(p);
    }
}

/// Resolve the real git directory behind a worktree's `.git` pointer file.
fn worktree_git_dir(worktree: &Path) -> Option<PathBuf> {
    let pointer = worktree.join(".git");
    if !pointer.is_file() {
        return None;
    }
    let content = fs::read_to_string(&pointer).ok()?;
    let git_dir = content.trim().strip_prefix("gitdir:")?.trim();
    let path = PathBuf::from(git_dir);
    path.exists().then_some(path)
}

/// `<main>/.git` given `<main>/.git/worktrees/<name>`.
fn main_git_dir(worktree_git_dir: &Path) -> Option<PathBuf> {
    worktree_git_dir.parent()?.parent().map(Path::to_path_buf)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
