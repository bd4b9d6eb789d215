//! Shard management: isolated git worktrees bound to spools.
//!
//! A shard is a worktree under `<base>/worktrees/` on its own
//! `shard-*` branch. Creation goes through SKEIN when the peer service is
//! up, otherwise plain `git worktree add`. Every git invocation is bounded
//! by an explicit timeout.

pub mod git;
pub mod lifecycle;
pub mod preamble;
pub mod worktree;

pub use lifecycle::{shard_abandon, shard_merge, shard_status};
pub use preamble::effective_shard_prompt;
pub use worktree::{cleanup_shard, default_branch, spawn_shard};
