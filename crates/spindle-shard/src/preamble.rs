//! Shard prompt preambles.
//!
//! The child of a sharded spool gets a short instruction block prepended to
//! its prompt: where it is, that it must commit before retiring, and (when
//! SKEIN is up) which SKEIN commands frame the work. The stored `prompt`
//! field keeps the original text.

/// Build the effective child prompt for a sharded spool.
pub fn effective_shard_prompt(prompt: &str, spool_id: &str, with_skein: bool) -> String {
    if with_skein {
        let task_summary: String = prompt.chars().take(100).collect();
        format!(
            r#"You are working in an isolated SHARD worktree.

Before starting work, orient yourself with SKEIN:
1. Run: skein ignite --message "{task_summary}..."
2. Then: skein ready --name "spool-{spool_id}"

After completing work:
1. Commit your changes: git add -A && git commit -m "Your commit message"
2. Run: skein torch
3. Then: skein complete

IMPORTANT: You MUST commit your changes before retiring. The shard cannot be merged without commits.

Your task:
{prompt}"#
        )
    } else {
        format!(
            r#"You are working in an isolated SHARD worktree.

After completing work, commit your changes:
  git add -A && git commit -m "Your commit message"

IMPORTANT: You MUST commit your changes. The shard cannot be merged without commits.

Your task:
{prompt}"#
        )
    }
}
