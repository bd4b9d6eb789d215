//! Caller-visible error taxonomy.
//!
//! The tool facade renders every variant as `"Error: <Display>"`. Nothing
//! raises across the tool boundary, so these strings are the contract.

#[derive(thiserror::Error, Debug)]
pub enum SpindleError {
    #[error("Max {max} concurrent spools. Wait for some to complete.")]
    SlotLimit { max: usize },

    #[error("working_dir required. Pass the project directory.")]
    WorkingDirRequired,

    #[error("Unknown spool_id '{0}'")]
    UnknownSpool(String),

    #[error("Spool {id} is not running (status: {status})")]
    NotRunning { id: String, status: String },

    #[error("Spool {0} has no PID recorded yet")]
    NoPid(String),

    #[error("GOOGLE_API_KEY or GEMINI_API_KEY required for the gemini harness")]
    MissingGeminiKey,

    #[error("Failed to create SHARD worktree. Check git repo status.")]
    ShardSpawnFailed,

    #[error("Spool {0} has no shard")]
    NoShard(String),

    #[error("Worktree no longer exists: {0}")]
    WorktreeGone(String),

    #[error("Spool {0} is still running. Wait for completion.")]
    StillRunning(String),

    #[error(
        "Cannot delete worktree - your working directory is inside it. Run `cd {main_repo}` first."
    )]
    CallerInsideWorktree { main_repo: String },

    #[error(
        "Spool {other} is still running in this worktree. Wait for it to complete or use spin_drop() first."
    )]
    WorktreeBusy { other: String },

    #[error("Shard has uncommitted changes. Commit or discard them first.")]
    UncommittedChanges,

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("caller_cwd required. Pass your current working directory to prevent deleting a worktree you're inside of.")]
    CallerCwdRequired,

    #[error("Invalid since value '{0}'. Use: 1h, 6h, 12h, 1d, 7d")]
    InvalidSince(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Invalid timeout '{0}'. Use integer seconds, Ns/Nm/Nh, or HH:MM")]
    InvalidTimeout(String),

    #[error("Git operation timed out")]
    GitTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_limit_message_names_the_cap() {
        let err = SpindleError::SlotLimit { max: 15 };
        assert_eq!(
            err.to_string(),
            "Max 15 concurrent spools. Wait for some to complete."
        );
    }

    #[test]
    fn unknown_spool_quotes_the_id() {
        let err = SpindleError::UnknownSpool("abc123".into());
        assert_eq!(err.to_string(), "Unknown spool_id 'abc123'");
    }

    #[test]
    fn not_running_includes_status() {
        let err = SpindleError::NotRunning {
            id: "abc123".into(),
            status: "complete".into(),
        };
        assert_eq!(
            err.to_string(),
            "Spool abc123 is not running (status: complete)"
        );
    }

    #[test]
    fn caller_inside_worktree_names_escape_path() {
        let err = SpindleError::CallerInsideWorktree {
            main_repo: "/repo".into(),
        };
        assert!(err.to_string().contains("cd /repo"));
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpindleError>();
    }
}
