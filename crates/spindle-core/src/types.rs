//! Spool record types.
//!
//! A [`Spool`] is the persistent record of one delegated child task. The
//! record is the single source of truth: everything the daemon knows about a
//! task is serialized into `<id>.json` under the spool directory.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a spool.
///
/// Transitions are monotonic: `pending -> running -> {complete, error,
/// timeout}`. Terminal states are permanent; only shard bookkeeping flags
/// may change afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpoolStatus {
    Pending,
    Running,
    Complete,
    Error,
    Timeout,
}

impl SpoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Timeout)
    }

    /// Active spools occupy a concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for SpoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Child binary family a spool drives.
///
/// Same lifecycle either way; the harness only decides argv composition and
/// how terminal stdout is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Harness {
    #[default]
    Claude,
    Gemini,
}

impl Harness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Isolated git worktree bound to a spool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardInfo {
    pub worktree_path: String,
    pub branch_name: String,
    pub shard_id: String,

    /// Set once the shard's branch has been merged back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,

    /// Set once the worktree has been removed without merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_at: Option<DateTime<Utc>>,
}

/// Persistent record of one delegated task.
///
/// Serialized to `<id>.json`; record writes are atomic (write to `<id>.tmp`,
/// rename into place). Readers tolerate missing or unparseable records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spool {
    /// 8-character opaque identifier, unique per host.
    pub id: String,

    pub status: SpoolStatus,

    #[serde(default)]
    pub harness: Harness,

    /// Original task text, unmodified. The child may have received a
    /// shard preamble prepended; that never leaks into the record.
    pub prompt: String,

    /// Child's final response text, once complete.
    pub result: Option<String>,

    /// Opaque session handle the child emits, used for continuation.
    pub session_id: Option<String>,

    /// Effective cwd of the child (the worktree path if sharded).
    pub working_dir: String,

    pub allowed_tools: Option<String>,
    pub permission: String,
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub shard: Option<ShardInfo>,
    pub model: Option<String>,

    /// Wall-clock deadline in seconds from `created_at`.
    pub timeout: Option<u64>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Process-group leader pid while the child runs.
    pub pid: Option<u32>,

    /// Child's reported token/usage info, passed through opaquely.
    pub cost: Option<serde_json::Value>,

    /// Present iff the terminal state is `error` or `timeout`.
    pub error: Option<String>,

    /// True iff a respin was rewritten with a preserved transcript.
    #[serde(default)]
    pub used_transcript_fallback: bool,

    /// True iff a transcript exists for the originating spool, so a respin
    /// can recover from upstream session expiry.
    #[serde(default)]
    pub transcript_fallback_available: bool,
}

impl Spool {
    /// Fresh record in `pending` with the required fields filled in.
    pub fn new(id: impl Into<String>, prompt: impl Into<String>, working_dir: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: SpoolStatus::Pending,
            harness: Harness::Claude,
            prompt: prompt.into(),
            result: None,
            session_id: None,
            working_dir: working_dir.into(),
            allowed_tools: None,
            permission: crate::permission::DEFAULT_PROFILE.to_string(),
            system_prompt: None,
            tags: Vec::new(),
            shard: None,
            model: None,
            timeout: None,
            created_at: Utc::now(),
            completed_at: None,
            pid: None,
            cost: None,
            error: None,
            used_transcript_fallback: false,
            transcript_fallback_available: false,
        }
    }

    /// Seconds elapsed since the record was created.
    pub fn age_seconds(&self) -> i64 {
        Utc::now().signed_duration_since(self.created_at).num_seconds()
    }

    /// Whether the wall-clock deadline has passed.
    pub fn deadline_exceeded(&self) -> bool {
        match self.timeout {
            Some(limit) => self.age_seconds() > limit as i64,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_terminality() {
        assert!(!SpoolStatus::Pending.is_terminal());
        assert!(!SpoolStatus::Running.is_terminal());
        assert!(SpoolStatus::Complete.is_terminal());
        assert!(SpoolStatus::Error.is_terminal());
        assert!(SpoolStatus::Timeout.is_terminal());
    }

    #[test]
    fn status_activity_mirrors_slot_accounting() {
        assert!(SpoolStatus::Pending.is_active());
        assert!(SpoolStatus::Running.is_active());
        assert!(!SpoolStatus::Complete.is_active());
        assert!(!SpoolStatus::Error.is_active());
        assert!(!SpoolStatus::Timeout.is_active());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&SpoolStatus::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        let back: SpoolStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(back, SpoolStatus::Running);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut spool = Spool::new("abc12345", "Test the code", "/tmp/test");
        spool.status = SpoolStatus::Running;
        spool.tags = vec!["test".into(), "unit".into()];
        spool.model = Some("sonnet".into());
        spool.timeout = Some(300);
        spool.pid = Some(12345);

        let json = serde_json::to_string_pretty(&spool).unwrap();
        let back: Spool = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, "abc12345");
        assert_eq!(back.status, SpoolStatus::Running);
        assert_eq!(back.tags, vec!["test", "unit"]);
        assert_eq!(back.model.as_deref(), Some("sonnet"));
        assert_eq!(back.timeout, Some(300));
        assert_eq!(back.harness, Harness::Claude);
    }

    #[test]
    fn legacy_records_without_new_fields_parse() {
        // Records written before the gemini harness and fallback flags
        // existed must still load.
        let json = r#"{
            "id": "old00001",
            "status": "complete",
            "prompt": "old task",
            "result": "done",
            "session_id": null,
            "working_dir": "/tmp/p",
            "allowed_tools": null,
            "permission": "careful",
            "system_prompt": null,
            "shard": null,
            "model": null,
            "timeout": null,
            "created_at": "2025-11-02T10:00:00Z",
            "completed_at": null,
            "pid": null,
            "cost": null,
            "error": null
        }"#;
        let spool: Spool = serde_json::from_str(json).unwrap();
        assert_eq!(spool.harness, Harness::Claude);
        assert!(!spool.used_transcript_fallback);
        assert!(spool.tags.is_empty());
    }

    #[test]
    fn deadline_respects_timeout_field() {
        let mut spool = Spool::new("t1", "x", "/tmp");
        assert!(!spool.deadline_exceeded());
        spool.timeout = Some(3600);
        assert!(!spool.deadline_exceeded());
        spool.created_at = Utc::now() - chrono::Duration::seconds(7200);
        assert!(spool.deadline_exceeded());
    }
}
