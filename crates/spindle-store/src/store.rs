//! On-disk spool store.
//!
//! Record writes are atomic: serialize to `<id>.tmp` in the same directory,
//! rename over `<id>.json`. Readers never crash on a missing or unparseable
//! record; they treat it as absent and let callers recover.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use spindle_core::{Spool, SpoolStatus};

/// Handle on the spool directory.
#[derive(Debug, Clone)]
pub struct SpoolStore {
    root: PathBuf,
}

impl SpoolStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.spindle/spools`, the production location.
    pub fn default_root() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".spindle").join("spools"))
            .unwrap_or_else(|| PathBuf::from(".spindle/spools"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    pub fn stdout_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.stdout"))
    }

    pub fn stderr_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.stderr"))
    }

    pub fn lock_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.lock"))
    }

    /// Generated launcher script for the gemini harness.
    pub fn launcher_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.py"))
    }

    /// Sole admission lock bounding concurrency.
    pub fn concurrency_lock_path(&self) -> PathBuf {
        self.root.join(".concurrency.lock")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.root.join("transcripts")
    }

    pub fn transcript_path(&self, id: &str) -> PathBuf {
        self.transcripts_dir().join(format!("{id}.txt"))
    }

    /// Atomically persist a record. Creates the spool directory if absent.
    pub fn write(&self, spool: &Spool) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create spool dir: {}", self.root.display()))?;

        let tmp = self.root.join(format!("{}.tmp", spool.id));
        let json = serde_json::to_string_pretty(spool).context("Failed to serialize spool")?;
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write staging file: {}", tmp.display()))?;
        fs::rename(&tmp, self.record_path(&spool.id))
            .with_context(|| format!("Failed to rename record for spool {}", spool.id))?;
        Ok(())
    }

    /// Read a record. Missing or unparseable records are absent.
    pub fn read(&self, id: &str) -> Option<Spool> {
        let content = fs::read_to_string(self.record_path(id)).ok()?;
        match serde_json::from_str(&content) {
            Ok(spool) => Some(spool),
            Err(e) => {
                warn!(id, error = %e, "skipping unparseable spool record");
                None
            }
        }
    }

    /// Enumerate all records, skipping anything unparseable.
    pub fn list(&self) -> Vec<Spool> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut spools = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<Spool>(&content) {
                Ok(spool) => spools.push(spool),
                Err(_) => continue,
            }
        }
        spools
    }

    /// Linear scan for the spool that produced a session.
    pub fn find_by_session(&self, session_id: &str) -> Option<Spool> {
        self.list()
            .into_iter()
            .find(|s| s.session_id.as_deref() == Some(session_id))
    }

    /// Spools occupying a concurrency slot (`pending` + `running`).
    pub fn count_active(&self) -> usize {
        self.list().iter().filter(|s| s.status.is_active()).count()
    }

    pub fn count_with_status(&self, status: SpoolStatus) -> usize {
        self.list().iter().filter(|s| s.status == status).count()
    }

    /// Remove the transient stdout/stderr/launcher siblings of a spool.
    pub fn delete_transients(&self, id: &str) {
        for path in [
            self.stdout_path(id),
            self.stderr_path(id),
            self.launcher_path(id),
        ] {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(id, path = %path.display(), error = %e, "failed to remove transient file");
                }
            }
        }
    }

    /// Remove a record along with all of its siblings (transients, lock).
    pub fn delete_record(&self, id: &str) {
        self.delete_transients(id);
        for path in [self.record_path(id), self.lock_path(id)] {
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
        }
    }

    /// Durable copy of child stdout, kept past finalization.
    pub fn save_transcript(&self, id: &str, content: &str) -> Result<PathBuf> {
        let dir = self.transcripts_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create transcripts dir: {}", dir.display()))?;
        let path = self.transcript_path(id);
        fs::write(&path, content)
            .with_context(|| format!("Failed to write transcript: {}", path.display()))?;
        Ok(path)
    }

    pub fn read_transcript(&self, id: &str) -> Option<String> {
        fs::read_to_string(self.transcript_path(id)).ok()
    }

    /// Size in bytes of the transcript, if one exists.
    pub fn transcript_size(&self, id: &str) -> Option<u64> {
        fs::metadata(self.transcript_path(id)).ok().map(|m| m.len())
    }
}
