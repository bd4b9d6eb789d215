//! Client for the peer workflow service ("SKEIN").
//!
//! SKEIN is optional. Availability is probed once per daemon lifetime via
//! `skein health --json`; when the probe fails, every SKEIN-aware path is
//! silently disabled. Tender-closing failures during a merge are swallowed
//! ; the merge already happened, bookkeeping must not undo it.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use spindle_core::ShardInfo;

const DEFAULT_URL: &str = "http://localhost:8001";
const DEFAULT_AGENT_ID: &str = "spindle";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const SPAWN_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct SkeinClient {
    base_url: String,
    agent_id: String,
    available: OnceCell<bool>,
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    #[serde(default)]
    healthy: bool,
}

#[derive(Debug, Deserialize)]
struct Folio {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: FolioMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct FolioMetadata {
    #[serde(default)]
    worktree_name: Option<String>,
}

impl SkeinClient {
    pub fn new(base_url: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            agent_id: agent_id.into(),
            available: OnceCell::new(),
        }
    }

    /// Resolve `SKEIN_URL` / `SKEIN_AGENT_ID` from the environment.
    pub fn from_env() -> Self {
        let base_url = std::env::var("SKEIN_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let agent_id =
            std::env::var("SKEIN_AGENT_ID").unwrap_or_else(|_| DEFAULT_AGENT_ID.to_string());
        Self::new(base_url, agent_id)
    }

    /// Whether SKEIN is usable. Probed once, cached for the daemon lifetime.
    pub async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async { probe_health().await })
            .await
    }

    /// Ask SKEIN to create a worktree for an agent.
    ///
    /// Returns `None` on any failure; the caller falls back to a plain git
    /// worktree.
    pub async fn spawn_shard(&self, agent_id: &str, cwd: &Path) -> Option<ShardInfo> {
        let output = tokio::time::timeout(
            SPAWN_TIMEOUT,
            tokio::process::Command::new("skein")
                .args([
                    "shard",
                    "spawn",
                    "--agent",
                    agent_id,
                    "--description",
                    &format!("Spindle spool for {agent_id}"),
                ])
                .current_dir(cwd)
                .output(),
        )
        .await
        .ok()?
        .ok()?;

        if !output.status.success() {
            debug!(agent_id, "skein shard spawn failed");
            return None;
        }

        parse_spawn_output(&String::from_utf8_lossy(&output.stdout), agent_id)
    }

    /// Close all open tender folios attached to a worktree. Best-effort.
    pub async fn close_tenders(&self, worktree_name: &str) {
        let client = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to build http client for tender close");
                return;
            }
        };

        let folios: Vec<Folio> = match client
            .get(format!("{}/folios", self.base_url))
            .query(&[("type", "tender")])
            .header("X-Agent-ID", &self.agent_id)
            .send()
            .await
        {
            Ok(resp) => match resp.json().await {
                Ok(folios) => folios,
                Err(e) => {
                    debug!(error = %e, "unparseable folios reply");
                    return;
                }
            },
            Err(e) => {
                debug!(error = %e, "folio listing failed");
                return;
            }
        };

        for folio in folios {
            if folio.metadata.worktree_name.as_deref() != Some(worktree_name) {
                continue;
            }
            if folio.status.as_deref() == Some("closed") {
                continue;
            }
            let body = serde_json::json!({
                "from_id": folio.id,
                "to_id": folio.id,
                "type": "status",
                "content": "closed",
            });
            match client
                .post(format!("{}/threads", self.base_url))
                .header("X-Agent-ID", &self.agent_id)
                .json(&body)
                .send()
                .await
            {
                Ok(_) => debug!(folio = %folio.id, worktree_name, "closed tender"),
                Err(e) => debug!(folio = %folio.id, error = %e, "tender close failed"),
            }
        }
    }
}

/// Probe `skein health --json` for `{"healthy": true}`.
async fn probe_health() -> bool {
    if which::which("skein").is_err() {
        return false;
    }
    let result = tokio::time::timeout(
        PROBE_TIMEOUT,
        tokio::process::Command::new("skein")
            .args(["health", "--json"])
            .output(),
    )
    .await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            serde_json::from_slice::<HealthReply>(&output.stdout)
                .map(|reply| reply.healthy)
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Parse the `Worktree:` / `Branch:` / `Spawned SHARD:` labels from the
/// spawn command's stdout.
pub fn parse_spawn_output(stdout: &str, agent_id: &str) -> Option<ShardInfo> {
    let mut worktree_path = None;
    let mut branch_name = None;
    let mut shard_id = None;

    for line in stdout.lines() {
        if let Some((_, value)) = line.split_once("Worktree:") {
            worktree_path = Some(value.trim().to_string());
        }
        if let Some((_, value)) = line.split_once("Branch:") {
            branch_name = Some(value.trim().to_string());
        }
        if let Some((_, value)) = line.split_once("Spawned SHARD:") {
            shard_id = Some(value.trim().to_string());
        }
    }

    Some(ShardInfo {
        worktree_path: worktree_path?,
        branch_name: branch_name.unwrap_or_else(|| format!("shard-{agent_id}")),
        shard_id: shard_id.unwrap_or_else(|| agent_id.to_string()),
        merged: None,
        merged_at: None,
        abandoned: None,
        abandoned_at: None,
    })
}
