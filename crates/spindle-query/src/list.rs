//! Compact listing, filtered results, and summary statistics.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::json;

use spindle_core::SpindleError;
use spindle_store::SpoolStore;

use crate::truncate_chars;

/// Compact `{id: {status, prompt, created_at, session_id}}` projection.
pub fn spools_projection(store: &SpoolStore) -> String {
    let mut map = serde_json::Map::new();
    for spool in store.list() {
        map.insert(
            spool.id.clone(),
            json!({
                "status": spool.status,
                "prompt": truncate_chars(&spool.prompt, 100),
                "created_at": spool.created_at,
                "session_id": spool.session_id,
            }),
        );
    }
    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
}

/// The closed `since` vocabulary for result filtering.
fn since_window(since: &str) -> Option<Duration> {
    match since {
        "1h" => Some(Duration::hours(1)),
        "6h" => Some(Duration::hours(6)),
        "12h" => Some(Duration::hours(12)),
        "1d" => Some(Duration::days(1)),
        "7d" => Some(Duration::days(7)),
        _ => None,
    }
}

/// Filtered, newest-first result listing.
pub fn results(
    store: &SpoolStore,
    status: &str,
    since: Option<&str>,
    limit: usize,
) -> Result<String> {
    let cutoff = match since {
        Some(value) => match since_window(value) {
            Some(window) => Some(Utc::now() - window),
            None => return Err(SpindleError::InvalidSince(value.to_string()).into()),
        },
        None => None,
    };

    let mut filtered: Vec<_> = store
        .list()
        .into_iter()
        .filter(|s| status == "all" || s.status.as_str() == status)
        .filter(|s| cutoff.is_none_or(|c| s.created_at >= c))
        .collect();
    filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    filtered.truncate(limit);

    if filtered.is_empty() {
        let mut message = format!("No spools found with status='{status}'");
        if let Some(value) = since {
            message.push_str(&format!(" since {value}"));
        }
        return Ok(message);
    }

    let rows: Vec<_> = filtered
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "status": s.status,
                "prompt": truncate_chars(&s.prompt, 100),
                "result": s.result.as_deref().map(|r| truncate_chars(r, 500)),
                "created_at": s.created_at,
                "session_id": s.session_id,
            })
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Totals by status plus the creation-time range.
pub fn stats(store: &SpoolStore) -> String {
    let spools = store.list();

    let mut by_status = serde_json::Map::new();
    let mut oldest = None;
    let mut newest = None;

    for spool in &spools {
        let key = spool.status.as_str();
        let count = by_status.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
        by_status.insert(key.to_string(), json!(count + 1));

        if oldest.is_none_or(|o| spool.created_at < o) {
            oldest = Some(spool.created_at);
        }
        if newest.is_none_or(|n| spool.created_at > n) {
            newest = Some(spool.created_at);
        }
    }

    let reply = json!({
        "total": spools.len(),
        "by_status": by_status,
        "oldest": oldest,
        "newest": newest,
    });
    serde_json::to_string_pretty(&reply).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Spool, SpoolStatus};
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, SpoolStore) {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        (dir, store)
    }

    fn seed(store: &SpoolStore, id: &str, status: SpoolStatus, age_hours: i64) -> Spool {
        let mut spool = Spool::new(id, format!("prompt for {id}"), "/tmp/p");
        spool.status = status;
        spool.created_at = Utc::now() - Duration::hours(age_hours);
        if status == SpoolStatus::Complete {
            spool.result = Some(format!("result of {id}"));
        }
        store.write(&spool).unwrap();
        spool
    }

    #[test]
    fn projection_truncates_prompt_to_100_chars() {
        let (_dir, store) = store();
        let mut spool = Spool::new("long1234", "p".repeat(300), "/tmp");
        spool.status = SpoolStatus::Running;
        store.write(&spool).unwrap();

        let reply = spools_projection(&store);
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(
            parsed["long1234"]["prompt"].as_str().unwrap().len(),
            100
        );
        assert_eq!(parsed["long1234"]["status"], "running");
    }

    #[test]
    fn results_filters_by_status() {
        let (_dir, store) = store();
        seed(&store, "ok111111", SpoolStatus::Complete, 0);
        seed(&store, "err11111", SpoolStatus::Error, 0);

        let reply = results(&store, "complete", None, 10).unwrap();
        assert!(reply.contains("ok111111"));
        assert!(!reply.contains("err11111"));

        let reply = results(&store, "all", None, 10).unwrap();
        assert!(reply.contains("ok111111"));
        assert!(reply.contains("err11111"));
    }

    #[test]
    fn results_since_window_excludes_older() {
        let (_dir, store) = store();
        seed(&store, "fresh111", SpoolStatus::Complete, 0);
        seed(&store, "stale111", SpoolStatus::Complete, 10);

        let reply = results(&store, "complete", Some("6h"), 10).unwrap();
        assert!(reply.contains("fresh111"));
        assert!(!reply.contains("stale111"));
    }

    #[test]
    fn results_invalid_since_is_an_error() {
        let (_dir, store) = store();
        let err = results(&store, "complete", Some("3w"), 10).unwrap_err();
        assert!(err.to_string().contains("Invalid since value '3w'"));
    }

    #[test]
    fn results_sorted_newest_first_with_limit() {
        let (_dir, store) = store();
        seed(&store, "old11111", SpoolStatus::Complete, 3);
        seed(&store, "mid11111", SpoolStatus::Complete, 2);
        seed(&store, "new11111", SpoolStatus::Complete, 1);

        let reply = results(&store, "complete", None, 2).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&reply).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], "new11111");
        assert_eq!(rows[1]["id"], "mid11111");
    }

    #[test]
    fn results_empty_message_names_the_filter() {
        let (_dir, store) = store();
        let reply = results(&store, "error", Some("1h"), 10).unwrap();
        assert_eq!(reply, "No spools found with status='error' since 1h");
    }

    #[test]
    fn stats_counts_by_status_and_tracks_range() {
        let (_dir, store) = store();
        seed(&store, "a1111111", SpoolStatus::Complete, 5);
        seed(&store, "b1111111", SpoolStatus::Complete, 1);
        seed(&store, "c1111111", SpoolStatus::Error, 3);

        let reply = stats(&store);
        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["total"], 3);
        assert_eq!(parsed["by_status"]["complete"], 2);
        assert_eq!(parsed["by_status"]["error"], 1);
        assert!(parsed["oldest"].is_string());
        assert!(parsed["newest"].is_string());
    }

    #[test]
    fn stats_on_empty_store() {
        let (_dir, store) = store();
        let parsed: serde_json::Value = serde_json::from_str(&stats(&store)).unwrap();
        assert_eq!(parsed["total"], 0);
        assert!(parsed["oldest"].is_null());
    }
}
