use super::*;
use crate::settings::Settings;
use spindle_core::{Spool, SpoolStatus};
use spindle_store::SpoolStore;
use tempfile::tempdir;

fn daemon(dir: &std::path::Path) -> Daemon {
    let settings = Settings {
        max_concurrent: 5,
        spindle_home: dir.to_path_buf(),
    };
    Daemon {
        store: SpoolStore::new(settings.spool_dir()),
        skein: spindle_skein::SkeinClient::new("http://localhost:1", "test"),
        settings,
        started_at: std::time::Instant::now(),
    }
}

#[tokio::test]
async fn unknown_tool_is_an_error_string() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let reply = dispatch_tool(&daemon, "no_such_tool", Value::Null).await;
    assert_eq!(reply, "Error: Unknown tool 'no_such_tool'");
}

#[tokio::test]
async fn spin_without_prompt_is_an_error_string() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let reply = dispatch_tool(&daemon, "spin", json!({})).await;
    assert_eq!(reply, "Error: prompt required");
}

#[tokio::test]
async fn spin_without_working_dir_reports_the_admission_error() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let reply = dispatch_tool(&daemon, "spin", json!({ "prompt": "task" })).await;
    assert_eq!(
        reply,
        "Error: working_dir required. Pass the project directory."
    );
}

#[tokio::test]
async fn spools_projection_through_the_facade() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let mut spool = Spool::new("abc12345", "listed task", "/tmp/p");
    spool.status = SpoolStatus::Complete;
    daemon.store.write(&spool).unwrap();

    let reply = dispatch_tool(&daemon, "spools", Value::Null).await;
    let parsed: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["abc12345"]["status"], "complete");
}

#[tokio::test]
async fn spools_finalizes_finished_children_before_listing() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let mut spool = Spool::new("run11111", "task", "/tmp/p");
    spool.status = SpoolStatus::Running;
    spool.pid = Some(999_999_999);
    daemon.store.write(&spool).unwrap();
    std::fs::write(
        daemon.store.stdout_path("run11111"),
        r#"{"result": "done offline"}"#,
    )
    .unwrap();

    let reply = dispatch_tool(&daemon, "spools", Value::Null).await;
    let parsed: Value = serde_json::from_str(&reply).unwrap();
    assert_eq!(parsed["run11111"]["status"], "complete");
}

#[tokio::test]
async fn grep_error_propagates_as_string() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let reply = dispatch_tool(&daemon, "spool_grep", json!({ "pattern": "[bad" })).await;
    assert!(reply.starts_with("Error: Invalid regex pattern:"));
}

#[tokio::test]
async fn reload_drops_the_touchfile() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let reply = dispatch_tool(&daemon, "spindle_reload", Value::Null).await;
    assert!(reply.starts_with("Reload signal dropped"));
    assert!(daemon.settings.reload_signal_path().exists());
}

#[tokio::test]
async fn tools_list_covers_the_whole_surface() {
    let defs = tool_definitions();
    let names: Vec<&str> = defs
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    for expected in [
        "spin",
        "respin",
        "unspool",
        "spin_wait",
        "spin_drop",
        "spools",
        "spool_search",
        "spool_results",
        "spool_grep",
        "spool_peek",
        "spool_retry",
        "spool_stats",
        "spool_export",
        "spool_info",
        "spool_dashboard",
        "shard_status",
        "shard_merge",
        "shard_abandon",
        "triage",
        "spindle_reload",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    assert_eq!(names.len(), 20);
}

#[tokio::test]
async fn initialize_and_unknown_method() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());

    let request: JsonRpcRequest = serde_json::from_str(
        r#"{"jsonrpc": "2.0", "method": "initialize", "id": 1}"#,
    )
    .unwrap();
    let response = handle_request(&daemon, request).await;
    assert!(response.error.is_none());
    let result = response.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "spindle");

    let request: JsonRpcRequest = serde_json::from_str(
        r#"{"jsonrpc": "2.0", "method": "bogus/method", "id": 2}"#,
    )
    .unwrap();
    let response = handle_request(&daemon, request).await;
    assert_eq!(response.error.unwrap().code, -32601);
}

#[tokio::test]
async fn tool_call_reports_result_content() {
    let dir = tempdir().unwrap();
    let daemon = daemon(dir.path());
    let request: JsonRpcRequest = serde_json::from_str(
        r#"{"jsonrpc": "2.0", "method": "tools/call",
            "params": {"name": "spool_stats", "arguments": {}}, "id": 3}"#,
    )
    .unwrap();
    let response = handle_request(&daemon, request).await;
    let result = response.result.unwrap();
    let text = result["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["total"], 0);
}
