//! Tool facade: JSON-RPC 2.0 over stdio.
//!
//! Each named operation is an MCP tool returning text content. Every
//! handler returns either a success payload or a human-readable string
//! starting with `"Error:"`; nothing raises across this boundary. Requests
//! are handled concurrently so a blocking `spin_wait` never stalls other
//! tool calls.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

use spindle_core::SpoolStatus;

use crate::daemon::Daemon;
use crate::spin::{self, SpinArgs};

/// JSON-RPC 2.0 Request
#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    id: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Serve the tool facade until stdin closes.
pub async fn run_stdio_facade(daemon: Arc<Daemon>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Responses funnel through one writer task; handlers may finish out of
    // order and JSON-RPC ids keep them matched up.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.write_all(b"\n").await;
            let _ = stdout.flush().await;
        }
    });

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let trimmed = line.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&trimmed) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "unparseable JSON-RPC request");
                let reply =
                    JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"));
                let _ = tx.send(serde_json::to_string(&reply)?);
                continue;
            }
        };

        // Notifications get no response.
        if request.id.is_none() && request.method.starts_with("notifications/") {
            continue;
        }

        let daemon = Arc::clone(&daemon);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_request(&daemon, request).await;
            if let Ok(line) = serde_json::to_string(&response) {
                let _ = tx.send(line);
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

async fn handle_request(daemon: &Daemon, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    debug!(method = %request.method, "handling request");

    match request.method.as_str() {
        "initialize" => JsonRpcResponse::result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "spindle",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "tools/list" => JsonRpcResponse::result(id, json!({ "tools": tool_definitions() })),
        "tools/call" => match tool_call(daemon, request.params).await {
            Ok(text) => JsonRpcResponse::result(
                id,
                json!({ "content": [ { "type": "text", "text": text } ] }),
            ),
            Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
        },
        "shutdown" => JsonRpcResponse::result(id, json!({})),
        other => JsonRpcResponse::error(id, -32601, format!("Method not found: {other}")),
    }
}

async fn tool_call(daemon: &Daemon, params: Option<Value>) -> Result<String> {
    let params = params.context("Missing params for tools/call")?;
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .context("Missing tool name")?
        .to_string();
    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
    Ok(dispatch_tool(daemon, &name, args).await)
}

/// Run one named operation; every outcome is a string.
async fn dispatch_tool(daemon: &Daemon, name: &str, args: Value) -> String {
    match name {
        "spin" => {
            let Some(prompt) = arg_str(&args, "prompt") else {
                return "Error: prompt required".to_string();
            };
            let spin_args = SpinArgs {
                prompt,
                permission: arg_str(&args, "permission"),
                shard: arg_bool(&args, "shard"),
                system_prompt: arg_str(&args, "system_prompt"),
                working_dir: arg_str(&args, "working_dir"),
                allowed_tools: arg_str(&args, "allowed_tools"),
                tags: arg_str(&args, "tags"),
                model: arg_str(&args, "model"),
                timeout: args.get("timeout").cloned(),
                skeinless: arg_bool(&args, "skeinless"),
                harness: parse_harness(&args),
            };
            stringify(spin::spin(daemon, spin_args).await)
        }
        "respin" => {
            let (Some(session_id), Some(prompt)) =
                (arg_str(&args, "session_id"), arg_str(&args, "prompt"))
            else {
                return "Error: session_id and prompt required".to_string();
            };
            stringify(spin::respin(daemon, &session_id, &prompt).await)
        }
        "unspool" => match arg_str(&args, "spool_id") {
            Some(id) => spin::unspool(daemon, &id),
            None => "Error: spool_id required".to_string(),
        },
        "spin_wait" => {
            let Some(ids) = arg_str(&args, "spool_ids") else {
                return "Error: spool_ids required".to_string();
            };
            let mode = arg_str(&args, "mode").unwrap_or_else(|| "gather".to_string());
            stringify(spin::spin_wait(daemon, &ids, &mode, args.get("timeout").cloned()).await)
        }
        "spin_drop" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(spindle_harness::monitor::cancel(&daemon.store, &id)),
            None => "Error: spool_id required".to_string(),
        },
        "spools" => {
            // Recovery finalize before listing so the projection is honest
            // about children that finished while nobody was looking.
            for spool in daemon.store.list() {
                if spool.status == SpoolStatus::Running {
                    spindle_harness::check_and_finalize(&daemon.store, &spool.id);
                }
            }
            spindle_query::spools_projection(&daemon.store)
        }
        "spool_search" => {
            let Some(query) = arg_str(&args, "query") else {
                return "Error: query required".to_string();
            };
            let field = arg_str(&args, "field").unwrap_or_else(|| "both".to_string());
            spindle_query::search(&daemon.store, &query, &field)
        }
        "spool_results" => {
            let status = arg_str(&args, "status").unwrap_or_else(|| "complete".to_string());
            let since = arg_str(&args, "since");
            let limit = arg_u64(&args, "limit").unwrap_or(10) as usize;
            stringify(spindle_query::results(
                &daemon.store,
                &status,
                since.as_deref(),
                limit,
            ))
        }
        "spool_grep" => match arg_str(&args, "pattern") {
            Some(pattern) => stringify(spindle_query::grep(&daemon.store, &pattern)),
            None => "Error: pattern required".to_string(),
        },
        "spool_peek" => match arg_str(&args, "spool_id") {
            Some(id) => {
                let lines = arg_u64(&args, "lines").unwrap_or(50) as usize;
                stringify(spindle_query::peek(&daemon.store, &id, lines))
            }
            None => "Error: spool_id required".to_string(),
        },
        "spool_retry" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(spin::retry(daemon, &id).await),
            None => "Error: spool_id required".to_string(),
        },
        "spool_stats" => spindle_query::stats(&daemon.store),
        "spool_export" => {
            let Some(ids) = arg_str(&args, "spool_ids") else {
                return "Error: spool_ids required".to_string();
            };
            let format = arg_str(&args, "format").unwrap_or_else(|| "json".to_string());
            let output_path = arg_str(&args, "output_path");
            stringify(spindle_query::export(
                &daemon.store,
                &ids,
                &format,
                output_path.as_deref(),
            ))
        }
        "spool_info" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(spindle_query::info(&daemon.store, &id)),
            None => "Error: spool_id required".to_string(),
        },
        "spool_dashboard" => spindle_query::dashboard(&daemon.store).await,
        "shard_status" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(spindle_shard::shard_status(&daemon.store, &id).await),
            None => "Error: spool_id required".to_string(),
        },
        "shard_merge" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(
                spindle_shard::shard_merge(
                    &daemon.store,
                    &daemon.skein,
                    &id,
                    arg_bool(&args, "keep_branch"),
                    arg_str(&args, "caller_cwd").as_deref(),
                )
                .await,
            ),
            None => "Error: spool_id required".to_string(),
        },
        "shard_abandon" => match arg_str(&args, "spool_id") {
            Some(id) => stringify(
                spindle_shard::shard_abandon(
                    &daemon.store,
                    &id,
                    arg_bool(&args, "keep_branch"),
                    arg_str(&args, "caller_cwd").as_deref(),
                )
                .await,
            ),
            None => "Error: spool_id required".to_string(),
        },
        "triage" => match arg_str(&args, "worktree_path") {
            Some(path) => stringify(spin::triage(daemon, &path).await),
            None => "Error: worktree_path required".to_string(),
        },
        "spindle_reload" => stringify(drop_reload_signal(daemon)),
        other => format!("Error: Unknown tool '{other}'"),
    }
}

/// Touch the reload signal file for the external supervisor to pick up.
fn drop_reload_signal(daemon: &Daemon) -> Result<String> {
    let path = daemon.settings.reload_signal_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, chrono::Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to touch {}", path.display()))?;
    Ok(format!("Reload signal dropped at {}", path.display()))
}

fn stringify(result: Result<String>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => format!("Error: {e}"),
    }
}

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn arg_bool(args: &Value, key: &str) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn arg_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

fn parse_harness(args: &Value) -> spindle_core::Harness {
    match args.get("harness").and_then(|v| v.as_str()) {
        Some("gemini") => spindle_core::Harness::Gemini,
        _ => spindle_core::Harness::Claude,
    }
}

/// MCP tool definitions for `tools/list`.
fn tool_definitions() -> Vec<Value> {
    fn tool(name: &str, description: &str, schema: Value) -> Value {
        json!({ "name": name, "description": description, "inputSchema": schema })
    }
    fn obj(properties: Value, required: &[&str]) -> Value {
        json!({ "type": "object", "properties": properties, "required": required })
    }

    vec![
        tool(
            "spin",
            "Spawn a coding agent for a task. Returns immediately with a spool_id.",
            obj(
                json!({
                    "prompt": { "type": "string", "description": "The task for the agent" },
                    "permission": { "type": "string", "description": "readonly, careful (default), full, shard, or careful+shard" },
                    "shard": { "type": "boolean", "description": "Run in an isolated git worktree" },
                    "system_prompt": { "type": "string" },
                    "working_dir": { "type": "string", "description": "Project directory (required)" },
                    "allowed_tools": { "type": "string", "description": "Explicit tool list; overrides the profile" },
                    "tags": { "type": "string", "description": "Comma-separated tags" },
                    "model": { "type": "string" },
                    "timeout": { "description": "Seconds, or a duration like 30s/5m/2h/HH:MM" },
                    "skeinless": { "type": "boolean", "description": "Skip SKEIN context injection" },
                    "harness": { "type": "string", "description": "claude (default) or gemini" }
                }),
                &["prompt", "working_dir"],
            ),
        ),
        tool(
            "respin",
            "Continue an existing session with a new message.",
            obj(
                json!({
                    "session_id": { "type": "string" },
                    "prompt": { "type": "string" }
                }),
                &["session_id", "prompt"],
            ),
        ),
        tool(
            "unspool",
            "Get the result of a background spin task.",
            obj(json!({ "spool_id": { "type": "string" } }), &["spool_id"]),
        ),
        tool(
            "spin_wait",
            "Block until spools complete (gather) or the first completes (yield).",
            obj(
                json!({
                    "spool_ids": { "type": "string", "description": "Comma-separated spool ids" },
                    "mode": { "type": "string", "description": "gather (default) or yield" },
                    "timeout": { "description": "Seconds, or a duration like 30s/5m/2h" }
                }),
                &["spool_ids"],
            ),
        ),
        tool(
            "spin_drop",
            "Cancel a running spool by killing its process group.",
            obj(json!({ "spool_id": { "type": "string" } }), &["spool_id"]),
        ),
        tool("spools", "List all spools (running and completed).", obj(json!({}), &[])),
        tool(
            "spool_search",
            "Search spool prompts and/or results for a string.",
            obj(
                json!({
                    "query": { "type": "string" },
                    "field": { "type": "string", "description": "prompt, result, or both (default)" }
                }),
                &["query"],
            ),
        ),
        tool(
            "spool_results",
            "Bulk fetch spool results with filtering.",
            obj(
                json!({
                    "status": { "type": "string", "description": "complete (default), error, running, timeout, or all" },
                    "since": { "type": "string", "description": "1h, 6h, 12h, 1d, 7d" },
                    "limit": { "type": "number" }
                }),
                &[],
            ),
        ),
        tool(
            "spool_grep",
            "Regex search through all spool results.",
            obj(json!({ "pattern": { "type": "string" } }), &["pattern"]),
        ),
        tool(
            "spool_peek",
            "Tail the live stdout of a running spool.",
            obj(
                json!({
                    "spool_id": { "type": "string" },
                    "lines": { "type": "number", "description": "Lines from the end (default 50)" }
                }),
                &["spool_id"],
            ),
        ),
        tool(
            "spool_retry",
            "Re-run a spool with the same parameters.",
            obj(json!({ "spool_id": { "type": "string" } }), &["spool_id"]),
        ),
        tool("spool_stats", "Summary statistics for all spools.", obj(json!({}), &[])),
        tool(
            "spool_export",
            "Export spool records to a file.",
            obj(
                json!({
                    "spool_ids": { "type": "string", "description": "Comma-separated ids, or 'all'" },
                    "format": { "type": "string", "description": "json (default) or md" },
                    "output_path": { "type": "string" }
                }),
                &["spool_ids"],
            ),
        ),
        tool(
            "spool_info",
            "Full record of a spool plus transcript availability.",
            obj(json!({ "spool_id": { "type": "string" } }), &["spool_id"]),
        ),
        tool(
            "spool_dashboard",
            "Activity summary and shards needing attention.",
            obj(json!({}), &[]),
        ),
        tool(
            "shard_status",
            "Status of the shard bound to a spool.",
            obj(json!({ "spool_id": { "type": "string" } }), &["spool_id"]),
        ),
        tool(
            "shard_merge",
            "Merge a shard's branch back and clean up its worktree.",
            obj(
                json!({
                    "spool_id": { "type": "string" },
                    "keep_branch": { "type": "boolean" },
                    "caller_cwd": { "type": "string", "description": "Your current working directory" }
                }),
                &["spool_id"],
            ),
        ),
        tool(
            "shard_abandon",
            "Remove a shard's worktree without merging.",
            obj(
                json!({
                    "spool_id": { "type": "string" },
                    "keep_branch": { "type": "boolean" },
                    "caller_cwd": { "type": "string", "description": "Your current working directory" }
                }),
                &["spool_id"],
            ),
        ),
        tool(
            "triage",
            "Assess an orphan worktree and tender a recommendation.",
            obj(
                json!({ "worktree_path": { "type": "string" } }),
                &["worktree_path"],
            ),
        ),
        tool(
            "spindle_reload",
            "Drop the reload touchfile for the external supervisor.",
            obj(json!({}), &[]),
        ),
    ]
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
