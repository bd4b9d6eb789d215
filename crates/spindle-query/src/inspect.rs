//! Single-spool inspection: live output peek and full record info.

use anyhow::Result;
use serde_json::json;

use spindle_core::SpindleError;
use spindle_store::SpoolStore;

/// Tail the live stdout of a spool.
///
/// Reads the transient `<id>.stdout` file, so this only shows anything
/// while the spool is pending/running (or was cancelled mid-write).
pub fn peek(store: &SpoolStore, id: &str, lines: usize) -> Result<String> {
    let Some(spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };

    let stdout_path = store.stdout_path(id);
    if !stdout_path.exists() {
        return Ok(format!("No output yet for spool {id}"));
    }

    let content = std::fs::read_to_string(&stdout_path)?;
    let all_lines: Vec<&str> = content.lines().collect();
    if all_lines.is_empty() {
        return Ok(format!("Output file exists but is empty for spool {id}"));
    }

    let shown = all_lines.len().min(lines);
    let tail = &all_lines[all_lines.len() - shown..];

    let mut reply = format!(
        "[spool {id} - {} - {} total lines, showing last {shown}]\n",
        spool.status,
        all_lines.len()
    );
    reply.push_str(&tail.join("\n"));
    reply.push('\n');
    Ok(reply)
}

/// Full record plus transcript availability and size.
pub fn info(store: &SpoolStore, id: &str) -> Result<String> {
    let Some(spool) = store.read(id) else {
        return Err(SpindleError::UnknownSpool(id.to_string()).into());
    };

    let transcript_size = store.transcript_size(id);
    let reply = json!({
        "spool": spool,
        "transcript": {
            "available": transcript_size.is_some(),
            "size_bytes": transcript_size,
        },
    });
    Ok(serde_json::to_string_pretty(&reply)?)
}
