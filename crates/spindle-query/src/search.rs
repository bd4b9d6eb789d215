//! Substring search and regex grep over spool prompts and results.

use anyhow::Result;
use regex::RegexBuilder;
use serde_json::json;

use spindle_core::SpindleError;
use spindle_store::SpoolStore;

use crate::truncate_chars;

/// Case-insensitive substring search with context snippets.
///
/// `field` is `"prompt"`, `"result"`, or `"both"`. Prompt matches get a
/// ±30-character snippet, result matches ±50.
pub fn search(store: &SpoolStore, query: &str, field: &str) -> String {
    let query_lower = query.to_lowercase();
    let mut matches = Vec::new();

    for spool in store.list() {
        let prompt = spool.prompt.clone();
        let result = spool.result.clone().unwrap_or_default();

        let in_prompt = matches!(field, "prompt" | "both")
            && prompt.to_lowercase().contains(&query_lower);
        let in_result = matches!(field, "result" | "both")
            && result.to_lowercase().contains(&query_lower);

        if !in_prompt && !in_result {
            continue;
        }

        let mut entry = json!({
            "id": spool.id,
            "status": spool.status,
            "created_at": spool.created_at,
        });
        if in_prompt {
            entry["prompt_match"] = json!(snippet(&prompt, &query_lower, 30));
        }
        if in_result {
            entry["result_match"] = json!(snippet(&result, &query_lower, 50));
        }
        matches.push(entry);
    }

    if matches.is_empty() {
        return format!("No spools found matching '{query}' in {field}");
    }
    serde_json::to_string_pretty(&matches).unwrap_or_else(|_| "[]".to_string())
}

/// Extract `...context...` around the first case-insensitive hit.
///
/// Works on characters so multi-byte text never splits mid-codepoint.
fn snippet(text: &str, query_lower: &str, context: usize) -> String {
    let haystack: Vec<char> = text.to_lowercase().chars().collect();
    let needle: Vec<char> = query_lower.chars().collect();
    let original: Vec<char> = text.chars().collect();

    let hit = haystack
        .windows(needle.len().max(1))
        .position(|w| w == needle.as_slice())
        .unwrap_or(0);

    let start = hit.saturating_sub(context);
    let end = (hit + needle.len() + context).min(original.len());
    let middle: String = original[start..end].iter().collect();
    format!("...{middle}...")
}

/// Case-insensitive regex over results.
///
/// Returns the first 10 distinct matches per spool plus the total count.
/// An invalid pattern is an error, never a crash.
pub fn grep(store: &SpoolStore, pattern: &str) -> Result<String> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| SpindleError::InvalidRegex(e.to_string()))?;

    let mut matches = Vec::new();
    for spool in store.list() {
        let Some(result) = &spool.result else {
            continue;
        };

        let found: Vec<&str> = regex.find_iter(result).map(|m| m.as_str()).collect();
        if found.is_empty() {
            continue;
        }

        let mut unique = Vec::new();
        for m in &found {
            if !unique.contains(m) {
                unique.push(m);
                if unique.len() == 10 {
                    break;
                }
            }
        }

        matches.push(json!({
            "id": spool.id,
            "status": spool.status,
            "prompt": truncate_chars(&spool.prompt, 80),
            "matches": unique,
            "match_count": found.len(),
        }));
    }

    if matches.is_empty() {
        return Ok(format!("No results matching pattern '{pattern}'"));
    }
    Ok(serde_json::to_string_pretty(&matches)?)
}
