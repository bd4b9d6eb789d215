//! Argv composition per harness.
//!
//! A closed match over the two harness families, not a trait: the set is
//! fixed and each arm differs in flags and launch shape only. The claude
//! binary takes everything on its command line; the gemini harness persists
//! a generated launcher script (`<id>.py`) that the finalizer cleans up.

use anyhow::{Context, Result};
use std::path::PathBuf;

use spindle_core::{permission, Harness, Spool};
use spindle_store::SpoolStore;

/// Fully composed child invocation.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl SpawnSpec {
    /// Flat argv including the program, for wrapping and for logs.
    pub fn argv(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() + 1);
        out.push(self.program.clone());
        out.extend(self.args.iter().cloned());
        out
    }
}

/// Compose the child invocation for a spool.
///
/// `effective_prompt` is what the child sees (it may carry a shard
/// preamble); the record's `prompt` field is never consulted here.
/// `resume` carries the upstream session id for respins.
pub fn compose(
    store: &SpoolStore,
    spool: &Spool,
    effective_prompt: &str,
    resume: Option<&str>,
) -> Result<SpawnSpec> {
    match spool.harness {
        Harness::Claude => Ok(compose_claude(spool, effective_prompt, resume)),
        Harness::Gemini => compose_gemini(store, spool, effective_prompt),
    }
}

fn compose_claude(spool: &Spool, effective_prompt: &str, resume: Option<&str>) -> SpawnSpec {
    let mut args = vec![
        "-p".to_string(),
        effective_prompt.to_string(),
        "--output-format".to_string(),
        "json".to_string(),
    ];

    if let Some(session_id) = resume {
        args.push("--resume".to_string());
        args.push(session_id.to_string());
    }

    if let Some(model) = &spool.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    // Non-interactive execution: full/shard profiles bypass permission
    // prompts entirely, everything else auto-accepts edits.
    args.push("--permission-mode".to_string());
    if permission::bypasses_permissions(&spool.permission) {
        args.push("bypassPermissions".to_string());
    } else {
        args.push("acceptEdits".to_string());
    }

    if let Some(system_prompt) = &spool.system_prompt {
        args.push("--system-prompt".to_string());
        args.push(system_prompt.clone());
    }

    if let Some(tools) = &spool.allowed_tools {
        args.push("--allowedTools".to_string());
        args.push(tools.clone());
    }

    SpawnSpec {
        program: "claude".to_string(),
        args,
        cwd: PathBuf::from(&spool.working_dir),
    }
}

/// Write the gemini launcher script and return the invocation for it.
///
/// The launcher reads the API key from the environment, sends the prompt,
/// and prints a single JSON document with `result` or `error`, the same
/// terminal-stdout shape the finalizer already understands.
fn compose_gemini(store: &SpoolStore, spool: &Spool, effective_prompt: &str) -> Result<SpawnSpec> {
    let launcher_path = store.launcher_path(&spool.id);

    let prompt_json = serde_json::to_string(effective_prompt)?;
    let system_json = serde_json::to_string(&spool.system_prompt)?;
    let model_json =
        serde_json::to_string(spool.model.as_deref().unwrap_or("gemini-2.0-flash"))?;

    let script = format!(
        r#"#!/usr/bin/env python3
import json
import os
import sys

PROMPT = {prompt_json}
SYSTEM = {system_json}
MODEL = {model_json}


def main():
    api_key = os.environ.get("GOOGLE_API_KEY") or os.environ.get("GEMINI_API_KEY")
    if not api_key:
        print(json.dumps({{"error": "GOOGLE_API_KEY or GEMINI_API_KEY not set"}}))
        return 1
    try:
        from google import genai
    except ImportError as e:
        print(json.dumps({{"error": f"google-genai not installed: {{e}}"}}))
        return 1
    try:
        client = genai.Client(api_key=api_key)
        config = {{"system_instruction": SYSTEM}} if SYSTEM else None
        response = client.models.generate_content(
            model=MODEL, contents=PROMPT, config=config
        )
        usage = getattr(response, "usage_metadata", None)
        cost = None
        if usage is not None:
            cost = {{
                "input_tokens": getattr(usage, "prompt_token_count", None),
                "output_tokens": getattr(usage, "candidates_token_count", None),
            }}
        print(json.dumps({{"result": response.text, "cost": cost}}))
        return 0
    except Exception as e:
        print(json.dumps({{"error": str(e)}}))
        return 1


if __name__ == "__main__":
    sys.exit(main())
"#
    );

    std::fs::create_dir_all(store.root())
        .with_context(|| format!("Failed to create spool dir: {}", store.root().display()))?;
    std::fs::write(&launcher_path, script)
        .with_context(|| format!("Failed to write launcher: {}", launcher_path.display()))?;

    Ok(SpawnSpec {
        program: "python3".to_string(),
        args: vec![launcher_path.to_string_lossy().into_owned()],
        cwd: PathBuf::from(&spool.working_dir),
    })
}

#[cfg(test)]
#[path = "argv_tests.rs"]
mod tests;
