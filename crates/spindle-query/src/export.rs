//! Export selected spools to a JSON or markdown file.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::PathBuf;

use spindle_core::{SpindleError, Spool};
use spindle_store::SpoolStore;

/// Export spools to a file and report where they went.
///
/// `spool_ids` is a comma-separated id list or `"all"`. The default target
/// is `<spool_dir>/export.{json,md}`.
pub fn export(
    store: &SpoolStore,
    spool_ids: &str,
    format: &str,
    output_path: Option<&str>,
) -> Result<String> {
    let mut selected: Vec<Spool> = if spool_ids.trim().eq_ignore_ascii_case("all") {
        store.list()
    } else {
        let mut spools = Vec::new();
        for id in spool_ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match store.read(id) {
                Some(spool) => spools.push(spool),
                None => return Err(SpindleError::UnknownSpool(id.to_string()).into()),
            }
        }
        spools
    };

    if selected.is_empty() {
        return Ok("No spools to export".to_string());
    }
    selected.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let (content, ext) = match format {
        "md" => (render_markdown(&selected), "md"),
        _ => (serde_json::to_string_pretty(&selected)?, "json"),
    };

    let path = match output_path {
        Some(p) => PathBuf::from(p),
        None => store.root().join(format!("export.{ext}")),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create export dir: {}", parent.display()))?;
    }
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write export: {}", path.display()))?;

    Ok(format!(
        "Exported {} spools to {}",
        selected.len(),
        path.display()
    ))
}

fn render_markdown(spools: &[Spool]) -> String {
    let mut lines = vec![
        "# Spool Export".to_string(),
        String::new(),
        format!("Generated: {}", Utc::now().to_rfc3339()),
        String::new(),
    ];

    for spool in spools {
        lines.push(format!("## {}", spool.id));
        lines.push(format!("**Status:** {}", spool.status));
        lines.push(format!("**Created:** {}", spool.created_at.to_rfc3339()));
        lines.push(String::new());
        lines.push("### Prompt".to_string());
        lines.push(format!("```\n{}\n```", spool.prompt));
        lines.push(String::new());
        lines.push("### Result".to_string());
        lines.push(format!(
            "```\n{}\n```",
            spool.result.as_deref().unwrap_or("")
        ));
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use spindle_core::SpoolStatus;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, SpoolStore) {
        let dir = tempdir().unwrap();
        let store = SpoolStore::new(dir.path());
        (dir, store)
    }

    fn completed(store: &SpoolStore, id: &str, age_hours: i64) {
        let mut spool = Spool::new(id, format!("prompt {id}"), "/tmp/p");
        spool.status = SpoolStatus::Complete;
        spool.result = Some(format!("result {id}"));
        spool.created_at = Utc::now() - Duration::hours(age_hours);
        store.write(&spool).unwrap();
    }

    #[test]
    fn exports_selected_ids_as_json() {
        let (_dir, store) = store();
        completed(&store, "a1111111", 2);
        completed(&store, "b1111111", 1);

        let reply = export(&store, "a1111111,b1111111", "json", None).unwrap();
        assert!(reply.starts_with("Exported 2 spools to"));

        let path = store.root().join("export.json");
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        // Sorted oldest-first.
        assert_eq!(rows[0]["id"], "a1111111");
        assert_eq!(rows[1]["id"], "b1111111");
    }

    #[test]
    fn exports_all_to_custom_path() {
        let (dir, store) = store();
        completed(&store, "a1111111", 1);
        let target = dir.path().join("out").join("dump.json");

        let reply = export(&store, "all", "json", Some(&target.to_string_lossy())).unwrap();
        assert!(reply.contains("dump.json"));
        assert!(target.exists());
    }

    #[test]
    fn markdown_uses_the_fixed_template() {
        let (_dir, store) = store();
        completed(&store, "a1111111", 1);

        export(&store, "all", "md", None).unwrap();
        let body = std::fs::read_to_string(store.root().join("export.md")).unwrap();
        assert!(body.starts_with("# Spool Export"));
        assert!(body.contains("## a1111111"));
        assert!(body.contains("**Status:** complete"));
        assert!(body.contains("### Prompt"));
        assert!(body.contains("```\nprompt a1111111\n```"));
        assert!(body.contains("### Result"));
        assert!(body.contains("```\nresult a1111111\n```"));
        assert!(body.contains("\n---\n"));
    }

    #[test]
    fn unknown_id_aborts_the_export() {
        let (_dir, store) = store();
        completed(&store, "a1111111", 1);
        let err = export(&store, "a1111111,ghost", "json", None).unwrap_err();
        assert_eq!(err.to_string(), "Unknown spool_id 'ghost'");
        assert!(!store.root().join("export.json").exists());
    }

    #[test]
    fn empty_store_reports_nothing_to_export() {
        let (_dir, store) = store();
        assert_eq!(export(&store, "all", "json", None).unwrap(), "No spools to export");
    }
}
