//! Permission profiles and their resolution.
//!
//! A profile maps to the `--allowedTools` string handed to the child plus a
//! flag saying whether the spool should automatically run inside a shard.
//! Profiles ending in `+shard` (and the bare `shard` profile) enable the
//! worktree isolation; an explicit `allowed_tools` argument always wins and
//! suppresses auto-shard.

/// Profile used when the caller names none, or names an unknown one.
pub const DEFAULT_PROFILE: &str = "careful";

const READONLY_TOOLS: &str = "Read,Grep,Glob,Bash(ls:*),Bash(cat:*),Bash(head:*),Bash(tail:*),Bash(git status:*),Bash(git log:*),Bash(git diff:*)";

const CAREFUL_TOOLS: &str = "Read,Write,Edit,Grep,Glob,Bash(git:*),Bash(make:*),Bash(pytest:*),Bash(python:*),Bash(npm:*),Bash(skein:*),Bash(muster:*)";

/// Closed table of permission profiles.
///
/// `None` for allowed_tools means unrestricted (no `--allowedTools` flag).
pub const PERMISSION_PROFILES: &[(&str, Option<&str>, bool)] = &[
    ("readonly", Some(READONLY_TOOLS), false),
    ("careful", Some(CAREFUL_TOOLS), false),
    ("full", None, false),
    // Shard variants: same permissions but the spool runs in a worktree.
    ("shard", None, true),
    ("careful+shard", Some(CAREFUL_TOOLS), true),
];

/// Look up a profile by name.
pub fn lookup(name: &str) -> Option<(Option<&'static str>, bool)> {
    PERMISSION_PROFILES
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, tools, auto_shard)| (*tools, *auto_shard))
}

/// Resolve a permission profile and optional explicit tool list.
///
/// Returns `(allowed_tools, auto_shard)`. Explicit `allowed_tools` takes
/// precedence and never auto-shards. Unknown profile names fall back to
/// [`DEFAULT_PROFILE`] without sharding.
pub fn resolve(
    permission: Option<&str>,
    allowed_tools: Option<&str>,
) -> (Option<String>, bool) {
    if let Some(tools) = allowed_tools {
        if !tools.is_empty() {
            return (Some(tools.to_string()), false);
        }
    }

    let name = permission.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PROFILE);

    match lookup(name) {
        Some((tools, auto_shard)) => (tools.map(str::to_string), auto_shard),
        None => {
            let (tools, _) = lookup(DEFAULT_PROFILE).expect("default profile is in the table");
            (tools.map(str::to_string), false)
        }
    }
}

/// Whether a profile requests the child's bypass-permissions mode.
///
/// `full`, `shard` and any `*+shard` profile run the child with permission
/// prompts bypassed; everything else uses non-interactive edit acceptance.
pub fn bypasses_permissions(permission: &str) -> bool {
    permission == "full" || permission == "shard" || permission.ends_with("+shard")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permission_is_careful() {
        let (tools, shard) = resolve(None, None);
        assert_eq!(tools.as_deref(), Some(CAREFUL_TOOLS));
        assert!(!shard);
    }

    #[test]
    fn readonly_has_no_write_tools() {
        let (tools, shard) = resolve(Some("readonly"), None);
        let tools = tools.unwrap();
        assert!(tools.contains("Read"));
        assert!(tools.contains("Grep"));
        assert!(tools.contains("Glob"));
        assert!(!tools.contains("Write"));
        assert!(!tools.contains("Edit"));
        assert!(!shard);
    }

    #[test]
    fn careful_has_edit_and_common_shell_verbs() {
        let (tools, shard) = resolve(Some("careful"), None);
        let tools = tools.unwrap();
        for expected in [
            "Read",
            "Write",
            "Edit",
            "Bash(git:*)",
            "Bash(make:*)",
            "Bash(pytest:*)",
            "Bash(python:*)",
            "Bash(npm:*)",
        ] {
            assert!(tools.contains(expected), "missing {expected}");
        }
        assert!(!shard);
    }

    #[test]
    fn full_is_unrestricted() {
        let (tools, shard) = resolve(Some("full"), None);
        assert!(tools.is_none());
        assert!(!shard);
    }

    #[test]
    fn shard_is_unrestricted_and_auto_shards() {
        let (tools, shard) = resolve(Some("shard"), None);
        assert!(tools.is_none());
        assert!(shard);
    }

    #[test]
    fn careful_plus_shard_combines_both() {
        let (tools, shard) = resolve(Some("careful+shard"), None);
        assert_eq!(tools.as_deref(), Some(CAREFUL_TOOLS));
        assert!(shard);
    }

    #[test]
    fn explicit_tools_win_and_suppress_auto_shard() {
        let (tools, shard) = resolve(Some("shard"), Some("Read,Grep"));
        assert_eq!(tools.as_deref(), Some("Read,Grep"));
        assert!(!shard);
    }

    #[test]
    fn unknown_profile_falls_back_to_careful() {
        let (tools, shard) = resolve(Some("unknown_profile"), None);
        assert_eq!(tools.as_deref(), Some(CAREFUL_TOOLS));
        assert!(!shard);
    }

    #[test]
    fn bypass_mode_table() {
        assert!(bypasses_permissions("full"));
        assert!(bypasses_permissions("shard"));
        assert!(bypasses_permissions("careful+shard"));
        assert!(!bypasses_permissions("careful"));
        assert!(!bypasses_permissions("readonly"));
    }

    #[test]
    fn every_profile_resolves_to_its_table_row() {
        for (name, tools, auto_shard) in PERMISSION_PROFILES {
            let (resolved, shard) = resolve(Some(name), None);
            assert_eq!(resolved.as_deref(), *tools, "profile {name}");
            assert_eq!(shard, *auto_shard, "profile {name}");
        }
    }
}
