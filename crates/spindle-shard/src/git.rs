//! Bounded git invocation helper.
//!
//! Every git call in the daemon goes through [`run_git`] with an explicit
//! timeout; a hung git process must never wedge a tool call.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use spindle_core::SpindleError;

/// Captured result of a git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run git with the given args in `cwd`, bounded by `timeout_secs`.
pub async fn run_git(cwd: &Path, args: &[&str], timeout_secs: u64) -> Result<GitOutput> {
    let fut = tokio::process::Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output();

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result?,
        Err(_) => return Err(SpindleError::GitTimeout.into()),
    };

    Ok(GitOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let dir = tempdir().unwrap();
        let out = run_git(dir.path(), &["--version"], 10).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.starts_with("git version"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let dir = tempdir().unwrap();
        // Not a repository: rev-parse fails with a message on stderr.
        let out = run_git(dir.path(), &["rev-parse", "--git-dir"], 10)
            .await
            .unwrap();
        assert!(!out.success());
        assert!(!out.stderr.is_empty());
    }
}
