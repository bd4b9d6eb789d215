//! Detached child spawning.

use anyhow::{Context, Result};
use std::fs::File;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use tracing::debug;

use spindle_store::SpoolStore;

use crate::argv::SpawnSpec;

/// Spawn a detached child for a spool and return its pid.
///
/// The child goes into its own session (`setsid`) so the daemon dying does
/// not orphan-kill it; stdout and stderr are redirected to the spool's
/// transient files; the environment is inherited. A background thread
/// collects the exit status so no zombie lingers while the daemon lives;
/// completion detection still goes through the pid probe and the stdout
/// heuristic, never through `wait`.
pub fn spawn_detached(store: &SpoolStore, id: &str, spec: &SpawnSpec) -> Result<u32> {
    let stdout = File::create(store.stdout_path(id))
        .with_context(|| format!("Failed to create stdout file for spool {id}"))?;
    let stderr = File::create(store.stderr_path(id))
        .with_context(|| format!("Failed to create stderr file for spool {id}"))?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    // SAFETY: setsid() is async-signal-safe and runs between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn '{}' for spool {id}", spec.program))?;
    let pid = child.id();
    debug!(id, pid, program = %spec.program, "spawned detached child");

    std::thread::spawn(move || {
        let _ = child.wait();
    });

    Ok(pid)
}
