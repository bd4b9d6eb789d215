//! Pid-level probes and signal delivery.

/// Check whether a process is still running.
pub fn is_pid_alive(pid: u32) -> bool {
    // SAFETY: kill(pid, 0) delivers no signal; it only probes existence.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// Deliver a signal to the child's process group, falling back to the pid.
///
/// Children are spawned with `setsid`, so the group leader pid doubles as
/// the group id. The fallback covers the window before `setsid` takes
/// effect, or a group that has already dissolved.
pub fn signal_group(pid: u32, signal: i32) {
    // SAFETY: kill() is async-signal-safe; a negative pid targets the
    // process group with that id.
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret != 0 {
        // SAFETY: plain pid-targeted kill as fallback.
        unsafe {
            libc::kill(pid as libc::pid_t, signal);
        }
    }
}

pub fn terminate_group(pid: u32) {
    signal_group(pid, libc::SIGTERM);
}

pub fn kill_group(pid: u32) {
    signal_group(pid, libc::SIGKILL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn nonexistent_pid_is_dead() {
        // Pid far above any default pid_max.
        assert!(!is_pid_alive(999_999_999));
    }
}
