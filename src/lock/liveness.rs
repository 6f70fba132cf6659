//! Process liveness probing.
//!
//! Stale-lock detection asks whether the pid recorded in a lock file still
//! names a live process. The probe sits behind [`ProcessLiveness`] so
//! platforms without signal-0 semantics can substitute a process-table query.

/// Capability answering whether a process id is alive.
pub trait ProcessLiveness: Send + Sync {
    /// Returns `true` when a process with `pid` currently exists.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Default liveness probe for the current platform.
///
/// On unix a no-op signal is delivered to the pid: success and `EPERM`
/// (the process exists under another user) mean alive, `ESRCH` means dead.
/// Elsewhere the OS process table is queried.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalLiveness;

impl ProcessLiveness for SignalLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        // Pid 0 addresses the caller's process group, never a single owner.
        if pid == 0 {
            return false;
        }
        probe(pid)
    }
}

#[cfg(unix)]
fn probe(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(err) => {
            tracing::debug!(pid, %err, "unexpected liveness probe error, treating as dead");
            false
        }
    }
}

#[cfg(not(unix))]
fn probe(pid: u32) -> bool {
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output();

    match output {
        Ok(out) => String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")),
        Err(err) => {
            tracing::debug!(pid, %err, "process table query failed, treating as dead");
            false
        }
    }
}
