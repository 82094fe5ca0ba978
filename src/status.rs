/// A decoded `waitpid` status report for one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited { pid: libc::pid_t, code: i32 },
    Signaled { pid: libc::pid_t, signal: i32 },
    Stopped { pid: libc::pid_t, signal: i32 },
}

impl ChildStatus {
    /// Decode a raw status word. Returns `None` for reports this shell never
    /// asks for (such as `WCONTINUED` resumptions).
    ///
    /// Safe to call from a signal handler.
    pub fn decode(pid: libc::pid_t, raw_status: libc::c_int) -> Option<Self> {
        if unsafe { libc::WIFSTOPPED(raw_status) } {
            let signal = unsafe { libc::WSTOPSIG(raw_status) };
            return Some(Self::Stopped { pid, signal });
        }

        if unsafe { libc::WIFEXITED(raw_status) } {
            let code = unsafe { libc::WEXITSTATUS(raw_status) };
            return Some(Self::Exited { pid, code });
        }

        if unsafe { libc::WIFSIGNALED(raw_status) } {
            let signal = unsafe { libc::WTERMSIG(raw_status) };
            return Some(Self::Signaled { pid, signal });
        }

        None
    }
}

/// Convert a raw wait status into shell-style exit code semantics.
///
/// Processes terminated by a signal map to `128 + signal`.
pub fn exit_code_from_wait_status(raw_status: libc::c_int) -> Option<i32> {
    if unsafe { libc::WIFEXITED(raw_status) } {
        return Some(unsafe { libc::WEXITSTATUS(raw_status) });
    }

    if unsafe { libc::WIFSIGNALED(raw_status) } {
        let signal = unsafe { libc::WTERMSIG(raw_status) };
        return Some(128 + signal);
    }

    None
}
