use std::io;

use crate::error::ShellError;
use crate::jobs::JobState;
use crate::signals::{self, JobsLock, MaskGuard};
use crate::status::ChildStatus;

pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Child already exec'd (it set its own group first) or already gone.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// Deliver `signal` to every process in the group led by `pgid`.
pub(crate) fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Blocking `waitpid(pid, WUNTRACED)`. `Ok(None)` means the pid has no
/// further status to report.
pub(crate) fn wait_for_pid(pid: libc::pid_t) -> io::Result<Option<ChildStatus>> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WUNTRACED) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ECHILD) => return Ok(None),
                _ => return Err(err),
            }
        }

        if let Some(status) = ChildStatus::decode(rc, raw_status) {
            return Ok(Some(status));
        }
    }
}

/// Block until the foreground job `pid` stops or has nothing left to report.
///
/// SIGCHLD stays blocked for the whole wait so this loop is the only reaper
/// of `pid`; SIGINT and SIGTSTP remain deliverable and their handlers still
/// act on the job. Background jobs that stop or die meanwhile are reaped, and
/// their notices printed, once the wait returns and SIGCHLD is unblocked.
pub(crate) fn wait_foreground(pid: libc::pid_t) -> Result<(), ShellError> {
    let _sigchld = MaskGuard::block(&[libc::SIGCHLD])
        .map_err(ShellError::signal("sigprocmask"))?;

    let still_foreground = lock()?.with(|table| table.foreground_pid() == Some(pid));
    if !still_foreground {
        tracing::debug!(pid, "job left the foreground before the wait began");
        return Ok(());
    }

    loop {
        match wait_for_pid(pid).map_err(ShellError::Wait)? {
            Some(status) => {
                let stopped = matches!(status, ChildStatus::Stopped { .. });
                lock()?.with(|table| signals::record_status(table, status));
                if stopped {
                    tracing::debug!(pid, "foreground job stopped");
                    return Ok(());
                }
            }
            None => {
                // Nothing left to reap; drop any entry a handler could not.
                lock()?.with(|table| {
                    if table
                        .find_by_pid(pid)
                        .is_some_and(|job| job.state() == JobState::Foreground)
                    {
                        table.remove(pid);
                    }
                });
                tracing::debug!(pid, "foreground job finished");
                return Ok(());
            }
        }
    }
}

fn lock() -> Result<JobsLock, ShellError> {
    JobsLock::acquire().map_err(ShellError::signal("sigprocmask"))
}
