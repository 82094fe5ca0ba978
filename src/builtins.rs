use std::io::Write;

use crate::error::ShellError;
use crate::job_control;
use crate::jobs::{Job, JobState, JobTable};
use crate::signals::JobsLock;

/// The commands the shell runs in its own process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Quit,
    Jobs,
    Fg,
    Bg,
}

impl Builtin {
    /// Look up a command name. Returns `None` for anything that must be
    /// launched as a job.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "quit" => Some(Builtin::Quit),
            "jobs" => Some(Builtin::Jobs),
            "fg" => Some(Builtin::Fg),
            "bg" => Some(Builtin::Bg),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum BuiltinAction {
    Continue,
    Exit(i32),
}

/// Execute a builtin command in the shell process.
pub fn execute(
    builtin: Builtin,
    args: &[String],
    stdout: &mut dyn Write,
) -> Result<BuiltinAction, ShellError> {
    match builtin {
        Builtin::Quit => return Ok(BuiltinAction::Exit(0)),
        Builtin::Jobs => builtin_jobs(stdout)?,
        Builtin::Fg => builtin_fg(args)?,
        Builtin::Bg => builtin_bg(args, stdout)?,
    }
    Ok(BuiltinAction::Continue)
}

fn lock() -> Result<JobsLock, ShellError> {
    JobsLock::acquire().map_err(ShellError::signal("sigprocmask"))
}

// ── Job control builtins ──

/// List all tracked jobs.
fn builtin_jobs(stdout: &mut dyn Write) -> Result<(), ShellError> {
    let lock = lock()?;
    // A closed stdout is not worth failing the builtin over.
    let _ = lock.with(|table| table.list_all(stdout));
    Ok(())
}

/// Continue a job and make it the foreground job, then wait for it.
fn builtin_fg(args: &[String]) -> Result<(), ShellError> {
    let target = JobRef::parse("fg", args.first())?;

    let pid = {
        let lock = lock()?;
        lock.with(|table| -> Result<Option<libc::pid_t>, ShellError> {
            let job = target.resolve(table)?;
            if job.state() == JobState::Foreground {
                return Ok(None);
            }
            let pid = job.pid();
            if let Err(e) = job_control::signal_group(pid, libc::SIGCONT) {
                tracing::warn!(pid, error = %e, "SIGCONT failed");
            }
            table.set_state(pid, JobState::Foreground)?;
            Ok(Some(pid))
        })?
    };

    match pid {
        Some(pid) => {
            tracing::debug!(pid, "job moved to the foreground");
            job_control::wait_foreground(pid)
        }
        None => Ok(()),
    }
}

/// Continue a stopped job in the background.
fn builtin_bg(args: &[String], stdout: &mut dyn Write) -> Result<(), ShellError> {
    let target = JobRef::parse("bg", args.first())?;

    let lock = lock()?;
    lock.with(|table| -> Result<(), ShellError> {
        let job = target.resolve(table)?;
        if job.state() != JobState::Stopped {
            return Ok(());
        }
        let (jid, pid) = (job.jid(), job.pid());
        let ack = format!("[{jid}] ({pid}) {}", job.command().as_str());
        if let Err(e) = job_control::signal_group(pid, libc::SIGCONT) {
            tracing::warn!(pid, error = %e, "SIGCONT failed");
        }
        table.set_state(pid, JobState::Background)?;
        tracing::debug!(jid, pid, "job resumed in the background");
        let _ = writeln!(stdout, "{ack}");
        Ok(())
    })
}

// ── Helpers ──

/// A `fg`/`bg` target: `%jid` or a bare pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Jid(usize),
    Pid(libc::pid_t),
}

impl JobRef {
    pub fn parse(command: &'static str, arg: Option<&String>) -> Result<Self, ShellError> {
        let arg = arg.ok_or(ShellError::MissingJobArgument { command })?;
        let invalid = || ShellError::InvalidJobArgument { command };

        match arg.strip_prefix('%') {
            Some(jid) => match jid.parse::<usize>() {
                Ok(jid) if jid > 0 => Ok(JobRef::Jid(jid)),
                _ => Err(invalid()),
            },
            None => match arg.parse::<libc::pid_t>() {
                Ok(pid) if pid > 0 => Ok(JobRef::Pid(pid)),
                _ => Err(invalid()),
            },
        }
    }

    fn resolve<'t>(&self, table: &'t JobTable) -> Result<&'t Job, ShellError> {
        match *self {
            JobRef::Jid(jid) => table.find_by_jid(jid).ok_or(ShellError::NoSuchJob(jid)),
            JobRef::Pid(pid) => table.find_by_pid(pid).ok_or(ShellError::NoSuchProcess(pid)),
        }
    }
}
