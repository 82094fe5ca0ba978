use std::io::{self, Write};

use crate::ast::Pipeline;
use crate::builtins::{self, Builtin, BuiltinAction};
use crate::error::ShellError;
use crate::job_control;
use crate::jobs::{JobState, JobTableError};
use crate::launcher;
use crate::parser;
use crate::signals::{self, JobsLock, MaskGuard, READY_SIGNAL};

/// Evaluate one command line: run a builtin in-process, or launch a job.
pub fn eval(line: &str) -> Result<BuiltinAction, ShellError> {
    let Some(pipeline) = parser::parse(line)? else {
        return Ok(BuiltinAction::Continue);
    };

    if let Some([program, args @ ..]) = pipeline.simple_command() {
        if let Some(builtin) = Builtin::from_name(program) {
            let mut stdout = io::stdout();
            let action = builtins::execute(builtin, args, &mut stdout);
            let _ = stdout.flush();
            return action;
        }
    }

    launch(&pipeline)?;
    Ok(BuiltinAction::Continue)
}

/// Start `pipeline` as a new job without ever leaving a live child
/// untracked.
///
/// The job signals stay blocked from before `fork` until the job is in the
/// table and the ready handshake has completed; the child leaves the shell's
/// process group before it can run anything.
fn launch(pipeline: &Pipeline) -> Result<(), ShellError> {
    let state = if pipeline.background {
        JobState::Background
    } else {
        JobState::Foreground
    };

    let lock = JobsLock::acquire().map_err(ShellError::signal("sigprocmask"))?;
    if lock.with(|table| table.is_full()) {
        return Err(JobTableError::Full.into());
    }
    let ready = MaskGuard::block(&[READY_SIGNAL]).map_err(ShellError::signal("sigprocmask"))?;

    let prepared = launcher::prepare(pipeline)?;

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(ShellError::Fork(io::Error::last_os_error()));
    }
    if pid == 0 {
        signals::prepare_child(lock.previous_mask());
        launcher::run_child(&prepared);
    }

    // Both sides set the group so it exists whichever runs first.
    if let Err(e) = job_control::set_process_group(pid, pid) {
        tracing::warn!(pid, error = %e, "setpgid failed in parent");
    }

    let jid = match lock.with(|table| table.add(pid, state, &pipeline.text)) {
        Ok(jid) => jid,
        Err(e) => {
            // Unreachable while the lock is held, but never leave an
            // untracked child behind.
            let _ = job_control::signal_group(pid, libc::SIGKILL);
            return Err(e.into());
        }
    };
    tracing::debug!(jid, pid, cmdline = %pipeline.text, "added job");

    let mut blocked = *ready.previous();
    unsafe {
        libc::sigaddset(&mut blocked, READY_SIGNAL);
    }
    signals::await_ready(&blocked).map_err(ShellError::signal("raise"))?;

    drop(ready);
    drop(lock);
    drop(prepared);

    match state {
        JobState::Foreground => job_control::wait_foreground(pid),
        _ => {
            println!("[{jid}] ({pid}) {}", pipeline.text);
            Ok(())
        }
    }
}
