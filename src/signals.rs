//! Signal dispositions, masking discipline, and the handlers that keep the
//! job table in step with asynchronous child-state changes.
//!
//! Handlers may only do async-signal-safe work: raw syscalls, lock-free
//! atomics, and `sio` output. `tracing` is never called from here.

use std::io;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::jobs::{self, JobState, JobTable};
use crate::sio::{sio_println, ErrnoGuard};
use crate::status::ChildStatus;

/// Signals whose handlers touch the job table.
pub const JOB_SIGNALS: [libc::c_int; 3] = [libc::SIGCHLD, libc::SIGINT, libc::SIGTSTP];

/// Internal "child ready" signal used by the launch handshake.
pub const READY_SIGNAL: libc::c_int = libc::SIGUSR1;

/// Dispositions a forked child must not inherit from the shell.
const CHILD_DEFAULTS: [libc::c_int; 8] = [
    libc::SIGINT,
    libc::SIGTSTP,
    libc::SIGCHLD,
    libc::SIGQUIT,
    libc::SIGUSR1,
    libc::SIGPIPE,
    libc::SIGTTIN,
    libc::SIGTTOU,
];

static READY: AtomicBool = AtomicBool::new(false);

// ── Masks ──

fn empty_set() -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        set.assume_init()
    }
}

fn set_of(signals: &[libc::c_int]) -> libc::sigset_t {
    let mut set = empty_set();
    for &signal in signals {
        unsafe {
            libc::sigaddset(&mut set, signal);
        }
    }
    set
}

fn set_mask(how: libc::c_int, set: &libc::sigset_t) -> io::Result<libc::sigset_t> {
    let mut previous = empty_set();
    let rc = unsafe { libc::sigprocmask(how, set, &mut previous) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(previous)
}

/// Blocks a set of signals for the guard's lifetime, then restores the mask
/// that was in effect before. Guards must be dropped in reverse order.
pub struct MaskGuard {
    previous: libc::sigset_t,
}

impl MaskGuard {
    pub fn block(signals: &[libc::c_int]) -> io::Result<Self> {
        let previous = set_mask(libc::SIG_BLOCK, &set_of(signals))?;
        Ok(Self { previous })
    }

    /// The mask that was in effect before this guard blocked anything.
    pub fn previous(&self) -> &libc::sigset_t {
        &self.previous
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        let _ = set_mask(libc::SIG_SETMASK, &self.previous);
    }
}

/// Main-flow access to the job table. Holding one means child-status,
/// interrupt, and suspend are blocked, so no handler can run concurrently.
pub struct JobsLock {
    mask: MaskGuard,
}

impl JobsLock {
    pub fn acquire() -> io::Result<Self> {
        Ok(Self {
            mask: MaskGuard::block(&JOB_SIGNALS)?,
        })
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut JobTable) -> R) -> R {
        // SAFETY: the job signals are blocked while `self` lives. Callers
        // never call `with` from inside `f`.
        unsafe { jobs::with_shared(f) }
    }

    /// The mask that was in effect before the lock was taken.
    pub fn previous_mask(&self) -> &libc::sigset_t {
        self.mask.previous()
    }
}

// ── Installation ──

type Handler = extern "C" fn(libc::c_int);

fn install_handler(signal: libc::c_int, handler: Handler) -> io::Result<()> {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    // Every handler runs with the job-table handlers held off.
    action.sa_mask = set_of(&JOB_SIGNALS);

    let rc = unsafe { libc::sigaction(signal, &action, ptr::null_mut()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Install every handler the shell relies on. Failure here means the
/// job-table invariants cannot be upheld, so callers treat it as fatal.
pub fn install() -> io::Result<()> {
    install_handler(READY_SIGNAL, on_ready)?;
    install_handler(libc::SIGINT, on_interrupt)?;
    install_handler(libc::SIGTSTP, on_suspend)?;
    install_handler(libc::SIGCHLD, on_child_status)?;
    install_handler(libc::SIGQUIT, on_quit)?;
    tracing::debug!("signal handlers installed");
    Ok(())
}

/// Child-side setup right after `fork`: drop the shell's dispositions, leave
/// the shell's process group, then restore the pre-launch mask.
///
/// Only async-signal-safe calls; the child has not exec'd yet.
pub fn prepare_child(original_mask: &libc::sigset_t) {
    for &signal in &CHILD_DEFAULTS {
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
    unsafe {
        libc::setpgid(0, 0);
        libc::sigprocmask(libc::SIG_SETMASK, original_mask, ptr::null_mut());
    }
}

// ── Launch handshake ──

/// Raise the ready signal and wait until its handler has run.
///
/// The caller keeps the ready signal blocked and passes its current mask as
/// `blocked_mask`. The suspend admits only the ready signal on top of that,
/// so the flag check and the suspend cannot race with delivery.
pub fn await_ready(blocked_mask: &libc::sigset_t) -> io::Result<()> {
    let mut suspend_mask = *blocked_mask;
    unsafe {
        libc::sigdelset(&mut suspend_mask, READY_SIGNAL);
    }

    if unsafe { libc::raise(READY_SIGNAL) } != 0 {
        return Err(io::Error::last_os_error());
    }
    while !READY.load(Ordering::SeqCst) {
        // Always returns -1/EINTR once a handler has run.
        unsafe {
            libc::sigsuspend(&suspend_mask);
        }
    }
    READY.store(false, Ordering::SeqCst);
    Ok(())
}

// ── Bookkeeping shared by handlers and the foreground wait ──

/// Apply one reaped status to the table, emitting the matching notice.
/// Pids the table no longer tracks are ignored.
pub fn record_status(table: &mut JobTable, status: ChildStatus) {
    match status {
        ChildStatus::Exited { pid, .. } => {
            table.remove(pid);
        }
        ChildStatus::Signaled { pid, signal } => {
            if let Some(jid) = table.jid_of(pid) {
                sio_println!("Job [{jid}] ({pid}) terminated by signal {signal}");
                table.remove(pid);
            }
        }
        ChildStatus::Stopped { pid, signal } => {
            let Some(job) = table.find_by_pid(pid) else {
                return;
            };
            if job.state() != JobState::Stopped {
                sio_println!("Job [{}] ({pid}) stopped by signal {signal}", job.jid());
                let _ = table.set_state(pid, JobState::Stopped);
            }
        }
    }
}

// ── Handlers ──

extern "C" fn on_ready(_: libc::c_int) {
    READY.store(true, Ordering::SeqCst);
}

/// Reap every child with a pending status change; one SIGCHLD may stand for
/// several.
extern "C" fn on_child_status(_: libc::c_int) {
    let _errno = ErrnoGuard::save();
    loop {
        let mut raw_status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut raw_status, libc::WNOHANG | libc::WUNTRACED) };
        if pid <= 0 {
            break;
        }
        if let Some(status) = ChildStatus::decode(pid, raw_status) {
            // SAFETY: installed with JOB_SIGNALS in sa_mask.
            unsafe { jobs::with_shared(|table| record_status(table, status)) };
        }
    }
}

extern "C" fn on_interrupt(_: libc::c_int) {
    let _errno = ErrnoGuard::save();
    // SAFETY: installed with JOB_SIGNALS in sa_mask.
    unsafe {
        jobs::with_shared(|table| {
            let Some(job) = table.foreground() else {
                return;
            };
            let (jid, pid) = (job.jid(), job.pid());
            sio_println!("Job [{jid}] ({pid}) terminated by signal {}", libc::SIGINT);
            libc::kill(-pid, libc::SIGINT);
            table.remove(pid);
        });
    }
}

extern "C" fn on_suspend(_: libc::c_int) {
    let _errno = ErrnoGuard::save();
    // SAFETY: installed with JOB_SIGNALS in sa_mask.
    unsafe {
        jobs::with_shared(|table| {
            let Some(job) = table.foreground() else {
                return;
            };
            let (jid, pid) = (job.jid(), job.pid());
            sio_println!("Job [{jid}] ({pid}) stopped by signal {}", libc::SIGTSTP);
            libc::kill(-pid, libc::SIGTSTP);
            let _ = table.set_state(pid, JobState::Stopped);
        });
    }
}

extern "C" fn on_quit(_: libc::c_int) {
    sio_println!("Terminating after receipt of SIGQUIT signal");
    unsafe { libc::_exit(1) };
}
