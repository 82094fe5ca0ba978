use std::cell::UnsafeCell;
use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

/// Maximum number of jobs tracked at any point in time.
pub const MAXJOBS: usize = 16;

/// Maximum retained length of a job's command text, in bytes.
pub const MAXLINE: usize = 1024;

/// The execution state of a tracked job.
///
/// At most one job is `Foreground` at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    /// The word used for this state in `jobs` reports.
    pub fn label(self) -> &'static str {
        match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Running",
            JobState::Stopped => "Stopped",
        }
    }
}

/// Command text stored inline so that jobs can be created and cleared
/// without touching the allocator (slots are cleared from signal handlers).
#[derive(Clone)]
pub struct CommandText {
    bytes: [u8; MAXLINE],
    len: usize,
}

impl CommandText {
    fn new(text: &str) -> Self {
        let mut end = text.len().min(MAXLINE);
        while !text.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0; MAXLINE];
        bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self { bytes, len: end }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn as_str(&self) -> &str {
        // Construction only ever cuts on a char boundary.
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}

impl fmt::Debug for CommandText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// One tracked child process. Its pid doubles as its process-group id.
#[derive(Debug, Clone)]
pub struct Job {
    pid: libc::pid_t,
    jid: usize,
    state: JobState,
    command: CommandText,
}

impl Job {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    pub fn jid(&self) -> usize {
        self.jid
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn command(&self) -> &CommandText {
        &self.command
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobTableError {
    #[error("invalid process id {0}")]
    InvalidPid(libc::pid_t),
    #[error("Tried to create too many jobs")]
    Full,
    #[error("job [{0}] is already in the foreground")]
    ForegroundTaken(usize),
}

/// Fixed-capacity registry of live jobs.
pub struct JobTable {
    slots: [Option<Job>; MAXJOBS],
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub const fn new() -> Self {
        const EMPTY: Option<Job> = None;
        Self {
            slots: [EMPTY; MAXJOBS],
        }
    }

    /// Empty a single slot.
    pub fn clear(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
        }
    }

    /// Empty every slot.
    pub fn initialize_all(&mut self) {
        for slot in 0..MAXJOBS {
            self.clear(slot);
        }
    }

    /// Smallest positive job id not currently in use, or `None` when every
    /// id in `1..=MAXJOBS` is taken.
    pub fn allocate_id(&self) -> Option<usize> {
        let mut taken = [false; MAXJOBS + 1];
        for job in self.occupied() {
            taken[job.jid] = true;
        }
        (1..=MAXJOBS).find(|&jid| !taken[jid])
    }

    pub fn is_full(&self) -> bool {
        self.count() >= MAXJOBS
    }

    /// Register a new job and return its job id. Fails without mutation.
    pub fn add(
        &mut self,
        pid: libc::pid_t,
        state: JobState,
        command: &str,
    ) -> Result<usize, JobTableError> {
        if pid < 1 {
            return Err(JobTableError::InvalidPid(pid));
        }
        if state == JobState::Foreground {
            if let Some(current) = self.foreground() {
                return Err(JobTableError::ForegroundTaken(current.jid));
            }
        }
        let jid = self.allocate_id().ok_or(JobTableError::Full)?;
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(JobTableError::Full)?;

        *slot = Some(Job {
            pid,
            jid,
            state,
            command: CommandText::new(command),
        });
        Ok(jid)
    }

    /// Remove the job with this pid. Returns whether one was found.
    pub fn remove(&mut self, pid: libc::pid_t) -> bool {
        if pid < 1 {
            return false;
        }
        match self.slot_of(pid) {
            Some(slot) => {
                self.clear(slot);
                true
            }
            None => false,
        }
    }

    /// Change a job's state. Refuses to create a second foreground job.
    pub fn set_state(&mut self, pid: libc::pid_t, state: JobState) -> Result<(), JobTableError> {
        if state == JobState::Foreground {
            if let Some(current) = self.foreground() {
                if current.pid != pid {
                    return Err(JobTableError::ForegroundTaken(current.jid));
                }
            }
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|job| job.pid == pid)
            .ok_or(JobTableError::InvalidPid(pid))?;
        job.state = state;
        Ok(())
    }

    pub fn find_by_pid(&self, pid: libc::pid_t) -> Option<&Job> {
        if pid < 1 {
            return None;
        }
        self.occupied().find(|job| job.pid == pid)
    }

    pub fn find_by_jid(&self, jid: usize) -> Option<&Job> {
        if jid < 1 {
            return None;
        }
        self.occupied().find(|job| job.jid == jid)
    }

    pub fn foreground(&self) -> Option<&Job> {
        self.occupied().find(|job| job.state == JobState::Foreground)
    }

    pub fn foreground_pid(&self) -> Option<libc::pid_t> {
        self.foreground().map(Job::pid)
    }

    pub fn jid_of(&self, pid: libc::pid_t) -> Option<usize> {
        self.find_by_pid(pid).map(Job::jid)
    }

    /// Write one `[jid] (pid) State command` line per job, in slot order.
    pub fn list_all(&self, out: &mut dyn Write) -> io::Result<()> {
        for job in self.occupied() {
            writeln!(
                out,
                "[{}] ({}) {} {}",
                job.jid,
                job.pid,
                job.state.label(),
                job.command.as_str()
            )?;
        }
        Ok(())
    }

    /// Number of occupied slots.
    pub fn count(&self) -> usize {
        self.occupied().count()
    }

    fn occupied(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }

    fn slot_of(&self, pid: libc::pid_t) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|job| job.pid == pid))
    }
}

// ── Process-wide table ──

/// The shell's one job table, shared between the main flow and the signal
/// handlers. Exclusive access comes from signal masking, not from a lock.
struct SharedTable(UnsafeCell<JobTable>);

// SAFETY: the shell is single-threaded; the only concurrency is signal
// delivery, which `with_shared` callers rule out by masking.
unsafe impl Sync for SharedTable {}

static SHARED: SharedTable = SharedTable(UnsafeCell::new(JobTable::new()));

/// Run `f` against the process-wide job table.
///
/// # Safety
///
/// No other access to the table may be live for the duration of `f`. The
/// caller is either a signal handler whose installed mask blocks every other
/// job-table handler, or the main flow holding those signals blocked (see
/// `signals::JobsLock`). Calls must not nest.
pub unsafe fn with_shared<R>(f: impl FnOnce(&mut JobTable) -> R) -> R {
    // SAFETY: exclusivity is the caller's contract.
    f(unsafe { &mut *SHARED.0.get() })
}
