//! The command launcher: everything between `fork` and `exec`.
//!
//! All allocation happens in [`prepare`], in the parent, before forking. The
//! child side only issues raw syscalls on data that already exists.

use std::ffi::{CString, c_char};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use os_pipe::{PipeReader, PipeWriter};

use crate::ast::{Pipeline, Stage};
use crate::error::ShellError;
use crate::redirect::RedirectTarget;
use crate::sio::SioBuf;
use crate::status;

/// Exit status of a child whose program could not be found.
const EXIT_NOT_FOUND: i32 = 127;
/// Exit status of a child whose program could not be executed.
const EXIT_CANNOT_EXEC: i32 = 126;

/// Where a redirected descriptor reads from or writes to.
enum FdSource {
    File(OwnedFd),
    Dup(libc::c_int),
}

struct PreparedStage {
    /// `argv[0]`, for diagnostics.
    name: CString,
    /// Resolved executable, or `None` if nothing on `PATH` matched.
    program: Option<CString>,
    _argv: Vec<CString>,
    /// Null-terminated pointers into `_argv`.
    argv_ptrs: Vec<*const c_char>,
    redirections: Vec<(libc::c_int, FdSource)>,
}

/// A pipeline with every resource the child needs already in hand.
///
/// Dropping it closes the parent's copies of files and pipes, which must
/// happen before the parent waits on the job.
pub struct PreparedJob {
    stages: Vec<PreparedStage>,
    pipes: Vec<(PipeReader, PipeWriter)>,
}

/// Resolve programs, open redirection files, and create pipes.
pub fn prepare(pipeline: &Pipeline) -> Result<PreparedJob, ShellError> {
    let stages = pipeline
        .stages
        .iter()
        .map(prepare_stage)
        .collect::<Result<Vec<_>, _>>()?;

    let pipes = (1..stages.len())
        .map(|_| os_pipe::pipe().map_err(ShellError::Pipe))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PreparedJob { stages, pipes })
}

fn prepare_stage(stage: &Stage) -> Result<PreparedStage, ShellError> {
    let argv = stage
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_str()).map_err(|_| ShellError::NulByte(arg.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let name = argv[0].clone();
    let program = resolve_program(&stage.argv[0])
        .and_then(|path| CString::new(path.into_os_string().into_vec()).ok());

    let mut redirections = Vec::with_capacity(stage.redirections.len());
    for redirection in &stage.redirections {
        let source = match &redirection.target {
            RedirectTarget::FileRead(path) => open(path, File::open(path))?,
            RedirectTarget::File(path) => open(path, File::create(path))?,
            RedirectTarget::FileAppend(path) => open(
                path,
                OpenOptions::new().append(true).create(true).open(path),
            )?,
            RedirectTarget::Fd(fd) => FdSource::Dup(*fd),
        };
        redirections.push((redirection.fd, source));
    }

    Ok(PreparedStage {
        name,
        program,
        _argv: argv,
        argv_ptrs,
        redirections,
    })
}

fn open(path: &str, result: std::io::Result<File>) -> Result<FdSource, ShellError> {
    result
        .map(|file| FdSource::File(file.into()))
        .map_err(|source| ShellError::Redirect {
            path: path.to_string(),
            source,
        })
}

/// A name containing `/` is used as given; anything else is looked up on
/// `PATH`.
fn resolve_program(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        return Some(PathBuf::from(name));
    }
    find_in_path(name)
}

/// Check if a path points to an executable file.
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = path.metadata() else {
        return false;
    };
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

/// Search PATH for an executable with the given name.
fn find_in_path(cmd: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
}

// ── Child side ──

/// Run the prepared job in the freshly forked child. Never returns.
pub fn run_child(job: &PreparedJob) -> ! {
    match job.stages.as_slice() {
        [stage] => exec_stage(stage, None, None, job),
        _ => run_pipeline(job),
    }
}

/// Fork one grandchild per stage, wire them together, and exit with the
/// last stage's status. The grandchildren share this process's group, so
/// group signals reach every stage.
fn run_pipeline(job: &PreparedJob) -> ! {
    let last = job.stages.len() - 1;
    let mut last_pid: libc::pid_t = 0;

    for (i, stage) in job.stages.iter().enumerate() {
        let stdin = (i > 0).then(|| job.pipes[i - 1].0.as_raw_fd());
        let stdout = (i < last).then(|| job.pipes[i].1.as_raw_fd());

        match unsafe { libc::fork() } {
            0 => exec_stage(stage, stdin, stdout, job),
            pid if pid < 0 => {
                report(stage, b"fork error");
                break;
            }
            pid => {
                if i == last {
                    last_pid = pid;
                }
            }
        }
    }

    close_inherited(job);

    let mut code = 1;
    loop {
        let mut raw_status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut raw_status, 0) };
        if pid < 0 {
            if errno::errno().0 == libc::EINTR {
                continue;
            }
            break;
        }
        if pid == last_pid {
            code = status::exit_code_from_wait_status(raw_status).unwrap_or(1);
        }
    }
    unsafe { libc::_exit(code) }
}

fn exec_stage(
    stage: &PreparedStage,
    stdin: Option<libc::c_int>,
    stdout: Option<libc::c_int>,
    job: &PreparedJob,
) -> ! {
    unsafe {
        if let Some(fd) = stdin {
            libc::dup2(fd, libc::STDIN_FILENO);
        }
        if let Some(fd) = stdout {
            libc::dup2(fd, libc::STDOUT_FILENO);
        }
        for (target, source) in &stage.redirections {
            let rc = match source {
                FdSource::File(file) => libc::dup2(file.as_raw_fd(), *target),
                FdSource::Dup(fd) => libc::dup2(*fd, *target),
            };
            if rc < 0 {
                report(stage, b"redirection failed");
                libc::_exit(1);
            }
        }
    }
    close_inherited(job);

    let Some(program) = &stage.program else {
        not_found(stage);
    };
    unsafe {
        libc::execv(program.as_ptr(), stage.argv_ptrs.as_ptr());
    }

    match errno::errno().0 {
        libc::ENOENT => not_found(stage),
        libc::EACCES => report(stage, b"Permission denied"),
        libc::ENOEXEC => report(stage, b"Exec format error"),
        libc::EISDIR => report(stage, b"Is a directory"),
        _ => report(stage, b"cannot execute"),
    }
    unsafe { libc::_exit(EXIT_CANNOT_EXEC) }
}

/// Close every pipe end and redirection file this process inherited. The
/// ones a stage needs have already been duplicated onto 0, 1, or 2.
fn close_inherited(job: &PreparedJob) {
    for (reader, writer) in &job.pipes {
        unsafe {
            libc::close(reader.as_raw_fd());
            libc::close(writer.as_raw_fd());
        }
    }
    for stage in &job.stages {
        for (target, source) in &stage.redirections {
            if let FdSource::File(file) = source {
                let fd = file.as_raw_fd();
                if fd != *target {
                    unsafe {
                        libc::close(fd);
                    }
                }
            }
        }
    }
}

fn not_found(stage: &PreparedStage) -> ! {
    report(stage, b"Command not found");
    unsafe { libc::_exit(EXIT_NOT_FOUND) }
}

fn report(stage: &PreparedStage, message: &[u8]) {
    let mut buf = SioBuf::new();
    buf.push_bytes(stage.name.as_bytes());
    buf.push_bytes(b": ");
    buf.push_bytes(message);
    buf.push_bytes(b"\n");
    buf.flush();
}
