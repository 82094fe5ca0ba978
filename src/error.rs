use std::io;

use thiserror::Error;

use crate::jobs::JobTableError;

/// Everything that can go wrong while evaluating a command line.
///
/// The `Display` text is exactly the one-line message shown to the user.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{command} command requires PID or %jobid argument")]
    MissingJobArgument { command: &'static str },

    #[error("{command}: argument must be a PID or %jobid")]
    InvalidJobArgument { command: &'static str },

    #[error("%{0}: No such job")]
    NoSuchJob(usize),

    #[error("({0}): No such process")]
    NoSuchProcess(libc::pid_t),

    #[error(transparent)]
    JobTable(#[from] JobTableError),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("{path}: {source}")]
    Redirect { path: String, source: io::Error },

    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),

    #[error("pipe error: {0}")]
    Pipe(io::Error),

    #[error("fork error: {0}")]
    Fork(io::Error),

    #[error("waitpid error: {0}")]
    Wait(io::Error),

    #[error("{context}: {source}")]
    Signal {
        context: &'static str,
        source: io::Error,
    },

    #[error("fgets error: {0}")]
    Input(io::Error),
}

impl ShellError {
    /// Wrap a failure of the signal plumbing.
    pub fn signal(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Signal { context, source }
    }

    /// Fatal errors end the shell; everything else is reported and the
    /// read/eval loop carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Signal { .. } | Self::Input(_))
    }
}
