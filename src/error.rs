use crate::command::ExitCode;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Everything that can make a logical command fail.
///
/// Only [`ShellError::Syntax`] is raised before anything has been started; the
/// other kinds are collected while a pipeline runs and become its outcome.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Malformed input, e.g. `>` without a filename or an empty `&&` operand.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// An external command that is not on `PATH`.
    #[error("command not found: {0}")]
    NotFound(String),

    /// A redirection target that cannot be opened or created, or a program
    /// that was found but cannot be started.
    #[error("{0}")]
    Resolution(String),

    /// A builtin rejected its arguments or failed while running.
    #[error("{0}")]
    Builtin(String),

    /// An external process exited unsuccessfully or was killed by a signal.
    #[error("{name}: {status}")]
    Process { name: String, status: ExitStatus },

    /// Pipe or file plumbing failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        ShellError::Syntax(msg.into())
    }

    pub fn not_found(name: &str) -> Self {
        ShellError::NotFound(name.to_string())
    }

    /// Shell-style exit status for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ShellError::Syntax(_) => 2,
            ShellError::NotFound(_) => 127,
            ShellError::Process { status, .. } => status_code(*status),
            _ => 1,
        }
    }
}

impl From<nix::Error> for ShellError {
    fn from(errno: nix::Error) -> Self {
        ShellError::Io(io::Error::from(errno))
    }
}

/// Exit code of a finished process, folding signal deaths into `128 + signal`.
pub fn status_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => code,
        None => terminated_by_signal(status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;
