use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Abstraction over a readable input stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// Implementors are the shell's own standard input, an opened redirection file
/// or the read end of a pipe. A blanket implementation exists for any type that
/// implements `Read` and `Into<Stdio>`.
pub trait Stdin: Read {
    /// Convert this input into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Read + Into<Stdio>> Stdin for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Abstraction over a writable output stream that can also be converted into
/// a [`Stdio`] handle for spawning external processes.
///
/// A blanket implementation exists for any type that implements `Write` and `Into<Stdio>`.
pub trait Stdout: Write {
    /// Convert this output into a [`Stdio`] handle suitable for `std::process::Command`.
    fn stdio(self: Box<Self>) -> Stdio;
}

impl<T: Write + Into<Stdio>> Stdout for T {
    fn stdio(self: Box<Self>) -> Stdio {
        (*self).into()
    }
}

/// Owned input end handed to exactly one stage. Dropping it closes the handle.
pub type InputStream = Box<dyn Stdin + Send>;

/// Owned output end handed to exactly one stage. Dropping it closes the handle.
pub type OutputStream = Box<dyn Stdout + Send>;

/// Connective in front of a logical command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// First command of a line.
    None,
    /// `&&`: run only if the previous command succeeded.
    And,
    /// `||`: run only if the previous command failed.
    Or,
}

impl Operator {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "&&" => Some(Operator::And),
            "||" => Some(Operator::Or),
            _ => None,
        }
    }
}

/// One pipeline of a line together with the operator that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalCommand {
    pub text: String,
    pub operator: Operator,
}

/// One command of a pipe-delimited sequence, with redirections stripped out of `argv`.
///
/// Redirection targets are kept as paths; they are opened by
/// [`crate::redirect::Redirections::open`] right before the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Stage {
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn is_builtin(&self) -> bool {
        crate::builtin::is_builtin(self.name())
    }
}
