//! A miniature interactive command shell.
//!
//! A line is split on `&&` / `||` into logical commands, each logical command on
//! `|` into stages, and every stage is either one of the builtins (`cd`, `pwd`,
//! `echo`, `kill`, `ps`) or an external program found on `PATH`. Stages run
//! concurrently with their standard streams chained through OS pipes, and `<` /
//! `>` redirect a single stage from or to a file.
//!
//! The main entry point is [`Interpreter`]. A [`SignalRelay`] forwards Ctrl-C to
//! the processes of the running pipeline instead of killing the shell.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod parser;
mod pipeline;
pub mod redirect;
mod registry;
mod signal;

pub use error::ShellError;
pub use interpreter::Interpreter;
pub use pipeline::{Orchestrator, Terminal};
pub use registry::ProcessRegistry;
pub use signal::SignalRelay;

/// Serializes tests that change the process-wide working directory.
#[cfg(test)]
pub(crate) fn lock_current_dir() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
