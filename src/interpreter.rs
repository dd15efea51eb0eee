use crate::command::{ExitCode, Operator};
use crate::env::Environment;
use crate::error::Result;
use crate::parser;
use crate::pipeline::{Orchestrator, Terminal};
use crate::registry::ProcessRegistry;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, IsTerminal};

/// A minimal shell: logical operators, pipelines, redirections and a few builtins.
///
/// The interpreter owns the captured [`Environment`], the [`ProcessRegistry`] of
/// the pipeline currently running and the [`Terminal`] streams pipelines fall
/// back to.
///
/// Example
/// ```
/// use minishell::Interpreter;
/// let sh = Interpreter::default();
/// assert_eq!(sh.execute_line("echo hello world"), 0);
/// assert_eq!(sh.execute_line("cd /nonexistent/dir && echo unreachable"), 1);
/// ```
pub struct Interpreter {
    env: Environment,
    registry: ProcessRegistry,
    terminal: Terminal,
}

impl Interpreter {
    pub fn new(env: Environment, registry: ProcessRegistry, terminal: Terminal) -> Self {
        Self {
            env,
            registry,
            terminal,
        }
    }

    /// The registry a [`crate::SignalRelay`] should forward interrupts to.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run one logical command (a pipeline) and return its outcome.
    pub fn run_logical(&self, text: &str) -> Result<()> {
        let stages = parser::split_pipeline(text)?;
        Orchestrator::new(&self.env, &self.registry, &self.terminal).run(&stages)
    }

    /// Expand, split and execute one input line.
    ///
    /// Logical commands run left to right. After a failure the rest of the line
    /// is skipped if the next operator is `&&`; after a success it is skipped
    /// if the next operator is `||`. Errors are reported on stderr and the
    /// status of the last command that ran is returned.
    pub fn execute_line(&self, line: &str) -> ExitCode {
        let line = self.env.expand(line.trim());
        let commands = match parser::split_logical(&line) {
            Ok(commands) => commands,
            Err(e) => {
                eprintln!("err: {e}");
                return e.exit_code();
            }
        };

        let mut status = 0;
        for (idx, command) in commands.iter().enumerate() {
            let outcome = self.run_logical(&command.text);
            status = match &outcome {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("err: {e}");
                    e.exit_code()
                }
            };

            let next_op = commands.get(idx + 1).map(|next| next.operator);
            match (outcome.is_ok(), next_op) {
                (false, Some(Operator::And)) | (true, Some(Operator::Or)) => break,
                _ => {}
            }
        }
        status
    }

    /// Execute every line of `input` and return the status of the last one.
    ///
    /// Bytes that are not valid UTF-8 are replaced rather than rejected. A read
    /// error is reported and ends the input like end-of-file does.
    pub fn run_script(&self, mut input: impl BufRead) -> ExitCode {
        let mut status = 0;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match input.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    eprintln!("err: {e}");
                    break;
                }
            }
            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            status = self.execute_line(&line);
        }
        status
    }

    /// Read-Eval-Print Loop over the shell's standard input.
    ///
    /// On a terminal the line editor shows `prompt`; Ctrl-C drops the line being
    /// typed and Ctrl-D ends the session. Otherwise lines are read silently
    /// until end-of-input.
    pub fn repl(&self, prompt: &str) -> anyhow::Result<ExitCode> {
        if !io::stdin().is_terminal() {
            return Ok(self.run_script(io::stdin().lock()));
        }

        let mut rl = DefaultEditor::new()?;
        let mut status = 0;
        loop {
            match rl.readline(prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        status = self.execute_line(&line);
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(ReadlineError::Io(err)) => {
                    eprintln!("err: {err}");
                    break;
                }
                Err(err) => eprintln!("err: {err}"),
            }
        }
        Ok(status)
    }
}

impl Default for Interpreter {
    /// Interpreter over the process environment and the shell's own stdin/stdout.
    fn default() -> Self {
        Self::new(Environment::new(), ProcessRegistry::new(), Terminal::inherit())
    }
}
