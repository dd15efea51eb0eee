//! Running the stages of one logical command as a connected pipeline.

use crate::builtin;
use crate::command::{InputStream, OutputStream, Stage};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use crate::external::ExternalCommand;
use crate::redirect::Redirections;
use crate::registry::ProcessRegistry;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::wait::{self, Id, WaitPidFlag};
use nix::unistd::{self, Pid};
use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::process::{Child, ExitStatus};
use std::thread::{self, ScopedJoinHandle};

/// Streams a pipeline falls back to at its two ends when they are not redirected.
///
/// Defaults to the shell's own standard input and output. Supplying files makes
/// every later pipeline read from / write to a duplicate of them.
#[derive(Debug, Default)]
pub struct Terminal {
    stdin: Option<File>,
    stdout: Option<File>,
}

impl Terminal {
    pub fn inherit() -> Self {
        Self::default()
    }

    pub fn with_stdin(mut self, file: File) -> Self {
        self.stdin = Some(file);
        self
    }

    pub fn with_stdout(mut self, file: File) -> Self {
        self.stdout = Some(file);
        self
    }

    fn input(&self) -> io::Result<InputStream> {
        let stream: InputStream = match &self.stdin {
            Some(file) => Box::new(file.try_clone()?),
            // `Stdin` has no `Stdio` conversion; hand out a duplicate of fd 0.
            None => Box::new(File::from(io::stdin().as_fd().try_clone_to_owned()?)),
        };
        Ok(stream)
    }

    fn output(&self) -> io::Result<OutputStream> {
        let stream: OutputStream = match &self.stdout {
            Some(file) => Box::new(file.try_clone()?),
            None => Box::new(io::stdout()),
        };
        Ok(stream)
    }
}

/// What a stage turned into once its name was looked at.
enum Program<'a> {
    Builtin(&'a [String]),
    External(ExternalCommand),
}

/// A stage that has been started and must be waited on.
enum Running<'scope> {
    Builtin {
        name: String,
        handle: ScopedJoinHandle<'scope, Result<()>>,
    },
    External {
        name: String,
        child: Child,
    },
}

/// Starts pipelines and waits for them.
pub struct Orchestrator<'a> {
    env: &'a Environment,
    registry: &'a ProcessRegistry,
    terminal: &'a Terminal,
}

impl<'a> Orchestrator<'a> {
    pub fn new(env: &'a Environment, registry: &'a ProcessRegistry, terminal: &'a Terminal) -> Self {
        Self {
            env,
            registry,
            terminal,
        }
    }

    /// Execute `stages` connected by pipes and return the pipeline's outcome.
    ///
    /// A single builtin runs on the calling thread without any pipe. Otherwise
    /// every stage runs concurrently; a failing stage never stops its siblings
    /// and every started stage is waited on. When several stages fail the last
    /// failure is returned and the earlier ones are reported on stderr.
    pub fn run(&self, stages: &[Stage]) -> Result<()> {
        match stages {
            [] => Ok(()),
            [stage] if stage.is_builtin() => self.run_builtin(stage),
            _ => self.run_pipeline(stages),
        }
    }

    fn run_builtin(&self, stage: &Stage) -> Result<()> {
        // The input file is still opened so that a bad `<` target is reported,
        // but no builtin reads its standard input.
        let redirects = Redirections::open(stage)?;
        let mut stdout: OutputStream = match redirects.stdout {
            Some(file) => Box::new(file),
            None => self.terminal.output()?,
        };
        builtin::run(&stage.argv, &mut io::empty(), &mut stdout, self.env)
    }

    fn run_pipeline(&self, stages: &[Stage]) -> Result<()> {
        // Everything that can fail without side effects on other processes is
        // done before the first stage starts.
        let prepared = stages
            .iter()
            .map(|stage| self.prepare(stage))
            .collect::<Result<Vec<_>>>()?;

        self.registry.clear();
        let last = prepared.len() - 1;
        let outcome = thread::scope(|scope| {
            let mut running = Vec::with_capacity(prepared.len());
            let mut failure = None;
            let mut upstream: Option<File> = None;

            for (index, (program, redirects)) in prepared.into_iter().enumerate() {
                let (next_upstream, downstream) = if index < last {
                    match pipe() {
                        Ok((read, write)) => (Some(read), Some(write)),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                } else {
                    (None, None)
                };

                let streams = self.wire(redirects, upstream.take(), downstream);
                upstream = next_upstream;
                let (stdin, stdout) = match streams {
                    Ok(streams) => streams,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };

                match program {
                    Program::Builtin(argv) => {
                        let env = self.env;
                        let handle = scope.spawn(move || {
                            let (mut stdin, mut stdout) = (stdin, stdout);
                            builtin::run(argv, &mut stdin, &mut stdout, env)
                        });
                        running.push(Running::Builtin {
                            name: argv[0].clone(),
                            handle,
                        });
                    }
                    Program::External(cmd) => {
                        let name = cmd.name().to_string();
                        match cmd.spawn(stdin, stdout, self.env) {
                            Ok(child) => {
                                self.registry.register(child.id());
                                running.push(Running::External { name, child });
                            }
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                }
            }
            // A read end prepared for a stage that never started.
            drop(upstream);

            let mut errors = self.wait_all(running);
            errors.extend(failure);
            errors
        });
        self.registry.clear();

        let mut errors = outcome;
        match errors.pop() {
            None => Ok(()),
            Some(last_error) => {
                for e in errors {
                    eprintln!("err: {e}");
                }
                Err(last_error)
            }
        }
    }

    fn prepare<'s>(&self, stage: &'s Stage) -> Result<(Program<'s>, Redirections)> {
        let program = if stage.is_builtin() {
            Program::Builtin(&stage.argv)
        } else {
            Program::External(ExternalCommand::resolve(self.env, stage.name(), stage.args())?)
        };
        Ok((program, Redirections::open(stage)?))
    }

    /// Pick the streams of one stage: an explicit redirection beats the pipe,
    /// the pipe beats the terminal. An end that loses is closed right away.
    fn wire(
        &self,
        redirects: Redirections,
        upstream: Option<File>,
        downstream: Option<File>,
    ) -> Result<(InputStream, OutputStream)> {
        let stdin: InputStream = match (redirects.stdin, upstream) {
            (Some(file), _) => Box::new(file),
            (None, Some(read)) => Box::new(read),
            (None, None) => self.terminal.input()?,
        };
        let stdout: OutputStream = match (redirects.stdout, downstream) {
            (Some(file), _) => Box::new(file),
            (None, Some(write)) => Box::new(write),
            (None, None) => self.terminal.output()?,
        };
        Ok((stdin, stdout))
    }

    fn wait_all(&self, running: Vec<Running<'_>>) -> Vec<ShellError> {
        let mut errors = Vec::new();
        for stage in running {
            match stage {
                Running::Builtin { name, handle } => match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(_) => errors.push(ShellError::Builtin(format!("{name}: panicked"))),
                },
                Running::External { name, mut child } => {
                    match self.reap(&mut child) {
                        Ok(status) if status.success() => {}
                        Ok(status) => errors.push(ShellError::Process { name, status }),
                        Err(e) => errors.push(ShellError::Io(e)),
                    }
                }
            }
        }
        errors
    }

    /// Wait for `child` and drop it from the registry before its pid is freed.
    ///
    /// The exited child stays a zombie until it is out of the registry, so an
    /// interrupt forwarded in between can never reach a recycled pid.
    fn reap(&self, child: &mut Child) -> io::Result<ExitStatus> {
        let id = child.id();
        let pid = i32::try_from(id).map(Pid::from_raw).map_err(io::Error::other)?;
        let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT;
        let peeked = loop {
            match wait::waitid(Id::Pid(pid), flags) {
                Err(Errno::EINTR) => continue,
                other => break other,
            }
        };
        self.registry.remove(id);
        peeked?;
        child.wait()
    }
}

/// A close-on-exec pipe, so that only the child an end is handed to keeps it open.
fn pipe() -> Result<(File, File)> {
    let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
    Ok((File::from(read), File::from(write)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::split_pipeline;
    use std::fs;
    use std::io::{Read, Seek};
    use std::time::{Duration, Instant};

    struct Harness {
        env: Environment,
        registry: ProcessRegistry,
        terminal: Terminal,
        out: File,
    }

    impl Harness {
        fn new() -> Self {
            let out = tempfile::tempfile().unwrap();
            let terminal = Terminal::inherit()
                .with_stdin(tempfile::tempfile().unwrap())
                .with_stdout(out.try_clone().unwrap());
            Self {
                env: Environment::new(),
                registry: ProcessRegistry::new(),
                terminal,
                out,
            }
        }

        fn run(&self, text: &str) -> Result<()> {
            let stages = split_pipeline(text)?;
            Orchestrator::new(&self.env, &self.registry, &self.terminal).run(&stages)
        }

        fn output(&mut self) -> String {
            let mut s = String::new();
            self.out.rewind().unwrap();
            self.out.read_to_string(&mut s).unwrap();
            s
        }
    }

    #[test]
    fn empty_pipeline_succeeds() {
        let mut h = Harness::new();
        assert!(h.run("   ").is_ok());
        assert_eq!(h.output(), "");
    }

    #[test]
    fn builtin_output_crosses_a_pipe() {
        let mut h = Harness::new();
        h.run("echo one two three | wc -w").unwrap();
        assert_eq!(h.output().trim(), "3");
    }

    #[test]
    fn external_to_external() {
        let mut h = Harness::new();
        h.run("echo a b | cat | wc -c").unwrap();
        assert_eq!(h.output().trim(), "4");
    }

    #[test]
    fn external_into_builtin_stage() {
        let mut h = Harness::new();
        h.run("true | echo done").unwrap();
        assert_eq!(h.output(), "done\n");
    }

    #[test]
    fn single_builtin_redirected_to_file() {
        let mut h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        h.run(&format!("echo hello > {}", path.display())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(h.output(), "");
    }

    #[test]
    fn redirection_inside_pipeline_is_per_stage() {
        let mut h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.txt");
        h.run(&format!("echo foo > {} | wc -c", path.display())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "foo\n");
        assert_eq!(h.output().trim(), "0");
    }

    #[test]
    fn input_redirection_feeds_first_stage() {
        let mut h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "x\ny\nz\n").unwrap();
        h.run(&format!("cat < {} | wc -l", path.display())).unwrap();
        assert_eq!(h.output().trim(), "3");
    }

    #[test]
    fn failing_stage_does_not_stop_siblings() {
        let mut h = Harness::new();
        let err = h.run("false | echo still").unwrap_err();
        assert!(matches!(err, ShellError::Process { ref name, .. } if name == "false"));
        assert_eq!(h.output(), "still\n");
        assert!(h.registry.is_empty());
    }

    #[test]
    fn single_builtin_ignores_redirected_input() {
        let mut h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        fs::write(&path, "unused\n").unwrap();
        h.run(&format!("echo kept < {}", path.display())).unwrap();
        assert_eq!(h.output(), "kept\n");

        let err = h.run("echo lost < /nonexistent/minishell/input").unwrap_err();
        assert!(matches!(err, ShellError::Resolution(_)));
    }

    #[test]
    fn unknown_command_starts_nothing() {
        let mut h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.txt");
        let err = h
            .run(&format!("echo hi | no_such_command_for_minishell | cat > {}", path.display()))
            .unwrap_err();
        assert_eq!(err.exit_code(), 127);
        assert_eq!(h.output(), "");
        assert!(!path.exists());
        assert!(h.registry.is_empty());
    }

    #[test]
    fn unreadable_input_is_reported() {
        let h = Harness::new();
        let err = h.run("cat < /nonexistent/minishell/input | wc").unwrap_err();
        assert!(matches!(err, ShellError::Resolution(_)));
    }

    #[test]
    fn builtin_error_fails_the_pipeline() {
        let h = Harness::new();
        let err = h.run("kill | cat").unwrap_err();
        assert!(matches!(err, ShellError::Builtin(_)));
    }

    #[test]
    fn interrupting_the_registry_ends_a_running_stage() {
        let h = Harness::new();
        let registry = h.registry.clone();
        let started = Instant::now();
        let interrupter = thread::spawn(move || {
            while registry.is_empty() {
                thread::sleep(Duration::from_millis(10));
            }
            registry.signal_all(nix::sys::signal::Signal::SIGINT);
        });

        let err = h.run("sleep 10 | cat").unwrap_err();
        interrupter.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(9));
        assert_eq!(err.exit_code(), 128 + nix::sys::signal::Signal::SIGINT as i32);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn inherited_terminal_runs_pipelines() {
        let env = Environment::new();
        let registry = ProcessRegistry::new();
        let terminal = Terminal::inherit();
        let sh = Orchestrator::new(&env, &registry, &terminal);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lines.txt");
        fs::write(&path, "a\nb\n").unwrap();

        let count = dir.path().join("count.txt");

        sh.run(&split_pipeline("true | true").unwrap()).unwrap();
        sh.run(&split_pipeline(&format!("echo piped | wc -c > {}", count.display())).unwrap())
            .unwrap();
        assert_eq!(fs::read_to_string(&count).unwrap().trim(), "6");
        sh.run(&split_pipeline(&format!("cat < {} | wc -l", path.display())).unwrap()).unwrap();
        sh.run(&split_pipeline("pwd").unwrap()).unwrap();
    }

    #[test]
    fn reaped_child_leaves_the_registry() {
        let h = Harness::new();
        let orchestrator = Orchestrator::new(&h.env, &h.registry, &h.terminal);
        let mut child = std::process::Command::new("true").spawn().unwrap();
        h.registry.register(child.id());

        let status = orchestrator.reap(&mut child).unwrap();
        assert!(status.success());
        assert!(h.registry.is_empty());
    }

    #[test]
    fn read_only_pipeline_is_repeatable() {
        let mut h = Harness::new();
        h.run("echo same words | wc -w").unwrap();
        let first = h.output();
        h.run("echo same words | wc -w").unwrap();
        let both = h.output();
        assert_eq!(both, format!("{first}{first}"));
    }
}
