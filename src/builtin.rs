use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use anyhow::{Context, Result, anyhow, bail};
use argh::{EarlyExit, FromArgs};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::env;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    const NAME: &'static str;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode>;
}

const BUILTINS: [&str; 5] = [Cd::NAME, Pwd::NAME, Echo::NAME, Kill::NAME, Ps::NAME];

/// Whether `name` is dispatched in-process rather than looked up on `PATH`.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Run the builtin named by `argv[0]` against the given streams.
///
/// A non-zero status, a rejected argument list and a failure inside the command
/// all come back as [`ShellError::Builtin`].
pub fn run(
    argv: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &Environment,
) -> Result<(), ShellError> {
    let (name, args) = match argv.split_first() {
        Some((name, args)) => (name.as_str(), args),
        None => return Err(ShellError::Builtin("empty builtin invocation".into())),
    };
    let code = match name {
        Cd::NAME => invoke::<Cd>(args, stdin, stdout, env),
        Pwd::NAME => invoke::<Pwd>(args, stdin, stdout, env),
        Echo::NAME => invoke::<Echo>(args, stdin, stdout, env),
        Kill::NAME => invoke::<Kill>(args, stdin, stdout, env),
        Ps::NAME => invoke::<Ps>(args, stdin, stdout, env),
        other => return Err(ShellError::Builtin(format!("unknown built-in: {other}"))),
    }?;
    stdout.flush()?;
    match code {
        0 => Ok(()),
        code => Err(ShellError::Builtin(format!("{name}: exit status {code}"))),
    }
}

fn invoke<T: BuiltinCommand>(
    args: &[String],
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &Environment,
) -> Result<ExitCode, ShellError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match T::from_args(&[T::NAME], &args) {
        Ok(cmd) => cmd
            .execute(stdin, stdout, env)
            .map_err(|e| ShellError::Builtin(format!("{e:#}"))),
        Err(EarlyExit {
            output,
            status: Ok(()),
        }) => {
            stdout.write_all(output.as_bytes())?;
            Ok(0)
        }
        Err(EarlyExit {
            output,
            status: Err(()),
        }) => Err(ShellError::Builtin(format!("{}: {}", T::NAME, output.trim_end()))),
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {
    #[argh(positional, greedy)]
    /// ignored.
    pub rest: Vec<String>,
}

impl BuiltinCommand for Pwd {
    const NAME: &'static str = "pwd";

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let dir = env::current_dir().context("pwd: can't read current directory")?;
        writeln!(stdout, "{}", dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional, greedy)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    /// Anything after the first directory is ignored.
    pub targets: Vec<String>,
}

impl BuiltinCommand for Cd {
    const NAME: &'static str = "cd";

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let target = match self.targets.into_iter().next() {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("cd: no target and HOME not set"),
            },
        };

        env::set_current_dir(&target)
            .with_context(|| format!("cd: can't chdir to {}", target.display()))?;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces and followed by
/// a newline. Every argument is printed as given, including ones that look
/// like flags.
pub struct Echo {
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|arg| arg.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    const NAME: &'static str = "echo";

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// send SIGTERM to the process with the given id.
pub struct Kill {
    #[argh(positional, greedy)]
    /// id of the process to terminate; further ids are ignored.
    pub pids: Vec<String>,
}

impl BuiltinCommand for Kill {
    const NAME: &'static str = "kill";

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        _env: &Environment,
    ) -> Result<ExitCode> {
        let raw = self
            .pids
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("kill: pid required"))?;
        let pid: i32 = raw
            .parse()
            .with_context(|| format!("kill: invalid pid '{raw}'"))?;
        // 0 and negative ids address process groups, the shell's own included.
        if pid <= 0 {
            bail!("kill: invalid pid '{raw}'");
        }
        kill(Pid::from_raw(pid), Signal::SIGTERM).with_context(|| format!("kill: ({pid})"))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// report a snapshot of the current processes.
pub struct Ps {}

impl BuiltinCommand for Ps {
    const NAME: &'static str = "ps";

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &Environment,
    ) -> Result<ExitCode> {
        let mut child = Command::new("ps")
            .envs(env.vars.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .context("ps: can't start process listing")?;
        let copied = match child.stdout.take() {
            Some(mut listing) => io::copy(&mut listing, stdout).map(|_| ()),
            None => Ok(()),
        };
        let status = child.wait().context("ps: wait failed")?;
        copied.context("ps: can't write listing")?;
        if !status.success() {
            bail!("ps: {status}");
        }
        Ok(0)
    }
}
