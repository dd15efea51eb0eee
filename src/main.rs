use argh::FromArgs;
use minishell::{Interpreter, SignalRelay};
use std::process::ExitCode;

#[derive(FromArgs)]
/// A miniature command shell with pipelines, redirections and `&&` / `||`.
struct Args {
    #[argh(option, short = 'c')]
    /// execute this line and exit with its status.
    command: Option<String>,

    #[argh(option, default = "String::from(\"> \")")]
    /// prompt shown when reading from a terminal.
    prompt: String,
}

fn main() -> anyhow::Result<ExitCode> {
    let args: Args = argh::from_env();
    let sh = Interpreter::default();
    SignalRelay::new(sh.registry().clone()).install()?;

    let status = match args.command {
        Some(line) => sh.execute_line(&line),
        None => sh.repl(&args.prompt)?,
    };
    Ok(ExitCode::from(u8::try_from(status & 0xff).unwrap_or(1)))
}
