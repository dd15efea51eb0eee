use crate::command::Stage;
use crate::error::{Result, ShellError};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const REDIRECT_IN: &str = "<";
const REDIRECT_OUT: &str = ">";

/// Strip `<` / `>` redirections out of one stage's tokens.
///
/// Every other token is kept in order. When a direction is redirected more than
/// once the last target wins. A stage left without a command name is rejected.
pub fn parse_redirections(tokens: &[&str]) -> Result<Stage> {
    let mut argv = Vec::new();
    let mut input = None;
    let mut output = None;

    let mut iter = tokens.iter();
    while let Some(&token) = iter.next() {
        let slot = match token {
            REDIRECT_IN => &mut input,
            REDIRECT_OUT => &mut output,
            _ => {
                argv.push(token.to_string());
                continue;
            }
        };
        let target = iter
            .next()
            .ok_or_else(|| ShellError::syntax(format!("expected a file after '{token}'")))?;
        *slot = Some(PathBuf::from(target));
    }

    if argv.is_empty() {
        return Err(ShellError::syntax("redirection without a command"));
    }

    Ok(Stage {
        argv,
        input,
        output,
    })
}

/// Files opened for one stage's redirections.
///
/// `None` means the stage keeps whatever its position in the pipeline gives it.
/// The handles close when this value (or the stream built from it) is dropped.
#[derive(Debug, Default)]
pub struct Redirections {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
}

impl Redirections {
    /// Open the stage's redirection targets relative to the current directory.
    pub fn open(stage: &Stage) -> Result<Self> {
        Ok(Self {
            stdin: stage.input.as_deref().map(open_input).transpose()?,
            stdout: stage.output.as_deref().map(create_output).transpose()?,
        })
    }
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| ShellError::Resolution(format!("{}: {e}", path.display())))
}

fn create_output(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| ShellError::Resolution(format!("{}: {e}", path.display())))
}
