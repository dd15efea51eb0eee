//! Splitting a line into logical commands and a command into pipeline stages.
//!
//! Tokens are whitespace separated; there is no quoting. The grammar is
//!
//! ```text
//! line    := command (("&&" | "||") command)*
//! command := stage ("|" stage)*
//! stage   := token+          (with `<` / `>` followed by a filename)
//! ```

use crate::command::{LogicalCommand, Operator, Stage};
use crate::error::{Result, ShellError};
use crate::redirect;

const PIPE: char = '|';

/// Split a (trimmed, already expanded) line on `&&` and `||` tokens.
///
/// Each command is tagged with the operator that precedes it; the first one gets
/// [`Operator::None`]. A whitespace-only line yields no commands. An operator
/// without a command on one of its sides is a syntax error.
pub fn split_logical(line: &str) -> Result<Vec<LogicalCommand>> {
    let mut result = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut last_op = Operator::None;

    for token in line.split_whitespace() {
        match Operator::from_token(token) {
            Some(op) => {
                if current.is_empty() {
                    return Err(ShellError::syntax(format!("expected a command before '{token}'")));
                }
                result.push(LogicalCommand {
                    text: current.join(" "),
                    operator: last_op,
                });
                current.clear();
                last_op = op;
            }
            None => current.push(token),
        }
    }

    if !current.is_empty() {
        result.push(LogicalCommand {
            text: current.join(" "),
            operator: last_op,
        });
    } else if last_op != Operator::None {
        return Err(ShellError::syntax("expected a command after the last operator"));
    }

    Ok(result)
}

/// Split one logical command on `|` and strip redirections from each stage.
///
/// Segments that are empty after trimming are skipped, so a blank command gives
/// an empty pipeline. Whether a stage is a builtin is decided by its first
/// token; external names are resolved only when the pipeline starts.
pub fn split_pipeline(text: &str) -> Result<Vec<Stage>> {
    text.split(PIPE)
        .map(|segment| segment.split_whitespace().collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .map(|tokens| redirect::parse_redirections(&tokens))
        .collect()
}
