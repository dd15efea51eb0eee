use regex::{Captures, Regex};
use std::collections::HashMap;
use std::env as stdenv;
use std::sync::OnceLock;

/// User-level view of the process environment used by the interpreter.
///
/// The working directory is not part of it: `cd` changes the process's own
/// working directory, which every later stage and redirection inherits.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
}

impl Environment {
    /// Capture the current process environment into a new `Environment` instance.
    pub fn new() -> Self {
        Self {
            vars: stdenv::vars().collect(),
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Substitute `$NAME` and `${NAME}` references in `line`.
    ///
    /// Unknown variables expand to the empty string, like an unset variable in
    /// a POSIX shell.
    pub fn expand(&self, line: &str) -> String {
        static PARAM: OnceLock<Regex> = OnceLock::new();
        let re = PARAM.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z0-9_]+)\}|\$([A-Za-z0-9_]+)").expect("valid regex")
        });
        re.replace_all(line, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            self.get_var(name).unwrap_or_default()
        })
        .into_owned()
    }
}
