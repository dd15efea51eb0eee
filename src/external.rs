use crate::command::{InputStream, OutputStream};
use crate::env::Environment;
use crate::error::{Result, ShellError};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

/// Command that is not a builtin, resolved to an executable path.
#[derive(Debug)]
pub struct ExternalCommand {
    name: String,
    program: OsString,
    args: Vec<OsString>,
}

impl ExternalCommand {
    /// Look `name` up the way a shell would (see [`find_command_path`]).
    pub fn resolve(env: &Environment, name: &str, args: &[String]) -> Result<Self> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(OsStr::new(&search_paths), Path::new(name))
            .ok_or_else(|| ShellError::not_found(name))?;
        Ok(Self {
            name: name.to_string(),
            program: program.as_os_str().to_owned(),
            args: args.iter().map(OsString::from).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the process wired to the given streams; stderr is inherited.
    ///
    /// The streams are consumed: once this returns, the child holds the only
    /// copies of the descriptors the shell handed over.
    pub fn spawn(self, stdin: InputStream, stdout: OutputStream, env: &Environment) -> Result<Child> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(stdin.stdio())
            .stdout(stdout.stdio())
            .envs(env.vars.iter())
            .spawn()
            .map_err(|e| ShellError::Resolution(format!("{}: {e}", self.name)))?;
        Ok(child)
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it exists.
/// - Relative with multiple components (e.g., `bin/sh`): returns it if it exists.
/// - `./foo`: returns it if it exists.
/// - Single path component (no separators): search each directory in `search_paths` (PATH)
///   and return the first existing match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, None) => None,
        (Some(x), None) => find_in_path(search_paths, x.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|candidate| is_executable(candidate))
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock_current_dir;
    use std::fs::{self, File};

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    #[test]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr("/bin"), path).expect("Expected to find /bin/sh");
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    fn absolute_nonexisting() {
        let res = find_command_path(osstr("/bin"), Path::new("/bin/nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nonexistent_dir:/bin"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found.as_ref(), Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let res = find_command_path(osstr("/bin"), Path::new("nonexisting"));
        assert!(res.is_none());
    }

    #[test]
    fn non_executable_file_in_path_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("plain")).unwrap();
        let res = find_command_path(dir.path().as_os_str(), Path::new("plain"));
        assert!(res.is_none());
    }

    #[test]
    fn multiple_components_relative_existing() {
        let _lock = lock_current_dir();
        let cwd_before = std::env::current_dir().expect("cwd");
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("bin")).unwrap();
        File::create(tmp.path().join("bin").join("sh")).unwrap();

        std::env::set_current_dir(tmp.path()).expect("set cwd");
        let res = find_command_path(osstr("/does/not/matter"), Path::new("bin/sh"))
            .map(|p| p.into_owned());
        let dot = find_command_path(osstr("/does/not/matter"), Path::new("./bin"))
            .map(|p| p.into_owned());
        std::env::set_current_dir(&cwd_before).ok();

        assert_eq!(res, Some(PathBuf::from("bin/sh")));
        assert_eq!(dot, Some(PathBuf::from("./bin")));
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("")).is_none());
    }

    #[test]
    fn resolve_unknown_command_is_a_resolution_error() {
        let env = Environment::new();
        let err = ExternalCommand::resolve(&env, "no_such_command_for_minishell", &[]).unwrap_err();
        assert_eq!(err.exit_code(), 127);
        assert_eq!(err.to_string(), "command not found: no_such_command_for_minishell");
    }

    #[test]
    fn spawn_wires_streams() {
        let env = Environment::new();
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.txt");
        let out = File::create(&out_path).unwrap();

        let cmd = ExternalCommand::resolve(&env, "wc", &["-c".to_string()]).unwrap();
        let input = tempfile::tempfile().unwrap();
        let mut child = cmd
            .spawn(Box::new(input), Box::new(out), &env)
            .unwrap();
        assert!(child.wait().unwrap().success());
        assert_eq!(fs::read_to_string(&out_path).unwrap().trim(), "0");
    }
}
