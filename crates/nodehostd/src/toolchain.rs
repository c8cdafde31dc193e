//! Locating and querying the NodeJS toolchain.
//!
//! The host never bundles an interpreter; it finds `node` (and the package
//! managers) on `PATH` at call time. Command invocation goes through the
//! [`CommandRunner`] seam so tests can inject canned output without a real
//! toolchain installed.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

const TOOLCHAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::toolchain");

/// Executes external commands and captures their output.
///
/// The production implementation is [`SystemCommandRunner`]. Test code
/// implements this trait to return pre-scripted output.
pub trait CommandRunner {
    /// Runs `program` with `args`, optionally in `cwd`, capturing output.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the program cannot be spawned.
    fn capture(&self, program: &Path, args: &[&str], cwd: Option<&Path>) -> io::Result<Output>;

    /// Locates an executable by name, searching `PATH` by default.
    fn locate(&self, name: &str) -> Option<PathBuf> {
        find_on_path(name)
    }
}

/// Runs commands on the real system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn capture(&self, program: &Path, args: &[&str], cwd: Option<&Path>) -> io::Result<Output> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.output()
    }
}

/// Errors raised while locating or querying toolchain binaries.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// The executable was not found anywhere on `PATH`.
    #[error("could not find executable '{name}'")]
    NotFound {
        /// Binary name that was searched for.
        name: String,
    },

    /// The command could not be run or exited unsuccessfully.
    #[error("failed to execute '{command}'")]
    Exec {
        /// The command line that failed.
        command: String,
    },

    /// The command produced output that was not valid UTF-8.
    #[error("'{command}' produced non-UTF-8 output")]
    NonUtf8Output {
        /// The command line whose output was unreadable.
        command: String,
    },
}

/// Searches `PATH` for an executable with the given name.
#[must_use]
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if !candidate.is_file() {
            continue;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&candidate) {
                if meta.permissions().mode() & 0o111 != 0 {
                    return Some(candidate);
                }
            }
        }

        #[cfg(not(unix))]
        {
            return Some(candidate);
        }
    }
    None
}

/// The interpreter identity reported by the `about` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVersion {
    /// Absolute path of the interpreter binary.
    pub executable: String,
    /// Output of `node --version`, trimmed.
    pub version: String,
}

/// Locates `node` and asks it for its version.
///
/// # Errors
///
/// Returns [`ToolchainError`] when the binary is missing or the query fails.
pub fn node_version(runner: &impl CommandRunner) -> Result<NodeVersion, ToolchainError> {
    let node = runner.locate("node").ok_or_else(|| ToolchainError::NotFound {
        name: "node".to_string(),
    })?;
    let version = capture_stdout(runner, &node, &["--version"])?;
    Ok(NodeVersion {
        executable: node.to_string_lossy().into_owned(),
        version,
    })
}

/// Resolves a module name to a loadable file path via the interpreter's own
/// resolver.
///
/// # Errors
///
/// Returns [`ToolchainError`] when the single-shot resolution run fails,
/// which usually means the module is not installed.
pub fn locate_module(
    runner: &impl CommandRunner,
    node_bin: &Path,
    module: &str,
) -> Result<String, ToolchainError> {
    let script = format!("console.log(require.resolve('{module}'));");
    let resolved = capture_stdout(runner, node_bin, &["-e", &script])?;
    debug!(target: TOOLCHAIN_TARGET, module, resolved, "resolved run module");
    Ok(resolved)
}

/// Runs a command and returns its trimmed stdout, failing on non-zero exit.
fn capture_stdout(
    runner: &impl CommandRunner,
    program: &Path,
    args: &[&str],
) -> Result<String, ToolchainError> {
    let command = || {
        let mut rendered = program.to_string_lossy().into_owned();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    };

    let output = runner
        .capture(program, args, None)
        .map_err(|_| ToolchainError::Exec { command: command() })?;
    if !output.status.success() {
        return Err(ToolchainError::Exec { command: command() });
    }
    let stdout = String::from_utf8(output.stdout).map_err(|_| ToolchainError::NonUtf8Output {
        command: command(),
    })?;
    Ok(stdout.trim().to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Command runner returning pre-scripted output regardless of input.
    pub(crate) struct ScriptedRunner {
        pub stdout: Vec<u8>,
        pub status_code: i32,
    }

    impl ScriptedRunner {
        pub(crate) fn ok(stdout: impl Into<Vec<u8>>) -> Self {
            Self {
                stdout: stdout.into(),
                status_code: 0,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                stdout: Vec::new(),
                status_code: 1,
            }
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn capture(
            &self,
            _program: &Path,
            _args: &[&str],
            _cwd: Option<&Path>,
        ) -> io::Result<Output> {
            use std::os::unix::process::ExitStatusExt;

            Ok(Output {
                status: std::process::ExitStatus::from_raw(self.status_code << 8),
                stdout: self.stdout.clone(),
                stderr: Vec::new(),
            })
        }

        fn locate(&self, name: &str) -> Option<PathBuf> {
            Some(PathBuf::from(format!("/usr/bin/{name}")))
        }
    }
}
