//! Process invocation primitive.
//!
//! Actions never spawn processes directly; they go through a
//! [`ProcessRunner`] so tests can substitute a scripted runner. The default
//! [`ShellRunner`] hands the expanded command line to the platform shell and
//! waits for it synchronously. There is no internal timeout: a hung tool is
//! the caller's concern.

use std::io;
use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use tracing::debug;

use crate::env::Environment;

#[cfg(windows)]
const SHELL: &str = "cmd";
#[cfg(windows)]
const SHELL_ARGS: &[&str] = &["/C"];

#[cfg(not(windows))]
const SHELL: &str = "sh";
#[cfg(not(windows))]
const SHELL_ARGS: &[&str] = &["-c"];

/// Exit status and captured streams of one external command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }
}

/// Runs an expanded command line and reports how it went.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` with `env`'s process environment.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the process cannot be spawned or awaited. A
    /// command that runs and exits non-zero is not an error here.
    fn run(&self, command: &str, env: &Environment) -> io::Result<ProcessOutput>;
}

/// Runs commands through `sh -c` (or `cmd /C` on Windows).
///
/// The child inherits the calling process environment with the
/// environment's `ENV` entries layered on top.
#[derive(Clone, Debug, Default)]
pub struct ShellRunner {
    working_dir: Option<Utf8PathBuf>,
}

impl ShellRunner {
    /// Runner that starts commands in the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose commands start in `dir`.
    #[must_use]
    pub fn in_dir(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

impl ProcessRunner for ShellRunner {
    fn run(&self, command: &str, env: &Environment) -> io::Result<ProcessOutput> {
        let mut cmd = Command::new(SHELL);
        cmd.args(SHELL_ARGS)
            .arg(command)
            .envs(env.process_vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output()?;
        let status = output.status.code();
        debug!(command, ?status, "command finished");
        Ok(ProcessOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn shell_runner_captures_streams_and_status() {
        let runner = ShellRunner::new();
        let out = runner
            .run("echo out; echo err >&2; exit 3", &Environment::new())
            .expect("run shell");
        assert_eq!(out.status, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(!out.success());
    }

    #[rstest]
    fn shell_runner_exports_process_env() {
        let mut env = Environment::new();
        env.set_process_var("SETTLE_PROBE", "visible");
        let out = ShellRunner::new()
            .run("printf %s \"$SETTLE_PROBE\"", &env)
            .expect("run shell");
        assert!(out.success());
        assert_eq!(out.stdout, "visible");
    }

    #[rstest]
    fn shell_runner_honours_working_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
        std::fs::write(root.join("marker"), "here").expect("write marker");
        let out = ShellRunner::in_dir(root.clone())
            .run("cat marker", &Environment::new())
            .expect("run shell");
        assert_eq!(out.stdout, "here");
    }
}
