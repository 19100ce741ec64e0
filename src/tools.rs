//! External command discovery and invocation.
//!
//! Every subprocess this crate starts goes through here, so that a command
//! that is simply not installed surfaces as an explicit
//! [`ToolRun::Unavailable`] / [`ToolExit::Unavailable`] value instead of a
//! spawn error. Optional Termux commands degrade to a no-op that way, and
//! the one required tool (`yt-dlp`) is checked up front with
//! [`is_available`].
//!
//! PATH lookups are memoized for the lifetime of the process: availability
//! of a command cannot meaningfully change within one run.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tokio::process::Command;

use crate::error::Result;

/// Process-wide memo of PATH lookups, keyed by command name.
static AVAILABLE: Lazy<Mutex<HashMap<String, bool>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Checks whether a command can be executed, with caching.
///
/// The first call for a given name performs a `which` lookup; the result is
/// remembered for the rest of the run. Absence is a normal `false`, never an
/// error.
#[must_use]
pub fn is_available(command: &str) -> bool {
    let mut cache = AVAILABLE.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if let Some(known) = cache.get(command) {
        return *known;
    }

    let found = which::which(command).is_ok();
    cache.insert(command.to_string(), found);
    found
}

/// Outcome of a captured-output tool invocation.
#[derive(Debug)]
pub enum ToolRun {
    /// The command is not present on the PATH; nothing was executed.
    Unavailable,
    /// The command ran to completion with captured output.
    Finished(Output),
}

impl ToolRun {
    /// `true` when the command ran and exited successfully.
    #[must_use]
    pub fn success(&self) -> bool {
        match self {
            Self::Unavailable => false,
            Self::Finished(output) => output.status.success(),
        }
    }
}

/// Outcome of an inherited-stdio tool invocation.
#[derive(Debug)]
pub enum ToolExit {
    /// The command is not present on the PATH; nothing was executed.
    Unavailable,
    /// The command ran to completion with this exit status.
    Exited(ExitStatus),
}

/// Runs a command to completion, capturing its output.
///
/// Returns [`ToolRun::Unavailable`] without executing anything when the
/// command is not installed. Spawn and wait failures of an installed command
/// are still IO errors.
pub async fn run<I, S>(command: &str, args: I) -> Result<ToolRun>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if !is_available(command) {
        return Ok(ToolRun::Unavailable);
    }

    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;

    Ok(ToolRun::Finished(output))
}

/// Runs a command to completion with stdio inherited from this process.
///
/// Used for tools whose own progress output should reach the terminal, such
/// as the downloader. `cwd` sets the working directory for the child.
pub async fn run_inherited<I, S>(command: &str, args: I, cwd: Option<&Path>) -> Result<ToolExit>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if !is_available(command) {
        return Ok(ToolExit::Unavailable);
    }

    let mut child = Command::new(command);
    child.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        child.current_dir(dir);
    }

    let status = child.status().await?;
    Ok(ToolExit::Exited(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_available_missing_command() {
        assert!(!is_available("definitely-not-a-real-command-3141"));
        // second lookup comes from the cache and must agree
        assert!(!is_available("definitely-not-a-real-command-3141"));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_available_shell() {
        assert!(is_available("sh"));
    }

    #[tokio::test]
    async fn test_run_missing_command_is_unavailable() {
        let run = run("definitely-not-a-real-command-3141", ["--version"])
            .await
            .expect("lookup itself should not fail");
        assert!(matches!(run, ToolRun::Unavailable));
        assert!(!run.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_exit_status() {
        let run = run("sh", ["-c", "exit 3"]).await.expect("sh should spawn");
        match run {
            ToolRun::Finished(output) => assert_eq!(output.status.code(), Some(3)),
            ToolRun::Unavailable => panic!("sh should be available"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_inherited_reports_exit() {
        let exit = run_inherited("sh", ["-c", "exit 0"], None)
            .await
            .expect("sh should spawn");
        match exit {
            ToolExit::Exited(status) => assert!(status.success()),
            ToolExit::Unavailable => panic!("sh should be available"),
        }
    }
}
