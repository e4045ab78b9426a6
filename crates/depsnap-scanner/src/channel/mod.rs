//! Command channels: run a command or check a path against a target
//!
//! Everything above this module is target-agnostic. A channel either runs
//! commands on the local machine ([`HostChannel`]), inside a running
//! container ([`DockerChannel`]), or only exposes the service inventory of
//! a compose project ([`ComposeChannel`]).
//!
//! A non-zero exit code is a normal [`CommandOutput`]; an `Err` means the
//! channel itself failed (target unreachable, command timed out).

pub mod compose;
pub mod docker;
pub mod host;
mod process;

pub use compose::{ComposeChannel, ComposeService};
pub use docker::DockerChannel;
pub use host::HostChannel;

use crate::error::ScanResult;
use crate::types::{SourceInfo, Target};
use std::borrow::Cow;
use std::time::Duration;

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// A command that did not run, with the reason on stderr
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::new("", reason, 1)
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands and answers path-existence checks against one target
///
/// Implementations are read-only with respect to the target; nothing run
/// through a channel by this crate installs, modifies or deletes anything.
pub trait CommandChannel {
    /// Execute a shell command, optionally from a working directory
    ///
    /// Multi-line scripts are accepted and run as one round-trip.
    ///
    /// # Errors
    /// Returns an error only when the channel itself fails
    fn execute(&self, command: &str, working_dir: Option<&str>) -> ScanResult<CommandOutput>;

    /// Check whether a path exists, using a single existence-check command
    fn path_exists(&self, path: &str, working_dir: Option<&str>) -> bool {
        self.execute(&format!("test -e {}", quote(path)), working_dir)
            .map(|out| out.success())
            .unwrap_or(false)
    }

    /// The target this channel talks to
    fn target(&self) -> &Target;

    /// Identity of the scanned target, reported under `source`
    fn source_info(&self) -> Option<SourceInfo> {
        None
    }

    /// Services of a compose project; empty for every other channel
    fn compose_services(&self) -> &[ComposeService] {
        &[]
    }

    /// Run a command and return its stdout when it exits successfully
    fn run_ok(&self, command: &str, working_dir: Option<&str>) -> Option<String> {
        match self.execute(command, working_dir) {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(command, error = %e, "channel error");
                None
            }
        }
    }

    /// Whether commands run inside a container rather than on the host
    fn is_container(&self) -> bool {
        matches!(self.target(), Target::Docker { .. })
    }
}

/// Quote a path or argument for interpolation into a `sh -c` script
#[must_use]
pub fn quote(value: &str) -> Cow<'_, str> {
    shell_words::quote(value)
}

/// Join a directory and a relative entry the way the target shell would
#[must_use]
pub fn join_path(dir: &str, entry: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{entry}")
    } else {
        format!("{dir}/{entry}")
    }
}

/// Resolve a path to an absolute one inside the target
///
/// Returns `None` when the directory cannot be entered.
pub fn resolve_absolute_path(channel: &dyn CommandChannel, path: &str) -> Option<String> {
    let command = if path == "." {
        "pwd".to_string()
    } else {
        format!("cd {} && pwd", quote(path))
    };
    channel
        .run_ok(&command, None)
        .map(|out| out.trim().to_string())
        .filter(|out| !out.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_wraps_spaces() {
        assert_eq!(quote("/opt/my venv"), "'/opt/my venv'");
        assert_eq!(quote("/usr/lib"), "/usr/lib");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/app", "package.json"), "/app/package.json");
        assert_eq!(join_path("/app/", "package.json"), "/app/package.json");
    }

    #[test]
    fn test_command_output_failure() {
        let out = CommandOutput::failure("no shell");
        assert!(!out.success());
        assert_eq!(out.stderr, "no shell");
    }
}
