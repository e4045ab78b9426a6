//! Channel for the local machine

use super::process::run_with_timeout;
use super::{CommandChannel, CommandOutput, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{ScanError, ScanResult};
use crate::types::{SourceInfo, Target};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Runs commands through `sh -c` on the local machine
#[derive(Debug, Clone)]
pub struct HostChannel {
    target: Target,
    timeout: Duration,
}

impl Default for HostChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl HostChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            target: Target::Host,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the per-command timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CommandChannel for HostChannel {
    fn execute(&self, command: &str, working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);

        if let Some(dir) = working_dir {
            if !Path::new(dir).is_dir() {
                return Ok(CommandOutput::failure(format!(
                    "Command execution failed: no such directory {dir}"
                )));
            }
            cmd.current_dir(dir);
        }

        match run_with_timeout(cmd, command, self.timeout) {
            Err(ScanError::Io(e)) => Err(ScanError::ChannelUnreachable(format!(
                "failed to spawn sh: {e}"
            ))),
            other => other,
        }
    }

    fn path_exists(&self, path: &str, working_dir: Option<&str>) -> bool {
        match working_dir {
            Some(dir) => Path::new(dir).join(path).exists(),
            None => Path::new(path).exists(),
        }
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn source_info(&self) -> Option<SourceInfo> {
        let kernel = self
            .run_ok("uname -sr", None)
            .map(|out| out.trim().to_string())
            .filter(|k| !k.is_empty());
        Some(SourceInfo::current_host(kernel))
    }
}
