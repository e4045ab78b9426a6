//! Channel for a running container, driven through the docker CLI

use super::process::run_with_timeout;
use super::{CommandChannel, CommandOutput, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{ScanError, ScanResult};
use crate::hash::normalize_digest;
use crate::types::{SourceInfo, Target, UNKNOWN_VERSION};
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

/// Shell operators that rule out running a command without `sh`
const SHELL_OPERATORS: &[&str] = &["&&", "||", "|", ">", "<", ";", "`", "$(", "$"];

/// Subset of `docker inspect` output for a container
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerInspect {
    pub name: String,
    /// Image id (`sha256:...`)
    pub image: String,
    pub state: ContainerState,
    pub config: ContainerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerState {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ContainerConfig {
    /// Image reference the container was created from
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

impl ContainerInspect {
    pub(crate) fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    pub(crate) fn label(&self, key: &str) -> Option<&str> {
        self.config
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

/// Runs commands inside one running container via `docker exec`
#[derive(Debug, Clone)]
pub struct DockerChannel {
    target: Target,
    container: ContainerInspect,
    timeout: Duration,
}

impl DockerChannel {
    /// Look up a running container by id or name
    ///
    /// # Errors
    /// Returns `ChannelUnreachable` when docker is unavailable or the
    /// container does not exist or is not running
    pub fn connect(identifier: &str) -> ScanResult<Self> {
        Self::connect_with_timeout(identifier, DEFAULT_COMMAND_TIMEOUT)
    }

    /// Same as [`DockerChannel::connect`] with a custom per-command timeout
    ///
    /// # Errors
    /// See [`DockerChannel::connect`]
    pub fn connect_with_timeout(identifier: &str, timeout: Duration) -> ScanResult<Self> {
        let mut inspected = inspect_containers(&[identifier.to_string()], timeout)
            .map_err(|e| match e {
                ScanError::ChannelUnreachable(msg) if msg.contains("No such") => {
                    ScanError::ChannelUnreachable(format!("Container '{identifier}' not found"))
                }
                other => other,
            })?;
        let container = inspected.pop().ok_or_else(|| {
            ScanError::ChannelUnreachable(format!("Container '{identifier}' not found"))
        })?;

        if !container.state.running {
            return Err(ScanError::ChannelUnreachable(format!(
                "Container '{identifier}' is not running (status: {})",
                container.state.status
            )));
        }

        tracing::debug!(container = container.display_name(), "connected to container");

        Ok(Self {
            target: Target::Docker {
                container: identifier.to_string(),
            },
            container,
            timeout,
        })
    }

    fn exec(&self, argv: &[String], working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        let mut cmd = Command::new("docker");
        cmd.arg("exec");
        if let Some(dir) = working_dir {
            cmd.arg("-w").arg(dir);
        }
        cmd.arg(self.container.display_name());
        cmd.args(argv);

        let label = argv.join(" ");
        run_with_timeout(cmd, &label, self.timeout).map_err(|e| match e {
            ScanError::Io(io) => ScanError::ChannelUnreachable(format!("Docker CLI error: {io}")),
            other => other,
        })
    }

    fn execute_direct(&self, command: &str, working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        match parse_simple_command(command) {
            Some(argv) => self.exec(&argv, working_dir),
            None => Ok(CommandOutput::failure(format!(
                "Command too complex for direct execution (no shell available): {command}"
            ))),
        }
    }
}

impl CommandChannel for DockerChannel {
    fn execute(&self, command: &str, working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        let out = self.exec(&argv, working_dir)?;
        if missing_shell(&out) {
            tracing::debug!("no sh in container, falling back to direct execution");
            return self.execute_direct(command, working_dir);
        }
        Ok(out)
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn source_info(&self) -> Option<SourceInfo> {
        Some(SourceInfo::Container {
            name: self.container.display_name().to_string(),
            image: short_image_name(&self.container.config.image),
            hash: normalize_digest(&self.container.image),
            error: None,
        })
    }
}

/// Run `docker inspect` for the given containers
pub(crate) fn inspect_containers(
    identifiers: &[String],
    timeout: Duration,
) -> ScanResult<Vec<ContainerInspect>> {
    let mut cmd = Command::new("docker");
    cmd.args(["inspect", "--type", "container"]).args(identifiers);

    let out = run_with_timeout(cmd, "docker inspect", timeout).map_err(|e| match e {
        ScanError::Io(io) => ScanError::ChannelUnreachable(format!("Docker CLI not available: {io}")),
        other => other,
    })?;

    if !out.success() {
        return Err(ScanError::ChannelUnreachable(format!(
            "Docker API error: {}",
            out.stderr.trim()
        )));
    }

    Ok(serde_json::from_str(&out.stdout)?)
}

/// Readable image name: the last path segment of the image reference
pub(crate) fn short_image_name(reference: &str) -> String {
    let reference = reference.trim();
    if reference.is_empty() {
        return UNKNOWN_VERSION.to_string();
    }
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

fn missing_shell(out: &CommandOutput) -> bool {
    if out.exit_code != 126 && out.exit_code != 127 {
        return false;
    }
    let text = format!("{}{}", out.stdout, out.stderr).to_lowercase();
    text.contains("executable file not found") && text.contains("sh")
}

/// Split commands that can run without a shell
fn parse_simple_command(command: &str) -> Option<Vec<String>> {
    if SHELL_OPERATORS.iter().any(|op| command.contains(op)) {
        return None;
    }
    let parts = shell_words::split(command).ok()?;
    match parts.first() {
        Some(first) if !first.starts_with('-') => Some(parts),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_command() {
        assert_eq!(
            parse_simple_command("dpkg-query --version"),
            Some(vec!["dpkg-query".to_string(), "--version".to_string()])
        );
        assert_eq!(
            parse_simple_command("test -e '/opt/my venv'"),
            Some(vec!["test".into(), "-e".into(), "/opt/my venv".into()])
        );
        assert_eq!(parse_simple_command("cat a | sort"), None);
        assert_eq!(parse_simple_command("echo $HOME"), None);
        assert_eq!(parse_simple_command("--version"), None);
    }

    #[test]
    fn test_short_image_name() {
        assert_eq!(short_image_name("docker.io/library/nginx:1.25"), "nginx:1.25");
        assert_eq!(short_image_name("redis"), "redis");
        assert_eq!(short_image_name(""), "unknown");
    }

    #[test]
    fn test_missing_shell_detection() {
        let out = CommandOutput::new(
            "",
            "OCI runtime exec failed: exec: \"sh\": executable file not found in $PATH",
            126,
        );
        assert!(missing_shell(&out));
        assert!(!missing_shell(&CommandOutput::new("", "sh: foo: not found", 127)));
    }

    #[test]
    fn test_inspect_parsing() {
        let raw = r#"[{
            "Id": "abc",
            "Name": "/web-1",
            "Image": "sha256:deadbeef",
            "State": {"Running": true, "Status": "running"},
            "Config": {"Image": "nginx:latest", "Labels": {"com.docker.compose.service": "web"}}
        }]"#;
        let parsed: Vec<ContainerInspect> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].display_name(), "web-1");
        assert_eq!(parsed[0].label("com.docker.compose.service"), Some("web"));
        assert!(parsed[0].state.running);
    }
}
