//! Channel for a compose project
//!
//! Only the image inventory of the project's running containers is
//! exposed; commands are never run inside the containers.

use super::docker::{inspect_containers, short_image_name, ContainerInspect};
use super::process::run_with_timeout;
use super::{CommandChannel, CommandOutput, DEFAULT_COMMAND_TIMEOUT};
use crate::error::{ScanError, ScanResult};
use crate::hash::normalize_digest;
use crate::types::{SourceInfo, Target};
use regex::Regex;
use serde::Serialize;
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

const PROJECT_LABEL: &str = "com.docker.compose.project";
const SERVICE_LABEL: &str = "com.docker.compose.service";

/// A running container that belongs to a compose project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeService {
    /// Service name within the project
    pub service: String,
    /// Container name
    pub container: String,
    /// Readable image name (last path segment of the reference)
    pub image: String,
    /// Image id, bare hex when it is a sha256 digest
    pub image_id: String,
}

/// Inventory-only channel over the containers of a compose project
#[derive(Debug, Clone)]
pub struct ComposeChannel {
    target: Target,
    stack: String,
    services: Vec<ComposeService>,
}

impl ComposeChannel {
    /// Discover the running containers of a compose project
    ///
    /// # Errors
    /// Returns `ChannelUnreachable` when docker is unavailable or no
    /// running container belongs to the project
    pub fn connect(stack: &str) -> ScanResult<Self> {
        Self::connect_with_timeout(stack, DEFAULT_COMMAND_TIMEOUT)
    }

    /// Same as [`ComposeChannel::connect`] with a custom timeout
    ///
    /// # Errors
    /// See [`ComposeChannel::connect`]
    pub fn connect_with_timeout(stack: &str, timeout: Duration) -> ScanResult<Self> {
        let mut names = list_running(Some(&format!("label={PROJECT_LABEL}={stack}")), timeout)?;

        if names.is_empty() {
            // Containers started without compose labels
            names = list_running(None, timeout)?
                .into_iter()
                .filter(|name| {
                    name.starts_with(&format!("{stack}_")) || name.starts_with(&format!("{stack}-"))
                })
                .collect();
        }

        if names.is_empty() {
            return Err(ScanError::ChannelUnreachable(format!(
                "No running containers found for Docker Compose stack '{stack}'"
            )));
        }

        let services = inspect_containers(&names, timeout)?
            .iter()
            .map(|container| compose_service(container, stack))
            .collect();

        Ok(Self::from_services(stack, services))
    }

    /// Build a channel from an already known service list
    #[must_use]
    pub fn from_services(stack: &str, services: Vec<ComposeService>) -> Self {
        Self {
            target: Target::DockerCompose {
                stack: stack.to_string(),
            },
            stack: stack.to_string(),
            services,
        }
    }

    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }
}

impl CommandChannel for ComposeChannel {
    fn execute(&self, _command: &str, _working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        Ok(CommandOutput::failure(
            "Docker Compose channel does not execute commands in containers",
        ))
    }

    fn path_exists(&self, _path: &str, _working_dir: Option<&str>) -> bool {
        false
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn source_info(&self) -> Option<SourceInfo> {
        Some(SourceInfo::Compose {
            stack: self.stack.clone(),
        })
    }

    fn compose_services(&self) -> &[ComposeService] {
        &self.services
    }
}

fn list_running(filter: Option<&str>, timeout: Duration) -> ScanResult<Vec<String>> {
    let mut cmd = Command::new("docker");
    cmd.args(["ps", "--filter", "status=running"]);
    if let Some(filter) = filter {
        cmd.args(["--filter", filter]);
    }
    cmd.args(["--format", "{{.Names}}"]);

    let out = run_with_timeout(cmd, "docker ps", timeout).map_err(|e| match e {
        ScanError::Io(io) => ScanError::ChannelUnreachable(format!("Docker CLI not available: {io}")),
        other => other,
    })?;
    if !out.success() {
        return Err(ScanError::ChannelUnreachable(format!(
            "Docker API error: {}",
            out.stderr.trim()
        )));
    }

    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn compose_service(container: &ContainerInspect, stack: &str) -> ComposeService {
    let name = container.display_name();
    let service = container
        .label(SERVICE_LABEL)
        .map_or_else(|| service_name_from_container(name, stack), str::to_string);
    ComposeService {
        service,
        container: name.to_string(),
        image: short_image_name(&container.config.image),
        image_id: normalize_digest(&container.image),
    }
}

/// Derive the service from `<stack>-<service>-<n>` or `<stack>_<service>_<n>`
pub(crate) fn service_name_from_container(container: &str, stack: &str) -> String {
    static DASH_REPLICA: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORE_REPLICA: OnceLock<Regex> = OnceLock::new();

    if let Some(rest) = container.strip_prefix(&format!("{stack}-")) {
        let re = DASH_REPLICA.get_or_init(|| Regex::new(r"-\d+$").expect("valid regex"));
        return re.replace(rest, "").into_owned();
    }
    if let Some(rest) = container.strip_prefix(&format!("{stack}_")) {
        let re = UNDERSCORE_REPLICA.get_or_init(|| Regex::new(r"_\d+$").expect("valid regex"));
        return re.replace(rest, "").into_owned();
    }
    container.to_string()
}
