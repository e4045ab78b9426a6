//! Shared types for the depsnap scanner

use crate::error::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Version recorded when a package manager does not report one
pub const UNKNOWN_VERSION: &str = "unknown";

/// Where a probe's dependencies were found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Machine-wide installation
    System,
    /// Installation tied to a project directory
    Project,
    /// Container orchestration level image inventory
    Compose,
    /// More than one location found for the same probe in one run
    Mixed,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Project => "project",
            Scope::Compose => "compose",
            Scope::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Scope::System),
            "project" => Ok(Scope::Project),
            "compose" => Ok(Scope::Compose),
            "mixed" => Ok(Scope::Mixed),
            _ => Err(format!("Invalid scope: {s}")),
        }
    }
}

/// A single installed package, keyed by name in [`Dependencies`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Manager-native version string, possibly with an architecture suffix
    pub version: String,
    /// 64-character hex digest, when one could be obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Dependency {
    /// Create a dependency, substituting the sentinel for an empty version
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        let version = if version.trim().is_empty() {
            UNKNOWN_VERSION.to_string()
        } else {
            version
        };
        Self {
            version,
            hash: None,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.hash = hash;
        self
    }
}

/// Dependencies of one location, keyed by package name
pub type Dependencies = BTreeMap<String, Dependency>;

/// Description of the scanned target, reported under `source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceInfo {
    /// The local machine
    Host {
        os: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kernel: Option<String>,
    },
    /// A single running container
    Container {
        name: String,
        image: String,
        hash: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A compose project
    Compose { stack: String },
}

impl SourceInfo {
    /// Describe the current host
    #[must_use]
    pub fn current_host(kernel: Option<String>) -> Self {
        SourceInfo::Host {
            os: std::env::consts::OS.to_string(),
            kernel,
        }
    }
}

/// What to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Target {
    /// The local machine
    Host,
    /// A running container, by id or name
    Docker { container: String },
    /// A running compose project, by project name
    DockerCompose { stack: String },
}

impl Target {
    /// Build a target from a type name and optional identifier
    ///
    /// # Errors
    /// Returns an error for unknown types or a missing identifier
    pub fn from_parts(kind: &str, identifier: Option<&str>) -> ScanResult<Self> {
        let identifier = identifier.map(str::trim).filter(|s| !s.is_empty());
        match kind {
            "host" => Ok(Target::Host),
            "docker" => identifier
                .map(|id| Target::Docker {
                    container: id.to_string(),
                })
                .ok_or_else(|| {
                    ScanError::InvalidTarget(
                        "Docker environment requires container identifier".to_string(),
                    )
                }),
            "docker-compose" | "docker_compose" => identifier
                .map(|id| Target::DockerCompose {
                    stack: id.to_string(),
                })
                .ok_or_else(|| {
                    ScanError::InvalidTarget(
                        "Docker Compose environment requires stack identifier".to_string(),
                    )
                }),
            other => Err(ScanError::InvalidTarget(format!(
                "Unsupported environment type: {other}"
            ))),
        }
    }

    /// Container or stack identifier, `None` for the host
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Target::Host => None,
            Target::Docker { container } => Some(container),
            Target::DockerCompose { stack } => Some(stack),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Target::Host => "host",
            Target::Docker { .. } => "docker",
            Target::DockerCompose { .. } => "docker-compose",
        }
    }
}
