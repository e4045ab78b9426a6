//! Package manager probes
//!
//! Each probe knows how to detect one package manager through a
//! [`CommandChannel`] and list what it installed. Probes are stateless and
//! independent of each other; the orchestrator drives them in registration
//! order and isolates their failures.

pub mod apk;
pub mod compose;
pub mod dpkg;
pub mod java_runtime;
pub mod maven;
pub mod npm;
pub mod pip;
#[cfg(test)]
pub(crate) mod testing;

pub use apk::ApkProbe;
pub use compose::ComposeProbe;
pub use dpkg::DpkgProbe;
pub use java_runtime::JavaRuntimeProbe;
pub use maven::MavenProbe;
pub use npm::NpmProbe;
pub use pip::PipProbe;

use crate::channel::{resolve_absolute_path, CommandChannel};
use crate::types::{Dependencies, Scope};

/// Per-run inputs shared by every probe
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeContext<'a> {
    /// Project directory inside the target
    pub working_dir: Option<&'a str>,
    /// Suppress all hash work
    pub skip_hash_collection: bool,
    /// Leave out system-wide locations
    pub skip_system_scope: bool,
    /// Explicit virtual environment for the pip probe
    pub venv_path: Option<&'a str>,
}

impl<'a> ProbeContext<'a> {
    #[must_use]
    pub fn new(working_dir: Option<&'a str>) -> Self {
        Self {
            working_dir,
            ..Self::default()
        }
    }

    /// Directory probes search in: the working dir or the channel's cwd
    #[must_use]
    pub fn search_dir(&self) -> &'a str {
        self.working_dir.unwrap_or(".")
    }

    /// Whether hashes should be computed in this run
    #[must_use]
    pub fn collect_hashes(&self) -> bool {
        !self.skip_hash_collection
    }
}

/// Dependencies found in one install location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationResult {
    /// Natural scope of this location
    pub scope: Scope,
    /// Absolute path; `None` for system-wide databases
    pub location: Option<String>,
    /// Tier-2 location hash
    pub hash: Option<String>,
    pub dependencies: Dependencies,
}

impl LocationResult {
    #[must_use]
    pub fn system(dependencies: Dependencies) -> Self {
        Self {
            scope: Scope::System,
            location: None,
            hash: None,
            dependencies,
        }
    }

    #[must_use]
    pub fn project(location: impl Into<String>, dependencies: Dependencies) -> Self {
        Self {
            scope: Scope::Project,
            location: Some(location.into()),
            hash: None,
            dependencies,
        }
    }

    #[must_use]
    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.hash = hash;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Result of one probe's extraction
///
/// "Nothing found" and "extraction failed" are told apart by `error`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    pub locations: Vec<LocationResult>,
    pub error: Option<String>,
}

impl ProbeOutput {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Empty result carrying the reason extraction failed
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            locations: Vec::new(),
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn single(location: LocationResult) -> Self {
        Self {
            locations: vec![location],
            error: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: LocationResult) -> Self {
        self.locations.push(location);
        self
    }

    /// Total dependencies across all locations
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.locations.iter().map(|l| l.dependencies.len()).sum()
    }
}

/// Detection logic for one package manager
///
/// Implementations never modify the target and never fail outward: every
/// recoverable problem becomes an empty or partial [`ProbeOutput`].
pub trait Probe: Send + Sync {
    /// Stable identifier, used as the report key and in selection lists
    fn name(&self) -> &'static str;

    /// Whether the target runs this package manager (OS family and tool)
    fn is_usable(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool;

    /// Whether extraction would report machine-wide packages
    ///
    /// Must be cheap; it is asked before extraction to honour
    /// `skip_system_scope`.
    fn has_system_scope(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool;

    /// List installed packages with optional location and hash metadata
    fn get_dependencies(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>)
        -> ProbeOutput;
}

/// All built-in probes in registration order
///
/// Source identity first, system package managers next, project-scoped
/// managers last.
#[must_use]
pub fn default_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(ComposeProbe),
        Box::new(DpkgProbe),
        Box::new(ApkProbe),
        Box::new(MavenProbe),
        Box::new(JavaRuntimeProbe),
        Box::new(PipProbe),
        Box::new(NpmProbe),
    ]
}

/// Whether `/etc/os-release` (or the fallback marker file) names an OS family
pub(crate) fn os_family_matches(
    channel: &dyn CommandChannel,
    families: &[&str],
    fallback_marker: &str,
) -> bool {
    match channel.run_ok("cat /etc/os-release", None) {
        Some(os_release) => {
            let os_release = os_release.to_lowercase();
            families.iter().any(|family| os_release.contains(family))
        }
        None => channel.path_exists(fallback_marker, None),
    }
}

/// Absolute form of the search directory, falling back to the raw value
pub(crate) fn absolute_search_dir(channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> String {
    let dir = ctx.search_dir();
    resolve_absolute_path(channel, dir).unwrap_or_else(|| dir.to_string())
}
