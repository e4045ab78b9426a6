//! Node.js packages installed with npm

use super::{absolute_search_dir, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::{join_path, CommandChannel};
use crate::hash::{location_hash, LocationHashRules};
use crate::types::{Dependencies, Dependency, UNKNOWN_VERSION};
use serde::Deserialize;
use std::collections::BTreeMap;

const HASH_RULES: LocationHashRules = LocationHashRules {
    prune_names: &["*.log", ".npm"],
    prune_paths: &["*/node_modules/.cache"],
    exclude_names: &["*.tmp", "*.temp"],
    include_names: &[],
};

/// Lock files of other package managers sharing `package.json`
const FOREIGN_LOCKFILES: &[&str] = &["yarn.lock", "pnpm-lock.yaml", "bun.lockb"];

#[derive(Debug, Deserialize)]
struct NpmList {
    #[serde(default)]
    dependencies: BTreeMap<String, NpmPackage>,
}

#[derive(Debug, Deserialize)]
struct NpmPackage {
    #[serde(default)]
    version: Option<String>,
}

/// Probe for npm-managed Node.js packages
#[derive(Debug, Default, Clone, Copy)]
pub struct NpmProbe;

impl NpmProbe {
    /// Whether the search dir holds an npm project
    fn has_project(channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        let dir = ctx.search_dir();
        channel.path_exists(&join_path(dir, "package.json"), None)
            || channel.path_exists(&join_path(dir, "node_modules"), None)
    }
}

impl Probe for NpmProbe {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        if channel.run_ok("npm --version", ctx.working_dir).is_none() {
            return false;
        }
        let dir = ctx.search_dir();
        if channel.path_exists(&join_path(dir, "package.json"), None) {
            return !FOREIGN_LOCKFILES
                .iter()
                .any(|lock| channel.path_exists(&join_path(dir, lock), None));
        }
        channel.path_exists(&join_path(dir, "package-lock.json"), None)
    }

    fn has_system_scope(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        !Self::has_project(channel, ctx)
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let project = Self::has_project(channel, ctx)
            .then(|| absolute_search_dir(channel, ctx));

        let listing = match channel.execute("npm list --json --depth=0 2>/dev/null", ctx.working_dir) {
            Ok(out) => out,
            Err(e) => return ProbeOutput::failed(e.to_string()),
        };

        // npm list exits non-zero on peer/extraneous warnings but still prints JSON
        let (dependencies, error) = match parse_npm_list(&listing.stdout) {
            Ok(deps) => (deps, None),
            Err(e) if listing.success() => (Dependencies::new(), Some(e)),
            Err(_) => (
                Dependencies::new(),
                Some(format!("npm list exited with {}", listing.exit_code)),
            ),
        };

        let location = match project {
            Some(dir) => {
                let hash = if ctx.collect_hashes() && !dependencies.is_empty() {
                    location_hash(channel, &dir, &HASH_RULES)
                } else {
                    None
                };
                LocationResult::project(dir, dependencies).with_hash(hash)
            }
            None => LocationResult::system(dependencies),
        };

        ProbeOutput {
            locations: vec![location],
            error,
        }
    }
}

/// Parse `npm list --json --depth=0`
pub fn parse_npm_list(stdout: &str) -> Result<Dependencies, String> {
    let list: NpmList = serde_json::from_str(stdout).map_err(|e| e.to_string())?;
    Ok(list
        .dependencies
        .into_iter()
        .map(|(name, package)| {
            let version = package
                .version
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
            (name, Dependency::new(version))
        })
        .collect())
}
