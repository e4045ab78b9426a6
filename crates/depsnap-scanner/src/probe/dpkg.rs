//! Debian/Ubuntu system packages

use super::{os_family_matches, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::CommandChannel;
use crate::hash::batch::DPKG_MD5SUMS;
use crate::types::{Dependencies, Dependency};

const LIST_COMMAND: &str = "dpkg-query -W -f='${Package}\\t${Version}\\t${Architecture}\\n'";

/// One row of `dpkg-query` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpkgPackage {
    pub name: String,
    pub version: String,
    pub arch: Option<String>,
}

impl DpkgPackage {
    /// Version as reported: `"<version> <arch>"` when the arch is known
    #[must_use]
    pub fn full_version(&self) -> String {
        match &self.arch {
            Some(arch) => format!("{} {arch}", self.version),
            None => self.version.clone(),
        }
    }
}

/// Probe for packages installed through dpkg
#[derive(Debug, Default, Clone, Copy)]
pub struct DpkgProbe;

impl Probe for DpkgProbe {
    fn name(&self) -> &'static str {
        "dpkg"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        os_family_matches(channel, &["debian", "ubuntu"], "/etc/debian_version")
            && channel.run_ok("dpkg-query --version", None).is_some()
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        true
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let out = match channel.execute(LIST_COMMAND, None) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                return ProbeOutput::failed(format!(
                    "dpkg-query exited with {}: {}",
                    out.exit_code,
                    out.stderr.trim()
                ))
            }
            Err(e) => return ProbeOutput::failed(e.to_string()),
        };

        let packages = parse_listing(&out.stdout);

        let digests = if ctx.collect_hashes() {
            let keys: Vec<(&str, Option<&str>)> = packages
                .iter()
                .map(|p| (p.name.as_str(), p.arch.as_deref()))
                .collect();
            DPKG_MD5SUMS.md5sums_digests(channel, &keys)
        } else {
            Default::default()
        };

        let dependencies: Dependencies = packages
            .into_iter()
            .map(|package| {
                let hash = digests.get(&package.name).cloned();
                let dependency = Dependency::new(package.full_version()).with_hash(hash);
                (package.name, dependency)
            })
            .collect();

        tracing::debug!(probe = self.name(), packages = dependencies.len(), "listed packages");
        ProbeOutput::single(LocationResult::system(dependencies))
    }
}

/// Parse tab separated `name version arch` rows, skipping malformed lines
#[must_use]
pub fn parse_listing(stdout: &str) -> Vec<DpkgPackage> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t').map(str::trim);
            let name = parts.next().filter(|n| !n.is_empty())?;
            let version = parts.next()?;
            let arch = parts.next().filter(|a| !a.is_empty());
            Some(DpkgPackage {
                name: name.to_string(),
                version: version.to_string(),
                arch: arch.map(str::to_string),
            })
        })
        .collect()
}
