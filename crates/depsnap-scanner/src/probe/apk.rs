//! Alpine system packages

use super::{os_family_matches, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::CommandChannel;
use crate::hash::sha256_hex;
use crate::types::{Dependencies, Dependency};
use std::collections::BTreeMap;

const INSTALLED_DB: &str = "/lib/apk/db/installed";

/// Probe for packages installed through apk
#[derive(Debug, Default, Clone, Copy)]
pub struct ApkProbe;

impl Probe for ApkProbe {
    fn name(&self) -> &'static str {
        "apk"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        os_family_matches(channel, &["alpine"], "/etc/alpine-release")
            && channel.run_ok("apk --version", None).is_some()
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        true
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let packages = match channel.run_ok("apk list --installed 2>/dev/null", None) {
            Some(stdout) if !stdout.trim().is_empty() => parse_list_installed(&stdout),
            _ => match channel.run_ok("apk info -v 2>/dev/null", None) {
                Some(stdout) => parse_info_verbose(&stdout),
                None => return ProbeOutput::failed("apk could not list installed packages"),
            },
        };

        let checksums = if ctx.collect_hashes() {
            channel
                .run_ok(&format!("cat {INSTALLED_DB}"), None)
                .map(|db| parse_installed_checksums(&db))
                .unwrap_or_default()
        } else {
            BTreeMap::new()
        };

        let dependencies: Dependencies = packages
            .into_iter()
            .map(|(name, version)| {
                let hash = checksums.get(&name).map(|checksum| sha256_hex(checksum));
                (name, Dependency::new(version).with_hash(hash))
            })
            .collect();

        tracing::debug!(probe = self.name(), packages = dependencies.len(), "listed packages");
        ProbeOutput::single(LocationResult::system(dependencies))
    }
}

/// Split `name-ver-rREL` into name and `ver-rREL`
fn split_package_token(token: &str) -> Option<(String, String)> {
    let mut parts = token.rsplitn(3, '-');
    let release = parts.next()?;
    let version = parts.next()?;
    let name = parts.next().filter(|n| !n.is_empty())?;
    Some((name.to_string(), format!("{version}-{release}")))
}

/// Parse `apk list --installed`: `name-ver-rel arch {origin} (license) [installed]`
#[must_use]
pub fn parse_list_installed(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("WARNING"))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let (name, version) = split_package_token(fields.next()?)?;
            let version = match fields.next().filter(|arch| !arch.starts_with('{')) {
                Some(arch) => format!("{version} {arch}"),
                None => version,
            };
            Some((name, version))
        })
        .collect()
}

/// Parse `apk info -v`: one `name-ver-rel` per line
#[must_use]
pub fn parse_info_verbose(stdout: &str) -> Vec<(String, String)> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("WARNING"))
        .filter_map(split_package_token)
        .collect()
}

/// Package checksum (`C:` field) per package (`P:` field)
#[must_use]
pub fn parse_installed_checksums(db: &str) -> BTreeMap<String, String> {
    let mut checksums = BTreeMap::new();
    let mut name: Option<&str> = None;
    let mut checksum: Option<&str> = None;

    for line in db.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let (Some(n), Some(c)) = (name.take(), checksum.take()) {
                checksums.insert(n.to_string(), c.to_string());
            }
        } else if let Some(value) = line.strip_prefix("P:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("C:") {
            checksum = Some(value.trim()).filter(|c| !c.is_empty());
        }
    }
    checksums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::is_digest;
    use crate::probe::testing::ScriptedChannel;

    #[test]
    fn test_parse_list_installed() {
        let stdout = "WARNING: opening from cache\n\
                      musl-1.2.4-r2 x86_64 {musl} (MIT) [installed]\n\
                      ca-certificates-bundle-20230506-r0 x86_64 {ca-certificates} (MPL-2.0 AND MIT) [installed]\n";
        let packages = parse_list_installed(stdout);
        assert_eq!(
            packages,
            vec![
                ("musl".to_string(), "1.2.4-r2 x86_64".to_string()),
                (
                    "ca-certificates-bundle".to_string(),
                    "20230506-r0 x86_64".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_parse_info_verbose() {
        let packages = parse_info_verbose("busybox-1.36.1-r5\nbad\n");
        assert_eq!(
            packages,
            vec![("busybox".to_string(), "1.36.1-r5".to_string())]
        );
    }

    #[test]
    fn test_parse_installed_checksums() {
        let db = "C:Q1abc=\nP:musl\nV:1.2.4-r2\n\nP:no-checksum\nV:1\n\nC:Q1def=\nP:busybox\n";
        let checksums = parse_installed_checksums(db);
        assert_eq!(checksums.get("musl").map(String::as_str), Some("Q1abc="));
        assert_eq!(checksums.get("busybox").map(String::as_str), Some("Q1def="));
        assert!(!checksums.contains_key("no-checksum"));
    }

    #[test]
    fn test_dependencies_carry_checksum_digest() {
        let channel = ScriptedChannel::new()
            .on("apk list --installed", "musl-1.2.4-r2 x86_64 {musl} (MIT) [installed]\n")
            .on("cat /lib/apk/db/installed", "C:Q1abc=\nP:musl\n");
        let output = ApkProbe.get_dependencies(&channel, &ProbeContext::default());
        let musl = &output.locations[0].dependencies["musl"];
        assert_eq!(musl.version, "1.2.4-r2 x86_64");
        assert!(is_digest(musl.hash.as_deref().unwrap()));
    }
}
