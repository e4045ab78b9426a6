//! Batched collection of per-package metadata files
//!
//! A package database with thousands of small metadata files (one per
//! installed package) is read with one script that prints a marker line
//! naming each file followed by its contents. The combined output is split
//! back into per-package sections here, so hashing a whole system costs a
//! single round-trip instead of one per package.

use super::fold_md5sums;
use crate::channel::{join_path, quote, CommandChannel};
use std::collections::BTreeMap;

/// Prefix of the marker line preceding each file section
///
/// Chosen so it can never start a line of a checksum file.
pub const SECTION_MARKER: &str = "::depsnap-section::";

/// Architecture qualifiers that may appear in metadata file names
///
/// `all` is left out: arch-independent packages never get a qualified file
/// name, and `-all` is a common package name suffix.
pub const KNOWN_ARCHITECTURES: &[&str] = &[
    "amd64", "arm64", "armhf", "armel", "i386", "ppc64el", "s390x", "mips64el", "riscv64",
];

/// Raw metadata content per package name
pub type SectionMap = BTreeMap<String, String>;

/// Directory of per-package metadata files sharing one extension
#[derive(Debug, Clone, Copy)]
pub struct MetadataDir<'a> {
    pub dir: &'a str,
    pub extension: &'a str,
}

/// dpkg's per-package `md5sums` files
pub const DPKG_MD5SUMS: MetadataDir<'static> = MetadataDir {
    dir: "/var/lib/dpkg/info",
    extension: "md5sums",
};

impl MetadataDir<'_> {
    /// Script emitting every metadata file behind a marker line
    #[must_use]
    pub fn batch_script(&self) -> String {
        let dir = quote(self.dir);
        format!(
            "[ -d {dir} ] || exit 1\n\
             for f in {dir}/*.{ext}; do\n  \
               [ -f \"$f\" ] || continue\n  \
               echo \"{SECTION_MARKER} $f\"\n  \
               cat \"$f\"\n  \
               echo\n\
             done",
            ext = self.extension
        )
    }

    /// Collect all metadata files in one round-trip
    ///
    /// Returns `None` when the batch command fails, so the caller can fall
    /// back to [`MetadataDir::read_one`].
    pub fn collect_batched(&self, channel: &dyn CommandChannel) -> Option<SectionMap> {
        let output = channel.run_ok(&self.batch_script(), None)?;
        Some(demultiplex(&output, self.extension))
    }

    /// Read the metadata of a single package, trying arch-qualified names
    pub fn read_one(
        &self,
        channel: &dyn CommandChannel,
        package: &str,
        arch: Option<&str>,
    ) -> Option<String> {
        let mut stems = vec![package.to_string()];
        if let Some(arch) = arch.filter(|a| KNOWN_ARCHITECTURES.contains(a)) {
            stems.push(format!("{package}:{arch}"));
            stems.push(format!("{package}-{arch}"));
        }

        stems.iter().find_map(|stem| {
            let path = join_path(self.dir, &format!("{stem}.{}", self.extension));
            if !channel.path_exists(&path, None) {
                return None;
            }
            channel
                .run_ok(&format!("cat {}", quote(&path)), None)
                .filter(|content| !content.trim().is_empty())
        })
    }

    /// Tier-1 md5sums digests for a set of packages
    ///
    /// Uses one batched read when possible and falls back to per-package
    /// reads when the batch command fails. Packages without metadata are
    /// absent from the returned map.
    pub fn md5sums_digests(
        &self,
        channel: &dyn CommandChannel,
        packages: &[(&str, Option<&str>)],
    ) -> BTreeMap<String, String> {
        match self.collect_batched(channel) {
            Some(sections) => {
                tracing::debug!(
                    dir = self.dir,
                    sections = sections.len(),
                    packages = packages.len(),
                    "batched metadata collection"
                );
                packages
                    .iter()
                    .filter_map(|(name, arch)| {
                        lookup(&sections, name, *arch)
                            .and_then(fold_md5sums)
                            .map(|digest| ((*name).to_string(), digest))
                    })
                    .collect()
            }
            None => {
                tracing::debug!(dir = self.dir, "batched collection failed, reading per package");
                self.unbatched_md5sums_digests(channel, packages)
            }
        }
    }

    /// Per-package md5sums digests, one round-trip per package
    pub fn unbatched_md5sums_digests(
        &self,
        channel: &dyn CommandChannel,
        packages: &[(&str, Option<&str>)],
    ) -> BTreeMap<String, String> {
        packages
            .iter()
            .filter_map(|(name, arch)| {
                self.read_one(channel, name, *arch)
                    .as_deref()
                    .and_then(fold_md5sums)
                    .map(|digest| ((*name).to_string(), digest))
            })
            .collect()
    }
}

/// Split a batch stream into sections keyed by exact file stem
///
/// Stems are never shortened here; architecture-qualified names are only
/// matched at lookup time, using the package's own architecture.
#[must_use]
pub fn demultiplex(output: &str, extension: &str) -> SectionMap {
    let mut sections = SectionMap::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if let Some(path) = line.strip_prefix(SECTION_MARKER) {
            let file = path.trim().rsplit('/').next().unwrap_or_default();
            let stem = file
                .strip_suffix(&format!(".{extension}"))
                .unwrap_or(file)
                .to_string();
            sections.insert(stem.clone(), String::new());
            current = Some(stem);
        } else if let Some(content) = current.as_ref().and_then(|s| sections.get_mut(s)) {
            content.push_str(line);
            content.push('\n');
        }
    }
    sections
}

/// Section for a package: bare name, then `name:arch`, then `name-arch`
///
/// Only allow-listed architectures are tried, so a hyphenated package name
/// is never split.
fn lookup<'s>(sections: &'s SectionMap, name: &str, arch: Option<&str>) -> Option<&'s str> {
    if let Some(content) = sections.get(name) {
        return Some(content.as_str());
    }
    let arch = arch.filter(|a| KNOWN_ARCHITECTURES.contains(a))?;
    sections
        .get(&format!("{name}:{arch}"))
        .or_else(|| sections.get(&format!("{name}-{arch}")))
        .map(String::as_str)
}
