//! Integrity hashes for packages and install locations
//!
//! Three tiers, applied independently by each probe:
//!
//! 1. Authentic per-package metadata kept by the package manager (dpkg
//!    `md5sums` files, apk checksums), folded into one digest per package.
//!    Numerous small metadata files are fetched in a single round-trip, see
//!    [`batch`].
//! 2. A location hash over the *metadata* (size, path, symlink target) of
//!    every relevant file under a project-scoped install directory.
//! 3. No hash for system-wide managers without either source.
//!
//! Every digest is rendered as 64 lowercase hex characters.

pub mod batch;

use crate::channel::{quote, CommandChannel};
use sha2::{Digest, Sha256};

/// Length of every digest produced by this module
pub const DIGEST_HEX_LEN: usize = 64;

/// SHA-256 of `content` as lowercase hex
#[must_use]
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fold a dpkg `md5sums` file into one digest
///
/// The checksum column is sorted so file order does not matter. Returns
/// `None` for empty or checksum-less content.
#[must_use]
pub fn fold_md5sums(content: &str) -> Option<String> {
    let mut sums: Vec<&str> = content
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|sum| !sum.is_empty())
        .collect();
    if sums.is_empty() {
        return None;
    }
    sums.sort_unstable();
    Some(sha256_hex(&sums.join("\n")))
}

/// Normalize an externally produced digest to the bare hex form
///
/// `sha256:<hex>` image ids become `<hex>`; anything else is returned as is.
#[must_use]
pub fn normalize_digest(value: &str) -> String {
    match value.strip_prefix("sha256:") {
        Some(hex) if hex.len() == DIGEST_HEX_LEN && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            hex.to_ascii_lowercase()
        }
        _ => value.to_string(),
    }
}

/// Which files under an install location take part in its hash
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationHashRules {
    /// Directory or file names pruned from the walk (find `-name` patterns)
    pub prune_names: &'static [&'static str],
    /// Paths pruned from the walk (find `-path` patterns)
    pub prune_paths: &'static [&'static str],
    /// File names skipped but not pruned
    pub exclude_names: &'static [&'static str],
    /// When non-empty, only these file names are hashed
    pub include_names: &'static [&'static str],
}

impl LocationHashRules {
    /// Build the `find` expression selecting files to hash
    fn find_expression(&self) -> String {
        let mut expr = String::new();
        for name in self.prune_names {
            expr.push_str(&format!("-name {} -prune -o ", quote(name)));
        }
        for path in self.prune_paths {
            expr.push_str(&format!("-path {} -prune -o ", quote(path)));
        }
        for name in self.exclude_names {
            expr.push_str(&format!("-not -name {} ", quote(name)));
        }
        if !self.include_names.is_empty() {
            let names: Vec<String> = self
                .include_names
                .iter()
                .map(|name| format!("-name {}", quote(name)))
                .collect();
            expr.push_str(&format!("\\( {} \\) ", names.join(" -o ")));
        }
        expr.push_str("\\( -type f -o -type l \\)");
        expr
    }

    /// Listing command producing one `size path [link-target]` line per file
    #[must_use]
    pub fn listing_command(&self, location: &str) -> String {
        let expr = self.find_expression();
        let loc = quote(location);
        // Check -printf support up front; busybox find lacks it and lists through stat
        format!(
            "cd {loc} && if find . -maxdepth 0 -printf '' >/dev/null 2>&1; \
             then find . {expr} -printf '%s %p %l\\n'; \
             else find . {expr} -exec stat -c '%s %n' {{}} +; fi"
        )
    }
}

/// Sort listing lines by size (numeric) then path (bytewise)
///
/// The order is fixed here rather than by the target's `sort`, so host
/// collation settings can never change a digest.
#[must_use]
pub fn canonical_listing(listing: &str) -> Vec<String> {
    let mut lines: Vec<(u64, String)> = listing
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let size = line
                .split_once(' ')
                .and_then(|(size, _)| size.parse::<u64>().ok())
                .unwrap_or(0);
            (size, line.to_string())
        })
        .collect();
    lines.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes())));
    lines.into_iter().map(|(_, line)| line).collect()
}

/// Tier-2 hash over the file metadata of an install location
///
/// Returns `None` when the location cannot be listed or holds no files.
pub fn location_hash(
    channel: &dyn CommandChannel,
    location: &str,
    rules: &LocationHashRules,
) -> Option<String> {
    let listing = channel.run_ok(&rules.listing_command(location), None)?;
    let lines = canonical_listing(&listing);
    if lines.is_empty() {
        tracing::debug!(location, "location hash listing is empty");
        return None;
    }
    Some(sha256_hex(&lines.join("\n")))
}

/// Whether a value has the fixed digest shape
#[must_use]
pub fn is_digest(value: &str) -> bool {
    value.len() == DIGEST_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}
