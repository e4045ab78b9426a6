//! JAR files deployed under a project directory

use super::{absolute_search_dir, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::{quote, CommandChannel};
use crate::hash::batch::SECTION_MARKER;
use crate::hash::{location_hash, LocationHashRules};
use crate::types::{Dependencies, Dependency, UNKNOWN_VERSION};
use regex::Regex;
use std::sync::OnceLock;

const HASH_RULES: LocationHashRules = LocationHashRules {
    prune_names: &[],
    prune_paths: &[],
    exclude_names: &[],
    include_names: &["*.jar"],
};

/// Manifest attributes carrying a version, in order of preference
const MANIFEST_VERSION_KEYS: &[&str] = &[
    "Implementation-Version",
    "Bundle-Version",
    "Version",
    "Specification-Version",
];

/// Probe for JAR artifacts of a Java runtime deployment
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaRuntimeProbe;

impl Probe for JavaRuntimeProbe {
    fn name(&self) -> &'static str {
        "java-runtime"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        let find = format!(
            "find {} -name '*.jar' -type f 2>/dev/null | head -1",
            quote(ctx.search_dir())
        );
        channel
            .run_ok(&find, None)
            .is_some_and(|out| !out.trim().is_empty())
            || channel.run_ok("java -version 2>&1", None).is_some()
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        false
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let search_dir = ctx.search_dir();
        let location = absolute_search_dir(channel, ctx);

        let Some(stream) = channel.run_ok(&jar_scan_script(search_dir), None) else {
            return ProbeOutput::failed(format!("JAR discovery failed in {search_dir}"))
                .with_location(LocationResult::project(location, Dependencies::new()));
        };

        let dependencies: Dependencies = parse_jar_stream(&stream)
            .into_iter()
            .map(|jar| {
                let key = relative_to(&jar.path, search_dir);
                let version = jar
                    .manifest_version
                    .or_else(|| version_from_filename(&jar.path))
                    .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
                (key, Dependency::new(version))
            })
            .collect();

        let hash = if ctx.collect_hashes() && !dependencies.is_empty() {
            location_hash(channel, &location, &HASH_RULES)
        } else {
            None
        };

        tracing::debug!(probe = self.name(), jars = dependencies.len(), "scanned jars");
        ProbeOutput::single(LocationResult::project(location, dependencies).with_hash(hash))
    }
}

/// One jar found by the scan script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarEntry {
    pub path: String,
    pub size: u64,
    pub manifest_version: Option<String>,
}

/// Script listing every jar with its size and manifest in one round-trip
fn jar_scan_script(search_dir: &str) -> String {
    format!(
        "find {dir} -name '*.jar' -type f 2>/dev/null | while IFS= read -r jar; do\n  \
           size=$(stat -c %s \"$jar\" 2>/dev/null || stat -f %z \"$jar\" 2>/dev/null || echo 0)\n  \
           echo \"{SECTION_MARKER} $size $jar\"\n  \
           unzip -q -c \"$jar\" META-INF/MANIFEST.MF 2>/dev/null\n  \
           echo\n\
         done",
        dir = quote(search_dir)
    )
}

/// Split the scan output into jars, reading versions from each manifest
#[must_use]
pub fn parse_jar_stream(stream: &str) -> Vec<JarEntry> {
    let mut jars: Vec<JarEntry> = Vec::new();
    for line in stream.lines() {
        if let Some(header) = line.strip_prefix(SECTION_MARKER) {
            let header = header.trim();
            let (size, path) = header.split_once(' ').unwrap_or(("0", header));
            jars.push(JarEntry {
                path: path.to_string(),
                size: size.parse().unwrap_or(0),
                manifest_version: None,
            });
        } else if let Some(jar) = jars.last_mut() {
            if jar.manifest_version.is_none() {
                jar.manifest_version = manifest_version(line);
            }
        }
    }
    jars
}

fn manifest_version(line: &str) -> Option<String> {
    let (key, value) = line.trim().split_once(':')?;
    let value = value.trim();
    (MANIFEST_VERSION_KEYS.contains(&key.trim()) && !value.is_empty() && value != "null")
        .then(|| value.to_string())
}

/// Version embedded in a jar file name (`name-1.2.3.jar`, `name_v2.jar`)
#[must_use]
pub fn version_from_filename(path: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            r"^(.+)[-_](\d+(?:\.\d+)*(?:-[A-Za-z0-9]+)?)$",
            r"^(.+)[-_]v(\d+(?:\.\d+)*)$",
            r"^(.+?)(\d+(?:\.\d+)*(?:-[A-Za-z0-9]+)?)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    });

    let file = path.rsplit('/').next().unwrap_or(path);
    let base = file.strip_suffix(".jar").unwrap_or(file);
    patterns
        .iter()
        .find_map(|re| re.captures(base).map(|cap| cap[2].to_string()))
}

fn relative_to(path: &str, dir: &str) -> String {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    path.strip_prefix(&prefix)
        .or_else(|| path.strip_prefix("./"))
        .unwrap_or(path)
        .to_string()
}
