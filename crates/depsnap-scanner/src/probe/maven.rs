//! Maven project dependencies declared in `pom.xml`

use super::{absolute_search_dir, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::{join_path, quote, CommandChannel};
use crate::hash::{location_hash, LocationHashRules};
use crate::types::{Dependencies, Dependency, UNKNOWN_VERSION};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const HASH_RULES: LocationHashRules = LocationHashRules {
    prune_names: &[".git", ".idea", "node_modules"],
    prune_paths: &[],
    exclude_names: &[],
    include_names: &["pom.xml", "*.jar"],
};

/// Sections whose `<dependency>` entries are not project dependencies
const IGNORED_SECTIONS: &[&str] = &["dependencyManagement", "build", "profiles", "reporting"];

/// Probe for dependencies of a Maven project
#[derive(Debug, Default, Clone, Copy)]
pub struct MavenProbe;

impl Probe for MavenProbe {
    fn name(&self) -> &'static str {
        "maven"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        channel.path_exists(&join_path(ctx.search_dir(), "pom.xml"), None)
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        false
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let pom_path = join_path(ctx.search_dir(), "pom.xml");
        let Some(pom) = channel.run_ok(&format!("cat {}", quote(&pom_path)), None) else {
            return ProbeOutput::failed(format!("could not read {pom_path}"));
        };

        let dependencies = parse_pom(&pom);
        let location = absolute_search_dir(channel, ctx);
        let hash = if ctx.collect_hashes() && !dependencies.is_empty() {
            location_hash(channel, &location, &HASH_RULES)
        } else {
            None
        };

        tracing::debug!(probe = self.name(), dependencies = dependencies.len(), "parsed pom.xml");
        ProbeOutput::single(LocationResult::project(location, dependencies).with_hash(hash))
    }
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(xml[start..end].trim())
}

/// Remove every `<tag>...</tag>` block
fn strip_section(xml: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(&close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Properties usable in `${...}` references
fn collect_properties(pom: &str) -> HashMap<String, String> {
    static PROPERTY: OnceLock<Regex> = OnceLock::new();
    let re = regex(&PROPERTY, r"<([A-Za-z_][\w.\-]*)>\s*([^<]*?)\s*</([A-Za-z_][\w.\-]*)>");

    let mut properties = HashMap::new();
    if let Some(block) = element_text(pom, "properties") {
        for cap in re.captures_iter(block) {
            if cap[1] == cap[3] {
                properties.insert(cap[1].to_string(), cap[2].to_string());
            }
        }
    }

    let mut top_level = strip_section(pom, "parent");
    for section in ["dependencies", "properties", "modules"]
        .iter()
        .chain(IGNORED_SECTIONS)
    {
        top_level = strip_section(&top_level, section);
    }
    let parent_version = element_text(pom, "parent").and_then(|p| element_text(p, "version"));
    if let Some(version) = element_text(&top_level, "version").or(parent_version) {
        properties.insert("project.version".to_string(), version.to_string());
        properties.insert("version".to_string(), version.to_string());
    }
    if let Some(group) = element_text(&top_level, "groupId") {
        properties.insert("project.groupId".to_string(), group.to_string());
    }
    properties
}

fn resolve_properties(value: &str, properties: &HashMap<String, String>) -> String {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    let re = regex(&REFERENCE, r"\$\{([^}]+)\}");
    re.replace_all(value, |cap: &regex::Captures<'_>| {
        properties
            .get(&cap[1])
            .cloned()
            .unwrap_or_else(|| cap[0].to_string())
    })
    .into_owned()
}

/// Parse the direct, non-test dependencies of a POM
#[must_use]
pub fn parse_pom(pom: &str) -> Dependencies {
    static COMMENT: OnceLock<Regex> = OnceLock::new();
    static DEPENDENCY: OnceLock<Regex> = OnceLock::new();

    let pom = regex(&COMMENT, r"(?s)<!--.*?-->").replace_all(pom, "");
    let properties = collect_properties(&pom);

    let mut body = pom.into_owned();
    for section in IGNORED_SECTIONS {
        body = strip_section(&body, section);
    }

    let mut dependencies = Dependencies::new();
    for cap in regex(&DEPENDENCY, r"(?s)<dependency>(.*?)</dependency>").captures_iter(&body) {
        let entry = &cap[1];
        if element_text(entry, "scope") == Some("test") {
            continue;
        }
        let (Some(group), Some(artifact)) =
            (element_text(entry, "groupId"), element_text(entry, "artifactId"))
        else {
            continue;
        };
        let version = element_text(entry, "version")
            .map_or_else(|| UNKNOWN_VERSION.to_string(), |v| resolve_properties(v, &properties));
        let name = format!(
            "{}:{}",
            resolve_properties(group, &properties),
            resolve_properties(artifact, &properties)
        );
        dependencies.insert(name, Dependency::new(version));
    }
    dependencies
}
