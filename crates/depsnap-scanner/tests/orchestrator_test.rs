//! Orchestrator integration tests
//!
//! Runs the full resolve pipeline with scripted probes against a fake
//! channel and, where real commands matter, the host channel on a temp dir.

use depsnap_scanner::channel::CommandChannel;
use depsnap_scanner::hash::batch::MetadataDir;
use depsnap_scanner::{
    CommandOutput, Dependencies, Dependency, HostChannel, LocationResult, Orchestrator, Probe,
    ProbeContext, ProbeOutput, ProbeReport, ResolveOptions, ScanResult, Scope, SourceInfo, Target,
};
use std::fs;
use tempfile::TempDir;

/// Channel that accepts every path and answers every command with success
struct FakeChannel {
    target: Target,
}

impl FakeChannel {
    fn new() -> Self {
        Self {
            target: Target::Host,
        }
    }
}

impl CommandChannel for FakeChannel {
    fn execute(&self, _command: &str, _working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        Ok(CommandOutput::new("", "", 0))
    }

    fn path_exists(&self, _path: &str, _working_dir: Option<&str>) -> bool {
        true
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn source_info(&self) -> Option<SourceInfo> {
        Some(SourceInfo::Host {
            os: "linux".to_string(),
            kernel: None,
        })
    }
}

fn deps(entries: &[(&str, &str)]) -> Dependencies {
    entries
        .iter()
        .map(|(name, version)| ((*name).to_string(), Dependency::new(*version)))
        .collect()
}

/// Probe returning a fixed output
struct FixedProbe {
    name: &'static str,
    usable: bool,
    system: bool,
    output: ProbeOutput,
}

impl FixedProbe {
    fn system(name: &'static str, dependencies: Dependencies) -> Self {
        Self {
            name,
            usable: true,
            system: true,
            output: ProbeOutput::single(LocationResult::system(dependencies)),
        }
    }

    fn project(name: &'static str, location: &str, dependencies: Dependencies) -> Self {
        Self {
            name,
            usable: true,
            system: false,
            output: ProbeOutput::single(
                LocationResult::project(location, dependencies).with_hash(Some("c".repeat(64))),
            ),
        }
    }

    fn unusable(mut self) -> Self {
        self.usable = false;
        self
    }
}

impl Probe for FixedProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_usable(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        self.usable
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        self.system
    }

    fn get_dependencies(
        &self,
        _channel: &dyn CommandChannel,
        _ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        self.output.clone()
    }
}

/// Probe that panics during extraction
struct PanickingProbe;

impl Probe for PanickingProbe {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn is_usable(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        true
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        false
    }

    fn get_dependencies(
        &self,
        _channel: &dyn CommandChannel,
        _ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        panic!("database is corrupt")
    }
}

/// System package manager reading md5sums files from a metadata directory
struct MetadataProbe {
    dir: String,
}

impl Probe for MetadataProbe {
    fn name(&self) -> &'static str {
        "dpkg-like"
    }

    fn is_usable(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        true
    }

    fn has_system_scope(&self, _channel: &dyn CommandChannel, _ctx: &ProbeContext<'_>) -> bool {
        true
    }

    fn get_dependencies(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> ProbeOutput {
        let metadata = MetadataDir {
            dir: &self.dir,
            extension: "md5sums",
        };
        let hashes = if ctx.collect_hashes() {
            metadata.md5sums_digests(channel, &[("foo", Some("amd64"))])
        } else {
            Default::default()
        };
        let foo = Dependency::new("1.0 amd64").with_hash(hashes.get("foo").cloned());
        let dependencies = [("foo".to_string(), foo)].into_iter().collect();
        ProbeOutput::single(LocationResult::system(dependencies))
    }
}

fn three_probes() -> Vec<Box<dyn Probe>> {
    vec![
        Box::new(FixedProbe::system("dpkg", deps(&[("libc6", "2.36 amd64")]))),
        Box::new(FixedProbe::project("pip", "/app/.venv", deps(&[("flask", "3.0.0")]))),
        Box::new(FixedProbe::project("npm", "/app", deps(&[("express", "4.18.2")]))),
    ]
}

#[test]
fn test_metadata_hash_end_to_end() {
    let metadata = TempDir::new().unwrap();
    fs::write(
        metadata.path().join("foo:amd64.md5sums"),
        "d41d8cd98f00b204e9800998ecf8427e  usr/bin/foo\n",
    )
    .unwrap();

    let probe = MetadataProbe {
        dir: metadata.path().to_string_lossy().to_string(),
    };
    let orchestrator =
        Orchestrator::with_probes(vec![Box::new(probe)], ResolveOptions::new()).unwrap();
    let report = orchestrator.resolve(&HostChannel::new(), None).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    let entry = &json["dpkg-like"];
    assert_eq!(entry["scope"], "system");
    assert_eq!(entry["dependencies"]["foo"]["version"], "1.0 amd64");
    let hash = entry["dependencies"]["foo"]["hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_mixed_locations_reported_side_by_side() {
    let venv = LocationResult::project("/app/.venv", deps(&[("flask", "3.0"), ("jinja2", "3.1")]));
    let mut system = LocationResult::system(deps(&[
        ("a", "1"),
        ("b", "1"),
        ("c", "1"),
        ("d", "1"),
        ("e", "1"),
    ]));
    system.location = Some("/usr/lib/python3/dist-packages".to_string());

    let probe = FixedProbe {
        name: "pip",
        usable: true,
        system: false,
        output: ProbeOutput::single(venv).with_location(system),
    };
    let orchestrator =
        Orchestrator::with_probes(vec![Box::new(probe)], ResolveOptions::new()).unwrap();
    let report = orchestrator.resolve(&FakeChannel::new(), None).unwrap();

    let Some(ProbeReport::Mixed(mixed)) = report.get("pip") else {
        panic!("expected a mixed pip result");
    };
    let mut sizes: Vec<usize> = mixed
        .locations
        .values()
        .map(|l| l.dependencies.len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 5]);
}

#[test]
fn test_selection_limits_report() {
    let orchestrator = Orchestrator::with_probes(
        three_probes(),
        ResolveOptions::new().with_select(["pip"]),
    )
    .unwrap();
    let report = orchestrator.resolve(&FakeChannel::new(), Some("/app")).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert!(json.get("source").is_some());
    assert!(json.get("pip").is_some());
}

#[test]
fn test_panicking_probe_is_isolated() {
    let mut probes = three_probes();
    probes.insert(1, Box::new(PanickingProbe));
    let orchestrator = Orchestrator::with_probes(probes, ResolveOptions::new()).unwrap();

    let report = orchestrator.resolve(&FakeChannel::new(), None).unwrap();
    let names: Vec<&str> = report.probe_names().collect();
    assert_eq!(names, vec!["dpkg", "pip", "npm"]);

    let debug = Orchestrator::with_probes(
        vec![Box::new(PanickingProbe) as Box<dyn Probe>],
        ResolveOptions::new().with_debug(true),
    )
    .unwrap();
    let report = debug.resolve(&FakeChannel::new(), None).unwrap();
    let broken = report.get("broken").unwrap();
    assert!(broken.is_empty());
    assert_eq!(broken.scope(), Scope::Project);
    let error = broken.error().unwrap();
    assert!(error.contains("panicked"));
    assert!(error.contains("database is corrupt"));
}

#[test]
fn test_failed_extraction_reported_only_in_debug() {
    let failing = || {
        let mut dpkg = FixedProbe::system("dpkg", Dependencies::new());
        dpkg.output = ProbeOutput::failed("dpkg-query exited with 2: database locked");
        vec![Box::new(dpkg) as Box<dyn Probe>]
    };

    let quiet = Orchestrator::with_probes(failing(), ResolveOptions::new()).unwrap();
    let report = quiet.resolve(&FakeChannel::new(), None).unwrap();
    assert!(report.get("dpkg").is_none());

    let debug =
        Orchestrator::with_probes(failing(), ResolveOptions::new().with_debug(true)).unwrap();
    let report = debug.resolve(&FakeChannel::new(), None).unwrap();
    let dpkg = report.get("dpkg").unwrap();
    assert_eq!(dpkg.scope(), Scope::System);
    assert!(dpkg.is_empty());
    assert_eq!(dpkg.error(), Some("dpkg-query exited with 2: database locked"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dpkg"]["scope"], "system");
    assert_eq!(json["dpkg"]["error"], "dpkg-query exited with 2: database locked");
}

#[test]
fn test_unusable_probe_absent() {
    let probes: Vec<Box<dyn Probe>> = vec![
        Box::new(FixedProbe::system("dpkg", deps(&[("libc6", "2.36")])).unusable()),
        Box::new(FixedProbe::system("apk", deps(&[("musl", "1.2.4-r2 x86_64")]))),
    ];
    let orchestrator = Orchestrator::with_probes(probes, ResolveOptions::new()).unwrap();
    let report = orchestrator.resolve(&FakeChannel::new(), None).unwrap();
    assert!(report.get("dpkg").is_none());
    assert_eq!(report.get("apk").unwrap().scope(), Scope::System);
}

#[test]
fn test_skip_system_scope_and_hashes() {
    let orchestrator = Orchestrator::with_probes(
        three_probes(),
        ResolveOptions::new()
            .with_skip_system_scope(true)
            .with_skip_hash_collection(true),
    )
    .unwrap();
    let report = orchestrator.resolve(&FakeChannel::new(), None).unwrap();

    assert!(report.get("dpkg").is_none());
    assert!(report.get("pip").is_some());
    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("\"hash\""));
}

#[test]
fn test_empty_probe_kept_only_in_debug() {
    let empty = || -> Vec<Box<dyn Probe>> {
        vec![Box::new(FixedProbe {
            name: "npm",
            usable: true,
            system: false,
            output: ProbeOutput {
                locations: vec![LocationResult::project("/app", Dependencies::new())],
                error: Some("npm list exited with 1".to_string()),
            },
        })]
    };

    let quiet = Orchestrator::with_probes(empty(), ResolveOptions::new()).unwrap();
    assert!(quiet.resolve(&FakeChannel::new(), None).unwrap().is_empty());

    let debug = Orchestrator::with_probes(empty(), ResolveOptions::new().with_debug(true)).unwrap();
    let report = debug.resolve(&FakeChannel::new(), None).unwrap();
    assert_eq!(
        report.get("npm").unwrap().error(),
        Some("npm list exited with 1")
    );
}

#[test]
fn test_resolution_is_idempotent() {
    let orchestrator = Orchestrator::with_probes(three_probes(), ResolveOptions::new()).unwrap();
    let first = orchestrator.resolve(&FakeChannel::new(), None).unwrap();
    let second = orchestrator.resolve(&FakeChannel::new(), None).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}
