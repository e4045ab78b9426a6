//! Report model and per-probe result merging

use crate::probe::{LocationResult, ProbeOutput};
use crate::types::{Dependencies, Scope, SourceInfo};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

/// One location of a probe result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationReport {
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub dependencies: Dependencies,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Several locations found by one probe in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MixedReport {
    /// Always [`Scope::Mixed`]
    pub scope: Scope,
    /// Keyed by install path
    pub locations: BTreeMap<String, LocationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Merged result of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProbeReport {
    Single(LocationReport),
    Mixed(MixedReport),
}

impl ProbeReport {
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self {
            ProbeReport::Single(single) => single.scope,
            ProbeReport::Mixed(_) => Scope::Mixed,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeReport::Single(single) => single.error.as_deref(),
            ProbeReport::Mixed(mixed) => mixed.error.as_deref(),
        }
    }

    /// Total dependencies across all locations
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.locations().map(|l| l.dependencies.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependency_count() == 0
    }

    /// Every location of this result, in key order for mixed results
    pub fn locations(&self) -> Box<dyn Iterator<Item = &LocationReport> + '_> {
        match self {
            ProbeReport::Single(single) => Box::new(std::iter::once(single)),
            ProbeReport::Mixed(mixed) => Box::new(mixed.locations.values()),
        }
    }

    /// Dependencies of a single-location result
    #[must_use]
    pub fn dependencies(&self) -> Option<&Dependencies> {
        match self {
            ProbeReport::Single(single) => Some(&single.dependencies),
            ProbeReport::Mixed(_) => None,
        }
    }

    pub fn clear_error(&mut self) {
        match self {
            ProbeReport::Single(single) => single.error = None,
            ProbeReport::Mixed(mixed) => mixed.error = None,
        }
    }

    /// Remove every hash field
    pub fn strip_hashes(&mut self) {
        let strip = |location: &mut LocationReport| {
            location.hash = None;
            for dependency in location.dependencies.values_mut() {
                dependency.hash = None;
            }
        };
        match self {
            ProbeReport::Single(single) => strip(single),
            ProbeReport::Mixed(mixed) => mixed.locations.values_mut().for_each(strip),
        }
    }
}

fn location_report(result: LocationResult, keep_path: bool) -> LocationReport {
    LocationReport {
        scope: result.scope,
        // System-wide results carry no location of their own
        location: result
            .location
            .filter(|_| keep_path && result.scope != Scope::System),
        hash: result.hash,
        dependencies: result.dependencies,
        error: None,
    }
}

/// Merge a probe's locations into one result
///
/// Locations with at least one dependency count towards `mixed`; two or
/// more distinct ones are kept side by side, keyed by path. A single one
/// collapses to its natural scope. Returns `None` when the probe returned
/// no location at all.
#[must_use]
pub fn merge_probe_output(output: ProbeOutput) -> Option<ProbeReport> {
    let ProbeOutput { locations, error } = output;

    let mut populated: Vec<LocationResult> = Vec::new();
    let mut empty: Vec<LocationResult> = Vec::new();
    for location in locations {
        if location.is_empty() {
            empty.push(location);
        } else if !populated
            .iter()
            .any(|p| p.location == location.location && p.scope == location.scope)
        {
            populated.push(location);
        }
    }

    if populated.len() >= 2 {
        let locations = populated
            .into_iter()
            .map(|result| {
                let key = result
                    .location
                    .clone()
                    .unwrap_or_else(|| result.scope.as_str().to_string());
                (key, location_report(result, false))
            })
            .collect();
        return Some(ProbeReport::Mixed(MixedReport {
            scope: Scope::Mixed,
            locations,
            error,
        }));
    }

    let chosen = populated.pop().or_else(|| empty.into_iter().next())?;
    let mut single = location_report(chosen, true);
    single.error = error;
    Some(ProbeReport::Single(single))
}

/// The full snapshot of one target
///
/// Serialized as a JSON object: `source` first, then one key per probe in
/// registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub source: Option<SourceInfo>,
    probes: Vec<(String, ProbeReport)>,
}

impl Report {
    #[must_use]
    pub fn new(source: Option<SourceInfo>) -> Self {
        Self {
            source,
            probes: Vec::new(),
        }
    }

    /// Add a probe result; a repeated name replaces the earlier entry
    pub fn insert(&mut self, name: impl Into<String>, result: ProbeReport) {
        let name = name.into();
        match self.probes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = result,
            None => self.probes.push((name, result)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProbeReport> {
        self.probes.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Probe names in report order
    pub fn probe_names(&self) -> impl Iterator<Item = &str> {
        self.probes.iter().map(|(name, _)| name.as_str())
    }

    pub fn probes(&self) -> impl Iterator<Item = (&str, &ProbeReport)> {
        self.probes.iter().map(|(name, r)| (name.as_str(), r))
    }

    pub fn probes_mut(&mut self) -> impl Iterator<Item = (&str, &mut ProbeReport)> {
        self.probes.iter_mut().map(|(name, r)| (name.as_str(), r))
    }

    /// Whether no probe produced a result
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.probes.iter().map(|(_, r)| r.dependency_count()).sum()
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.probes.len() + usize::from(self.source.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(source) = &self.source {
            map.serialize_entry("source", source)?;
        }
        for (name, result) in &self.probes {
            map.serialize_entry(name, result)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dependency;

    fn deps(names: &[&str]) -> Dependencies {
        names
            .iter()
            .map(|n| ((*n).to_string(), Dependency::new("1.0")))
            .collect()
    }

    #[test]
    fn test_single_location_collapses_to_natural_scope() {
        let output = ProbeOutput::single(
            LocationResult::project("/app", deps(&["a"])).with_hash(Some("f".repeat(64))),
        );
        let merged = merge_probe_output(output).unwrap();
        assert_eq!(merged.scope(), Scope::Project);
        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["location"], "/app");
        assert_eq!(json["hash"], "f".repeat(64));
    }

    #[test]
    fn test_two_locations_become_mixed() {
        let mut system = LocationResult::system(deps(&["a", "b", "c", "d", "e"]));
        system.location = Some("/usr/lib/python3/dist-packages".to_string());
        let output = ProbeOutput::single(LocationResult::project("/app/.venv", deps(&["x", "y"])))
            .with_location(system);

        let merged = merge_probe_output(output).unwrap();
        let ProbeReport::Mixed(mixed) = &merged else {
            panic!("expected mixed result");
        };
        assert_eq!(mixed.locations.len(), 2);
        assert_eq!(mixed.locations["/app/.venv"].dependencies.len(), 2);
        assert_eq!(
            mixed.locations["/usr/lib/python3/dist-packages"].scope,
            Scope::System
        );
        assert_eq!(merged.dependency_count(), 7);

        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(json["scope"], "mixed");
        assert!(json.get("dependencies").is_none());
    }

    #[test]
    fn test_empty_location_does_not_make_mixed() {
        let output = ProbeOutput::single(LocationResult::project("/app", Dependencies::new()))
            .with_location(LocationResult::system(deps(&["a"])));
        let merged = merge_probe_output(output).unwrap();
        assert_eq!(merged.scope(), Scope::System);
    }

    #[test]
    fn test_system_scope_hides_location() {
        let mut system = LocationResult::system(deps(&["a"]));
        system.location = Some("/usr/lib".to_string());
        let merged = merge_probe_output(ProbeOutput::single(system)).unwrap();
        let json = serde_json::to_value(&merged).unwrap();
        assert!(json.get("location").is_none());
    }

    #[test]
    fn test_no_locations_is_none() {
        assert!(merge_probe_output(ProbeOutput::failed("x")).is_none());
    }

    #[test]
    fn test_strip_hashes() {
        let mut dependencies = deps(&["a"]);
        dependencies.insert(
            "b".to_string(),
            Dependency::new("2").with_hash(Some("0".repeat(64))),
        );
        let mut merged = merge_probe_output(ProbeOutput::single(
            LocationResult::project("/app", dependencies).with_hash(Some("1".repeat(64))),
        ))
        .unwrap();
        merged.strip_hashes();
        let json = serde_json::to_string(&merged).unwrap();
        assert!(!json.contains("hash"));
    }

    #[test]
    fn test_report_keeps_probe_order_after_source() {
        let mut report = Report::new(Some(SourceInfo::current_host(None)));
        for name in ["dpkg", "apk", "pip"] {
            report.insert(
                name,
                merge_probe_output(ProbeOutput::single(LocationResult::system(deps(&["a"]))))
                    .unwrap(),
            );
        }
        let json = serde_json::to_string(&report).unwrap();
        let source = json.find("\"source\"").unwrap();
        let dpkg = json.find("\"dpkg\"").unwrap();
        let apk = json.find("\"apk\"").unwrap();
        let pip = json.find("\"pip\"").unwrap();
        assert!(source < dpkg && dpkg < apk && apk < pip);
    }
}
