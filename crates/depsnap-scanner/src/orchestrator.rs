//! Drives the registered probes against one channel

use crate::channel::CommandChannel;
use crate::config::ResolveOptions;
use crate::error::{ScanError, ScanResult};
use crate::probe::{default_probes, Probe, ProbeContext, ProbeOutput};
use crate::report::{merge_probe_output, LocationReport, ProbeReport, Report};
use crate::types::{Dependencies, Scope};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Runs probes in registration order and merges their results
///
/// Holds no state between runs; one orchestrator can resolve any number of
/// targets, each through its own channel.
pub struct Orchestrator {
    probes: Vec<Box<dyn Probe>>,
    options: ResolveOptions,
    selected: Vec<String>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("probes", &self.probe_names())
            .field("options", &self.options)
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator over the built-in probes
    ///
    /// # Errors
    /// Returns `UnknownProbes` when the selection names unregistered probes
    pub fn new(options: ResolveOptions) -> ScanResult<Self> {
        Self::with_probes(default_probes(), options)
    }

    /// Orchestrator over an explicit, ordered probe list
    ///
    /// # Errors
    /// Returns `UnknownProbes` when the selection names probes not in `probes`
    pub fn with_probes(probes: Vec<Box<dyn Probe>>, options: ResolveOptions) -> ScanResult<Self> {
        let selected = options.selected_probes();
        let available: Vec<String> = probes.iter().map(|p| p.name().to_string()).collect();

        let invalid: Vec<String> = selected
            .iter()
            .filter(|name| !available.contains(name))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(ScanError::UnknownProbes { invalid, available });
        }

        Ok(Self {
            probes,
            options,
            selected,
        })
    }

    /// Registered probe names in order
    #[must_use]
    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    fn is_selected(&self, name: &str) -> bool {
        self.selected.is_empty() || self.selected.iter().any(|s| s == name)
    }

    /// Take one snapshot of the target behind `channel`
    ///
    /// # Errors
    /// Returns `InvalidWorkingDir` when the working directory does not exist
    /// in the target. Probe failures never surface here.
    pub fn resolve(
        &self,
        channel: &dyn CommandChannel,
        working_dir: Option<&str>,
    ) -> ScanResult<Report> {
        if let Some(dir) = working_dir {
            if !channel.path_exists(dir, None) {
                return Err(ScanError::InvalidWorkingDir(dir.to_string()));
            }
        }

        let mut report = Report::new(channel.source_info());
        if self.options.only_container_info {
            return Ok(report);
        }

        let ctx = ProbeContext {
            working_dir,
            skip_hash_collection: self.options.skip_hash_collection,
            skip_system_scope: self.options.skip_system_scope,
            venv_path: self.options.venv_path.as_deref(),
        };

        for probe in &self.probes {
            let name = probe.name();
            if !self.is_selected(name) {
                continue;
            }

            if !isolated(name, || probe.is_usable(channel, &ctx)).unwrap_or(false) {
                tracing::debug!(probe = name, "not usable");
                continue;
            }

            if self.options.skip_system_scope
                && isolated(name, || probe.has_system_scope(channel, &ctx)).unwrap_or(true)
            {
                tracing::debug!(probe = name, "skipping system scope");
                continue;
            }

            tracing::debug!(probe = name, "extracting dependencies");
            let output = isolated(name, || probe.get_dependencies(channel, &ctx))
                .unwrap_or_else(ProbeOutput::failed);

            let error = output.error.clone();
            if let Some(error) = &error {
                tracing::debug!(probe = name, error = error.as_str(), "probe reported an error");
            }

            let Some(mut result) = merge_probe_output(output) else {
                // Debug keeps failures that found nothing
                if let (true, Some(error)) = (self.options.debug, error) {
                    let system = isolated(name, || probe.has_system_scope(channel, &ctx))
                        .unwrap_or(false);
                    report.insert(name, failed_report(system, error));
                }
                continue;
            };
            if self.options.skip_hash_collection {
                result.strip_hashes();
            }
            if !self.options.debug {
                if result.is_empty() {
                    continue;
                }
                result.clear_error();
            }

            tracing::info!(
                probe = name,
                scope = %result.scope(),
                dependencies = result.dependency_count(),
                "probe finished"
            );
            report.insert(name, result);
        }

        Ok(report)
    }
}

/// Empty entry carrying the error of an extraction that found no location
fn failed_report(system: bool, error: String) -> ProbeReport {
    ProbeReport::Single(LocationReport {
        scope: if system { Scope::System } else { Scope::Project },
        location: None,
        hash: None,
        dependencies: Dependencies::new(),
        error: Some(error),
    })
}

/// Run one probe call, turning a panic into an error message
fn isolated<T>(probe: &str, call: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let message = format!("probe {probe} panicked: {}", panic_message(payload.as_ref()));
        tracing::warn!(probe, "{message}");
        message
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::testing::ScriptedChannel;

    #[test]
    fn test_unknown_selection_rejected() {
        let err = Orchestrator::new(ResolveOptions::new().with_select(["pip", "invalid1"]))
            .unwrap_err();
        match err {
            ScanError::UnknownProbes { invalid, available } => {
                assert_eq!(invalid, vec!["invalid1"]);
                assert!(available.contains(&"dpkg".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_working_dir_is_an_error() {
        let orchestrator = Orchestrator::new(ResolveOptions::new()).unwrap();
        let err = orchestrator
            .resolve(&ScriptedChannel::new(), Some("/nope"))
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidWorkingDir(_)));
    }

    #[test]
    fn test_only_container_info_runs_no_probe() {
        let channel = ScriptedChannel::new();
        let orchestrator =
            Orchestrator::new(ResolveOptions::new().with_only_container_info(true)).unwrap();
        let report = orchestrator.resolve(&channel, None).unwrap();
        assert!(report.is_empty());
        assert!(channel.log.borrow().is_empty());
    }

    #[test]
    fn test_panic_message_extraction() {
        let err = isolated("x", || -> u8 { panic!("boom") }).unwrap_err();
        assert!(err.contains("boom"));
    }
}
