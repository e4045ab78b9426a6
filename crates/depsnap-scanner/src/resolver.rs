//! Entry point for callers: resolve one target or many in parallel
//!
//! Every request gets its own channel and orchestrator pass, so batches run
//! independent snapshots on a bounded thread pool with nothing shared but
//! the options.

use crate::channel::{CommandChannel, ComposeChannel, DockerChannel, HostChannel};
use crate::config::ResolveOptions;
use crate::error::{ScanError, ScanResult};
use crate::orchestrator::Orchestrator;
use crate::report::Report;
use crate::types::Target;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Default number of concurrent requests in a batch
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// One target to snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub target: Target,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Overrides the resolver's options for this request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ResolveOptions>,
}

impl ResolveRequest {
    #[must_use]
    pub fn new(target: Target) -> Self {
        Self {
            target,
            working_dir: None,
            options: None,
        }
    }

    #[must_use]
    pub fn host() -> Self {
        Self::new(Target::Host)
    }

    #[must_use]
    pub fn docker(container: impl Into<String>) -> Self {
        Self::new(Target::Docker {
            container: container.into(),
        })
    }

    #[must_use]
    pub fn docker_compose(stack: impl Into<String>) -> Self {
        Self::new(Target::DockerCompose {
            stack: stack.into(),
        })
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: ResolveOptions) -> Self {
        self.options = Some(options);
        self
    }
}

fn as_secs<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Outcome of one request in a batch
#[derive(Debug, Serialize)]
pub struct ResolveResult {
    pub request: ResolveRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "execution_time", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub success: bool,
}

impl ResolveResult {
    fn finished(request: ResolveRequest, outcome: ScanResult<Report>, elapsed: Duration) -> Self {
        match outcome {
            Ok(report) => Self {
                request,
                report: Some(report),
                error: None,
                elapsed,
                success: true,
            },
            Err(e) => Self {
                request,
                report: None,
                error: Some(e.to_string()),
                elapsed,
                success: false,
            },
        }
    }

    fn skipped(request: ResolveRequest) -> Self {
        Self {
            request,
            report: None,
            error: Some("skipped after an earlier request failed".to_string()),
            elapsed: Duration::ZERO,
            success: false,
        }
    }
}

/// Progress callback: `(completed, total, result)`
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize, &ResolveResult) + Sync);

/// Builds channels for targets and runs the orchestrator over them
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    options: ResolveOptions,
    max_workers: usize,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new(ResolveOptions::default())
    }
}

impl DependencyResolver {
    #[must_use]
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            options,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Bound the number of requests resolved at once
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Open a channel to a target
    ///
    /// # Errors
    /// Returns `ChannelUnreachable` when the target cannot be contacted
    pub fn connect(target: &Target, timeout: Duration) -> ScanResult<Box<dyn CommandChannel>> {
        Ok(match target {
            Target::Host => Box::new(HostChannel::new().with_timeout(timeout)),
            Target::Docker { container } => {
                Box::new(DockerChannel::connect_with_timeout(container, timeout)?)
            }
            Target::DockerCompose { stack } => {
                Box::new(ComposeChannel::connect_with_timeout(stack, timeout)?)
            }
        })
    }

    /// Snapshot a single target
    ///
    /// # Errors
    /// Returns an error when the options are invalid, the target is
    /// unreachable or the working directory does not exist
    pub fn resolve(&self, request: &ResolveRequest) -> ScanResult<Report> {
        let options = request.options.clone().unwrap_or_else(|| self.options.clone());
        let timeout = options.command_timeout();
        let orchestrator = Orchestrator::new(options)?;

        tracing::debug!(target = request.target.kind(), "connecting");
        let channel = Self::connect(&request.target, timeout)?;
        orchestrator.resolve(channel.as_ref(), request.working_dir.as_deref())
    }

    /// Snapshot many targets concurrently
    ///
    /// Results come back in request order. With `fail_fast`, requests not yet
    /// started when one fails are recorded as skipped.
    ///
    /// # Errors
    /// Returns an error only if the thread pool cannot be created
    pub fn resolve_batch(
        &self,
        requests: Vec<ResolveRequest>,
        progress: Option<ProgressFn<'_>>,
        fail_fast: bool,
    ) -> ScanResult<Vec<ResolveResult>> {
        let total = requests.len();
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .map_err(|e| ScanError::Config(format!("cannot start worker pool: {e}")))?;

        let failed = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);

        let results = pool.install(|| {
            requests
                .into_par_iter()
                .map(|request| {
                    let result = if fail_fast && failed.load(Ordering::SeqCst) {
                        ResolveResult::skipped(request)
                    } else {
                        let start = Instant::now();
                        let outcome = self.resolve(&request);
                        ResolveResult::finished(request, outcome, start.elapsed())
                    };

                    if !result.success {
                        failed.store(true, Ordering::SeqCst);
                    }
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(progress) = progress {
                        progress(done, total, &result);
                    }
                    result
                })
                .collect::<Vec<_>>()
        });

        let failures = results.iter().filter(|r| !r.success).count();
        tracing::info!(total, failures, "batch finished");
        Ok(results)
    }

    /// Batch results as one JSON object keyed by target identifier
    ///
    /// Requests without an identifier, or with a repeated one, are keyed
    /// `request_<index>`.
    ///
    /// # Errors
    /// Returns an error if the thread pool cannot be created
    pub fn resolve_batch_as_json(
        &self,
        requests: Vec<ResolveRequest>,
        fail_fast: bool,
    ) -> ScanResult<serde_json::Value> {
        let results = self.resolve_batch(requests, None, fail_fast)?;
        let mut object = serde_json::Map::new();

        for (index, result) in results.into_iter().enumerate() {
            let key = match result.request.target.identifier() {
                Some(id) if !object.contains_key(id) => id.to_string(),
                _ => format!("request_{index}"),
            };
            let value = match (result.report, result.error) {
                (Some(report), _) => serde_json::to_value(&report)?,
                (None, error) => serde_json::json!({
                    "error": error.unwrap_or_default(),
                    "success": false,
                }),
            };
            object.insert(key, value);
        }

        Ok(serde_json::Value::Object(object))
    }
}
