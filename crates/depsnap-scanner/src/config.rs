//! Options controlling one resolution run

use crate::channel::DEFAULT_COMMAND_TIMEOUT;
use crate::error::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Caller options for a snapshot
///
/// Loaded from JSON with kebab-case keys; every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolveOptions {
    /// Skip probes whose natural scope is machine-wide
    pub skip_system_scope: bool,
    /// Suppress all hash computation
    pub skip_hash_collection: bool,
    /// Allow-list of probe names; empty means every probe
    pub select: Vec<String>,
    /// Explicit virtual environment for the pip probe
    pub venv_path: Option<String>,
    /// Report only the source entry
    pub only_container_info: bool,
    /// Keep empty probe entries and attach probe error notes
    pub debug: bool,
    /// Per-command timeout in seconds
    pub command_timeout_secs: u64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            skip_system_scope: false,
            skip_hash_collection: false,
            select: Vec::new(),
            venv_path: None,
            only_container_info: false,
            debug: false,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

impl ResolveOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON
    pub fn from_json_file(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content).map_err(|e| match e {
            ScanError::JsonParse(e) => ScanError::Config(format!("{}: {e}", path.display())),
            other => other,
        })
    }

    /// Parse options from a JSON string
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or has unexpected types
    pub fn from_json_str(content: &str) -> ScanResult<Self> {
        let options: Self = serde_json::from_str(content)?;
        if options.command_timeout_secs == 0 {
            return Err(ScanError::Config(
                "command-timeout-secs must be greater than zero".to_string(),
            ));
        }
        Ok(options)
    }

    #[must_use]
    pub fn with_skip_system_scope(mut self, skip: bool) -> Self {
        self.skip_system_scope = skip;
        self
    }

    #[must_use]
    pub fn with_skip_hash_collection(mut self, skip: bool) -> Self {
        self.skip_hash_collection = skip;
        self
    }

    /// Restrict the run to the named probes
    #[must_use]
    pub fn with_select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_venv_path(mut self, path: Option<String>) -> Self {
        self.venv_path = path;
        self
    }

    #[must_use]
    pub fn with_only_container_info(mut self, only: bool) -> Self {
        self.only_container_info = only;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs().max(1);
        self
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Trimmed, non-empty probe names from the selection
    #[must_use]
    pub fn selected_probes(&self) -> Vec<String> {
        self.select
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}
