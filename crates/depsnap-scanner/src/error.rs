//! Error types for the depsnap scanner

use thiserror::Error;

/// Result type for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur during a snapshot
#[derive(Error, Debug)]
pub enum ScanError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The target environment cannot be contacted at all
    #[error("Target unreachable: {0}")]
    ChannelUnreachable(String),

    /// A single command ran past the channel timeout
    #[error("Command timed out after {seconds} seconds: {command}")]
    CommandTimeout { command: String, seconds: u64 },

    /// Working directory does not exist in the target
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDir(String),

    /// Probe selection names probes that are not registered
    #[error("Invalid probe names: {}. Available probes: {}", .invalid.join(", "), .available.join(", "))]
    UnknownProbes {
        invalid: Vec<String>,
        available: Vec<String>,
    },

    /// Malformed target descriptor
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Invalid configuration file
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    /// Whether this error means the target itself could not be reached
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::ChannelUnreachable(_))
    }
}
