//! JSON output formatter

use crate::error::ScanResult;
use crate::report::Report;

/// Convert a report to a JSON string
///
/// # Errors
/// Returns an error if serialization fails
pub fn to_json(report: &Report, pretty: bool) -> ScanResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    Ok(json)
}
