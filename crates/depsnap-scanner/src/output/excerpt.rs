//! Shortened view of a report for terminals and logs

use crate::error::ScanResult;
use crate::report::Report;
use serde_json::{Map, Value};

/// Key added next to a truncated dependency map
pub const EXCERPT_KEY: &str = "_excerpt";

/// Report as JSON with each dependency map cut to `max` entries
///
/// Truncated maps gain an `_excerpt` note such as `"showing 3 of 120"`.
///
/// # Errors
/// Returns an error if serialization fails
pub fn excerpt(report: &Report, max: usize) -> ScanResult<Value> {
    let mut value = serde_json::to_value(report)?;
    if let Value::Object(root) = &mut value {
        for (name, probe) in root.iter_mut() {
            if name == "source" {
                continue;
            }
            truncate_probe(probe, max);
        }
    }
    Ok(value)
}

fn truncate_probe(probe: &mut Value, max: usize) {
    let Value::Object(fields) = probe else {
        return;
    };
    if let Some(Value::Object(locations)) = fields.get_mut("locations") {
        for location in locations.values_mut() {
            if let Value::Object(location) = location {
                truncate_dependencies(location, max);
            }
        }
    } else {
        truncate_dependencies(fields, max);
    }
}

fn truncate_dependencies(fields: &mut Map<String, Value>, max: usize) {
    let Some(Value::Object(dependencies)) = fields.get_mut("dependencies") else {
        return;
    };
    let total = dependencies.len();
    if total <= max {
        return;
    }
    let kept: Map<String, Value> = std::mem::take(dependencies).into_iter().take(max).collect();
    *dependencies = kept;
    fields.insert(
        EXCERPT_KEY.to_string(),
        Value::String(format!("showing {max} of {total}")),
    );
}
