//! Markdown output formatter

use crate::report::{LocationReport, ProbeReport, Report};
use crate::types::SourceInfo;
use chrono::Utc;

/// Convert a report to a Markdown summary
#[must_use]
pub fn to_markdown(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Dependency Snapshot\n\n");
    output.push_str(&format!(
        "**Generated at:** {}\n\n",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("## Source\n\n");
    match &report.source {
        Some(SourceInfo::Host { os, kernel }) => {
            output.push_str(&format!("- **Type:** host\n- **OS:** {os}\n"));
            if let Some(kernel) = kernel {
                output.push_str(&format!("- **Kernel:** {kernel}\n"));
            }
        }
        Some(SourceInfo::Container {
            name,
            image,
            hash,
            error,
        }) => {
            output.push_str(&format!(
                "- **Type:** container\n- **Name:** {name}\n- **Image:** {image}\n- **Image hash:** `{hash}`\n"
            ));
            if let Some(error) = error {
                output.push_str(&format!("- **Error:** {error}\n"));
            }
        }
        Some(SourceInfo::Compose { stack }) => {
            output.push_str(&format!("- **Type:** compose\n- **Stack:** {stack}\n"));
        }
        None => output.push_str("_Unknown_\n"),
    }
    output.push('\n');

    output.push_str("## Probes\n\n");
    if report.is_empty() {
        output.push_str("_No dependencies found_\n");
        return output;
    }

    output.push_str("| Probe | Scope | Location | Dependencies | Hash |\n");
    output.push_str("|-------|-------|----------|--------------|------|\n");
    for (name, result) in report.probes() {
        match result {
            ProbeReport::Single(single) => push_row(&mut output, name, single),
            ProbeReport::Mixed(mixed) => {
                for location in mixed.locations.values() {
                    push_row(&mut output, name, location);
                }
            }
        }
    }
    output.push_str(&format!(
        "\n**Total:** {} dependencies\n",
        report.dependency_count()
    ));

    let errors: Vec<(&str, &str)> = report
        .probes()
        .filter_map(|(name, r)| r.error().map(|e| (name, e)))
        .collect();
    if !errors.is_empty() {
        output.push_str("\n### Errors\n\n");
        for (name, error) in errors {
            output.push_str(&format!("- **{name}:** {error}\n"));
        }
    }

    output
}

fn push_row(output: &mut String, probe: &str, location: &LocationReport) {
    let hash = location
        .hash
        .as_deref()
        .map_or_else(|| "-".to_string(), |h| format!("`{}`", &h[..h.len().min(12)]));
    output.push_str(&format!(
        "| {probe} | {} | {} | {} | {hash} |\n",
        location.scope,
        location.location.as_deref().unwrap_or("-"),
        location.dependencies.len(),
    ));
}
