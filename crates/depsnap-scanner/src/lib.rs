//! depsnap scanner - installed package snapshots for hosts and containers
//!
//! This crate inspects a target (the local host, a running container or a
//! compose project) through a command channel and reports every installed
//! package it can find, grouped by the package manager that owns it, with
//! content hashes for change detection. Scanning is read-only.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::items_after_statements,
    clippy::single_match_else,
    clippy::match_same_arms,
    clippy::option_if_let_else,
    clippy::needless_pass_by_value,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::unnecessary_wraps,
    clippy::unused_self,
    clippy::cast_precision_loss
)]

pub mod channel;
pub mod config;
pub mod error;
pub mod hash;
pub mod orchestrator;
pub mod output;
pub mod probe;
pub mod report;
pub mod resolver;
pub mod types;

pub use channel::{CommandChannel, CommandOutput, ComposeChannel, DockerChannel, HostChannel};
pub use config::ResolveOptions;
pub use error::{ScanError, ScanResult};
pub use orchestrator::Orchestrator;
pub use probe::{default_probes, LocationResult, Probe, ProbeContext, ProbeOutput};
pub use report::{merge_probe_output, ProbeReport, Report};
pub use resolver::{DependencyResolver, ResolveRequest, ResolveResult};
pub use types::{Dependencies, Dependency, Scope, SourceInfo, Target};
