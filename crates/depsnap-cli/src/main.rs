//! depsnap CLI - snapshot installed packages of a host, container or compose stack
//!
//! Prints one JSON report on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use depsnap_scanner::output::{excerpt, to_json, to_markdown};
use depsnap_scanner::{DependencyResolver, ResolveOptions, ResolveRequest, ResolveResult, Target};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "DEPSNAP_LOG";

#[derive(Parser)]
#[command(name = "depsnap")]
#[command(about = "depsnap - snapshot installed dependencies of hosts and containers")]
#[command(version)]
struct Cli {
    /// Kind of target to scan
    #[arg(value_enum, default_value = "host")]
    target: TargetKind,

    /// Container id/name or compose project name
    #[arg(value_name = "IDENTIFIER")]
    identifier: Option<String>,

    /// Project directory inside the target
    #[arg(short, long)]
    working_dir: Option<String>,

    /// Explicit Python virtual environment
    #[arg(long)]
    venv_path: Option<String>,

    /// Skip machine-wide package managers
    #[arg(long)]
    skip_system_scope: bool,

    /// Do not compute any hashes
    #[arg(long)]
    skip_hash_collection: bool,

    /// Only run these probes (comma separated)
    #[arg(long, value_delimiter = ',')]
    select: Vec<String>,

    /// Report only the source description
    #[arg(long)]
    only_container_info: bool,

    /// JSON options file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Indent JSON output
    #[arg(long)]
    pretty_print: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Truncate each dependency list to N entries
    #[arg(long, value_name = "N")]
    excerpt: Option<usize>,

    /// Resolve every request in a JSON file instead of a single target
    #[arg(long, value_name = "FILE", conflicts_with = "identifier")]
    batch: Option<PathBuf>,

    /// Concurrent requests in batch mode
    #[arg(long, default_value_t = depsnap_scanner::resolver::DEFAULT_MAX_WORKERS)]
    max_workers: usize,

    /// Stop starting new batch requests after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Verbose logging, keep empty probe entries with error notes
    #[arg(long)]
    debug: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TargetKind {
    Host,
    Docker,
    DockerCompose,
}

impl TargetKind {
    fn as_str(self) -> &'static str {
        match self {
            TargetKind::Host => "host",
            TargetKind::Docker => "docker",
            TargetKind::DockerCompose => "docker-compose",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Markdown,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "depsnap_scanner=debug,depsnap=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .ok();
}

/// Options from the config file with command-line flags applied on top
fn build_options(cli: &Cli) -> Result<ResolveOptions> {
    let mut options = match &cli.config {
        Some(path) => ResolveOptions::from_json_file(path)?,
        None => ResolveOptions::new(),
    };

    options.skip_system_scope |= cli.skip_system_scope;
    options.skip_hash_collection |= cli.skip_hash_collection;
    options.only_container_info |= cli.only_container_info;
    options.debug |= cli.debug;
    if !cli.select.is_empty() {
        options.select.clone_from(&cli.select);
    }
    if cli.venv_path.is_some() {
        options.venv_path.clone_from(&cli.venv_path);
    }
    if let Some(secs) = cli.timeout {
        options = options.with_command_timeout(Duration::from_secs(secs));
    }
    Ok(options)
}

fn run(cli: &Cli) -> Result<()> {
    let options = build_options(cli)?;
    let resolver = DependencyResolver::new(options).with_max_workers(cli.max_workers);

    if let Some(batch) = &cli.batch {
        return run_batch(cli, &resolver, batch);
    }

    let target = Target::from_parts(cli.target.as_str(), cli.identifier.as_deref())?;
    let mut request = ResolveRequest::new(target);
    if let Some(dir) = &cli.working_dir {
        request = request.with_working_dir(dir.clone());
    }

    let report = resolver.resolve(&request)?;
    tracing::info!(
        probes = report.probe_names().count(),
        dependencies = report.dependency_count(),
        "snapshot complete"
    );

    let rendered = match (cli.format, cli.excerpt) {
        (OutputFormat::Markdown, _) => to_markdown(&report),
        (OutputFormat::Json, Some(max)) => render_value(&excerpt(&report, max)?, cli.pretty_print)?,
        (OutputFormat::Json, None) => to_json(&report, cli.pretty_print)?,
    };
    emit(cli.output.as_deref(), &rendered)
}

fn run_batch(cli: &Cli, resolver: &DependencyResolver, path: &Path) -> Result<()> {
    if matches!(cli.format, OutputFormat::Markdown) {
        bail!("Markdown output is not available for batch runs");
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file {}", path.display()))?;
    let requests: Vec<ResolveRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid batch file {}", path.display()))?;

    let progress = |done: usize, total: usize, result: &ResolveResult| {
        tracing::info!(
            done,
            total,
            target = result.request.target.kind(),
            success = result.success,
            "request finished"
        );
    };
    let results = resolver.resolve_batch(requests, Some(&progress), cli.fail_fast)?;
    let rendered = render_value(&serde_json::to_value(&results)?, cli.pretty_print)?;
    emit(cli.output.as_deref(), &rendered)?;

    let failures = results.iter().filter(|r| !r.success).count();
    if failures > 0 {
        bail!("{failures} of {} requests failed", results.len());
    }
    Ok(())
}

fn render_value(value: &serde_json::Value, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

fn emit(output: Option<&Path>, rendered: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
