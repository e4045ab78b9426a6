//! Python packages installed with pip
//!
//! A run may find two install locations: a virtual environment tied to the
//! project and the system interpreter's site-packages. Both are reported;
//! the orchestrator merges them into a `mixed` result.

use super::{absolute_search_dir, LocationResult, Probe, ProbeContext, ProbeOutput};
use crate::channel::{join_path, quote, CommandChannel};
use crate::hash::{location_hash, LocationHashRules};
use crate::types::{Dependencies, Dependency, Scope, UNKNOWN_VERSION};

const HASH_RULES: LocationHashRules = LocationHashRules {
    prune_names: &[
        "__pycache__",
        "__editable__*",
        "pip*",
        "setuptools*",
        "pkg_resources",
        "*distutils*",
    ],
    prune_paths: &["*/pip/_vendor"],
    exclude_names: &["*.pyc", "*.pyo", "INSTALLER", "RECORD"],
    include_names: &[],
};

/// Directory names probed for a project virtual environment
const LOCAL_VENV_DIRS: &[&str] = &["venv", ".venv", "env", ".env", "virtualenv"];

/// Per-user venv homes, relative to `$HOME`, keyed by project name
const EXTERNAL_VENV_HOMES: &[&str] = &[
    ".virtualenvs",
    ".local/share/virtualenvs",
    ".cache/pypoetry/virtualenvs",
    ".pyenv/versions",
];

/// pip invocations tried for the system interpreter
const SYSTEM_PIP_CANDIDATES: &[&str] = &["pip3", "pip", "python3 -m pip"];

/// Probe for pip-managed Python packages
#[derive(Debug, Default, Clone, Copy)]
pub struct PipProbe;

impl Probe for PipProbe {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn is_usable(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        system_pip(channel).is_some() || find_venv(channel, ctx).is_some()
    }

    /// System scope when no virtual environment backs the project
    fn has_system_scope(&self, channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> bool {
        find_venv(channel, ctx).is_none()
    }

    fn get_dependencies(
        &self,
        channel: &dyn CommandChannel,
        ctx: &ProbeContext<'_>,
    ) -> ProbeOutput {
        let venv = find_venv(channel, ctx);
        let mut output = ProbeOutput::empty();

        match &venv {
            Some(venv) => {
                let pip = venv_pip(channel, venv);
                match list_location(channel, &pip, Scope::Project) {
                    Ok(mut location) => {
                        let site = location.location.get_or_insert_with(|| venv.clone()).clone();
                        if ctx.collect_hashes() && !location.is_empty() {
                            location.hash = location_hash(channel, &site, &HASH_RULES);
                        }
                        output.locations.push(location);
                    }
                    Err(e) => output.error = Some(e),
                }
            }
            None if ctx.working_dir.is_some() => {
                tracing::debug!(probe = self.name(), "no virtual environment in working directory");
                let location = absolute_search_dir(channel, ctx);
                return ProbeOutput::single(LocationResult::project(location, Dependencies::new()));
            }
            None => {}
        }

        if ctx.working_dir.is_none() && !ctx.skip_system_scope {
            if let Some(pip) = system_pip(channel) {
                match list_location(channel, &pip, Scope::System) {
                    Ok(system) if !output.locations.iter().any(|l| l.location == system.location) => {
                        output.locations.push(system);
                    }
                    Ok(_) => tracing::debug!(probe = self.name(), "system pip resolves to the venv"),
                    Err(e) => {
                        output.error.get_or_insert(e);
                    }
                }
            }
        }

        output
    }
}

/// Locate a virtual environment with one batched `find`
///
/// Candidates are searched in priority order: explicit path, `$VIRTUAL_ENV`
/// (containers only), the project directory and its usual venv names, then
/// per-user venv homes. Containers fall back to a wider search.
pub fn find_venv(channel: &dyn CommandChannel, ctx: &ProbeContext<'_>) -> Option<String> {
    let search_dir = ctx.search_dir();
    let mut candidates: Vec<String> = Vec::new();

    if let Some(explicit) = ctx.venv_path {
        candidates.push(shell_path(explicit));
    }
    if channel.is_container() {
        candidates.push("$VIRTUAL_ENV".to_string());
    }
    candidates.push(quote(search_dir).into_owned());
    for dir in LOCAL_VENV_DIRS {
        candidates.push(quote(&join_path(search_dir, dir)).into_owned());
    }
    if ctx.working_dir.is_some() {
        let project = absolute_search_dir(channel, ctx);
        let project = project.rsplit('/').next().unwrap_or_default();
        if !project.is_empty() {
            for home in EXTERNAL_VENV_HOMES {
                candidates.push(format!("\"$HOME\"/{}", quote(&format!("{home}/{project}"))));
            }
        }
    }

    let find = format!(
        "find {} -maxdepth 1 -name pyvenv.cfg -type f 2>/dev/null | head -1",
        candidates.join(" ")
    );
    if let Some(venv) = first_venv(channel, &find) {
        return Some(venv);
    }

    if channel.is_container() {
        tracing::debug!("searching the whole container for pyvenv.cfg");
        return first_venv(
            channel,
            "find /opt /home /usr/local -name pyvenv.cfg -type f 2>/dev/null | head -1",
        );
    }
    None
}

fn first_venv(channel: &dyn CommandChannel, find: &str) -> Option<String> {
    let cfg = channel.run_ok(find, None)?;
    let cfg = cfg.lines().next()?.trim();
    let venv = cfg.strip_suffix("/pyvenv.cfg")?;
    Some(if venv.is_empty() { "/" } else { venv }.to_string())
}

/// Quote a user path for the shell, keeping a leading `~/` expandable
fn shell_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME\"/{}", quote(rest)),
        None => quote(path).into_owned(),
    }
}

fn venv_pip(channel: &dyn CommandChannel, venv: &str) -> String {
    let pip = join_path(venv, "bin/pip");
    if channel.path_exists(&pip, None) {
        quote(&pip).into_owned()
    } else {
        format!("{} -m pip", quote(&join_path(venv, "bin/python")))
    }
}

fn system_pip(channel: &dyn CommandChannel) -> Option<String> {
    SYSTEM_PIP_CANDIDATES
        .iter()
        .find(|pip| channel.run_ok(&format!("{pip} --version"), None).is_some())
        .map(|pip| (*pip).to_string())
}

/// List packages and resolve the site-packages directory for one pip
fn list_location(
    channel: &dyn CommandChannel,
    pip: &str,
    scope: Scope,
) -> Result<LocationResult, String> {
    let out = channel
        .execute(&format!("{pip} list --format=freeze 2>/dev/null"), None)
        .map_err(|e| e.to_string())?;
    if !out.success() {
        return Err(format!("{pip} list exited with {}", out.exit_code));
    }

    let location = channel
        .run_ok(&format!("{pip} show pip 2>/dev/null"), None)
        .and_then(|show| parse_show_location(&show));

    Ok(LocationResult {
        scope,
        location,
        hash: None,
        dependencies: parse_freeze(&out.stdout),
    })
}

/// Parse `pip list --format=freeze` output
#[must_use]
pub fn parse_freeze(stdout: &str) -> Dependencies {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter_map(|line| {
            if let Some((name, version)) = line.split_once("==") {
                Some((name.trim().to_string(), Dependency::new(version.trim())))
            } else {
                line.split_once(" @ ")
                    .map(|(name, _)| (name.trim().to_string(), Dependency::new(UNKNOWN_VERSION)))
            }
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// `Location:` field of `pip show`
#[must_use]
pub fn parse_show_location(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Location:"))
        .map(|loc| loc.trim().to_string())
        .filter(|loc| !loc.is_empty())
}
