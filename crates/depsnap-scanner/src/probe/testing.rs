//! Scripted channel for probe unit tests

use crate::channel::{CommandChannel, CommandOutput, ComposeService};
use crate::error::ScanResult;
use crate::types::Target;
use std::cell::RefCell;
use std::collections::HashSet;

/// Answers commands by substring match, first registered rule wins
pub(crate) struct ScriptedChannel {
    target: Target,
    rules: Vec<(String, CommandOutput)>,
    paths: HashSet<String>,
    services: Vec<ComposeService>,
    pub(crate) log: RefCell<Vec<String>>,
}

impl ScriptedChannel {
    pub(crate) fn new() -> Self {
        Self {
            target: Target::Host,
            rules: Vec::new(),
            paths: HashSet::new(),
            services: Vec::new(),
            log: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn container() -> Self {
        Self {
            target: Target::Docker {
                container: "test".to_string(),
            },
            ..Self::new()
        }
    }

    pub(crate) fn on(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules
            .push((pattern.to_string(), CommandOutput::new(stdout, "", 0)));
        self
    }

    pub(crate) fn fail(mut self, pattern: &str, stderr: &str) -> Self {
        self.rules
            .push((pattern.to_string(), CommandOutput::new("", stderr, 1)));
        self
    }

    pub(crate) fn with_path(mut self, path: &str) -> Self {
        self.paths.insert(path.to_string());
        self
    }

    pub(crate) fn with_services(mut self, services: Vec<ComposeService>) -> Self {
        self.services = services;
        self
    }

    pub(crate) fn ran(&self, pattern: &str) -> bool {
        self.log.borrow().iter().any(|cmd| cmd.contains(pattern))
    }
}

impl CommandChannel for ScriptedChannel {
    fn execute(&self, command: &str, _working_dir: Option<&str>) -> ScanResult<CommandOutput> {
        self.log.borrow_mut().push(command.to_string());
        Ok(self
            .rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map_or_else(
                || CommandOutput::new("", "command not found", 127),
                |(_, out)| out.clone(),
            ))
    }

    fn path_exists(&self, path: &str, working_dir: Option<&str>) -> bool {
        let full = match working_dir {
            Some(dir) if !path.starts_with('/') => format!("{dir}/{path}"),
            _ => path.to_string(),
        };
        self.paths.contains(&full)
    }

    fn target(&self) -> &Target {
        &self.target
    }

    fn compose_services(&self) -> &[ComposeService] {
        &self.services
    }
}
