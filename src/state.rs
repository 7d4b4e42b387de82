//! Per-execution shell state threaded through evaluation.
//!
//! The state is cloned wherever the spec requires isolation (subshells,
//! pipeline stages, background items); clones keep their own change journal
//! which is simply discarded with them. Mutations on the top-level state are
//! journaled so `export_env` can mirror them onto the host process
//! afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::commands::ShellCommand;
use crate::logger::Loggers;

/// Registered command handlers, by name.
pub type CommandMap = HashMap<String, Arc<dyn ShellCommand>>;

/// A recorded mutation of the execution environment.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvChange {
    /// Export `name=value`.
    SetEnv(String, String),
    /// Remove `name` from the exported env and the shell-local variables.
    UnsetVar(String),
    /// Change the working directory.
    Cd(PathBuf),
}

#[derive(Clone)]
pub struct ShellState {
    cwd: PathBuf,
    env_vars: HashMap<String, String>,
    shell_vars: HashMap<String, String>,
    commands: Arc<CommandMap>,
    loggers: Loggers,
    token: CancellationToken,
    last_code: i32,
    changes: Vec<EnvChange>,
}

impl ShellState {
    pub fn new(
        cwd: PathBuf,
        env_vars: HashMap<String, String>,
        commands: Arc<CommandMap>,
        loggers: Loggers,
        token: CancellationToken,
    ) -> Self {
        let env_vars = env_vars
            .into_iter()
            .map(|(name, value)| (normalize_name(&name), value))
            .collect();
        Self {
            cwd,
            env_vars,
            shell_vars: HashMap::new(),
            commands,
            loggers,
            token,
            last_code: 0,
            changes: Vec::new(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn env_vars(&self) -> &HashMap<String, String> {
        &self.env_vars
    }

    pub fn shell_vars(&self) -> &HashMap<String, String> {
        &self.shell_vars
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env_vars.get(&normalize_name(name)).map(String::as_str)
    }

    /// Variable lookup for word expansion: shell-local first, then
    /// exported.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.shell_vars
            .get(name)
            .or_else(|| self.env_vars.get(&normalize_name(name)))
            .map(String::as_str)
    }

    /// Shell-local assignment; never exported, never journaled.
    pub fn set_shell_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.shell_vars.insert(name.into(), value.into());
    }

    /// Environment for one invocation: the exported env plus per-command
    /// `NAME=value` prefixes (which never persist).
    pub fn invocation_env(&self, overrides: &[(String, String)]) -> HashMap<String, String> {
        let mut env = self.env_vars.clone();
        for (name, value) in overrides {
            env.insert(normalize_name(name), value.clone());
        }
        env
    }

    /// Apply and journal an environment change.
    pub fn apply_change(&mut self, change: EnvChange) {
        match &change {
            EnvChange::SetEnv(name, value) => {
                // An export wins over a shell-local of the same name.
                self.shell_vars.remove(name);
                self.env_vars.insert(normalize_name(name), value.clone());
            }
            EnvChange::UnsetVar(name) => {
                self.shell_vars.remove(name);
                self.env_vars.remove(&normalize_name(name));
            }
            EnvChange::Cd(path) => {
                self.cwd = path.clone();
            }
        }
        self.changes.push(change);
    }

    pub fn apply_changes(&mut self, changes: Vec<EnvChange>) {
        for change in changes {
            self.apply_change(change);
        }
    }

    /// Drain the journal of applied changes.
    pub fn take_changes(&mut self) -> Vec<EnvChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn commands(&self) -> &Arc<CommandMap> {
        &self.commands
    }

    pub fn loggers(&self) -> &Loggers {
        &self.loggers
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn last_code(&self) -> i32 {
        self.last_code
    }

    pub fn set_last_code(&mut self, code: i32) {
        self.last_code = code;
    }
}

impl std::fmt::Debug for ShellState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellState")
            .field("cwd", &self.cwd)
            .field("shell_vars", &self.shell_vars)
            .field("last_code", &self.last_code)
            .finish()
    }
}

/// Environment variable names are case-insensitive on Windows.
#[cfg(windows)]
fn normalize_name(name: &str) -> String {
    name.to_uppercase()
}

#[cfg(not(windows))]
fn normalize_name(name: &str) -> String {
    name.to_string()
}
