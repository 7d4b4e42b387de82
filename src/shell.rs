//! `Shell` — scoped defaults and the entry point that mints builders.
//!
//! A shell carries defaults (cwd, env overrides, loggers, the
//! print-command flag, registered commands) in [`ScopedValue`]s. A child
//! shell inherits everything live from its parent until it overrides a
//! slot, so library code can hand out a child and tune it without
//! disturbing the parent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::CommandBuilder;
use crate::commands::ShellCommand;
use crate::logger::{LogSink, Loggers};
use crate::scoped::ScopedValue;
use crate::template::ArgValue;

type CommandOverrides = HashMap<String, Arc<dyn ShellCommand>>;

#[derive(Clone)]
pub struct Shell {
    cwd: ScopedValue<PathBuf>,
    env: ScopedValue<HashMap<String, String>>,
    loggers: ScopedValue<Loggers>,
    print_command: ScopedValue<bool>,
    commands: ScopedValue<CommandOverrides>,
}

impl Shell {
    /// A shell with process defaults: current dir, process env, stderr
    /// loggers, no command echo.
    pub fn new() -> Self {
        Self {
            cwd: ScopedValue::empty(),
            env: ScopedValue::empty(),
            loggers: ScopedValue::empty(),
            print_command: ScopedValue::empty(),
            commands: ScopedValue::empty(),
        }
    }

    /// A child shell that inherits this shell's defaults until it sets its
    /// own.
    pub fn child(&self) -> Self {
        Self {
            cwd: self.cwd.child(),
            env: self.env.child(),
            loggers: self.loggers.child(),
            print_command: self.print_command.child(),
            commands: self.commands.child(),
        }
    }

    pub fn set_cwd(&self, path: impl Into<PathBuf>) {
        self.cwd.set(path.into());
    }

    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut env = self.env.get_or_default();
        env.insert(name.into(), value.into());
        self.env.set(env);
    }

    pub fn set_loggers(&self, loggers: Loggers) {
        self.loggers.set(loggers);
    }

    pub fn set_info_logger(&self, sink: LogSink) {
        self.loggers.set(self.loggers.get_or_default().with_info(sink));
    }

    pub fn set_warn_logger(&self, sink: LogSink) {
        self.loggers.set(self.loggers.get_or_default().with_warn(sink));
    }

    pub fn set_error_logger(&self, sink: LogSink) {
        self.loggers.set(self.loggers.get_or_default().with_error(sink));
    }

    /// Echo `> <source>` before each command built from this shell.
    pub fn set_print_command(&self, enabled: bool) {
        self.print_command.set(enabled);
    }

    /// Register a command for every builder this shell produces.
    pub fn register_command(&self, name: impl Into<String>, handler: Arc<dyn ShellCommand>) {
        let mut commands = self.commands.get_or_default();
        commands.insert(name.into(), handler);
        self.commands.set(commands);
    }

    /// A builder for raw source text, seeded with this shell's defaults.
    pub fn command(&self, source: impl Into<String>) -> CommandBuilder {
        self.configure(CommandBuilder::new(source))
    }

    /// A builder from a `{}` template; each value becomes one quoted token
    /// (lists become several).
    pub fn template(&self, template: &str, args: &[ArgValue]) -> CommandBuilder {
        self.configure(CommandBuilder::from_template(template, args, false))
    }

    /// Like [`Shell::template`] but values are spliced verbatim.
    pub fn raw_template(&self, template: &str, args: &[ArgValue]) -> CommandBuilder {
        self.configure(CommandBuilder::from_template(template, args, true))
    }

    fn configure(&self, mut builder: CommandBuilder) -> CommandBuilder {
        if let Some(cwd) = self.cwd.get() {
            builder = builder.cwd(cwd);
        }
        if let Some(env) = self.env.get() {
            builder = builder.envs(env);
        }
        if let Some(loggers) = self.loggers.get() {
            builder = builder.loggers(loggers);
        }
        if self.print_command.get().unwrap_or(false) {
            builder = builder.print_command();
        }
        if let Some(commands) = self.commands.get() {
            builder = builder.register_commands(commands);
        }
        builder
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("cwd", &self.cwd.get())
            .field("print_command", &self.print_command.get())
            .finish()
    }
}
