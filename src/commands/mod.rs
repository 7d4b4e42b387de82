//! Built-in commands and the seam for user-registered ones.
//!
//! Every command — built-in or custom — implements [`ShellCommand`]. Custom
//! commands registered on a builder replace builtins of the same name.
//! Handlers never mutate the shell directly; they return the environment
//! changes they want applied, and the evaluator journals them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::io::{ShellReader, ShellWriter};
use crate::state::EnvChange;

mod cd;
mod echo;
mod exit;
mod export;
mod pwd;
mod sleep;
mod test_builtin;
mod true_false;
mod unset;

pub use cd::CdCommand;
pub use echo::EchoCommand;
pub use exit::ExitCommand;
pub use export::ExportCommand;
pub use pwd::PwdCommand;
pub use sleep::SleepCommand;
pub use test_builtin::TestCommand;
pub use true_false::{FalseCommand, TrueCommand};
pub use unset::UnsetCommand;

/// Everything a command invocation sees.
pub struct CommandContext {
    /// Arguments after the command name, fully expanded.
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Exported environment plus any `NAME=value` prefixes of this
    /// invocation.
    pub env: HashMap<String, String>,
    /// Shell-local variables, read-only (for `export NAME`).
    pub shell_vars: HashMap<String, String>,
    /// Exit code of the previous command (for bare `exit`).
    pub last_code: i32,
    pub stdin: ShellReader,
    pub stdout: ShellWriter,
    pub stderr: ShellWriter,
    pub token: CancellationToken,
}

/// What a command produced: either a code to continue with, or a request to
/// exit the whole execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    Continue { code: i32, changes: Vec<EnvChange> },
    Exit { code: i32 },
}

impl ExecuteResult {
    pub fn success() -> Self {
        Self::from_code(0)
    }

    pub fn from_code(code: i32) -> Self {
        ExecuteResult::Continue {
            code,
            changes: Vec::new(),
        }
    }

    pub fn with_changes(code: i32, changes: Vec<EnvChange>) -> Self {
        ExecuteResult::Continue { code, changes }
    }

    pub fn code(&self) -> i32 {
        match self {
            ExecuteResult::Continue { code, .. } | ExecuteResult::Exit { code } => *code,
        }
    }
}

/// A command that can be dispatched by name.
#[async_trait]
pub trait ShellCommand: Send + Sync {
    async fn execute(&self, ctx: CommandContext) -> ExecuteResult;
}

/// The default registry.
pub(crate) fn builtin_commands() -> HashMap<String, Arc<dyn ShellCommand>> {
    let mut commands: HashMap<String, Arc<dyn ShellCommand>> = HashMap::new();
    commands.insert("cd".to_string(), Arc::new(CdCommand));
    commands.insert("echo".to_string(), Arc::new(EchoCommand));
    commands.insert("exit".to_string(), Arc::new(ExitCommand));
    commands.insert("export".to_string(), Arc::new(ExportCommand));
    commands.insert("false".to_string(), Arc::new(FalseCommand));
    commands.insert("pwd".to_string(), Arc::new(PwdCommand));
    commands.insert("sleep".to_string(), Arc::new(SleepCommand));
    commands.insert("test".to_string(), Arc::new(TestCommand));
    commands.insert("true".to_string(), Arc::new(TrueCommand));
    commands.insert("unset".to_string(), Arc::new(UnsetCommand));
    commands
}

/// Is `name` a valid shell variable identifier?
pub(crate) fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::io::CaptureBuffer;

    /// A context writing both streams into capture buffers.
    pub(crate) fn make_context(args: &[&str]) -> (CommandContext, CaptureBuffer, CaptureBuffer) {
        let stdout = CaptureBuffer::new();
        let stderr = CaptureBuffer::new();
        let ctx = CommandContext {
            args: args.iter().map(|arg| arg.to_string()).collect(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            shell_vars: HashMap::new(),
            last_code: 0,
            stdin: ShellReader::Null,
            stdout: ShellWriter::Capture(stdout.clone()),
            stderr: ShellWriter::Capture(stderr.clone()),
            token: CancellationToken::new(),
        };
        (ctx, stdout, stderr)
    }
}
