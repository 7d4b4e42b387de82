//! cd — change the shell working directory.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};
use crate::path::{home_dir, resolve_path};
use crate::state::EnvChange;

pub struct CdCommand;

#[async_trait]
impl ShellCommand for CdCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        if ctx.args.len() > 1 {
            let _ = ctx.stderr.write_line("cd: too many arguments").await;
            return ExecuteResult::from_code(1);
        }
        let target = match ctx.args.first() {
            Some(dir) => resolve_path(&ctx.cwd, dir),
            None => match default_home(&ctx) {
                Some(home) => home,
                None => {
                    let _ = ctx.stderr.write_line("cd: HOME not set").await;
                    return ExecuteResult::from_code(1);
                }
            },
        };
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {
                ExecuteResult::with_changes(0, vec![EnvChange::Cd(target)])
            }
            Ok(_) => {
                let message = format!("cd: {}: not a directory", target.display());
                let _ = ctx.stderr.write_line(&message).await;
                ExecuteResult::from_code(1)
            }
            Err(err) => {
                let message = format!("cd: {}: {}", target.display(), err);
                let _ = ctx.stderr.write_line(&message).await;
                ExecuteResult::from_code(1)
            }
        }
    }
}

/// `cd` with no argument: exported `HOME` (`USERPROFILE` on Windows), then
/// the OS notion of a home directory.
fn default_home(ctx: &CommandContext) -> Option<PathBuf> {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    ctx.env.get(var).map(PathBuf::from).or_else(home_dir)
}
