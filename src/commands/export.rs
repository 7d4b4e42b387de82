//! export — promote variables into the exported environment.

use async_trait::async_trait;

use super::{is_valid_var_name, CommandContext, ExecuteResult, ShellCommand};
use crate::state::EnvChange;

pub struct ExportCommand;

#[async_trait]
impl ShellCommand for ExportCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        let mut changes = Vec::new();
        let mut code = 0;
        for arg in &ctx.args {
            match arg.split_once('=') {
                Some((name, value)) if is_valid_var_name(name) => {
                    changes.push(EnvChange::SetEnv(name.to_string(), value.to_string()));
                }
                None if is_valid_var_name(arg) => {
                    // `export NAME` promotes an existing shell-local value.
                    let value = ctx
                        .shell_vars
                        .get(arg)
                        .or_else(|| ctx.env.get(arg))
                        .cloned()
                        .unwrap_or_default();
                    changes.push(EnvChange::SetEnv(arg.clone(), value));
                }
                _ => {
                    let message = format!("export: '{arg}': not a valid identifier");
                    let _ = ctx.stderr.write_line(&message).await;
                    code = 1;
                }
            }
        }
        ExecuteResult::with_changes(code, changes)
    }
}
