//! unset — remove shell-local and exported variables.

use async_trait::async_trait;

use super::{is_valid_var_name, CommandContext, ExecuteResult, ShellCommand};
use crate::state::EnvChange;

pub struct UnsetCommand;

#[async_trait]
impl ShellCommand for UnsetCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        let mut changes = Vec::new();
        let mut code = 0;
        for arg in &ctx.args {
            if is_valid_var_name(arg) {
                changes.push(EnvChange::UnsetVar(arg.clone()));
            } else {
                let message = format!("unset: '{arg}': not a valid identifier");
                let _ = ctx.stderr.write_line(&message).await;
                code = 1;
            }
        }
        ExecuteResult::with_changes(code, changes)
    }
}
