//! echo — print arguments to stdout.

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};

pub struct EchoCommand;

#[async_trait]
impl ShellCommand for EchoCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        let line = ctx.args.join(" ");
        match ctx.stdout.write_line(&line).await {
            Ok(()) => ExecuteResult::success(),
            Err(_) => ExecuteResult::from_code(1),
        }
    }
}
