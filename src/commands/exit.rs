//! exit — stop the enclosing execution.

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};

pub struct ExitCommand;

#[async_trait]
impl ShellCommand for ExitCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        match ctx.args.as_slice() {
            [] => ExecuteResult::Exit {
                code: ctx.last_code,
            },
            [code] => match code.parse::<i32>() {
                Ok(code) => ExecuteResult::Exit { code },
                Err(_) => {
                    let message = format!("exit: {code}: numeric argument required");
                    let _ = ctx.stderr.write_line(&message).await;
                    ExecuteResult::Exit { code: 2 }
                }
            },
            _ => {
                let _ = ctx.stderr.write_line("exit: too many arguments").await;
                ExecuteResult::from_code(2)
            }
        }
    }
}
