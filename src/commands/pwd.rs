//! pwd — print the shell working directory.

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};

pub struct PwdCommand;

#[async_trait]
impl ShellCommand for PwdCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        let line = ctx.cwd.display().to_string();
        match ctx.stdout.write_line(&line).await {
            Ok(()) => ExecuteResult::success(),
            Err(_) => ExecuteResult::from_code(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::make_context;
    use std::path::PathBuf;

    #[tokio::test]
    async fn prints_context_cwd() {
        let (mut ctx, stdout, _) = make_context(&[]);
        ctx.cwd = PathBuf::from("/some/where");
        PwdCommand.execute(ctx).await;
        assert_eq!(stdout.take(), b"/some/where\n");
    }
}
