//! true / false — fixed exit codes, registered so scripts behave the same
//! on hosts without the coreutils binaries.

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};

pub struct TrueCommand;

pub struct FalseCommand;

#[async_trait]
impl ShellCommand for TrueCommand {
    async fn execute(&self, _ctx: CommandContext) -> ExecuteResult {
        ExecuteResult::success()
    }
}

#[async_trait]
impl ShellCommand for FalseCommand {
    async fn execute(&self, _ctx: CommandContext) -> ExecuteResult {
        ExecuteResult::from_code(1)
    }
}
