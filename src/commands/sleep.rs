//! sleep — delay for a duration, cancellable.

use std::time::Duration;

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};
use crate::duration::Delay;
use crate::error::TIMEOUT_EXIT_CODE;

pub struct SleepCommand;

#[async_trait]
impl ShellCommand for SleepCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        let arg = match ctx.args.as_slice() {
            [arg] => arg,
            [] => {
                let _ = ctx.stderr.write_line("sleep: missing operand").await;
                return ExecuteResult::from_code(2);
            }
            _ => {
                let _ = ctx.stderr.write_line("sleep: too many arguments").await;
                return ExecuteResult::from_code(2);
            }
        };
        let mut delay = match Delay::parse(arg) {
            Ok(delay) => delay,
            Err(message) => {
                let _ = ctx.stderr.write_line(&format!("sleep: {message}")).await;
                return ExecuteResult::from_code(2);
            }
        };
        let millis = match delay.next_millis() {
            Ok(millis) => millis,
            Err(message) => {
                let _ = ctx.stderr.write_line(&format!("sleep: {message}")).await;
                return ExecuteResult::from_code(2);
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => ExecuteResult::success(),
            _ = ctx.token.cancelled() => ExecuteResult::from_code(TIMEOUT_EXIT_CODE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::make_context;
    use std::time::Instant;

    #[tokio::test]
    async fn sleeps_for_the_given_duration() {
        let (ctx, _, _) = make_context(&["20ms"]);
        let start = Instant::now();
        let result = SleepCommand.execute(ctx).await;
        assert_eq!(result.code(), 0);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_sleep() {
        let (ctx, _, _) = make_context(&["10s"]);
        let token = ctx.token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let start = Instant::now();
        let result = SleepCommand.execute(ctx).await;
        assert_eq!(result.code(), TIMEOUT_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn bad_duration_is_a_usage_error() {
        let (ctx, _, stderr) = make_context(&["soon"]);
        let result = SleepCommand.execute(ctx).await;
        assert_eq!(result.code(), 2);
        assert!(!stderr.take().is_empty());
    }

    #[tokio::test]
    async fn missing_operand_is_a_usage_error() {
        let (ctx, _, _) = make_context(&[]);
        assert_eq!(SleepCommand.execute(ctx).await.code(), 2);
    }
}
