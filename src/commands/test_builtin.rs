//! test — POSIX-style conditional expressions.
//!
//! Supported forms:
//!
//! ```text
//! test -e PATH   test -f PATH   test -d PATH
//! test -n STR    test -z STR
//! test A = B     test A != B
//! test N -eq M   -ne   -lt   -le   -gt   -ge
//! ```
//!
//! Exit 0 when the expression is true, 1 when false, 2 on usage errors.

use async_trait::async_trait;

use super::{CommandContext, ExecuteResult, ShellCommand};
use crate::path::resolve_path;

pub struct TestCommand;

#[async_trait]
impl ShellCommand for TestCommand {
    async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
        match evaluate(&ctx).await {
            Ok(true) => ExecuteResult::success(),
            Ok(false) => ExecuteResult::from_code(1),
            Err(message) => {
                let _ = ctx.stderr.write_line(&format!("test: {message}")).await;
                ExecuteResult::from_code(2)
            }
        }
    }
}

async fn evaluate(ctx: &CommandContext) -> Result<bool, String> {
    match ctx.args.as_slice() {
        [] => Ok(false),
        [value] => Ok(!value.is_empty()),
        [op, operand] => match op.as_str() {
            "-n" => Ok(!operand.is_empty()),
            "-z" => Ok(operand.is_empty()),
            "-e" | "-f" | "-d" => {
                let path = resolve_path(&ctx.cwd, operand);
                let meta = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta,
                    Err(_) => return Ok(false),
                };
                Ok(match op.as_str() {
                    "-e" => true,
                    "-f" => meta.is_file(),
                    _ => meta.is_dir(),
                })
            }
            _ => Err(format!("{op}: unary operator expected")),
        },
        [left, op, right] => match op.as_str() {
            "=" => Ok(left == right),
            "!=" => Ok(left != right),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let left = parse_int(left)?;
                let right = parse_int(right)?;
                Ok(match op.as_str() {
                    "-eq" => left == right,
                    "-ne" => left != right,
                    "-lt" => left < right,
                    "-le" => left <= right,
                    "-gt" => left > right,
                    _ => left >= right,
                })
            }
            _ => Err(format!("{op}: binary operator expected")),
        },
        _ => Err("too many arguments".to_string()),
    }
}

fn parse_int(value: &str) -> Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|_| format!("{value}: integer expression expected"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil::make_context;
    use rstest::rstest;

    async fn run(args: &[&str]) -> i32 {
        let (ctx, _, _) = make_context(args);
        TestCommand.execute(ctx).await.code()
    }

    #[rstest]
    #[case(&["-n", "x"], 0)]
    #[case(&["-n", ""], 1)]
    #[case(&["-z", ""], 0)]
    #[case(&["-z", "x"], 1)]
    #[case(&["a", "=", "a"], 0)]
    #[case(&["a", "=", "b"], 1)]
    #[case(&["a", "!=", "b"], 0)]
    #[case(&["5", "-eq", "5"], 0)]
    #[case(&["5", "-ne", "5"], 1)]
    #[case(&["3", "-lt", "5"], 0)]
    #[case(&["5", "-le", "5"], 0)]
    #[case(&["5", "-gt", "3"], 0)]
    #[case(&["3", "-ge", "5"], 1)]
    #[tokio::test]
    async fn string_and_numeric_forms(#[case] args: &[&str], #[case] expected: i32) {
        assert_eq!(run(args).await, expected);
    }

    #[tokio::test]
    async fn file_checks_resolve_against_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        for (args, expected) in [
            (vec!["-e", "file.txt"], 0),
            (vec!["-f", "file.txt"], 0),
            (vec!["-d", "file.txt"], 1),
            (vec!["-d", "sub"], 0),
            (vec!["-e", "missing"], 1),
        ] {
            let (mut ctx, _, _) = make_context(&args);
            ctx.cwd = dir.path().to_path_buf();
            assert_eq!(
                TestCommand.execute(ctx).await.code(),
                expected,
                "args: {args:?}"
            );
        }
    }

    #[tokio::test]
    async fn non_numeric_operand_is_usage_error() {
        assert_eq!(run(&["x", "-eq", "5"]).await, 2);
    }

    #[tokio::test]
    async fn unknown_operator_is_usage_error() {
        assert_eq!(run(&["a", "~~", "b"]).await, 2);
    }

    #[tokio::test]
    async fn single_nonempty_arg_is_true() {
        assert_eq!(run(&["x"]).await, 0);
        assert_eq!(run(&[""]).await, 1);
        assert_eq!(run(&[]).await, 1);
    }
}
