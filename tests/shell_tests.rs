//! End-to-end executions through the builder surface.

use std::time::{Duration, Instant};

use shoal::{ArgValue, CommandBuilder, Shell, ShellError, StdioMode, TIMEOUT_EXIT_CODE};

#[tokio::test]
async fn echo_writes_one_line() {
    let result = CommandBuilder::new("echo 5")
        .stdout(StdioMode::Piped)
        .await
        .unwrap();
    assert_eq!(result.code, 0);
    assert_eq!(result.stdout_bytes().unwrap(), b"5\n");
}

#[tokio::test]
async fn json_decoder_round_trip() -> anyhow::Result<()> {
    let value: serde_json::Value = CommandBuilder::new(r#"echo '{ "prop": 5 }'"#).json().await?;
    assert_eq!(value["prop"], 5);
    Ok(())
}

#[tokio::test]
async fn boolean_chains() {
    let out = CommandBuilder::new("echo 1 && echo 2").text().await.unwrap();
    assert_eq!(out, "1\n2");

    let result = CommandBuilder::new("echo 1 || echo 2")
        .stdout(StdioMode::Piped)
        .await
        .unwrap();
    assert_eq!(result.stdout_bytes().unwrap(), b"1\n");
}

#[tokio::test]
async fn shell_local_assignment_expands_but_stays_local() {
    let out = CommandBuilder::new("test=123 && echo $test")
        .text()
        .await
        .unwrap();
    assert_eq!(out, "123");
}

#[cfg(unix)]
#[tokio::test]
async fn shell_local_assignment_invisible_to_children() {
    // `env` is a real subprocess here; the shell-local variable must not
    // appear in its environment.
    let out = CommandBuilder::new("test=123 ; env")
        .text()
        .await
        .unwrap();
    assert!(!out.lines().any(|line| line.starts_with("test=123")));
}

#[cfg(unix)]
#[tokio::test]
async fn env_prefix_reaches_only_that_child() {
    let out = CommandBuilder::new("SHOAL_PREFIX_V=9 env | grep SHOAL_PREFIX_V ; env")
        .text()
        .await
        .unwrap();
    assert!(out.contains("SHOAL_PREFIX_V=9"));
    assert_eq!(out.matches("SHOAL_PREFIX_V=9").count(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn pipeline_through_external_cat() {
    let result = CommandBuilder::new("echo X | cat")
        .stdout(StdioMode::Piped)
        .await
        .unwrap();
    assert_eq!(result.stdout_bytes().unwrap(), b"X\n");
}

#[cfg(unix)]
#[tokio::test]
async fn pipeline_code_comes_from_rightmost_stage() {
    let result = CommandBuilder::new("false | cat")
        .quiet()
        .await
        .unwrap();
    assert_eq!(result.code, 0);

    let err = CommandBuilder::new("echo hi | false").quiet().await;
    assert_eq!(err.unwrap_err().code(), Some(1));
}

#[cfg(unix)]
#[tokio::test]
async fn stdin_flows_to_external_children() {
    let out = CommandBuilder::new("cat")
        .stdin("from the builder")
        .text()
        .await
        .unwrap();
    assert_eq!(out, "from the builder");
}

#[cfg(unix)]
#[tokio::test]
async fn pipe_amp_merges_stderr_into_the_pipe() {
    let out = CommandBuilder::new("sh -c 'echo only-err >&2' |& cat")
        .text()
        .await
        .unwrap();
    assert_eq!(out, "only-err");
}

#[tokio::test]
async fn subshell_cwd_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let inner = dir.path().join("inner");
    std::fs::create_dir(&inner).unwrap();

    let out = CommandBuilder::new(format!("(cd {}) ; pwd", inner.display()))
        .cwd(dir.path())
        .text()
        .await
        .unwrap();
    assert_eq!(out, dir.path().display().to_string());
}

#[tokio::test]
async fn cd_without_export_env_leaves_host_alone() {
    let before = std::env::current_dir().unwrap();
    let dir = tempfile::tempdir().unwrap();
    CommandBuilder::new(format!("cd {}", dir.path().display()))
        .await
        .unwrap();
    assert_eq!(std::env::current_dir().unwrap(), before);
}

#[tokio::test]
async fn export_env_applies_env_to_host() {
    CommandBuilder::new("export SHOAL_EXPORTED_TEST=5")
        .export_env()
        .await
        .unwrap();
    assert_eq!(std::env::var("SHOAL_EXPORTED_TEST").unwrap(), "5");
}

#[tokio::test]
async fn quoting_safety_for_hostile_strings() {
    for tricky in [
        "plain",
        "two  spaces",
        "'single'",
        "\"double\"",
        "$HOME",
        "a | b && c ; d",
        "back\\slash",
        "uni ↯ code",
        "trailing '",
        "",
    ] {
        let out = Shell::new()
            .template("echo {}", &[ArgValue::from(tricky)])
            .text()
            .await
            .unwrap();
        assert_eq!(out, tricky, "string {tricky:?} did not round-trip");
    }
}

#[tokio::test]
async fn timeout_cuts_a_sleep_short() {
    let start = Instant::now();
    let result = CommandBuilder::new("sleep 10s")
        .timeout("50ms")
        .no_throw()
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(result.code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out);
}

#[tokio::test]
async fn timeout_failure_surfaces_without_no_throw() {
    let err = CommandBuilder::new("sleep 10s").timeout(50u64).await;
    match err {
        Err(ShellError::Failed(result)) => {
            assert_eq!(result.code, TIMEOUT_EXIT_CODE);
            assert!(result.timed_out);
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_command_is_127() {
    let err = CommandBuilder::new("definitely-missing-cmd-a1b2c3")
        .quiet()
        .await;
    assert_eq!(err.unwrap_err().code(), Some(127));
}

#[tokio::test]
async fn redirect_to_file_and_back() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let out = CommandBuilder::new("echo stored > data.txt ; echo done")
        .cwd(dir.path())
        .text()
        .await?;
    assert_eq!(out, "done");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("data.txt"))?,
        "stored\n"
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn stdin_redirect_reads_a_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("input.txt"), "file contents\n").unwrap();
    let out = CommandBuilder::new("cat < input.txt")
        .cwd(dir.path())
        .text()
        .await
        .unwrap();
    assert_eq!(out, "file contents");
}

#[tokio::test]
async fn custom_command_replaces_builtin() {
    use async_trait::async_trait;
    use shoal::{CommandContext, ExecuteResult, ShellCommand};
    use std::sync::Arc;

    struct UpperEcho;

    #[async_trait]
    impl ShellCommand for UpperEcho {
        async fn execute(&self, mut ctx: CommandContext) -> ExecuteResult {
            let line = ctx.args.join(" ").to_uppercase();
            let _ = ctx.stdout.write_line(&line).await;
            ExecuteResult::success()
        }
    }

    let out = CommandBuilder::new("echo shouty")
        .register_command("echo", Arc::new(UpperEcho))
        .text()
        .await
        .unwrap();
    assert_eq!(out, "SHOUTY");
}

#[tokio::test]
async fn command_substitution_feeds_arguments() {
    let out = CommandBuilder::new("echo prefix-$(echo mid)-suffix")
        .text()
        .await
        .unwrap();
    assert_eq!(out, "prefix-mid-suffix");
}

#[tokio::test]
async fn lines_decoder_splits_output() {
    let lines = CommandBuilder::new("echo a ; echo b")
        .lines()
        .await
        .unwrap();
    assert_eq!(lines, vec!["a", "b"]);
}

#[tokio::test]
async fn print_command_echoes_through_info_logger() {
    use std::sync::{Arc, Mutex};

    let seen = Arc::new(Mutex::new(Vec::new()));
    let shell = Shell::new();
    let sink_seen = seen.clone();
    shell.set_info_logger(Arc::new(move |message| {
        sink_seen.lock().unwrap().push(message.to_string());
    }));
    shell.set_print_command(true);

    shell.command("echo quiet-run").quiet().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("echo quiet-run"));
}
