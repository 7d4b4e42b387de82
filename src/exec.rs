//! External process execution.
//!
//! Spawns OS children with their stdio wired to the shell's endpoints. Byte
//! copiers run concurrently with the child and are always drained before
//! the exit code is published. Cancellation terminates the child —
//! SIGTERM with a short grace window, then SIGKILL, on unix;
//! TerminateProcess elsewhere.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
#[cfg(unix)]
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::commands::ExecuteResult;
use crate::error::TIMEOUT_EXIT_CODE;
use crate::io::{ShellReader, ShellWriter};

/// How long a child gets to react to SIGTERM before SIGKILL.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

enum ChildInput {
    None,
    Bytes(Arc<Vec<u8>>),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

pub(crate) async fn execute_external(
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: &Path,
    stdin: ShellReader,
    stdout: ShellWriter,
    mut stderr: ShellWriter,
    token: CancellationToken,
) -> ExecuteResult {
    let program = args[0].clone();
    let mut command = Command::new(&program);
    command
        .args(&args[1..])
        .current_dir(cwd)
        .env_clear()
        .envs(&env)
        .kill_on_drop(true);

    let input = match &stdin {
        ShellReader::Inherit => {
            command.stdin(Stdio::inherit());
            ChildInput::None
        }
        ShellReader::Null => {
            command.stdin(Stdio::null());
            ChildInput::None
        }
        ShellReader::Bytes(bytes) => {
            command.stdin(Stdio::piped());
            ChildInput::Bytes(bytes.clone())
        }
        ShellReader::Reader(_) | ShellReader::Pipe(_) => {
            command.stdin(Stdio::piped());
            match stdin.take_stream() {
                Some(stream) => ChildInput::Stream(stream),
                // Already consumed upstream; the child just sees EOF.
                None => ChildInput::None,
            }
        }
    };

    match &stdout {
        ShellWriter::Stdout => {
            command.stdout(Stdio::inherit());
        }
        ShellWriter::Null => {
            command.stdout(Stdio::null());
        }
        _ => {
            command.stdout(Stdio::piped());
        }
    }
    match &stderr {
        ShellWriter::Stderr => {
            command.stderr(Stdio::inherit());
        }
        ShellWriter::Null => {
            command.stderr(Stdio::null());
        }
        _ => {
            command.stderr(Stdio::piped());
        }
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let (code, message) = match err.kind() {
                std::io::ErrorKind::NotFound => (127, format!("{program}: command not found")),
                std::io::ErrorKind::PermissionDenied => {
                    (126, format!("{program}: permission denied"))
                }
                _ => (126, format!("{program}: {err}")),
            };
            let _ = stderr.write_line(&message).await;
            return ExecuteResult::from_code(code);
        }
    };
    tracing::debug!(program = %program, "spawned external command");

    let stdin_task = child.stdin.take().map(|mut child_stdin| {
        tokio::spawn(async move {
            match input {
                ChildInput::None => {}
                ChildInput::Bytes(bytes) => {
                    let _ = child_stdin.write_all(&bytes).await;
                }
                ChildInput::Stream(mut stream) => {
                    let _ = tokio::io::copy(&mut stream, &mut child_stdin).await;
                }
            }
            // Dropping child_stdin closes the descriptor (EOF).
        })
    });

    let stdout_task = child.stdout.take().map(|out| {
        let mut writer = stdout.clone();
        tokio::spawn(async move {
            if let Err(err) = writer.drain_from(out).await {
                tracing::warn!("stdout copier failed: {err}");
            }
        })
    });
    let stderr_task = child.stderr.take().map(|err_stream| {
        let mut writer = stderr.clone();
        tokio::spawn(async move {
            if let Err(err) = writer.drain_from(err_stream).await {
                tracing::warn!("stderr copier failed: {err}");
            }
        })
    });

    let mut cancelled = false;
    let code = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_code(status),
            Err(err) => {
                let _ = stderr.write_line(&format!("{program}: {err}")).await;
                1
            }
        },
        _ = token.cancelled() => {
            cancelled = true;
            terminate(&mut child).await;
            TIMEOUT_EXIT_CODE
        }
    };

    // Every copier must have drained (or been cut loose) before the result
    // is published.
    if let Some(task) = stdin_task {
        if cancelled {
            task.abort();
        }
        let _ = task.await;
    }
    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    ExecuteResult::from_code(code)
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(1))
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CaptureBuffer;

    fn endpoints() -> (ShellWriter, ShellWriter, CaptureBuffer, CaptureBuffer) {
        let out = CaptureBuffer::new();
        let err = CaptureBuffer::new();
        (
            ShellWriter::Capture(out.clone()),
            ShellWriter::Capture(err.clone()),
            out,
            err,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_child_stdout() {
        let (stdout, stderr, out, _) = endpoints();
        let result = execute_external(
            vec!["echo".to_string(), "hi".to_string()],
            std::env::vars().collect(),
            Path::new("/"),
            ShellReader::Null,
            stdout,
            stderr,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.code(), 0);
        assert_eq!(out.take(), b"hi\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn feeds_bytes_to_child_stdin() {
        let (stdout, stderr, out, _) = endpoints();
        let result = execute_external(
            vec!["cat".to_string()],
            std::env::vars().collect(),
            Path::new("/"),
            ShellReader::from("piped input"),
            stdout,
            stderr,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.code(), 0);
        assert_eq!(out.take(), b"piped input");
    }

    #[tokio::test]
    async fn missing_program_is_127() {
        let (stdout, stderr, _, err) = endpoints();
        let result = execute_external(
            vec!["definitely-not-a-real-command-7f3a".to_string()],
            HashMap::new(),
            Path::new("."),
            ShellReader::Null,
            stdout,
            stderr,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.code(), 127);
        let message = String::from_utf8_lossy(&err.take()).to_string();
        assert!(message.contains("command not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_terminates_the_child() {
        let (stdout, stderr, _, _) = endpoints();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let start = std::time::Instant::now();
        let result = execute_external(
            vec!["sleep".to_string(), "10".to_string()],
            std::env::vars().collect(),
            Path::new("/"),
            ShellReader::Null,
            stdout,
            stderr,
            token,
        )
        .await;
        assert_eq!(result.code(), TIMEOUT_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
