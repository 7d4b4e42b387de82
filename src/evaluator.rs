//! Shell AST evaluation.
//!
//! Interprets the parsed command tree: sequential flow, `&&`/`||`,
//! pipelines, subshells, word expansion, redirects, and dispatch of simple
//! commands to custom handlers, builtins, or OS processes (in that order).
//!
//! State isolation follows the shell model: sequential items and boolean
//! chains share the caller's state so `cd`/`export` persist to the next
//! command, while subshells, pipeline stages, background items and command
//! substitutions run against clones whose changes are discarded.

use tokio::task::JoinHandle;

use crate::ast::{
    BooleanOp, Node, Pipeline, Redirect, RedirectOp, RedirectTarget, SequentialList,
    SimpleCommand, Word, WordPart,
};
use crate::commands::{CommandContext, ExecuteResult};
use crate::error::TIMEOUT_EXIT_CODE;
use crate::exec::execute_external;
use crate::io::{BoxFuture, CaptureBuffer, ShellReader, ShellWriter};
use crate::path::resolve_path;
use crate::pipe::pipe;
use crate::state::ShellState;

/// Run a parsed list against the given state and stdio endpoints.
pub(crate) async fn execute(
    list: &SequentialList,
    state: &mut ShellState,
    stdin: ShellReader,
    stdout: ShellWriter,
    stderr: ShellWriter,
) -> ExecuteResult {
    execute_list(list, state, stdin, stdout, stderr).await
}

fn execute_list<'a>(
    list: &'a SequentialList,
    state: &'a mut ShellState,
    stdin: ShellReader,
    stdout: ShellWriter,
    stderr: ShellWriter,
) -> BoxFuture<'a, ExecuteResult> {
    Box::pin(async move {
        let mut code = 0;
        let mut background: Vec<JoinHandle<()>> = Vec::new();
        for item in &list.items {
            if state.token().is_cancelled() {
                code = TIMEOUT_EXIT_CODE;
                break;
            }
            if item.is_async {
                let node = item.node.clone();
                let mut task_state = state.clone();
                let (stdin, stdout, stderr) = (stdin.clone(), stdout.clone(), stderr.clone());
                background.push(tokio::spawn(async move {
                    let result = execute_node(&node, &mut task_state, stdin, stdout, stderr).await;
                    tracing::debug!(code = result.code(), "background item finished");
                }));
            } else {
                match execute_node(
                    &item.node,
                    state,
                    stdin.clone(),
                    stdout.clone(),
                    stderr.clone(),
                )
                .await
                {
                    ExecuteResult::Continue {
                        code: item_code,
                        changes,
                    } => {
                        state.apply_changes(changes);
                        state.set_last_code(item_code);
                        code = item_code;
                    }
                    exit @ ExecuteResult::Exit { .. } => {
                        for task in background.drain(..) {
                            task.abort();
                        }
                        return exit;
                    }
                }
            }
        }
        // Background completion is awaited at the close of the enclosing
        // list, best effort.
        for task in background {
            let _ = task.await;
        }
        ExecuteResult::from_code(code)
    })
}

fn execute_node<'a>(
    node: &'a Node,
    state: &'a mut ShellState,
    stdin: ShellReader,
    stdout: ShellWriter,
    stderr: ShellWriter,
) -> BoxFuture<'a, ExecuteResult> {
    Box::pin(async move {
        match node {
            Node::Boolean(boolean) => {
                let left = execute_node(
                    &boolean.left,
                    state,
                    stdin.clone(),
                    stdout.clone(),
                    stderr.clone(),
                )
                .await;
                let left_code = match left {
                    ExecuteResult::Continue { code, changes } => {
                        state.apply_changes(changes);
                        state.set_last_code(code);
                        code
                    }
                    exit @ ExecuteResult::Exit { .. } => return exit,
                };
                let run_right = match boolean.op {
                    BooleanOp::And => left_code == 0,
                    BooleanOp::Or => left_code != 0,
                };
                if run_right {
                    execute_node(&boolean.right, state, stdin, stdout, stderr).await
                } else {
                    ExecuteResult::from_code(left_code)
                }
            }
            Node::Pipeline(pipeline) => {
                execute_pipeline(pipeline, state, stdin, stdout, stderr).await
            }
            Node::Command(command) => {
                execute_command(command, state, stdin, stdout, stderr).await
            }
            Node::Subshell(inner) => {
                let mut sub_state = state.clone();
                let result = execute_list(inner, &mut sub_state, stdin, stdout, stderr).await;
                // Both env changes and `exit` stay inside the subshell.
                ExecuteResult::from_code(result.code())
            }
            Node::Assignment(assignments) => {
                for assignment in assignments {
                    let value = expand_word(&assignment.value, state, &stderr).await;
                    state.set_shell_var(assignment.name.clone(), value);
                }
                ExecuteResult::success()
            }
        }
    })
}

/// Both sides of a pipeline run concurrently against cloned state; the
/// pipeline's code is the rightmost side's code.
async fn execute_pipeline(
    pipeline: &Pipeline,
    state: &mut ShellState,
    stdin: ShellReader,
    stdout: ShellWriter,
    stderr: ShellWriter,
) -> ExecuteResult {
    let (writer, reader) = pipe();
    let left_stdout = ShellWriter::Pipe(writer);
    let left_stderr = if pipeline.stderr_too {
        left_stdout.clone()
    } else {
        stderr.clone()
    };
    let left_node = pipeline.left.clone();
    let mut left_state = state.clone();
    let left_task = tokio::spawn(async move {
        execute_node(&left_node, &mut left_state, stdin, left_stdout, left_stderr)
            .await
            .code()
    });

    let mut right_state = state.clone();
    let right = execute_node(
        &pipeline.right,
        &mut right_state,
        ShellReader::from_pipe(reader),
        stdout,
        stderr,
    )
    .await;

    // The result is published only after the upstream side has fully
    // exited and its copiers have drained.
    let _ = left_task.await;
    ExecuteResult::from_code(right.code())
}

async fn execute_command(
    command: &SimpleCommand,
    state: &mut ShellState,
    mut stdin: ShellReader,
    mut stdout: ShellWriter,
    mut stderr: ShellWriter,
) -> ExecuteResult {
    let mut args = Vec::with_capacity(command.args.len());
    for word in &command.args {
        args.push(expand_word(word, state, &stderr).await);
    }
    let mut invocation_env = Vec::with_capacity(command.env.len());
    for assignment in &command.env {
        let value = expand_word(&assignment.value, state, &stderr).await;
        invocation_env.push((assignment.name.clone(), value));
    }

    if args.is_empty() {
        // `NAME=value` with no command: shell-local assignments. Redirects
        // without a command still open (and create) their targets.
        for (name, value) in invocation_env {
            state.set_shell_var(name, value);
        }
        if let Err(message) =
            apply_redirects(&command.redirects, state, &mut stdin, &mut stdout, &mut stderr).await
        {
            let _ = stderr.write_line(&message).await;
            return ExecuteResult::from_code(1);
        }
        return ExecuteResult::success();
    }

    if let Err(message) =
        apply_redirects(&command.redirects, state, &mut stdin, &mut stdout, &mut stderr).await
    {
        let _ = stderr.write_line(&message).await;
        return ExecuteResult::from_code(1);
    }

    let program = args[0].clone();
    let env = state.invocation_env(&invocation_env);

    // Dispatch: custom/builtin handlers first, then the OS.
    if let Some(handler) = state.commands().get(&program).cloned() {
        tracing::debug!(command = %program, "dispatching registered command");
        let ctx = CommandContext {
            args: args[1..].to_vec(),
            cwd: state.cwd().to_path_buf(),
            env,
            shell_vars: state.shell_vars().clone(),
            last_code: state.last_code(),
            stdin,
            stdout,
            stderr,
            token: state.token().clone(),
        };
        match handler.execute(ctx).await {
            ExecuteResult::Continue { code, changes } => {
                state.apply_changes(changes);
                ExecuteResult::from_code(code)
            }
            exit @ ExecuteResult::Exit { .. } => exit,
        }
    } else {
        execute_external(
            args,
            env,
            state.cwd(),
            stdin,
            stdout,
            stderr,
            state.token().clone(),
        )
        .await
    }
}

/// Rewire the stdio endpoints per the command's redirects. Paths resolve
/// against the state cwd; `>` truncates, `>>` appends, `<` opens for read,
/// `2>&1` aliases one sink to the other.
async fn apply_redirects(
    redirects: &[Redirect],
    state: &ShellState,
    stdin: &mut ShellReader,
    stdout: &mut ShellWriter,
    stderr: &mut ShellWriter,
) -> Result<(), String> {
    for redirect in redirects {
        match &redirect.target {
            RedirectTarget::Fd(target_fd) => match (redirect.fd, *target_fd) {
                (2, 1) => *stderr = stdout.clone(),
                (1, 2) => *stdout = stderr.clone(),
                (fd, target) if fd == target => {}
                (fd, target) => {
                    return Err(format!("unsupported descriptor redirect {fd}>&{target}"));
                }
            },
            RedirectTarget::Path(word) => {
                let target = expand_word(word, state, stderr).await;
                let path = resolve_path(state.cwd(), &target);
                match redirect.op {
                    RedirectOp::Read => {
                        if redirect.fd != 0 {
                            return Err(format!("unsupported input descriptor {}", redirect.fd));
                        }
                        let file = tokio::fs::File::open(&path)
                            .await
                            .map_err(|err| format!("cannot open {target}: {err}"))?;
                        *stdin = ShellReader::from_reader(file);
                    }
                    RedirectOp::Write | RedirectOp::Append => {
                        let mut options = tokio::fs::OpenOptions::new();
                        options.create(true).write(true);
                        if redirect.op == RedirectOp::Append {
                            options.append(true);
                        } else {
                            options.truncate(true);
                        }
                        let file = options
                            .open(&path)
                            .await
                            .map_err(|err| format!("cannot open {target}: {err}"))?;
                        let writer = ShellWriter::from_file(file);
                        match redirect.fd {
                            1 => *stdout = writer,
                            2 => *stderr = writer,
                            fd => return Err(format!("unsupported output descriptor {fd}")),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Expand a word into exactly one argv element. No field splitting.
pub(crate) fn expand_word<'a>(
    word: &'a Word,
    state: &'a ShellState,
    stderr: &'a ShellWriter,
) -> BoxFuture<'a, String> {
    expand_parts(&word.parts, state, stderr)
}

fn expand_parts<'a>(
    parts: &'a [WordPart],
    state: &'a ShellState,
    stderr: &'a ShellWriter,
) -> BoxFuture<'a, String> {
    Box::pin(async move {
        let mut out = String::new();
        for part in parts {
            match part {
                WordPart::Text(text) => out.push_str(text),
                WordPart::Variable(name) => {
                    // Shell-local first, then exported; undefined is empty.
                    if let Some(value) = state.var(name) {
                        out.push_str(value);
                    }
                }
                WordPart::Quoted(inner) => {
                    out.push_str(&expand_parts(inner, state, stderr).await);
                }
                WordPart::CommandSubst(list) => {
                    out.push_str(&run_substitution(list, state, stderr).await);
                }
            }
        }
        out
    })
}

/// `$( … )`: run the inner list against a cloned state with stdout
/// captured, and return the text with all trailing newlines trimmed.
async fn run_substitution(
    list: &SequentialList,
    state: &ShellState,
    stderr: &ShellWriter,
) -> String {
    let capture = CaptureBuffer::new();
    let mut sub_state = state.clone();
    let result = execute_list(
        list,
        &mut sub_state,
        ShellReader::Null,
        ShellWriter::Capture(capture.clone()),
        stderr.clone(),
    )
    .await;
    tracing::debug!(code = result.code(), "command substitution finished");
    let bytes = capture.take();
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}
