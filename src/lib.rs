//! shoal: run POSIX-style shell pipelines from Rust, identically on every
//! platform.
//!
//! The mini-language is interpreted in-process rather than handed to a
//! system shell, so `&&`, `||`, pipes, redirects, env scoping and
//! substitutions behave the same on unix and Windows. This crate provides:
//!
//! - **Lexer / Parser**: the mini-language → command AST
//! - **Evaluator**: sequential lists, boolean chains, pipelines, subshells,
//!   redirects, word expansion, cancellation
//! - **Builtins**: `cd`, `echo`, `exit`, `sleep`, `test`, `export`,
//!   `unset`, `pwd`, `true`/`false` — plus user-registered commands
//! - **I/O plumbing**: in-process pipes, capture buffers, tee, reader and
//!   writer endpoints
//! - **Builder**: an immutable fluent configuration with `spawn`, `text`,
//!   `json`, `lines`, `bytes`
//! - **Shell**: scoped defaults (cwd, env, loggers, print-command) that
//!   child shells inherit
//!
//! ```no_run
//! # async fn demo() -> Result<(), shoal::ShellError> {
//! let name = "shell user";
//! let greeting = shoal::sh!("echo hello {}", name).text().await?;
//! assert_eq!(greeting, "hello shell user");
//!
//! let value: serde_json::Value = shoal::Shell::new()
//!     .command("echo '{ \"prop\": 5 }'")
//!     .json()
//!     .await?;
//! assert_eq!(value["prop"], 5);
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod builder;
pub mod commands;
pub mod duration;
pub mod error;
mod evaluator;
mod exec;
pub mod io;
pub mod lexer;
pub mod logger;
mod macros;
pub mod parser;
pub mod path;
pub mod pipe;
pub mod result;
pub mod scoped;
pub mod shell;
pub mod state;
pub mod template;

pub use builder::{CommandBuilder, CommandHandle};
pub use commands::{CommandContext, ExecuteResult, ShellCommand};
pub use duration::{Delay, DelaySequence, format_duration};
pub use error::{ShellError, TIMEOUT_EXIT_CODE};
pub use io::{ShellReader, ShellWriter, StdioMode};
pub use logger::{LogSink, Loggers};
pub use parser::{ParseError, parse};
pub use path::resolve_path;
pub use result::CommandResult;
pub use scoped::ScopedValue;
pub use shell::Shell;
pub use state::EnvChange;
pub use template::ArgValue;
