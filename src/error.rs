//! Error taxonomy for shell executions.
//!
//! A non-zero final exit code surfaces as [`ShellError::Failed`] unless the
//! builder's `no_throw` policy covers that code. Parse errors and builder
//! misuse surface regardless of `no_throw`.

use crate::parser::ParseError;
use crate::result::CommandResult;

/// Exit code reported for timed-out or aborted executions.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// The source text did not parse. Always fatal for that execution.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The execution finished with a non-zero exit code not covered by
    /// `no_throw`. The full result, including captures, rides along.
    #[error("{}", failed_message(.0))]
    Failed(CommandResult),

    /// Builder misuse (wrong stdin type, invalid duration, missing
    /// capture). Never suppressed by `no_throw`.
    #[error("{0}")]
    User(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid json output: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShellError {
    /// The command result carried by a `Failed` error.
    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            ShellError::Failed(result) => Some(result),
            _ => None,
        }
    }

    /// The exit code, for errors that carry one.
    pub fn code(&self) -> Option<i32> {
        self.result().map(|result| result.code)
    }
}

fn failed_message(result: &CommandResult) -> String {
    if result.timed_out {
        format!("command timed out (exit code {})", result.code)
    } else {
        format!("command failed with exit code {}", result.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_message_mentions_code() {
        let err = ShellError::Failed(CommandResult::new(3, false, None, None, None));
        assert_eq!(err.to_string(), "command failed with exit code 3");
        assert_eq!(err.code(), Some(3));
    }

    #[test]
    fn timed_out_message_is_distinct() {
        let err = ShellError::Failed(CommandResult::new(TIMEOUT_EXIT_CODE, true, None, None, None));
        assert_eq!(err.to_string(), "command timed out (exit code 124)");
    }
}
