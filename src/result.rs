//! The structured result of a command execution, with capture decoders.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ShellError;

/// What a finished command produced. Byte fields are present only for the
/// streams that were configured as captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code. 0 means success.
    pub code: i32,
    /// True when the execution was cut short by its timeout.
    pub timed_out: bool,
    pub(crate) stdout: Option<Vec<u8>>,
    pub(crate) stderr: Option<Vec<u8>>,
    pub(crate) combined: Option<Vec<u8>>,
}

impl CommandResult {
    pub(crate) fn new(
        code: i32,
        timed_out: bool,
        stdout: Option<Vec<u8>>,
        stderr: Option<Vec<u8>>,
        combined: Option<Vec<u8>>,
    ) -> Self {
        Self {
            code,
            timed_out,
            stdout,
            stderr,
            combined,
        }
    }

    /// True if the command exited 0.
    pub fn ok(&self) -> bool {
        self.code == 0
    }

    /// Captured stdout bytes.
    pub fn stdout_bytes(&self) -> Result<&[u8], ShellError> {
        self.stdout
            .as_deref()
            .ok_or_else(|| ShellError::User("stdout was not captured; use .stdout(StdioMode::Piped)".to_string()))
    }

    /// Captured stdout as UTF-8 text, with exactly one trailing newline
    /// trimmed if present.
    pub fn stdout_text(&self) -> Result<String, ShellError> {
        Ok(decode_text(self.stdout_bytes()?))
    }

    /// Captured stdout split into lines.
    pub fn stdout_lines(&self) -> Result<Vec<String>, ShellError> {
        Ok(split_lines(self.stdout_bytes()?))
    }

    /// Captured stdout parsed as JSON.
    pub fn stdout_json<T: DeserializeOwned>(&self) -> Result<T, ShellError> {
        Ok(serde_json::from_slice(self.stdout_bytes()?)?)
    }

    /// Captured stderr bytes.
    pub fn stderr_bytes(&self) -> Result<&[u8], ShellError> {
        self.stderr
            .as_deref()
            .ok_or_else(|| ShellError::User("stderr was not captured; use .stderr(StdioMode::Piped)".to_string()))
    }

    /// Captured stderr as text, one trailing newline trimmed.
    pub fn stderr_text(&self) -> Result<String, ShellError> {
        Ok(decode_text(self.stderr_bytes()?))
    }

    /// Interleaved stdout+stderr bytes, captured when both streams are
    /// piped.
    pub fn combined_bytes(&self) -> Result<&[u8], ShellError> {
        self.combined.as_deref().ok_or_else(|| {
            ShellError::User("combined output is captured only when both stdout and stderr are piped".to_string())
        })
    }

    /// Interleaved stdout+stderr as text.
    pub fn combined_text(&self) -> Result<String, ShellError> {
        Ok(decode_text(self.combined_bytes()?))
    }
}

/// Decode UTF-8 (lossily) and trim exactly one trailing newline — never
/// more.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

/// Split on `\n`, dropping a single trailing empty element.
pub(crate) fn split_lines(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(stdout: &[u8]) -> CommandResult {
        CommandResult::new(0, false, Some(stdout.to_vec()), None, None)
    }

    #[test]
    fn text_trims_exactly_one_newline() {
        assert_eq!(captured(b"hi\n").stdout_text().unwrap(), "hi");
        assert_eq!(captured(b"hi\n\n").stdout_text().unwrap(), "hi\n");
        assert_eq!(captured(b"hi").stdout_text().unwrap(), "hi");
        assert_eq!(captured(b"hi\r\n").stdout_text().unwrap(), "hi");
    }

    #[test]
    fn lines_drop_single_trailing_empty() {
        assert_eq!(captured(b"a\nb\n").stdout_lines().unwrap(), vec!["a", "b"]);
        assert_eq!(
            captured(b"a\nb\n\n").stdout_lines().unwrap(),
            vec!["a", "b", ""]
        );
        assert_eq!(captured(b"a").stdout_lines().unwrap(), vec!["a"]);
    }

    #[test]
    fn json_decodes_stdout() {
        let value: serde_json::Value = captured(br#"{ "prop": 5 }"#).stdout_json().unwrap();
        assert_eq!(value["prop"], 5);
    }

    #[test]
    fn uncaptured_stream_is_a_user_error() {
        let result = CommandResult::new(0, false, None, None, None);
        assert!(matches!(result.stdout_text(), Err(ShellError::User(_))));
        assert!(matches!(result.stderr_bytes(), Err(ShellError::User(_))));
        assert!(matches!(result.combined_bytes(), Err(ShellError::User(_))));
    }
}
