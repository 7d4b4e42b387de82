//! Template assembly: `{}` placeholders become safely quoted argv tokens.
//!
//! `shell.template("cp {} {}", …)` is the library's rendition of a tagged
//! template: literal chunks are emitted verbatim, and each interpolation
//! becomes exactly one token (or, for a list, one token per element). The
//! raw variant skips quoting and splices text as-is.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ShellError;
use crate::result::CommandResult;

/// One template interpolation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// A single argv token.
    Text(String),
    /// Several argv tokens.
    List(Vec<String>),
}

impl From<&str> for ArgValue {
    fn from(text: &str) -> Self {
        ArgValue::Text(text.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(text: String) -> Self {
        ArgValue::Text(text)
    }
}

impl From<&String> for ArgValue {
    fn from(text: &String) -> Self {
        ArgValue::Text(text.clone())
    }
}

impl From<&Path> for ArgValue {
    fn from(path: &Path) -> Self {
        ArgValue::Text(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ArgValue {
    fn from(path: PathBuf) -> Self {
        ArgValue::from(path.as_path())
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(items: Vec<String>) -> Self {
        ArgValue::List(items)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(items: Vec<&str>) -> Self {
        ArgValue::List(items.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for ArgValue {
    fn from(items: &[&str]) -> Self {
        ArgValue::List(items.iter().map(|item| item.to_string()).collect())
    }
}

/// A previous result interpolates as its captured stdout text, one
/// trailing newline trimmed. Uncaptured stdout interpolates as empty.
impl From<&CommandResult> for ArgValue {
    fn from(result: &CommandResult) -> Self {
        ArgValue::Text(result.stdout_text().unwrap_or_default())
    }
}

macro_rules! arg_value_from_display {
    ($($ty:ty),*) => {
        $(impl From<$ty> for ArgValue {
            fn from(value: $ty) -> Self {
                ArgValue::Text(value.to_string())
            }
        })*
    };
}

arg_value_from_display!(i32, i64, u32, u64, usize, f64);

fn safe_arg_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_./:=+@%^-]+$").expect("valid regex"))
}

/// Quote one token for the mini-language: safe characters pass through,
/// anything else is single-quoted with embedded quotes escaped as `'\''`.
pub(crate) fn quote_arg(arg: &str) -> String {
    if safe_arg_pattern().is_match(arg) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Substitute `{}` placeholders in `template` with the rendered values.
/// Placeholder and value counts must match exactly.
pub(crate) fn build_source(
    template: &str,
    args: &[ArgValue],
    raw: bool,
) -> Result<String, ShellError> {
    let mut out = String::new();
    let mut remaining = template;
    let mut used = 0;
    while let Some(pos) = remaining.find("{}") {
        out.push_str(&remaining[..pos]);
        let value = args.get(used).ok_or_else(|| {
            ShellError::User(format!(
                "template has more placeholders than the {} supplied value(s)",
                args.len()
            ))
        })?;
        out.push_str(&render(value, raw));
        used += 1;
        remaining = &remaining[pos + 2..];
    }
    out.push_str(remaining);
    if used != args.len() {
        return Err(ShellError::User(format!(
            "template has {used} placeholder(s) but {} value(s) were supplied",
            args.len()
        )));
    }
    Ok(out)
}

fn render(value: &ArgValue, raw: bool) -> String {
    let quote = |token: &String| {
        if raw {
            token.clone()
        } else {
            quote_arg(token)
        }
    };
    match value {
        ArgValue::Text(text) => quote(text),
        // Raw lists are space-joined without quoting.
        ArgValue::List(items) => items.iter().map(quote).collect::<Vec<_>>().join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("simple", "simple")]
    #[case("a/b.c:d=e", "a/b.c:d=e")]
    #[case("has space", "'has space'")]
    #[case("", "''")]
    #[case("it's", r"'it'\''s'")]
    #[case("$HOME", "'$HOME'")]
    #[case("a;b", "'a;b'")]
    #[case("*glob*", "'*glob*'")]
    fn quoting_rule(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote_arg(input), expected);
    }

    #[test]
    fn placeholders_substitute_in_order() {
        let source = build_source(
            "cp {} {}",
            &[ArgValue::from("a file"), ArgValue::from("dest")],
            false,
        )
        .unwrap();
        assert_eq!(source, "cp 'a file' dest");
    }

    #[test]
    fn list_value_expands_to_multiple_tokens() {
        let source = build_source("rm {}", &[ArgValue::from(vec!["a", "b c"])], false).unwrap();
        assert_eq!(source, "rm a 'b c'");
    }

    #[test]
    fn raw_mode_skips_quoting() {
        let source = build_source("echo {}", &[ArgValue::from("$HOME | x")], true).unwrap();
        assert_eq!(source, "echo $HOME | x");
    }

    #[test]
    fn placeholder_count_mismatch_is_user_error() {
        assert!(matches!(
            build_source("echo {}", &[], false),
            Err(ShellError::User(_))
        ));
        assert!(matches!(
            build_source("echo", &[ArgValue::from("x")], false),
            Err(ShellError::User(_))
        ));
    }

    #[test]
    fn command_result_interpolates_stdout_text() {
        let result = CommandResult::new(0, false, Some(b"value\n".to_vec()), None, None);
        assert_eq!(ArgValue::from(&result), ArgValue::Text("value".to_string()));
    }
}
