//! Format-style entry points.

/// Build a command from a `{}` template; each interpolation is quoted into
/// exactly one token (lists become several).
///
/// ```no_run
/// # async fn demo() -> Result<(), shoal::ShellError> {
/// let out = shoal::sh!("echo {}", "hello world").text().await?;
/// assert_eq!(out, "hello world");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! sh {
    ($template:expr $(, $arg:expr)* $(,)?) => {
        $crate::Shell::new().template($template, &[$($crate::ArgValue::from($arg)),*])
    };
}

/// Like [`sh!`] but interpolations are spliced verbatim, without quoting.
#[macro_export]
macro_rules! sh_raw {
    ($template:expr $(, $arg:expr)* $(,)?) => {
        $crate::Shell::new().raw_template($template, &[$($crate::ArgValue::from($arg)),*])
    };
}
