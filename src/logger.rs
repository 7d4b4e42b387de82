//! Log sinks carried as scoped shell defaults.
//!
//! Shells hold a [`Loggers`] in a scoped value so a child shell can swap a
//! sink (e.g. route info lines into a test buffer) without affecting its
//! parent. The default sinks write to the process stderr.

use std::fmt;
use std::sync::Arc;

use colored::Colorize;

/// A log line consumer.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct Loggers {
    info: LogSink,
    warn: LogSink,
    error: LogSink,
}

impl Loggers {
    pub fn new(info: LogSink, warn: LogSink, error: LogSink) -> Self {
        Self { info, warn, error }
    }

    pub fn with_info(mut self, sink: LogSink) -> Self {
        self.info = sink;
        self
    }

    pub fn with_warn(mut self, sink: LogSink) -> Self {
        self.warn = sink;
        self
    }

    pub fn with_error(mut self, sink: LogSink) -> Self {
        self.error = sink;
        self
    }

    pub fn info(&self, message: &str) {
        (self.info)(message);
    }

    pub fn warn(&self, message: &str) {
        (self.warn)(message);
    }

    pub fn error(&self, message: &str) {
        (self.error)(message);
    }

    /// Echo the command about to run, in blue when the target supports
    /// color.
    pub(crate) fn print_command(&self, source: &str) {
        self.info(&format!("> {}", source.blue()));
    }
}

impl Default for Loggers {
    fn default() -> Self {
        Self {
            info: Arc::new(|message| eprintln!("{message}")),
            warn: Arc::new(|message| eprintln!("{message}")),
            error: Arc::new(|message| eprintln!("{message}")),
        }
    }
}

impl fmt::Debug for Loggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loggers").finish()
    }
}
