//! Delay values: the duration mini-grammar, backoff sequences, and
//! human-readable formatting.
//!
//! The grammar accepted by `timeout`, `sleep` and retry delays:
//!
//! - a bare integer is a millisecond count,
//! - a string matching `^\d+(\.\d+)?(ms|s|m|h)$` scales by the unit,
//! - a [`DelaySequence`] yields the next delay on each use (exponential
//!   backoff).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)?)(ms|s|m|h)$").expect("valid regex"))
}

/// A delay accepted wherever the duration grammar applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Delay {
    /// A fixed delay in milliseconds.
    Millis(u64),
    /// A sequence that yields a fresh delay on each use.
    Sequence(DelaySequence),
    /// A string that failed to parse. Surfaces as a usage error when the
    /// delay is actually needed, so building a command never fails.
    Invalid(String),
}

impl Delay {
    /// Parse the string form of the grammar.
    pub fn parse(text: &str) -> Result<Self, String> {
        if let Ok(ms) = text.parse::<u64>() {
            return Ok(Delay::Millis(ms));
        }
        let captures = duration_pattern()
            .captures(text)
            .ok_or_else(|| format!("invalid duration '{text}'"))?;
        let value: f64 = captures[1]
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;
        let multiplier = match &captures[2] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => unreachable!("pattern only admits known units"),
        };
        Ok(Delay::Millis((value * multiplier).round() as u64))
    }

    /// Resolve the next delay in milliseconds. Fixed delays always return
    /// the same value; sequences advance.
    pub fn next_millis(&mut self) -> Result<u64, String> {
        match self {
            Delay::Millis(ms) => Ok(*ms),
            Delay::Sequence(sequence) => Ok(sequence.next_millis()),
            Delay::Invalid(text) => Err(format!("invalid duration '{text}'")),
        }
    }
}

impl From<u64> for Delay {
    fn from(ms: u64) -> Self {
        Delay::Millis(ms)
    }
}

impl From<u32> for Delay {
    fn from(ms: u32) -> Self {
        Delay::Millis(ms as u64)
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Delay::Millis(duration.as_millis() as u64)
    }
}

impl From<&str> for Delay {
    fn from(text: &str) -> Self {
        Delay::parse(text).unwrap_or_else(|_| Delay::Invalid(text.to_string()))
    }
}

impl From<DelaySequence> for Delay {
    fn from(sequence: DelaySequence) -> Self {
        Delay::Sequence(sequence)
    }
}

/// Exponential backoff: each call to [`DelaySequence::next_millis`] returns
/// the current delay and multiplies it for the next caller, up to `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct DelaySequence {
    next: f64,
    factor: f64,
    max: f64,
}

impl DelaySequence {
    pub fn exponential(initial: impl Into<Delay>, factor: f64, max: impl Into<Delay>) -> Self {
        let initial = match initial.into() {
            Delay::Millis(ms) => ms,
            _ => 0,
        };
        let max = match max.into() {
            Delay::Millis(ms) => ms,
            _ => u64::MAX,
        };
        Self {
            next: initial as f64,
            factor,
            max: max as f64,
        }
    }

    pub fn next_millis(&mut self) -> u64 {
        let current = self.next.min(self.max);
        self.next = (self.next * self.factor).min(self.max);
        current.round() as u64
    }
}

impl Iterator for DelaySequence {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_millis())
    }
}

/// Render a millisecond count for messages: `1 millisecond`, `250
/// milliseconds`, `1 second`, `1.5 seconds`.
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        if ms == 1 {
            "1 millisecond".to_string()
        } else {
            format!("{ms} milliseconds")
        }
    } else if ms % 1_000 == 0 {
        let seconds = ms / 1_000;
        if seconds == 1 {
            "1 second".to_string()
        } else {
            format!("{seconds} seconds")
        }
    } else {
        format!("{:.1} seconds", ms as f64 / 1_000.0)
    }
}
