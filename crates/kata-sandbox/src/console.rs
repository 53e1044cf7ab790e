//! Console output routing.
//!
//! Learner code never writes to a process-wide logger. Every interpreter
//! is handed a [`Console`], which forwards lines to an injected [`LogSink`]
//! unless a [`ConsoleCapture`] guard is active, in which case lines are
//! collected for the preview instead. Dropping the guard restores the
//! previous routing on every exit path.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

// ============================================================================
// Sinks
// ============================================================================

/// Severity of a console call, named after the method that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `console.log`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
    /// `console.debug`
    Debug,
}

impl LogLevel {
    /// Maps a console method name to its level.
    #[must_use]
    pub fn from_method(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Self::Log),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

/// Destination for console lines that are not being captured.
pub trait LogSink: Send {
    /// Writes one formatted console line.
    fn write(&mut self, level: LogLevel, line: &str);
}

/// Forwards console lines to `tracing` under the `kata::console` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&mut self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Log | LogLevel::Info => tracing::info!(target: "kata::console", "{line}"),
            LogLevel::Warn => tracing::warn!(target: "kata::console", "{line}"),
            LogLevel::Error => tracing::error!(target: "kata::console", "{line}"),
            LogLevel::Debug => tracing::debug!(target: "kata::console", "{line}"),
        }
    }
}

/// Drops every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

impl LogSink for DiscardSink {
    fn write(&mut self, _level: LogLevel, _line: &str) {}
}

/// Records lines in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every line written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, _level: LogLevel, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

// ============================================================================
// Console
// ============================================================================

#[derive(Debug)]
struct CaptureBuffer {
    lines: Vec<String>,
    limit: usize,
    truncated: bool,
}

/// Console handed to the interpreter.
pub struct Console {
    sink: Box<dyn LogSink>,
    capture: Option<CaptureBuffer>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("capturing", &self.is_capturing())
            .finish_non_exhaustive()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl Console {
    /// Creates a console writing to `sink`.
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            capture: None,
        }
    }

    /// Writes a line to the active capture buffer, or to the sink when
    /// nothing is capturing.
    pub fn log(&mut self, level: LogLevel, line: &str) {
        match &mut self.capture {
            Some(buffer) if buffer.lines.len() < buffer.limit => {
                buffer.lines.push(line.to_string());
            }
            Some(buffer) => {
                if !buffer.truncated {
                    buffer.truncated = true;
                    buffer.lines.push(format!(
                        "[console output truncated after {} lines]",
                        buffer.limit
                    ));
                }
            }
            None => self.sink.write(level, line),
        }
    }

    /// Returns `true` while a capture guard is active.
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Starts capturing up to `limit` lines until the returned guard is
    /// dropped or finished.
    pub fn capture(&mut self, limit: usize) -> ConsoleCapture<'_> {
        let previous = self.capture.replace(CaptureBuffer {
            lines: Vec::new(),
            limit,
            truncated: false,
        });
        ConsoleCapture {
            console: self,
            previous,
        }
    }
}

/// Guard for an active capture. Restores the previous routing on drop.
#[derive(Debug)]
pub struct ConsoleCapture<'c> {
    console: &'c mut Console,
    previous: Option<CaptureBuffer>,
}

impl ConsoleCapture<'_> {
    /// Returns the console that is currently capturing.
    pub fn console(&mut self) -> &mut Console {
        self.console
    }

    /// Ends the capture and returns the collected lines.
    pub fn finish(self) -> Vec<String> {
        self.console
            .capture
            .take()
            .map(|buffer| buffer.lines)
            .unwrap_or_default()
    }
}

impl Drop for ConsoleCapture<'_> {
    fn drop(&mut self) {
        self.console.capture = self.previous.take();
    }
}
