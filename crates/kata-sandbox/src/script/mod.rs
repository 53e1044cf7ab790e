//! Interpreter for the JavaScript subset learners write.
//!
//! The dialect covers what short exercises use: declarations, functions and
//! closures, control flow, exceptions, template literals, destructuring and
//! the common built-ins. Classes, regular expressions, generators, async
//! code and prototypes are not supported and raise `SyntaxError`.
//!
//! Evaluation is bounded by [`SandboxLimits`]: a step budget, a call-depth
//! limit and a cap on captured console lines.

mod ast;
mod builtins;
mod dom_api;
mod interp;
mod lexer;
mod parser;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub(crate) use interp::run_isolated;
pub(crate) use value::{to_js_string, Value};

/// Default step budget.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;
/// Default maximum call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 100;
/// Default number of console lines kept per run.
pub const DEFAULT_MAX_CONSOLE_LINES: usize = 500;

/// Deepest syntactic or value nesting accepted before a script faults.
const MAX_NESTING: usize = 1_000;

/// An uncaught fault raised by learner code.
///
/// Displays as `Name: message`, the way browsers print uncaught errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFault {
    /// Error constructor name, e.g. `TypeError`.
    pub name: String,
    /// Error message.
    pub message: String,
}

impl ScriptFault {
    /// Creates a fault with the given name and message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a `SyntaxError` fault.
    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new("SyntaxError", message)
    }

    /// Creates a `RangeError` fault, used for exhausted budgets.
    #[must_use]
    pub fn range(message: impl Into<String>) -> Self {
        Self::new("RangeError", message)
    }
}

impl fmt::Display for ScriptFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

impl std::error::Error for ScriptFault {}

/// Deterministic execution budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxLimits {
    /// Evaluation steps allowed per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Maximum depth of nested function calls.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
    /// Console lines kept before output is truncated.
    #[serde(default = "default_max_console_lines")]
    pub max_console_lines: usize,
}

const fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

const fn default_max_call_depth() -> usize {
    DEFAULT_MAX_CALL_DEPTH
}

const fn default_max_console_lines() -> usize {
    DEFAULT_MAX_CONSOLE_LINES
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_console_lines: DEFAULT_MAX_CONSOLE_LINES,
        }
    }
}

impl SandboxLimits {
    /// Checks that every limit is non-zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_steps == 0 {
            return Err(crate::SandboxError::invalid_limit("maxSteps"));
        }
        if self.max_call_depth == 0 {
            return Err(crate::SandboxError::invalid_limit("maxCallDepth"));
        }
        if self.max_console_lines == 0 {
            return Err(crate::SandboxError::invalid_limit("maxConsoleLines"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display() {
        assert_eq!(
            ScriptFault::new("TypeError", "x is not a function").to_string(),
            "TypeError: x is not a function"
        );
        assert_eq!(ScriptFault::new("Error", "").to_string(), "Error");
    }

    #[test]
    fn test_limits_defaults_and_validation() {
        let limits: SandboxLimits = serde_json::from_str(r#"{"maxSteps": 10}"#).unwrap();
        assert_eq!(limits.max_steps, 10);
        assert_eq!(limits.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert!(limits.validate().is_ok());

        let zero = SandboxLimits {
            max_console_lines: 0,
            ..SandboxLimits::default()
        };
        assert!(zero.validate().unwrap_err().to_string().contains("maxConsoleLines"));
    }
}
