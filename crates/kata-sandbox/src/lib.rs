//! Sandboxed preview rendering for Kata exercises.
//!
//! Learner code is never handed to a real browser engine. Markup is parsed
//! into an arena [`dom::Dom`], stylesheets are scoped to the preview
//! container, and scripts run in a small tree-walking interpreter for the
//! JavaScript subset exercises use.
//!
//! # Example
//!
//! ```
//! use kata_sandbox::{ExerciseKind, PreviewRequest, Sandbox, SandboxLimits};
//!
//! let mut sandbox = Sandbox::new(SandboxLimits::default()).unwrap();
//! let preview = sandbox.render(&PreviewRequest::new(
//!     ExerciseKind::Script,
//!     "console.log([1, 2, 3].map(n => n * 2).join(', '))",
//! ));
//! assert_eq!(preview.html(), "<pre class=\"kata-console\">2, 4, 6</pre>");
//! ```

pub mod console;
pub mod css;
pub mod dom;
mod error;
pub mod host;
pub mod preview;
pub mod script;
pub mod validator;

pub use console::{
    Console, ConsoleCapture, DiscardSink, LogLevel, LogSink, MemorySink, TracingSink,
};
pub use error::{Result, SandboxError};
pub use host::{ConfinedLookup, HostPage, PREVIEW_CONTAINER_ID};
pub use preview::{ExerciseKind, Preview, PreviewRequest, Sandbox, EMPTY_CONSOLE_PLACEHOLDER};
pub use script::{SandboxLimits, ScriptFault};
pub use validator::{evaluate_validator, ValidatorReport};
