//! Kata exercise session engine.
//!
//! Loads exercise catalogs, runs learner sessions over them, checks
//! submissions and remembers what has been completed. Previews are rendered
//! by [`kata_sandbox`]. The [`api`] and [`websocket`] modules expose one
//! session over HTTP.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use kata_engine::{CatalogSet, Exercise, MemoryProgressStore, Session};
//! use kata_sandbox::{ExerciseKind, SandboxLimits};
//!
//! let mut exercise = Exercise::new(1, ExerciseKind::Markup);
//! exercise.rules.required_substrings = vec!["<h1>".to_string()];
//! let set = CatalogSet::new("Basics", vec![exercise]);
//!
//! let store = Arc::new(MemoryProgressStore::new());
//! let mut session = Session::new(set, store, SandboxLimits::default()).unwrap();
//! session.select(0);
//! session.edit("<h1>Hello</h1>");
//! assert!(session.submit().unwrap().passed);
//! assert_eq!(session.progress().percent, 100);
//! ```

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod progress;
pub mod session;
pub mod verify;
pub mod websocket;

pub use api::{
    create_router, AppState, ErrorResponse, FilterRequest, ResetProgressRequest, SelectRequest,
    SetSummary, SourceRequest, SubmitResponse, TransitionResponse,
};
pub use catalog::{
    default_progress_key, Catalog, CatalogSet, CustomValidator, Exercise, LevelFilter, RuleSet,
    MAX_CATALOG_SIZE, MAX_LEVEL, MIN_LEVEL,
};
pub use config::{Config, ServerConfig};
pub use error::{KataError, Result};
pub use progress::{
    clear_completed, load_completed, record_file_stem, save_completed, CompletedSet,
    FileProgressStore, MemoryProgressStore, ProgressStore,
};
pub use session::{
    exercise_label, Editor, ExerciseView, LevelProgress, ProgressSummary, Session,
    SessionSnapshot, View, VisibleExercise,
};
pub use verify::{normalize, verify, verify_with_limits, Outcome, Verdict};
pub use websocket::{ClientMessage, EventBroadcaster, SessionEvent};
