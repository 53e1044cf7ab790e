//! Kata progress reports.
//!
//! A [`ProgressReport`] captures how far a learner has got through one
//! catalog set: overall counts, a per-level breakdown and one row per
//! exercise. Reports serialize to JSON for tooling and render to Markdown
//! for people.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - compact or pretty JSON
//! - [`MarkdownGenerator`] - a summary table, a level table and an exercise checklist
//!
//! # Example
//!
//! ```rust
//! use kata_engine::{CatalogSet, CompletedSet, Exercise};
//! use kata_report::{json::JsonGenerator, MarkdownGenerator, ProgressReport};
//! use kata_sandbox::ExerciseKind;
//!
//! let set = CatalogSet::new(
//!     "HTML Basics",
//!     vec![
//!         Exercise::new(1, ExerciseKind::Markup),
//!         Exercise::new(2, ExerciseKind::Markup),
//!     ],
//! );
//! let report = ProgressReport::from_set(&set, &CompletedSet::from([0]));
//! assert_eq!(report.summary.percent, 50);
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"setName\": \"HTML Basics\""));
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("- [x] **Exercise 1**"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use kata_engine::{exercise_label, CatalogSet, CompletedSet, Session};
use kata_sandbox::ExerciseKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while generating a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write a report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report
// ============================================================================

/// Progress through one catalog set at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Name of the catalog set.
    pub set_name: String,

    /// Key the set's progress record is stored under.
    pub progress_key: String,

    /// When the report was produced.
    pub generated_at: DateTime<Utc>,

    /// Overall completion.
    pub summary: ReportSummary,

    /// Completion for each level present in the set, ascending.
    pub levels: Vec<LevelRow>,

    /// One row per exercise in catalog order.
    pub exercises: Vec<ExerciseRow>,
}

impl ProgressReport {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Builds a report for `set` with `completed` recorded, stamped now.
    #[must_use]
    pub fn from_set(set: &CatalogSet, completed: &CompletedSet) -> Self {
        let exercises = exercise_rows(set, completed);
        let summary = ReportSummary::from_rows(&exercises);
        let levels = level_rows(&exercises);
        Self {
            set_name: set.name.clone(),
            progress_key: set.key.clone(),
            generated_at: Utc::now(),
            summary,
            levels,
            exercises,
        }
    }

    /// Builds a report for the set a session is working through.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self::from_set(session.set(), session.completed())
    }

    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Returns `true` when every exercise in a non-empty set is completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.summary.total > 0 && self.summary.completed == self.summary.total
    }

    /// Returns the rows still to be completed.
    pub fn remaining(&self) -> impl Iterator<Item = &ExerciseRow> {
        self.exercises.iter().filter(|row| !row.completed)
    }
}

/// Overall completion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Completed exercises.
    pub completed: usize,
    /// Exercises in the set.
    pub total: usize,
    /// Rounded percentage; 0 for an empty set.
    pub percent: u8,
}

impl ReportSummary {
    fn from_rows(rows: &[ExerciseRow]) -> Self {
        let completed = rows.iter().filter(|row| row.completed).count();
        Self {
            completed,
            total: rows.len(),
            percent: percent(completed, rows.len()),
        }
    }
}

/// Completion for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRow {
    /// The level.
    pub level: u8,
    /// Completed exercises of this level.
    pub completed: usize,
    /// Exercises of this level.
    pub total: usize,
}

/// One exercise in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRow {
    /// 1-based exercise number.
    pub number: usize,
    /// Display label, e.g. "Exercise 3".
    pub label: String,
    /// Difficulty level.
    pub level: u8,
    /// Exercise kind.
    pub kind: ExerciseKind,
    /// Title, possibly empty.
    pub title: String,
    /// Whether the exercise has been completed.
    pub completed: bool,
}

fn exercise_rows(set: &CatalogSet, completed: &CompletedSet) -> Vec<ExerciseRow> {
    set.exercises
        .iter()
        .enumerate()
        .map(|(index, exercise)| ExerciseRow {
            number: index + 1,
            label: exercise_label(index),
            level: exercise.level,
            kind: exercise.kind,
            title: exercise.title.clone(),
            completed: completed.contains(&index),
        })
        .collect()
}

fn level_rows(rows: &[ExerciseRow]) -> Vec<LevelRow> {
    let mut levels: Vec<LevelRow> = Vec::new();
    for row in rows {
        let position = match levels.binary_search_by_key(&row.level, |l| l.level) {
            Ok(position) => position,
            Err(position) => {
                levels.insert(
                    position,
                    LevelRow {
                        level: row.level,
                        completed: 0,
                        total: 0,
                    },
                );
                position
            }
        };
        levels[position].total += 1;
        levels[position].completed += usize::from(row.completed);
    }
    levels
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from((done * 100 + total / 2) / total).unwrap_or(100)
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for constructing [`ProgressReport`] instances row by row.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    set_name: Option<String>,
    progress_key: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    exercises: Vec<ExerciseRow>,
}

impl ReportBuilder {
    /// Sets the set name.
    #[must_use]
    pub fn set_name(mut self, name: impl Into<String>) -> Self {
        self.set_name = Some(name.into());
        self
    }

    /// Sets the progress key. Defaults to the key derived from the set name.
    #[must_use]
    pub fn progress_key(mut self, key: impl Into<String>) -> Self {
        self.progress_key = Some(key.into());
        self
    }

    /// Sets the generation time. Defaults to now.
    #[must_use]
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Adds an exercise row.
    #[must_use]
    pub fn exercise(mut self, row: ExerciseRow) -> Self {
        self.exercises.push(row);
        self
    }

    /// Replaces the rows with those of `set`, marking `completed`.
    #[must_use]
    pub fn exercises_from(mut self, set: &CatalogSet, completed: &CompletedSet) -> Self {
        self.exercises = exercise_rows(set, completed);
        self
    }

    /// Builds the report, deriving the summary and level rows.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the set name is missing or a
    /// row number does not match its position.
    pub fn build(self) -> Result<ProgressReport> {
        let set_name = self
            .set_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("set_name is required".to_string()))?;

        if let Some((position, row)) = self
            .exercises
            .iter()
            .enumerate()
            .find(|(position, row)| row.number != position + 1)
        {
            return Err(ReportError::InvalidData(format!(
                "exercise row {} is numbered {}",
                position + 1,
                row.number
            )));
        }

        let progress_key = self
            .progress_key
            .unwrap_or_else(|| kata_engine::default_progress_key(&set_name));

        Ok(ProgressReport {
            summary: ReportSummary::from_rows(&self.exercises),
            levels: level_rows(&self.exercises),
            set_name,
            progress_key,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
            exercises: self.exercises,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use kata_engine::{Exercise, MemoryProgressStore, ProgressSummary};
    use kata_sandbox::SandboxLimits;
    use std::sync::Arc;

    fn sample_set() -> CatalogSet {
        let mut headings = Exercise::new(1, ExerciseKind::Markup);
        headings.title = "Headings".to_string();
        let mut colors = Exercise::new(2, ExerciseKind::Stylesheet);
        colors.title = "Colors".to_string();
        let mut logging = Exercise::new(1, ExerciseKind::Script);
        logging.title = "Console output".to_string();
        CatalogSet::new("HTML Basics", vec![headings, colors, logging])
    }

    #[test]
    fn test_from_set_counts() {
        let set = sample_set();
        let report = ProgressReport::from_set(&set, &CompletedSet::from([0, 2]));

        assert_eq!(report.set_name, "HTML Basics");
        assert_eq!(report.progress_key, "html-basics-progress");
        assert_eq!(
            report.summary,
            ReportSummary {
                completed: 2,
                total: 3,
                percent: 67,
            }
        );
        assert_eq!(
            report.levels,
            vec![
                LevelRow {
                    level: 1,
                    completed: 2,
                    total: 2,
                },
                LevelRow {
                    level: 2,
                    completed: 0,
                    total: 1,
                },
            ]
        );
        assert_eq!(report.exercises[1].label, "Exercise 2");
        assert_eq!(report.exercises[1].number, 2);
        assert!(!report.exercises[1].completed);
        assert!(!report.is_complete());
        assert_eq!(report.remaining().count(), 1);
    }

    #[test]
    fn test_summary_agrees_with_session_progress() {
        let set = sample_set();
        let completed = CompletedSet::from([1, 7]);
        let report = ProgressReport::from_set(&set, &completed);
        let summary = ProgressSummary::compute(&set, &completed);

        assert_eq!(report.summary.completed, summary.completed);
        assert_eq!(report.summary.total, summary.total);
        assert_eq!(report.summary.percent, summary.percent);
        assert_eq!(report.levels.len(), summary.by_level.len());
    }

    #[test]
    fn test_from_session() {
        let store = Arc::new(MemoryProgressStore::new());
        kata_engine::save_completed(
            store.as_ref(),
            "html-basics-progress",
            &CompletedSet::from([0, 1, 2]),
        );
        let session = Session::new(sample_set(), store, SandboxLimits::default()).unwrap();

        let report = ProgressReport::from_session(&session);
        assert!(report.is_complete());
        assert_eq!(report.summary.percent, 100);
    }

    #[test]
    fn test_empty_set_is_not_complete() {
        let empty = CatalogSet::new("Empty", vec![]);
        let report = ProgressReport::from_set(&empty, &CompletedSet::new());
        assert_eq!(report.summary.percent, 0);
        assert!(report.levels.is_empty());
        assert!(!report.is_complete());
    }

    #[test]
    fn test_builder() {
        let report = ProgressReport::builder()
            .set_name("CSS Layout")
            .exercises_from(&sample_set(), &CompletedSet::from([0]))
            .build()
            .unwrap();

        assert_eq!(report.progress_key, "css-layout-progress");
        assert_eq!(report.summary.completed, 1);
        assert_eq!(report.exercises.len(), 3);
    }

    #[test]
    fn test_builder_requires_set_name() {
        let err = ProgressReport::builder().build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(_)));

        let err = ProgressReport::builder().set_name("  ").build().unwrap_err();
        assert!(err.to_string().contains("set_name"));
    }

    #[test]
    fn test_builder_rejects_misnumbered_rows() {
        let err = ProgressReport::builder()
            .set_name("Basics")
            .exercise(ExerciseRow {
                number: 2,
                label: "Exercise 2".to_string(),
                level: 1,
                kind: ExerciseKind::Markup,
                title: String::new(),
                completed: false,
            })
            .build()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid report data: exercise row 1 is numbered 2"
        );
    }

    #[test]
    fn test_json_field_names() {
        let report = ProgressReport::from_set(&sample_set(), &CompletedSet::new());
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["setName"], "HTML Basics");
        assert_eq!(value["progressKey"], "html-basics-progress");
        assert_eq!(value["exercises"][2]["kind"], "script");
        assert!(value["generatedAt"].is_string());
    }
}
