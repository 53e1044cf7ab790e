//! The per-set session state machine.
//!
//! A session is either listing the set's exercises (optionally filtered by
//! level) or showing one exercise in detail. Only the detail view has an
//! editor; leaving it discards the editor state. Completion is the one
//! thing that outlives the view: a passing submission records the
//! exercise's index in the progress store.
//!
//! Transitions that do not apply in the current state are no-ops and
//! report `false` or `None`.

use std::sync::Arc;

use kata_sandbox::{Preview, PreviewRequest, Sandbox, SandboxLimits};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::{CatalogSet, Exercise, LevelFilter};
use crate::error::Result;
use crate::progress::{clear_completed, load_completed, save_completed, CompletedSet, ProgressStore};
use crate::verify::{verify_with_limits, Outcome};

// ============================================================================
// State types
// ============================================================================

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum View {
    /// The exercise list.
    #[default]
    Listing,
    /// One exercise, by index.
    Detail {
        /// Index of the exercise within its set.
        index: usize,
    },
}

/// Transient state of the active exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Editor {
    /// Current source text.
    pub source: String,
    /// Preview of `source`.
    pub preview: Preview,
    /// Result of the last submission.
    pub feedback: Option<Outcome>,
    /// Whether the hint is shown.
    pub hint_visible: bool,
    /// Whether the reference answer is shown.
    pub answer_visible: bool,
}

impl Editor {
    fn new(source: String, preview: Preview) -> Self {
        Self {
            source,
            preview,
            feedback: None,
            hint_visible: false,
            answer_visible: false,
        }
    }
}

/// One row of the exercise list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleExercise {
    /// 1-based position within the filtered list.
    pub position: usize,
    /// Index within the set.
    pub index: usize,
    /// `Exercise N`, where N is the unfiltered 1-based position.
    pub label: String,
    /// Exercise level.
    pub level: u8,
    /// Exercise kind.
    pub kind: kata_sandbox::ExerciseKind,
    /// Exercise title, possibly empty.
    pub title: String,
    /// Whether the exercise has been completed.
    pub completed: bool,
}

/// Completion counts for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    /// The level.
    pub level: u8,
    /// Completed exercises of this level.
    pub completed: usize,
    /// Exercises of this level.
    pub total: usize,
}

/// Completion aggregates for a set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    /// Completed exercises.
    pub completed: usize,
    /// Exercises in the set.
    pub total: usize,
    /// `completed / total` as a rounded percentage; 0 for an empty set.
    pub percent: u8,
    /// Breakdown for each level present in the set, ascending.
    pub by_level: Vec<LevelProgress>,
}

impl ProgressSummary {
    /// Aggregates `completed` over `set`. Indices past the end of the set
    /// are ignored.
    #[must_use]
    pub fn compute(set: &CatalogSet, completed: &CompletedSet) -> Self {
        let mut by_level: Vec<LevelProgress> = Vec::new();
        let mut done = 0;

        for (index, exercise) in set.exercises.iter().enumerate() {
            let is_done = completed.contains(&index);
            done += usize::from(is_done);

            let position = match by_level.binary_search_by_key(&exercise.level, |l| l.level) {
                Ok(position) => position,
                Err(position) => {
                    by_level.insert(
                        position,
                        LevelProgress {
                            level: exercise.level,
                            completed: 0,
                            total: 0,
                        },
                    );
                    position
                }
            };
            by_level[position].total += 1;
            by_level[position].completed += usize::from(is_done);
        }

        Self {
            completed: done,
            total: set.len(),
            percent: percent(done, set.len()),
            by_level,
        }
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from((done * 100 + total / 2) / total).unwrap_or(100)
}

/// The active exercise as shown to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseView {
    /// Index within the set.
    pub index: usize,
    /// `Exercise N`.
    pub label: String,
    /// Exercise level.
    pub level: u8,
    /// Exercise kind.
    pub kind: kata_sandbox::ExerciseKind,
    /// Exercise title, possibly empty.
    pub title: String,
    /// Task description.
    pub instructions: String,
    /// Editor placeholder.
    pub placeholder_text: String,
    /// The hint, once requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint_text: Option<String>,
    /// The reference answer, once revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
    /// Whether the exercise has been completed.
    pub completed: bool,
    /// Whether `next` would move.
    pub has_next: bool,
    /// Whether `prev` would move.
    pub has_prev: bool,
}

/// A serializable view of the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Name of the open set.
    pub set: String,
    /// Current screen.
    pub view: View,
    /// Active level filter.
    pub filter: LevelFilter,
    /// Completion aggregates.
    pub progress: ProgressSummary,
    /// Completed indices.
    pub completed: Vec<usize>,
    /// The active exercise, in the detail view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<ExerciseView>,
    /// The editor, in the detail view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<Editor>,
}

/// Returns the `Exercise N` label for an index.
#[must_use]
pub fn exercise_label(index: usize) -> String {
    format!("Exercise {}", index + 1)
}

// ============================================================================
// Session
// ============================================================================

/// One learner's session over a catalog set.
#[derive(Debug)]
pub struct Session {
    set: CatalogSet,
    store: Arc<dyn ProgressStore>,
    sandbox: Sandbox,
    view: View,
    filter: LevelFilter,
    completed: CompletedSet,
    editor: Option<Editor>,
}

impl Session {
    /// Opens `set`, loading its completed exercises from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if `limits` are invalid.
    pub fn new(set: CatalogSet, store: Arc<dyn ProgressStore>, limits: SandboxLimits) -> Result<Self> {
        Ok(Self::with_sandbox(set, store, Sandbox::new(limits)?))
    }

    /// Opens `set` with a preconfigured sandbox.
    pub fn with_sandbox(set: CatalogSet, store: Arc<dyn ProgressStore>, sandbox: Sandbox) -> Self {
        let completed = load_completed(store.as_ref(), &set.key);
        info!(
            set = %set.name,
            exercises = set.len(),
            completed = completed.len(),
            "Session opened"
        );
        Self {
            set,
            store,
            sandbox,
            view: View::Listing,
            filter: LevelFilter::All,
            completed,
            editor: None,
        }
    }

    /// Returns the open set.
    #[must_use]
    pub const fn set(&self) -> &CatalogSet {
        &self.set
    }

    /// Returns the current view.
    #[must_use]
    pub const fn view(&self) -> View {
        self.view
    }

    /// Returns the active level filter.
    #[must_use]
    pub const fn filter(&self) -> LevelFilter {
        self.filter
    }

    /// Returns the completed indices.
    #[must_use]
    pub const fn completed(&self) -> &CompletedSet {
        &self.completed
    }

    /// Returns the editor of the active exercise.
    #[must_use]
    pub const fn editor(&self) -> Option<&Editor> {
        self.editor.as_ref()
    }

    /// Returns the sandbox previews are rendered in.
    #[must_use]
    pub const fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Returns the index of the active exercise.
    #[must_use]
    pub const fn active_index(&self) -> Option<usize> {
        match self.view {
            View::Listing => None,
            View::Detail { index } => Some(index),
        }
    }

    /// Returns the active exercise.
    #[must_use]
    pub fn active_exercise(&self) -> Option<&Exercise> {
        self.active_index().and_then(|index| self.set.get(index))
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Opens exercise `index` from the listing.
    pub fn select(&mut self, index: usize) -> bool {
        if self.view != View::Listing || index >= self.set.len() {
            return false;
        }
        self.open(index);
        true
    }

    /// Returns to the listing, discarding the editor.
    pub fn back(&mut self) -> bool {
        if self.view == View::Listing {
            return false;
        }
        self.view = View::Listing;
        self.editor = None;
        info!(set = %self.set.name, "Back to listing");
        true
    }

    /// Moves to the following exercise.
    pub fn next(&mut self) -> bool {
        match self.active_index() {
            Some(index) if index + 1 < self.set.len() => {
                self.open(index + 1);
                true
            }
            _ => false,
        }
    }

    /// Moves to the preceding exercise.
    pub fn prev(&mut self) -> bool {
        match self.active_index() {
            Some(index) if index > 0 => {
                self.open(index - 1);
                true
            }
            _ => false,
        }
    }

    /// Changes the level filter. Only applies to the listing.
    pub fn set_filter(&mut self, filter: LevelFilter) -> bool {
        if self.view != View::Listing {
            return false;
        }
        self.filter = filter;
        info!(set = %self.set.name, filter = %filter, "Filter changed");
        true
    }

    /// Clears all completion for the set once `confirm` agrees.
    ///
    /// Only applies to the listing. Returns `true` if progress was reset.
    pub fn reset_progress(&mut self, confirm: impl FnOnce() -> bool) -> bool {
        if self.view != View::Listing || !confirm() {
            return false;
        }
        self.completed.clear();
        clear_completed(self.store.as_ref(), &self.set.key);
        info!(set = %self.set.name, "Progress reset");
        true
    }

    fn open(&mut self, index: usize) {
        let Some(exercise) = self.set.exercises.get(index) else {
            return;
        };
        let source = exercise.starter_source.clone();
        let preview = render(&mut self.sandbox, exercise, &source);
        self.editor = Some(Editor::new(source, preview));
        self.view = View::Detail { index };
        info!(
            set = %self.set.name,
            exercise = index + 1,
            kind = %exercise.kind,
            "Exercise opened"
        );
    }

    // ------------------------------------------------------------------------
    // Editor
    // ------------------------------------------------------------------------

    /// Replaces the source and re-renders the preview.
    pub fn edit(&mut self, source: impl Into<String>) -> Option<&Preview> {
        let index = self.active_index()?;
        let exercise = self.set.exercises.get(index)?;
        let editor = self.editor.as_mut()?;
        editor.source = source.into();
        editor.preview = render(&mut self.sandbox, exercise, &editor.source);
        Some(&editor.preview)
    }

    /// Restores the starter source, hides feedback and the answer, and
    /// re-renders.
    pub fn reset_editor(&mut self) -> bool {
        let Some(exercise) = self.active_index().and_then(|index| self.set.exercises.get(index))
        else {
            return false;
        };
        let Some(editor) = self.editor.as_mut() else {
            return false;
        };
        editor.source.clone_from(&exercise.starter_source);
        editor.feedback = None;
        editor.answer_visible = false;
        editor.preview = render(&mut self.sandbox, exercise, &editor.source);
        debug!(set = %self.set.name, "Editor reset");
        true
    }

    /// Shows or hides the hint. Returns the new visibility.
    pub fn toggle_hint(&mut self) -> Option<bool> {
        let editor = self.editor.as_mut()?;
        editor.hint_visible = !editor.hint_visible;
        Some(editor.hint_visible)
    }

    /// Shows the reference answer. Never marks the exercise completed.
    pub fn reveal(&mut self) -> Option<&str> {
        let exercise = self.active_index().and_then(|index| self.set.exercises.get(index))?;
        let editor = self.editor.as_mut()?;
        editor.answer_visible = true;
        info!(set = %self.set.name, "Answer revealed");
        Some(&exercise.reference_answer)
    }

    /// Verifies the current source. A pass records completion.
    pub fn submit(&mut self) -> Option<Outcome> {
        let index = self.active_index()?;
        let exercise = self.set.exercises.get(index)?;
        let editor = self.editor.as_mut()?;

        let outcome = verify_with_limits(&exercise.rules, &editor.source, self.sandbox.limits());
        if outcome.passed {
            self.completed.insert(index);
            save_completed(self.store.as_ref(), &self.set.key, &self.completed);
        }
        info!(
            set = %self.set.name,
            exercise = index + 1,
            passed = outcome.passed,
            "Submission checked"
        );
        editor.feedback = Some(outcome.clone());
        Some(outcome)
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    /// Returns the exercises that pass the current filter.
    #[must_use]
    pub fn visible_exercises(&self) -> Vec<VisibleExercise> {
        self.set
            .exercises
            .iter()
            .enumerate()
            .filter(|(_, exercise)| self.filter.matches(exercise))
            .enumerate()
            .map(|(position, (index, exercise))| VisibleExercise {
                position: position + 1,
                index,
                label: exercise_label(index),
                level: exercise.level,
                kind: exercise.kind,
                title: exercise.title.clone(),
                completed: self.completed.contains(&index),
            })
            .collect()
    }

    /// Returns completion aggregates.
    #[must_use]
    pub fn progress(&self) -> ProgressSummary {
        ProgressSummary::compute(&self.set, &self.completed)
    }

    /// Returns a serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let exercise = self.active_index().and_then(|index| {
            let exercise = self.set.get(index)?;
            let editor = self.editor.as_ref();
            Some(ExerciseView {
                index,
                label: exercise_label(index),
                level: exercise.level,
                kind: exercise.kind,
                title: exercise.title.clone(),
                instructions: exercise.instructions.clone(),
                placeholder_text: exercise.placeholder_text.clone(),
                hint_text: editor
                    .filter(|editor| editor.hint_visible)
                    .map(|_| exercise.hint_text.clone()),
                reference_answer: editor
                    .filter(|editor| editor.answer_visible)
                    .map(|_| exercise.reference_answer.clone()),
                completed: self.completed.contains(&index),
                has_next: index + 1 < self.set.len(),
                has_prev: index > 0,
            })
        });

        SessionSnapshot {
            set: self.set.name.clone(),
            view: self.view,
            filter: self.filter,
            progress: self.progress(),
            completed: self.completed.iter().copied().collect(),
            exercise,
            editor: self.editor.clone(),
        }
    }
}

fn render(sandbox: &mut Sandbox, exercise: &Exercise, source: &str) -> Preview {
    let request = PreviewRequest::new(exercise.kind, source)
        .with_setup(exercise.setup_source.as_deref())
        .with_fixture(
            exercise.preview_markup.as_deref(),
            exercise.preview_stylesheet.as_deref(),
        );
    sandbox.render(&request)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kata_sandbox::{ExerciseKind, EMPTY_CONSOLE_PLACEHOLDER};

    use super::*;
    use crate::catalog::RuleSet;
    use crate::progress::MemoryProgressStore;

    fn exercise(level: u8, kind: ExerciseKind, starter: &str, required: &[&str]) -> Exercise {
        let mut exercise = Exercise::new(level, kind);
        exercise.starter_source = starter.to_string();
        exercise.hint_text = format!("hint {level}");
        exercise.reference_answer = format!("answer {level}");
        exercise.rules = RuleSet {
            required_substrings: required.iter().map(ToString::to_string).collect(),
            ..RuleSet::default()
        };
        exercise
    }

    fn sample_set() -> CatalogSet {
        CatalogSet::new(
            "Basics",
            vec![
                exercise(1, ExerciseKind::Markup, "<p>start</p>", &["<h1>"]),
                exercise(2, ExerciseKind::Script, "console.log(1 + 1)", &["console.log"]),
                exercise(1, ExerciseKind::Markup, "", &["<ul>"]),
                exercise(3, ExerciseKind::Markup, "", &[]),
            ],
        )
    }

    fn session_with(store: Arc<MemoryProgressStore>) -> Session {
        Session::new(sample_set(), store, SandboxLimits::default()).unwrap()
    }

    fn session() -> (Session, Arc<MemoryProgressStore>) {
        let store = Arc::new(MemoryProgressStore::new());
        (session_with(Arc::clone(&store)), store)
    }

    #[test]
    fn test_initial_state() {
        let (session, _) = session();
        assert_eq!(session.view(), View::Listing);
        assert_eq!(session.filter(), LevelFilter::All);
        assert!(session.editor().is_none());
        assert!(session.completed().is_empty());
    }

    #[test]
    fn test_select_renders_starter_source() {
        let (mut session, _) = session();
        assert!(session.select(1));
        assert_eq!(session.view(), View::Detail { index: 1 });

        let editor = session.editor().unwrap();
        assert_eq!(editor.source, "console.log(1 + 1)");
        assert_eq!(editor.preview.html(), "<pre class=\"kata-console\">2</pre>");
        assert_eq!(editor.feedback, None);
        assert!(!editor.hint_visible);
    }

    #[test]
    fn test_select_is_listing_only_and_bounded() {
        let (mut session, _) = session();
        assert!(!session.select(4));
        assert!(session.select(0));
        assert!(!session.select(1));
        assert_eq!(session.active_index(), Some(0));
    }

    #[test]
    fn test_next_and_prev_are_guarded() {
        let (mut session, _) = session();
        assert!(!session.next());
        assert!(!session.prev());

        session.select(3);
        assert!(!session.next());
        assert!(session.prev());
        assert_eq!(session.active_index(), Some(2));

        session.back();
        session.select(0);
        assert!(!session.prev());
        assert!(session.next());
        assert_eq!(session.active_index(), Some(1));
    }

    #[test]
    fn test_navigation_resets_transient_state() {
        let (mut session, _) = session();
        session.select(0);
        session.toggle_hint();
        session.edit("<h1>x</h1>");
        session.submit();
        assert!(session.next());
        let editor = session.editor().unwrap();
        assert!(!editor.hint_visible);
        assert_eq!(editor.feedback, None);
        assert_eq!(editor.source, "console.log(1 + 1)");
    }

    #[test]
    fn test_back_discards_editor() {
        let (mut session, _) = session();
        assert!(!session.back());
        session.select(0);
        assert!(session.back());
        assert_eq!(session.view(), View::Listing);
        assert!(session.editor().is_none());
    }

    #[test]
    fn test_edit_rerenders_preview() {
        let (mut session, _) = session();
        assert!(session.edit("<p>x</p>").is_none());

        session.select(1);
        let preview = session.edit("let x = 1;").unwrap();
        assert_eq!(
            preview.html(),
            format!("<pre class=\"kata-console\">{EMPTY_CONSOLE_PLACEHOLDER}</pre>")
        );
        let preview = session.edit("null.x").unwrap();
        assert!(preview.is_fault());
        assert!(preview.html().contains("kata-error"));
    }

    #[test]
    fn test_submit_pass_records_completion() {
        let store = Arc::new(MemoryProgressStore::new());
        let mut session = session_with(Arc::clone(&store));
        session.select(0);
        session.edit("<H1>Title</H1>");

        let outcome = session.submit().unwrap();
        assert!(outcome.passed);
        assert!(session.completed().contains(&0));
        assert_eq!(store.read("basics-progress").unwrap().as_deref(), Some("[0]"));
        assert_eq!(session.editor().unwrap().feedback.as_ref(), Some(&outcome));

        // Submitting again keeps a single entry.
        session.submit();
        assert_eq!(session.completed().len(), 1);

        // A new session sees the saved progress.
        let reopened = session_with(store);
        assert!(reopened.completed().contains(&0));
    }

    #[test]
    fn test_submit_fail_does_not_complete() {
        let (mut session, store) = session();
        session.select(0);
        let outcome = session.submit().unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.message, "contains-missing: <h1>");
        assert!(session.completed().is_empty());
        assert_eq!(store.read("basics-progress").unwrap(), None);
    }

    #[test]
    fn test_submit_requires_detail() {
        let (mut session, _) = session();
        assert!(session.submit().is_none());
    }

    #[test]
    fn test_reveal_never_completes() {
        let (mut session, _) = session();
        assert!(session.reveal().is_none());

        session.select(0);
        assert_eq!(session.reveal(), Some("answer 1"));
        assert!(session.editor().unwrap().answer_visible);
        assert_eq!(session.editor().unwrap().source, "<p>start</p>");
        assert!(session.completed().is_empty());
        assert_eq!(
            session.snapshot().exercise.unwrap().reference_answer.as_deref(),
            Some("answer 1")
        );
    }

    #[test]
    fn test_toggle_hint() {
        let (mut session, _) = session();
        assert_eq!(session.toggle_hint(), None);
        session.select(2);
        assert_eq!(session.toggle_hint(), Some(true));
        assert_eq!(
            session.snapshot().exercise.unwrap().hint_text.as_deref(),
            Some("hint 1")
        );
        assert_eq!(session.toggle_hint(), Some(false));
        assert!(session.snapshot().exercise.unwrap().hint_text.is_none());
    }

    #[test]
    fn test_reset_editor() {
        let (mut session, _) = session();
        assert!(!session.reset_editor());

        session.select(0);
        session.toggle_hint();
        session.edit("<h1>done</h1>");
        session.submit();
        session.reveal();
        assert!(session.reset_editor());

        let editor = session.editor().unwrap();
        assert_eq!(editor.source, "<p>start</p>");
        assert_eq!(editor.preview.html(), "<p>start</p>");
        assert_eq!(editor.feedback, None);
        assert!(!editor.answer_visible);
        assert!(editor.hint_visible);
        assert!(session.completed().contains(&0));
    }

    #[test]
    fn test_filter_changes_visible_subset_only() {
        let (mut session, _) = session();
        session.select(2);
        session.edit("<ul></ul>");
        session.submit();
        assert!(!session.set_filter(LevelFilter::Level(1)));
        session.back();

        assert!(session.set_filter(LevelFilter::Level(1)));
        let visible = session.visible_exercises();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].position, 2);
        assert_eq!(visible[1].index, 2);
        assert_eq!(visible[1].label, "Exercise 3");
        assert!(visible[1].completed);
        assert!(!visible[0].completed);
        assert_eq!(session.completed(), &CompletedSet::from([2]));

        session.set_filter(LevelFilter::All);
        let visible = session.visible_exercises();
        assert_eq!(visible.len(), 4);
        assert!(visible[2].completed);
    }

    #[test]
    fn test_reset_progress_requires_confirmation() {
        let (mut session, store) = session();
        session.select(3);
        session.submit();
        assert!(!session.reset_progress(|| true));
        session.back();

        assert!(!session.reset_progress(|| false));
        assert_eq!(session.completed().len(), 1);

        assert!(session.reset_progress(|| true));
        assert!(session.completed().is_empty());
        assert_eq!(store.read("basics-progress").unwrap(), None);
    }

    #[test]
    fn test_progress_counts_only_in_range_indices() {
        let store = Arc::new(MemoryProgressStore::new());
        store.write("basics-progress", "[0, 3, 17]").unwrap();
        let session = session_with(store);

        let progress = session.progress();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.total, 4);
        assert_eq!(progress.percent, 50);
        assert_eq!(
            progress.by_level,
            vec![
                LevelProgress { level: 1, completed: 1, total: 2 },
                LevelProgress { level: 2, completed: 0, total: 1 },
                LevelProgress { level: 3, completed: 1, total: 1 },
            ]
        );
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(3, 3), 100);
    }

    #[test]
    fn test_snapshot_serialization() {
        let (mut session, _) = session();
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["view"], serde_json::json!({"state": "listing"}));
        assert_eq!(json["filter"], "all");
        assert!(json.get("editor").is_none());

        session.select(1);
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["view"], serde_json::json!({"state": "detail", "index": 1}));
        assert_eq!(json["exercise"]["label"], "Exercise 2");
        assert_eq!(json["exercise"]["hasNext"], true);
        assert_eq!(json["editor"]["source"], "console.log(1 + 1)");
        assert!(json["exercise"].get("referenceAnswer").is_none());
    }
}
