//! Markdown report generation.
//!
//! [`MarkdownGenerator`] turns a [`ProgressReport`] into a document with:
//!
//! - A summary table
//! - A per-level table
//! - A checklist of exercises
//!
//! # Example
//!
//! ```rust
//! use kata_engine::{CatalogSet, CompletedSet, Exercise};
//! use kata_report::{MarkdownGenerator, ProgressReport};
//! use kata_sandbox::ExerciseKind;
//!
//! let set = CatalogSet::new("Basics", vec![Exercise::new(1, ExerciseKind::Markup)]);
//! let report = ProgressReport::from_set(&set, &CompletedSet::new());
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.starts_with("# Kata Progress Report: Basics"));
//! assert!(markdown.contains("- [ ] **Exercise 1**"));
//! ```

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{ExerciseRow, LevelRow, ProgressReport};

/// Generates Markdown progress reports.
pub struct MarkdownGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report, ending with a footer that
    /// carries the report's generation time.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_levels(&mut output);
        self.write_exercises(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Kata Progress Report: {}\n",
            escape_markdown(&self.report.set_name)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Status | {} |", self.status());
        let _ = writeln!(
            output,
            "| Completed | {} of {} |",
            summary.completed, summary.total
        );
        let _ = writeln!(output, "| Progress | {}% |", summary.percent);
        let _ = writeln!(
            output,
            "| Progress Key | `{}` |",
            self.report.progress_key.replace('`', "'")
        );
        let _ = writeln!(output);
    }

    fn write_levels(&self, output: &mut String) {
        let _ = writeln!(output, "## Levels\n");

        if self.report.levels.is_empty() {
            let _ = writeln!(output, "No exercises in this set.\n");
            return;
        }

        let _ = writeln!(output, "| Level | Completed | Total | Progress |");
        let _ = writeln!(output, "|-------|-----------|-------|----------|");
        for level in &self.report.levels {
            Self::write_level_row(output, level);
        }
        let _ = writeln!(output);
    }

    fn write_level_row(output: &mut String, level: &LevelRow) {
        let percent = if level.total == 0 {
            0
        } else {
            (level.completed * 100 + level.total / 2) / level.total
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {percent}% |",
            level.level, level.completed, level.total
        );
    }

    fn write_exercises(&self, output: &mut String) {
        let _ = writeln!(output, "## Exercises\n");

        if self.report.exercises.is_empty() {
            let _ = writeln!(output, "No exercises in this set.\n");
            return;
        }

        for row in &self.report.exercises {
            Self::write_exercise_row(output, row);
        }
        let _ = writeln!(output);
    }

    fn write_exercise_row(output: &mut String, row: &ExerciseRow) {
        let mark = if row.completed { 'x' } else { ' ' };
        let _ = write!(
            output,
            "- [{mark}] **{}** (level {}, {})",
            row.label, row.level, row.kind
        );
        if row.title.trim().is_empty() {
            let _ = writeln!(output);
        } else {
            let _ = writeln!(output, ": {}", escape_markdown(row.title.trim()));
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let _ = writeln!(
            output,
            "*Generated by Kata at {}*",
            format_timestamp(&self.report.generated_at)
        );
    }

    fn status(&self) -> &'static str {
        let summary = &self.report.summary;
        if self.report.is_complete() {
            "Complete"
        } else if summary.completed == 0 {
            "Not started"
        } else {
            "In progress"
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters with Markdown meaning in free text.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push(' '),
            _ => result.push(ch),
        }
    }

    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kata_engine::{CatalogSet, CompletedSet, Exercise};
    use kata_sandbox::ExerciseKind;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 30, 0).unwrap()
    }

    fn sample_report(completed: &[usize]) -> ProgressReport {
        let mut headings = Exercise::new(1, ExerciseKind::Markup);
        headings.title = "Headings".to_string();
        let mut colors = Exercise::new(2, ExerciseKind::Stylesheet);
        colors.title = "Colors".to_string();
        let mut logging = Exercise::new(1, ExerciseKind::Script);
        logging.title = "Console output".to_string();
        let set = CatalogSet::new("HTML Basics", vec![headings, colors, logging]);

        ProgressReport::builder()
            .set_name(&set.name)
            .progress_key(&set.key)
            .generated_at(fixed_time())
            .exercises_from(&set, &completed.iter().copied().collect::<CompletedSet>())
            .build()
            .unwrap()
    }

    #[test]
    fn test_full_report() {
        let markdown = MarkdownGenerator::new(&sample_report(&[0, 2])).generate();

        insta::assert_snapshot!(markdown, @r###"
        # Kata Progress Report: HTML Basics

        ## Summary

        | Metric | Value |
        |--------|-------|
        | Status | In progress |
        | Completed | 2 of 3 |
        | Progress | 67% |
        | Progress Key | `html-basics-progress` |

        ## Levels

        | Level | Completed | Total | Progress |
        |-------|-----------|-------|----------|
        | 1 | 2 | 2 | 100% |
        | 2 | 0 | 1 | 0% |

        ## Exercises

        - [x] **Exercise 1** (level 1, markup): Headings
        - [ ] **Exercise 2** (level 2, stylesheet): Colors
        - [x] **Exercise 3** (level 1, script): Console output

        ---
        *Generated by Kata at 2026-01-15 10:30:00 UTC*
        "###);
    }

    #[test]
    fn test_status() {
        let not_started = MarkdownGenerator::new(&sample_report(&[])).generate();
        assert!(not_started.contains("| Status | Not started |"));
        assert!(not_started.contains("| Progress | 0% |"));

        let complete = MarkdownGenerator::new(&sample_report(&[0, 1, 2])).generate();
        assert!(complete.contains("| Status | Complete |"));
        assert!(complete.contains("| Progress | 100% |"));
    }

    #[test]
    fn test_empty_set() {
        let report = ProgressReport::builder()
            .set_name("Empty")
            .generated_at(fixed_time())
            .build()
            .unwrap();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("## Levels\n\nNo exercises in this set.\n"));
        assert!(markdown.contains("## Exercises\n\nNo exercises in this set.\n"));
        assert!(markdown.contains("| Status | Not started |"));
    }

    #[test]
    fn test_untitled_exercise_has_no_trailing_colon() {
        let set = CatalogSet::new("Basics", vec![Exercise::new(4, ExerciseKind::DomScript)]);
        let report = ProgressReport::from_set(&set, &CompletedSet::new());
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("- [ ] **Exercise 1** (level 4, domScript)\n"));
    }

    #[test]
    fn test_escapes_titles() {
        let mut exercise = Exercise::new(1, ExerciseKind::Markup);
        exercise.title = "The <p> tag | *bold*".to_string();
        let set = CatalogSet::new("Tags_101", vec![exercise]);
        let report = ProgressReport::from_set(&set, &CompletedSet::new());
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.starts_with("# Kata Progress Report: Tags\\_101\n"));
        assert!(markdown.contains(": The \\<p\\> tag \\| \\*bold\\*\n"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("plain text"), "plain text");
        assert_eq!(escape_markdown("a_b"), "a\\_b");
        assert_eq!(escape_markdown("line\nbreak"), "line break");
    }
}
