//! JSON report generation.
//!
//! [`JsonGenerator`] serializes a [`ProgressReport`] as compact single-line
//! JSON or pretty-printed for people.
//!
//! # Example
//!
//! ```rust
//! use kata_engine::{CatalogSet, CompletedSet};
//! use kata_report::{json::JsonGenerator, ProgressReport};
//!
//! let report = ProgressReport::from_set(&CatalogSet::new("Basics", vec![]), &CompletedSet::new());
//! let generator = JsonGenerator::new(&report);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! // generator.write_to_file(std::path::Path::new("kata-report.json"), true).unwrap();
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{ProgressReport, ReportError, Result};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a ProgressReport,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a ProgressReport) -> Self {
        Self { report }
    }

    /// Generates compact JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates JSON with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the report to `path`, creating or overwriting the file.
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if the file cannot be written.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use kata_engine::{CatalogSet, CompletedSet, Exercise};
    use kata_sandbox::ExerciseKind;

    fn sample_report() -> ProgressReport {
        let mut first = Exercise::new(1, ExerciseKind::Markup);
        first.title = "Paragraphs".to_string();
        let second = Exercise::new(3, ExerciseKind::DomScript);
        let set = CatalogSet::new("JS & DOM", vec![first, second]);
        ProgressReport::from_set(&set, &CompletedSet::from([1]))
    }

    #[test]
    fn test_generate_compact() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains("\"setName\":\"JS & DOM\""));
        assert!(json.contains("\"kind\":\"domScript\""));
    }

    #[test]
    fn test_generate_pretty_round_trips() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();

        assert!(json.contains('\n'));
        assert!(json.contains("  \"summary\": {"));
        let parsed: ProgressReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kata-report.json");
        let report = sample_report();

        JsonGenerator::new(&report).write_to_file(&path, true).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.ends_with("}\n"));
        let parsed: ProgressReport = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.summary.completed, 1);
        assert_eq!(parsed.exercises[0].title, "Paragraphs");
    }

    #[test]
    fn test_write_to_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("kata-report.json");
        let report = sample_report();

        let err = JsonGenerator::new(&report)
            .write_to_file(&path, false)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
