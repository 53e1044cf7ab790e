//! Exercise catalog loading and lookup.
//!
//! A catalog is a JSON document holding named sets of exercises:
//!
//! ```json
//! {
//!   "sets": [
//!     {
//!       "name": "HTML Basics",
//!       "exercises": [
//!         {
//!           "level": 1,
//!           "kind": "markup",
//!           "instructions": "Create a level one heading.",
//!           "starterSource": "",
//!           "referenceAnswer": "<h1>Hello</h1>",
//!           "requiredSubstrings": ["<h1>", "</h1>"]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! An exercise is identified by its position in its set. Reordering a set
//! therefore invalidates saved progress for it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use kata_sandbox::{ExerciseKind, ValidatorReport};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{KataError, Result};
use crate::progress::record_file_stem;

/// Lowest exercise level.
pub const MIN_LEVEL: u8 = 1;
/// Highest exercise level.
pub const MAX_LEVEL: u8 = 6;
/// Largest catalog file accepted, in bytes.
pub const MAX_CATALOG_SIZE: u64 = 2 * 1024 * 1024;

// ============================================================================
// Rules
// ============================================================================

/// Signature of a validator supplied from Rust code.
pub type NativeValidatorFn = dyn Fn(&str) -> ValidatorReport + Send + Sync;

/// A custom check run after the substring rules.
#[derive(Clone)]
pub enum CustomValidator {
    /// A script that evaluates to `(code) => ({ valid, message })`.
    Script {
        /// Validator source.
        script: String,
    },
    /// Passes when the regular expression matches the submission.
    Pattern {
        /// Regular expression.
        pattern: String,
        /// Message shown when the pattern does not match.
        message: String,
    },
    /// A Rust closure. Only available to catalogs built in code.
    Native(Arc<NativeValidatorFn>),
}

impl CustomValidator {
    /// Wraps a Rust closure as a validator.
    pub fn native(check: impl Fn(&str) -> ValidatorReport + Send + Sync + 'static) -> Self {
        Self::Native(Arc::new(check))
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script { script } => f.debug_struct("Script").field("script", script).finish(),
            Self::Pattern { pattern, message } => f
                .debug_struct("Pattern")
                .field("pattern", pattern)
                .field("message", message)
                .finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// Serialized forms of [`CustomValidator`].
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ValidatorSpec {
    Script {
        script: String,
    },
    Pattern {
        pattern: String,
        #[serde(default)]
        message: String,
    },
}

impl<'de> Deserialize<'de> for CustomValidator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match ValidatorSpec::deserialize(deserializer) {
            Ok(ValidatorSpec::Script { script }) => Ok(Self::Script { script }),
            Ok(ValidatorSpec::Pattern { pattern, message }) => Ok(Self::Pattern { pattern, message }),
            Err(_) => Err(serde::de::Error::custom(
                "invalid customValidator: expected {\"script\": ...} or {\"pattern\": ..., \"message\": ...}",
            )),
        }
    }
}

impl Serialize for CustomValidator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let spec = match self {
            Self::Script { script } => ValidatorSpec::Script {
                script: script.clone(),
            },
            Self::Pattern { pattern, message } => ValidatorSpec::Pattern {
                pattern: pattern.clone(),
                message: message.clone(),
            },
            Self::Native(_) => {
                return Err(serde::ser::Error::custom(
                    "native validators cannot be serialized",
                ))
            }
        };
        spec.serialize(serializer)
    }
}

/// The checks a submission must pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Entries that must all appear in the normalized submission.
    #[serde(default, alias = "requiredElements", skip_serializing_if = "Vec::is_empty")]
    pub required_substrings: Vec<String>,

    /// Entries that must not appear in the normalized submission.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden_substrings: Vec<String>,

    /// Check applied to the unnormalized submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_validator: Option<CustomValidator>,
}

impl RuleSet {
    /// Returns `true` if the rule set checks nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required_substrings.is_empty()
            && self.forbidden_substrings.is_empty()
            && self.custom_validator.is_none()
    }
}

// ============================================================================
// Exercise
// ============================================================================

/// One exercise. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Difficulty level, 1 to 6.
    pub level: u8,

    /// How the source is previewed.
    pub kind: ExerciseKind,

    /// Short label for listings.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,

    /// Task description shown to the learner.
    #[serde(default)]
    pub instructions: String,

    /// Hint revealed on request.
    #[serde(default)]
    pub hint_text: String,

    /// Initial editor contents.
    #[serde(default)]
    pub starter_source: String,

    /// Editor placeholder shown while the source is empty.
    #[serde(default)]
    pub placeholder_text: String,

    /// A correct solution.
    #[serde(default)]
    pub reference_answer: String,

    /// Fixture markup for `stylesheet` and `domScript` exercises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_markup: Option<String>,

    /// Fixture stylesheet for `stylesheet` and `domScript` exercises.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_stylesheet: Option<String>,

    /// Script run before the learner's (`script` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_source: Option<String>,

    /// Verification rules.
    #[serde(flatten)]
    pub rules: RuleSet,
}

impl Exercise {
    /// Creates an exercise with empty text fields and no rules.
    #[must_use]
    pub fn new(level: u8, kind: ExerciseKind) -> Self {
        Self {
            level,
            kind,
            title: String::new(),
            instructions: String::new(),
            hint_text: String::new(),
            starter_source: String::new(),
            placeholder_text: String::new(),
            reference_answer: String::new(),
            preview_markup: None,
            preview_stylesheet: None,
            setup_source: None,
            rules: RuleSet::default(),
        }
    }
}

// ============================================================================
// Level filter
// ============================================================================

/// Which levels a listing shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LevelFilter {
    /// Every exercise.
    #[default]
    All,
    /// Only exercises of one level.
    Level(u8),
}

impl LevelFilter {
    /// Creates a level filter, rejecting levels outside 1-6.
    #[must_use]
    pub fn level(level: u8) -> Option<Self> {
        (MIN_LEVEL..=MAX_LEVEL)
            .contains(&level)
            .then_some(Self::Level(level))
    }

    /// Returns `true` if `exercise` is visible under this filter.
    #[must_use]
    pub const fn matches(self, exercise: &Exercise) -> bool {
        match self {
            Self::All => true,
            Self::Level(level) => exercise.level == level,
        }
    }

    /// Parses `all` (any case) or a level number.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        s.parse::<u8>().ok().and_then(Self::level)
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Level(level) => write!(f, "{level}"),
        }
    }
}

impl std::str::FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s)
            .ok_or_else(|| format!("invalid level filter '{s}': expected 'all' or a level from 1 to 6"))
    }
}

impl<'de> Deserialize<'de> for LevelFilter {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FilterVisitor;

        impl serde::de::Visitor<'_> for FilterVisitor {
            type Value = LevelFilter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"all\" or a level from 1 to 6")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<LevelFilter, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<LevelFilter, E> {
                u8::try_from(v)
                    .ok()
                    .and_then(LevelFilter::level)
                    .ok_or_else(|| {
                        E::custom(format!(
                            "invalid level filter '{v}': expected 'all' or a level from 1 to 6"
                        ))
                    })
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<LevelFilter, E> {
                u64::try_from(v).map_or_else(
                    |_| {
                        Err(E::custom(format!(
                            "invalid level filter '{v}': expected 'all' or a level from 1 to 6"
                        )))
                    },
                    |v| self.visit_u64(v),
                )
            }
        }

        deserializer.deserialize_any(FilterVisitor)
    }
}

impl Serialize for LevelFilter {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Level(level) => serializer.serialize_u8(*level),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Returns the default progress key for a set name, e.g.
/// `"HTML Basics"` becomes `"html-basics-progress"`.
#[must_use]
pub fn default_progress_key(name: &str) -> String {
    let mut slug = String::new();
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "set-progress".to_string()
    } else {
        format!("{slug}-progress")
    }
}

/// A named, ordered sequence of exercises sharing one progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSet {
    /// Display name.
    pub name: String,

    /// Progress store key. Derived from the name when omitted.
    #[serde(default)]
    pub key: String,

    /// Exercises in catalog order.
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

impl CatalogSet {
    /// Creates a set with the default progress key.
    #[must_use]
    pub fn new(name: impl Into<String>, exercises: Vec<Exercise>) -> Self {
        let name = name.into();
        Self {
            key: default_progress_key(&name),
            name,
            exercises,
        }
    }

    /// Overrides the progress key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Returns the number of exercises.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    /// Returns `true` if the set has no exercises.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    /// Returns the exercise at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Exercise> {
        self.exercises.get(index)
    }

    /// Looks up an exercise by its 1-based "Exercise N" label.
    ///
    /// # Errors
    ///
    /// Returns `KataError::ExerciseNotFound` if `number` is out of range.
    pub fn by_number(&self, number: usize) -> Result<(usize, &Exercise)> {
        number
            .checked_sub(1)
            .and_then(|index| self.get(index).map(|exercise| (index, exercise)))
            .ok_or_else(|| KataError::exercise_not_found(&self.name, number, self.len()))
    }
}

/// Every exercise set available to the learner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Sets in display order.
    pub sets: Vec<CatalogSet>,
}

impl Catalog {
    /// Builds a catalog from sets, filling in missing keys and validating.
    ///
    /// # Errors
    ///
    /// Returns `KataError::CatalogValidationError` if the sets are
    /// inconsistent.
    pub fn new(sets: Vec<CatalogSet>) -> Result<Self> {
        let mut catalog = Self { sets };
        catalog.fill_default_keys();
        catalog.validate()?;
        Ok(catalog)
    }

    /// Loads and validates a catalog file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogNotFound`, `CatalogTooLarge` (over 2 MiB),
    /// `CatalogEncodingError` (not UTF-8), `CatalogParseError` or
    /// `CatalogValidationError`.
    pub fn load(path: &Path) -> Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KataError::catalog_not_found(path));
            }
            Err(e) => return Err(KataError::Io(e)),
        };
        if metadata.len() > MAX_CATALOG_SIZE {
            return Err(KataError::catalog_too_large(path, metadata.len() / 1024));
        }

        let bytes = std::fs::read(path)?;
        let contents = String::from_utf8(bytes).map_err(|_| KataError::catalog_encoding(path))?;
        let mut catalog: Self = serde_json::from_str(&contents)
            .map_err(|e| KataError::catalog_parse(path, e.to_string()))?;
        catalog.fill_default_keys();
        catalog.validate()?;

        tracing::info!(
            path = %path.display(),
            sets = catalog.sets.len(),
            exercises = catalog.sets.iter().map(CatalogSet::len).sum::<usize>(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    fn fill_default_keys(&mut self) {
        for set in &mut self.sets {
            if set.key.trim().is_empty() {
                set.key = default_progress_key(&set.name);
            }
        }
    }

    /// Checks structural consistency.
    ///
    /// Authoring mistakes such as a reference answer that fails its own
    /// rules are not detected.
    ///
    /// # Errors
    ///
    /// Returns `KataError::CatalogValidationError` describing the first
    /// problem found.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        let mut keys = HashSet::new();
        // Record file stems, lowercased for case-insensitive file systems.
        let mut stems: HashMap<String, &str> = HashMap::new();

        for set in &self.sets {
            if set.name.trim().is_empty() {
                return Err(KataError::catalog_validation(
                    "set name must not be empty",
                    "Give every set a \"name\"",
                ));
            }
            if !names.insert(set.name.as_str()) {
                return Err(KataError::catalog_validation(
                    format!("duplicate set name '{}'", set.name),
                    "Set names must be unique",
                ));
            }
            if !keys.insert(set.key.as_str()) {
                return Err(KataError::catalog_validation(
                    format!("duplicate progress key '{}' (set '{}')", set.key, set.name),
                    "Give one of the sets an explicit, unique \"key\"",
                ));
            }
            let stem = record_file_stem(&set.key).to_ascii_lowercase();
            if let Some(other) = stems.insert(stem, set.key.as_str()) {
                return Err(KataError::catalog_validation(
                    format!(
                        "progress keys '{other}' and '{}' share a record file",
                        set.key
                    ),
                    "Build keys from letters, digits, '-' and '_' and keep them distinct ignoring case",
                ));
            }

            for (index, exercise) in set.exercises.iter().enumerate() {
                let number = index + 1;
                if !(MIN_LEVEL..=MAX_LEVEL).contains(&exercise.level) {
                    return Err(KataError::catalog_validation(
                        format!(
                            "exercise {number} in '{}' has level {}",
                            set.name, exercise.level
                        ),
                        "Levels range from 1 to 6",
                    ));
                }
                if let Some(CustomValidator::Pattern { pattern, .. }) =
                    &exercise.rules.custom_validator
                {
                    if let Err(e) = Regex::new(pattern) {
                        return Err(KataError::catalog_validation(
                            format!(
                                "exercise {number} in '{}' has an invalid validator pattern: {e}",
                                set.name
                            ),
                            "Fix the regular expression in customValidator.pattern",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the set with the given name.
    ///
    /// Exact matches win; otherwise names are compared ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns `KataError::SetNotFound` if no set matches.
    pub fn set(&self, name: &str) -> Result<&CatalogSet> {
        self.sets
            .iter()
            .find(|set| set.name == name)
            .or_else(|| self.sets.iter().find(|set| set.name.eq_ignore_ascii_case(name)))
            .ok_or_else(|| KataError::set_not_found(name))
    }

    /// Returns the first set, if any.
    #[must_use]
    pub fn first(&self) -> Option<&CatalogSet> {
        self.sets.first()
    }

    /// Returns the set names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.iter().map(|set| set.name.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"{
        "sets": [
            {
                "name": "HTML Basics",
                "exercises": [
                    {
                        "level": 1,
                        "kind": "markup",
                        "instructions": "Add a heading",
                        "referenceAnswer": "<h1>Hi</h1>",
                        "requiredElements": ["<h1>"]
                    },
                    {
                        "level": 2,
                        "kind": "domScript",
                        "previewMarkup": "<p id=\"msg\"></p>",
                        "customValidator": { "script": "(code) => code.length > 0" }
                    }
                ]
            },
            {
                "name": "JS",
                "key": "js-progress-v2",
                "exercises": [
                    {
                        "level": 3,
                        "kind": "script",
                        "setupSource": "const xs = [1, 2];",
                        "forbiddenSubstrings": ["for ("],
                        "customValidator": { "pattern": "map\\(", "message": "Use map" }
                    }
                ]
            }
        ]
    }"#;

    fn write_catalog(contents: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_sample_catalog() {
        let (_dir, path) = write_catalog(SAMPLE.as_bytes());
        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["HTML Basics", "JS"]);

        let html = catalog.set("HTML Basics").unwrap();
        assert_eq!(html.key, "html-basics-progress");
        assert_eq!(html.len(), 2);
        assert_eq!(html.exercises[0].rules.required_substrings, ["<h1>"]);
        assert_eq!(html.exercises[1].kind, ExerciseKind::DomScript);
        assert!(matches!(
            html.exercises[1].rules.custom_validator,
            Some(CustomValidator::Script { .. })
        ));

        let js = catalog.set("js").unwrap();
        assert_eq!(js.key, "js-progress-v2");
        assert_eq!(js.exercises[0].setup_source.as_deref(), Some("const xs = [1, 2];"));
        assert!(matches!(
            &js.exercises[0].rules.custom_validator,
            Some(CustomValidator::Pattern { message, .. }) if message == "Use map"
        ));
    }

    #[test]
    fn test_default_progress_key() {
        assert_eq!(default_progress_key("HTML Basics"), "html-basics-progress");
        assert_eq!(default_progress_key("  CSS: Layout!  "), "css-layout-progress");
        assert_eq!(default_progress_key("***"), "set-progress");
    }

    #[test]
    fn test_missing_catalog() {
        let err = Catalog::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(matches!(err, KataError::CatalogNotFound { .. }));
    }

    #[test]
    fn test_catalog_too_large() {
        let padding = vec![b' '; usize::try_from(MAX_CATALOG_SIZE).unwrap() + 1];
        let (_dir, path) = write_catalog(&padding);
        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, KataError::CatalogTooLarge { size_kb: 2048, .. }));
    }

    #[test]
    fn test_catalog_invalid_encoding() {
        let (_dir, path) = write_catalog(&[b'{', 0xff, 0xfe, b'}']);
        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, KataError::CatalogEncodingError { .. }));
    }

    #[test]
    fn test_catalog_parse_error() {
        let (_dir, path) = write_catalog(br#"{"sets": [{"name": "A", "exercises": [{"level": 1}]}]}"#);
        let err = Catalog::load(&path).unwrap_err();
        assert!(matches!(err, KataError::CatalogParseError { .. }));
        assert!(err.to_string().contains("kind"));
    }

    #[test]
    fn test_unknown_validator_shape_is_rejected() {
        let json = r#"{"level": 1, "kind": "markup", "customValidator": {"fn": "x"}}"#;
        let err = serde_json::from_str::<Exercise>(json).unwrap_err().to_string();
        assert!(err.contains("invalid customValidator"), "{err}");
    }

    #[test]
    fn test_validation_rejects_bad_levels() {
        let err = Catalog::new(vec![CatalogSet::new(
            "A",
            vec![Exercise::new(7, ExerciseKind::Markup)],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("exercise 1 in 'A' has level 7"));
    }

    #[test]
    fn test_validation_rejects_duplicates() {
        let err = Catalog::new(vec![CatalogSet::new("A", vec![]), CatalogSet::new("A", vec![])])
            .unwrap_err();
        assert!(err.to_string().contains("duplicate set name 'A'"));

        let err = Catalog::new(vec![
            CatalogSet::new("A", vec![]),
            CatalogSet::new("B", vec![]).with_key("a-progress"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate progress key 'a-progress'"));

        let err = Catalog::new(vec![
            CatalogSet::new("CSS", vec![]).with_key("css.progress"),
            CatalogSet::new("More CSS", vec![]).with_key("css_progress"),
        ])
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("progress keys 'css.progress' and 'css_progress' share a record file"));

        let err = Catalog::new(vec![
            CatalogSet::new("Upper", vec![]).with_key("Layout"),
            CatalogSet::new("Lower", vec![]).with_key("layout"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("share a record file"));
    }

    #[test]
    fn test_validation_rejects_empty_name_and_bad_pattern() {
        assert!(Catalog::new(vec![CatalogSet::new(" ", vec![])]).is_err());

        let mut exercise = Exercise::new(1, ExerciseKind::Markup);
        exercise.rules.custom_validator = Some(CustomValidator::Pattern {
            pattern: "(".to_string(),
            message: String::new(),
        });
        let err = Catalog::new(vec![CatalogSet::new("A", vec![exercise])]).unwrap_err();
        assert!(err.to_string().contains("invalid validator pattern"));
    }

    #[test]
    fn test_by_number_is_one_based() {
        let set = CatalogSet::new(
            "A",
            vec![
                Exercise::new(1, ExerciseKind::Markup),
                Exercise::new(2, ExerciseKind::Script),
            ],
        );
        let (index, exercise) = set.by_number(2).unwrap();
        assert_eq!(index, 1);
        assert_eq!(exercise.kind, ExerciseKind::Script);
        assert!(matches!(
            set.by_number(0),
            Err(KataError::ExerciseNotFound { number: 0, count: 2, .. })
        ));
        assert!(set.by_number(3).is_err());
    }

    #[test]
    fn test_set_not_found() {
        let catalog = Catalog::new(vec![CatalogSet::new("A", vec![])]).unwrap();
        assert!(matches!(catalog.set("B"), Err(KataError::SetNotFound { .. })));
    }

    #[test]
    fn test_level_filter_parsing() {
        assert_eq!("All".parse::<LevelFilter>().unwrap(), LevelFilter::All);
        assert_eq!("4".parse::<LevelFilter>().unwrap(), LevelFilter::Level(4));
        assert!("0".parse::<LevelFilter>().is_err());
        assert!("seven".parse::<LevelFilter>().is_err());

        let filter: LevelFilter = serde_json::from_str("2").unwrap();
        assert_eq!(filter, LevelFilter::Level(2));
        assert!(serde_json::from_str::<LevelFilter>("-1").is_err());
        assert_eq!(serde_json::to_string(&LevelFilter::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&LevelFilter::Level(5)).unwrap(), "5");
    }

    #[test]
    fn test_level_filter_matches() {
        let exercise = Exercise::new(3, ExerciseKind::Markup);
        assert!(LevelFilter::All.matches(&exercise));
        assert!(LevelFilter::Level(3).matches(&exercise));
        assert!(!LevelFilter::Level(2).matches(&exercise));
    }

    #[test]
    fn test_native_validator_cannot_be_serialized() {
        let mut exercise = Exercise::new(1, ExerciseKind::Markup);
        exercise.rules.custom_validator = Some(CustomValidator::native(|_| ValidatorReport {
            valid: true,
            message: String::new(),
        }));
        assert!(serde_json::to_string(&exercise).is_err());
        assert_eq!(
            format!("{:?}", exercise.rules.custom_validator.unwrap()),
            "Native(..)"
        );
    }
}
