//! Error types for the Kata engine.
//!
//! Nothing inside a running session is fatal: script faults become preview
//! content, failed checks are ordinary outcomes and progress persistence
//! fails open. The errors below cover loading configuration and catalogs,
//! and lookups made by the CLI and HTTP layers.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, KataError>;

/// Errors that can occur while setting up or addressing a session.
#[derive(Debug, thiserror::Error)]
pub enum KataError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your kata.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Catalog Errors
    // ========================================================================
    /// Catalog file was not found.
    #[error("Catalog not found: '{path}'\n\nSuggestion: Check the 'catalog' field in kata.json or pass --catalog")]
    CatalogNotFound {
        /// Path where the catalog was expected.
        path: PathBuf,
    },

    /// Catalog file exceeds the size limit.
    #[error("Catalog exceeds size limit (2048KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the catalog into smaller sets")]
    CatalogTooLarge {
        /// Path to the oversized catalog.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Catalog file is not valid UTF-8.
    #[error("Catalog has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    CatalogEncodingError {
        /// Path to the catalog with encoding issues.
        path: PathBuf,
    },

    /// Catalog file is not valid catalog JSON.
    #[error("Invalid catalog '{path}': {message}\n\nSuggestion: Check the file against the catalog format (sets of exercises with camelCase fields)")]
    CatalogParseError {
        /// Path to the catalog.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Catalog content is structurally invalid.
    #[error("Invalid catalog: {message}\n\nSuggestion: {suggestion}")]
    CatalogValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// No catalog set has the given name.
    #[error("Exercise set not found: '{name}'\n\nSuggestion: Run 'kata list' to see the available sets")]
    SetNotFound {
        /// The requested set name.
        name: String,
    },

    /// The set has no exercise with the given label number.
    #[error("Exercise {number} not found in '{set}' (it has {count} exercises)\n\nSuggestion: Exercise numbers start at 1")]
    ExerciseNotFound {
        /// Set that was searched.
        set: String,
        /// The 1-based exercise number that was requested.
        number: usize,
        /// Number of exercises in the set.
        count: usize,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// A progress record could not be written or removed.
    #[error("Failed to save progress '{key}': {message}\n\nSuggestion: Check write permissions for the progress directory")]
    ProgressStoreError {
        /// Store key of the record.
        key: String,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Wrapped Errors
    // ========================================================================
    /// Sandbox setup failed.
    #[error(transparent)]
    Sandbox(#[from] kata_sandbox::SandboxError),

    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KataError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `CatalogNotFound` error.
    #[must_use]
    pub fn catalog_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CatalogNotFound { path: path.into() }
    }

    /// Creates a new `CatalogTooLarge` error.
    #[must_use]
    pub fn catalog_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::CatalogTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `CatalogEncodingError`.
    #[must_use]
    pub fn catalog_encoding(path: impl Into<PathBuf>) -> Self {
        Self::CatalogEncodingError { path: path.into() }
    }

    /// Creates a new `CatalogParseError`.
    #[must_use]
    pub fn catalog_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CatalogParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `CatalogValidationError`.
    #[must_use]
    pub fn catalog_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::CatalogValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `SetNotFound` error.
    #[must_use]
    pub fn set_not_found(name: impl Into<String>) -> Self {
        Self::SetNotFound { name: name.into() }
    }

    /// Creates a new `ExerciseNotFound` error.
    #[must_use]
    pub fn exercise_not_found(set: impl Into<String>, number: usize, count: usize) -> Self {
        Self::ExerciseNotFound {
            set: set.into(),
            number,
            count,
        }
    }

    /// Creates a new `ProgressStoreError`.
    #[must_use]
    pub fn progress_store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProgressStoreError {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error prevents a session from starting.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::CatalogNotFound { .. }
                | Self::CatalogTooLarge { .. }
                | Self::CatalogEncodingError { .. }
                | Self::CatalogParseError { .. }
                | Self::CatalogValidationError { .. }
                | Self::Sandbox(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let msg = KataError::catalog_not_found("/path/to/catalog.json").to_string();
        assert!(msg.contains("Catalog not found"));
        assert!(msg.contains("/path/to/catalog.json"));
        assert!(msg.contains("Suggestion"));

        let msg = KataError::exercise_not_found("Basics", 9, 4).to_string();
        assert!(msg.contains("Exercise 9 not found in 'Basics' (it has 4 exercises)"));
    }

    #[test]
    fn test_catalog_too_large_display() {
        let msg = KataError::catalog_too_large("/big.json", 3000).to_string();
        assert!(msg.contains("3000KB"));
        assert!(msg.contains("2048KB"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(KataError::catalog_encoding("c.json").is_fatal());
        assert!(KataError::config_validation("bad", "fix").is_fatal());
        assert!(!KataError::set_not_found("Nope").is_fatal());
        assert!(!KataError::progress_store("k", "denied").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KataError = io_err.into();
        assert!(matches!(err, KataError::Io(_)));
    }
}
