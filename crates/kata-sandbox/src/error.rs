//! Error types for sandbox setup.
//!
//! Faults raised by learner code are not errors: they are reported through
//! [`ScriptFault`](crate::ScriptFault) and rendered into the preview. This
//! module only covers mistakes made by the embedding application.

/// A specialized `Result` type for sandbox setup.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors raised while configuring a sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The host page template lacks the preview container.
    #[error("Host page has no element with id '{id}'\n\nSuggestion: Add <div id=\"{id}\"></div> to the page template")]
    ContainerMissing {
        /// The expected container id.
        id: String,
    },

    /// A sandbox limit was set to zero.
    #[error("Invalid sandbox limit: '{field}' must be greater than zero\n\nSuggestion: Remove the field to use the default")]
    InvalidLimit {
        /// Name of the offending limit.
        field: &'static str,
    },

    /// A selector passed by the host could not be parsed.
    #[error(transparent)]
    Selector(#[from] crate::dom::SelectorError),
}

impl SandboxError {
    /// Creates a new `ContainerMissing` error.
    #[must_use]
    pub fn container_missing(id: impl Into<String>) -> Self {
        Self::ContainerMissing { id: id.into() }
    }

    /// Creates a new `InvalidLimit` error.
    #[must_use]
    pub const fn invalid_limit(field: &'static str) -> Self {
        Self::InvalidLimit { field }
    }
}
