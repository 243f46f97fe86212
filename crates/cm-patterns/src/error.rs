//! Error types for the cm-patterns crate.
//!
//! This module provides the [`PatternError`] type for errors that can occur
//! while building patterns and registering them in the catalog.

/// Errors that can occur while building or registering patterns.
///
/// # Examples
///
/// ```
/// use cm_patterns::PatternError;
///
/// fn handle_error(err: PatternError) {
///     match err {
///         PatternError::InvalidRegex { pattern, .. } => eprintln!("bad regex: {pattern}"),
///         PatternError::MatchesEmpty(id) => eprintln!("{id} matches the empty string"),
///         PatternError::Duplicate(id) => eprintln!("{id} already registered"),
///         PatternError::NotFound(id) => eprintln!("{id} not registered"),
///         PatternError::ExampleMismatch { id, .. } => eprintln!("{id} fails its examples"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    /// The match expression failed to compile.
    #[error("invalid pattern regex '{pattern}': {source}")]
    InvalidRegex {
        /// The regex source.
        pattern: String,
        /// The compiler error.
        #[source]
        source: regex::Error,
    },

    /// The matcher accepts the empty string, which would match everywhere.
    #[error("pattern '{0}' matches the empty string")]
    MatchesEmpty(String),

    /// A pattern with the same id is already registered.
    #[error("pattern '{0}' is already registered")]
    Duplicate(String),

    /// No pattern with this id is registered.
    #[error("pattern '{0}' is not registered")]
    NotFound(String),

    /// An example pair does not round-trip through the pattern.
    #[error("pattern '{id}' turns {input:?} into {actual:?}, expected {expected:?}")]
    ExampleMismatch {
        /// The pattern id.
        id: String,
        /// Example input.
        input: String,
        /// Example output.
        expected: String,
        /// What the pattern produced.
        actual: String,
    },
}
