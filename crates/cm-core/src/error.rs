//! Error types for the cm-core crate.
//!
//! This module provides the [`ConfigError`] type for configuration-related errors
//! that can occur across the workspace.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// A `ConfigError` is the only failure surfaced synchronously from plan
/// creation; everything that goes wrong during execution is recorded in the
/// migration result instead.
///
/// # Examples
///
/// ```
/// use cm_core::ConfigError;
///
/// let error = ConfigError::invalid_option("target_version", "must not be empty");
/// assert!(error.to_string().contains("target_version"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The provided path is invalid or malformed.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The invalid path.
        path: Utf8PathBuf,
        /// Explanation of why the path is invalid.
        reason: String,
    },

    /// An include or exclude glob does not compile.
    #[error("invalid glob '{pattern}': {reason}")]
    InvalidGlob {
        /// The offending glob.
        pattern: String,
        /// Explanation from the glob compiler.
        reason: String,
    },

    /// A configuration option has an invalid value.
    #[error("invalid configuration option '{option}': {reason}")]
    InvalidOption {
        /// The name of the invalid option.
        option: String,
        /// Explanation of why the option is invalid.
        reason: String,
    },

    /// An I/O error occurred while reading configuration.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the configuration file (including unknown enum labels).
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidOption`] error.
    #[inline]
    pub fn invalid_option(option: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            reason: reason.into(),
        }
    }
}
