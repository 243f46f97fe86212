//! Error types for the cm-engine crate.
//!
//! - [`EngineError`]: returned by the public engine operations. Only plan
//!   creation and registry misuse fail this way; execution records expected
//!   failures in the `MigrationResult` instead.
//! - [`StepError`]: why a single step failed. The step's risk level decides
//!   whether the run continues.
//! - [`CollaboratorError`]: a collaborator call failed or timed out.
//! - [`RollbackError`]: one restore failed during an unwind. Logged, never
//!   propagated.

use camino::Utf8PathBuf;
use cm_core::{ConfigError, RuleKind, StepId};
use cm_patterns::PatternError;
use cm_scanner::ScanError;

/// Errors returned by [`MigrationEngine`](crate::MigrationEngine) operations.
///
/// # Examples
///
/// ```
/// use cm_core::ConfigError;
/// use cm_engine::EngineError;
///
/// let err = EngineError::from(ConfigError::invalid_option("target_version", "must not be empty"));
/// assert!(err.is_config());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The migration request or engine settings are invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A catalog operation failed.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// The file set could not be resolved.
    #[error("file scan failed: {0}")]
    Scan(#[from] ScanError),

    /// No migration with this id is known.
    #[error("migration '{0}' not found")]
    NotFound(String),

    /// A migration with this id is already executing.
    #[error("migration '{0}' is already running")]
    AlreadyRunning(String),
}

impl EngineError {
    /// Returns `true` for configuration errors.
    #[inline]
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Errors raised by collaborator calls.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// File access failed.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// A JSON document could not be parsed or is not an object.
    #[error("invalid JSON in {path}: {reason}")]
    Json {
        /// The file being updated.
        path: Utf8PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// An external process could not be run.
    #[error("failed to run '{command}': {source}")]
    Process {
        /// The command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The call did not finish within the configured timeout.
    #[error("timed out after {0}ms")]
    TimedOut(u64),

    /// The blocking task panicked or was aborted.
    #[error("collaborator task failed: {0}")]
    Join(String),

    /// Any other failure reported by a custom collaborator.
    #[error("{0}")]
    Failed(String),
}

impl CollaboratorError {
    /// Creates a [`CollaboratorError::Json`] error.
    #[inline]
    pub fn json(path: impl Into<Utf8PathBuf>, reason: impl ToString) -> Self {
        Self::Json {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Classification of a step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepErrorKind {
    /// An error-severity validation rule failed.
    Validation,
    /// A collaborator action failed.
    Execution,
    /// A collaborator action timed out.
    Timeout,
}

/// Why a step failed.
///
/// All kinds are treated alike by the executor: the step's risk level
/// decides between continuing and aborting.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An error-severity validation rule failed.
    #[error("step {step}: {} check failed: {message}", .kind.label())]
    Validation {
        /// The failed step.
        step: StepId,
        /// The rule kind.
        kind: RuleKind,
        /// What the checker reported.
        message: String,
    },

    /// A collaborator action failed.
    #[error("step {step}: {source}")]
    Execution {
        /// The failed step.
        step: StepId,
        /// The collaborator error.
        #[source]
        source: CollaboratorError,
    },

    /// A collaborator action timed out.
    #[error("step {step}: timed out after {timeout_ms}ms")]
    Timeout {
        /// The failed step.
        step: StepId,
        /// The configured timeout.
        timeout_ms: u64,
    },
}

impl StepError {
    /// Wraps a collaborator error, mapping timeouts to [`StepError::Timeout`].
    #[must_use]
    pub fn from_collaborator(step: &StepId, source: CollaboratorError) -> Self {
        match source {
            CollaboratorError::TimedOut(timeout_ms) => Self::Timeout {
                step: step.clone(),
                timeout_ms,
            },
            source => Self::Execution {
                step: step.clone(),
                source,
            },
        }
    }

    /// Returns the failure classification.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> StepErrorKind {
        match self {
            Self::Validation { .. } => StepErrorKind::Validation,
            Self::Execution { .. } => StepErrorKind::Execution,
            Self::Timeout { .. } => StepErrorKind::Timeout,
        }
    }

    /// Returns the failed step's id.
    #[must_use]
    pub const fn step(&self) -> &StepId {
        match self {
            Self::Validation { step, .. } | Self::Execution { step, .. } | Self::Timeout { step, .. } => {
                step
            }
        }
    }
}

/// A restore that failed during rollback.
#[derive(Debug, thiserror::Error)]
#[error("failed to restore {path} (step {step}): {source}")]
pub struct RollbackError {
    /// The step whose record could not be restored.
    pub step: StepId,
    /// The file that could not be restored.
    pub path: Utf8PathBuf,
    /// The store error.
    #[source]
    pub source: ScanError,
}
