//! Migration steps and validation rules.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use super::risk::RiskLevel;

/// Identifier of a step, unique within a plan.
///
/// Derived from the step's origin (pattern id or auxiliary kind), its target
/// path and its sequence number in the plan, so rebuilding a plan from the
/// same inputs yields the same ids.
///
/// # Examples
///
/// ```
/// use cm_core::StepId;
/// use camino::Utf8Path;
///
/// let id = StepId::derive("var-to-let", Utf8Path::new("src/app.js"), 3);
/// assert_eq!(id.as_str(), "var-to-let:src/app.js:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Builds the id `"{origin}:{path}:{seq}"`.
    #[must_use]
    pub fn derive(origin: &str, path: &Utf8Path, seq: usize) -> Self {
        Self(format!("{origin}:{path}:{seq}"))
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// What a step does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    /// Writes pattern-transformed content to a source file.
    CodeTransformation,
    /// Updates the package manifest.
    DependencyUpdate,
    /// Updates the build/type configuration.
    ConfigChange,
    /// Generic file write.
    FileOperation,
    /// Updates the test suite.
    TestUpdate,
}

impl StepType {
    /// Returns the kebab-case label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CodeTransformation => "code-transformation",
            Self::DependencyUpdate => "dependency-update",
            Self::ConfigChange => "config-change",
            Self::FileOperation => "file-operation",
            Self::TestUpdate => "test-update",
        }
    }
}

/// Kind of check a validation rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// Output is well formed.
    Syntax,
    /// Output preserves meaning.
    Semantic,
    /// Output does not regress size or speed.
    Performance,
    /// Output runs on the target version.
    Compatibility,
    /// Output introduces no dangerous APIs.
    Security,
}

impl RuleKind {
    /// Returns the kebab-case label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Performance => "performance",
            Self::Compatibility => "compatibility",
            Self::Security => "security",
        }
    }
}

/// How a rule violation is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Fails the step.
    Error,
    /// Logged as an execution warning.
    Warning,
    /// Logged as an execution warning.
    Info,
}

/// A named check attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// What is checked.
    pub kind: RuleKind,
    /// Rule descriptor (a pattern source, a file format, ...).
    pub rule: String,
    /// What a violation does.
    pub severity: Severity,
}

impl ValidationRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(kind: RuleKind, rule: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            rule: rule.into(),
            severity,
        }
    }

    /// Creates an error-severity syntax rule.
    #[must_use]
    pub fn syntax_error(rule: impl Into<String>) -> Self {
        Self::new(RuleKind::Syntax, rule, Severity::Error)
    }
}

/// One atomic, independently risk-rated unit of change.
///
/// Created by the plan builder and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Unique id within the plan.
    pub id: StepId,
    /// What the step does.
    pub step_type: StepType,
    /// Human readable summary.
    pub description: String,
    /// Pattern that produced the step, for code transformations.
    pub pattern_id: Option<String>,
    /// File the step targets.
    pub file_path: Utf8PathBuf,
    /// Content before the step.
    pub original_content: Option<String>,
    /// Content after the step.
    pub transformed_content: Option<String>,
    /// Risk rating.
    pub risk_level: RiskLevel,
    /// Estimated seconds.
    pub estimated_time: u64,
    /// Packages or tools the step needs.
    pub dependencies: Vec<String>,
    /// How to undo the step, for reports.
    pub rollback_action: Option<String>,
    /// Checks run after the step is applied.
    pub validation_rules: Vec<ValidationRule>,
    /// Parameters consumed by the collaborator that performs the step.
    pub params: BTreeMap<String, String>,
}

impl MigrationStep {
    /// Net line delta, when both snapshots are present.
    ///
    /// # Examples
    ///
    /// ```
    /// use cm_core::{MigrationStep, StepType};
    ///
    /// let mut step = MigrationStep::new("s1", StepType::CodeTransformation, "src/a.ts");
    /// assert_eq!(step.line_delta(), None);
    ///
    /// step.original_content = Some("a\n".to_owned());
    /// step.transformed_content = Some("a\nb\nc\n".to_owned());
    /// assert_eq!(step.line_delta(), Some(2));
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn line_delta(&self) -> Option<i64> {
        let original = self.original_content.as_deref()?;
        let transformed = self.transformed_content.as_deref()?;
        Some(transformed.lines().count() as i64 - original.lines().count() as i64)
    }

    /// Returns `true` if the description announces a breaking change.
    #[must_use]
    pub fn signals_breaking_change(&self) -> bool {
        self.description.to_ascii_lowercase().contains("breaking")
    }

    /// Creates a low-risk step with no snapshots, rules or parameters.
    ///
    /// Mostly useful for tests and custom plan builders.
    #[must_use]
    pub fn new(id: &str, step_type: StepType, file_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            id: StepId::from(id),
            step_type,
            description: String::new(),
            pattern_id: None,
            file_path: file_path.into(),
            original_content: None,
            transformed_content: None,
            risk_level: RiskLevel::Low,
            estimated_time: 0,
            dependencies: Vec::new(),
            rollback_action: None,
            validation_rules: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    /// Sets the risk level.
    #[must_use]
    pub const fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    /// Sets both content snapshots.
    #[must_use]
    pub fn with_contents(mut self, original: &str, transformed: &str) -> Self {
        self.original_content = Some(original.to_owned());
        self.transformed_content = Some(transformed.to_owned());
        self
    }
}
