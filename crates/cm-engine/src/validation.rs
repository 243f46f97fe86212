//! Validation runner.
//!
//! Every step carries [`ValidationRule`]s. After a step is applied the
//! [`ValidationRunner`] dispatches each rule to the matching [`Validator`]
//! check. An error-severity violation fails the step; warning and info
//! violations come back as [`Diagnostic`]s that the executor appends to the
//! run's warnings.

use std::fmt;
use std::sync::Arc;

use cm_core::{MigrationStep, RuleKind, Severity, StepId, ValidationRule};
use tracing::{debug, info};

use crate::collaborators::{TestReport, TestRunner};
use crate::error::{CollaboratorError, StepError};

/// Descriptor of the syntax rule attached to manifest and config steps.
pub const JSON_RULE: &str = "json";

/// API fragments that warrant a security review when a transform introduces them.
pub const DANGEROUS_APIS: &[&str] = &[
    "eval(",
    "new Function(",
    "dangerouslySetInnerHTML",
    "document.write(",
    ".innerHTML =",
];

/// Returns the dangerous APIs that occur more often in `after` than in `before`.
#[must_use]
pub fn introduced_dangerous_apis(before: &str, after: &str) -> Vec<&'static str> {
    DANGEROUS_APIS
        .iter()
        .copied()
        .filter(|api| after.matches(api).count() > before.matches(api).count())
        .collect()
}

/// Per-rule checks. Each returns `Err(message)` on a violation.
///
/// `content` is the file content after the step was applied. The default
/// compatibility and security checks accept everything.
pub trait Validator: Send + Sync {
    /// The output is well formed.
    fn check_syntax(
        &self,
        step: &MigrationStep,
        content: &str,
        rule: &ValidationRule,
    ) -> Result<(), String>;

    /// The output preserves meaning.
    fn check_semantics(
        &self,
        step: &MigrationStep,
        content: &str,
        rule: &ValidationRule,
    ) -> Result<(), String>;

    /// The output does not regress size or speed.
    fn check_performance(
        &self,
        step: &MigrationStep,
        content: &str,
        rule: &ValidationRule,
    ) -> Result<(), String>;

    /// The output runs on the target version.
    fn check_compatibility(
        &self,
        _step: &MigrationStep,
        _content: &str,
        _rule: &ValidationRule,
    ) -> Result<(), String> {
        Ok(())
    }

    /// The output introduces no dangerous APIs.
    fn check_security(
        &self,
        _step: &MigrationStep,
        _content: &str,
        _rule: &ValidationRule,
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Heuristic checks that need no toolchain.
///
/// - syntax: JSON parses (for the `json` rule); otherwise brackets balance,
///   unless they were already unbalanced before the step
/// - semantics: a non-empty file does not become empty
/// - performance: the file does not grow by more than half plus 1 KiB
/// - security: no API from [`DANGEROUS_APIS`] is introduced
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidator;

impl Validator for BuiltinValidator {
    fn check_syntax(
        &self,
        step: &MigrationStep,
        content: &str,
        rule: &ValidationRule,
    ) -> Result<(), String> {
        if rule.rule == JSON_RULE {
            return serde_json::from_str::<serde_json::Value>(content)
                .map(|_| ())
                .map_err(|e| format!("invalid JSON: {e}"));
        }

        let Some(issue) = delimiter_issue(content) else {
            return Ok(());
        };
        let was_balanced = step
            .original_content
            .as_deref()
            .is_none_or(|original| delimiter_issue(original).is_none());
        if was_balanced { Err(issue) } else { Ok(()) }
    }

    fn check_semantics(
        &self,
        step: &MigrationStep,
        content: &str,
        _rule: &ValidationRule,
    ) -> Result<(), String> {
        let had_content = step
            .original_content
            .as_deref()
            .is_some_and(|original| !original.trim().is_empty());
        if had_content && content.trim().is_empty() {
            return Err("transformation removed all content".to_owned());
        }
        Ok(())
    }

    fn check_performance(
        &self,
        step: &MigrationStep,
        content: &str,
        _rule: &ValidationRule,
    ) -> Result<(), String> {
        let before = step.original_content.as_deref().map_or(0, str::len);
        let limit = before + before / 2 + 1024;
        if content.len() > limit {
            return Err(format!(
                "file grew from {before} to {} bytes",
                content.len()
            ));
        }
        Ok(())
    }

    fn check_security(
        &self,
        step: &MigrationStep,
        content: &str,
        _rule: &ValidationRule,
    ) -> Result<(), String> {
        let before = step.original_content.as_deref().unwrap_or_default();
        let introduced = introduced_dangerous_apis(before, content);
        if introduced.is_empty() {
            Ok(())
        } else {
            Err(format!("introduces {}", introduced.join(", ")))
        }
    }
}

/// Returns the first bracket problem in `content`, ignoring string literals
/// and comments.
fn delimiter_issue(content: &str) -> Option<String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            match c {
                '\\' => {
                    chars.next();
                }
                '\n' if q != '`' => quote = None,
                c if c == q => quote = None,
                _ => {}
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Some(format!("unexpected '{c}'"));
                }
            }
            _ => {}
        }
    }

    if quote == Some('`') {
        return Some("unterminated template literal".to_owned());
    }
    stack.last().map(|open| format!("unclosed '{open}'"))
}

/// A non-fatal rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The validated step.
    pub step: StepId,
    /// The rule kind.
    pub kind: RuleKind,
    /// Warning or info.
    pub severity: Severity,
    /// What the checker reported.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(
            f,
            "step {}: {} {severity}: {}",
            self.step,
            self.kind.label(),
            self.message
        )
    }
}

/// Runs step rules and the post-migration test phase.
#[derive(Clone)]
pub struct ValidationRunner {
    validator: Arc<dyn Validator>,
    tests: Arc<dyn TestRunner>,
}

impl fmt::Debug for ValidationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRunner").finish_non_exhaustive()
    }
}

impl ValidationRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(validator: Arc<dyn Validator>, tests: Arc<dyn TestRunner>) -> Self {
        Self { validator, tests }
    }

    /// Checks every rule of `step` against the applied `content`.
    ///
    /// Without content (a dry run of a manifest or config step) there is
    /// nothing to inspect and no rule runs.
    pub fn validate_step(
        &self,
        step: &MigrationStep,
        content: Option<&str>,
    ) -> Result<Vec<Diagnostic>, StepError> {
        let Some(content) = content else {
            debug!(step = %step.id, "No content to validate");
            return Ok(Vec::new());
        };

        let mut diagnostics = Vec::new();
        for rule in &step.validation_rules {
            let outcome = match rule.kind {
                RuleKind::Syntax => self.validator.check_syntax(step, content, rule),
                RuleKind::Semantic => self.validator.check_semantics(step, content, rule),
                RuleKind::Performance => self.validator.check_performance(step, content, rule),
                RuleKind::Compatibility => {
                    self.validator.check_compatibility(step, content, rule)
                }
                RuleKind::Security => self.validator.check_security(step, content, rule),
            };

            let Err(message) = outcome else { continue };
            if rule.severity == Severity::Error {
                return Err(StepError::Validation {
                    step: step.id.clone(),
                    kind: rule.kind,
                    message,
                });
            }
            diagnostics.push(Diagnostic {
                step: step.id.clone(),
                kind: rule.kind,
                severity: rule.severity,
                message,
            });
        }
        Ok(diagnostics)
    }

    /// Runs the external test suite.
    pub fn run_test_suite(&self) -> Result<TestReport, CollaboratorError> {
        let report = self.tests.run()?;
        info!(passed = report.passed, failed = report.failed, "Test suite finished");
        Ok(report)
    }
}
