//! Plan builder.
//!
//! Turns a [`MigrationConfig`] into a [`MigrationPlan`]:
//!
//! 1. resolve the file set through the [`FileScanner`]
//! 2. run the catalog over every file (in parallel, see
//!    [`FileAnalyzer`]) and emit one code-transformation step per match
//! 3. append the auxiliary steps the migration type asks for
//! 4. assess risk, impact and validation, and schedule milestones
//!
//! Step ids are `<origin>:<path>:<index>`, where origin is the pattern id or
//! the auxiliary step type and index is the step's position in the plan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use cm_core::{
    AuxiliaryStepPolicy, EngineSettings, MigrationConfig, MigrationPlan, MigrationStep, RuleKind,
    Severity, StepId, StepType, ValidationRule,
};
use cm_patterns::MigrationPattern;
use cm_scanner::{FileAnalysis, FileAnalyzer, FileScanner, FileStore, ScanStats, is_test_file};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assess::{assess_impact, assess_risk, summarize_validation};
use crate::error::EngineError;
use crate::schedule::schedule;
use crate::validation::JSON_RULE;

/// Config key recording the version migrated from.
pub const SOURCE_VERSION_KEY: &str = "codemig.sourceVersion";
/// Config key recording the version migrated to.
pub const TARGET_VERSION_KEY: &str = "codemig.targetVersion";

/// Path of the test-update step when no test file was scanned.
const DEFAULT_TEST_PATH: &str = "tests";

/// Builds migration plans from a file set and a pattern list.
pub struct PlanBuilder<'a> {
    scanner: &'a dyn FileScanner,
    store: &'a dyn FileStore,
    settings: &'a EngineSettings,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder over the given collaborators.
    #[must_use]
    pub fn new(
        scanner: &'a dyn FileScanner,
        store: &'a dyn FileStore,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            scanner,
            store,
            settings,
        }
    }

    /// Builds a plan for `config` using `patterns` in order.
    ///
    /// Unreadable files are skipped with a warning. An empty file set is
    /// valid and yields a plan with auxiliary steps only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an invalid config and
    /// [`EngineError::Scan`] if the file set cannot be resolved.
    pub fn build(
        &self,
        config: &MigrationConfig,
        patterns: &[Arc<MigrationPattern>],
    ) -> Result<MigrationPlan, EngineError> {
        config.validate()?;

        let files = self.scanner.list_files(config)?;
        debug!(files = files.len(), patterns = patterns.len(), "Resolved file set");

        let stats = ScanStats::new();
        let analyses = FileAnalyzer::new()
            .with_parallel(self.settings.planning.parallel_scan)
            .analyze_files(&files, self.store, patterns, &stats);

        let mut steps = Vec::new();
        for (path, analysis) in analyses {
            match analysis {
                Ok(analysis) => self.push_code_steps(&mut steps, &analysis),
                Err(e) if e.is_recoverable() => {
                    warn!(path = %path, error = %e, "Skipping unreadable file");
                }
                Err(e) => return Err(e.into()),
            }
        }
        let code_steps = steps.len();

        self.push_auxiliary_steps(&mut steps, config, patterns, &files);

        let plan = MigrationPlan {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            risk_assessment: assess_risk(&steps, &self.settings.risk),
            impact: assess_impact(&steps, patterns),
            validation: summarize_validation(config, &steps, patterns, &files),
            schedule: schedule(&steps, &self.settings.schedule),
            config: config.clone(),
            steps,
        };

        let scan = stats.snapshot();
        info!(
            plan_id = %plan.id,
            files = scan.files,
            matched_files = scan.matched_files,
            code_steps,
            steps = plan.steps.len(),
            risk = %plan.risk_assessment.overall_risk,
            "Created migration plan"
        );
        Ok(plan)
    }

    fn push_code_steps(&self, steps: &mut Vec<MigrationStep>, analysis: &FileAnalysis) {
        for rewrite in &analysis.rewrites {
            let pattern = &rewrite.pattern;
            let description = if pattern.description.is_empty() {
                pattern.name.clone()
            } else {
                pattern.description.clone()
            };

            steps.push(MigrationStep {
                id: StepId::derive(&pattern.id, &analysis.path, steps.len()),
                step_type: StepType::CodeTransformation,
                description,
                pattern_id: Some(pattern.id.clone()),
                file_path: analysis.path.clone(),
                original_content: Some(rewrite.before.clone()),
                transformed_content: Some(rewrite.after.clone()),
                risk_level: pattern.risk_level,
                estimated_time: self.settings.risk.step_time(pattern.risk_level, 1),
                dependencies: pattern.dependencies.clone(),
                rollback_action: Some(format!(
                    "restore {} to its content before {}",
                    analysis.path, pattern.id
                )),
                validation_rules: code_rules(pattern),
                params: BTreeMap::new(),
            });
        }
    }

    fn push_auxiliary_steps(
        &self,
        steps: &mut Vec<MigrationStep>,
        config: &MigrationConfig,
        patterns: &[Arc<MigrationPattern>],
        files: &[Utf8PathBuf],
    ) {
        let policy = &self.settings.planning;

        if config.migration_type.needs_dependency_update() {
            let used: BTreeSet<&str> = steps.iter().filter_map(|s| s.pattern_id.as_deref()).collect();
            let dependencies: BTreeSet<String> = patterns
                .iter()
                .filter(|p| used.contains(p.id.as_str()))
                .flat_map(|p| p.dependencies.iter().cloned())
                .collect();

            let mut step = auxiliary_step(
                steps.len(),
                StepType::DependencyUpdate,
                &config.manifest_path,
                policy.dependency_update,
            );
            step.description = format!(
                "Update {} dependencies for {}",
                config.manifest_path, config.target_version
            );
            step.dependencies = dependencies.into_iter().collect();
            step.validation_rules = vec![ValidationRule::syntax_error(JSON_RULE)];
            steps.push(step);
        }

        if config.migration_type.needs_config_change() {
            let mut step = auxiliary_step(
                steps.len(),
                StepType::ConfigChange,
                &config.build_config_path,
                policy.config_change,
            );
            step.description = format!(
                "Update {} for {} {} -> {}",
                config.build_config_path,
                config.migration_type.label(),
                config.source_version,
                config.target_version
            );
            step.params
                .insert(SOURCE_VERSION_KEY.to_owned(), config.source_version.clone());
            step.params
                .insert(TARGET_VERSION_KEY.to_owned(), config.target_version.clone());
            step.params.extend(
                config
                    .config_overrides
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            step.validation_rules = vec![ValidationRule::syntax_error(JSON_RULE)];
            steps.push(step);
        }

        if config.include_tests {
            let path = files
                .iter()
                .find(|p| is_test_file(p))
                .map_or_else(|| Utf8PathBuf::from(DEFAULT_TEST_PATH), Clone::clone);
            let mut step =
                auxiliary_step(steps.len(), StepType::TestUpdate, &path, policy.test_update);
            step.description = format!("Update tests for {}", config.target_version);
            steps.push(step);
        }
    }
}

fn auxiliary_step(
    seq: usize,
    step_type: StepType,
    path: &Utf8Path,
    policy: AuxiliaryStepPolicy,
) -> MigrationStep {
    MigrationStep {
        id: StepId::derive(step_type.label(), path, seq),
        risk_level: policy.risk,
        estimated_time: policy.estimated_time,
        rollback_action: Some(format!("restore {path}")),
        ..MigrationStep::new("", step_type, path)
    }
}

fn code_rules(pattern: &MigrationPattern) -> Vec<ValidationRule> {
    vec![
        ValidationRule::syntax_error(pattern.matcher.source()),
        ValidationRule::new(RuleKind::Semantic, "non-empty-output", Severity::Error),
        ValidationRule::new(RuleKind::Security, "dangerous-apis", Severity::Warning),
        ValidationRule::new(RuleKind::Performance, "growth", Severity::Warning),
    ]
}
