//! Planning and execution of codebase migrations.
//!
//! The main entry point is [`MigrationEngine`], which owns:
//!
//! - a [`PatternCatalog`] of transformation patterns
//! - the [`Collaborators`] used for all file, manifest, config and test I/O
//! - the results of past runs and the cancellation tokens of active ones
//! - a [`RollbackManager`] holding each run's rollback stack
//!
//! # Flow
//!
//! ```text
//! MigrationConfig ─► PlanBuilder ─► MigrationPlan ─► Executor ─► MigrationResult
//!                    (catalog,      (risk, impact,   (validation,
//!                     scanner)       schedule)        rollback)
//! ```
//!
//! Planning is synchronous and matches files on the rayon pool. Execution is
//! async: steps run one after another, each collaborator call on tokio's
//! blocking pool under a timeout.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cm_core::{EngineSettings, MigrationConfig, MigrationType};
//! use cm_engine::{Collaborators, MigrationEngine};
//! use cm_scanner::MemoryFileStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cm_engine::EngineError> {
//! let files = Arc::new(MemoryFileStore::with_files([("src/app.js", "var x = 1;\n")]));
//! let settings = EngineSettings::default();
//! let engine = MigrationEngine::new(Collaborators::in_memory(&files, &settings.execution), settings)?;
//!
//! let config = MigrationConfig::new("1.0", "2.0", MigrationType::ArchitectureRefactor);
//! let plan = engine.create_migration_plan(&config)?;
//! let result = engine.execute_migration(plan).await?;
//!
//! assert!(result.outcome.success);
//! assert_eq!(files.get("src/app.js").as_deref(), Some("let x = 1;\n"));
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod assess;
pub mod collaborators;
pub mod error;
pub mod executor;
pub mod planner;
pub mod report;
pub mod rollback;
pub mod schedule;
pub mod validation;

use std::sync::Arc;

use cm_core::{EngineSettings, FxHashMap, MigrationConfig, MigrationPlan, MigrationResult, fx_hash_map};
use cm_patterns::{MigrationPattern, PatternCatalog, PatternSummary};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use collaborators::{
    BackupStore, Collaborators, CommandTestRunner, ConfigUpdater, DependencyManager,
    FixedTestRunner, JsonConfigUpdater, ManifestDependencyManager, SnapshotBackupStore,
    TestReport, TestRunner,
};
pub use error::{CollaboratorError, EngineError, RollbackError, StepError, StepErrorKind};
pub use executor::Executor;
pub use planner::PlanBuilder;
pub use report::{diff_hunk, generate_report};
pub use rollback::{RollbackManager, RollbackRecord, RollbackReport};
pub use validation::{BuiltinValidator, Diagnostic, ValidationRunner, Validator};

/// Removes a migration from the active set when dropped.
struct ActiveGuard<'a> {
    active: &'a Mutex<FxHashMap<String, CancellationToken>>,
    id: String,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}

/// A self-contained migration engine.
///
/// Every engine owns its catalog, results and rollback stacks; independent
/// engines share nothing.
pub struct MigrationEngine {
    catalog: RwLock<PatternCatalog>,
    collaborators: Collaborators,
    settings: EngineSettings,
    executor: Executor,
    rollback: Arc<RollbackManager>,
    results: RwLock<FxHashMap<String, MigrationResult>>,
    active: Mutex<FxHashMap<String, CancellationToken>>,
}

impl MigrationEngine {
    /// Creates an engine with the built-in pattern catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for invalid settings and
    /// [`EngineError::Pattern`] if a built-in pattern fails to load.
    pub fn new(collaborators: Collaborators, settings: EngineSettings) -> Result<Self, EngineError> {
        Self::with_catalog(collaborators, settings, PatternCatalog::with_builtin()?)
    }

    /// Creates an engine with a custom catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for invalid settings.
    pub fn with_catalog(
        collaborators: Collaborators,
        settings: EngineSettings,
        catalog: PatternCatalog,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let rollback = Arc::new(RollbackManager::new());
        let executor = Executor::new(
            collaborators.clone(),
            Arc::clone(&rollback),
            settings.execution.clone(),
        );
        debug!(patterns = catalog.len(), "Created migration engine");

        Ok(Self {
            catalog: RwLock::new(catalog),
            collaborators,
            settings,
            executor,
            rollback,
            results: RwLock::new(fx_hash_map()),
            active: Mutex::new(fx_hash_map()),
        })
    }

    /// The engine settings.
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Builds a plan for `config` against the current catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for an invalid config and
    /// [`EngineError::Scan`] if the file set cannot be resolved.
    pub fn create_migration_plan(&self, config: &MigrationConfig) -> Result<MigrationPlan, EngineError> {
        let patterns = self.catalog.read().all();
        PlanBuilder::new(
            self.collaborators.scanner.as_ref(),
            self.collaborators.store.as_ref(),
            &self.settings,
        )
        .build(config, &patterns)
    }

    /// Executes `plan` and stores its result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] if the plan is executing.
    /// Step failures are reported in the result, not as errors.
    pub async fn execute_migration(&self, plan: MigrationPlan) -> Result<MigrationResult, EngineError> {
        self.execute_migration_with_cancel(plan, CancellationToken::new())
            .await
    }

    /// Executes `plan`, stopping between steps once `cancel` fires.
    ///
    /// A cancelled run is treated like an aborted one: status `failed`, and
    /// rolled back if the config asks for it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyRunning`] if the plan is executing.
    pub async fn execute_migration_with_cancel(
        &self,
        plan: MigrationPlan,
        cancel: CancellationToken,
    ) -> Result<MigrationResult, EngineError> {
        let id = plan.id.clone();
        let _guard = {
            let mut active = self.active.lock();
            if active.contains_key(&id) {
                return Err(EngineError::AlreadyRunning(id));
            }
            active.insert(id.clone(), cancel.clone());
            ActiveGuard {
                active: &self.active,
                id: id.clone(),
            }
        };

        let result = self.executor.execute(plan, &cancel).await;
        self.results.write().insert(id, result.clone());
        Ok(result)
    }

    /// Plans `config` and, if `auto_apply` is set, executes the plan.
    ///
    /// # Errors
    ///
    /// Returns the planning error, if any.
    pub async fn migrate(
        &self,
        config: &MigrationConfig,
    ) -> Result<(MigrationPlan, Option<MigrationResult>), EngineError> {
        let plan = self.create_migration_plan(config)?;
        if !config.auto_apply {
            return Ok((plan, None));
        }
        let result = self.execute_migration(plan.clone()).await?;
        Ok((plan, Some(result)))
    }

    /// Requests cancellation of an active migration.
    ///
    /// Returns `false` if no migration with this id is running.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(token) = self.active.lock().get(id).cloned() else {
            return false;
        };
        info!(migration_id = id, "Cancellation requested");
        token.cancel();
        true
    }

    /// Rolls back the retained changes of a finished migration.
    ///
    /// Returns `Ok(false)` if there is nothing to roll back, which includes
    /// a migration that was already rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id and
    /// [`EngineError::AlreadyRunning`] if the migration is executing.
    pub async fn rollback(&self, id: &str) -> Result<bool, EngineError> {
        if self.active.lock().contains_key(id) {
            return Err(EngineError::AlreadyRunning(id.to_owned()));
        }
        let mut result = self
            .get_migration_result(id)
            .ok_or_else(|| EngineError::NotFound(id.to_owned()))?;
        if !self.rollback.has_records(id) {
            debug!(migration_id = id, "Nothing to roll back");
            return Ok(false);
        }

        result.log("Manual rollback requested");
        let unwound = self.executor.unwind(&mut result).await;
        self.rollback.discard(id);
        self.results.write().insert(id.to_owned(), result);
        Ok(unwound)
    }

    /// Renders the report of a finished migration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for an unknown id.
    pub fn generate_migration_report(&self, id: &str) -> Result<String, EngineError> {
        self.results
            .read()
            .get(id)
            .map(generate_report)
            .ok_or_else(|| EngineError::NotFound(id.to_owned()))
    }

    /// Registers a custom pattern.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Pattern`] for a duplicate id or a pattern that
    /// fails its own examples.
    pub fn add_custom_pattern(&self, pattern: MigrationPattern) -> Result<(), EngineError> {
        let id = pattern.id.clone();
        self.catalog.write().register(pattern)?;
        info!(pattern = %id, "Registered custom pattern");
        Ok(())
    }

    /// Removes a pattern from the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Pattern`] if no pattern has this id.
    pub fn remove_pattern(&self, id: &str) -> Result<Arc<MigrationPattern>, EngineError> {
        Ok(self.catalog.write().remove(id)?)
    }

    /// Every registered pattern in registration order.
    #[must_use]
    pub fn get_available_patterns(&self) -> Vec<Arc<MigrationPattern>> {
        self.catalog.read().all()
    }

    /// Serializable summaries of every registered pattern.
    #[must_use]
    pub fn pattern_summaries(&self) -> Vec<PatternSummary> {
        self.catalog
            .read()
            .all()
            .iter()
            .map(|p| p.summary())
            .collect()
    }

    /// The stored result of a migration.
    #[must_use]
    pub fn get_migration_result(&self, id: &str) -> Option<MigrationResult> {
        self.results.read().get(id).cloned()
    }

    /// Ids of the migrations currently executing, sorted.
    #[must_use]
    pub fn get_active_migrations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;
    use camino::Utf8Path;
    use cm_core::{
        ExecutionStatus, MigrationStep, MigrationType, RiskLevel, SafetyLevel, StepType,
        ValidationRule,
    };
    use cm_patterns::{Matcher, PatternCategory, PatternError, Transform};
    use cm_scanner::{FileStore, MemoryFileStore, ScanError};

    fn memory(files: &[(&str, &str)]) -> Arc<MemoryFileStore> {
        Arc::new(MemoryFileStore::with_files(files.iter().copied()))
    }

    fn engine_with(
        files: &Arc<MemoryFileStore>,
        settings: EngineSettings,
        customize: impl FnOnce(Collaborators) -> Collaborators,
    ) -> MigrationEngine {
        let collaborators = customize(Collaborators::in_memory(files, &settings.execution));
        MigrationEngine::new(collaborators, settings).unwrap()
    }

    fn engine(files: &Arc<MemoryFileStore>) -> MigrationEngine {
        engine_with(files, EngineSettings::default(), |c| c)
    }

    fn refactor() -> MigrationConfig {
        MigrationConfig::new("1.0", "2.0", MigrationType::ArchitectureRefactor)
    }

    fn source_files(files: &Arc<MemoryFileStore>) -> Vec<(camino::Utf8PathBuf, String)> {
        files
            .snapshot()
            .into_iter()
            .filter(|(p, _)| !p.starts_with(".codemig"))
            .collect()
    }

    #[tokio::test]
    async fn test_scenario_dependency_update_plan() {
        let files = memory(&[(
            "package.json",
            r#"{"dependencies": {"react": "^17.0.2"}, "peerDependencies": {"react": "^16.8.0"}}"#,
        )]);
        let engine = engine(&files);
        let config = MigrationConfig::new("17.0.2", "18.2.0", MigrationType::DependencyUpdate)
            .with_safety_level(SafetyLevel::Conservative)
            .with_rollback(true);

        let plan = engine.create_migration_plan(&config).unwrap();

        let code: Vec<&MigrationStep> = plan
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::CodeTransformation)
            .collect();
        assert_eq!(code.len(), 2);
        assert!(code.iter().all(|s| s.risk_level == RiskLevel::Low));
        assert!(code.iter().all(|s| s.pattern_id.as_deref() == Some("react-17-dependency")));
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[2].step_type, StepType::DependencyUpdate);
        assert_eq!(plan.risk_assessment.overall_risk, RiskLevel::Low);

        let result = engine.execute_migration(plan).await.unwrap();
        assert_eq!(result.status(), ExecutionStatus::Completed);
        let manifest: serde_json::Value =
            serde_json::from_str(&files.get("package.json").unwrap()).unwrap();
        assert_eq!(manifest["dependencies"]["react"], "^18.2.0");
        assert_eq!(manifest["peerDependencies"]["react"], "^18.2.0");
    }

    #[tokio::test]
    async fn test_scenario_critical_failure_rolls_back() {
        let files = memory(&[
            ("src/a.js", "var a = 1;"),
            ("src/legacy.js", "const el = ReactDOM.findDOMNode(this.node);"),
        ]);
        files.deny_writes("src/legacy.js");
        let before = source_files(&files);
        let engine = engine(&files);

        let plan = engine.create_migration_plan(&refactor()).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].risk_level, RiskLevel::Critical);

        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::RolledBack);
        assert!(!result.outcome.success);
        assert_eq!(result.execution.failed_steps.len(), 1);
        assert_eq!(source_files(&files), before);
        assert!(!result.outcome.rollback_available);
        assert!(result.artifacts.backup_location.is_some());
    }

    #[tokio::test]
    async fn test_scenario_medium_failure_continues() {
        let files = memory(&[
            ("src/a.ts", "function f(x: any) {}"),
            ("src/b.ts", "function g(y: any) {}"),
        ]);
        files.deny_writes("src/a.ts");
        let engine = engine(&files);

        let plan = engine.create_migration_plan(&refactor()).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.steps.iter().all(|s| s.risk_level == RiskLevel::Medium));

        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::Completed);
        assert_eq!(result.execution.warnings.len(), 1);
        assert_eq!(result.outcome.changes_applied, 1);
        assert!(result.outcome.success);
        assert_eq!(files.get("src/b.ts").as_deref(), Some("function g(y: unknown) {}"));
    }

    #[test]
    fn test_scenario_no_matches_no_steps() {
        let files = Arc::new(MemoryFileStore::with_files(
            (0..10).map(|i| (format!("src/m{i}.js"), "export const x = 1;\n")),
        ));
        let engine = engine(&files);

        let plan = engine.create_migration_plan(&refactor()).unwrap();

        assert!(plan.steps.is_empty());
        assert_eq!(plan.risk_assessment.overall_risk, RiskLevel::Low);
        assert!(plan.schedule.milestones.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let files = memory(&[
            ("src/a.js", "var a = 1;"),
            ("src/legacy.js", "const el = ReactDOM.findDOMNode(this.node);"),
            ("package.json", r#"{"dependencies": {"react": "^17.0.2"}}"#),
        ]);
        let before = files.snapshot();
        let engine = engine(&files);
        let config = MigrationConfig::new("17", "18", MigrationType::VersionUpgrade)
            .with_dry_run(true)
            .with_include_tests(true);

        let plan = engine.create_migration_plan(&config).unwrap();
        let steps = plan.steps.len();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(files.write_count(), 0);
        assert_eq!(files.snapshot(), before);
        assert_eq!(result.status(), ExecutionStatus::Completed);
        assert_eq!(result.execution.completed_steps.len(), steps);
        assert_eq!(result.outcome.changes_applied, 0);
        assert!(!result.outcome.rollback_available);
        assert!(result.artifacts.logs.iter().any(|l| l.contains("[dry-run]")));
        assert!(result.artifacts.diff_report.contains("+let a = 1;"));
    }

    #[tokio::test]
    async fn test_rollback_after_rollback_is_noop() {
        let files = memory(&[
            ("src/a.js", "var a = 1;"),
            ("src/legacy.js", "const el = ReactDOM.findDOMNode(this.node);"),
        ]);
        files.deny_writes("src/legacy.js");
        let engine = engine(&files);
        let plan = engine.create_migration_plan(&refactor()).unwrap();
        let id = plan.id.clone();
        engine.execute_migration(plan).await.unwrap();

        files.insert("src/a.js", "edited after rollback");
        assert!(!engine.rollback(&id).await.unwrap());
        assert_eq!(files.get("src/a.js").as_deref(), Some("edited after rollback"));
        assert_eq!(
            engine.get_migration_result(&id).unwrap().status(),
            ExecutionStatus::RolledBack
        );
    }

    #[tokio::test]
    async fn test_manual_rollback_of_completed_run() {
        let files = memory(&[("src/a.js", "var a;\nvar b;\n"), ("src/b.js", "var c;\n")]);
        let before = source_files(&files);
        let engine = engine(&files);
        let plan = engine.create_migration_plan(&refactor()).unwrap();
        let id = plan.id.clone();

        let result = engine.execute_migration(plan).await.unwrap();
        assert_eq!(result.status(), ExecutionStatus::Completed);
        assert!(result.outcome.rollback_available);
        assert_eq!(result.artifacts.metrics.get("rollback_depth"), Some(&3.0));
        assert_eq!(files.get("src/a.js").as_deref(), Some("let a;\nlet b;\n"));

        assert!(engine.rollback(&id).await.unwrap());
        assert_eq!(source_files(&files), before);
        let stored = engine.get_migration_result(&id).unwrap();
        assert_eq!(stored.status(), ExecutionStatus::RolledBack);
        assert!(!stored.outcome.rollback_available);

        assert!(!engine.rollback(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_rollback_disabled_keeps_no_records() {
        let files = memory(&[("src/a.js", "var a;")]);
        let engine = engine(&files);
        let plan = engine
            .create_migration_plan(&refactor().with_rollback(false))
            .unwrap();
        let id = plan.id.clone();

        let result = engine.execute_migration(plan).await.unwrap();
        assert!(!result.outcome.rollback_available);
        assert!(!engine.rollback(&id).await.unwrap());
        assert_eq!(files.get("src/a.js").as_deref(), Some("let a;"));
    }

    #[tokio::test]
    async fn test_config_change_is_removed_on_rollback() {
        let files = memory(&[
            ("src/a.js", "var a;"),
            ("package.json", r#"{"dependencies":{}}"#),
        ]);
        let engine = engine(&files);
        let plan = engine
            .create_migration_plan(&MigrationConfig::new("17", "18", MigrationType::VersionUpgrade))
            .unwrap();
        let id = plan.id.clone();

        let result = engine.execute_migration(plan).await.unwrap();
        assert_eq!(result.status(), ExecutionStatus::Completed);
        let tsconfig: serde_json::Value =
            serde_json::from_str(&files.get("tsconfig.json").unwrap()).unwrap();
        assert_eq!(tsconfig["codemig"]["targetVersion"], 18);

        assert!(engine.rollback(&id).await.unwrap());
        assert!(files.get("tsconfig.json").is_none());
        assert_eq!(files.get("package.json").as_deref(), Some(r#"{"dependencies":{}}"#));
        assert_eq!(files.get("src/a.js").as_deref(), Some("var a;"));
    }

    struct SlowDependencies;

    impl DependencyManager for SlowDependencies {
        fn update_manifest(&self, _step: &MigrationStep) -> Result<(), CollaboratorError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collaborator_timeout_is_step_failure() {
        let files = memory(&[("package.json", r#"{"name": "app"}"#)]);
        let mut settings = EngineSettings::default();
        settings.execution.collaborator_timeout_ms = 50;
        let engine = engine_with(&files, settings, |c| {
            c.with_dependency_manager(Arc::new(SlowDependencies))
        });

        let plan = engine
            .create_migration_plan(&MigrationConfig::new("1", "2", MigrationType::DependencyUpdate))
            .unwrap();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::Completed);
        assert_eq!(result.execution.failed_steps.len(), 1);
        assert!(result.execution.errors[0].contains("timed out after 50ms"));
        assert_eq!(result.execution.warnings.len(), 1);
    }

    /// Sleeps through the first write to `slow`.
    struct SlowFirstWrite {
        inner: Arc<MemoryFileStore>,
        slow: &'static str,
        slept: AtomicBool,
    }

    impl FileStore for SlowFirstWrite {
        fn read(&self, path: &Utf8Path) -> Result<String, ScanError> {
            self.inner.read(path)
        }

        fn write(&self, path: &Utf8Path, content: &str) -> Result<(), ScanError> {
            if path.as_str() == self.slow && !self.slept.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.inner.write(path, content)
        }

        fn remove(&self, path: &Utf8Path) -> Result<(), ScanError> {
            self.inner.remove(path)
        }

        fn exists(&self, path: &Utf8Path) -> bool {
            self.inner.exists(path)
        }
    }

    #[tokio::test]
    async fn test_timed_out_write_cannot_land_after_rollback() {
        let original = "const el = ReactDOM.findDOMNode(this.node);";
        let files = memory(&[("src/legacy.js", original)]);
        let slow = Arc::new(SlowFirstWrite {
            inner: Arc::clone(&files),
            slow: "src/legacy.js",
            slept: AtomicBool::new(false),
        });
        let mut settings = EngineSettings::default();
        settings.execution.collaborator_timeout_ms = 50;
        let engine = engine_with(&files, settings, |mut c| {
            c.store = slow;
            c
        });

        let plan = engine.create_migration_plan(&refactor()).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].risk_level, RiskLevel::Critical);
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::RolledBack);
        assert!(result.execution.errors[0].contains("timed out after 50ms"));
        assert_eq!(files.get("src/legacy.js").as_deref(), Some(original));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(files.get("src/legacy.js").as_deref(), Some(original));
    }

    /// Rejects the syntax of one file.
    struct RejectFile(&'static str);

    impl Validator for RejectFile {
        fn check_syntax(
            &self,
            step: &MigrationStep,
            _content: &str,
            _rule: &ValidationRule,
        ) -> Result<(), String> {
            if step.file_path.as_str() == self.0 {
                Err("rejected".to_owned())
            } else {
                Ok(())
            }
        }

        fn check_semantics(
            &self,
            _step: &MigrationStep,
            _content: &str,
            _rule: &ValidationRule,
        ) -> Result<(), String> {
            Ok(())
        }

        fn check_performance(
            &self,
            _step: &MigrationStep,
            _content: &str,
            _rule: &ValidationRule,
        ) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_validation_restores_the_file() {
        let files = memory(&[
            ("src/a.ts", "function f(x: any) {}"),
            ("src/b.ts", "function g(y: any) {}"),
        ]);
        let engine = engine_with(&files, EngineSettings::default(), |c| {
            c.with_validator(Arc::new(RejectFile("src/a.ts")))
        });

        let plan = engine.create_migration_plan(&refactor()).unwrap();
        assert_eq!(plan.steps[0].file_path, "src/a.ts");
        let failing = plan.steps[0].id.clone();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::Completed);
        assert_eq!(result.execution.failed_steps, vec![failing]);
        assert_eq!(result.outcome.changes_applied, 1);
        assert_eq!(files.get("src/a.ts").as_deref(), Some("function f(x: any) {}"));
        assert_eq!(files.get("src/b.ts").as_deref(), Some("function g(y: unknown) {}"));
        assert!(!result.artifacts.diff_report.contains("src/a.ts"));
        assert_eq!(result.artifacts.metrics.get("rollback_depth"), Some(&1.0));
    }

    struct CancellingDependencies(CancellationToken);

    impl DependencyManager for CancellingDependencies {
        fn update_manifest(&self, _step: &MigrationStep) -> Result<(), CollaboratorError> {
            self.0.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_between_steps_rolls_back() {
        let files = memory(&[("src/a.js", "var a;")]);
        let token = CancellationToken::new();
        let cancelling = Arc::new(CancellingDependencies(token.clone()));
        let engine = engine_with(&files, EngineSettings::default(), |c| {
            c.with_dependency_manager(cancelling)
        });

        let plan = engine
            .create_migration_plan(&MigrationConfig::new("17", "18", MigrationType::VersionUpgrade))
            .unwrap();
        assert_eq!(plan.steps.len(), 3);
        let result = engine
            .execute_migration_with_cancel(plan, token)
            .await
            .unwrap();

        assert_eq!(result.status(), ExecutionStatus::RolledBack);
        assert_eq!(result.execution.completed_steps.len(), 2);
        assert!(result.execution.errors.iter().any(|e| e.contains("cancelled")));
        assert_eq!(files.get("src/a.js").as_deref(), Some("var a;"));
        assert!(files.get("tsconfig.json").is_none());
        assert!(engine.get_active_migrations().is_empty());
    }

    #[tokio::test]
    async fn test_moderate_safety_leaves_failed_run_in_place() {
        let files = memory(&[
            ("src/a.js", "var a = 1;"),
            ("src/legacy.js", "const el = ReactDOM.findDOMNode(this.node);"),
        ]);
        files.deny_writes("src/legacy.js");
        let engine = engine(&files);
        let config = refactor().with_safety_level(SafetyLevel::Moderate);

        let plan = engine.create_migration_plan(&config).unwrap();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert!(result.outcome.rollback_available);
        assert_eq!(files.get("src/a.js").as_deref(), Some("let a = 1;"));
    }

    #[tokio::test]
    async fn test_test_phase_counts() {
        let files = memory(&[("src/a.js", "var a;"), ("src/a.test.js", "test('a', () => {});")]);
        let engine = engine_with(&files, EngineSettings::default(), |c| {
            c.with_test_runner(Arc::new(FixedTestRunner::new(4, 1)))
        });
        let config = refactor().with_include_tests(true);

        let plan = engine.create_migration_plan(&config).unwrap();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.outcome.tests_passed, 4);
        assert_eq!(result.outcome.tests_failed, 1);
        assert!(result.execution.warnings.iter().any(|w| w.contains("1 tests failed")));
        assert!(result.outcome.success);
    }

    #[tokio::test]
    async fn test_stale_file_fails_step() {
        let files = memory(&[("src/a.js", "var a;")]);
        let engine = engine(&files);
        let plan = engine.create_migration_plan(&refactor()).unwrap();

        files.insert("src/a.js", "var a; // edited");
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.execution.failed_steps.len(), 1);
        assert!(result.execution.errors[0].contains("changed since the plan was created"));
        assert_eq!(files.get("src/a.js").as_deref(), Some("var a; // edited"));
    }

    #[test]
    fn test_plans_are_deterministic_except_identity() {
        let files = memory(&[
            ("src/a.js", "var a; var b; var c;"),
            ("src/b.js", "var d; var e; var f;"),
            ("src/c.ts", "let x: any = 1;"),
        ]);
        let engine = engine(&files);

        let first = engine.create_migration_plan(&refactor()).unwrap();
        let second = engine.create_migration_plan(&refactor()).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.steps, second.steps);
        assert_eq!(first.schedule, second.schedule);
        assert_eq!(first.schedule.milestones.len(), 2);
        assert_eq!(first.schedule.rollback_points, vec!["milestone-0"]);
        let total: u64 = first.steps.iter().map(|s| s.estimated_time).sum();
        assert_eq!(first.schedule.estimated_duration, total);
    }

    #[test]
    fn test_critical_step_makes_plan_critical() {
        let files = memory(&[
            ("src/a.js", "var a;"),
            ("src/legacy.js", "const el = ReactDOM.findDOMNode(this.node);"),
        ]);
        let plan = engine(&files).create_migration_plan(&refactor()).unwrap();

        assert_eq!(plan.risk_assessment.overall_risk, RiskLevel::Critical);
        assert_eq!(plan.risk_assessment.critical_steps, 1);
        assert_eq!(plan.impact.breaking_changes, 1);
        assert!(plan.impact.deprecated_features.contains(&"ReactDOM.findDOMNode".to_owned()));
    }

    #[tokio::test]
    async fn test_report_for_finished_run() {
        let files = memory(&[("src/a.js", "var a;")]);
        let engine = engine(&files);
        let plan = engine.create_migration_plan(&refactor()).unwrap();
        let id = plan.id.clone();
        engine.execute_migration(plan).await.unwrap();

        let report = engine.generate_migration_report(&id).unwrap();
        assert!(report.starts_with(&format!("Migration Report: {id}")));
        assert!(report.contains("Status:  completed"));
        assert!(report.contains("Available: yes"));
        assert!(report.contains("+let a;"));

        assert!(matches!(
            engine.generate_migration_report("missing"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_and_remove_patterns() {
        let files = memory(&[]);
        let engine = engine(&files);
        let builtin = engine.get_available_patterns().len();

        let pattern = MigrationPattern::new(
            "moment-to-dayjs",
            "moment to dayjs",
            PatternCategory::Dependency,
            Matcher::literal("from 'moment'"),
            Transform::Replace("from 'dayjs'".to_owned()),
        )
        .with_example("import m from 'moment';", "import m from 'dayjs';");
        engine.add_custom_pattern(pattern.clone()).unwrap();
        assert_eq!(engine.get_available_patterns().len(), builtin + 1);

        assert!(matches!(
            engine.add_custom_pattern(pattern),
            Err(EngineError::Pattern(PatternError::Duplicate(_)))
        ));

        let removed = engine.remove_pattern("moment-to-dayjs").unwrap();
        assert_eq!(removed.id, "moment-to-dayjs");
        assert!(engine.remove_pattern("moment-to-dayjs").is_err());
        assert_eq!(engine.pattern_summaries().len(), builtin);
    }

    #[tokio::test]
    async fn test_running_migration_is_rejected() {
        let files = memory(&[("src/a.js", "var a;")]);
        let engine = engine(&files);
        let plan = engine.create_migration_plan(&refactor()).unwrap();
        engine
            .active
            .lock()
            .insert(plan.id.clone(), CancellationToken::new());

        assert_eq!(engine.get_active_migrations(), vec![plan.id.clone()]);
        assert!(engine.cancel(&plan.id));
        assert!(matches!(
            engine.execute_migration(plan).await,
            Err(EngineError::AlreadyRunning(_))
        ));
        assert!(!engine.cancel("unknown"));
    }

    #[tokio::test]
    async fn test_migrate_respects_auto_apply() {
        let files = memory(&[("src/a.js", "var a;")]);
        let engine = engine(&files);

        let (_, result) = engine.migrate(&refactor()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(files.get("src/a.js").as_deref(), Some("var a;"));

        let (plan, result) = engine.migrate(&refactor().with_auto_apply(true)).await.unwrap();
        assert_eq!(result.unwrap().id, plan.id);
        assert_eq!(files.get("src/a.js").as_deref(), Some("let a;"));
    }

    #[tokio::test]
    async fn test_filesystem_project_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/app.js"), "const a = require('a');\nvar b = 1;\n").unwrap();
        std::fs::write(root.join("package.json"), r#"{"dependencies": {"react": "^17.0.2"}}"#).unwrap();

        let settings = EngineSettings::default();
        let collaborators = Collaborators::filesystem(&root, &settings.execution)
            .unwrap()
            .with_test_runner(Arc::new(FixedTestRunner::new(1, 0)));
        let engine = MigrationEngine::new(collaborators, settings).unwrap();
        let config = MigrationConfig::new("17", "18", MigrationType::VersionUpgrade);

        let plan = engine.create_migration_plan(&config).unwrap();
        let id = plan.id.clone();
        let result = engine.execute_migration(plan).await.unwrap();

        assert_eq!(result.status(), ExecutionStatus::Completed);
        let app = std::fs::read_to_string(root.join("src/app.js")).unwrap();
        assert_eq!(app, "import a from 'a';\nlet b = 1;\n");
        let backup = result.artifacts.backup_location.clone().unwrap();
        assert!(backup.contains(&id));
        assert!(root.join(".codemig/backups").join(&id).join("src/app.js").exists());

        assert!(engine.rollback(&id).await.unwrap());
        let app = std::fs::read_to_string(root.join("src/app.js")).unwrap();
        assert_eq!(app, "const a = require('a');\nvar b = 1;\n");
        assert!(!root.join("tsconfig.json").exists());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let files = memory(&[]);
        let mut settings = EngineSettings::default();
        settings.schedule.milestone_size = 0;
        let collaborators = Collaborators::in_memory(&files, &settings.execution);
        assert!(matches!(
            MigrationEngine::new(collaborators, settings),
            Err(EngineError::Config(_))
        ));
    }
}
