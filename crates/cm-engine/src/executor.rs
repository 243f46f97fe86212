//! Execution coordinator.
//!
//! Runs a plan's steps strictly in order and records everything in a
//! [`MigrationResult`]. Each collaborator call runs on the blocking pool
//! under the configured timeout; the coordinator awaits it before moving on,
//! so at most one call touches the file tree at a time. A call that times
//! out fails its step but is still waited for before the next call or an
//! unwind starts, so a late write can never land after a later one.
//!
//! # Failure policy
//!
//! A step that fails after its rollback record was pushed has that record
//! restored right away, so a failed step never leaves a partial write
//! behind. A failed low or medium risk step is recorded and skipped. A failed high or
//! critical risk step, or a cancellation observed between steps, aborts the
//! run. An aborted run is rolled back when the config asks for it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::Utc;
use cm_core::{
    ExecutionPolicy, ExecutionStatus, MigrationConfig, MigrationPlan, MigrationResult,
    MigrationStep, StepType,
};
use cm_scanner::{FileStore, ScanError};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collaborators::Collaborators;
use crate::error::{CollaboratorError, StepError};
use crate::report::diff_hunk;
use crate::rollback::{RollbackManager, RollbackRecord, restore};
use crate::validation::{Diagnostic, ValidationRunner};

/// Drives one plan at a time through its steps.
pub struct Executor {
    collaborators: Collaborators,
    validation: ValidationRunner,
    rollback: Arc<RollbackManager>,
    policy: ExecutionPolicy,
    /// Timed-out calls that have not finished yet.
    overdue: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    /// Creates an executor sharing `rollback` with its owner.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        rollback: Arc<RollbackManager>,
        policy: ExecutionPolicy,
    ) -> Self {
        let validation = ValidationRunner::new(
            Arc::clone(&collaborators.validator),
            Arc::clone(&collaborators.tests),
        );
        Self {
            collaborators,
            validation,
            rollback,
            policy,
            overdue: Mutex::new(Vec::new()),
        }
    }

    /// Runs `f` on the blocking pool, bounded by the collaborator timeout.
    ///
    /// Earlier calls that timed out are waited for first. A call that times
    /// out is kept as overdue; its result is dropped once it finishes.
    async fn call<T, F>(&self, f: F) -> Result<T, CollaboratorError>
    where
        F: FnOnce() -> Result<T, CollaboratorError> + Send + 'static,
        T: Send + 'static,
    {
        self.settle().await;

        let timeout_ms = self.policy.collaborator_timeout_ms;
        let mut handle = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(CollaboratorError::Join(join.to_string())),
            Err(_) => {
                warn!(timeout_ms, "Collaborator call timed out, waiting for it before the next call");
                let waiter = tokio::spawn(async move {
                    if let Err(e) = handle.await {
                        warn!(error = %e, "Overdue collaborator call failed");
                    }
                });
                self.overdue.lock().push(waiter);
                Err(CollaboratorError::TimedOut(timeout_ms))
            }
        }
    }

    /// Waits until every overdue call has finished.
    async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.overdue.lock());
            if pending.is_empty() {
                return;
            }
            debug!(calls = pending.len(), "Waiting for overdue collaborator calls");
            for waiter in pending {
                if let Err(e) = waiter.await {
                    warn!(error = %e, "Overdue call waiter failed");
                }
            }
        }
    }

    /// Executes `plan` until it completes, aborts, or `cancel` fires.
    ///
    /// Expected failures never surface as errors; they end up in the
    /// result's status, errors and warnings.
    pub async fn execute(&self, plan: MigrationPlan, cancel: &CancellationToken) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult::new(plan);
        let id = result.id.clone();
        let config = result.plan.config.clone();
        let steps = result.plan.steps.clone();
        let touched = result.plan.risk_assessment.backup_requirements.clone();

        result.execution.start_time = Some(Utc::now());
        result.execution.transition(ExecutionStatus::Running);
        result.log(format!(
            "Starting migration {id}: {} steps{}",
            steps.len(),
            if config.dry_run { " [dry-run]" } else { "" }
        ));
        info!(migration_id = %id, steps = steps.len(), dry_run = config.dry_run, "Starting migration");

        result.outcome.performance_before = self.measure(&touched).await;

        if config.backup_enabled && !config.dry_run && !self.backup(&mut result).await {
            result.execution.transition(ExecutionStatus::Failed);
            self.finish(&mut result, &config, started);
            return result;
        }

        let mut aborted = false;
        for step in &steps {
            if cancel.is_cancelled() {
                warn!(migration_id = %id, step = %step.id, "Migration cancelled");
                result
                    .execution
                    .errors
                    .push(format!("Migration cancelled before step {}", step.id));
                result.log(format!("Cancelled before step {}", step.id));
                aborted = true;
                break;
            }

            match self.run_step(&id, step, config.dry_run).await {
                Ok(diagnostics) => {
                    result.execution.completed_steps.push(step.id.clone());
                    if config.dry_run {
                        result.log(format!("[dry-run] Validated step {}: {}", step.id, step.description));
                    } else {
                        result.outcome.changes_applied += 1;
                        result.log(format!("Applied step {}: {}", step.id, step.description));
                    }
                    result
                        .execution
                        .warnings
                        .extend(diagnostics.iter().map(Diagnostic::to_string));
                }
                Err(e) => {
                    result.execution.failed_steps.push(step.id.clone());
                    result.execution.errors.push(e.to_string());
                    if step.risk_level.aborts_on_failure() {
                        error!(step = %step.id, risk = %step.risk_level, error = %e, "Step failed, aborting");
                        result.log(format!("Step {} failed ({} risk), aborting", step.id, step.risk_level));
                        aborted = true;
                        break;
                    }
                    warn!(step = %step.id, risk = %step.risk_level, error = %e, "Step failed, continuing");
                    result.execution.warnings.push(format!(
                        "Step {} failed ({} risk), continuing: {e}",
                        step.id, step.risk_level
                    ));
                }
            }
        }

        if aborted {
            result.execution.transition(ExecutionStatus::Failed);
            if config.rolls_back_on_abort() && !config.dry_run {
                self.unwind(&mut result).await;
            }
        } else {
            if config.include_tests && !config.dry_run {
                self.run_tests(&mut result).await;
            }
            result.execution.transition(ExecutionStatus::Completed);
            result.outcome.success = true;
        }

        result.outcome.performance_after = self.measure(&touched).await;
        self.finish(&mut result, &config, started);
        result
    }

    async fn backup(&self, result: &mut MigrationResult) -> bool {
        let backup = Arc::clone(&self.collaborators.backup);
        let plan = result.plan.clone();
        match self.call(move || backup.create_backup(&plan)).await {
            Ok(location) => {
                result.log(format!("Backup created at {location}"));
                result.artifacts.backup_location = Some(location);
                true
            }
            Err(e) => {
                error!(migration_id = %result.id, error = %e, "Backup failed");
                result.execution.errors.push(format!("Backup failed: {e}"));
                result.log("Backup failed, no steps were run");
                false
            }
        }
    }

    /// Records, applies and validates one step.
    ///
    /// If the step fails after its record was pushed, the record is popped
    /// and restored before the error is returned.
    async fn run_step(
        &self,
        migration_id: &str,
        step: &MigrationStep,
        dry_run: bool,
    ) -> Result<Vec<Diagnostic>, StepError> {
        let fail = |e: CollaboratorError| StepError::from_collaborator(&step.id, e);

        if dry_run {
            debug!(step = %step.id, "Dry run, validating only");
            return self
                .validation
                .validate_step(step, step.transformed_content.as_deref());
        }

        let mut recorded = false;
        if writes_file(step) {
            let current = self.read_current(step.file_path.clone()).await.map_err(fail)?;
            if step.step_type == StepType::CodeTransformation && current != step.original_content {
                return Err(fail(CollaboratorError::Failed(format!(
                    "{} changed since the plan was created",
                    step.file_path
                ))));
            }
            self.rollback.push(
                migration_id,
                RollbackRecord {
                    step_id: step.id.clone(),
                    file_path: step.file_path.clone(),
                    original_content: current,
                },
            );
            recorded = true;
        }

        let outcome = self.apply_step(step).await;
        if outcome.is_err() && recorded {
            self.undo_step(migration_id, step).await;
        }
        outcome
    }

    /// Applies one step through its collaborator, then validates the result.
    async fn apply_step(&self, step: &MigrationStep) -> Result<Vec<Diagnostic>, StepError> {
        let fail = |e: CollaboratorError| StepError::from_collaborator(&step.id, e);
        let store = Arc::clone(&self.collaborators.store);
        let owned = step.clone();
        match (step.step_type, step.transformed_content.clone()) {
            (StepType::DependencyUpdate, _) => {
                let dependencies = Arc::clone(&self.collaborators.dependencies);
                self.call(move || dependencies.update_manifest(&owned))
                    .await
                    .map_err(fail)?;
            }
            (StepType::ConfigChange, _) => {
                let config = Arc::clone(&self.collaborators.config);
                self.call(move || config.update_config(&owned))
                    .await
                    .map_err(fail)?;
            }
            (StepType::TestUpdate, None) => {
                debug!(step = %step.id, "Test update has no content, nothing to write");
            }
            (StepType::FileOperation, None) => {
                self.call(move || store.remove(&owned.file_path).map_err(Into::into))
                    .await
                    .map_err(fail)?;
            }
            (_, Some(content)) => {
                self.call(move || store.write(&owned.file_path, &content).map_err(Into::into))
                    .await
                    .map_err(fail)?;
            }
            (StepType::CodeTransformation, None) => {
                return Err(fail(CollaboratorError::Failed(
                    "code transformation without transformed content".to_owned(),
                )));
            }
        }

        let content = match step.step_type {
            StepType::DependencyUpdate | StepType::ConfigChange => {
                self.read_current(step.file_path.clone()).await.map_err(fail)?
            }
            _ => step.transformed_content.clone(),
        };
        self.validation.validate_step(step, content.as_deref())
    }

    /// Pops the failed step's record and restores it. Failures are logged.
    async fn undo_step(&self, migration_id: &str, step: &MigrationStep) {
        let Some(record) = self.rollback.pop_step(migration_id, &step.id) else {
            return;
        };
        let store = Arc::clone(&self.collaborators.store);
        let path = record.file_path.clone();
        match self
            .call(move || restore(&record, store.as_ref()).map_err(Into::into))
            .await
        {
            Ok(()) => debug!(step = %step.id, path = %path, "Restored file of failed step"),
            Err(e) => warn!(step = %step.id, path = %path, error = %e, "Failed to restore file of failed step"),
        }
    }

    /// Reads a file, mapping a missing file to `None`.
    async fn read_current(&self, path: Utf8PathBuf) -> Result<Option<String>, CollaboratorError> {
        let store = Arc::clone(&self.collaborators.store);
        self.call(move || match store.read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(ScanError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn run_tests(&self, result: &mut MigrationResult) {
        let runner = self.validation.clone();
        match self.call(move || runner.run_test_suite()).await {
            Ok(report) => {
                result.outcome.tests_passed = report.passed;
                result.outcome.tests_failed = report.failed;
                result.log(format!(
                    "Tests: {} passed, {} failed",
                    report.passed, report.failed
                ));
                if report.failed > 0 {
                    result
                        .execution
                        .warnings
                        .push(format!("{} tests failed after migration", report.failed));
                }
            }
            Err(e) => {
                warn!(migration_id = %result.id, error = %e, "Test phase failed");
                result.execution.warnings.push(format!("Test phase failed: {e}"));
            }
        }
    }

    /// Unwinds the migration's rollback stack and marks it rolled back.
    ///
    /// Restore failures are logged to the result and do not stop the unwind.
    /// Returns `false` if the unwind task itself failed.
    pub(crate) async fn unwind(&self, result: &mut MigrationResult) -> bool {
        self.settle().await;
        let rollback = Arc::clone(&self.rollback);
        let store: Arc<dyn FileStore> = Arc::clone(&self.collaborators.store);
        let id = result.id.clone();
        let report = match tokio::task::spawn_blocking(move || rollback.rollback(&id, store.as_ref())).await {
            Ok(report) => report,
            Err(e) => {
                error!(migration_id = %result.id, error = %e, "Rollback task failed");
                result.log(format!("Rollback failed: {e}"));
                return false;
            }
        };

        for failure in &report.failures {
            result.log(format!("Rollback: {failure}"));
        }
        result.log(format!(
            "Rolled back {} steps ({} failed restores)",
            report.restored.len(),
            report.failures.len()
        ));
        result.execution.transition(ExecutionStatus::RolledBack);
        result.outcome.rollback_available = false;
        true
    }

    async fn measure(&self, paths: &[Utf8PathBuf]) -> BTreeMap<String, f64> {
        let store = Arc::clone(&self.collaborators.store);
        let paths = paths.to_vec();
        let totals = self
            .call(move || {
                let (mut bytes, mut lines, mut files) = (0usize, 0usize, 0usize);
                for path in &paths {
                    if let Ok(content) = store.read(path) {
                        bytes += content.len();
                        lines += content.lines().count();
                        files += 1;
                    }
                }
                Ok((bytes, lines, files))
            })
            .await;

        match totals {
            Ok((bytes, lines, files)) => metrics([
                ("total_bytes", bytes),
                ("total_lines", lines),
                ("files", files),
            ]),
            Err(e) => {
                warn!(error = %e, "Failed to measure files");
                BTreeMap::new()
            }
        }
    }

    fn finish(&self, result: &mut MigrationResult, config: &MigrationConfig, started: Instant) {
        let id = result.id.clone();
        if result.status() == ExecutionStatus::RolledBack || !config.rollback_enabled {
            self.rollback.discard(&id);
        }
        result.outcome.rollback_available = self.rollback.has_records(&id);

        let mut diff = String::new();
        for step_id in &result.execution.completed_steps {
            let Some(step) = result.plan.step(step_id) else {
                continue;
            };
            if let (StepType::CodeTransformation, Some(before), Some(after)) = (
                step.step_type,
                step.original_content.as_deref(),
                step.transformed_content.as_deref(),
            ) {
                diff.push_str(&diff_hunk(step.file_path.as_str(), before, after));
            }
        }
        result.artifacts.diff_report = diff;

        let elapsed = started.elapsed();
        result.artifacts.metrics = metrics([
            ("steps_total", result.plan.steps.len()),
            ("steps_completed", result.execution.completed_steps.len()),
            ("steps_failed", result.execution.failed_steps.len()),
            ("rollback_depth", self.rollback.depth(&id)),
        ]);
        result
            .artifacts
            .metrics
            .insert("duration_ms".to_owned(), elapsed.as_secs_f64() * 1000.0);

        result.execution.end_time = Some(Utc::now());
        let status = result.status();
        result.log(format!("Migration {id} finished: {}", status.label()));
        info!(
            migration_id = %id,
            status = status.label(),
            completed = result.execution.completed_steps.len(),
            failed = result.execution.failed_steps.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Migration finished"
        );
    }
}

/// Steps that change a file on disk and therefore get a rollback record.
fn writes_file(step: &MigrationStep) -> bool {
    match step.step_type {
        StepType::CodeTransformation
        | StepType::FileOperation
        | StepType::DependencyUpdate
        | StepType::ConfigChange => true,
        StepType::TestUpdate => step.transformed_content.is_some(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn metrics<const N: usize>(values: [(&str, usize); N]) -> BTreeMap<String, f64> {
    values
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v as f64))
        .collect()
}
