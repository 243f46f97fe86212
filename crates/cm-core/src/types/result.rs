//! Migration result types.
//!
//! A [`MigrationResult`] is mutated in place by the execution coordinator
//! during a single run and treated as immutable once its status is terminal.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::MigrationPlan;
use super::step::StepId;

/// Execution state machine.
///
/// ```text
/// pending -> running -> completed
///                    -> failed -> rolled-back
///                    -> rolled-back
/// ```
///
/// A failed run can still be rolled back later by the caller, which is the
/// only transition out of a terminal state.
///
/// # Examples
///
/// ```
/// use cm_core::ExecutionStatus;
///
/// assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Running));
/// assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Running));
/// assert!(ExecutionStatus::Failed.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// Not started.
    #[default]
    Pending,
    /// Steps are being applied.
    Running,
    /// Every step was attempted without an abort.
    Completed,
    /// Aborted, changes left in place.
    Failed,
    /// Aborted and applied changes undone.
    RolledBack,
}

impl ExecutionStatus {
    /// Returns `true` for completed, failed and rolled-back.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }

    /// Returns `true` if moving from `self` to `next` is allowed.
    #[inline]
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed | Self::RolledBack)
                | (Self::Completed | Self::Failed, Self::RolledBack)
        )
    }

    /// Returns the kebab-case label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled-back",
        }
    }
}

/// What happened while executing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// When the run started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub end_time: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Steps applied successfully, in order.
    pub completed_steps: Vec<StepId>,
    /// Steps that failed, in order.
    pub failed_steps: Vec<StepId>,
    /// Tolerated problems.
    pub warnings: Vec<String>,
    /// Step failures and abort reasons.
    pub errors: Vec<String>,
}

impl ExecutionRecord {
    /// Moves to `next` if the state machine allows it.
    ///
    /// Returns `false` and leaves the status unchanged otherwise.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

/// Summary of the run's effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// `true` when the run completed.
    pub success: bool,
    /// Steps whose changes were written.
    pub changes_applied: usize,
    /// Tests that passed in the post-migration phase.
    pub tests_passed: u32,
    /// Tests that failed in the post-migration phase.
    pub tests_failed: u32,
    /// Metrics of the touched files before the run.
    pub performance_before: BTreeMap<String, f64>,
    /// Metrics of the touched files after the run.
    pub performance_after: BTreeMap<String, f64>,
    /// `true` while rollback records for this run are retained.
    pub rollback_available: bool,
}

/// Side products of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    /// Where the pre-run backup was written.
    pub backup_location: Option<String>,
    /// Human readable log lines, in order.
    pub logs: Vec<String>,
    /// Numeric metrics (durations, counts).
    pub metrics: BTreeMap<String, f64>,
    /// Line-oriented diff of applied code transformations.
    pub diff_report: String,
}

/// The result of executing a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Equals the plan id.
    pub id: String,
    /// When the result was created.
    pub timestamp: DateTime<Utc>,
    /// The executed plan.
    pub plan: MigrationPlan,
    /// Execution record.
    pub execution: ExecutionRecord,
    /// Outcome record.
    pub outcome: Outcome,
    /// Artifacts.
    pub artifacts: Artifacts,
}

impl MigrationResult {
    /// Creates a pending result for `plan`.
    #[must_use]
    pub fn new(plan: MigrationPlan) -> Self {
        Self {
            id: plan.id.clone(),
            timestamp: Utc::now(),
            plan,
            execution: ExecutionRecord::default(),
            outcome: Outcome::default(),
            artifacts: Artifacts::default(),
        }
    }

    /// Appends a timestamped line to the artifact log.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let stamp = Utc::now().format("%H:%M:%S%.3f");
        self.artifacts
            .logs
            .push(format!("[{stamp}] {}", message.as_ref()));
    }

    /// Returns the current status.
    #[inline]
    #[must_use]
    pub const fn status(&self) -> ExecutionStatus {
        self.execution.status
    }
}
