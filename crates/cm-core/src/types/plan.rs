//! Migration plan types.
//!
//! A [`MigrationPlan`] is built once by the plan builder, assessor and
//! scheduler and is immutable afterwards.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::risk::RiskLevel;
use super::step::{MigrationStep, StepId};
use crate::config::MigrationConfig;

/// Plan-level risk aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Aggregated risk.
    pub overall_risk: RiskLevel,
    /// Number of critical steps.
    pub critical_steps: usize,
    /// Rollback complexity score.
    pub rollback_complexity: u64,
    /// Estimated downtime in seconds.
    pub estimated_downtime: u64,
    /// Files that must be backed up before execution.
    pub backup_requirements: Vec<Utf8PathBuf>,
}

/// What the plan changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    /// Distinct files touched by any step.
    pub files_affected: usize,
    /// Net line delta across steps with both snapshots.
    pub lines_of_code_changed: i64,
    /// Steps that are critical or announce a breaking change.
    pub breaking_changes: usize,
    /// Features removed by the matched patterns.
    pub deprecated_features: Vec<String>,
    /// Features introduced by the matched patterns.
    pub new_features: Vec<String>,
}

/// Compatibility verdict for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compatibility {
    /// Only low and medium risk changes.
    Compatible,
    /// High-risk changes present.
    NeedsReview,
    /// Critical changes present.
    Incompatible,
}

impl Compatibility {
    /// Maps the worst risk of a group of steps to a verdict.
    #[inline]
    #[must_use]
    pub const fn from_risk(risk: RiskLevel) -> Self {
        match risk {
            RiskLevel::Low | RiskLevel::Medium => Self::Compatible,
            RiskLevel::High => Self::NeedsReview,
            RiskLevel::Critical => Self::Incompatible,
        }
    }
}

/// Coarse performance impact label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceImpact {
    /// No steps.
    #[default]
    None,
    /// Small net change.
    Low,
    /// Moderate net change.
    Medium,
    /// Large net change.
    High,
}

/// Security label for the transformed content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityStatus {
    /// No dangerous APIs introduced.
    #[default]
    Clean,
    /// Transformed content uses dangerous APIs.
    ReviewRequired,
}

/// Plan-level validation summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Percentage of transformed source files with a sibling test file.
    pub test_coverage: f64,
    /// Performance impact label.
    pub performance_impact: PerformanceImpact,
    /// Verdict per target (target version and touched pattern categories).
    pub compatibility: BTreeMap<String, Compatibility>,
    /// Security label.
    pub security: SecurityStatus,
}

/// A fixed-size sequential group of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    /// Milestone id (`milestone-{index}`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Steps in plan order.
    pub step_ids: Vec<StepId>,
    /// Previous milestone, if any.
    pub depends_on: Option<String>,
    /// Sum of the steps' estimated seconds.
    pub estimated_duration: u64,
}

/// Milestones and timing for a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Sum of all step estimates, in seconds.
    pub estimated_duration: u64,
    /// Milestones in order.
    pub milestones: Vec<Milestone>,
    /// Ids of milestones that are safe stopping points.
    pub rollback_points: Vec<String>,
}

/// The full plan for one migration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Plan id; the result of executing the plan shares it.
    pub id: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The request this plan answers.
    pub config: MigrationConfig,
    /// Steps in execution order.
    pub steps: Vec<MigrationStep>,
    /// Risk aggregation.
    pub risk_assessment: RiskAssessment,
    /// Impact summary.
    pub impact: Impact,
    /// Validation summary.
    pub validation: ValidationSummary,
    /// Milestones and timing.
    pub schedule: Schedule,
}

impl MigrationPlan {
    /// Returns the step with the given id.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&MigrationStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Returns `true` if the plan has no steps.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
