//! Domain types for the migration engine.
//!
//! # Module Organization
//!
//! - [`risk`] - Risk levels
//! - [`step`] - Migration steps and their validation rules
//! - [`plan`] - Migration plans with risk, impact, validation and schedule
//! - [`result`] - Execution results and the status state machine
//!
//! All public types are re-exported here and at the crate root:
//!
//! ```
//! use cm_core::{MigrationPlan, MigrationStep, RiskLevel, ExecutionStatus};
//! ```

pub mod plan;
pub mod result;
pub mod risk;
pub mod step;

pub use plan::{
    Compatibility, Impact, MigrationPlan, Milestone, PerformanceImpact, RiskAssessment, Schedule,
    SecurityStatus, ValidationSummary,
};
pub use result::{Artifacts, ExecutionRecord, ExecutionStatus, MigrationResult, Outcome};
pub use risk::RiskLevel;
pub use step::{MigrationStep, RuleKind, Severity, StepId, StepType, ValidationRule};
