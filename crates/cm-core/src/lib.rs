//! Core types, errors, and configuration for the codemig migration engine.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`ConfigError`] for configuration validation failures
//! - [`MigrationConfig`] and [`EngineSettings`] (policy constants exposed as configuration)
//! - Domain types for plans, steps, and results ([`MigrationPlan`], [`MigrationStep`],
//!   [`MigrationResult`])
//! - Type aliases for `FxHashMap`/`FxHashSet` (faster than std)
//!
//! Everything in this crate is plain data: no I/O, no logging, no global state.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{
    AuxiliaryStepPolicy, DowntimeCoefficients, EngineSettings, ExecutionPolicy, MigrationConfig,
    MigrationType, PlanningPolicy, RiskMultipliers, RiskPolicy, SafetyLevel, SchedulePolicy,
};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set};
pub use types::{
    Artifacts, Compatibility, ExecutionRecord, ExecutionStatus, Impact, MigrationPlan,
    MigrationResult, MigrationStep, Milestone, Outcome, PerformanceImpact, RiskAssessment,
    RiskLevel, RuleKind, Schedule, SecurityStatus, Severity, StepId, StepType, ValidationRule,
    ValidationSummary,
};
