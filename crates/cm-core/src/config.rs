//! Configuration structures for the migration engine.
//!
//! This module provides two kinds of configuration:
//!
//! - [`MigrationConfig`] - the per-request input supplied by the caller
//!   (versions, migration type, safety level, flags, path globs)
//! - [`EngineSettings`] - engine-wide policy: risk heuristics, milestone size,
//!   auxiliary step estimates, collaborator timeouts
//!
//! The numbers in [`RiskPolicy`] and [`PlanningPolicy`] are heuristics, not
//! derived constants. They are exposed here so deployments can tune them.
//! All types implement [`Default`] and deserialize with missing fields filled
//! from the defaults.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::RiskLevel;

/// The kind of migration being planned.
///
/// Determines which auxiliary steps the plan builder appends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationType {
    /// Upgrade the project to a newer version of its stack.
    #[default]
    VersionUpgrade,
    /// Move from one framework to another.
    FrameworkMigration,
    /// Restructure code without changing its stack.
    ArchitectureRefactor,
    /// Bump or replace third-party dependencies.
    DependencyUpdate,
    /// Apply a known breaking change across the codebase.
    BreakingChange,
}

impl MigrationType {
    /// Returns `true` if plans of this type touch the package manifest.
    ///
    /// # Examples
    ///
    /// ```
    /// use cm_core::MigrationType;
    ///
    /// assert!(MigrationType::DependencyUpdate.needs_dependency_update());
    /// assert!(!MigrationType::ArchitectureRefactor.needs_dependency_update());
    /// ```
    #[inline]
    #[must_use]
    pub const fn needs_dependency_update(self) -> bool {
        matches!(
            self,
            Self::DependencyUpdate | Self::VersionUpgrade | Self::FrameworkMigration
        )
    }

    /// Returns `true` if plans of this type touch the build configuration.
    #[inline]
    #[must_use]
    pub const fn needs_config_change(self) -> bool {
        matches!(self, Self::FrameworkMigration | Self::VersionUpgrade)
    }

    /// Returns the kebab-case label used in JSON and reports.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::VersionUpgrade => "version-upgrade",
            Self::FrameworkMigration => "framework-migration",
            Self::ArchitectureRefactor => "architecture-refactor",
            Self::DependencyUpdate => "dependency-update",
            Self::BreakingChange => "breaking-change",
        }
    }
}

/// How cautious the executor is when a migration aborts.
///
/// Only [`SafetyLevel::Conservative`] triggers an automatic rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyLevel {
    /// Roll back automatically on abort.
    #[default]
    Conservative,
    /// Leave partial changes in place on abort.
    Moderate,
    /// Leave partial changes in place on abort.
    Aggressive,
}

impl SafetyLevel {
    /// Returns the kebab-case label used in JSON and reports.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
        }
    }
}

/// A migration request.
///
/// Immutable input owned by the caller. Paths are relative to the root the
/// file scanner and file store were created with.
///
/// # Examples
///
/// ```
/// use cm_core::{MigrationConfig, MigrationType, SafetyLevel};
///
/// let config = MigrationConfig::new("17.0.2", "18.2.0", MigrationType::VersionUpgrade)
///     .with_safety_level(SafetyLevel::Conservative)
///     .with_include_tests(true);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.manifest_path, "package.json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Version the codebase is migrating from.
    pub source_version: String,
    /// Version the codebase is migrating to.
    pub target_version: String,
    /// Kind of migration.
    pub migration_type: MigrationType,
    /// Abort policy.
    pub safety_level: SafetyLevel,
    /// Execute the plan immediately after creating it (see `MigrationEngine::migrate`).
    pub auto_apply: bool,
    /// Validate and report without writing anything.
    pub dry_run: bool,
    /// Snapshot touched files before the first step runs.
    pub backup_enabled: bool,
    /// Keep rollback records so applied steps can be undone.
    pub rollback_enabled: bool,
    /// Scan test files and run the post-migration test phase.
    pub include_tests: bool,
    /// Globs selecting the files to scan. Empty means everything.
    pub include: Vec<String>,
    /// Globs removing files from the scan.
    pub exclude: Vec<String>,
    /// Package manifest touched by the dependency-update step.
    pub manifest_path: Utf8PathBuf,
    /// Build/type configuration touched by the config-change step.
    pub build_config_path: Utf8PathBuf,
    /// Dotted-key settings written by the config-change step.
    pub config_overrides: BTreeMap<String, String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_version: String::new(),
            target_version: String::new(),
            migration_type: MigrationType::default(),
            safety_level: SafetyLevel::default(),
            auto_apply: false,
            dry_run: false,
            backup_enabled: true,
            rollback_enabled: true,
            include_tests: false,
            include: Vec::new(),
            exclude: vec!["node_modules/**".to_owned(), "dist/**".to_owned()],
            manifest_path: Utf8PathBuf::from("package.json"),
            build_config_path: Utf8PathBuf::from("tsconfig.json"),
            config_overrides: BTreeMap::new(),
        }
    }
}

impl MigrationConfig {
    /// Creates a configuration with default flags for the given versions and type.
    #[must_use]
    pub fn new(
        source_version: impl Into<String>,
        target_version: impl Into<String>,
        migration_type: MigrationType,
    ) -> Self {
        Self {
            source_version: source_version.into(),
            target_version: target_version.into(),
            migration_type,
            ..Self::default()
        }
    }

    /// Sets the safety level.
    #[must_use]
    pub const fn with_safety_level(mut self, level: SafetyLevel) -> Self {
        self.safety_level = level;
        self
    }

    /// Enables or disables dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enables or disables the pre-run backup.
    #[must_use]
    pub const fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    /// Enables or disables rollback records.
    #[must_use]
    pub const fn with_rollback(mut self, enabled: bool) -> Self {
        self.rollback_enabled = enabled;
        self
    }

    /// Enables or disables test files and the test phase.
    #[must_use]
    pub const fn with_include_tests(mut self, include_tests: bool) -> Self {
        self.include_tests = include_tests;
        self
    }

    /// Enables or disables immediate execution after planning.
    #[must_use]
    pub const fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    /// Adds include globs.
    #[must_use]
    pub fn with_include(mut self, globs: &[&str]) -> Self {
        self.include.extend(globs.iter().map(ToString::to_string));
        self
    }

    /// Adds exclude globs.
    #[must_use]
    pub fn with_exclude(mut self, globs: &[&str]) -> Self {
        self.exclude.extend(globs.iter().map(ToString::to_string));
        self
    }

    /// Returns `true` if an aborted run should be rolled back automatically.
    #[inline]
    #[must_use]
    pub fn rolls_back_on_abort(&self) -> bool {
        self.rollback_enabled && self.safety_level == SafetyLevel::Conservative
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a version is empty, a version upgrade does
    /// not change the version, a glob fails to compile, or a collaborator
    /// path is empty or absolute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_version.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "source_version",
                "must not be empty",
            ));
        }
        if self.target_version.trim().is_empty() {
            return Err(ConfigError::invalid_option(
                "target_version",
                "must not be empty",
            ));
        }
        if self.migration_type == MigrationType::VersionUpgrade
            && self.source_version == self.target_version
        {
            return Err(ConfigError::invalid_option(
                "target_version",
                "a version upgrade must change the version",
            ));
        }

        for pattern in self.include.iter().chain(&self.exclude) {
            glob::Pattern::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.msg.to_owned(),
            })?;
        }

        for path in [&self.manifest_path, &self.build_config_path] {
            if path.as_str().is_empty() {
                return Err(ConfigError::InvalidPath {
                    path: path.clone(),
                    reason: "must not be empty".to_owned(),
                });
            }
            if path.is_absolute() {
                return Err(ConfigError::InvalidPath {
                    path: path.clone(),
                    reason: "must be relative to the project root".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// Per-risk-level multipliers applied to the base step time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskMultipliers {
    /// Multiplier for critical steps.
    pub critical: f64,
    /// Multiplier for high-risk steps.
    pub high: f64,
    /// Multiplier for medium-risk steps.
    pub medium: f64,
    /// Multiplier for low-risk steps.
    pub low: f64,
}

impl Default for RiskMultipliers {
    fn default() -> Self {
        Self {
            critical: 3.0,
            high: 2.0,
            medium: 1.5,
            low: 1.0,
        }
    }
}

impl RiskMultipliers {
    /// Returns the multiplier for a risk level.
    #[inline]
    #[must_use]
    pub const fn for_level(&self, level: RiskLevel) -> f64 {
        match level {
            RiskLevel::Critical => self.critical,
            RiskLevel::High => self.high,
            RiskLevel::Medium => self.medium,
            RiskLevel::Low => self.low,
        }
    }
}

/// Seconds of expected downtime contributed by each step class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DowntimeCoefficients {
    /// Seconds per critical step.
    pub critical: u64,
    /// Seconds per high-risk step.
    pub high: u64,
    /// Seconds per medium-risk step.
    pub medium: u64,
    /// Seconds per step regardless of risk.
    pub per_step: u64,
}

impl Default for DowntimeCoefficients {
    fn default() -> Self {
        Self {
            critical: 300,
            high: 120,
            medium: 60,
            per_step: 10,
        }
    }
}

/// Heuristics used to estimate and aggregate risk.
///
/// # Examples
///
/// ```
/// use cm_core::{RiskLevel, RiskPolicy};
///
/// let policy = RiskPolicy::default();
/// assert_eq!(policy.step_time(RiskLevel::Critical, 1), 90);
/// assert_eq!(policy.step_time(RiskLevel::Low, 2), 60);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Seconds for one match of a low-risk pattern.
    pub base_step_seconds: u64,
    /// Multipliers per risk level.
    pub multipliers: RiskMultipliers,
    /// A plan is high risk when it has more high-risk steps than this.
    pub high_step_threshold: usize,
    /// A plan is medium risk when it has more medium-risk steps than this.
    pub medium_step_threshold: usize,
    /// Downtime formula coefficients.
    pub downtime: DowntimeCoefficients,
    /// Steps per unit of rollback complexity.
    pub rollback_complexity_divisor: u64,
    /// Minimum rollback complexity score.
    pub rollback_complexity_floor: u64,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            base_step_seconds: 30,
            multipliers: RiskMultipliers::default(),
            high_step_threshold: 3,
            medium_step_threshold: 5,
            downtime: DowntimeCoefficients::default(),
            rollback_complexity_divisor: 10,
            rollback_complexity_floor: 5,
        }
    }
}

impl RiskPolicy {
    /// Estimated seconds for a step with `match_count` matches at `level`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn step_time(&self, level: RiskLevel, match_count: usize) -> u64 {
        let seconds =
            self.base_step_seconds as f64 * match_count as f64 * self.multipliers.for_level(level);
        seconds.round().max(0.0) as u64
    }
}

/// Milestone grouping policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    /// Steps per milestone.
    pub milestone_size: usize,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self { milestone_size: 5 }
    }
}

/// Risk and time estimate for an auxiliary (non-pattern) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryStepPolicy {
    /// Risk level assigned to the step.
    pub risk: RiskLevel,
    /// Estimated seconds.
    pub estimated_time: u64,
}

/// Plan builder policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningPolicy {
    /// Manifest update step.
    pub dependency_update: AuxiliaryStepPolicy,
    /// Build configuration step.
    pub config_change: AuxiliaryStepPolicy,
    /// Test update step.
    pub test_update: AuxiliaryStepPolicy,
    /// Match files against the catalog on the rayon pool.
    pub parallel_scan: bool,
}

impl Default for PlanningPolicy {
    fn default() -> Self {
        Self {
            dependency_update: AuxiliaryStepPolicy {
                risk: RiskLevel::Medium,
                estimated_time: 120,
            },
            config_change: AuxiliaryStepPolicy {
                risk: RiskLevel::Medium,
                estimated_time: 60,
            },
            test_update: AuxiliaryStepPolicy {
                risk: RiskLevel::Low,
                estimated_time: 180,
            },
            parallel_scan: true,
        }
    }
}

/// Execution coordinator policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionPolicy {
    /// Upper bound for a single collaborator call, in milliseconds.
    pub collaborator_timeout_ms: u64,
    /// Directory (relative to the project root) receiving backups.
    pub backup_dir: Utf8PathBuf,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            collaborator_timeout_ms: 30_000,
            backup_dir: Utf8PathBuf::from(".codemig/backups"),
        }
    }
}

/// Root engine settings.
///
/// # Examples
///
/// ```
/// use cm_core::EngineSettings;
///
/// let settings: EngineSettings =
///     serde_json::from_str(r#"{"schedule": {"milestone_size": 3}}"#).unwrap();
/// assert_eq!(settings.schedule.milestone_size, 3);
/// assert_eq!(settings.risk.base_step_seconds, 30);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Risk heuristics.
    pub risk: RiskPolicy,
    /// Milestone grouping.
    pub schedule: SchedulePolicy,
    /// Plan builder policy.
    pub planning: PlanningPolicy,
    /// Execution policy.
    pub execution: ExecutionPolicy,
}

impl EngineSettings {
    /// Loads settings from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON and any error from
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for a zero milestone size,
    /// divisor or timeout, and for non-finite or negative multipliers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.milestone_size == 0 {
            return Err(ConfigError::invalid_option(
                "schedule.milestone_size",
                "must be positive",
            ));
        }
        if self.risk.rollback_complexity_divisor == 0 {
            return Err(ConfigError::invalid_option(
                "risk.rollback_complexity_divisor",
                "must be positive",
            ));
        }
        if self.execution.collaborator_timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "execution.collaborator_timeout_ms",
                "must be positive",
            ));
        }
        let m = self.risk.multipliers;
        if [m.critical, m.high, m.medium, m.low]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::invalid_option(
                "risk.multipliers",
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}
