//! Risk, impact and validation assessment.
//!
//! Pure functions over a plan's step list. The thresholds and coefficients
//! come from [`RiskPolicy`]; they are heuristics, see its docs.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use cm_core::{
    Compatibility, FxHashSet, Impact, MigrationConfig, MigrationStep, PerformanceImpact,
    RiskAssessment, RiskLevel, RiskPolicy, SecurityStatus, StepType, ValidationSummary,
    fx_hash_set,
};
use cm_patterns::MigrationPattern;
use cm_scanner::{is_test_file, test_file_candidates};

use crate::validation::introduced_dangerous_apis;

/// Net line deltas below this are a low performance impact.
const LOW_IMPACT_LINES: u64 = 100;
/// Net line deltas below this are a medium performance impact.
const MEDIUM_IMPACT_LINES: u64 = 1000;

/// Distinct step paths in first-seen order.
fn distinct_paths(steps: &[MigrationStep]) -> Vec<Utf8PathBuf> {
    let mut seen = fx_hash_set();
    steps
        .iter()
        .filter(|s| seen.insert(s.file_path.as_path()))
        .map(|s| s.file_path.clone())
        .collect()
}

fn pattern_of<'a>(
    step: &MigrationStep,
    patterns: &'a [Arc<MigrationPattern>],
) -> Option<&'a MigrationPattern> {
    let id = step.pattern_id.as_deref()?;
    patterns.iter().find(|p| p.id == id).map(AsRef::as_ref)
}

/// Aggregates step risk into the plan's risk assessment.
///
/// - overall: critical if any step is critical; high if more than
///   `high_step_threshold` steps are high; medium if any step is high or more
///   than `medium_step_threshold` are medium; low otherwise
/// - downtime: weighted step counts from [`RiskPolicy::downtime`]
/// - rollback complexity: `max(steps / divisor, floor)`
#[must_use]
pub fn assess_risk(steps: &[MigrationStep], policy: &RiskPolicy) -> RiskAssessment {
    let count = |level: RiskLevel| steps.iter().filter(|s| s.risk_level == level).count();
    let critical = count(RiskLevel::Critical);
    let high = count(RiskLevel::High);
    let medium = count(RiskLevel::Medium);
    let total = steps.len();

    let overall_risk = if critical > 0 {
        RiskLevel::Critical
    } else if high > policy.high_step_threshold {
        RiskLevel::High
    } else if high > 0 || medium > policy.medium_step_threshold {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let d = policy.downtime;
    let estimated_downtime = critical as u64 * d.critical
        + high as u64 * d.high
        + medium as u64 * d.medium
        + total as u64 * d.per_step;

    let rollback_complexity =
        (total as u64 / policy.rollback_complexity_divisor).max(policy.rollback_complexity_floor);

    RiskAssessment {
        overall_risk,
        critical_steps: critical,
        rollback_complexity,
        estimated_downtime,
        backup_requirements: distinct_paths(steps),
    }
}

/// Summarizes what the plan changes.
///
/// Deprecated and new features come from the patterns that produced steps,
/// each listed once in step order.
#[must_use]
pub fn assess_impact(steps: &[MigrationStep], patterns: &[Arc<MigrationPattern>]) -> Impact {
    let mut deprecated_features = Vec::new();
    let mut new_features = Vec::new();
    for pattern in steps.iter().filter_map(|s| pattern_of(s, patterns)) {
        if let Some(feature) = &pattern.deprecates {
            if !deprecated_features.contains(feature) {
                deprecated_features.push(feature.clone());
            }
        }
        if let Some(feature) = &pattern.introduces {
            if !new_features.contains(feature) {
                new_features.push(feature.clone());
            }
        }
    }

    Impact {
        files_affected: distinct_paths(steps).len(),
        lines_of_code_changed: steps.iter().filter_map(MigrationStep::line_delta).sum(),
        breaking_changes: steps
            .iter()
            .filter(|s| s.risk_level == RiskLevel::Critical || s.signals_breaking_change())
            .count(),
        deprecated_features,
        new_features,
    }
}

/// Builds the plan's validation summary.
///
/// `scanned` is the file set the plan was built from; test coverage is only
/// computed when tests were scanned.
#[must_use]
pub fn summarize_validation(
    config: &MigrationConfig,
    steps: &[MigrationStep],
    patterns: &[Arc<MigrationPattern>],
    scanned: &[Utf8PathBuf],
) -> ValidationSummary {
    let code_steps: Vec<&MigrationStep> = steps
        .iter()
        .filter(|s| s.step_type == StepType::CodeTransformation)
        .collect();

    let test_coverage = if config.include_tests {
        test_coverage(&code_steps, scanned)
    } else {
        0.0
    };

    let performance_impact = if steps.is_empty() {
        PerformanceImpact::None
    } else {
        let net: i64 = steps.iter().filter_map(MigrationStep::line_delta).sum();
        match net.unsigned_abs() {
            n if n < LOW_IMPACT_LINES => PerformanceImpact::Low,
            n if n < MEDIUM_IMPACT_LINES => PerformanceImpact::Medium,
            _ => PerformanceImpact::High,
        }
    };

    let mut compatibility = BTreeMap::new();
    let worst = steps.iter().map(|s| s.risk_level).max().unwrap_or_default();
    compatibility.insert(config.target_version.clone(), Compatibility::from_risk(worst));
    for step in &code_steps {
        let Some(pattern) = pattern_of(step, patterns) else {
            continue;
        };
        let entry = compatibility
            .entry(pattern.category.label().to_owned())
            .or_insert(Compatibility::Compatible);
        *entry = (*entry).max(Compatibility::from_risk(step.risk_level));
    }

    let security = if code_steps.iter().any(|s| {
        match (s.original_content.as_deref(), s.transformed_content.as_deref()) {
            (Some(before), Some(after)) => !introduced_dangerous_apis(before, after).is_empty(),
            _ => false,
        }
    }) {
        SecurityStatus::ReviewRequired
    } else {
        SecurityStatus::Clean
    };

    ValidationSummary {
        test_coverage,
        performance_impact,
        compatibility,
        security,
    }
}

/// Percentage of transformed source files with a test file in `scanned`.
#[allow(clippy::cast_precision_loss)]
fn test_coverage(code_steps: &[&MigrationStep], scanned: &[Utf8PathBuf]) -> f64 {
    let scanned: FxHashSet<&Utf8PathBuf> = scanned.iter().collect();
    let mut sources: Vec<&Utf8PathBuf> = code_steps
        .iter()
        .map(|s| &s.file_path)
        .filter(|p| !is_test_file(p))
        .collect();
    sources.sort();
    sources.dedup();

    if sources.is_empty() {
        return 100.0;
    }
    let covered = sources
        .iter()
        .filter(|p| test_file_candidates(p).iter().any(|c| scanned.contains(c)))
        .count();
    covered as f64 / sources.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_patterns::{Matcher, PatternCategory, Transform};

    fn step(path: &str, risk: RiskLevel) -> MigrationStep {
        MigrationStep::new(path, StepType::CodeTransformation, path).with_risk(risk)
    }

    fn steps(levels: &[RiskLevel]) -> Vec<MigrationStep> {
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| step(&format!("f{i}.js"), *level))
            .collect()
    }

    // The thresholds below are policy defaults, not derived values.
    #[test]
    fn test_overall_risk_thresholds() {
        use RiskLevel::{Critical, High, Low, Medium};
        let policy = RiskPolicy::default();
        let overall = |levels: &[RiskLevel]| assess_risk(&steps(levels), &policy).overall_risk;

        assert_eq!(overall(&[]), Low);
        assert_eq!(overall(&[Low, Low]), Low);
        assert_eq!(overall(&[Medium; 5]), Low);
        assert_eq!(overall(&[Medium; 6]), Medium);
        assert_eq!(overall(&[High]), Medium);
        assert_eq!(overall(&[High; 3]), Medium);
        assert_eq!(overall(&[High; 4]), High);
        assert_eq!(overall(&[Low, Critical]), Critical);
    }

    #[test]
    fn test_any_critical_step_makes_plan_critical() {
        let policy = RiskPolicy::default();
        for n in 0..8 {
            let mut levels = vec![RiskLevel::Low; n];
            levels.push(RiskLevel::Critical);
            assert_eq!(
                assess_risk(&steps(&levels), &policy).overall_risk,
                RiskLevel::Critical
            );
        }
    }

    #[test]
    fn test_downtime_and_rollback_complexity() {
        use RiskLevel::{Critical, High, Low, Medium};
        let assessment = assess_risk(&steps(&[Critical, High, Medium, Low]), &RiskPolicy::default());
        assert_eq!(assessment.estimated_downtime, 300 + 120 + 60 + 40);
        assert_eq!(assessment.critical_steps, 1);
        assert_eq!(assessment.rollback_complexity, 5);

        let many = steps(&[Low; 73]);
        assert_eq!(assess_risk(&many, &RiskPolicy::default()).rollback_complexity, 7);
    }

    #[test]
    fn test_backup_requirements_are_distinct_in_order() {
        let plan_steps = vec![
            step("b.js", RiskLevel::Low),
            step("a.js", RiskLevel::Low),
            step("b.js", RiskLevel::Low),
        ];
        let assessment = assess_risk(&plan_steps, &RiskPolicy::default());
        assert_eq!(assessment.backup_requirements, vec!["b.js", "a.js"]);
    }

    #[test]
    fn test_impact_counts() {
        let mut breaking = step("a.js", RiskLevel::Medium).with_contents("a\n", "a\nb\nc\n");
        breaking.description = "Breaking: drop legacy API".to_owned();
        let critical = step("a.js", RiskLevel::Critical).with_contents("x\ny\n", "x\n");
        let aux = MigrationStep::new("d", StepType::DependencyUpdate, "package.json");

        let impact = assess_impact(&[breaking, critical, aux], &[]);
        assert_eq!(impact.files_affected, 2);
        assert_eq!(impact.lines_of_code_changed, 1);
        assert_eq!(impact.breaking_changes, 2);
    }

    #[test]
    fn test_impact_features_from_patterns() {
        let pattern = Arc::new(
            MigrationPattern::new(
                "p",
                "p",
                PatternCategory::UiFramework,
                Matcher::literal("old"),
                Transform::Replace("new".to_owned()),
            )
            .with_features("old API", "new API"),
        );
        let mut a = step("a.js", RiskLevel::Low);
        a.pattern_id = Some("p".to_owned());
        let mut b = step("b.js", RiskLevel::Low);
        b.pattern_id = Some("p".to_owned());

        let impact = assess_impact(&[a, b], &[pattern]);
        assert_eq!(impact.deprecated_features, vec!["old API"]);
        assert_eq!(impact.new_features, vec!["new API"]);
    }

    #[test]
    fn test_validation_summary() {
        let pattern = Arc::new(MigrationPattern::new(
            "p",
            "p",
            PatternCategory::Styling,
            Matcher::literal("x"),
            Transform::Replace("y".to_owned()),
        ));
        let mut risky = step("src/a.js", RiskLevel::High).with_contents("x", "eval(x)");
        risky.pattern_id = Some("p".to_owned());
        let uncovered = step("src/b.js", RiskLevel::Low).with_contents("x", "y");

        let config = MigrationConfig::default().with_include_tests(true);
        let scanned = vec![
            Utf8PathBuf::from("src/a.js"),
            Utf8PathBuf::from("src/a.test.js"),
            Utf8PathBuf::from("src/b.js"),
        ];
        let summary = summarize_validation(&config, &[risky, uncovered], &[pattern], &scanned);

        assert!((summary.test_coverage - 50.0).abs() < f64::EPSILON);
        assert_eq!(summary.performance_impact, PerformanceImpact::Low);
        assert_eq!(summary.security, SecurityStatus::ReviewRequired);
        assert_eq!(summary.compatibility.get("styling"), Some(&Compatibility::NeedsReview));
        assert_eq!(
            summary.compatibility.get(config.target_version.as_str()),
            Some(&Compatibility::NeedsReview)
        );
    }

    #[test]
    fn test_empty_plan_summary() {
        let config = MigrationConfig::default();
        let summary = summarize_validation(&config, &[], &[], &[]);
        assert_eq!(summary.performance_impact, PerformanceImpact::None);
        assert_eq!(summary.security, SecurityStatus::Clean);
        assert!(summary.test_coverage.abs() < f64::EPSILON);
    }
}
