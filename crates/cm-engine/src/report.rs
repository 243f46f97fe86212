//! Text rendering of migration results.
//!
//! Both functions are pure: the same input always renders the same text.

use std::fmt::Write;

use cm_core::MigrationResult;

/// Renders a line-oriented diff hunk for one file change.
///
/// Common leading and trailing lines are trimmed; the remaining lines are
/// printed as one `-`/`+` block. A side whose block reaches a last line
/// without a newline is marked the way `diff -u` does. Contents that differ
/// only in line endings show their last line on both sides. Identical
/// contents render nothing.
///
/// ```
/// use cm_engine::diff_hunk;
///
/// let hunk = diff_hunk("a.js", "var a;\nf();\n", "let a;\nf();\n");
/// assert!(hunk.contains("-var a;\n+let a;\n"));
/// ```
#[must_use]
pub fn diff_hunk(path: &str, before: &str, after: &str) -> String {
    if before == after {
        return String::new();
    }

    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();

    let mut prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    if prefix + suffix == old.len() && prefix + suffix == new.len() {
        // Same lines, different endings.
        if old.is_empty() {
            return String::new();
        }
        prefix = old.len() - 1;
    }
    let old_end = old.len() - suffix;
    let new_end = new.len() - suffix;

    let removed = &old[prefix..old_end];
    let added = &new[prefix..new_end];

    let mut out = String::new();
    let _ = writeln!(out, "--- a/{path}");
    let _ = writeln!(out, "+++ b/{path}");
    let _ = writeln!(
        out,
        "@@ -{},{} +{},{} @@",
        prefix + 1,
        removed.len(),
        prefix + 1,
        added.len()
    );
    for line in removed {
        let _ = writeln!(out, "-{line}");
    }
    if !removed.is_empty() && old_end == old.len() && !before.ends_with('\n') {
        out.push_str(NO_NEWLINE);
    }
    for line in added {
        let _ = writeln!(out, "+{line}");
    }
    if !added.is_empty() && new_end == new.len() && !after.ends_with('\n') {
        out.push_str(NO_NEWLINE);
    }
    out
}

const NO_NEWLINE: &str = "\\ No newline at end of file\n";

/// Renders a human-readable report of a migration result.
#[must_use]
pub fn generate_report(result: &MigrationResult) -> String {
    let plan = &result.plan;
    let config = &plan.config;
    let execution = &result.execution;
    let outcome = &result.outcome;

    let mut out = String::new();
    let _ = writeln!(out, "Migration Report: {}", result.id);
    let _ = writeln!(out, "==========================================");
    let _ = writeln!(out, "Generated: {}", result.timestamp.to_rfc3339());
    let _ = writeln!(out, "Plan created: {}", plan.created_at.to_rfc3339());

    let _ = writeln!(out);
    let _ = writeln!(out, "Configuration");
    let _ = writeln!(out, "-------------");
    let _ = writeln!(
        out,
        "  {} {} -> {}",
        config.migration_type.label(),
        config.source_version,
        config.target_version
    );
    let _ = writeln!(out, "  Safety level:  {}", config.safety_level.label());
    let _ = writeln!(out, "  Dry run:       {}", config.dry_run);
    let _ = writeln!(out, "  Backup:        {}", config.backup_enabled);
    let _ = writeln!(out, "  Rollback:      {}", config.rollback_enabled);
    let _ = writeln!(out, "  Include tests: {}", config.include_tests);

    let _ = writeln!(out);
    let _ = writeln!(out, "Execution");
    let _ = writeln!(out, "---------");
    let _ = writeln!(out, "  Status:  {}", execution.status.label());
    if let Some(start) = execution.start_time {
        let _ = writeln!(out, "  Started: {}", start.to_rfc3339());
    }
    if let Some(end) = execution.end_time {
        let _ = writeln!(out, "  Ended:   {}", end.to_rfc3339());
    }
    let _ = writeln!(
        out,
        "  Steps:   {} planned, {} completed, {} failed",
        plan.steps.len(),
        execution.completed_steps.len(),
        execution.failed_steps.len()
    );
    let _ = writeln!(out, "  Success: {}", outcome.success);
    let _ = writeln!(out, "  Changes applied: {}", outcome.changes_applied);

    let risk = &plan.risk_assessment;
    let impact = &plan.impact;
    let _ = writeln!(out);
    let _ = writeln!(out, "Risk & Impact");
    let _ = writeln!(out, "-------------");
    let _ = writeln!(out, "  Overall risk:        {}", risk.overall_risk);
    let _ = writeln!(out, "  Critical steps:      {}", risk.critical_steps);
    let _ = writeln!(out, "  Rollback complexity: {}", risk.rollback_complexity);
    let _ = writeln!(out, "  Estimated downtime:  {}s", risk.estimated_downtime);
    let _ = writeln!(out, "  Estimated duration:  {}s", plan.schedule.estimated_duration);
    let _ = writeln!(out, "  Milestones:          {}", plan.schedule.milestones.len());
    let _ = writeln!(out, "  Files affected:      {}", impact.files_affected);
    let _ = writeln!(out, "  Net lines changed:   {:+}", impact.lines_of_code_changed);
    let _ = writeln!(out, "  Breaking changes:    {}", impact.breaking_changes);
    if !impact.deprecated_features.is_empty() {
        let _ = writeln!(out, "  Deprecated: {}", impact.deprecated_features.join(", "));
    }
    if !impact.new_features.is_empty() {
        let _ = writeln!(out, "  Introduced: {}", impact.new_features.join(", "));
    }

    let validation = &plan.validation;
    let _ = writeln!(out);
    let _ = writeln!(out, "Validation");
    let _ = writeln!(out, "----------");
    let _ = writeln!(out, "  Test coverage:      {:.1}%", validation.test_coverage);
    let _ = writeln!(out, "  Performance impact: {:?}", validation.performance_impact);
    let _ = writeln!(out, "  Security:           {:?}", validation.security);
    for (target, verdict) in &validation.compatibility {
        let _ = writeln!(out, "  Compatibility {target}: {verdict:?}");
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Tests");
    let _ = writeln!(out, "-----");
    let _ = writeln!(
        out,
        "  Passed: {}  Failed: {}",
        outcome.tests_passed, outcome.tests_failed
    );

    write_list(&mut out, "Errors", &execution.errors);
    write_list(&mut out, "Warnings", &execution.warnings);

    let _ = writeln!(out);
    let _ = writeln!(out, "Rollback");
    let _ = writeln!(out, "--------");
    let _ = writeln!(
        out,
        "  Available: {}",
        if outcome.rollback_available { "yes" } else { "no" }
    );
    if let Some(location) = &result.artifacts.backup_location {
        let _ = writeln!(out, "  Backup:    {location}");
    }

    if !result.artifacts.diff_report.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Diff");
        let _ = writeln!(out, "----");
        out.push_str(&result.artifacts.diff_report);
    }

    out
}

fn write_list(out: &mut String, title: &str, items: &[String]) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{title} ({})", items.len());
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}
