//! Risk level type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordinal severity attached to a step and aggregated to a plan.
///
/// Ordering follows severity, so `max()` over a set of levels yields the
/// worst one.
///
/// # Examples
///
/// ```
/// use cm_core::RiskLevel;
///
/// assert!(RiskLevel::Critical > RiskLevel::High);
/// assert!(RiskLevel::High.aborts_on_failure());
/// assert!(!RiskLevel::Medium.aborts_on_failure());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    /// Mechanical change, safe to apply unattended.
    #[default]
    Low,
    /// Behavior-preserving but worth a look.
    Medium,
    /// Likely to need manual follow-up.
    High,
    /// Breaking change.
    Critical,
}

impl RiskLevel {
    /// Returns `true` if a failed step at this level aborts the run.
    #[inline]
    #[must_use]
    pub const fn aborts_on_failure(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Returns the kebab-case label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        let worst = [RiskLevel::Medium, RiskLevel::Critical, RiskLevel::Low]
            .into_iter()
            .max();
        assert_eq!(worst, Some(RiskLevel::Critical));
    }

    #[test]
    fn test_risk_level_serialization() {
        assert_eq!(
            serde_json::to_string(&RiskLevel::Critical).unwrap(),
            r#""critical""#
        );
        let level: RiskLevel = serde_json::from_str(r#""medium""#).unwrap();
        assert_eq!(level, RiskLevel::Medium);
    }

    #[test]
    fn test_risk_level_display() {
        assert_eq!(RiskLevel::High.to_string(), "high");
    }
}
