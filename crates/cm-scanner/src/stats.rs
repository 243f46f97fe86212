//! Scan statistics with atomic counters.
//!
//! Counters are bumped from the rayon pool during pattern analysis and use
//! relaxed ordering; they are informational only.
//!
//! # Examples
//!
//! ```
//! use cm_scanner::ScanStats;
//!
//! let stats = ScanStats::new();
//! stats.increment_files();
//! stats.record_matches(3);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.files, 1);
//! assert_eq!(snapshot.matched_files, 1);
//! assert_eq!(snapshot.matches, 3);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for one planning scan.
#[derive(Debug, Default)]
pub struct ScanStats {
    files: AtomicU64,
    matched_files: AtomicU64,
    matches: AtomicU64,
    errors: AtomicU64,
}

impl ScanStats {
    /// Creates a new [`ScanStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one analyzed file.
    #[inline]
    pub fn increment_files(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the matches found in one file; zero is ignored.
    #[inline]
    pub fn record_matches(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.matched_files.fetch_add(1, Ordering::Relaxed);
        self.matches.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Counts one file that could not be read.
    #[inline]
    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files: self.files.load(Ordering::Relaxed),
            matched_files: self.matched_files.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.files.store(0, Ordering::Relaxed);
        self.matched_files.store(0, Ordering::Relaxed);
        self.matches.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// A copy of [`ScanStats`] safe to store and serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Files analyzed, including unreadable ones.
    pub files: u64,
    /// Files with at least one pattern match.
    pub matched_files: u64,
    /// Pattern matches across all files.
    pub matches: u64,
    /// Files that failed to read.
    pub errors: u64,
}

impl StatsSnapshot {
    /// Share of analyzed files with at least one match, as a percentage.
    ///
    /// ```
    /// use cm_scanner::StatsSnapshot;
    ///
    /// let snap = StatsSnapshot { files: 8, matched_files: 2, matches: 5, errors: 0 };
    /// assert!((snap.match_rate() - 25.0).abs() < f64::EPSILON);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn match_rate(&self) -> f64 {
        if self.files == 0 {
            return 0.0;
        }
        (self.matched_files as f64 / self.files as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_matches_ignores_zero() {
        let stats = ScanStats::new();
        stats.increment_files();
        stats.record_matches(0);

        let snap = stats.snapshot();
        assert_eq!(snap.files, 1);
        assert_eq!(snap.matched_files, 0);
        assert_eq!(snap.matches, 0);
    }

    #[test]
    fn test_reset() {
        let stats = ScanStats::new();
        stats.increment_files();
        stats.increment_errors();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_match_rate_empty() {
        assert!(StatsSnapshot::default().match_rate().abs() < f64::EPSILON);
    }
}
