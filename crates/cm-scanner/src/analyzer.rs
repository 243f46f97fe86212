//! Pattern analysis of scanned files.
//!
//! [`FileAnalyzer`] reads each file through a [`FileStore`] and runs every
//! pattern over it, producing one [`Rewrite`] per match. Files share no
//! state, so the work is spread over the rayon pool; results come back in
//! input order.
//!
//! # Chaining
//!
//! Rewrites of one file form a chain: each rewrite's `before` is the previous
//! rewrite's `after`, and the first `before` is the file as read. Patterns
//! run in catalog order; a later pattern sees the output of earlier ones.
//! Within one pattern all matches are found up front and applied left to
//! right, so a replacement never gets matched again by the same pattern.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cm_patterns::MigrationPattern;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::stats::ScanStats;
use crate::store::FileStore;

/// One pattern match applied to a file.
#[derive(Debug, Clone)]
pub struct Rewrite {
    /// The pattern that matched.
    pub pattern: Arc<MigrationPattern>,
    /// The matched text.
    pub matched: String,
    /// The replacement text.
    pub replacement: String,
    /// File content before this rewrite.
    pub before: String,
    /// File content after this rewrite.
    pub after: String,
}

/// Every rewrite for one file.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    /// Project-relative path.
    pub path: Utf8PathBuf,
    /// Content as read.
    pub original: String,
    /// Rewrites in application order.
    pub rewrites: Vec<Rewrite>,
}

impl FileAnalysis {
    /// Content after every rewrite.
    #[must_use]
    pub fn final_content(&self) -> &str {
        self.rewrites
            .last()
            .map_or(self.original.as_str(), |r| r.after.as_str())
    }

    /// Returns `true` if no pattern matched.
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.rewrites.is_empty()
    }
}

/// Parallel pattern matcher over a file set.
#[derive(Debug, Clone, Copy)]
pub struct FileAnalyzer {
    parallel: bool,
}

impl Default for FileAnalyzer {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl FileAnalyzer {
    /// Creates an analyzer that uses the rayon pool.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures whether files are analyzed on the rayon pool.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reads and analyzes `paths`, returning one entry per path in order.
    ///
    /// A file that cannot be read yields an error entry; the others are
    /// unaffected.
    #[must_use]
    pub fn analyze_files(
        &self,
        paths: &[Utf8PathBuf],
        store: &dyn FileStore,
        patterns: &[Arc<MigrationPattern>],
        stats: &ScanStats,
    ) -> Vec<(Utf8PathBuf, Result<FileAnalysis, ScanError>)> {
        let analyze_one = |path: &Utf8PathBuf| {
            stats.increment_files();
            let result = store.read(path).map(|content| {
                let analysis = analyze_content(path, content, patterns);
                stats.record_matches(analysis.rewrites.len());
                analysis
            });
            if let Err(e) = &result {
                stats.increment_errors();
                warn!(path = %path, error = %e, "Failed to read file");
            }
            (path.clone(), result)
        };

        let results: Vec<_> = if self.parallel {
            paths.par_iter().map(analyze_one).collect()
        } else {
            paths.iter().map(analyze_one).collect()
        };

        let snapshot = stats.snapshot();
        debug!(
            files = snapshot.files,
            matched = snapshot.matched_files,
            matches = snapshot.matches,
            "Analyzed files"
        );
        results
    }
}

/// Runs `patterns` over one file's content.
#[must_use]
pub fn analyze_content(
    path: &Utf8Path,
    content: String,
    patterns: &[Arc<MigrationPattern>],
) -> FileAnalysis {
    let mut rewrites = Vec::new();
    let mut current = content.clone();

    for pattern in patterns {
        let matches = pattern.find_matches(&current);
        // Offsets are relative to `current` as it was before this pattern ran.
        let mut grown = 0usize;
        let mut shrunk = 0usize;

        for m in &matches {
            let Some(start) = (m.start + grown).checked_sub(shrunk) else {
                continue;
            };
            let end = start + (m.end - m.start);
            let (Some(head), Some(tail)) = (current.get(..start), current.get(end..)) else {
                continue;
            };

            let replacement = pattern.transform(m);
            let mut after = String::with_capacity(head.len() + replacement.len() + tail.len());
            after.push_str(head);
            after.push_str(&replacement);
            after.push_str(tail);

            if replacement.len() >= m.end - m.start {
                grown += replacement.len() - (m.end - m.start);
            } else {
                shrunk += (m.end - m.start) - replacement.len();
            }

            let before = std::mem::replace(&mut current, after);
            rewrites.push(Rewrite {
                pattern: Arc::clone(pattern),
                matched: m.text().to_owned(),
                replacement,
                before,
                after: current.clone(),
            });
        }
    }

    FileAnalysis {
        path: path.to_owned(),
        original: content,
        rewrites,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryFileStore;
    use cm_patterns::{Matcher, PatternCategory, Transform};

    fn pattern(id: &str, source: &str, replacement: &str) -> Arc<MigrationPattern> {
        Arc::new(MigrationPattern::new(
            id,
            id,
            PatternCategory::GeneralLanguage,
            Matcher::regex(source).unwrap(),
            Transform::Replace(replacement.to_owned()),
        ))
    }

    #[test]
    fn test_rewrites_chain_within_pattern() {
        let patterns = [pattern("p", r"\bvar ", "let ")];
        let analysis = analyze_content(Utf8Path::new("a.js"), "var a; var b;".to_owned(), &patterns);

        assert_eq!(analysis.rewrites.len(), 2);
        assert_eq!(analysis.rewrites[0].before, "var a; var b;");
        assert_eq!(analysis.rewrites[0].after, "let a; var b;");
        assert_eq!(analysis.rewrites[1].before, "let a; var b;");
        assert_eq!(analysis.final_content(), "let a; let b;");
    }

    #[test]
    fn test_offsets_track_shrinking_replacements() {
        let patterns = [pattern("p", r"long_name", "x")];
        let analysis = analyze_content(
            Utf8Path::new("a.js"),
            "long_name + long_name + long_name".to_owned(),
            &patterns,
        );
        assert_eq!(analysis.final_content(), "x + x + x");
    }

    #[test]
    fn test_later_pattern_sees_earlier_output() {
        let patterns = [pattern("a", r"foo", "bar"), pattern("b", r"bar", "baz")];
        let analysis = analyze_content(Utf8Path::new("a.js"), "foo".to_owned(), &patterns);

        let ids: Vec<_> = analysis
            .rewrites
            .iter()
            .map(|r| r.pattern.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(analysis.final_content(), "baz");
    }

    #[test]
    fn test_no_match_is_unchanged() {
        let patterns = [pattern("p", r"zzz", "y")];
        let analysis = analyze_content(Utf8Path::new("a.js"), "abc".to_owned(), &patterns);
        assert!(analysis.is_unchanged());
        assert_eq!(analysis.final_content(), "abc");
    }

    #[test]
    fn test_analyze_files_preserves_order_and_reports_errors() {
        let store = MemoryFileStore::with_files([("a.js", "var a;"), ("c.js", "const c;")]);
        let patterns = [pattern("p", r"\bvar ", "let ")];
        let paths: Vec<Utf8PathBuf> = ["a.js", "b.js", "c.js"].map(Utf8PathBuf::from).into();
        let stats = ScanStats::new();

        let results = FileAnalyzer::new().analyze_files(&paths, &store, &patterns, &stats);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "a.js");
        assert_eq!(results[0].1.as_ref().unwrap().rewrites.len(), 1);
        assert!(results[1].1.is_err());
        assert!(results[2].1.as_ref().unwrap().is_unchanged());

        let snap = stats.snapshot();
        assert_eq!(snap.files, 3);
        assert_eq!(snap.matched_files, 1);
        assert_eq!(snap.errors, 1);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let store = MemoryFileStore::with_files((0..20).map(|i| (format!("f{i}.js"), "var x; var y;")));
        let patterns = [pattern("p", r"\bvar ", "let ")];
        let paths: Vec<Utf8PathBuf> = (0..20).map(|i| Utf8PathBuf::from(format!("f{i}.js"))).collect();

        let parallel = FileAnalyzer::new().analyze_files(&paths, &store, &patterns, &ScanStats::new());
        let sequential = FileAnalyzer::new()
            .with_parallel(false)
            .analyze_files(&paths, &store, &patterns, &ScanStats::new());

        let order = |r: &[(Utf8PathBuf, Result<FileAnalysis, ScanError>)]| {
            r.iter().map(|(p, _)| p.clone()).collect::<Vec<_>>()
        };
        assert_eq!(order(&parallel), order(&sequential));
    }
}
