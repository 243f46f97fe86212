//! Path filtering for the file scanner.
//!
//! [`PathFilter`] turns the include/exclude globs and the `include_tests`
//! flag of a [`MigrationConfig`] into a predicate over project-relative
//! paths. Both scanner implementations apply the same filter, so the
//! filesystem walk and the in-memory store agree on the file set.
//!
//! # Examples
//!
//! ```
//! use cm_core::{MigrationConfig, MigrationType};
//! use cm_scanner::{FileFilter, PathFilter};
//! use camino::Utf8Path;
//!
//! let config = MigrationConfig::new("17", "18", MigrationType::VersionUpgrade)
//!     .with_include(&["src/**"]);
//! let filter = PathFilter::from_config(&config)?;
//!
//! assert!(filter.should_process(Utf8Path::new("src/App.js")));
//! assert!(!filter.should_process(Utf8Path::new("src/App.test.js")));
//! assert!(!filter.should_process(Utf8Path::new("scripts/build.js")));
//! # Ok::<(), cm_scanner::ScanError>(())
//! ```

use camino::Utf8Path;
use cm_core::MigrationConfig;
use glob::{MatchOptions, Pattern};
use smallvec::SmallVec;

use crate::error::ScanError;

/// Path fragments that mark a file as part of a test suite.
const TEST_MARKERS: &[&str] = &[".spec.", ".test.", "__tests__/", "__mocks__/"];

/// Returns `true` if the path looks like a test file.
///
/// ```
/// use cm_scanner::is_test_file;
/// use camino::Utf8Path;
///
/// assert!(is_test_file(Utf8Path::new("src/App.test.tsx")));
/// assert!(is_test_file(Utf8Path::new("src/__tests__/App.js")));
/// assert!(!is_test_file(Utf8Path::new("src/App.tsx")));
/// ```
#[must_use]
pub fn is_test_file(path: &Utf8Path) -> bool {
    let path_str = path.as_str();
    TEST_MARKERS.iter().any(|marker| path_str.contains(marker))
        || path_str.starts_with("__tests__/")
}

/// Candidate test files for a source file, in the conventional locations.
///
/// For `src/App.js` these are `src/App.test.js`, `src/App.spec.js` and
/// `src/__tests__/App.js`.
#[must_use]
pub fn test_file_candidates(path: &Utf8Path) -> SmallVec<[camino::Utf8PathBuf; 4]> {
    let mut candidates = SmallVec::new();
    let (Some(stem), Some(file_name)) = (path.file_stem(), path.file_name()) else {
        return candidates;
    };
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new(""));
    let ext = path.extension().map(|e| format!(".{e}")).unwrap_or_default();

    candidates.push(parent.join(format!("{stem}.test{ext}")));
    candidates.push(parent.join(format!("{stem}.spec{ext}")));
    candidates.push(parent.join("__tests__").join(file_name));
    candidates
}

/// A predicate deciding which files the scanner returns.
pub trait FileFilter: Send + Sync {
    /// Returns `true` if the file at the given path should be scanned.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// Include/exclude glob filter with test-file handling.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: SmallVec<[Pattern; 4]>,
    exclude: SmallVec<[Pattern; 4]>,
    include_tests: bool,
}

impl PathFilter {
    /// Creates a filter that accepts every non-test file.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the filter from a migration request.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidGlob`] if an include or exclude glob does
    /// not compile.
    pub fn from_config(config: &MigrationConfig) -> Result<Self, ScanError> {
        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            include_tests: config.include_tests,
        })
    }

    /// Configures whether test files pass the filter.
    #[must_use]
    pub const fn with_tests(mut self, include_tests: bool) -> Self {
        self.include_tests = include_tests;
        self
    }

    fn options() -> MatchOptions {
        MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        }
    }
}

fn compile(globs: &[String]) -> Result<SmallVec<[Pattern; 4]>, ScanError> {
    globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|e| ScanError::InvalidGlob {
                pattern: g.clone(),
                reason: e.msg.to_owned(),
            })
        })
        .collect()
}

impl FileFilter for PathFilter {
    fn should_process(&self, path: &Utf8Path) -> bool {
        let options = Self::options();

        if !self.include.is_empty()
            && !self
                .include
                .iter()
                .any(|p| p.matches_with(path.as_str(), options))
        {
            return false;
        }

        if self
            .exclude
            .iter()
            .any(|p| p.matches_with(path.as_str(), options))
        {
            return false;
        }

        self.include_tests || !is_test_file(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::MigrationType;

    fn config() -> MigrationConfig {
        MigrationConfig::new("1", "2", MigrationType::DependencyUpdate)
    }

    #[test]
    fn test_default_excludes_apply() {
        let filter = PathFilter::from_config(&config()).unwrap();
        assert!(filter.should_process(Utf8Path::new("src/app.js")));
        assert!(!filter.should_process(Utf8Path::new("node_modules/react/index.js")));
        assert!(!filter.should_process(Utf8Path::new("dist/bundle.js")));
    }

    #[test]
    fn test_include_globs_restrict() {
        let filter = PathFilter::from_config(&config().with_include(&["src/**/*.ts"])).unwrap();
        assert!(filter.should_process(Utf8Path::new("src/a.ts")));
        assert!(filter.should_process(Utf8Path::new("src/deep/b.ts")));
        assert!(!filter.should_process(Utf8Path::new("src/a.js")));
        assert!(!filter.should_process(Utf8Path::new("lib/a.ts")));
    }

    #[test]
    fn test_tests_excluded_unless_requested() {
        let filter = PathFilter::from_config(&config()).unwrap();
        assert!(!filter.should_process(Utf8Path::new("src/app.spec.ts")));
        assert!(!filter.should_process(Utf8Path::new("__tests__/app.js")));

        let filter = PathFilter::from_config(&config().with_include_tests(true)).unwrap();
        assert!(filter.should_process(Utf8Path::new("src/app.spec.ts")));
    }

    #[test]
    fn test_invalid_glob() {
        let err = PathFilter::from_config(&config().with_exclude(&["[oops"])).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGlob { .. }));
    }

    #[test]
    fn test_test_file_candidates() {
        let candidates = test_file_candidates(Utf8Path::new("src/App.jsx"));
        let candidates: Vec<_> = candidates.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            candidates,
            vec!["src/App.test.jsx", "src/App.spec.jsx", "src/__tests__/App.jsx"]
        );
    }

    #[test]
    fn test_boxed_filter() {
        let filter: Box<dyn FileFilter> = Box::new(PathFilter::new());
        assert!(filter.should_process(Utf8Path::new("a.js")));
        assert!(!filter.should_process(Utf8Path::new("a.test.js")));
    }
}
