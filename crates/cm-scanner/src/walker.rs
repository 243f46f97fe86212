//! File discovery.
//!
//! [`FileScanner`] resolves the concrete set of files a migration inspects.
//! [`FsFileScanner`] walks a directory with the `ignore` crate, so
//! `.gitignore` and `.ignore` rules apply on top of the request's globs.
//!
//! # Examples
//!
//! ```ignore
//! use cm_core::{MigrationConfig, MigrationType};
//! use cm_scanner::{FileScanner, FsFileScanner};
//! use camino::Utf8Path;
//!
//! let scanner = FsFileScanner::new(Utf8Path::new("./web"))?;
//! let config = MigrationConfig::new("17", "18", MigrationType::VersionUpgrade);
//!
//! let files = scanner.list_files(&config)?;
//! tracing::info!(count = files.len(), "Scanned project");
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use cm_core::MigrationConfig;
use ignore::WalkBuilder;
use tracing::debug;

use crate::error::ScanError;
use crate::filter::{FileFilter, PathFilter};

/// Directories never worth scanning.
const SKIP_DIRECTORIES: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    ".git",
    "coverage",
    "__pycache__",
    ".turbo",
    ".next",
    ".nuxt",
    ".codemig",
];

/// Extensions of files the built-in patterns know how to read.
const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "json", "css", "scss", "less",
];

/// Resolves the files a migration inspects.
pub trait FileScanner: Send + Sync {
    /// Lists project-relative paths matching the request, sorted.
    fn list_files(&self, config: &MigrationConfig) -> Result<Vec<Utf8PathBuf>, ScanError>;
}

/// Gitignore-aware directory walker.
#[derive(Debug, Clone)]
pub struct FsFileScanner {
    root: Utf8PathBuf,
    extra_skips: Vec<String>,
}

impl FsFileScanner {
    /// Opens a project root for scanning.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] unless `root` is an existing directory.
    pub fn new(root: &Utf8Path) -> Result<Self, ScanError> {
        match root.metadata() {
            Ok(meta) if meta.is_dir() => Ok(Self {
                root: root.to_owned(),
                extra_skips: Vec::new(),
            }),
            Ok(_) => Err(ScanError::config(format!("{root} is not a directory"))),
            Err(e) => Err(ScanError::config(format!("cannot open {root}: {e}"))),
        }
    }

    /// Also skips directories with these names.
    #[must_use]
    pub fn with_skip_dirs(mut self, dirs: &[&str]) -> Self {
        self.extra_skips.extend(dirs.iter().map(|d| (*d).to_owned()));
        self
    }

    fn walk(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            .standard_filters(true)
            .require_git(false)
            .build()
    }

    fn is_source_file(path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
    }

    fn should_skip_path(&self, path: &Utf8Path) -> bool {
        path.components().any(|component| {
            let name = component.as_str();
            SKIP_DIRECTORIES.contains(&name) || self.extra_skips.iter().any(|d| d == name)
        })
    }
}

impl FileScanner for FsFileScanner {
    fn list_files(&self, config: &MigrationConfig) -> Result<Vec<Utf8PathBuf>, ScanError> {
        let filter = PathFilter::from_config(config)?;
        let mut paths = Vec::new();

        for entry in self.walk() {
            let entry = entry?;
            if entry.file_type().is_none_or(|ft| !ft.is_file()) {
                continue;
            }

            let full = Utf8Path::from_path(entry.path())
                .ok_or_else(|| ScanError::NonUtf8Path(entry.path().to_owned()))?;
            let Ok(relative) = full.strip_prefix(&self.root) else {
                continue;
            };

            let wanted = Self::is_source_file(relative)
                && !self.should_skip_path(relative)
                && filter.should_process(relative);
            if wanted {
                paths.push(relative.to_owned());
            }
        }

        paths.sort();
        debug!(root = %self.root, count = paths.len(), "Listed files");
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_core::MigrationType;
    use std::fs;

    fn project() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        for (path, content) in [
            ("package.json", "{}"),
            ("src/App.jsx", "var a;"),
            ("src/App.test.jsx", "test()"),
            ("src/logo.png", "binary"),
            ("node_modules/react/index.js", "var r;"),
            ("vendor/lib.js", "var v;"),
        ] {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        (dir, root)
    }

    fn config() -> MigrationConfig {
        MigrationConfig::new("17", "18", MigrationType::VersionUpgrade)
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let err = FsFileScanner::new(Utf8Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let (_dir, root) = project();
        let scanner = FsFileScanner::new(&root).unwrap().with_skip_dirs(&["vendor"]);

        let files = scanner.list_files(&config()).unwrap();
        assert_eq!(files, vec!["package.json", "src/App.jsx"]);
    }

    #[test]
    fn test_list_files_with_tests() {
        let (_dir, root) = project();
        let scanner = FsFileScanner::new(&root).unwrap();

        let files = scanner
            .list_files(&config().with_include_tests(true))
            .unwrap();
        assert!(files.iter().any(|p| p == "src/App.test.jsx"));
        assert!(files.iter().any(|p| p == "vendor/lib.js"));
    }

    #[test]
    fn test_should_skip_path() {
        let scanner = FsFileScanner {
            root: Utf8PathBuf::from("."),
            extra_skips: vec!["custom_skip".to_owned()],
        };

        assert!(scanner.should_skip_path(Utf8Path::new("node_modules/foo.js")));
        assert!(scanner.should_skip_path(Utf8Path::new(".codemig/backups/x/a.js")));
        assert!(scanner.should_skip_path(Utf8Path::new("src/custom_skip/bar.ts")));
        assert!(!scanner.should_skip_path(Utf8Path::new("src/components/bar.ts")));
    }
}
