//! File discovery, file stores and pattern analysis for the codemig engine.
//!
//! This crate provides the two file collaborators the engine consumes and
//! the parallel matching phase of planning.
//!
//! # Overview
//!
//! - [`FileScanner`]: resolves the file set for a request
//!   ([`FsFileScanner`] walks a directory respecting `.gitignore`)
//! - [`FileStore`]: reads and writes file content
//!   ([`FsFileStore`] on disk, [`MemoryFileStore`] in memory)
//! - [`PathFilter`]: include/exclude globs and test-file detection
//! - [`FileAnalyzer`]: runs the pattern catalog over files on the rayon pool
//! - [`ScanStats`]: atomic counters for the analysis
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use cm_core::{MigrationConfig, MigrationType};
//! use cm_patterns::PatternCatalog;
//! use cm_scanner::{FileAnalyzer, FileScanner, MemoryFileStore, ScanStats};
//!
//! let store = MemoryFileStore::with_files([
//!     ("src/index.js", "var root = document.getElementById('root');"),
//!     ("src/util.js", "export const id = (x) => x;"),
//! ]);
//! let config = MigrationConfig::new("17", "18", MigrationType::ArchitectureRefactor);
//! let catalog = PatternCatalog::with_builtin()?;
//!
//! let paths = store.list_files(&config)?;
//! let results = FileAnalyzer::new().analyze_files(&paths, &store, &catalog.all(), &ScanStats::new());
//!
//! let changed: Vec<_> = results
//!     .iter()
//!     .filter_map(|(path, r)| r.as_ref().ok().filter(|a| !a.is_unchanged()).map(|_| path))
//!     .collect();
//! assert_eq!(changed, vec!["src/index.js"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! FileScanner (list paths)
//!     │
//!     ├── PathFilter (globs, test files)
//!     │
//!     └── WalkBuilder (ignore crate)
//!
//! FileAnalyzer (rayon par_iter, order preserving)
//!     │
//!     ├── FileStore::read
//!     │
//!     └── MigrationPattern::find_matches / transform
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod analyzer;
mod error;
mod filter;
mod stats;
mod store;
mod walker;

pub use analyzer::{FileAnalysis, FileAnalyzer, Rewrite, analyze_content};
pub use error::ScanError;
pub use filter::{FileFilter, PathFilter, is_test_file, test_file_candidates};
pub use stats::{ScanStats, StatsSnapshot};
pub use store::{FileStore, FsFileStore, MemoryFileStore};
pub use walker::{FileScanner, FsFileScanner};
