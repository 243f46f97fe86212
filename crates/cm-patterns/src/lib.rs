//! Catalog of code transformation patterns for the codemig engine.
//!
//! A pattern is a pure pair of functions: a [`Matcher`] that finds
//! occurrences in file content and a [`Transform`] that turns one occurrence
//! into its replacement. Matching is regex based; there is no parsing.
//!
//! # Overview
//!
//! - [`MigrationPattern`]: identity, category, risk, declared dependencies and
//!   example pairs used for self-test
//! - [`PatternCatalog`]: the registry, rejecting duplicate ids and patterns
//!   that fail their own examples
//! - [`builtin::patterns`]: the default pattern set, one or more per category
//!
//! # Example
//!
//! ```
//! use cm_patterns::PatternCatalog;
//!
//! let catalog = PatternCatalog::with_builtin()?;
//! let pattern = catalog.get("var-to-let").unwrap();
//!
//! let (out, count) = pattern.apply_all("var a = 1;\nvar b = 2;\n");
//! assert_eq!(count, 2);
//! assert_eq!(out, "let a = 1;\nlet b = 2;\n");
//! # Ok::<(), cm_patterns::PatternError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod builtin;
mod catalog;
mod error;
mod pattern;

pub use catalog::PatternCatalog;
pub use error::PatternError;
pub use pattern::{
    ExamplePair, Matcher, MigrationPattern, PatternCategory, PatternMatch, PatternSummary,
    Transform,
};
