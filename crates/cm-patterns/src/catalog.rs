//! Pattern catalog.
//!
//! The [`PatternCatalog`] owns every registered [`MigrationPattern`]. It has
//! no dependencies on the rest of the engine: no disk, no network, only the
//! in-memory map.
//!
//! Patterns are stored behind [`Arc`] so that planning can take a cheap
//! snapshot of the catalog and match files against it without holding any
//! lock for the duration of the scan.

use std::sync::Arc;

use cm_core::{FxHashMap, fx_hash_map};
use tracing::{debug, warn};

use crate::builtin;
use crate::error::PatternError;
use crate::pattern::{MigrationPattern, PatternCategory};

/// Registry of migration patterns keyed by id.
///
/// Iteration order is registration order, so plans built from the same
/// catalog and files always list steps in the same order.
///
/// # Examples
///
/// ```
/// use cm_patterns::{PatternCatalog, PatternCategory};
///
/// let catalog = PatternCatalog::with_builtin()?;
/// assert!(catalog.get("var-to-let").is_some());
/// assert!(!catalog.by_category(PatternCategory::UiFramework).is_empty());
/// # Ok::<(), cm_patterns::PatternError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: FxHashMap<String, Arc<MigrationPattern>>,
    order: Vec<String>,
}

impl PatternCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: fx_hash_map(),
            order: Vec::new(),
        }
    }

    /// Creates a catalog holding the built-in pattern set.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails its own examples.
    pub fn with_builtin() -> Result<Self, PatternError> {
        let mut catalog = Self::new();
        for pattern in builtin::patterns()? {
            catalog.register(pattern)?;
        }
        debug!(count = catalog.len(), "Loaded built-in patterns");
        Ok(catalog)
    }

    /// Registers a pattern after running its self-test.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Duplicate`] if the id is taken, or the
    /// self-test error if the pattern matches the empty string or does not
    /// reproduce its example outputs.
    pub fn register(&mut self, pattern: MigrationPattern) -> Result<(), PatternError> {
        if self.patterns.contains_key(&pattern.id) {
            return Err(PatternError::Duplicate(pattern.id));
        }
        pattern.self_test()?;

        debug!(id = %pattern.id, category = %pattern.category, "Registered pattern");
        self.order.push(pattern.id.clone());
        self.patterns.insert(pattern.id.clone(), Arc::new(pattern));
        Ok(())
    }

    /// Removes a pattern and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::NotFound`] if no pattern has this id.
    pub fn remove(&mut self, id: &str) -> Result<Arc<MigrationPattern>, PatternError> {
        let pattern = self
            .patterns
            .remove(id)
            .ok_or_else(|| PatternError::NotFound(id.to_owned()))?;
        self.order.retain(|existing| existing != id);
        debug!(id, "Removed pattern");
        Ok(pattern)
    }

    /// Returns the pattern with this id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<MigrationPattern>> {
        self.patterns.get(id).map(Arc::clone)
    }

    /// Returns every pattern in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<MigrationPattern>> {
        self.order
            .iter()
            .filter_map(|id| self.patterns.get(id))
            .map(Arc::clone)
            .collect()
    }

    /// Returns the patterns of one category in registration order.
    #[must_use]
    pub fn by_category(&self, category: PatternCategory) -> Vec<Arc<MigrationPattern>> {
        self.all()
            .into_iter()
            .filter(|p| p.category == category)
            .collect()
    }

    /// Number of registered patterns.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no patterns are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Re-runs the self-test of every registered pattern.
    ///
    /// Returns the ids and errors of the patterns that fail.
    #[must_use]
    pub fn verify_examples(&self) -> Vec<(String, PatternError)> {
        self.all()
            .iter()
            .filter_map(|p| match p.self_test() {
                Ok(()) => None,
                Err(e) => {
                    warn!(id = %p.id, error = %e, "Pattern failed self-test");
                    Some((p.id.clone(), e))
                }
            })
            .collect()
    }
}
