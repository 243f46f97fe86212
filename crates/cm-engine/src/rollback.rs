//! Rollback manager.
//!
//! Keeps one LIFO stack of [`RollbackRecord`]s per migration. The executor
//! pushes a record right before it applies a step that writes a file, so the
//! stack always holds exactly the applied-but-not-undone steps in
//! application order.
//!
//! Unwinding pops one record at a time and restores it through the
//! [`FileStore`]. The lock is released while a file is restored. A failed
//! restore is logged and the unwind goes on with the next record.

use camino::Utf8PathBuf;
use cm_core::{FxHashMap, StepId, fx_hash_map};
use cm_scanner::{FileStore, ScanError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::RollbackError;

/// Pre-step content of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRecord {
    /// The step that is about to change the file.
    pub step_id: StepId,
    /// The file.
    pub file_path: Utf8PathBuf,
    /// Content before the step; `None` if the file did not exist, in which
    /// case restoring removes it.
    pub original_content: Option<String>,
}

/// Outcome of one unwind.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Records restored, in restore order.
    pub restored: Vec<StepId>,
    /// Records that could not be restored.
    pub failures: Vec<RollbackError>,
}

impl RollbackReport {
    /// Returns `true` if every record was restored.
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-migration rollback stacks.
#[derive(Debug)]
pub struct RollbackManager {
    stacks: Mutex<FxHashMap<String, Vec<RollbackRecord>>>,
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackManager {
    /// Creates a manager with no stacks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stacks: Mutex::new(fx_hash_map()),
        }
    }

    /// Pushes a record onto the migration's stack.
    pub fn push(&self, migration_id: &str, record: RollbackRecord) {
        debug!(migration_id, step = %record.step_id, path = %record.file_path, "Recorded rollback point");
        self.stacks
            .lock()
            .entry(migration_id.to_owned())
            .or_default()
            .push(record);
    }

    /// Number of records on the migration's stack.
    #[must_use]
    pub fn depth(&self, migration_id: &str) -> usize {
        self.stacks.lock().get(migration_id).map_or(0, Vec::len)
    }

    /// Returns `true` if the migration has records to unwind.
    #[must_use]
    pub fn has_records(&self, migration_id: &str) -> bool {
        self.depth(migration_id) > 0
    }

    /// Drops the migration's stack without restoring anything.
    pub fn discard(&self, migration_id: &str) {
        if let Some(records) = self.stacks.lock().remove(migration_id) {
            debug!(migration_id, records = records.len(), "Discarded rollback records");
        }
    }

    fn pop(&self, migration_id: &str) -> Option<RollbackRecord> {
        let mut stacks = self.stacks.lock();
        let stack = stacks.get_mut(migration_id)?;
        let record = stack.pop();
        if stack.is_empty() {
            stacks.remove(migration_id);
        }
        record
    }

    /// Pops the top record if it belongs to `step_id`.
    pub(crate) fn pop_step(&self, migration_id: &str, step_id: &StepId) -> Option<RollbackRecord> {
        let mut stacks = self.stacks.lock();
        let stack = stacks.get_mut(migration_id)?;
        if stack.last().is_none_or(|record| &record.step_id != step_id) {
            return None;
        }
        let record = stack.pop();
        if stack.is_empty() {
            stacks.remove(migration_id);
        }
        record
    }

    /// Unwinds the migration's stack in LIFO order.
    ///
    /// Unwinding a migration without records restores nothing.
    pub fn rollback(&self, migration_id: &str, store: &dyn FileStore) -> RollbackReport {
        let mut report = RollbackReport::default();

        while let Some(record) = self.pop(migration_id) {
            match restore(&record, store) {
                Ok(()) => {
                    debug!(step = %record.step_id, path = %record.file_path, "Restored file");
                    report.restored.push(record.step_id);
                }
                Err(source) => {
                    warn!(step = %record.step_id, path = %record.file_path, error = %source, "Failed to restore file");
                    report.failures.push(RollbackError {
                        step: record.step_id,
                        path: record.file_path,
                        source,
                    });
                }
            }
        }

        info!(
            migration_id,
            restored = report.restored.len(),
            failed = report.failures.len(),
            "Rollback finished"
        );
        report
    }
}

/// Puts one record's content back.
pub(crate) fn restore(record: &RollbackRecord, store: &dyn FileStore) -> Result<(), ScanError> {
    match &record.original_content {
        Some(content) => store.write(&record.file_path, content),
        None => store.remove(&record.file_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_scanner::MemoryFileStore;

    fn record(step: &str, path: &str, content: Option<&str>) -> RollbackRecord {
        RollbackRecord {
            step_id: StepId::from(step),
            file_path: Utf8PathBuf::from(path),
            original_content: content.map(str::to_owned),
        }
    }

    #[test]
    fn test_rollback_restores_in_lifo_order() {
        let store = MemoryFileStore::with_files([("a.js", "v2")]);
        let manager = RollbackManager::new();
        manager.push("m", record("s0", "a.js", Some("v0")));
        manager.push("m", record("s1", "a.js", Some("v1")));
        assert_eq!(manager.depth("m"), 2);

        let report = manager.rollback("m", &store);

        assert!(report.is_clean());
        assert_eq!(report.restored, vec![StepId::from("s1"), StepId::from("s0")]);
        assert_eq!(store.get("a.js").as_deref(), Some("v0"));
        assert!(!manager.has_records("m"));
    }

    #[test]
    fn test_missing_original_removes_file() {
        let store = MemoryFileStore::with_files([("tsconfig.json", "{}")]);
        let manager = RollbackManager::new();
        manager.push("m", record("c", "tsconfig.json", None));

        manager.rollback("m", &store);
        assert!(store.get("tsconfig.json").is_none());
    }

    #[test]
    fn test_failed_restore_does_not_stop_unwind() {
        let store = MemoryFileStore::with_files([("a.js", "new a"), ("b.js", "new b")]);
        store.deny_writes("b.js");
        let manager = RollbackManager::new();
        manager.push("m", record("s0", "a.js", Some("old a")));
        manager.push("m", record("s1", "b.js", Some("old b")));

        let report = manager.rollback("m", &store);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "b.js");
        assert_eq!(report.restored, vec![StepId::from("s0")]);
        assert_eq!(store.get("a.js").as_deref(), Some("old a"));
    }

    #[test]
    fn test_second_rollback_is_noop() {
        let store = MemoryFileStore::with_files([("a.js", "new")]);
        let manager = RollbackManager::new();
        manager.push("m", record("s0", "a.js", Some("old")));

        manager.rollback("m", &store);
        store.insert("a.js", "edited later");
        let report = manager.rollback("m", &store);

        assert!(report.restored.is_empty());
        assert_eq!(store.get("a.js").as_deref(), Some("edited later"));
    }

    #[test]
    fn test_pop_step_only_takes_matching_top() {
        let manager = RollbackManager::new();
        manager.push("m", record("s0", "a.js", Some("old")));

        assert!(manager.pop_step("m", &StepId::from("s1")).is_none());
        assert_eq!(manager.depth("m"), 1);

        let popped = manager.pop_step("m", &StepId::from("s0"));
        assert_eq!(popped, Some(record("s0", "a.js", Some("old"))));
        assert!(!manager.has_records("m"));
    }

    #[test]
    fn test_stacks_are_per_migration() {
        let manager = RollbackManager::new();
        manager.push("a", record("s", "x.js", None));
        manager.push("b", record("s", "y.js", None));
        manager.discard("a");

        assert_eq!(manager.depth("a"), 0);
        assert_eq!(manager.depth("b"), 1);
    }
}
