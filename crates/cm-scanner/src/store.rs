//! File stores: the narrow read/write interface the engine uses for all
//! file content.
//!
//! - [`FsFileStore`] resolves project-relative paths against a root directory
//! - [`MemoryFileStore`] keeps files in a map and counts writes; it is also a
//!   [`FileScanner`](crate::FileScanner), which makes it a complete fake
//!   project for tests

use std::fs;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use cm_core::{FxHashMap, FxHashSet, MigrationConfig, fx_hash_map, fx_hash_set};
use parking_lot::RwLock;
use tracing::trace;

use crate::error::ScanError;
use crate::filter::{FileFilter, PathFilter};
use crate::walker::FileScanner;

/// Read/write access to project files.
///
/// Paths are relative to the project root. Implementations must be safe to
/// share across threads: planning reads files from the rayon pool and
/// execution calls the store from the blocking pool.
pub trait FileStore: Send + Sync {
    /// Reads a file.
    fn read(&self, path: &Utf8Path) -> Result<String, ScanError>;

    /// Writes a file, creating parent directories as needed.
    fn write(&self, path: &Utf8Path, content: &str) -> Result<(), ScanError>;

    /// Removes a file. Removing a missing file is not an error.
    fn remove(&self, path: &Utf8Path) -> Result<(), ScanError>;

    /// Returns `true` if the file exists.
    fn exists(&self, path: &Utf8Path) -> bool;
}

/// File store over a directory on disk.
#[derive(Debug, Clone)]
pub struct FsFileStore {
    root: Utf8PathBuf,
}

impl FsFileStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }
}

impl FileStore for FsFileStore {
    fn read(&self, path: &Utf8Path) -> Result<String, ScanError> {
        let full = self.resolve(path);
        fs::read_to_string(&full).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ScanError::NotFound(path.to_owned()),
            _ => ScanError::read(path, e),
        })
    }

    fn write(&self, path: &Utf8Path, content: &str) -> Result<(), ScanError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| ScanError::write(path, e))?;
        }
        fs::write(&full, content).map_err(|e| ScanError::write(path, e))?;
        trace!(path = %path, bytes = content.len(), "Wrote file");
        Ok(())
    }

    fn remove(&self, path: &Utf8Path) -> Result<(), ScanError> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ScanError::write(path, e)),
        }
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.resolve(path).is_file()
    }
}

/// In-memory project used by tests and dry experiments.
///
/// # Examples
///
/// ```
/// use cm_scanner::{FileStore, MemoryFileStore};
/// use camino::Utf8Path;
///
/// let store = MemoryFileStore::with_files([("src/a.js", "var a;")]);
/// store.write(Utf8Path::new("src/a.js"), "let a;")?;
///
/// assert_eq!(store.get("src/a.js").as_deref(), Some("let a;"));
/// assert_eq!(store.write_count(), 1);
/// # Ok::<(), cm_scanner::ScanError>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<FxHashMap<Utf8PathBuf, String>>,
    read_only: RwLock<FxHashSet<Utf8PathBuf>>,
    writes: AtomicU64,
}

impl MemoryFileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(fx_hash_map()),
            read_only: RwLock::new(fx_hash_set()),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a store holding the given files.
    #[must_use]
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<Utf8PathBuf>,
        C: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.files.write();
            for (path, content) in files {
                map.insert(path.into(), content.into());
            }
        }
        store
    }

    /// Inserts a file without counting it as a write.
    pub fn insert(&self, path: impl Into<Utf8PathBuf>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    /// Returns a file's content.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        self.files.read().get(path.as_ref()).cloned()
    }

    /// Makes writes and removals of `path` fail with a permission error.
    pub fn deny_writes(&self, path: impl Into<Utf8PathBuf>) {
        self.read_only.write().insert(path.into());
    }

    /// Number of successful `write` calls.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// A copy of every file, sorted by path.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Utf8PathBuf, String)> {
        let mut files: Vec<_> = self
            .files
            .read()
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }

    fn check_writable(&self, path: &Utf8Path) -> Result<(), ScanError> {
        if self.read_only.read().contains(path) {
            return Err(ScanError::write(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "file is read-only"),
            ));
        }
        Ok(())
    }
}

impl FileStore for MemoryFileStore {
    fn read(&self, path: &Utf8Path) -> Result<String, ScanError> {
        self.get(path)
            .ok_or_else(|| ScanError::NotFound(path.to_owned()))
    }

    fn write(&self, path: &Utf8Path, content: &str) -> Result<(), ScanError> {
        self.check_writable(path)?;
        self.files
            .write()
            .insert(path.to_owned(), content.to_owned());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, path: &Utf8Path) -> Result<(), ScanError> {
        self.check_writable(path)?;
        self.files.write().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.files.read().contains_key(path)
    }
}

impl FileScanner for MemoryFileStore {
    fn list_files(&self, config: &MigrationConfig) -> Result<Vec<Utf8PathBuf>, ScanError> {
        let filter = PathFilter::from_config(config)?;
        let mut paths: Vec<_> = self
            .files
            .read()
            .keys()
            .filter(|p| filter.should_process(p))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}
