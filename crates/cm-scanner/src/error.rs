//! Errors raised while listing, reading and writing project files.

use camino::Utf8PathBuf;

/// A file scanner or file store failure.
///
/// Failures tied to one file ([`Read`](Self::Read), [`Write`](Self::Write),
/// [`NotFound`](Self::NotFound)) are recoverable: the planner skips the file
/// and the executor fails only the step that touched it. Everything else
/// means the file set itself cannot be resolved.
///
/// ```
/// use std::io;
/// use cm_scanner::ScanError;
///
/// let err = ScanError::read("src/app.js", io::Error::from(io::ErrorKind::InvalidData));
/// assert!(err.is_recoverable());
/// assert_eq!(err.path().map(|p| p.as_str()), Some("src/app.js"));
///
/// let err = ScanError::config("root path does not exist: /nowhere");
/// assert!(err.is_fatal());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The directory walk failed.
    #[error("cannot walk project tree: {0}")]
    Walk(#[from] ignore::Error),

    /// A file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Project-relative path.
        path: Utf8PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written or removed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Project-relative path.
        path: Utf8PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// No such file in the store.
    #[error("no such file: {0}")]
    NotFound(Utf8PathBuf),

    /// An include or exclude glob does not compile.
    #[error("bad glob '{pattern}': {reason}")]
    InvalidGlob {
        /// Glob source.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// The scanner was set up with an unusable root.
    #[error("scanner setup: {0}")]
    Config(String),

    /// The walk produced a path that is not UTF-8.
    #[error("non UTF-8 path: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl ScanError {
    /// Shorthand for [`ScanError::Read`].
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`ScanError::Write`].
    #[inline]
    pub fn write(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`ScanError::Config`].
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The failure concerns a single file.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Write { .. } | Self::NotFound(_)
        )
    }

    /// The file set cannot be resolved.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// The file this error is about.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } | Self::NotFound(path) => {
                Some(path)
            }
            Self::Walk(_)
            | Self::InvalidGlob { .. }
            | Self::Config(_)
            | Self::NonUtf8Path(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_write_error_names_the_file() {
        let err = ScanError::write(
            "src/bar.js",
            io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        );
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "failed to write src/bar.js: read-only");
    }

    #[test]
    fn test_not_found_is_recoverable() {
        let err = ScanError::NotFound("package.json".into());
        assert!(err.is_recoverable());
        assert_eq!(err.path().map(|p| p.as_str()), Some("package.json"));
    }

    #[test]
    fn test_setup_errors_are_fatal() {
        let glob = ScanError::InvalidGlob {
            pattern: "src/[".to_owned(),
            reason: "unclosed class".to_owned(),
        };
        assert!(glob.is_fatal());
        assert!(glob.path().is_none());
        assert_eq!(glob.to_string(), "bad glob 'src/[': unclosed class");
        assert!(ScanError::config("x").is_fatal());
    }
}
