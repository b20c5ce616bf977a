//! Error types for cueconfig-fs

use std::path::PathBuf;

/// Result type for cueconfig-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cueconfig-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No such file or directory: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl Error {
    /// Wrap an I/O error, mapping `NotFound` onto [`Error::NotFound`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports a path that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found_variant() {
        let err = Error::io(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "No such file or directory: /missing");
    }

    #[test]
    fn other_io_errors_stay_io() {
        let err = Error::io(
            "/locked",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("/locked"));
    }
}
