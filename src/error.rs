//! Error types for dynsql.
//!
//! Content-level problems (unbalanced constructs, unrecognized conditions,
//! unknown parameters) never surface here — they degrade into anomalies on
//! the resolution result. The only hard failures are catalog I/O.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for dynsql operations.
#[derive(Debug, Error)]
pub enum DynSqlError {
    /// Reading or writing the parameter catalog store failed.
    #[error("catalog I/O error at {path}: {source}")]
    CatalogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The parameter catalog store exists but could not be decoded.
    #[error("catalog format error at {path}: {source}")]
    CatalogFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DynSqlError {
    /// Create a catalog I/O error for the given store path.
    pub fn catalog_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CatalogIo {
            path: path.into(),
            source,
        }
    }

    /// Create a catalog format error for the given store path.
    pub fn catalog_format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::CatalogFormat {
            path: path.into(),
            source,
        }
    }

    /// Catalog failures leave the in-memory catalog intact, so the caller
    /// may retry the persist step without re-resolving anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CatalogIo { .. } | Self::CatalogFormat { .. })
    }
}

/// Result type alias for dynsql operations.
pub type DynSqlResult<T> = Result<T, DynSqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DynSqlError::catalog_io(
            "/tmp/params.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/params.json"));
        assert!(msg.contains("catalog I/O error"));
    }

    #[test]
    fn test_catalog_errors_are_retryable() {
        let err = DynSqlError::catalog_io(
            "/tmp/params.json",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(err.is_retryable());
    }
}
