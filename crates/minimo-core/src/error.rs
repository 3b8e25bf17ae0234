//! Error types for snapshot operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pattern::PatternError;

/// Fatal errors that abort a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Permission denied for the snapshot root.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Snapshot root not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error on the snapshot root.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// An ignore or prune pattern failed to compile.
    #[error(transparent)]
    InvalidPattern(#[from] PatternError),

    /// The walk was cancelled by the caller.
    #[error("Snapshot cancelled")]
    Cancelled,
}

impl SnapshotError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Kind of snapshot warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Entry disappeared between listing and metadata read.
    Vanished,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Entry name is not valid UTF-8.
    InvalidName,
}

/// Non-fatal warning for an entry skipped during a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from a failed metadata read.
    pub fn metadata(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            std::io::ErrorKind::NotFound => WarningKind::Vanished,
            _ => WarningKind::MetadataError,
        };
        Self {
            message: format!("Metadata error: {error}"),
            path,
            kind,
        }
    }

    /// Create a directory read error warning.
    pub fn read_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(path, message, WarningKind::ReadError)
    }

    /// Create a warning for an entry whose name cannot be keyed.
    pub fn invalid_name(path: impl Into<PathBuf>) -> Self {
        Self::new(path, "Name is not valid UTF-8", WarningKind::InvalidName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_error_io() {
        let err = SnapshotError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SnapshotError::PermissionDenied { .. }));

        let err = SnapshotError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(err.to_string().contains("/test/path"));
    }

    #[test]
    fn test_metadata_warning_kind() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let warning = ScanWarning::metadata("/root/tmp/x", &err);
        assert_eq!(warning.kind, WarningKind::Vanished);
        assert!(warning.message.contains("gone"));
    }
}
