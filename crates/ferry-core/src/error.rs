//! Error types for jobs and scanning.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Operation;

/// Errors raised while validating a job descriptor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// The operation needs a destination directory.
    #[error("{operation} requires a destination directory")]
    MissingDestination { operation: Operation },

    /// The operation does not take a destination directory.
    #[error("{operation} does not take a destination directory")]
    UnexpectedDestination { operation: Operation },

    /// A source or destination path is not absolute.
    #[error("Path is not absolute: {path}")]
    RelativePath { path: PathBuf },

    /// A chmod/chown job with nothing to change.
    #[error("Nothing to change: no permission edits, owner or group given")]
    EmptyChmod,

    /// A permission specification could not be parsed.
    #[error("Invalid permission specification '{spec}': {message}")]
    InvalidPermissions { spec: String, message: String },

    /// Builder-level failure (missing field).
    #[error("{message}")]
    Builder { message: String },
}

impl From<derive_builder::UninitializedFieldError> for DescriptorError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::Builder {
            message: err.to_string(),
        }
    }
}

/// Errors raised while validating engine configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A streaming copy cannot make progress with an empty buffer.
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// Errors that halt a running job.
#[derive(Debug, Error)]
pub enum OperationError {
    /// A system call failed after the operation was attempted.
    #[error("Failed to {op} {path}: {source}")]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A directory was about to be copied or moved into itself.
    #[error("Cannot copy or move {path} into itself")]
    IntoItself { path: PathBuf },
}

impl OperationError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, op: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            op,
            source,
        }
    }

    /// The path the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::IntoItself { path } => path,
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
}

/// Non-fatal problem met while sizing a job.
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

    /// Create a warning from an I/O error, classifying permission problems.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error, kind: WarningKind) -> Self {
        let kind = if error.kind() == std::io::ErrorKind::PermissionDenied {
            WarningKind::PermissionDenied
        } else {
            kind
        };
        Self::new(path, error.to_string(), kind)
    }
}
