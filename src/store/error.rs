use crate::forms::ValidationError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("table {table} not found in {}", .path.display())]
    NotFound { table: String, path: PathBuf },
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read workbook {}: {message}", .path.display())]
    WorkbookRead { path: PathBuf, message: String },
    #[error("failed to write workbook {}: {source}", .path.display())]
    WorkbookWrite {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("table {table} is malformed: {reason}")]
    Malformed { table: String, reason: String },
    #[error("table {table} does not support {operation}")]
    LayoutMismatch {
        table: String,
        operation: &'static str,
    },
    #[error("invalid change to table {table}: {reason}")]
    InvalidEdit { table: String, reason: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// The user-facing buckets every store failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Io,
}

impl StoreError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) | Self::InvalidEdit { .. } => ErrorCategory::Validation,
            Self::UnknownTable(_) | Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Malformed { .. } | Self::LayoutMismatch { .. } => ErrorCategory::Conflict,
            Self::Io { .. } | Self::WorkbookRead { .. } | Self::WorkbookWrite { .. } => {
                ErrorCategory::Io
            }
        }
    }
}
