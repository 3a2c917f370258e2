//! Error types for patchset-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::ObjectKey;

/// Errors surfaced by a remote store and by store file persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object no longer exists.
    #[error("{key} not found")]
    NotFound { key: ObjectKey },

    /// The supplied version token is stale.
    #[error("conflict on {key}: {message}")]
    Conflict { key: ObjectKey, message: String },

    /// The call was abandoned because the commit was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The call was abandoned because the commit deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Any unclassified transport or server failure.
    #[error("{0}")]
    Other(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse store file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Classification used when aggregating failures.
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::NotFound { .. } => FailureKind::NotFound,
            StoreError::Conflict { .. } => FailureKind::Conflict,
            StoreError::Cancelled => FailureKind::Cancelled,
            StoreError::DeadlineExceeded => FailureKind::DeadlineExceeded,
            StoreError::Other(_)
            | StoreError::Io { .. }
            | StoreError::Yaml { .. }
            | StoreError::Json(_) => FailureKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Coarse classification of a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureKind {
    NotFound,
    Conflict,
    Cancelled,
    DeadlineExceeded,
    Other,
}

impl FailureKind {
    /// Whether the failure came from the caller's context rather than the store.
    pub fn is_cancellation(self) -> bool {
        matches!(self, FailureKind::Cancelled | FailureKind::DeadlineExceeded)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NotFound => write!(f, "not-found"),
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::DeadlineExceeded => write!(f, "deadline-exceeded"),
            FailureKind::Other => write!(f, "other"),
        }
    }
}

/// All errors that can arise from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse catalog at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
