//! core::errors
//!
//! The error taxonomy shared by the sync engine.
//!
//! Every failure that crosses a module boundary ends up as a
//! [`BridgeError`]. Module-local errors ([`DeltaError`], [`CacheError`],
//! [`ConfigError`], [`LockError`], [`TargetError`]) convert into it.
//!
//! # Categories
//!
//! | [`ErrorKind`] | Meaning | Policy |
//! |---|---|---|
//! | `NotFound` | revision or path absent | always surfaces |
//! | `OutOfDate` | base assumption invalidated by a concurrent write | always surfaces |
//! | `MalformedMetadata` | a mapping property violates its grammar | non-fatal on read |
//! | `UnsupportedOperation` | missing server capability | one fallback, then surfaces |
//! | `ProtocolViolation` | editor driven out of sequence, corrupt data | fatal |
//! | `Cancelled` | consumer abandoned a streaming log fetch | internal |
//!
//! [`DeltaError`]: crate::delta::DeltaError
//! [`CacheError`]: crate::history::CacheError
//! [`ConfigError`]: crate::core::config::ConfigError
//! [`LockError`]: crate::core::ops::lock::LockError
//! [`TargetError`]: crate::target::TargetError

use thiserror::Error;

use crate::core::config::ConfigError;
use crate::core::ops::lock::LockError;
use crate::core::types::{RevNum, TypeError};
use crate::delta::DeltaError;
use crate::history::CacheError;
use crate::target::TargetError;

/// Convenience alias used throughout the engine.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Coarse error category, used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    OutOfDate,
    MalformedMetadata,
    UnsupportedOperation,
    ProtocolViolation,
    Cancelled,
    Internal,
}

/// Errors from the sync engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no such revision {revnum}")]
    NoSuchRevision { revnum: RevNum },

    #[error("path '{path}' does not exist in revision {revnum}")]
    PathNotFound { path: String, revnum: RevNum },

    #[error("revision id '{revid}' not found")]
    RevisionIdNotFound { revid: String },

    #[error("prefix '{path}' for branch does not exist")]
    MissingPrefix { path: String },

    #[error("'{path}' is out of date (base revision {base_revnum})")]
    OutOfDate { path: String, base_revnum: RevNum },

    #[error("branch '{branch}' is append-only; refusing to replace its history")]
    AppendRevisionsOnlyViolation { branch: String },

    #[error("malformed metadata in '{property}': {reason}")]
    MalformedMetadata { property: String, reason: String },

    #[error("invalid revision id '{revid}'")]
    InvalidRevisionId { revid: String },

    #[error("unsupported operation: {operation}")]
    Unsupported { operation: String },

    #[error("editor protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("operation cancelled by consumer")]
    Cancelled,

    #[error(transparent)]
    InvalidValue(#[from] TypeError),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoSuchRevision { .. }
            | Self::PathNotFound { .. }
            | Self::RevisionIdNotFound { .. }
            | Self::MissingPrefix { .. } => ErrorKind::NotFound,
            Self::OutOfDate { .. } | Self::AppendRevisionsOnlyViolation { .. } => {
                ErrorKind::OutOfDate
            }
            Self::MalformedMetadata { .. } | Self::InvalidRevisionId { .. } => {
                ErrorKind::MalformedMetadata
            }
            Self::Unsupported { .. } => ErrorKind::UnsupportedOperation,
            Self::ProtocolViolation { .. } | Self::ChecksumMismatch { .. } | Self::Delta(_) => {
                ErrorKind::ProtocolViolation
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Cache(CacheError::NoSuchRevision { .. }) => ErrorKind::NotFound,
            Self::Cache(CacheError::IncompleteLog { .. }) => ErrorKind::ProtocolViolation,
            Self::Target(e) if e.is_structural() => ErrorKind::ProtocolViolation,
            Self::InvalidValue(_)
            | Self::Cache(_)
            | Self::Config(_)
            | Self::Lock(_)
            | Self::Target(_)
            | Self::Io(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::UnsupportedOperation
    }

    /// Shorthand for an editor protocol violation.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Shorthand for an unsupported operation.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Shorthand for malformed property data.
    pub fn malformed(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            property: property.into(),
            reason: reason.into(),
        }
    }
}
