//! Error kinds surfaced by the lifecycle core.
//!
//! Every failure reaches the immediate caller (a lifecycle hook or one of the
//! record-facing operations). Hooks that legitimately have nothing to do
//! return [`HookOutcome::Skipped`](crate::services::lifecycle::HookOutcome)
//! instead of an error.

use crate::store::StoreError;
use std::{fmt, path::PathBuf};
use thiserror::Error;

pub type SaveableResult<T> = Result<T, SaveableError>;

#[derive(Debug, Error)]
pub enum SaveableError {
    #[error("could not find configuration key `{key}` ({setting})")]
    ConfigurationMissing { setting: String, key: String },

    #[error("invalid configuration for {setting}: {reason}")]
    ConfigurationInvalid { setting: String, reason: String },

    #[error("file error: {0}")]
    ValidationFailure(String),

    #[error(transparent)]
    NamingFailure(#[from] NamingFailure),

    #[error("could not find random unique filename after {attempts} tries")]
    NameAllocationExhausted { attempts: usize },

    #[error("could not {op} object `{key}`: {source}")]
    StoreWriteFailure {
        op: WriteOp,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("could not delete object `{key}`{compensation}: {source}")]
    StoreDeleteFailure {
        key: String,
        compensation: Compensation,
        #[source]
        source: StoreError,
    },

    #[error("could not read object `{key}`: {source}")]
    StoreReadFailure {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("{reason}: {}", .path.display())]
    LocalIoFailure { path: PathBuf, reason: String },

    #[error("object at `{path}` was deleted; attach a new file instead of relocating")]
    RecordDeleted { path: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl SaveableError {
    pub fn missing_config(setting: impl Into<String>, key: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            setting: setting.into(),
            key: key.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailure(msg.into())
    }

    pub fn local_io(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::LocalIoFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when a failed relocation left the object at both the old and the
    /// new key. Operators need to reconcile these by hand.
    pub fn is_duplicated_data(&self) -> bool {
        matches!(
            self,
            Self::StoreDeleteFailure {
                compensation: Compensation::Failed { .. },
                ..
            }
        )
    }
}

/// Why a remote key could not be chosen or accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingFailure {
    #[error("custom filename was required and was not provided")]
    NotProvided,
    #[error("custom filename was required and is not unique (`{key}`)")]
    NotUnique { key: String },
    #[error("new value for the path field cannot be empty")]
    EmptyDestination,
    #[error("new path `{key}` was not unique")]
    DestinationTaken { key: String },
    #[error("record has no stored object to relocate")]
    MissingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Put,
    Copy,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOp::Put => f.write_str("write"),
            WriteOp::Copy => f.write_str("copy"),
        }
    }
}

/// Outcome of the undo step that follows a failed source delete during a
/// relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Plain delete, nothing to undo.
    NotAttempted,
    /// The copy at `new_key` was removed again; only the original survives.
    RolledBack { new_key: String },
    /// The copy at `new_key` could not be removed; the object now exists
    /// twice.
    Failed { new_key: String, reason: String },
}

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compensation::NotAttempted => Ok(()),
            Compensation::RolledBack { new_key } => {
                write!(f, " (copy at `{}` was rolled back)", new_key)
            }
            Compensation::Failed { new_key, reason } => write!(
                f,
                " or clean up the object at the new path `{}` ({}); data is duplicated",
                new_key, reason
            ),
        }
    }
}
