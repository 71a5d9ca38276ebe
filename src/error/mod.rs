// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error handling module.
//!
//! ```text
//!                  StoreError (~24 bytes)
//!                         |
//!   +-------+------+------+------+------+------+------+
//!   |       |      |      |      |      |      |      |
//!   v       v      v      v      v      v      v      v
//! Release Locked Team  Batch  Invalid  Fs   Odb   Push/Remote
//!   Box    Box   Box    Box    Json    Box   Box   Db/Config Box
//!
//! Domain errors (comparable, mapped 1:1 by the API layer):
//!   CreateReleaseError  GeneralFailure, AlreadyExistsSame,
//!                       AlreadyExistsDifferent, TooOld, AppNameTooLong
//!   LockedError         env / env-app / team lock maps
//!   TeamNotFoundError   compared by kind only
//!   TransformerBatchApplyError  failing index + cause
//!   InvalidJson         triggers one fetch-and-reset cycle
//!
//! Infrastructure errors (compared by message):
//!   FsError  ObjectStoreError  RemoteError  PushError  DbError  ConfigError
//! ```

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::state::Lock;

/// Convenience alias for `anyhow::Result`.
pub type Result<T> = anyhow::Result<T>;

/// Result type using [`StoreError`].
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Top-level store error type.
///
/// All sub-errors are boxed to keep this enum at ~24 bytes on the stack.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Release creation was refused.
    #[error(transparent)]
    CreateRelease(Box<CreateReleaseError>),

    /// A deployment was blocked by active locks.
    #[error(transparent)]
    Locked(Box<LockedError>),

    /// The team of an application could not be resolved.
    #[error(transparent)]
    TeamNotFound(Box<TeamNotFoundError>),

    /// One transformer of a batch failed.
    #[error(transparent)]
    Batch(Box<TransformerBatchApplyError>),

    /// A name or identifier failed validation.
    #[error("{0}")]
    InvalidArgument(Box<str>),

    /// Persisted state is structurally broken.
    #[error("invalid json in '{0}'")]
    InvalidJson(Box<str>),

    /// Virtual filesystem error.
    #[error("filesystem error: {0}")]
    Fs(Box<FsError>),

    /// Object store error.
    #[error("object store error: {0}")]
    ObjectStore(Box<ObjectStoreError>),

    /// Push to the manifest repository failed.
    #[error("push error: {0}")]
    Push(Box<PushError>),

    /// Fetch or push transport error.
    #[error("remote error: {0}")]
    Remote(Box<RemoteError>),

    /// Relational store lookup failed.
    #[error("database error: {0}")]
    Db(Box<DbError>),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(Box<ConfigError>),

    /// Generic error with message.
    #[error("{0}")]
    Other(Box<str>),
}

impl StoreError {
    /// Create a [`StoreError::Other`] from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into().into_boxed_str())
    }

    /// Create a [`StoreError::InvalidArgument`] from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into().into_boxed_str())
    }

    /// Create a [`StoreError::InvalidJson`] for a tree path.
    pub fn invalid_json(path: impl Into<String>) -> Self {
        Self::InvalidJson(path.into().into_boxed_str())
    }

    /// Whether this error, or the cause of a batch error, marks broken
    /// persisted data.
    #[must_use]
    pub fn is_invalid_json(&self) -> bool {
        match self {
            Self::InvalidJson(_) => true,
            Self::Batch(batch) => batch.source.is_invalid_json(),
            _ => false,
        }
    }

    /// Returns the [`LockedError`] carried by this error, if any.
    #[must_use]
    pub fn as_locked(&self) -> Option<&LockedError> {
        match self {
            Self::Locked(locked) => Some(locked),
            Self::Batch(batch) => batch.source.as_locked(),
            _ => None,
        }
    }

    /// Returns the [`CreateReleaseError`] carried by this error, if any.
    #[must_use]
    pub fn as_create_release(&self) -> Option<&CreateReleaseError> {
        match self {
            Self::CreateRelease(err) => Some(err),
            Self::Batch(batch) => batch.source.as_create_release(),
            _ => None,
        }
    }

    /// Whether this error is a fast-forward conflict on push.
    #[must_use]
    pub fn is_fast_forward_conflict(&self) -> bool {
        matches!(self, Self::Push(err) if matches!(**err, PushError::FastForward))
    }
}

impl PartialEq for StoreError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::CreateRelease(a), Self::CreateRelease(b)) => a == b,
            (Self::Locked(a), Self::Locked(b)) => a == b,
            (Self::TeamNotFound(_), Self::TeamNotFound(_)) => true,
            (Self::Batch(a), Self::Batch(b)) => a == b,
            (Self::InvalidJson(_), Self::InvalidJson(_)) => true,
            (Self::Push(a), Self::Push(b)) => a == b,
            (Self::Fs(a), Self::Fs(b)) => a == b,
            (a, b) => {
                std::mem::discriminant(a) == std::mem::discriminant(b)
                    && a.to_string() == b.to_string()
            }
        }
    }
}

// --- From implementations for boxing ---

/// Macro to generate `From` implementations that box the source error.
macro_rules! impl_from_boxed {
    ($($error:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$error> for StoreError {
                fn from(err: $error) -> Self {
                    StoreError::$variant(Box::new(err))
                }
            }
        )+
    };
}

impl_from_boxed! {
    CreateReleaseError => CreateRelease,
    LockedError => Locked,
    TeamNotFoundError => TeamNotFound,
    TransformerBatchApplyError => Batch,
    FsError => Fs,
    ObjectStoreError => ObjectStore,
    PushError => Push,
    RemoteError => Remote,
    DbError => Db,
    ConfigError => Config,
}

// --- Release Errors ---

/// Release field compared when a release is created twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseField {
    SourceCommitId,
    SourceAuthor,
    SourceMessage,
    DisplayVersion,
    Team,
    Manifests,
}

impl fmt::Display for ReleaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SourceCommitId => "SOURCE_COMMIT_ID",
            Self::SourceAuthor => "SOURCE_AUTHOR",
            Self::SourceMessage => "SOURCE_MESSAGE",
            Self::DisplayVersion => "DISPLAY_VERSION",
            Self::Team => "TEAM",
            Self::Manifests => "MANIFESTS",
        };
        f.write_str(name)
    }
}

/// Outcome of a refused release creation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreateReleaseError {
    /// Any failure that is not one of the structured cases below.
    #[error("general failure: {0}")]
    GeneralFailure(String),

    /// The release exists with identical content.
    #[error("release already exists with the same content")]
    AlreadyExistsSame,

    /// The release exists with different content.
    #[error("release already exists with a different {field}:\n{diff}")]
    AlreadyExistsDifferent { field: ReleaseField, diff: String },

    /// The release would be removed by the next retention cleanup.
    #[error("release is too old")]
    TooOld,

    /// The application name is invalid.
    #[error(
        "invalid application name: '{app}' - must match regexp '{pattern}' and <= {max_len} characters"
    )]
    AppNameTooLong {
        app: String,
        pattern: String,
        max_len: usize,
    },
}

// --- Lock Errors ---

/// A deployment was refused because locks are active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("locked")]
pub struct LockedError {
    pub environment_application_locks: BTreeMap<String, Lock>,
    pub environment_locks: BTreeMap<String, Lock>,
    pub team_locks: BTreeMap<String, Lock>,
}

impl LockedError {
    /// Whether no lock is recorded at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environment_application_locks.is_empty()
            && self.environment_locks.is_empty()
            && self.team_locks.is_empty()
    }
}

/// The team of an application could not be found.
///
/// Two values compare equal regardless of their cause.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct TeamNotFoundError {
    cause: Box<str>,
}

impl TeamNotFoundError {
    pub fn new(cause: impl fmt::Display) -> Self {
        Self {
            cause: cause.to_string().into_boxed_str(),
        }
    }
}

impl PartialEq for TeamNotFoundError {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

// --- Batch Errors ---

/// A transformer batch failed.
#[derive(Debug, PartialEq, Error)]
pub struct TransformerBatchApplyError {
    /// Index of the failing transformer, `None` when not attributable.
    pub index: Option<usize>,
    #[source]
    pub source: StoreError,
}

impl TransformerBatchApplyError {
    #[must_use]
    pub const fn at(index: usize, source: StoreError) -> Self {
        Self {
            index: Some(index),
            source,
        }
    }

    #[must_use]
    pub const fn unattributed(source: StoreError) -> Self {
        Self {
            index: None,
            source,
        }
    }
}

impl fmt::Display for TransformerBatchApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(
                f,
                "error at index {index} of transformer batch: {}",
                self.source
            ),
            None => write!(
                f,
                "error not specific to one transformer of this batch: {}",
                self.source
            ),
        }
    }
}

// --- Filesystem Errors ---

/// Virtual filesystem errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("file does not exist: {0}")]
    NotFound(String),

    #[error("is a directory: {0}")]
    IsDirectory(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a symlink: {0}")]
    NotASymlink(String),

    #[error("refusing to overwrite '{0}' with empty content")]
    EmptyOverwrite(String),

    #[error("too many levels of symbolic links: {0}")]
    SymlinkLoop(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl FsError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl StoreError {
    /// Whether this is a missing-path filesystem error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Fs(err) if err.is_not_found())
    }
}

// --- Object Store Errors ---

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Object is not present in any backend.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Object exists but has another kind than requested.
    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        id: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Object data could not be decoded.
    #[error("corrupt object {id}: {message}")]
    Corrupt { id: String, message: String },

    /// Invalid hexadecimal object id.
    #[error("invalid object id '{0}'")]
    InvalidId(String),

    /// Error reported by the storage backend.
    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ObjectStoreError {
    pub(crate) fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

// --- Remote Errors ---

/// Transport errors of fetch and push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The remote refused the update because it is not a fast-forward.
    #[error("non-fast-forward update: {0}")]
    NonFastForward(String),

    /// The network call did not finish before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other transport failure.
    #[error("{command} failed: {message}")]
    Transport { command: String, message: String },
}

impl RemoteError {
    /// Permanent errors are never retried by the push loop.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::NonFastForward(_) | Self::Cancelled)
    }
}

/// Errors of the top-level push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PushError {
    /// The remote branch advanced; the batch must be re-applied.
    #[error("fastforward error")]
    FastForward,

    /// The deadline passed or the caller cancelled.
    #[error("context error")]
    Context,

    /// The push failed for another reason.
    #[error(
        "could not push to manifest repository '{url}' on branch '{branch}' - this indicates that the ssh key does not have write access"
    )]
    NoWriteAccess { url: String, branch: String },

    /// The push completed but the remote did not accept the ref update.
    #[error(
        "failed to push - this indicates that branch protection is enabled in '{url}' on branch '{branch}'"
    )]
    BranchProtected { url: String, branch: String },
}

impl PushError {
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::FastForward | Self::Context)
    }
}

// --- Relational Store Errors ---

/// Relational store lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Lookup returned nothing where a row is required.
    #[error("{0}")]
    Missing(String),

    /// The store itself failed.
    #[error("query '{query}' failed: {message}")]
    Query { query: String, message: String },
}

// --- Config Errors ---

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required configuration key.
    #[error("missing required config key '{key}' in section '[{section}]'")]
    MissingKey { section: String, key: String },

    /// Invalid configuration value.
    #[error("invalid value for '{key}' in section '[{section}]': {message}")]
    InvalidValue {
        section: String,
        key: String,
        message: String,
    },
}

#[cfg(test)]
mod tests;
