// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Versioned object store abstraction.
//!
//! ```text
//!            ObjectStore (raw kind + bytes, refs)
//!                 |
//!   +-------------+---------------+
//!   v             v               v
//! GixObjectStore MemoryObjectStore LayeredObjectStore
//! (bare repo)    (tests)           (priority-ordered backends)
//!
//! typed helpers (provided methods):
//!   write_blob / write_tree / write_commit
//!   read_blob  / read_tree  / read_commit
//!        |
//!        v
//!     codec (gix-object tree + commit encoding)
//! ```
//!
//! Every backend stores objects in git's canonical encoding, so a commit
//! built on one backend can be pushed by the git CLI from another.

mod codec;
mod disk;
mod layered;
mod memory;

pub use disk::GixObjectStore;
pub use layered::LayeredObjectStore;
pub use memory::MemoryObjectStore;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use gix::bstr::BString;

use crate::error::ObjectStoreError;

/// Result type for object store operations.
pub type OdbResult<T> = std::result::Result<T, ObjectStoreError>;

/// A SHA-1 object id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a 40 character hexadecimal id.
    ///
    /// # Errors
    ///
    /// Returns `ObjectStoreError::InvalidId` if the input is not 40 hex digits.
    pub fn from_hex(text: &str) -> OdbResult<Self> {
        let id = gix::ObjectId::from_hex(text.as_bytes())
            .map_err(|_| ObjectStoreError::InvalidId(text.to_string()))?;
        Self::from_gix(&id)
    }

    /// Id of an object with this kind and canonical content.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if hashing detects a SHA-1 collision attack.
    pub fn hash_object(kind: ObjectKind, data: &[u8]) -> OdbResult<Self> {
        let id = gix::objs::compute_hash(gix::hash::Kind::Sha1, kind.to_gix(), data)
            .map_err(|e| ObjectStoreError::backend("hash object", e))?;
        Self::from_gix(&id)
    }

    pub(crate) fn from_gix(id: &gix::oid) -> OdbResult<Self> {
        let bytes: [u8; 20] = id
            .as_bytes()
            .try_into()
            .map_err(|_| ObjectStoreError::InvalidId(id.to_string()))?;
        Ok(Self(bytes))
    }

    pub(crate) fn to_gix(self) -> gix::ObjectId {
        gix::ObjectId::from(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_gix(), f)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = ObjectStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub(crate) const fn to_gix(self) -> gix::objs::Kind {
        match self {
            Self::Blob => gix::objs::Kind::Blob,
            Self::Tree => gix::objs::Kind::Tree,
            Self::Commit => gix::objs::Kind::Commit,
            Self::Tag => gix::objs::Kind::Tag,
        }
    }

    pub(crate) const fn from_gix(kind: gix::objs::Kind) -> Self {
        match kind {
            gix::objs::Kind::Blob => Self::Blob,
            gix::objs::Kind::Tree => Self::Tree,
            gix::objs::Kind::Commit => Self::Commit,
            gix::objs::Kind::Tag => Self::Tag,
        }
    }
}

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    Tree,
    Blob,
    BlobExecutable,
    Link,
    Submodule,
}

impl EntryMode {
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }
}

/// One entry of a tree object.
///
/// Names are raw bytes; git does not require them to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: BString,
    pub mode: EntryMode,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<BString>, mode: EntryMode, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            mode,
            id,
        }
    }
}

/// Author or committer identity with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: DateTime<FixedOffset>,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        time: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            time,
        }
    }
}

/// A decoded commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

/// Storage backend for git objects and references.
///
/// Implementations only deal with raw, canonically encoded objects; the
/// typed helpers are provided on top of them.
pub trait ObjectStore: Send + Sync {
    /// Store an object, returning its id. Writing an existing object is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the backend cannot persist the object.
    fn write_object(&self, kind: ObjectKind, data: &[u8]) -> OdbResult<ObjectId>;

    /// Look up an object. `None` means this backend does not have it.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the backend fails to read.
    fn try_read_object(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, Vec<u8>)>>;

    /// Resolve a fully qualified reference such as `refs/heads/master`.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the reference store cannot be read.
    fn find_reference(&self, name: &str) -> OdbResult<Option<ObjectId>>;

    /// Point a reference at an object, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the reference cannot be written.
    fn set_reference(&self, name: &str, target: ObjectId, log_message: &str) -> OdbResult<()>;

    /// On-disk git directory, when the backend has one.
    fn git_dir(&self) -> Option<&Path> {
        None
    }

    /// Read an object that must exist.
    ///
    /// # Errors
    ///
    /// Returns `ObjectStoreError::NotFound` if no object has this id.
    fn read_object(&self, id: &ObjectId) -> OdbResult<(ObjectKind, Vec<u8>)> {
        self.try_read_object(id)?
            .ok_or_else(|| ObjectStoreError::NotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the backend cannot persist the blob.
    fn write_blob(&self, data: &[u8]) -> OdbResult<ObjectId> {
        self.write_object(ObjectKind::Blob, data)
    }

    /// Entries are sorted into git order before encoding.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the backend cannot persist the tree.
    fn write_tree(&self, entries: &[TreeEntry]) -> OdbResult<ObjectId> {
        self.write_object(ObjectKind::Tree, &codec::encode_tree(entries)?)
    }

    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the backend cannot persist the commit.
    fn write_commit(&self, commit: &CommitInfo) -> OdbResult<ObjectId> {
        self.write_object(ObjectKind::Commit, &codec::encode_commit(commit)?)
    }

    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the object is missing or not a blob.
    fn read_blob(&self, id: &ObjectId) -> OdbResult<Vec<u8>> {
        expect_kind(id, ObjectKind::Blob, self.read_object(id)?)
    }

    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the object is missing, not a tree or corrupt.
    fn read_tree(&self, id: &ObjectId) -> OdbResult<Vec<TreeEntry>> {
        let data = expect_kind(id, ObjectKind::Tree, self.read_object(id)?)?;
        codec::decode_tree(id, &data)
    }

    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the object is missing, not a commit or corrupt.
    fn read_commit(&self, id: &ObjectId) -> OdbResult<CommitInfo> {
        let data = expect_kind(id, ObjectKind::Commit, self.read_object(id)?)?;
        codec::decode_commit(id, &data)
    }
}

fn expect_kind(
    id: &ObjectId,
    expected: ObjectKind,
    (kind, data): (ObjectKind, Vec<u8>),
) -> OdbResult<Vec<u8>> {
    if kind == expected {
        Ok(data)
    } else {
        Err(ObjectStoreError::UnexpectedKind {
            id: id.to_string(),
            expected: expected.as_str(),
            actual: kind.as_str(),
        })
    }
}
