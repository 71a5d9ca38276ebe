// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bare on-disk repository backed by gix.
//!
//! The handle is kept as a `ThreadSafeRepository` (`Sync` through gix's
//! `parallel` feature) and turned into a thread-local `Repository` per call.

use std::path::{Path, PathBuf};

use gix::objs::Write as _;
use gix::refs::transaction::PreviousValue;
use tracing::debug;

use super::{ObjectId, ObjectKind, ObjectStore, OdbResult};
use crate::error::ObjectStoreError;

/// Object store over a bare git repository.
pub struct GixObjectStore {
    repo: gix::ThreadSafeRepository,
    git_dir: PathBuf,
}

impl std::fmt::Debug for GixObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GixObjectStore")
            .field("git_dir", &self.git_dir)
            .finish_non_exhaustive()
    }
}

impl GixObjectStore {
    /// Open the bare repository at `path`, initializing it when absent.
    ///
    /// # Errors
    ///
    /// Returns an `ObjectStoreError` if the path exists but is not a
    /// repository, or if initialization fails.
    pub fn open_or_init(path: &Path) -> OdbResult<Self> {
        let is_empty = std::fs::read_dir(path).map_or(true, |mut dir| dir.next().is_none());
        let repo = if is_empty {
            debug!(path = %path.display(), "initializing bare repository");
            std::fs::create_dir_all(path)
                .map_err(|e| ObjectStoreError::backend("create repository directory", e))?;
            gix::init_bare(path).map_err(|e| ObjectStoreError::backend("init repository", e))?
        } else {
            gix::open(path).map_err(|e| ObjectStoreError::backend("open repository", e))?
        };
        let git_dir = repo.git_dir().to_path_buf();
        Ok(Self {
            repo: repo.into_sync(),
            git_dir,
        })
    }

    fn local(&self) -> gix::Repository {
        self.repo.to_thread_local()
    }
}

impl ObjectStore for GixObjectStore {
    fn write_object(&self, kind: ObjectKind, data: &[u8]) -> OdbResult<ObjectId> {
        let id = self
            .local()
            .objects
            .write_buf(kind.to_gix(), data)
            .map_err(|e| ObjectStoreError::backend("write object", e))?;
        ObjectId::from_gix(&id)
    }

    fn try_read_object(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, Vec<u8>)>> {
        let repo = self.local();
        let object = repo
            .try_find_object(id.to_gix())
            .map_err(|e| ObjectStoreError::backend("read object", e))?;
        Ok(object.map(|object| (ObjectKind::from_gix(object.kind), object.data.clone())))
    }

    fn find_reference(&self, name: &str) -> OdbResult<Option<ObjectId>> {
        let repo = self.local();
        let reference = repo
            .try_find_reference(name)
            .map_err(|e| ObjectStoreError::backend("find reference", e))?;
        match reference {
            Some(reference) => reference
                .target()
                .try_id()
                .map(ObjectId::from_gix)
                .transpose(),
            None => Ok(None),
        }
    }

    fn set_reference(&self, name: &str, target: ObjectId, log_message: &str) -> OdbResult<()> {
        self.local()
            .reference(name, target.to_gix(), PreviousValue::Any, log_message)
            .map_err(|e| ObjectStoreError::backend("update reference", e))?;
        Ok(())
    }

    fn git_dir(&self) -> Option<&Path> {
        Some(&self.git_dir)
    }
}
