// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Priority-ordered composition of object stores.
//!
//! ```text
//! read:  prio 100 --miss--> prio 50 --miss--> prio 0 --miss--> None
//! write: highest priority backend only
//! refs:  highest priority backend only
//! ```

use std::path::Path;
use std::sync::Arc;

use super::{ObjectId, ObjectKind, ObjectStore, OdbResult};

struct Backend {
    priority: i32,
    store: Arc<dyn ObjectStore>,
}

/// Object store that consults several backends by priority.
///
/// Backends are registered once, before the store is handed to a
/// repository. Equal priorities keep registration order.
#[derive(Default)]
pub struct LayeredObjectStore {
    backends: Vec<Backend>,
}

impl std::fmt::Debug for LayeredObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let priorities: Vec<i32> = self.backends.iter().map(|b| b.priority).collect();
        f.debug_struct("LayeredObjectStore")
            .field("priorities", &priorities)
            .finish()
    }
}

impl LayeredObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend. Higher priorities are consulted first.
    #[must_use]
    pub fn with_backend(mut self, priority: i32, store: Arc<dyn ObjectStore>) -> Self {
        let at = self
            .backends
            .iter()
            .position(|b| b.priority < priority)
            .unwrap_or(self.backends.len());
        self.backends.insert(at, Backend { priority, store });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    fn primary(&self) -> OdbResult<&dyn ObjectStore> {
        self.backends
            .first()
            .map(|b| b.store.as_ref())
            .ok_or_else(|| {
                crate::error::ObjectStoreError::backend(
                    "select backend",
                    "no object store backend registered",
                )
            })
    }
}

impl ObjectStore for LayeredObjectStore {
    fn write_object(&self, kind: ObjectKind, data: &[u8]) -> OdbResult<ObjectId> {
        self.primary()?.write_object(kind, data)
    }

    fn try_read_object(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, Vec<u8>)>> {
        for backend in &self.backends {
            if let Some(found) = backend.store.try_read_object(id)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn find_reference(&self, name: &str) -> OdbResult<Option<ObjectId>> {
        self.primary()?.find_reference(name)
    }

    fn set_reference(&self, name: &str, target: ObjectId, log_message: &str) -> OdbResult<()> {
        self.primary()?.set_reference(name, target, log_message)
    }

    fn git_dir(&self) -> Option<&Path> {
        self.backends.first().and_then(|b| b.store.git_dir())
    }
}
