// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ObjectId, ObjectKind, ObjectStore, OdbResult};

/// Object store keeping everything in process memory.
///
/// Ids are real git ids, so objects written here can be compared with
/// objects from an on-disk repository.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectId, (ObjectKind, Vec<u8>)>>,
    references: Mutex<BTreeMap<String, ObjectId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    /// Snapshot of all references.
    #[must_use]
    pub fn references(&self) -> BTreeMap<String, ObjectId> {
        lock(&self.references).clone()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn write_object(&self, kind: ObjectKind, data: &[u8]) -> OdbResult<ObjectId> {
        let id = ObjectId::hash_object(kind, data)?;
        lock(&self.objects)
            .entry(id)
            .or_insert_with(|| (kind, data.to_vec()));
        Ok(id)
    }

    fn try_read_object(&self, id: &ObjectId) -> OdbResult<Option<(ObjectKind, Vec<u8>)>> {
        Ok(lock(&self.objects).get(id).cloned())
    }

    fn find_reference(&self, name: &str) -> OdbResult<Option<ObjectId>> {
        Ok(lock(&self.references).get(name).copied())
    }

    fn set_reference(&self, name: &str, target: ObjectId, _log_message: &str) -> OdbResult<()> {
        lock(&self.references).insert(name.to_string(), target);
        Ok(())
    }
}
