// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{RefSpec, RefUpdate, Remote, RemoteResult, copy_reachable, is_ancestor};
use crate::error::RemoteError;
use crate::odb::{MemoryObjectStore, ObjectStore};

/// Injected failure for the next push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFault {
    /// Fail with this transport error.
    Error(RemoteError),
    /// Transfer objects but refuse the ref update with this status.
    Reject(String),
    /// Transfer objects but report no update for the ref.
    Silent,
    /// Block for this long, or until cancelled.
    Stall(Duration),
}

/// In-process remote backed by a [`MemoryObjectStore`].
#[derive(Debug)]
pub struct MemoryRemote {
    url: String,
    store: Arc<MemoryObjectStore>,
    faults: Mutex<VecDeque<PushFault>>,
    pushes: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            store: Arc::new(MemoryObjectStore::new()),
            faults: Mutex::new(VecDeque::new()),
            pushes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Objects and refs held by the remote.
    #[must_use]
    pub fn store(&self) -> &Arc<MemoryObjectStore> {
        &self.store
    }

    /// Queue a fault; faults are consumed one per push.
    pub fn inject(&self, fault: PushFault) {
        self.faults().push_back(fault);
    }

    /// Number of push attempts, failed ones included.
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn faults(&self) -> MutexGuard<'_, VecDeque<PushFault>> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_error(err: crate::error::ObjectStoreError) -> RemoteError {
        RemoteError::Transport {
            command: "memory remote".to_string(),
            message: err.to_string(),
        }
    }
}

fn stall(duration: Duration, token: &CancellationToken) -> RemoteResult<()> {
    super::runtime()?.block_on(async {
        tokio::select! {
            () = token.cancelled() => Err(RemoteError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    })
}

impl Remote for MemoryRemote {
    fn url(&self) -> &str {
        &self.url
    }

    fn fetch(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if token.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let Some(tip) = self.store.find_reference(&spec.src).map_err(Self::store_error)? else {
            debug!(refspec = %spec, "remote ref does not exist");
            return Ok(());
        };
        copy_reachable(self.store.as_ref(), local, tip)?;
        local
            .set_reference(&spec.dst, tip, "fetch")
            .map_err(Self::store_error)
    }

    fn push(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<Vec<RefUpdate>> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults().pop_front();
        match fault {
            Some(PushFault::Error(err)) => return Err(err),
            Some(PushFault::Stall(duration)) => stall(duration, token)?,
            _ => {}
        }
        if token.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }

        let Some(tip) = local.find_reference(&spec.src).map_err(Self::store_error)? else {
            return Err(RemoteError::Transport {
                command: "memory remote push".to_string(),
                message: format!("src refspec {} does not match any", spec.src),
            });
        };
        copy_reachable(local, self.store.as_ref(), tip)?;

        match fault {
            Some(PushFault::Reject(status)) => return Ok(vec![RefUpdate::rejected(&spec.dst, status)]),
            Some(PushFault::Silent) => return Ok(Vec::new()),
            _ => {}
        }

        let current = self.store.find_reference(&spec.dst).map_err(Self::store_error)?;
        if let Some(current) = current
            && !spec.force
            && !is_ancestor(self.store.as_ref(), current, tip)?
        {
            return Err(RemoteError::NonFastForward(spec.dst.clone()));
        }
        self.store
            .set_reference(&spec.dst, tip, "push")
            .map_err(Self::store_error)?;
        Ok(vec![RefUpdate::accepted(&spec.dst)])
    }
}
