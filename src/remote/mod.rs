// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network side of the repository: fetch and push.
//!
//! ```text
//! Repository
//!    |  with_deadline(timeout, token, |child| ...)
//!    v
//! current-thread runtime
//!    select! { token.cancelled(), timeout(spawn_blocking(Remote::fetch / push)) }
//!    |
//!    +── child.cancel() on finish / timeout / cancel
//!
//! Remote
//!   ShellRemote   git CLI against the local git dir (--porcelain push)
//!   MemoryRemote  in-process remote with fault injection
//! ```

mod memory;
mod shell;

pub use memory::{MemoryRemote, PushFault};
pub use shell::ShellRemote;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::odb::{EntryMode, ObjectId, ObjectKind, ObjectStore};

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// `src` on one side is written to `dst` on the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSpec {
    pub src: String,
    pub dst: String,
    /// Allow non-fast-forward updates.
    pub force: bool,
}

impl RefSpec {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            force: false,
        }
    }

    #[must_use]
    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

impl fmt::Display for RefSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force {
            f.write_str("+")?;
        }
        write!(f, "{}:{}", self.src, self.dst)
    }
}

/// Per-ref outcome reported by a push.
///
/// `status` is `None` when the remote accepted the update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub ref_name: String,
    pub status: Option<String>,
}

impl RefUpdate {
    pub fn accepted(ref_name: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            status: None,
        }
    }

    pub fn rejected(ref_name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            ref_name: ref_name.into(),
            status: Some(status.into()),
        }
    }
}

/// Transport to the upstream manifest repository.
///
/// Implementations must return promptly with [`RemoteError::Cancelled`]
/// once `token` is cancelled.
pub trait Remote: Send + Sync + fmt::Debug {
    /// Address shown in error messages.
    fn url(&self) -> &str;

    /// Copy `spec.src` of the remote into `spec.dst` of `local`.
    ///
    /// A missing remote ref is not an error.
    ///
    /// # Errors
    ///
    /// Returns a `RemoteError` if the transport fails or is cancelled.
    fn fetch(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<()>;

    /// Send `spec.src` of `local` to `spec.dst` of the remote.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NonFastForward` if the remote ref advanced,
    /// or another `RemoteError` if the transport fails.
    fn push(
        &self,
        local: &dyn ObjectStore,
        spec: &RefSpec,
        token: &CancellationToken,
    ) -> RemoteResult<Vec<RefUpdate>>;
}

/// Single-threaded runtime for one remote call.
pub(crate) fn runtime() -> RemoteResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RemoteError::Transport {
            command: "tokio runtime".to_string(),
            message: e.to_string(),
        })
}

/// Run `op` on a blocking worker, bounded by `timeout` and `token`.
///
/// `op` receives a child token that is cancelled once the call has
/// returned, timed out or was cancelled, so the backend can release its
/// connection.
///
/// # Errors
///
/// Returns `RemoteError::Timeout` or `RemoteError::Cancelled` when the
/// call did not finish in time, `RemoteError::Transport` if the worker
/// panicked, otherwise the error of `op`.
pub fn with_deadline<T, F>(timeout: Duration, token: &CancellationToken, op: F) -> RemoteResult<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> RemoteResult<T> + Send + 'static,
{
    let child = token.child_token();
    let runtime = runtime()?;
    let worker_token = child.clone();
    let outcome = runtime.block_on(async {
        let worker = tokio::task::spawn_blocking(move || op(worker_token));
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("remote call cancelled by caller");
                Err(RemoteError::Cancelled)
            }
            joined = tokio::time::timeout(timeout, worker) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => Err(RemoteError::Transport {
                    command: "remote worker".to_string(),
                    message: err.to_string(),
                }),
                Err(_) => {
                    warn!(timeout = ?timeout, "remote call timed out");
                    Err(RemoteError::Timeout(timeout))
                }
            },
        }
    });
    child.cancel();
    // The worker observes the cancelled child token and exits on its own.
    runtime.shutdown_background();
    outcome
}

enum Visit {
    Enter(ObjectId),
    Write(ObjectKind, Vec<u8>),
}

/// Copy every object reachable from `tip` that `to` does not have yet.
///
/// Objects are written children first, so an object present in `to` always
/// has its closure there, even after a copy failed half way.
///
/// # Errors
///
/// Returns `RemoteError::Transport` if an object cannot be read or written.
pub(crate) fn copy_reachable(
    from: &dyn ObjectStore,
    to: &dyn ObjectStore,
    tip: ObjectId,
) -> RemoteResult<usize> {
    let transport = |err: crate::error::ObjectStoreError| RemoteError::Transport {
        command: "copy objects".to_string(),
        message: err.to_string(),
    };

    let mut copied = 0;
    let mut seen = HashSet::new();
    let mut stack = vec![Visit::Enter(tip)];
    while let Some(visit) = stack.pop() {
        let id = match visit {
            Visit::Enter(id) => id,
            Visit::Write(kind, data) => {
                to.write_object(kind, &data).map_err(transport)?;
                copied += 1;
                continue;
            }
        };
        if !seen.insert(id) || to.try_read_object(&id).map_err(transport)?.is_some() {
            continue;
        }
        let (kind, data) = from.read_object(&id).map_err(transport)?;
        let children: Vec<ObjectId> = match kind {
            ObjectKind::Commit => {
                let commit = from.read_commit(&id).map_err(transport)?;
                std::iter::once(commit.tree).chain(commit.parents).collect()
            }
            ObjectKind::Tree => from
                .read_tree(&id)
                .map_err(transport)?
                .into_iter()
                .filter(|e| e.mode != EntryMode::Submodule)
                .map(|e| e.id)
                .collect(),
            ObjectKind::Blob | ObjectKind::Tag => Vec::new(),
        };
        stack.push(Visit::Write(kind, data));
        stack.extend(children.into_iter().map(Visit::Enter));
    }
    Ok(copied)
}

/// Whether `ancestor` is reachable from `tip` through parent links.
pub(crate) fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: ObjectId,
    tip: ObjectId,
) -> RemoteResult<bool> {
    let mut pending = vec![tip];
    let mut seen = HashSet::new();
    while let Some(id) = pending.pop() {
        if id == ancestor {
            return Ok(true);
        }
        if !seen.insert(id) {
            continue;
        }
        let commit = store.read_commit(&id).map_err(|err| RemoteError::Transport {
            command: "walk history".to_string(),
            message: err.to_string(),
        })?;
        pending.extend(commit.parents);
    }
    Ok(false)
}
