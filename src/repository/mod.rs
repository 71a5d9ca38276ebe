// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! The single writer over one manifest repository.
//!
//! ```text
//! apply([t0, t1, ...])                      one commit per transformer
//!   for each t (index i):
//!     apply_transformer_batches(t, allow_fetch_and_reset = true)
//!       apply_transformer(t)
//!         state_at(None) ── run_transformer ── after_transform ── create_commit
//!       InvalidJson && allowed ──> fetch_and_reset ──> retry once (not allowed)
//!
//! push_repo()
//!   push(|| with_deadline(remote.push(refs/heads/B:refs/heads/B)))
//!     RetryPolicy: transient -> backoff, non-fast-forward -> stop
//!   NonFastForward      -> PushError::FastForward
//!   Timeout / Cancelled -> PushError::Context
//!   other               -> PushError::NoWriteAccess
//!   no clean update of refs/heads/B -> PushError::BranchProtected
//! ```
//!
//! Mutating operations take `&mut self`: concurrent writers must serialise
//! through their own lock.

mod argocd;


use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RepositoryConfig};
use crate::db::DeploymentDb;
use crate::error::{PushError, RemoteError, StoreError, StoreResult, TransformerBatchApplyError};
use crate::fs::TreeFs;
use crate::odb::{
    CommitInfo, GixObjectStore, LayeredObjectStore, ObjectId, ObjectStore, Signature,
};
use crate::remote::{RefSpec, Remote, RemoteResult, ShellRemote, with_deadline};
use crate::retry::RetryPolicy;
use crate::state::{ArgoCdConfig, State};
use crate::transformer::{
    CommitIds, Transformer, TransformerContext, TransformerResult, run_transformer,
};

use argocd::AppData;

/// Priority of the on-disk backend inside the layered object store.
const DISK_BACKEND_PRIORITY: i32 = 0;

pub struct Repository {
    config: RepositoryConfig,
    retry: RetryPolicy,
    store: Arc<dyn ObjectStore>,
    remote: Arc<dyn Remote>,
    db: Arc<dyn DeploymentDb>,
    token: CancellationToken,
    clock: fn() -> DateTime<Utc>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("url", &self.remote.url())
            .field("branch", &self.config.branch)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn unattributed(err: StoreError) -> StoreError {
    TransformerBatchApplyError::unattributed(err).into()
}

/// Prefix `err` with `what`, keeping broken-data errors intact so they can
/// still trigger a fetch-and-reset.
fn with_context(err: StoreError, what: &str) -> StoreError {
    if err.is_invalid_json() {
        err
    } else {
        StoreError::other(format!("{what}: {err}"))
    }
}

/// Re-attribute an error of a single-transformer batch to `index` of the
/// caller's batch.
fn attribute(err: StoreError, index: usize) -> StoreError {
    match err {
        StoreError::Batch(mut batch) => {
            if batch.index.is_some() {
                batch.index = Some(index);
            }
            StoreError::Batch(batch)
        }
        other => unattributed(other),
    }
}

impl Repository {
    /// Open (or create) the bare repository at `repository.path` and sync
    /// it with `repository.url` over the git CLI.
    ///
    /// # Errors
    ///
    /// Returns an error if no url is configured, the local repository cannot
    /// be opened, the initial fetch fails, or the stored environment
    /// configurations do not decode.
    pub fn open(
        config: &Config,
        db: Arc<dyn DeploymentDb>,
        token: CancellationToken,
    ) -> StoreResult<Self> {
        let remote = ShellRemote::new(config.repository.remote_url()?);
        let disk = GixObjectStore::open_or_init(&config.repository.path)?;
        let store =
            LayeredObjectStore::new().with_backend(DISK_BACKEND_PRIORITY, Arc::new(disk));
        Self::open_with(config, Arc::new(store), Arc::new(remote), db, token)
    }

    /// Open over an explicit object store and remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial fetch fails or the stored environment
    /// configurations do not decode.
    pub fn open_with(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn Remote>,
        db: Arc<dyn DeploymentDb>,
        token: CancellationToken,
    ) -> StoreResult<Self> {
        let mut repo = Self {
            config: config.repository.clone(),
            retry: config.push.retry_policy(),
            store,
            remote,
            db,
            token,
            clock: Utc::now,
        };
        repo.fetch_and_reset()?;
        let state = repo.state_at(None)?;
        let environments = state.environment_configs()?;
        info!(
            url = repo.remote.url(),
            branch = %repo.config.branch,
            head = ?state.commit(),
            environments = environments.len(),
            "opened manifest repository"
        );
        Ok(repo)
    }

    /// Replace the time source used for commits and transformer timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Current tip of the local branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be read.
    pub fn head(&self) -> StoreResult<Option<ObjectId>> {
        Ok(self.store.find_reference(&self.config.branch_ref())?)
    }

    /// Snapshot at `commit`, or at the branch tip when `None`.
    ///
    /// A branch without commits yields an empty tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be read.
    pub fn state_at(&self, commit: Option<ObjectId>) -> StoreResult<State> {
        let commit = match commit {
            Some(id) => Some(id),
            None => self.head()?,
        };
        let fs = match commit {
            Some(id) => {
                let tree = self.store.read_commit(&id)?.tree;
                TreeFs::from_tree(Arc::clone(&self.store), tree)
            }
            None => TreeFs::empty(Arc::clone(&self.store)),
        };
        Ok(State::new(
            fs,
            commit,
            self.config.release_version_limit,
            Arc::clone(&self.db),
        ))
    }

    /// Apply each transformer as its own commit, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Batch` naming the failing index, or no index when
    /// the failure happened outside the transformer itself.
    pub fn apply(&mut self, transformers: &[Transformer]) -> StoreResult<TransformerResult> {
        let mut result = TransformerResult::default();
        for (index, transformer) in transformers.iter().enumerate() {
            let changes = self
                .apply_transformer_batches(transformer, true)
                .map_err(|err| attribute(err, index))?;
            result.combine(changes);
        }
        Ok(result)
    }

    /// Apply one transformer; on broken persisted data, fetch-and-reset and
    /// try again once if `allow_fetch_and_reset` is set.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub fn apply_transformer_batches(
        &mut self,
        transformer: &Transformer,
        allow_fetch_and_reset: bool,
    ) -> StoreResult<TransformerResult> {
        match self.apply_transformer(transformer) {
            Err(err) if allow_fetch_and_reset && err.is_invalid_json() => {
                warn!(
                    transformer = transformer.name(),
                    error = %err,
                    "invalid state, fetching and resetting before retrying"
                );
                self.fetch_and_reset()?;
                self.apply_transformer_batches(transformer, false)
            }
            outcome => outcome,
        }
    }

    /// Run `transformer` on the branch tip and commit the result.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Batch` at index 0 if the transformer fails, or
    /// without an index if reading the tip, rendering or committing fails.
    pub fn apply_transformer(&mut self, transformer: &Transformer) -> StoreResult<TransformerResult> {
        let mut state = self
            .state_at(None)
            .map_err(|err| unattributed(with_context(err, "failure in StateAt")))?;

        let ctx = TransformerContext::new((self.clock)())
            .with_max_app_name_length(self.config.max_app_name_length);
        let (message, mut result) = run_transformer(transformer, &mut state, ctx)
            .map_err(|err| StoreError::from(TransformerBatchApplyError::at(0, err)))?;

        self.after_transform(&mut state, &result.changed_environments())
            .map_err(|err| unattributed(with_context(err, "failure in afterTransform")))?;

        result.commits = Some(self.create_commit(&mut state, transformer, &message)?);
        Ok(result)
    }

    /// Regenerate reconciler manifests of every changed environment that
    /// has an `argocd` section.
    ///
    /// # Errors
    ///
    /// Returns an error if configurations cannot be read or a manifest
    /// cannot be written.
    pub fn after_transform(
        &self,
        state: &mut State,
        changed_environments: &BTreeSet<String>,
    ) -> StoreResult<()> {
        let configs = state.environment_configs()?;
        let mut rendered = Vec::new();
        let mut skipped = Vec::new();
        for (env, config) in &configs {
            let Some(argo_cd) = &config.argo_cd else {
                continue;
            };
            if !changed_environments.contains(env) {
                skipped.push(env.as_str());
                continue;
            }
            rendered.push(env.as_str());
            if self.config.argocd_generate_files {
                self.update_argocd_apps(state, env, argo_cd)?;
            }
        }
        info!(rendered = ?rendered, skipped = ?skipped, "rendering of environments");
        Ok(())
    }

    fn update_argocd_apps(
        &self,
        state: &mut State,
        env: &str,
        config: &ArgoCdConfig,
    ) -> StoreResult<()> {
        let mut apps = Vec::new();
        for name in state.environment_applications(env)? {
            if state.environment_application_version(env, &name)?.is_none() {
                continue;
            }
            let team = state.application_team(&name)?.unwrap_or_default();
            apps.push(AppData { name, team });
        }
        let content = argocd::render(self.remote.url(), &self.config.branch, env, config, &apps)?;

        let fs = state.fs_mut();
        fs.mkdir_all(argocd::DIRECTORY)?;
        fs.write_file(&argocd::manifest_path(env), content.as_bytes())?;
        debug!(env, apps = apps.len(), "rendered argocd manifests");
        Ok(())
    }

    /// Write the state's tree and commit it on top of the state's commit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Batch` without an index if the tree cannot be
    /// written, the transformer has no author, or the commit fails.
    pub fn create_commit(
        &self,
        state: &mut State,
        transformer: &Transformer,
        message: &str,
    ) -> StoreResult<CommitIds> {
        let metadata = transformer.metadata();
        if metadata.is_empty() {
            return Err(unattributed(StoreError::other(
                "transformer metadata is empty",
            )));
        }
        let tree = state.flush().map_err(unattributed)?;
        let now = (self.clock)().fixed_offset();
        let commit = CommitInfo {
            tree,
            parents: state.commit().into_iter().collect(),
            author: Signature::new(&metadata.author_name, &metadata.author_email, now),
            committer: Signature::new(
                &self.config.committer_name,
                &self.config.committer_email,
                now,
            ),
            message: message.to_string(),
        };
        let current = self
            .store
            .write_commit(&commit)
            .and_then(|id| {
                let summary = message.lines().next().unwrap_or_default();
                self.store
                    .set_reference(&self.config.branch_ref(), id, &format!("commit: {summary}"))
                    .map(|()| id)
            })
            .map_err(|err| unattributed(StoreError::other(format!("createCommitFromIds failed: {err}"))))?;

        info!(
            transformer = transformer.name(),
            commit = %current,
            parent = ?state.commit(),
            "created commit"
        );
        Ok(CommitIds {
            previous: state.commit(),
            current,
        })
    }

    /// Fetch the remote branch and point the local branch at it.
    ///
    /// A remote without the branch leaves the local branch untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails or the reference cannot be
    /// written.
    pub fn fetch_and_reset(&mut self) -> StoreResult<()> {
        let tracking = self.config.remote_tracking_ref();
        let spec = RefSpec::new(self.config.branch_ref(), tracking.clone()).forced();
        self.use_remote(move |remote, store, token| remote.fetch(store, &spec, token))?;

        match self.store.find_reference(&tracking)? {
            Some(tip) => {
                self.store
                    .set_reference(&self.config.branch_ref(), tip, "reset branch")?;
                info!(branch = %self.config.branch, commit = %tip, "reset branch to remote");
            }
            None => debug!(branch = %self.config.branch, "remote has no such branch yet"),
        }
        Ok(())
    }

    /// Run `action` under the retry policy. Non-fast-forward rejections are
    /// not retried: only a fresh apply can resolve them.
    ///
    /// # Errors
    ///
    /// Returns the last error of `action`.
    pub fn push<T>(&self, mut action: impl FnMut() -> RemoteResult<T>) -> RemoteResult<T> {
        self.retry.run(|attempt| {
            debug!(attempt, url = self.remote.url(), "pushing");
            action()
        })
    }

    /// Push the local branch to the remote branch of the same name.
    ///
    /// # Errors
    ///
    /// Returns a `PushError` describing why the remote did not end up at
    /// the local tip.
    pub fn push_repo(&self) -> StoreResult<()> {
        let branch_ref = self.config.branch_ref();
        let spec = RefSpec::new(branch_ref.clone(), branch_ref.clone());
        let outcome = self.push(|| {
            let spec = spec.clone();
            self.use_remote(move |remote, store, token| remote.push(store, &spec, token))
        });

        let url = self.remote.url().to_string();
        let branch = self.config.branch.clone();
        let updates = match outcome {
            Ok(updates) => updates,
            Err(RemoteError::NonFastForward(_)) => return Err(PushError::FastForward.into()),
            Err(RemoteError::Timeout(_) | RemoteError::Cancelled) => {
                return Err(PushError::Context.into());
            }
            Err(err) => {
                error!(error = %err, "error while pushing");
                return Err(PushError::NoWriteAccess { url, branch }.into());
            }
        };

        let pushed = updates
            .iter()
            .any(|u| u.ref_name == branch_ref && u.status.is_none());
        if !pushed {
            warn!(updates = ?updates, "push was not accepted for the branch");
            return Err(PushError::BranchProtected { url, branch }.into());
        }
        info!(url = %url, branch = %branch, "pushed manifest repository");
        Ok(())
    }

    /// Run `op` against the remote on a worker thread, bounded by the
    /// network timeout and the repository's cancellation token.
    fn use_remote<T, F>(&self, op: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Remote, &dyn ObjectStore, &CancellationToken) -> RemoteResult<T>
            + Send
            + 'static,
    {
        let remote = Arc::clone(&self.remote);
        let store = Arc::clone(&self.store);
        with_deadline(self.config.network_timeout(), &self.token, move |token| {
            op(remote.as_ref(), store.as_ref(), &token)
        })
    }
}
