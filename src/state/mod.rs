// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot of the deployment tree.
//!
//! ```text
//! State
//!   |-- TreeFs            tree of one commit (or empty), mutable builder
//!   |-- commit            parent of the next commit, None on a fresh branch
//!   |-- release limit     retention window for cleanup
//!   '-- DeploymentDb      authoritative lock / deployment records
//!
//! Reads                           Writes
//!   releases / last_release         write_lock
//!   application_release             set_version_link / set_queued_version
//!   release_manifests               delete_queued_version(_if_exists)
//!   application_team                delete_dir_if_empty
//!   *_locks
//!   environment_application_version
//!   queued_version
//!   environment_config(s)
//! ```
//!
//! A `State` is created per applied transformer and consumed when the
//! commit is written; earlier snapshots are never mutated in place.

mod environment;
pub mod paths;

pub use environment::{
    AccessEntry, ArgoCdConfig, Destination, EnvironmentConfig, IgnoreDifference, SyncWindow,
    Upstream,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::db::DeploymentDb;
use crate::error::{StoreError, StoreResult};
use crate::fs::{FileKind, TreeFs, join};
use crate::odb::ObjectId;

/// Deployment lock as stored in a lock directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub message: String,
    pub created_by_name: String,
    pub created_by_email: String,
    pub created_at: DateTime<Utc>,
}

impl Lock {
    pub fn new(
        message: impl Into<String>,
        created_by_name: impl Into<String>,
        created_by_email: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message: message.into(),
            created_by_name: created_by_name.into(),
            created_by_email: created_by_email.into(),
            created_at,
        }
    }
}

/// Metadata of one release directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: u64,
    pub undeploy_version: bool,
    pub source_author: String,
    pub source_commit_id: String,
    pub source_message: String,
    pub display_version: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of [`State::delete_dir_if_empty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDirOutcome {
    Deleted,
    DirDoesNotExist,
    DirNotEmpty,
}

pub struct State {
    fs: TreeFs,
    commit: Option<ObjectId>,
    release_versions_limit: usize,
    db: Arc<dyn DeploymentDb>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("fs", &self.fs)
            .field("commit", &self.commit)
            .field("release_versions_limit", &self.release_versions_limit)
            .finish_non_exhaustive()
    }
}

impl State {
    #[must_use]
    pub fn new(
        fs: TreeFs,
        commit: Option<ObjectId>,
        release_versions_limit: usize,
        db: Arc<dyn DeploymentDb>,
    ) -> Self {
        Self {
            fs,
            commit,
            release_versions_limit,
            db,
        }
    }

    #[must_use]
    pub const fn fs(&self) -> &TreeFs {
        &self.fs
    }

    pub const fn fs_mut(&mut self) -> &mut TreeFs {
        &mut self.fs
    }

    /// Commit this snapshot was read from.
    #[must_use]
    pub const fn commit(&self) -> Option<ObjectId> {
        self.commit
    }

    #[must_use]
    pub const fn release_versions_limit(&self) -> usize {
        self.release_versions_limit
    }

    #[must_use]
    pub fn db(&self) -> &dyn DeploymentDb {
        self.db.as_ref()
    }

    /// Write the tree and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the object store rejects a write.
    pub fn flush(&mut self) -> StoreResult<ObjectId> {
        self.fs.flush()
    }

    // --- Applications & releases ---

    /// Names of all applications with a directory under `applications/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn applications(&self) -> StoreResult<Vec<String>> {
        dir_names(&self.fs, paths::APPLICATIONS)
    }

    /// Release versions of `app`, ascending. Non-numeric entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn releases(&self, app: &str) -> StoreResult<Vec<u64>> {
        let Some(entries) = self.fs.read_dir(&paths::releases_dir(app))? else {
            return Ok(Vec::new());
        };
        let mut versions: Vec<u64> = entries
            .iter()
            .filter_map(|e| e.name.parse::<u64>().ok())
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    /// Highest release version of `app`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn last_release(&self, app: &str) -> StoreResult<Option<u64>> {
        Ok(self.releases(app)?.last().copied())
    }

    /// Read the metadata of a release.
    ///
    /// Individually missing metadata files read as empty; a missing
    /// release directory is an error.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the release does not exist.
    pub fn application_release(&self, app: &str, version: u64) -> StoreResult<Release> {
        let base = paths::release_dir(app, version);
        if self.fs.stat(&base)? != Some(FileKind::Dir) {
            return Err(crate::error::FsError::NotFound(base).into());
        }
        let created_at = match read_optional(&self.fs, &join(&[&base, paths::FIELD_CREATED_AT]))? {
            Some(text) => Some(parse_timestamp(text.trim())?),
            None => None,
        };
        Ok(Release {
            version,
            undeploy_version: self
                .fs
                .exists(&join(&[&base, paths::FIELD_UNDEPLOY]))?,
            source_author: read_or_empty(&self.fs, &join(&[&base, paths::FIELD_SOURCE_AUTHOR]))?,
            source_commit_id: read_or_empty(
                &self.fs,
                &join(&[&base, paths::FIELD_SOURCE_COMMIT_ID]),
            )?,
            source_message: read_or_empty(
                &self.fs,
                &join(&[&base, paths::FIELD_SOURCE_MESSAGE]),
            )?,
            display_version: read_or_empty(
                &self.fs,
                &join(&[&base, paths::FIELD_DISPLAY_VERSION]),
            )?,
            created_at,
        })
    }

    /// Per-environment manifests of a release, keyed by environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn release_manifests(&self, app: &str, version: u64) -> StoreResult<BTreeMap<String, String>> {
        let base = join(&[&paths::release_dir(app, version), paths::ENVIRONMENTS]);
        let mut manifests = BTreeMap::new();
        for env in dir_names(&self.fs, &base)? {
            let file = paths::release_manifest(app, version, &env);
            if let Some(content) = read_optional(&self.fs, &file)? {
                manifests.insert(env, content);
            }
        }
        Ok(manifests)
    }

    /// Team owning `app`, `None` if the application has no team file.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn application_team(&self, app: &str) -> StoreResult<Option<String>> {
        read_optional(&self.fs, &paths::team_file(app))
    }

    // --- Locks ---

    /// # Errors
    ///
    /// Fails if a lock entry is a file rather than a directory.
    pub fn environment_locks(&self, env: &str) -> StoreResult<BTreeMap<String, Lock>> {
        read_locks(&self.fs, &paths::environment_locks_dir(env), "environment locks")
    }

    /// # Errors
    ///
    /// Fails if a lock entry is a file rather than a directory.
    pub fn environment_application_locks(
        &self,
        env: &str,
        app: &str,
    ) -> StoreResult<BTreeMap<String, Lock>> {
        read_locks(
            &self.fs,
            &paths::application_locks_dir(env, app),
            "environment application locks",
        )
    }

    /// # Errors
    ///
    /// Fails if a lock entry is a file rather than a directory.
    pub fn environment_team_locks(
        &self,
        env: &str,
        team: &str,
    ) -> StoreResult<BTreeMap<String, Lock>> {
        read_locks(&self.fs, &paths::team_locks_dir(env, team), "team locks")
    }

    /// Project `lock` into `lock_dir`, replacing earlier content.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be written.
    pub fn write_lock(&mut self, lock_dir: &str, lock: &Lock) -> StoreResult<()> {
        self.fs.remove_all(lock_dir)?;
        self.fs.mkdir_all(lock_dir)?;
        let created_at = lock.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        for (field, value) in [
            (paths::FIELD_MESSAGE, lock.message.as_str()),
            (paths::FIELD_CREATED_BY_EMAIL, lock.created_by_email.as_str()),
            (paths::FIELD_CREATED_BY_NAME, lock.created_by_name.as_str()),
            (paths::FIELD_CREATED_AT, created_at.as_str()),
        ] {
            self.fs.write_file(&join(&[lock_dir, field]), value.as_bytes())?;
        }
        Ok(())
    }

    /// Remove `path` if it is an empty directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a directory or cannot be removed.
    pub fn delete_dir_if_empty(&mut self, path: &str) -> StoreResult<DeleteDirOutcome> {
        match self.fs.read_dir(path)? {
            None => Ok(DeleteDirOutcome::DirDoesNotExist),
            Some(entries) if entries.is_empty() => {
                self.fs.remove(path)?;
                debug!(path, "removed empty directory");
                Ok(DeleteDirOutcome::Deleted)
            }
            Some(_) => Ok(DeleteDirOutcome::DirNotEmpty),
        }
    }

    // --- Deployed & queued versions ---

    /// Version the `version` link of (env, app) points at.
    ///
    /// # Errors
    ///
    /// Fails if the link exists but its release directory is gone.
    pub fn environment_application_version(
        &self,
        env: &str,
        app: &str,
    ) -> StoreResult<Option<u64>> {
        self.read_version_link(&paths::version_link(env, app))
    }

    /// Version queued for (env, app).
    ///
    /// # Errors
    ///
    /// Fails if the link exists but its release directory is gone.
    pub fn queued_version(&self, env: &str, app: &str) -> StoreResult<Option<u64>> {
        self.read_version_link(&paths::queued_version_link(env, app))
    }

    fn read_version_link(&self, link: &str) -> StoreResult<Option<u64>> {
        let target = match self.fs.read_link(link) {
            Ok(target) => target,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => {
                return Err(StoreError::other(format!(
                    "failed reading symlink '{link}': {err}"
                )));
            }
        };
        if self.fs.stat(link)?.is_none() {
            return Err(StoreError::other(format!(
                "failed stating '{link}': dangling symlink to '{target}'"
            )));
        }
        let name = target.rsplit('/').next().unwrap_or_default();
        name.parse::<u64>().map(Some).map_err(|_| {
            StoreError::other(format!(
                "symlink '{link}' points to '{target}', which is not a release"
            ))
        })
    }

    /// Point the `version` link of (env, app) at `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be written.
    pub fn set_version_link(&mut self, env: &str, app: &str, version: u64) -> StoreResult<()> {
        self.replace_link(&paths::version_link(env, app), app, version)
    }

    /// Replace the queued version of (env, app).
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be written.
    pub fn set_queued_version(&mut self, env: &str, app: &str, version: u64) -> StoreResult<()> {
        self.replace_link(&paths::queued_version_link(env, app), app, version)
    }

    fn replace_link(&mut self, link: &str, app: &str, version: u64) -> StoreResult<()> {
        self.fs.remove_all(link)?;
        self.fs
            .symlink(&paths::release_link_target(app, version), link)
    }

    /// # Errors
    ///
    /// Returns `FsError::NotFound` if nothing is queued.
    pub fn delete_queued_version(&mut self, env: &str, app: &str) -> StoreResult<()> {
        self.fs.remove(&paths::queued_version_link(env, app))
    }

    /// # Errors
    ///
    /// Fails if the queued link is dangling.
    pub fn delete_queued_version_if_exists(&mut self, env: &str, app: &str) -> StoreResult<()> {
        if self.queued_version(env, app)?.is_some() {
            self.delete_queued_version(env, app)?;
        }
        Ok(())
    }

    // --- Environments ---

    /// Names of all environments.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn environments(&self) -> StoreResult<Vec<String>> {
        dir_names(&self.fs, paths::ENVIRONMENTS)
    }

    /// Applications with a directory below `environments/<env>/applications`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    pub fn environment_applications(&self, env: &str) -> StoreResult<Vec<String>> {
        dir_names(&self.fs, &paths::environment_applications_dir(env))
    }

    /// Decode `environments/<env>/config.json`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the file is missing and
    /// `StoreError::InvalidJson` if it does not decode.
    pub fn environment_config(&self, env: &str) -> StoreResult<EnvironmentConfig> {
        let path = paths::environment_config(env);
        let data = self.fs.read_file(&path)?;
        serde_json::from_slice(&data).map_err(|err| {
            warn!(path = %path, error = %err, "environment config is not valid json");
            StoreError::invalid_json(path)
        })
    }

    /// Every environment that has a `config.json`, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidJson` if any config does not decode.
    pub fn environment_configs(&self) -> StoreResult<BTreeMap<String, EnvironmentConfig>> {
        let mut configs = BTreeMap::new();
        for env in self.environments()? {
            match self.environment_config(&env) {
                Ok(config) => {
                    configs.insert(env, config);
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(configs)
    }
}

fn dir_names(fs: &TreeFs, path: &str) -> StoreResult<Vec<String>> {
    Ok(fs
        .read_dir(path)?
        .unwrap_or_default()
        .into_iter()
        .filter(|e| e.kind == FileKind::Dir)
        .map(|e| e.name)
        .collect())
}

fn read_optional(fs: &TreeFs, path: &str) -> StoreResult<Option<String>> {
    match fs.read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

fn read_or_empty(fs: &TreeFs, path: &str) -> StoreResult<String> {
    Ok(read_optional(fs, path)?.unwrap_or_default())
}

fn parse_timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| StoreError::other(format!("invalid timestamp '{text}': {err}")))
}

fn read_locks(fs: &TreeFs, dir: &str, what: &str) -> StoreResult<BTreeMap<String, Lock>> {
    let mut locks = BTreeMap::new();
    for entry in fs.read_dir(dir)?.unwrap_or_default() {
        if entry.kind != FileKind::Dir {
            return Err(StoreError::other(format!(
                "error getting {what}: found file in the locks directory. run migration script to generate correct metadata"
            )));
        }
        let base = join(&[dir, &entry.name]);
        let created_at = match read_optional(fs, &join(&[&base, paths::FIELD_CREATED_AT]))? {
            Some(text) => parse_timestamp(text.trim())?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };
        let lock = Lock {
            message: read_or_empty(fs, &join(&[&base, paths::FIELD_MESSAGE]))?,
            created_by_name: read_or_empty(fs, &join(&[&base, paths::FIELD_CREATED_BY_NAME]))?,
            created_by_email: read_or_empty(fs, &join(&[&base, paths::FIELD_CREATED_BY_EMAIL]))?,
            created_at,
        };
        locks.insert(entry.name, lock);
    }
    Ok(locks)
}
