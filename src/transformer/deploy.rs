// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Deployment and queueing.
//!
//! ```text
//! DeployApplicationVersion
//!   validate names
//!   manifest of release/env  (missing -> error)
//!   locks (env, env-app, team) unless Ignore
//!     Fail   -> LockedError
//!     Record -> QueueApplicationVersion
//!   version link -> release, manifests/manifests.yaml, deployed_by*
//!   clear queued version, CleanupOldApplicationVersions
//! ```

use tracing::info;

use super::{
    CleanupOldApplicationVersions, LockBehavior, Transformer, TransformerContext,
    TransformerMetadata, require,
};
use crate::error::{FsError, LockedError, StoreError, StoreResult};
use crate::fs::join;
use crate::state::{State, paths};
use crate::valid;

/// Point (environment, application) at a release.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployApplicationVersion {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub application: String,
    pub version: u64,
    pub lock_behavior: LockBehavior,
}

impl DeployApplicationVersion {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "deploy application version";
        let env = self.environment.as_str();
        let app = self.application.as_str();
        let version = self.version;
        require(valid::environment_name(env), ACTION, "environment", env)?;
        let max_len = ctx.max_app_name_length();
        require(valid::application_name(app, max_len), ACTION, "application", app)?;

        let manifest_path = paths::release_manifest(app, version, env);
        let manifest = match state.fs().read_file(&manifest_path) {
            Ok(data) => data,
            Err(err) if err.is_not_found() => {
                return Err(StoreError::other(format!(
                    "release of app {app} with version {version} has no manifest for environment {env}"
                )));
            }
            Err(err) => return Err(err),
        };

        let team = state.application_team(app)?;
        if self.lock_behavior != LockBehavior::Ignore {
            let locked = LockedError {
                environment_locks: state.environment_locks(env)?,
                environment_application_locks: state.environment_application_locks(env, app)?,
                team_locks: match team.as_deref() {
                    Some(team) if !team.is_empty() => state.environment_team_locks(env, team)?,
                    _ => Default::default(),
                },
            };
            if !locked.is_empty() {
                match self.lock_behavior {
                    LockBehavior::Fail => return Err(locked.into()),
                    LockBehavior::Record | LockBehavior::Ignore => {
                        let queue = Transformer::from(QueueApplicationVersion {
                            metadata: self.metadata.clone(),
                            environment: env.to_string(),
                            application: app.to_string(),
                            version,
                        });
                        ctx.execute(&queue, state)?;
                        return Ok(String::new());
                    }
                }
            }
        }

        state.set_version_link(env, app, version)?;

        let manifest = if manifest.is_empty() {
            b" ".to_vec()
        } else {
            manifest
        };
        state
            .fs_mut()
            .write_file(&paths::deployed_manifest(env, app), &manifest)?;

        ctx.add_app_env(app, env, team.as_deref().unwrap_or_default());

        let record = match state.db().deployment(app, env, version)? {
            Some(record) => Some(record),
            None => state.db().latest_deployment(app, env)?,
        };
        let (deployed_by, deployed_by_email, deployed_at) = match record {
            Some(record) => (
                record.deployed_by_name,
                record.deployed_by_email,
                record.deployed_at,
            ),
            None => (
                self.metadata.author_name.clone(),
                self.metadata.author_email.clone(),
                ctx.now(),
            ),
        };
        let app_dir = paths::environment_application_dir(env, app);
        let deployed_at = deployed_at
            .format("%Y-%m-%d %H:%M:%S%.f %z UTC")
            .to_string();
        for (field, value) in [
            (paths::FIELD_DEPLOYED_BY, deployed_by.as_str()),
            (paths::FIELD_DEPLOYED_BY_EMAIL, deployed_by_email.as_str()),
            (paths::FIELD_DEPLOYED_AT, deployed_at.as_str()),
        ] {
            let path = join(&[&app_dir, field]);
            state.fs_mut().remove_all(&path)?;
            state.fs_mut().write_file(&path, value.as_bytes())?;
        }

        state.delete_queued_version_if_exists(env, app)?;

        let cleanup = Transformer::from(CleanupOldApplicationVersions {
            metadata: TransformerMetadata::new(deployed_by, deployed_by_email),
            application: app.to_string(),
        });
        ctx.execute(&cleanup, state)?;

        info!(app, env, version, "deployed release");
        Ok(format!("deployed version {version} of {app:?} to {env:?}"))
    }
}

/// Replace the queued version of (environment, application).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueApplicationVersion {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub application: String,
    pub version: u64,
}

impl QueueApplicationVersion {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let env = self.environment.as_str();
        let app = self.application.as_str();
        if state.fs().stat(&paths::release_dir(app, self.version))?.is_none() {
            return Err(FsError::NotFound(paths::release_dir(app, self.version)).into());
        }
        state.set_queued_version(env, app, self.version)?;
        info!(app, env, version = self.version, "queued release");
        Ok(format!(
            "Queued version {} of app {app:?} in env {env:?}",
            self.version
        ))
    }
}
