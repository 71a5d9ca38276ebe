// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Removing applications from environments.
//!
//! ```text
//! CreateUndeployApplicationVersion
//!   release last+1 with an `undeploy` marker and a " " manifest per env
//!   deploy it to every environment following "latest" (locked -> skipped)
//!
//! UndeployApplication
//!   per env: drop application locks, warn if the deployed release is
//!            not an undeploy release
//!   remove applications/<app> and every environments/<env>/applications/<app>
//!
//! DeleteEnvFromApp
//!   remove environments/<env>/applications/<app>, report the root app
//! ```

use tracing::{debug, info, warn};

use super::{
    DeployApplicationVersion, LockBehavior, Transformer, TransformerContext, TransformerMetadata,
    require,
};
use crate::error::{StoreError, StoreResult};
use crate::fs::join;
use crate::state::{State, paths};
use crate::valid;

/// Placeholder manifest of an undeploy release; empty content would be
/// refused when it replaces a deployed manifest.
const UNDEPLOY_MANIFEST: &[u8] = b" ";

/// Team owning `app`, preferring the relational store over the tree.
fn team_of(state: &State, app: &str) -> StoreResult<String> {
    if let Some(record) = state.db().application(app)? {
        return Ok(record.team);
    }
    Ok(state.application_team(app)?.unwrap_or_default())
}

/// Whether `dir` exists and has at least one entry.
fn has_entries(state: &State, dir: &str) -> StoreResult<bool> {
    Ok(state
        .fs()
        .read_dir(dir)?
        .is_some_and(|entries| !entries.is_empty()))
}

/// Create the release that removes an application's manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateUndeployApplicationVersion {
    pub metadata: TransformerMetadata,
    pub application: String,
}

impl CreateUndeployApplicationVersion {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "create undeploy version";
        let app = self.application.as_str();
        let max_len = ctx.max_app_name_length();
        require(valid::application_name(app, max_len), ACTION, "application", app)?;

        let Some(last) = state.last_release(app)? else {
            return Err(StoreError::other(format!(
                "cannot undeploy application '{app}'"
            )));
        };
        let version = last + 1;
        let release_dir = paths::release_dir(app, version);
        let created_at = ctx
            .now()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        {
            let fs = state.fs_mut();
            fs.mkdir_all(&release_dir)?;
            fs.write_file(&join(&[&release_dir, paths::FIELD_UNDEPLOY]), b"")?;
            fs.write_file(
                &join(&[&release_dir, paths::FIELD_CREATED_AT]),
                created_at.as_bytes(),
            )?;
        }

        let team = team_of(state, app)?;
        for (env, config) in state.environment_configs()? {
            state.fs_mut().write_file(
                &paths::release_manifest(app, version, &env),
                UNDEPLOY_MANIFEST,
            )?;
            ctx.add_app_env(app, &env, &team);
            if !config.follows_latest() {
                continue;
            }
            let deploy = Transformer::from(DeployApplicationVersion {
                metadata: self.metadata.clone(),
                environment: env.clone(),
                application: app.to_string(),
                version,
                lock_behavior: LockBehavior::Record,
            });
            match ctx.execute(&deploy, state) {
                Ok(()) => {}
                Err(err) if err.as_locked().is_some() => {
                    debug!(app, env = %env, "undeploy version blocked by locks");
                }
                Err(err) => return Err(err),
            }
        }

        info!(app, version, "created undeploy version");
        Ok(format!("created undeploy-version {version} of '{app}'"))
    }
}

/// Delete an application from the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndeployApplication {
    pub metadata: TransformerMetadata,
    pub application: String,
}

impl UndeployApplication {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "undeploy application";
        let app = self.application.as_str();
        let max_len = ctx.max_app_name_length();
        require(valid::application_name(app, max_len), ACTION, "application", app)?;

        let configs = state.environment_configs().map_err(|err| {
            StoreError::other(format!("could not get environment configs: {err}"))
        })?;
        for env in configs.keys() {
            if !has_entries(state, &paths::environment_application_dir(env, app))? {
                continue;
            }
            state
                .fs_mut()
                .remove_all(&paths::application_locks_dir(env, app))?;

            let Some(deployed) = state.environment_application_version(env, app)? else {
                continue;
            };
            if !state.application_release(app, deployed)?.undeploy_version {
                warn!(
                    app,
                    env = %env,
                    version = deployed,
                    "undeploying an application whose deployed release is not an undeploy release"
                );
            }
        }

        let team = team_of(state, app)?;
        state.fs_mut().remove_all(&paths::application_dir(app))?;
        for env in configs.keys() {
            ctx.add_app_env(app, env, &team);
            state
                .fs_mut()
                .remove_all(&paths::environment_application_dir(env, app))?;
        }

        info!(app, "undeployed application");
        Ok(format!("application '{app}' was deleted successfully"))
    }
}

/// Remove one application from one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvFromApp {
    pub metadata: TransformerMetadata,
    pub application: String,
    pub environment: String,
}

impl DeleteEnvFromApp {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let app = self.application.as_str();
        let env = self.environment.as_str();
        let missing = |what: &str| {
            StoreError::invalid_argument(format!(
                "DeleteEnvFromApp app '{app}' on env '{env}': Need to provide the {what}"
            ))
        };
        if app.is_empty() {
            return Err(missing("application"));
        }
        if env.is_empty() {
            return Err(missing("environment"));
        }

        let env_app_dir = paths::environment_application_dir(env, app);
        if !has_entries(state, &env_app_dir)? {
            let msg = format!(
                "Attempted to remove environment '{env}' from application '{app}' but it did not exist"
            );
            warn!(app, env, "{msg}");
            return Ok(msg);
        }

        state.fs_mut().remove(&env_app_dir)?;
        ctx.delete_env_from_app(app, env);
        info!(app, env, "removed environment from application");
        Ok(format!(
            "Environment '{env}' was removed from application '{app}' successfully."
        ))
    }
}
