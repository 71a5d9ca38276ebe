// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Projection of relational-store locks into the tree.
//!
//! ```text
//! Create*Lock  validate ids -> environment must exist -> lock row in db
//!              (absent -> error) -> write lock directory
//! Delete*Lock  remove lock directory (absent is fine)
//!              -> drop the locks directory once it is empty
//! DeleteEnvironmentApplicationLock also drops a queued version that is
//! already deployed.
//!
//! Create/DeleteEnvironmentGroupLock  no-op, group locks reach the tree
//!                                    as one environment lock per member
//! ```

use tracing::{debug, info, warn};

use super::{TransformerContext, TransformerMetadata, no_op_message, require};
use crate::error::{StoreError, StoreResult, TeamNotFoundError};
use crate::state::{State, paths};
use crate::valid;

fn require_environment(state: &State, env: &str) -> StoreResult<()> {
    let dir = paths::environment_dir(env);
    if state.fs().stat(&dir)?.is_none() {
        return Err(StoreError::other(format!(
            "could not access environment information on: '{dir}'"
        )));
    }
    Ok(())
}

/// Lock a whole environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEnvironmentLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub lock_id: String,
}

impl CreateEnvironmentLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "create environment lock";
        let (env, id) = (self.environment.as_str(), self.lock_id.as_str());
        require(valid::environment_name(env), ACTION, "environment", env)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;
        require_environment(state, env)?;
        let Some(lock) = state.db().environment_lock(env, id)? else {
            return Err(StoreError::other(format!(
                "no environment lock found to create with lock id '{id}' on environment '{env}'"
            )));
        };
        state.write_lock(&paths::environment_lock_dir(env, id), &lock)?;
        info!(env, lock = id, "created environment lock");
        Ok(format!("Created lock {id:?} on environment {env:?}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvironmentLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub lock_id: String,
}

impl DeleteEnvironmentLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "delete environment lock";
        let (env, id) = (self.environment.as_str(), self.lock_id.as_str());
        require(valid::environment_name(env), ACTION, "environment", env)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;
        state
            .fs_mut()
            .remove_all(&paths::environment_lock_dir(env, id))?;
        state.delete_dir_if_empty(&paths::environment_locks_dir(env))?;
        info!(env, lock = id, "deleted environment lock");
        Ok(format!("Deleted lock {id:?} on environment {env:?}"))
    }
}

/// Lock one application on one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEnvironmentApplicationLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub application: String,
    pub lock_id: String,
}

impl CreateEnvironmentApplicationLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "create application lock";
        let env = self.environment.as_str();
        let app = self.application.as_str();
        let id = self.lock_id.as_str();
        require(valid::environment_name(env), ACTION, "environment", env)?;
        let max_len = ctx.max_app_name_length();
        require(valid::application_name(app, max_len), ACTION, "application", app)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;
        require_environment(state, env)?;
        let Some(lock) = state.db().application_lock(env, app, id)? else {
            return Err(StoreError::other(format!(
                "no application lock found to create with lock id '{id}', for application '{app}' on environment '{env}'"
            )));
        };
        state.write_lock(&paths::application_lock_dir(env, app, id), &lock)?;
        info!(env, app, lock = id, "created application lock");
        Ok(format!(
            "Created lock {id:?} on environment {env:?} for application {app:?}"
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvironmentApplicationLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub application: String,
    pub lock_id: String,
}

impl DeleteEnvironmentApplicationLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "delete application lock";
        let env = self.environment.as_str();
        let app = self.application.as_str();
        let id = self.lock_id.as_str();
        require(valid::environment_name(env), ACTION, "environment", env)?;
        let max_len = ctx.max_app_name_length();
        require(valid::application_name(app, max_len), ACTION, "application", app)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;
        state
            .fs_mut()
            .remove_all(&paths::application_lock_dir(env, app, id))?;
        let queue_message = process_queue(state, env, app)?;
        state.delete_dir_if_empty(&paths::application_locks_dir(env, app))?;
        info!(env, app, lock = id, "deleted application lock");

        let mut message =
            format!("Deleted lock {id:?} on environment {env:?} for application {app:?}");
        if let Some(queue_message) = queue_message {
            message.push('\n');
            message.push_str(&queue_message);
        }
        Ok(message)
    }
}

/// Drop a queued version that is already the deployed one.
fn process_queue(state: &mut State, env: &str, app: &str) -> StoreResult<Option<String>> {
    let Some(queued) = state.queued_version(env, app)? else {
        return Ok(None);
    };
    if state.environment_application_version(env, app)? != Some(queued) {
        return Ok(None);
    }
    state.delete_queued_version(env, app)?;
    Ok(Some(format!(
        "deleted queued version {queued} because it was already deployed. app={app:?} env={env:?}"
    )))
}

/// Lock every application of a team on one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEnvironmentTeamLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub team: String,
    pub lock_id: String,
}

impl CreateEnvironmentTeamLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "create environment team lock";
        let env = self.environment.as_str();
        let team = self.team.as_str();
        let id = self.lock_id.as_str();
        require(valid::environment_name(env), ACTION, "environment", env)?;
        require(valid::team_name(team), ACTION, "team", team)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;

        let mut found = false;
        for app in state.applications()? {
            match state.application_team(&app)? {
                Some(owner) if owner == team => {
                    found = true;
                    break;
                }
                Some(_) => {}
                None => warn!(app = %app, "could not find team for application"),
            }
        }
        if !found {
            return Err(TeamNotFoundError::new(format!("team '{team}' does not exist")).into());
        }

        let dir = paths::environment_dir(env);
        if state.fs().stat(&dir)?.is_none() {
            return Err(StoreError::other(format!(
                "error environment not found dir '{dir}'"
            )));
        }
        let Some(lock) = state.db().team_lock(env, team, id)? else {
            return Err(StoreError::other(format!(
                "could not write team lock information to manifest. No team lock found on database for team '{team}' on environment '{env}' with ID '{id}'"
            )));
        };
        state.write_lock(&paths::team_lock_dir(env, team, id), &lock)?;
        info!(env, team, lock = id, "created team lock");
        Ok(format!(
            "Created lock {id:?} on environment {env:?} for team {team:?}."
        ))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvironmentTeamLock {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub team: String,
    pub lock_id: String,
}

impl DeleteEnvironmentTeamLock {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        const ACTION: &str = "delete environment team lock";
        let env = self.environment.as_str();
        let team = self.team.as_str();
        let id = self.lock_id.as_str();
        require(valid::environment_name(env), ACTION, "environment", env)?;
        require(valid::team_name(team), ACTION, "team", team)?;
        require(valid::lock_id(id), ACTION, "lock id", id)?;

        state
            .fs_mut()
            .remove_all(&paths::team_lock_dir(env, team, id))?;
        state.delete_dir_if_empty(&paths::team_locks_dir(env, team))?;
        info!(env, team, lock = id, "deleted team lock");
        Ok(format!(
            "Deleted lock {id:?} on environment {env:?} for team {team:?}"
        ))
    }
}

/// Lock every environment of a group.
///
/// Group locks are split into environment locks before they reach the
/// tree, so this only records an empty commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEnvironmentGroupLock {
    pub metadata: TransformerMetadata,
    pub environment_group: String,
    pub lock_id: String,
}

impl CreateEnvironmentGroupLock {
    pub(super) fn transform(
        &self,
        _state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        debug!(group = %self.environment_group, lock = %self.lock_id, "group lock has no tree projection");
        Ok(no_op_message("CreateEnvironmentGroupLock"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvironmentGroupLock {
    pub metadata: TransformerMetadata,
    pub environment_group: String,
    pub lock_id: String,
}

impl DeleteEnvironmentGroupLock {
    pub(super) fn transform(
        &self,
        _state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        debug!(group = %self.environment_group, lock = %self.lock_id, "group lock has no tree projection");
        Ok(no_op_message("DeleteEnvironmentGroupLock"))
    }
}
