// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use tracing::{info, warn};

use super::{TransformerContext, TransformerMetadata};
use crate::error::{StoreError, StoreResult};
use crate::state::{EnvironmentConfig, State, paths};
use crate::valid;

/// Define an environment, replacing any earlier definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateEnvironment {
    pub metadata: TransformerMetadata,
    pub environment: String,
    pub config: EnvironmentConfig,
}

impl CreateEnvironment {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let env = self.environment.as_str();
        if !valid::environment_name(env) {
            return Err(StoreError::invalid_argument(format!(
                "cannot create environment: invalid environment: '{env}'"
            )));
        }
        let mut json = serde_json::to_string_pretty(&self.config)
            .map_err(|err| StoreError::other(format!("error writing json: {err}")))?;
        json.push('\n');

        let fs = state.fs_mut();
        fs.mkdir_all(&paths::environment_dir(env))?;
        fs.write_file(&paths::environment_config(env), json.as_bytes())?;
        info!(env, "created environment");
        Ok(format!("create environment {env:?}"))
    }
}

/// Remove an environment definition and its reconciler manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteEnvironment {
    pub metadata: TransformerMetadata,
    pub environment: String,
}

impl DeleteEnvironment {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let env = self.environment.as_str();
        if !valid::environment_name(env) {
            return Err(StoreError::invalid_argument(format!(
                "cannot delete environment: invalid environment: '{env}'"
            )));
        }
        for path in [paths::environment_dir(env), paths::argocd_manifest(env)] {
            match state.fs_mut().remove(&path) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!(env, path = %path, "nothing to delete");
                }
                Err(err) => {
                    return Err(StoreError::other(format!(
                        "error deleting '{path}' of environment '{env}': {err}"
                    )));
                }
            }
        }
        info!(env, "deleted environment");
        Ok(format!("delete environment {env:?}"))
    }
}
