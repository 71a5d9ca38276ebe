// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Release trains.
//!
//! A train is planned by the caller: the deployments it carries and the
//! ones locks prevented are already decided. Here each planned
//! deployment is replayed with [`LockBehavior::Record`].
//!
//! ```text
//! target --(group members | environment)--> envs
//! deployment(env, app, version)
//!   env has no upstream -> error
//!   DeployApplicationVersion(Record)
//! ```

use std::collections::BTreeMap;

use tracing::info;

use super::{
    DeployApplicationVersion, LockBehavior, Transformer, TransformerContext, TransformerMetadata,
    no_op_message,
};
use crate::error::{StoreError, StoreResult};
use crate::state::{EnvironmentConfig, State};

/// How the train target name is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainTargetType {
    /// Environment group first, then a single environment.
    #[default]
    Any,
    Environment,
    EnvironmentGroup,
}

/// One (environment, application, version) the train deploys or skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainDeployment {
    pub environment: String,
    pub application: String,
    pub version: u64,
}

/// Deploy a planned set of versions to an environment or environment group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseTrain {
    pub metadata: TransformerMetadata,
    pub target: String,
    pub target_type: TrainTargetType,
    pub deployments: Vec<TrainDeployment>,
    /// Deployments left out because of locks; only reported.
    pub skipped: Vec<TrainDeployment>,
}

/// Environments addressed by `target`.
fn target_environments(
    configs: BTreeMap<String, EnvironmentConfig>,
    target: &str,
    target_type: TrainTargetType,
) -> BTreeMap<String, EnvironmentConfig> {
    let mut selected = BTreeMap::new();
    if target_type != TrainTargetType::Environment {
        selected.extend(
            configs
                .iter()
                .filter(|(_, c)| c.environment_group.as_deref() == Some(target))
                .map(|(env, c)| (env.clone(), c.clone())),
        );
    }
    if target_type != TrainTargetType::EnvironmentGroup
        && selected.is_empty()
        && let Some(config) = configs.get(target)
    {
        selected.insert(target.to_string(), config.clone());
    }
    selected
}

impl ReleaseTrain {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let target = self.target.as_str();
        let envs = target_environments(state.environment_configs()?, target, self.target_type);

        for deployment in &self.deployments {
            let env = deployment.environment.as_str();
            let has_upstream = envs
                .get(env)
                .and_then(|c| c.upstream.as_ref())
                .is_some_and(|u| u.latest || !u.environment.is_empty());
            if !has_upstream {
                return Err(StoreError::other(format!(
                    "could not find upstream config for env '{env}'"
                )));
            }
            let deploy = Transformer::from(DeployApplicationVersion {
                metadata: self.metadata.clone(),
                environment: env.to_string(),
                application: deployment.application.clone(),
                version: deployment.version,
                lock_behavior: LockBehavior::Record,
            });
            ctx.execute(&deploy, state)?;
        }

        if self.deployments.is_empty() {
            return Ok(no_op_message("ReleaseTrain"));
        }
        info!(
            target,
            deployments = self.deployments.len(),
            skipped = self.skipped.len(),
            "ran release train"
        );
        let mut lines = vec![format!(
            "Release Train to environment/environment group '{target}':"
        )];
        lines.extend(self.skipped.iter().map(|s| {
            format!(
                "skipped application {} on environment {}",
                s.application, s.environment
            )
        }));
        Ok(lines.join("\n"))
    }
}
