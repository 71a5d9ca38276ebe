// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Units of change applied to a [`State`].
//!
//! ```text
//! Transformer (closed enum)
//!   |-- CreateApplicationVersion ---+--> DeployApplicationVersion (upstream latest)
//!   |-- DeployApplicationVersion ---+--> QueueApplicationVersion  (locked, Record)
//!   |                               '--> CleanupOldApplicationVersions
//!   |-- QueueApplicationVersion
//!   |-- CleanupOldApplicationVersions
//!   |-- Create/DeleteEnvironmentLock
//!   |-- Create/DeleteEnvironmentApplicationLock --> queue housekeeping
//!   |-- Create/DeleteEnvironmentTeamLock
//!   |-- Create/DeleteEnvironmentGroupLock      (no-op)
//!   |-- CreateEnvironment
//!   |-- DeleteEnvironment
//!   |-- CreateUndeployApplicationVersion --> DeployApplicationVersion (upstream latest)
//!   |-- UndeployApplication
//!   |-- DeleteEnvFromApp
//!   '-- ReleaseTrain --> DeployApplicationVersion (Record), per deployment
//! ```
//!
//! Each variant mutates the state's tree and returns its commit message
//! fragment. Nested transformers run through the same
//! [`TransformerContext`] so their fragments land below the parent's.

mod deploy;
mod environment;
mod lock;
mod release;
mod runner;
mod train;
mod undeploy;

pub use deploy::{DeployApplicationVersion, QueueApplicationVersion};
pub use environment::{CreateEnvironment, DeleteEnvironment};
pub use lock::{
    CreateEnvironmentApplicationLock, CreateEnvironmentGroupLock, CreateEnvironmentLock,
    CreateEnvironmentTeamLock, DeleteEnvironmentApplicationLock, DeleteEnvironmentGroupLock,
    DeleteEnvironmentLock, DeleteEnvironmentTeamLock,
};
pub use release::{CleanupOldApplicationVersions, CreateApplicationVersion};
pub use runner::{TransformerContext, run_transformer};
pub use train::{ReleaseTrain, TrainDeployment, TrainTargetType};
pub use undeploy::{CreateUndeployApplicationVersion, DeleteEnvFromApp, UndeployApplication};

use std::collections::BTreeSet;

use crate::error::{StoreError, StoreResult};
use crate::odb::ObjectId;
use crate::state::State;

/// Who requested a change; becomes the commit author.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformerMetadata {
    pub author_name: String,
    pub author_email: String,
}

impl TransformerMetadata {
    pub fn new(author_name: impl Into<String>, author_email: impl Into<String>) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.author_name.is_empty() || self.author_email.is_empty()
    }
}

/// What a deployment does when locks are active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockBehavior {
    /// Refuse with a `LockedError`.
    #[default]
    Fail,
    /// Queue the version instead of deploying it.
    Record,
    /// Deploy regardless of locks.
    Ignore,
}

/// (application, environment) pair touched by a transformer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEnv {
    pub app: String,
    pub env: String,
    pub team: String,
}

/// Reconciler root application removed from an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootApp {
    pub env: String,
}

/// Branch tip before and after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitIds {
    pub previous: Option<ObjectId>,
    pub current: ObjectId,
}

/// Net effect of applying transformers.
///
/// Results are combined by ordered concatenation, never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformerResult {
    pub changed_apps: Vec<AppEnv>,
    pub deleted_root_apps: Vec<RootApp>,
    pub commits: Option<CommitIds>,
}

impl TransformerResult {
    /// Append `other`. The first recorded commit ids are kept.
    pub fn combine(&mut self, other: Self) {
        self.changed_apps.extend(other.changed_apps);
        self.deleted_root_apps.extend(other.deleted_root_apps);
        if self.commits.is_none() {
            self.commits = other.commits;
        }
    }

    /// Environments touched by any change.
    #[must_use]
    pub fn changed_environments(&self) -> BTreeSet<String> {
        self.changed_apps
            .iter()
            .map(|a| a.env.clone())
            .chain(self.deleted_root_apps.iter().map(|r| r.env.clone()))
            .collect()
    }
}

/// `InvalidArgument` naming the rejected value unless `ok`.
fn require(ok: bool, action: &str, what: &str, value: &str) -> StoreResult<()> {
    if ok {
        Ok(())
    } else {
        Err(StoreError::invalid_argument(format!(
            "cannot {action}: invalid {what}: '{value}'"
        )))
    }
}

/// Message of a transformer that leaves the tree untouched.
fn no_op_message(name: &str) -> String {
    format!("Empty Commit\nNo files changed in {name}")
}

/// One discrete change operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformer {
    CreateApplicationVersion(CreateApplicationVersion),
    DeployApplicationVersion(DeployApplicationVersion),
    QueueApplicationVersion(QueueApplicationVersion),
    CleanupOldApplicationVersions(CleanupOldApplicationVersions),
    CreateEnvironmentLock(CreateEnvironmentLock),
    DeleteEnvironmentLock(DeleteEnvironmentLock),
    CreateEnvironmentApplicationLock(CreateEnvironmentApplicationLock),
    DeleteEnvironmentApplicationLock(DeleteEnvironmentApplicationLock),
    CreateEnvironmentTeamLock(CreateEnvironmentTeamLock),
    DeleteEnvironmentTeamLock(DeleteEnvironmentTeamLock),
    CreateEnvironmentGroupLock(CreateEnvironmentGroupLock),
    DeleteEnvironmentGroupLock(DeleteEnvironmentGroupLock),
    CreateEnvironment(CreateEnvironment),
    DeleteEnvironment(DeleteEnvironment),
    CreateUndeployApplicationVersion(CreateUndeployApplicationVersion),
    UndeployApplication(UndeployApplication),
    DeleteEnvFromApp(DeleteEnvFromApp),
    ReleaseTrain(ReleaseTrain),
}

macro_rules! transformer_variants {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Transformer {
                fn from(t: $variant) -> Self {
                    Transformer::$variant(t)
                }
            }
        )+

        impl Transformer {
            /// Author of the change.
            #[must_use]
            pub const fn metadata(&self) -> &TransformerMetadata {
                match self {
                    $(Self::$variant(t) => &t.metadata,)+
                }
            }

            /// Variant name, for logging.
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant),)+
                }
            }

            pub(crate) fn transform(
                &self,
                state: &mut State,
                ctx: &mut TransformerContext,
            ) -> StoreResult<String> {
                match self {
                    $(Self::$variant(t) => t.transform(state, ctx),)+
                }
            }
        }
    };
}

transformer_variants! {
    CreateApplicationVersion,
    DeployApplicationVersion,
    QueueApplicationVersion,
    CleanupOldApplicationVersions,
    CreateEnvironmentLock,
    DeleteEnvironmentLock,
    CreateEnvironmentApplicationLock,
    DeleteEnvironmentApplicationLock,
    CreateEnvironmentTeamLock,
    DeleteEnvironmentTeamLock,
    CreateEnvironmentGroupLock,
    DeleteEnvironmentGroupLock,
    CreateEnvironment,
    DeleteEnvironment,
    CreateUndeployApplicationVersion,
    UndeployApplication,
    DeleteEnvFromApp,
    ReleaseTrain,
}

#[cfg(test)]
mod tests;
