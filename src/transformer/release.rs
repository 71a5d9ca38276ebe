// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Release creation and retention.
//!
//! ```text
//! CreateApplicationVersion
//!   validate name -> pick version -> exists?
//!     yes: compare declared fields in order -> AlreadyExistsSame | AlreadyExistsDifferent
//!     no:  too old for retention? -> TooOld
//!          write release files, team file, per-env manifests
//!          newest release? deploy to every environment following "latest"
//!
//! CleanupOldApplicationVersions
//!   floor = oldest deployed or queued version (newest release if none)
//!   delete releases[..position(floor) - (limit - 1)]
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use similar::TextDiff;
use tracing::{debug, info, warn};

use super::{
    DeployApplicationVersion, LockBehavior, Transformer, TransformerContext, TransformerMetadata,
};
use crate::error::{CreateReleaseError, ReleaseField, StoreError, StoreResult};
use crate::fs::join;
use crate::state::{State, paths};
use crate::valid;

/// Create (or idempotently re-create) a release of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateApplicationVersion {
    pub metadata: TransformerMetadata,
    pub application: String,
    /// `0` picks the version after the last release.
    pub version: u64,
    /// Manifest per environment.
    pub manifests: BTreeMap<String, String>,
    pub source_commit_id: String,
    pub source_author: String,
    pub source_message: String,
    pub team: String,
    pub display_version: String,
}

impl CreateApplicationVersion {
    pub(super) fn transform(
        &self,
        state: &mut State,
        ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let app = self.application.as_str();
        let max_len = ctx.max_app_name_length();
        if !valid::application_name(app, max_len) {
            return Err(CreateReleaseError::AppNameTooLong {
                app: app.to_string(),
                pattern: valid::NAME_PATTERN.to_string(),
                max_len,
            }
            .into());
        }

        let releases = state.releases(app)?;
        let last = releases.last().copied();
        let version = match self.version {
            0 => last.map_or(1, |v| v + 1),
            v => v,
        };

        let commit_id = self.source_commit_id.as_str();
        if !commit_id.is_empty() && !valid::sha1_commit_id(commit_id) {
            warn!(app, commit_id, "source commit id is not a valid SHA1 hash");
        }

        let release_dir = paths::release_dir(app, version);
        if state.fs().exists(&release_dir)? {
            return Err(self.compare_with_existing(state, version)?.into());
        }
        if last.is_some_and(|last| version < last) {
            let mut candidates = releases.clone();
            candidates.push(version);
            candidates.sort_unstable();
            if old_versions(state, app, &candidates)?.contains(&version) {
                return Err(CreateReleaseError::TooOld.into());
            }
        }

        self.write_release(state, version, ctx)
            .map_err(general_failure)?;

        // A backfilled release never replaces a newer one on "latest" environments.
        let is_latest = last.is_none_or(|last| version > last);
        for env in self.manifests.keys() {
            let team = state.application_team(app)?.unwrap_or_default();
            ctx.add_app_env(app, env, &team);
            if !is_latest {
                continue;
            }

            let follows_latest = match state.environment_config(env) {
                Ok(config) => config.follows_latest(),
                Err(err) if err.is_not_found() => false,
                Err(err) => return Err(err),
            };
            if follows_latest {
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
                        debug!(app, env = %env, "upstream deployment blocked by locks");
                    }
                    Err(err) => return Err(general_failure(err)),
                }
            }
        }

        info!(app, version, "created release");
        Ok(format!("created version {version} of {app:?}"))
    }

    fn write_release(
        &self,
        state: &mut State,
        version: u64,
        ctx: &TransformerContext,
    ) -> StoreResult<()> {
        let app = self.application.as_str();
        let release_dir = paths::release_dir(app, version);
        let fs = state.fs_mut();
        fs.mkdir_all(&release_dir)?;

        let commit_id = self.source_commit_id.to_lowercase();
        for (field, value) in [
            (paths::FIELD_SOURCE_COMMIT_ID, commit_id.as_str()),
            (paths::FIELD_SOURCE_AUTHOR, self.source_author.as_str()),
            (paths::FIELD_SOURCE_MESSAGE, self.source_message.as_str()),
            (paths::FIELD_DISPLAY_VERSION, self.display_version.as_str()),
        ] {
            if !value.is_empty() {
                fs.write_file(&join(&[&release_dir, field]), value.as_bytes())?;
            }
        }
        let created_at = ctx
            .now()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        fs.write_file(
            &join(&[&release_dir, paths::FIELD_CREATED_AT]),
            created_at.as_bytes(),
        )?;

        if !self.team.is_empty() {
            let team_file = paths::team_file(app);
            fs.remove_all(&team_file)?;
            fs.write_file(&team_file, self.team.as_bytes())?;
        }

        for (env, manifest) in &self.manifests {
            fs.write_file(
                &paths::release_manifest(app, version, env),
                manifest.as_bytes(),
            )?;
        }
        Ok(())
    }

    /// Outcome of creating a release that already exists.
    fn compare_with_existing(
        &self,
        state: &State,
        version: u64,
    ) -> StoreResult<CreateReleaseError> {
        let app = self.application.as_str();
        let existing = state.application_release(app, version)?;
        let existing_team = state.application_team(app)?.unwrap_or_default();

        let commit_id = self.source_commit_id.to_lowercase();
        let scalar_fields = [
            (
                ReleaseField::SourceCommitId,
                existing.source_commit_id.as_str(),
                commit_id.as_str(),
            ),
            (
                ReleaseField::SourceAuthor,
                existing.source_author.as_str(),
                self.source_author.as_str(),
            ),
            (
                ReleaseField::SourceMessage,
                existing.source_message.as_str(),
                self.source_message.as_str(),
            ),
            (
                ReleaseField::DisplayVersion,
                existing.display_version.as_str(),
                self.display_version.as_str(),
            ),
            (ReleaseField::Team, existing_team.as_str(), self.team.as_str()),
        ];
        // Fields the request leaves empty are not declared and not compared.
        for (field, old, new) in scalar_fields {
            if !new.is_empty() && old != new {
                return Ok(CreateReleaseError::AlreadyExistsDifferent {
                    field,
                    diff: unified_diff(old, new),
                });
            }
        }

        let existing_manifests = state.release_manifests(app, version)?;
        let envs: BTreeSet<&String> = existing_manifests
            .keys()
            .chain(self.manifests.keys())
            .collect();
        for env in envs {
            let old = existing_manifests.get(env).map_or("", String::as_str);
            let new = self.manifests.get(env).map_or("", String::as_str);
            if !same_yaml(old, new) {
                return Ok(CreateReleaseError::AlreadyExistsDifferent {
                    field: ReleaseField::Manifests,
                    diff: unified_diff(old, new),
                });
            }
        }
        Ok(CreateReleaseError::AlreadyExistsSame)
    }
}

fn general_failure(err: StoreError) -> StoreError {
    match err {
        StoreError::CreateRelease(_) => err,
        other => CreateReleaseError::GeneralFailure(other.to_string()).into(),
    }
}

fn unified_diff(old: &str, new: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header("existing", "request")
        .to_string()
}

fn yaml_documents(text: &str) -> Option<Vec<serde_yaml::Value>> {
    serde_yaml::Deserializer::from_str(text)
        .map(|doc| serde_yaml::Value::deserialize(doc))
        .collect::<Result<Vec<_>, _>>()
        .ok()
}

/// Compare manifests ignoring YAML formatting. Unparsable text is compared
/// verbatim.
fn same_yaml(old: &str, new: &str) -> bool {
    if old == new {
        return true;
    }
    match (yaml_documents(old), yaml_documents(new)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Releases of `app` outside the retention window.
///
/// `versions` must be sorted ascending. The floor is the oldest version
/// deployed or queued on any environment; with no deployment it is the
/// newest release.
pub(super) fn old_versions(state: &State, app: &str, versions: &[u64]) -> StoreResult<Vec<u64>> {
    let Some(&newest) = versions.last() else {
        return Ok(Vec::new());
    };
    let mut floor = newest;
    for env in state.environments()? {
        for pinned in [
            state.environment_application_version(&env, app)?,
            state.queued_version(&env, app)?,
        ]
        .into_iter()
        .flatten()
        {
            floor = floor.min(pinned);
        }
    }

    let position = versions.partition_point(|v| *v < floor);
    let keep = state.release_versions_limit().saturating_sub(1);
    if position < keep {
        return Ok(Vec::new());
    }
    Ok(versions[..position - keep].to_vec())
}

/// Remove releases that fell out of the retention window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupOldApplicationVersions {
    pub metadata: TransformerMetadata,
    pub application: String,
}

impl CleanupOldApplicationVersions {
    pub(super) fn transform(
        &self,
        state: &mut State,
        _ctx: &mut TransformerContext,
    ) -> StoreResult<String> {
        let app = self.application.as_str();
        let versions = state.releases(app)?;
        let old = old_versions(state, app, &versions).map_err(|err| {
            StoreError::other(format!(
                "cleanup: could not get application releases for app '{app}': {err}"
            ))
        })?;

        let mut lines = Vec::with_capacity(old.len());
        for version in old {
            state.fs_mut().remove(&paths::release_dir(app, version))?;
            debug!(app, version, "removed release");
            lines.push(format!("removed version {version} of app {app} as cleanup"));
        }
        Ok(lines.join("\n"))
    }
}
