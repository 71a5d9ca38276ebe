// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tree path layout.
//!
//! ```text
//! applications/<app>/team
//! applications/<app>/releases/<version>/{source_commit_id,source_author,
//!     source_message,display_version,created_at,undeploy}
//! applications/<app>/releases/<version>/environments/<env>/manifests.yaml
//! environments/<env>/config.json
//! environments/<env>/locks/<lock>/{message,created_by_name,created_by_email,created_at}
//! environments/<env>/applications/<app>/{version,queued_version}   symlinks
//! environments/<env>/applications/<app>/manifests/manifests.yaml
//! environments/<env>/applications/<app>/{deployed_by,deployed_by_email,deployed_at_utc}
//! environments/<env>/applications/<app>/locks/<lock>/...
//! environments/<env>/teams/<team>/locks/<lock>/...
//! argocd/v1alpha1/<env>.yaml
//! ```

use crate::fs::join;

pub const APPLICATIONS: &str = "applications";
pub const ENVIRONMENTS: &str = "environments";

pub const FIELD_TEAM: &str = "team";
pub const FIELD_SOURCE_COMMIT_ID: &str = "source_commit_id";
pub const FIELD_SOURCE_AUTHOR: &str = "source_author";
pub const FIELD_SOURCE_MESSAGE: &str = "source_message";
pub const FIELD_DISPLAY_VERSION: &str = "display_version";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UNDEPLOY: &str = "undeploy";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_CREATED_BY_NAME: &str = "created_by_name";
pub const FIELD_CREATED_BY_EMAIL: &str = "created_by_email";
pub const FIELD_DEPLOYED_BY: &str = "deployed_by";
pub const FIELD_DEPLOYED_BY_EMAIL: &str = "deployed_by_email";
pub const FIELD_DEPLOYED_AT: &str = "deployed_at_utc";
pub const MANIFESTS_FILE: &str = "manifests.yaml";
pub const VERSION_LINK: &str = "version";
pub const QUEUED_VERSION_LINK: &str = "queued_version";

pub fn application_dir(app: &str) -> String {
    join(&[APPLICATIONS, app])
}

pub fn team_file(app: &str) -> String {
    join(&[APPLICATIONS, app, FIELD_TEAM])
}

pub fn releases_dir(app: &str) -> String {
    join(&[APPLICATIONS, app, "releases"])
}

pub fn release_dir(app: &str, version: u64) -> String {
    join(&[APPLICATIONS, app, "releases", &version.to_string()])
}

pub fn release_manifest(app: &str, version: u64, env: &str) -> String {
    join(&[
        &release_dir(app, version),
        ENVIRONMENTS,
        env,
        MANIFESTS_FILE,
    ])
}

pub fn environment_dir(env: &str) -> String {
    join(&[ENVIRONMENTS, env])
}

pub fn environment_config(env: &str) -> String {
    join(&[ENVIRONMENTS, env, "config.json"])
}

pub fn environment_locks_dir(env: &str) -> String {
    join(&[ENVIRONMENTS, env, "locks"])
}

pub fn environment_lock_dir(env: &str, lock_id: &str) -> String {
    join(&[ENVIRONMENTS, env, "locks", lock_id])
}

pub fn environment_applications_dir(env: &str) -> String {
    join(&[ENVIRONMENTS, env, APPLICATIONS])
}

pub fn environment_application_dir(env: &str, app: &str) -> String {
    join(&[ENVIRONMENTS, env, APPLICATIONS, app])
}

pub fn application_locks_dir(env: &str, app: &str) -> String {
    join(&[ENVIRONMENTS, env, APPLICATIONS, app, "locks"])
}

pub fn application_lock_dir(env: &str, app: &str, lock_id: &str) -> String {
    join(&[ENVIRONMENTS, env, APPLICATIONS, app, "locks", lock_id])
}

pub fn team_locks_dir(env: &str, team: &str) -> String {
    join(&[ENVIRONMENTS, env, "teams", team, "locks"])
}

pub fn team_lock_dir(env: &str, team: &str, lock_id: &str) -> String {
    join(&[ENVIRONMENTS, env, "teams", team, "locks", lock_id])
}

pub fn version_link(env: &str, app: &str) -> String {
    join(&[&environment_application_dir(env, app), VERSION_LINK])
}

pub fn queued_version_link(env: &str, app: &str) -> String {
    join(&[&environment_application_dir(env, app), QUEUED_VERSION_LINK])
}

pub fn deployed_manifest(env: &str, app: &str) -> String {
    join(&[
        &environment_application_dir(env, app),
        "manifests",
        MANIFESTS_FILE,
    ])
}

/// Relative target of the `version` and `queued_version` links.
pub fn release_link_target(app: &str, version: u64) -> String {
    join(&["..", "..", "..", "..", &release_dir(app, version)])
}

pub fn argocd_manifest(env: &str) -> String {
    format!("argocd/v1alpha1/{env}.yaml")
}
