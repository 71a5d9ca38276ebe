// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Environment definitions stored in `environments/<env>/config.json`.
//!
//! Field names and omission rules match the JSON written by earlier
//! releases so existing repositories keep decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Definition of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Upstream>,

    #[serde(rename = "argocd", default, skip_serializing_if = "Option::is_none")]
    pub argo_cd: Option<ArgoCdConfig>,

    #[serde(
        rename = "environmentGroup",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub environment_group: Option<String>,
}

impl EnvironmentConfig {
    /// Whether new releases are deployed here as soon as they are created.
    #[must_use]
    pub fn follows_latest(&self) -> bool {
        self.upstream.as_ref().is_some_and(|u| u.latest)
    }
}

/// Where an environment takes its releases from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub environment: String,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub latest: bool,
}

impl Upstream {
    #[must_use]
    pub fn latest() -> Self {
        Self {
            environment: String::new(),
            latest: true,
        }
    }

    #[must_use]
    pub fn environment(env: impl Into<String>) -> Self {
        Self {
            environment: env.into(),
            latest: false,
        }
    }
}

/// Reconciler settings of an environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgoCdConfig {
    pub destination: Destination,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_windows: Vec<SyncWindow>,

    #[serde(rename = "accessList", default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_resource_whitelist: Vec<AccessEntry>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub application_annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_differences: Vec<IgnoreDifference>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_options: Vec<String>,
}

/// Cluster the applications of an environment are deployed to.
///
/// `namespace` takes precedence over the project and application
/// namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_project_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(rename = "applications", default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnoreDifference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(rename = "jsonPointers", default, skip_serializing_if = "Vec::is_empty")]
    pub json_pointers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jq_path_expressions: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_fields_managers: Vec<String>,
}
