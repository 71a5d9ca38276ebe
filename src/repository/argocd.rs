// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconciler manifests for one environment.
//!
//! ```text
//! argocd/v1alpha1/<env>.yaml
//!   AppProject   <env>
//!   ---
//!   Application  <env>-<app>   (one per deployed app, by name)
//! ```
//!
//! Documents go through `serde_json::Value` before YAML so keys come out
//! sorted, which keeps the file stable across releases.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::state::{AccessEntry, ArgoCdConfig, IgnoreDifference};

const API_VERSION: &str = "argoproj.io/v1alpha1";
const ANNOTATION_PREFIX: &str = "com.freiheit.kuberpult";
const FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";

/// Directory holding the rendered files.
pub(crate) const DIRECTORY: &str = "argocd/v1alpha1";

pub(crate) fn manifest_path(env: &str) -> String {
    format!("{DIRECTORY}/{env}.yaml")
}

/// A deployed application and its owning team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AppData {
    pub(crate) name: String,
    pub(crate) team: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document<S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: S,
}

#[derive(Serialize)]
struct ObjectMeta {
    name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    finalizers: Vec<&'static str>,
}

impl ObjectMeta {
    fn named(name: String) -> Self {
        Self {
            name,
            annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
            finalizers: Vec::new(),
        }
    }
}

#[derive(Clone, Serialize)]
struct Destination<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    namespace: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    server: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncWindow<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    applications: Vec<&'a str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    duration: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    kind: &'a str,
    manual_sync: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    schedule: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppProjectSpec<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    cluster_resource_whitelist: &'a [AccessEntry],
    description: &'a str,
    destinations: Vec<Destination<'a>>,
    source_repos: [&'static str; 1],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sync_windows: Vec<SyncWindow<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSpec<'a> {
    destination: Destination<'a>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    ignore_differences: &'a [IgnoreDifference],
    project: &'a str,
    source: Source<'a>,
    sync_policy: SyncPolicy<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Source<'a> {
    path: String,
    #[serde(rename = "repoURL")]
    repo_url: &'a str,
    target_revision: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncPolicy<'a> {
    automated: Automated,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    sync_options: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Automated {
    allow_empty: bool,
    prune: bool,
    self_heal: bool,
}

fn to_yaml<T: Serialize>(env: &str, document: &T) -> StoreResult<String> {
    let fail = |err: &dyn std::fmt::Display| {
        StoreError::other(format!("rendering argocd manifests for {env}: {err}"))
    };
    let value = serde_json::to_value(document).map_err(|err| fail(&err))?;
    serde_yaml::to_string(&value).map_err(|err| fail(&err))
}

/// Render the `AppProject` of `env` followed by one `Application` per app.
///
/// # Errors
///
/// Returns an error if a document cannot be serialised.
pub(crate) fn render(
    repo_url: &str,
    branch: &str,
    env: &str,
    config: &ArgoCdConfig,
    apps: &[AppData],
) -> StoreResult<String> {
    let dest = &config.destination;
    let application_ns = dest
        .namespace
        .as_deref()
        .or(dest.application_namespace.as_deref())
        .unwrap_or_default();
    let project_ns = dest
        .namespace
        .as_deref()
        .or(dest.app_project_namespace.as_deref())
        .unwrap_or_default();
    let app_destination = Destination {
        name: &dest.name,
        namespace: application_ns,
        server: &dest.server,
    };
    let project_destination = Destination {
        namespace: project_ns,
        ..app_destination.clone()
    };

    let sync_windows = config
        .sync_windows
        .iter()
        .map(|w| SyncWindow {
            applications: if w.apps.is_empty() {
                vec!["*"]
            } else {
                w.apps.iter().map(String::as_str).collect()
            },
            duration: &w.duration,
            kind: &w.kind,
            manual_sync: true,
            schedule: &w.schedule,
        })
        .collect();

    let project = Document {
        api_version: API_VERSION,
        kind: "AppProject",
        metadata: ObjectMeta::named(env.to_string()),
        spec: AppProjectSpec {
            cluster_resource_whitelist: &config.cluster_resource_whitelist,
            description: env,
            destinations: vec![project_destination],
            source_repos: ["*"],
            sync_windows,
        },
    };

    let mut documents = vec![to_yaml(env, &project)?];
    for app in apps {
        let manifest_path = format!("environments/{env}/applications/{}/manifests", app.name);

        let team_key = format!("{ANNOTATION_PREFIX}/team");
        let mut metadata = ObjectMeta::named(format!("{env}-{}", app.name));
        metadata.annotations = config.application_annotations.clone();
        metadata.annotations.extend([
            (team_key.clone(), app.team.clone()),
            (format!("{ANNOTATION_PREFIX}/application"), app.name.clone()),
            (format!("{ANNOTATION_PREFIX}/environment"), env.to_string()),
            (
                format!("{ANNOTATION_PREFIX}/aa-parent-environment"),
                env.to_string(),
            ),
            (
                "argocd.argoproj.io/manifest-generate-paths".to_string(),
                format!("/{manifest_path}"),
            ),
        ]);
        metadata.labels.insert(team_key, app.team.clone());
        metadata.finalizers = vec![FINALIZER];

        let application = Document {
            api_version: API_VERSION,
            kind: "Application",
            metadata,
            spec: ApplicationSpec {
                destination: app_destination.clone(),
                ignore_differences: &config.ignore_differences,
                project: env,
                source: Source {
                    path: manifest_path,
                    repo_url,
                    target_revision: branch,
                },
                sync_policy: SyncPolicy {
                    automated: Automated {
                        allow_empty: true,
                        prune: true,
                        self_heal: true,
                    },
                    sync_options: &config.sync_options,
                },
            },
        };
        documents.push(to_yaml(env, &application)?);
    }
    Ok(documents.join("---\n"))
}
