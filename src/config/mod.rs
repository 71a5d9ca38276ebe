// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration management for manifest-store.
//!
//! # Configuration Hierarchy
//!
//! ```text
//! Priority (low → high)
//! 1. defaults
//! 2. TOML files (in the order they were added)
//! 3. MANIFEST_STORE_* env vars
//! 4. explicit overrides (ConfigLoader::set)
//! ```
//!
//! # Environment Variable Mapping
//!
//! ```text
//! MANIFEST_STORE_REPOSITORY__URL=/srv/m.git  → repository.url
//! MANIFEST_STORE_REPOSITORY__BRANCH=main     → repository.branch
//! MANIFEST_STORE_PUSH__MAX_RETRIES=3         → push.max_retries
//! ```

pub mod loader;


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::logging::{LogConfig, LogLevel};
use crate::retry::RetryPolicy;

pub use loader::ConfigLoader;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MANIFEST_STORE";

/// Longest application name Kubernetes accepts as a DNS subdomain.
const MAX_APP_NAME_LIMIT: usize = 253;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub repository: RepositoryConfig,
    pub push: PushConfig,
    pub log: LogSettings,
}

/// `[repository]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Upstream manifest repository.
    pub url: String,
    /// Local bare repository.
    pub path: PathBuf,
    pub branch: String,
    pub network_timeout_secs: u64,
    /// Releases kept below the oldest deployed one.
    pub release_version_limit: usize,
    /// Render reconciler manifests under `argocd/`.
    pub argocd_generate_files: bool,
    pub committer_name: String,
    pub committer_email: String,
    pub max_app_name_length: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path: PathBuf::from("./repository"),
            branch: "master".to_string(),
            network_timeout_secs: 60,
            release_version_limit: 20,
            argocd_generate_files: true,
            committer_name: "manifest-store".to_string(),
            committer_email: "manifest-store@example.com".to_string(),
            max_app_name_length: crate::valid::MAX_APP_NAME_LEN,
        }
    }
}

impl RepositoryConfig {
    #[must_use]
    pub const fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Fully qualified name of the local branch.
    #[must_use]
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    /// Where fetched commits of the branch are stored.
    #[must_use]
    pub fn remote_tracking_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.branch)
    }

    /// The upstream url, which a network remote cannot do without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if no url is configured.
    pub fn remote_url(&self) -> std::result::Result<&str, ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingKey {
                section: "repository".to_string(),
                key: "url".to_string(),
            });
        }
        Ok(&self.url)
    }
}

/// `[push]` section: backoff of the push loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PushConfig {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_elapsed_secs: u64,
    pub max_retries: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            multiplier: 1.5,
            max_delay_ms: 2000,
            max_elapsed_secs: 7,
            max_retries: 6,
        }
    }
}

impl PushConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .multiplier(self.multiplier)
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .max_elapsed(Duration::from_secs(self.max_elapsed_secs))
            .max_retries(self.max_retries)
            .build()
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub console_level: LogLevel,
    pub file_level: LogLevel,
    pub file: Option<PathBuf>,
    /// Write the log file as JSON lines.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: LogLevel::INFO,
            file_level: LogLevel::DEBUG,
            file: None,
            json: false,
        }
    }
}

impl LogSettings {
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig::builder()
            .with_console_level(self.console_level)
            .with_file_level(self.file_level)
            .maybe_with_log_file(self.file.clone())
            .with_json_file(self.json)
            .build()
    }
}

fn invalid(section: &str, key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        message: message.into(),
    }
}

impl Config {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use manifest_store::config::Config;
    ///
    /// let config = Config::builder()
    ///     .add_toml_file("config/default.toml")
    ///     .add_toml_file_optional("config/local.toml")
    ///     .with_env_prefix("MANIFEST_STORE")
    ///     .build()?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    #[must_use]
    pub fn builder() -> ConfigLoader {
        ConfigLoader::new()
    }

    /// Load configuration from a single TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// does not match the `Config` structure.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder().add_toml_file(path).build()
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid TOML or does not match the
    /// `Config` structure.
    pub fn parse(content: &str) -> Result<Self> {
        Self::builder().add_toml_str(content).build()
    }

    /// Validate value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for the first out-of-range value.
    pub fn resolve_and_validate(&mut self) -> Result<()> {
        let repo = &self.repository;
        if repo.branch.is_empty() {
            return Err(invalid("repository", "branch", "must not be empty").into());
        }
        if repo.release_version_limit == 0 {
            return Err(invalid("repository", "release_version_limit", "must be at least 1").into());
        }
        if !(1..=MAX_APP_NAME_LIMIT).contains(&repo.max_app_name_length) {
            return Err(invalid(
                "repository",
                "max_app_name_length",
                format!("must be between 1 and {MAX_APP_NAME_LIMIT}"),
            )
            .into());
        }
        if repo.network_timeout_secs == 0 {
            return Err(invalid("repository", "network_timeout_secs", "must be positive").into());
        }
        if !(self.push.multiplier >= 1.0) {
            return Err(invalid("push", "multiplier", "must be at least 1.0").into());
        }
        Ok(())
    }

    /// Format configuration options for display, one `key = value` per line.
    #[must_use]
    pub fn format_options(&self) -> Vec<String> {
        let repo = &self.repository;
        let push = &self.push;
        let mut options = BTreeMap::new();
        options.insert("repository.url", repo.url.clone());
        options.insert("repository.path", repo.path.display().to_string());
        options.insert("repository.branch", repo.branch.clone());
        options.insert(
            "repository.network_timeout_secs",
            repo.network_timeout_secs.to_string(),
        );
        options.insert(
            "repository.release_version_limit",
            repo.release_version_limit.to_string(),
        );
        options.insert(
            "repository.argocd_generate_files",
            repo.argocd_generate_files.to_string(),
        );
        options.insert("repository.committer_name", repo.committer_name.clone());
        options.insert("repository.committer_email", repo.committer_email.clone());
        options.insert(
            "repository.max_app_name_length",
            repo.max_app_name_length.to_string(),
        );
        options.insert("push.initial_delay_ms", push.initial_delay_ms.to_string());
        options.insert("push.multiplier", push.multiplier.to_string());
        options.insert("push.max_delay_ms", push.max_delay_ms.to_string());
        options.insert("push.max_elapsed_secs", push.max_elapsed_secs.to_string());
        options.insert("push.max_retries", push.max_retries.to_string());
        options.insert("log.console_level", self.log.console_level.as_u8().to_string());
        options.insert("log.file_level", self.log.file_level.as_u8().to_string());
        options.insert(
            "log.file",
            self.log
                .file
                .as_ref()
                .map_or_else(String::new, |p| p.display().to_string()),
        );
        options.insert("log.json", self.log.json.to_string());

        let max_key_len = options.keys().map(|k| k.len()).max().unwrap_or(0);
        options
            .into_iter()
            .map(|(key, value)| format!("{key:<max_key_len$} = {value}"))
            .collect()
    }
}
