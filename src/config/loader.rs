// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Layered configuration sources.
//!
//! ```text
//! ConfigLoader::new()
//!   .add_toml_file(path)           required file
//!   .add_toml_file_optional(path)  skipped when absent
//!   .add_toml_str(text)
//!   .with_env_prefix(prefix)       PREFIX_SECTION__KEY
//!   .set(key, value)?
//!        |
//!        v  sources are recorded, nothing is read yet
//!    build() --> defaults < sources < env < overrides --> Config (validated)
//! ```

use std::path::{Path, PathBuf};

use anyhow::bail;
use config::{Environment, File, FileFormat, Value};

use super::Config;
use crate::error::Result;

#[derive(Debug, Clone)]
enum Source {
    File { path: PathBuf, required: bool },
    Text(String),
}

impl Source {
    /// Label and path for listings; `None` for an optional file that is absent.
    fn describe(&self) -> Option<(&'static str, PathBuf)> {
        match self {
            Self::File {
                path,
                required: true,
            } => Some(("file", path.clone())),
            Self::File {
                path,
                required: false,
            } => path.exists().then(|| ("optional", path.clone())),
            Self::Text(_) => Some(("string", PathBuf::from("<string>"))),
        }
    }
}

/// Collects configuration sources and merges them in `build()`.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    sources: Vec<Source>,
    env_prefix: Option<String>,
    overrides: Vec<(String, Value)>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required TOML file, read by `build()`.
    #[must_use]
    pub fn add_toml_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(Source::File {
            path: path.as_ref().to_path_buf(),
            required: true,
        });
        self
    }

    #[must_use]
    pub fn add_toml_file_optional<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(Source::File {
            path: path.as_ref().to_path_buf(),
            required: false,
        });
        self
    }

    #[must_use]
    pub fn add_toml_str(mut self, content: &str) -> Self {
        self.sources.push(Source::Text(content.to_string()));
        self
    }

    /// Read `PREFIX_SECTION__KEY` variables. The double underscore separates
    /// the section from the key so keys may contain single underscores.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    /// Override a dotted key such as `repository.branch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key has an empty segment.
    pub fn set<T: Into<Value>>(mut self, key: &str, value: T) -> Result<Self> {
        if key.is_empty() || key.split('.').any(str::is_empty) {
            bail!("invalid override key '{key}'");
        }
        self.overrides.push((key.to_string(), value.into()));
        Ok(self)
    }

    /// Merge every source over the defaults and validate the result.
    ///
    /// # Errors
    ///
    /// Returns an error if a required file is missing, a source does not
    /// parse, an unknown key is present, or a value is out of range.
    pub fn build(self) -> Result<Config> {
        let mut builder = config::Config::builder();
        for source in &self.sources {
            builder = match source {
                Source::File { path, required } => builder.add_source(
                    File::from(path.as_path())
                        .format(FileFormat::Toml)
                        .required(*required),
                ),
                Source::Text(text) => builder.add_source(File::from_str(text, FileFormat::Toml)),
            };
        }
        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        for (key, value) in self.overrides {
            builder = builder.set_override(key.as_str(), value)?;
        }

        let mut config: Config = builder.build()?.try_deserialize()?;
        config.resolve_and_validate()?;
        tracing::debug!(sources = self.sources.len(), "configuration loaded");
        Ok(config)
    }

    /// Sources that contribute to `build()`, in merge order.
    #[must_use]
    pub fn loaded_files(&self) -> Vec<(String, PathBuf)> {
        self.sources
            .iter()
            .filter_map(Source::describe)
            .map(|(label, path)| (label.to_string(), path))
            .collect()
    }

    #[must_use]
    pub fn format_loaded_files(&self) -> Vec<String> {
        self.loaded_files()
            .iter()
            .enumerate()
            .map(|(i, (label, path))| format!("{}. [{label}] {}", i + 1, path.display()))
            .collect()
    }
}
