// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Read-only view of the relational store.
//!
//! ```text
//! transformer --lookup--> DeploymentDb
//!                           |-- environment_lock(env, id)
//!                           |-- application_lock(env, app, id)
//!                           |-- team_lock(env, team, id)
//!                           |-- application(app)
//!                           |-- deployment(app, env, version)
//!                           '-- latest_deployment(app, env)
//! ```
//!
//! The relational store is authoritative for lock, release and application
//! metadata. Transformers only read from it; writes happen before a
//! transformer runs and are the caller's concern.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::state::Lock;

/// Result type for relational store lookups.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Metadata of an application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRecord {
    pub name: String,
    pub team: String,
}

/// One recorded deployment of a release to an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub application: String,
    pub environment: String,
    /// `None` when the application was undeployed.
    pub version: Option<u64>,
    pub deployed_by_name: String,
    pub deployed_by_email: String,
    pub deployed_at: DateTime<Utc>,
}

/// Lookups transformers perform against the relational store.
pub trait DeploymentDb: Send + Sync {
    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn environment_lock(&self, env: &str, lock_id: &str) -> DbResult<Option<Lock>>;

    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn application_lock(&self, env: &str, app: &str, lock_id: &str) -> DbResult<Option<Lock>>;

    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn team_lock(&self, env: &str, team: &str, lock_id: &str) -> DbResult<Option<Lock>>;

    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn application(&self, app: &str) -> DbResult<Option<ApplicationRecord>>;

    /// Record of deploying exactly `version` of `app` to `env`.
    ///
    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn deployment(&self, app: &str, env: &str, version: u64) -> DbResult<Option<DeploymentRecord>>;

    /// Most recent deployment of `app` to `env`.
    ///
    /// # Errors
    ///
    /// Returns a `DbError` if the query fails.
    fn latest_deployment(&self, app: &str, env: &str) -> DbResult<Option<DeploymentRecord>>;
}

#[derive(Debug, Default)]
struct Tables {
    environment_locks: BTreeMap<(String, String), Lock>,
    application_locks: BTreeMap<(String, String, String), Lock>,
    team_locks: BTreeMap<(String, String, String), Lock>,
    applications: BTreeMap<String, ApplicationRecord>,
    deployments: Vec<DeploymentRecord>,
}

/// In-memory relational store.
#[derive(Debug, Default)]
pub struct MemoryDb {
    tables: Mutex<Tables>,
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_environment_lock(&self, env: &str, lock_id: &str, lock: Lock) {
        self.tables()
            .environment_locks
            .insert((env.to_string(), lock_id.to_string()), lock);
    }

    pub fn insert_application_lock(&self, env: &str, app: &str, lock_id: &str, lock: Lock) {
        self.tables().application_locks.insert(
            (env.to_string(), app.to_string(), lock_id.to_string()),
            lock,
        );
    }

    pub fn insert_team_lock(&self, env: &str, team: &str, lock_id: &str, lock: Lock) {
        self.tables().team_locks.insert(
            (env.to_string(), team.to_string(), lock_id.to_string()),
            lock,
        );
    }

    pub fn insert_application(&self, app: &str, team: &str) {
        self.tables().applications.insert(
            app.to_string(),
            ApplicationRecord {
                name: app.to_string(),
                team: team.to_string(),
            },
        );
    }

    /// Append a deployment; later records win for `latest_deployment`.
    pub fn insert_deployment(&self, record: DeploymentRecord) {
        self.tables().deployments.push(record);
    }
}

impl DeploymentDb for MemoryDb {
    fn environment_lock(&self, env: &str, lock_id: &str) -> DbResult<Option<Lock>> {
        Ok(self
            .tables()
            .environment_locks
            .get(&(env.to_string(), lock_id.to_string()))
            .cloned())
    }

    fn application_lock(&self, env: &str, app: &str, lock_id: &str) -> DbResult<Option<Lock>> {
        Ok(self
            .tables()
            .application_locks
            .get(&(env.to_string(), app.to_string(), lock_id.to_string()))
            .cloned())
    }

    fn team_lock(&self, env: &str, team: &str, lock_id: &str) -> DbResult<Option<Lock>> {
        Ok(self
            .tables()
            .team_locks
            .get(&(env.to_string(), team.to_string(), lock_id.to_string()))
            .cloned())
    }

    fn application(&self, app: &str) -> DbResult<Option<ApplicationRecord>> {
        Ok(self.tables().applications.get(app).cloned())
    }

    fn deployment(&self, app: &str, env: &str, version: u64) -> DbResult<Option<DeploymentRecord>> {
        Ok(self
            .tables()
            .deployments
            .iter()
            .rev()
            .find(|d| d.application == app && d.environment == env && d.version == Some(version))
            .cloned())
    }

    fn latest_deployment(&self, app: &str, env: &str) -> DbResult<Option<DeploymentRecord>> {
        Ok(self
            .tables()
            .deployments
            .iter()
            .rev()
            .find(|d| d.application == app && d.environment == env)
            .cloned())
    }
}
