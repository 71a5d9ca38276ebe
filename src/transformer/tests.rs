// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use super::*;
use crate::db::{DeploymentRecord, MemoryDb};
use crate::error::{CreateReleaseError, ReleaseField, StoreError, StoreResult};
use crate::fs::TreeFs;
use crate::odb::MemoryObjectStore;
use crate::state::{EnvironmentConfig, Lock, State, Upstream, paths};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn meta() -> TransformerMetadata {
    TransformerMetadata::new("alice", "alice@example.com")
}

fn state_with(db: Arc<MemoryDb>, limit: usize) -> State {
    let store = Arc::new(MemoryObjectStore::new());
    State::new(TreeFs::empty(store), None, limit, db)
}

fn state() -> State {
    state_with(Arc::new(MemoryDb::new()), 20)
}

fn apply(state: &mut State, transformer: impl Into<Transformer>) -> StoreResult<(String, TransformerResult)> {
    run_transformer(&transformer.into(), state, TransformerContext::new(now()))
}

fn manifests(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(env, m)| ((*env).to_string(), (*m).to_string()))
        .collect()
}

fn release(app: &str, version: u64, pairs: &[(&str, &str)]) -> CreateApplicationVersion {
    CreateApplicationVersion {
        metadata: meta(),
        application: app.to_string(),
        version,
        manifests: manifests(pairs),
        source_commit_id: "CE013625030BA8DBA906F756967F9E9CA394464A".to_string(),
        source_author: "alice".to_string(),
        source_message: "fix things".to_string(),
        team: "team-123".to_string(),
        display_version: String::new(),
    }
}

fn deploy(app: &str, env: &str, version: u64, lock_behavior: LockBehavior) -> DeployApplicationVersion {
    DeployApplicationVersion {
        metadata: meta(),
        environment: env.to_string(),
        application: app.to_string(),
        version,
        lock_behavior,
    }
}

fn create_environment(state: &mut State, env: &str, config: EnvironmentConfig) {
    apply(
        state,
        CreateEnvironment {
            metadata: meta(),
            environment: env.to_string(),
            config,
        },
    )
    .unwrap();
}

fn lock(message: &str) -> Lock {
    Lock::new(message, "bob", "bob@example.com", now())
}

fn create_release_error(err: StoreError) -> CreateReleaseError {
    err.as_create_release()
        .cloned()
        .unwrap_or_else(|| panic!("expected release error, got {err:?}"))
}

// --- CreateApplicationVersion ---

#[test]
fn test_create_release_writes_release_and_team() {
    let mut state = state();
    let (message, result) = apply(
        &mut state,
        release("myapp", 7, &[("acceptance", "mani-1-acc"), ("dev", "mani-1-dev")]),
    )
    .unwrap();

    assert_eq!(message, r#"created version 7 of "myapp""#);
    assert_eq!(state.fs().read_to_string("applications/myapp/team").unwrap(), "team-123");
    assert_eq!(
        state
            .fs()
            .read_to_string("applications/myapp/releases/7/environments/acceptance/manifests.yaml")
            .unwrap(),
        "mani-1-acc"
    );
    assert_eq!(
        state
            .fs()
            .read_to_string("applications/myapp/releases/7/source_commit_id")
            .unwrap(),
        "ce013625030ba8dba906f756967f9e9ca394464a"
    );
    let stored = state.application_release("myapp", 7).unwrap();
    assert_eq!(stored.created_at, Some(now()));
    assert_eq!(stored.display_version, "");
    assert_eq!(
        result.changed_environments().into_iter().collect::<Vec<_>>(),
        vec!["acceptance", "dev"]
    );
}

#[test]
fn test_create_release_version_zero_picks_next() {
    let mut state = state();
    apply(&mut state, release("app", 0, &[("dev", "a")])).unwrap();
    let (message, _) = apply(&mut state, release("app", 0, &[("dev", "b")])).unwrap();
    assert_eq!(message, r#"created version 2 of "app""#);
    assert_eq!(state.releases("app").unwrap(), vec![1, 2]);
}

#[test]
fn test_create_release_twice_is_idempotent() {
    let mut state = state();
    let request = release("myapp", 7, &[("acceptance", "mani-1-acc")]);
    apply(&mut state, request.clone()).unwrap();
    let before = state.flush().unwrap();

    let err = apply(&mut state, request).unwrap_err();
    assert_eq!(create_release_error(err), CreateReleaseError::AlreadyExistsSame);
    assert_eq!(state.flush().unwrap(), before);
}

#[test]
fn test_create_release_with_other_manifest_reports_diff() {
    let mut state = state();
    apply(&mut state, release("myapp", 7, &[("acceptance", "mani-1-acc\n")])).unwrap();

    let err = apply(&mut state, release("myapp", 7, &[("acceptance", "mani-2-acc\n")])).unwrap_err();
    let CreateReleaseError::AlreadyExistsDifferent { field, diff } = create_release_error(err) else {
        panic!("expected a differing release");
    };
    assert_eq!(field, ReleaseField::Manifests);
    insta::assert_snapshot!(diff, @r"
    --- existing
    +++ request
    @@ -1 +1 @@
    -mani-1-acc
    +mani-2-acc
    ");
}

#[test]
fn test_create_release_reports_first_differing_field() {
    let mut state = state();
    apply(&mut state, release("myapp", 7, &[("dev", "x")])).unwrap();

    let mut changed = release("myapp", 7, &[("dev", "y")]);
    changed.source_author = "mallory".to_string();
    let err = apply(&mut state, changed).unwrap_err();
    let CreateReleaseError::AlreadyExistsDifferent { field, diff } = create_release_error(err) else {
        panic!("expected a differing release");
    };
    assert_eq!(field, ReleaseField::SourceAuthor);
    assert!(diff.contains("-alice"));
    assert!(diff.contains("+mallory"));
}

#[test]
fn test_create_release_ignores_yaml_formatting() {
    let mut state = state();
    apply(&mut state, release("myapp", 1, &[("dev", "a: 1\nb: x\n")])).unwrap();
    let err = apply(&mut state, release("myapp", 1, &[("dev", "a:   1\nb: 'x'")])).unwrap_err();
    assert_eq!(create_release_error(err), CreateReleaseError::AlreadyExistsSame);
}

#[test]
fn test_create_release_rejects_invalid_name() {
    let mut state = state();
    let err = apply(&mut state, release("Not_Valid", 1, &[("dev", "x")])).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r"invalid application name: 'Not_Valid' - must match regexp '\A[a-z0-9]+(?:-[a-z0-9]+)*\z' and <= 39 characters");
    assert!(state.applications().unwrap().is_empty());

    let long = "a".repeat(12);
    let ctx = TransformerContext::new(now()).with_max_app_name_length(10);
    let err = run_transformer(&release(&long, 1, &[]).into(), &mut state, ctx).unwrap_err();
    assert!(matches!(
        create_release_error(err),
        CreateReleaseError::AppNameTooLong { max_len: 10, .. }
    ));
}

#[test]
fn test_create_release_too_old_for_retention() {
    let mut state = state_with(Arc::new(MemoryDb::new()), 2);
    for v in 1..=5 {
        apply(&mut state, release("app", v, &[("dev", "m")])).unwrap();
    }
    apply(&mut state, deploy("app", "dev", 5, LockBehavior::Fail)).unwrap();
    assert_eq!(state.releases("app").unwrap(), vec![4, 5]);

    let err = apply(&mut state, release("app", 3, &[("dev", "m")])).unwrap_err();
    assert_eq!(create_release_error(err), CreateReleaseError::TooOld);
}

#[test]
fn test_create_release_deploys_to_latest_environments() {
    let mut state = state();
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    create_environment(
        &mut state,
        "staging",
        EnvironmentConfig {
            upstream: Some(Upstream::environment("dev")),
            ..EnvironmentConfig::default()
        },
    );

    let (message, _) = apply(
        &mut state,
        release("app", 1, &[("dev", "d"), ("staging", "s")]),
    )
    .unwrap();
    insta::assert_snapshot!(message, @r#"
    created version 1 of "app"
    deployed version 1 of "app" to "dev"
    "#);
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), Some(1));
    assert_eq!(state.environment_application_version("staging", "app").unwrap(), None);
}

#[test]
fn test_create_release_queues_on_locked_latest_environment() {
    let db = Arc::new(MemoryDb::new());
    db.insert_environment_lock("dev", "freeze", lock("freeze"));
    let mut state = state_with(db, 20);
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    apply(
        &mut state,
        CreateEnvironmentLock {
            metadata: meta(),
            environment: "dev".to_string(),
            lock_id: "freeze".to_string(),
        },
    )
    .unwrap();

    let (message, _) = apply(&mut state, release("app", 1, &[("dev", "d")])).unwrap();
    insta::assert_snapshot!(message, @r#"
    created version 1 of "app"
    Queued version 1 of app "app" in env "dev"
    "#);
    assert_eq!(state.queued_version("dev", "app").unwrap(), Some(1));
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), None);
}

#[test]
fn test_create_release_backfill_leaves_latest_environments_alone() {
    let mut state = state();
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    apply(&mut state, release("app", 1, &[("dev", "one")])).unwrap();
    apply(&mut state, release("app", 3, &[("dev", "three")])).unwrap();
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), Some(3));

    let (message, result) = apply(&mut state, release("app", 2, &[("dev", "two")])).unwrap();

    assert_eq!(message, r#"created version 2 of "app""#);
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), Some(3));
    assert_eq!(
        state.fs().read_to_string(&paths::deployed_manifest("dev", "app")).unwrap(),
        "three"
    );
    assert_eq!(result.changed_apps.len(), 1);
}

#[test]
fn test_create_release_backfill_within_retention_window() {
    let mut state = state_with(Arc::new(MemoryDb::new()), 3);
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();
    apply(&mut state, release("app", 3, &[("dev", "m")])).unwrap();
    apply(&mut state, deploy("app", "dev", 3, LockBehavior::Fail)).unwrap();

    let (message, _) = apply(&mut state, release("app", 2, &[("dev", "m")])).unwrap();

    assert_eq!(message, r#"created version 2 of "app""#);
    assert_eq!(state.releases("app").unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_recreate_release_without_optional_fields_is_same() {
    let mut state = state();
    apply(&mut state, release("app", 7, &[("dev", "m")])).unwrap();

    let mut request = release("app", 7, &[("dev", "m")]);
    request.team = String::new();
    request.source_commit_id = String::new();
    let err = apply(&mut state, request).unwrap_err();

    assert_eq!(create_release_error(err), CreateReleaseError::AlreadyExistsSame);
    assert_eq!(state.application_team("app").unwrap().as_deref(), Some("team-123"));
}

// --- DeployApplicationVersion ---

#[test]
fn test_deploy_links_version_and_copies_manifest() {
    let db = Arc::new(MemoryDb::new());
    db.insert_deployment(DeploymentRecord {
        application: "myapp".to_string(),
        environment: "acceptance".to_string(),
        version: Some(7),
        deployed_by_name: "carol".to_string(),
        deployed_by_email: "carol@example.com".to_string(),
        deployed_at: Utc.with_ymd_and_hms(2024, 2, 29, 8, 30, 0).unwrap(),
    });
    let mut state = state_with(db, 20);
    apply(
        &mut state,
        release("myapp", 7, &[("acceptance", "mani-1-acc"), ("dev", "mani-1-dev")]),
    )
    .unwrap();

    let (message, result) = apply(&mut state, deploy("myapp", "acceptance", 7, LockBehavior::Fail)).unwrap();
    assert_eq!(message, r#"deployed version 7 of "myapp" to "acceptance""#);
    assert_eq!(
        state.fs().read_link(&paths::version_link("acceptance", "myapp")).unwrap(),
        "../../../../applications/myapp/releases/7"
    );
    assert_eq!(
        state
            .fs()
            .read_to_string("environments/acceptance/applications/myapp/version/environments/acceptance/manifests.yaml")
            .unwrap(),
        "mani-1-acc"
    );
    assert_eq!(
        state
            .fs()
            .read_to_string("environments/acceptance/applications/myapp/manifests/manifests.yaml")
            .unwrap(),
        "mani-1-acc"
    );
    let app_dir = paths::environment_application_dir("acceptance", "myapp");
    assert_eq!(
        state.fs().read_to_string(&format!("{app_dir}/deployed_by")).unwrap(),
        "carol"
    );
    insta::assert_snapshot!(
        state.fs().read_to_string(&format!("{app_dir}/deployed_at_utc")).unwrap(),
        @"2024-02-29 08:30:00 +0000 UTC"
    );
    assert_eq!(
        result.changed_apps,
        vec![AppEnv {
            app: "myapp".to_string(),
            env: "acceptance".to_string(),
            team: "team-123".to_string(),
        }]
    );
}

#[test]
fn test_deploy_without_record_uses_author() {
    let mut state = state();
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();
    apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap();
    assert_eq!(
        state
            .fs()
            .read_to_string("environments/dev/applications/app/deployed_by_email")
            .unwrap(),
        "alice@example.com"
    );
}

#[test]
fn test_deploy_writes_space_for_empty_manifest() {
    let mut state = state();
    apply(&mut state, release("app", 1, &[("dev", "kind: Service")])).unwrap();
    apply(&mut state, release("app", 2, &[("dev", "")])).unwrap();
    apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap();
    apply(&mut state, deploy("app", "dev", 2, LockBehavior::Fail)).unwrap();
    assert_eq!(
        state.fs().read_file(&paths::deployed_manifest("dev", "app")).unwrap(),
        b" "
    );
}

#[test]
fn test_deploy_missing_manifest_fails() {
    let mut state = state();
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();
    let err = apply(&mut state, deploy("app", "prod", 1, LockBehavior::Fail)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"release of app app with version 1 has no manifest for environment prod");
}

fn locked_state() -> State {
    let db = Arc::new(MemoryDb::new());
    db.insert_environment_lock("acceptance", "l1", lock("maintenance"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "acceptance", EnvironmentConfig::default());
    apply(&mut state, release("myapp", 6, &[("acceptance", "old")])).unwrap();
    apply(&mut state, release("myapp", 7, &[("acceptance", "new")])).unwrap();
    apply(&mut state, deploy("myapp", "acceptance", 6, LockBehavior::Fail)).unwrap();
    apply(
        &mut state,
        CreateEnvironmentLock {
            metadata: meta(),
            environment: "acceptance".to_string(),
            lock_id: "l1".to_string(),
        },
    )
    .unwrap();
    state
}

#[test]
fn test_deploy_with_fail_behavior_reports_locks() {
    let mut state = locked_state();
    let err = apply(&mut state, deploy("myapp", "acceptance", 7, LockBehavior::Fail)).unwrap_err();
    let locked = err.as_locked().expect("locked error");
    assert_eq!(locked.environment_locks.get("l1"), Some(&lock("maintenance")));
    assert!(locked.environment_application_locks.is_empty());
    assert!(locked.team_locks.is_empty());
    assert_eq!(
        state.environment_application_version("acceptance", "myapp").unwrap(),
        Some(6)
    );
}

#[test]
fn test_deploy_with_record_behavior_queues() {
    let mut state = locked_state();
    let (message, _) = apply(&mut state, deploy("myapp", "acceptance", 7, LockBehavior::Record)).unwrap();
    assert_eq!(message, r#"Queued version 7 of app "myapp" in env "acceptance""#);
    assert_eq!(
        state.environment_application_version("acceptance", "myapp").unwrap(),
        Some(6)
    );
    assert_eq!(state.queued_version("acceptance", "myapp").unwrap(), Some(7));
}

#[test]
fn test_deploy_with_ignore_behavior_clears_queue() {
    let mut state = locked_state();
    apply(&mut state, deploy("myapp", "acceptance", 7, LockBehavior::Record)).unwrap();
    apply(&mut state, deploy("myapp", "acceptance", 7, LockBehavior::Ignore)).unwrap();
    assert_eq!(
        state.environment_application_version("acceptance", "myapp").unwrap(),
        Some(7)
    );
    assert_eq!(state.queued_version("acceptance", "myapp").unwrap(), None);
}

#[test]
fn test_deploy_respects_team_locks() {
    let db = Arc::new(MemoryDb::new());
    db.insert_team_lock("dev", "team-123", "t1", lock("team freeze"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();
    apply(
        &mut state,
        CreateEnvironmentTeamLock {
            metadata: meta(),
            environment: "dev".to_string(),
            team: "team-123".to_string(),
            lock_id: "t1".to_string(),
        },
    )
    .unwrap();

    let err = apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap_err();
    let locked = err.as_locked().expect("locked error");
    assert_eq!(locked.team_locks.keys().collect::<Vec<_>>(), vec!["t1"]);
}

// --- Cleanup ---

#[test]
fn test_cleanup_keeps_retention_window_below_deployed_version() {
    let mut state = state_with(Arc::new(MemoryDb::new()), 2);
    for v in 1..=5 {
        apply(&mut state, release("app", v, &[("dev", "m")])).unwrap();
    }
    state.set_version_link("dev", "app", 5).unwrap();

    let (message, _) = apply(
        &mut state,
        CleanupOldApplicationVersions {
            metadata: meta(),
            application: "app".to_string(),
        },
    )
    .unwrap();
    assert_eq!(state.releases("app").unwrap(), vec![4, 5]);
    insta::assert_snapshot!(message, @r"
    removed version 1 of app app as cleanup
    removed version 2 of app app as cleanup
    removed version 3 of app app as cleanup
    ");
}

#[test]
fn test_cleanup_never_removes_deployed_or_queued_versions() {
    let mut state = state_with(Arc::new(MemoryDb::new()), 2);
    for v in 1..=6 {
        apply(&mut state, release("app", v, &[("dev", "m")])).unwrap();
    }
    state.set_version_link("prod", "app", 2).unwrap();
    state.set_queued_version("dev", "app", 3).unwrap();
    state.set_version_link("dev", "app", 6).unwrap();

    apply(
        &mut state,
        CleanupOldApplicationVersions {
            metadata: meta(),
            application: "app".to_string(),
        },
    )
    .unwrap();
    assert_eq!(state.releases("app").unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_deploy_message_nests_cleanup_fragments() {
    let mut state = state_with(Arc::new(MemoryDb::new()), 2);
    for v in 1..=3 {
        apply(&mut state, release("app", v, &[("dev", "m")])).unwrap();
    }
    let (message, _) = apply(&mut state, deploy("app", "dev", 3, LockBehavior::Fail)).unwrap();
    insta::assert_snapshot!(message, @r#"
    deployed version 3 of "app" to "dev"
    removed version 1 of app app as cleanup
    "#);
}

// --- Locks ---

#[test]
fn test_environment_lock_projection_and_removal() {
    let db = Arc::new(MemoryDb::new());
    db.insert_environment_lock("dev", "l1", lock("maintenance"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "dev", EnvironmentConfig::default());

    let create = CreateEnvironmentLock {
        metadata: meta(),
        environment: "dev".to_string(),
        lock_id: "l1".to_string(),
    };
    let (message, _) = apply(&mut state, create).unwrap();
    assert_eq!(message, r#"Created lock "l1" on environment "dev""#);
    assert_eq!(state.environment_locks("dev").unwrap()["l1"], lock("maintenance"));

    let delete = DeleteEnvironmentLock {
        metadata: meta(),
        environment: "dev".to_string(),
        lock_id: "l1".to_string(),
    };
    let (message, _) = apply(&mut state, delete.clone()).unwrap();
    assert_eq!(message, r#"Deleted lock "l1" on environment "dev""#);
    assert_eq!(state.fs().stat("environments/dev/locks").unwrap(), None);
    apply(&mut state, delete).unwrap();
}

#[test]
fn test_environment_lock_requires_database_row_and_environment() {
    let mut state = state();
    let create = CreateEnvironmentLock {
        metadata: meta(),
        environment: "dev".to_string(),
        lock_id: "l1".to_string(),
    };
    let err = apply(&mut state, create.clone()).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"could not access environment information on: 'environments/dev'");

    create_environment(&mut state, "dev", EnvironmentConfig::default());
    let err = apply(&mut state, create).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"no environment lock found to create with lock id 'l1' on environment 'dev'");
}

#[test]
fn test_delete_application_lock_drops_stale_queue() {
    let db = Arc::new(MemoryDb::new());
    db.insert_application_lock("dev", "app", "l2", lock("app lock"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();
    apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap();
    apply(
        &mut state,
        CreateEnvironmentApplicationLock {
            metadata: meta(),
            environment: "dev".to_string(),
            application: "app".to_string(),
            lock_id: "l2".to_string(),
        },
    )
    .unwrap();
    state.set_queued_version("dev", "app", 1).unwrap();

    let (message, _) = apply(
        &mut state,
        DeleteEnvironmentApplicationLock {
            metadata: meta(),
            environment: "dev".to_string(),
            application: "app".to_string(),
            lock_id: "l2".to_string(),
        },
    )
    .unwrap();
    insta::assert_snapshot!(message, @r#"
    Deleted lock "l2" on environment "dev" for application "app"
    deleted queued version 1 because it was already deployed. app="app" env="dev"
    "#);
    assert_eq!(state.queued_version("dev", "app").unwrap(), None);
    assert_eq!(
        state.fs().stat(&paths::application_locks_dir("dev", "app")).unwrap(),
        None
    );
}

#[test]
fn test_team_lock_requires_known_team() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    let err = apply(
        &mut state,
        CreateEnvironmentTeamLock {
            metadata: meta(),
            environment: "dev".to_string(),
            team: "ghosts".to_string(),
            lock_id: "t1".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::TeamNotFound(_)));
    insta::assert_snapshot!(err.to_string(), @"team 'ghosts' does not exist");
}

#[test]
fn test_team_lock_round_trip() {
    let db = Arc::new(MemoryDb::new());
    db.insert_team_lock("dev", "team-123", "t1", lock("team"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();

    let (message, _) = apply(
        &mut state,
        CreateEnvironmentTeamLock {
            metadata: meta(),
            environment: "dev".to_string(),
            team: "team-123".to_string(),
            lock_id: "t1".to_string(),
        },
    )
    .unwrap();
    assert_eq!(message, r#"Created lock "t1" on environment "dev" for team "team-123"."#);
    assert_eq!(state.environment_team_locks("dev", "team-123").unwrap().len(), 1);

    let (message, _) = apply(
        &mut state,
        DeleteEnvironmentTeamLock {
            metadata: meta(),
            environment: "dev".to_string(),
            team: "team-123".to_string(),
            lock_id: "t1".to_string(),
        },
    )
    .unwrap();
    assert_eq!(message, r#"Deleted lock "t1" on environment "dev" for team "team-123""#);
    assert!(state.environment_team_locks("dev", "team-123").unwrap().is_empty());
}

#[test]
fn test_lock_ids_are_validated() {
    let mut state = state();
    let err = apply(
        &mut state,
        DeleteEnvironmentLock {
            metadata: meta(),
            environment: "dev".to_string(),
            lock_id: "../x".to_string(),
        },
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot delete environment lock: invalid lock id: '../x'");
}

#[test]
fn test_lock_names_are_validated() {
    let mut state = state();
    let err = apply(
        &mut state,
        CreateEnvironmentLock {
            metadata: meta(),
            environment: "Dev".to_string(),
            lock_id: "l1".to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::InvalidArgument(_)));
    insta::assert_snapshot!(err.to_string(), @"cannot create environment lock: invalid environment: 'Dev'");

    let err = apply(
        &mut state,
        DeleteEnvironmentApplicationLock {
            metadata: meta(),
            environment: "dev".to_string(),
            application: "my_app".to_string(),
            lock_id: "l1".to_string(),
        },
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot delete application lock: invalid application: 'my_app'");

    let long = "a".repeat(40);
    let err = apply(
        &mut state,
        CreateEnvironmentApplicationLock {
            metadata: meta(),
            environment: "dev".to_string(),
            application: long.clone(),
            lock_id: "l1".to_string(),
        },
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("cannot create application lock: invalid application: '{long}'")
    );
}

#[test]
fn test_deploy_names_are_validated() {
    let mut state = state();
    apply(&mut state, release("app", 1, &[("dev", "m")])).unwrap();

    let err = apply(&mut state, deploy("app", "../dev", 1, LockBehavior::Fail)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot deploy application version: invalid environment: '../dev'");

    let err = apply(&mut state, deploy("App", "dev", 1, LockBehavior::Fail)).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot deploy application version: invalid application: 'App'");
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), None);
}

#[test]
fn test_group_locks_change_nothing() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    let before = state.flush().unwrap();

    let (message, result) = apply(
        &mut state,
        CreateEnvironmentGroupLock {
            metadata: meta(),
            environment_group: "staging".to_string(),
            lock_id: "g1".to_string(),
        },
    )
    .unwrap();
    insta::assert_snapshot!(message, @r"
    Empty Commit
    No files changed in CreateEnvironmentGroupLock
    ");
    assert_eq!(result, TransformerResult::default());

    let (message, _) = apply(
        &mut state,
        DeleteEnvironmentGroupLock {
            metadata: meta(),
            environment_group: "staging".to_string(),
            lock_id: "g1".to_string(),
        },
    )
    .unwrap();
    assert!(message.ends_with("DeleteEnvironmentGroupLock"));
    assert_eq!(state.flush().unwrap(), before);
}

// --- CreateEnvironment ---

#[test]
fn test_recreating_environment_replaces_config() {
    let mut state = state();
    create_environment(
        &mut state,
        "staging",
        EnvironmentConfig {
            upstream: Some(Upstream::environment("development")),
            ..EnvironmentConfig::default()
        },
    );
    let (message, _) = apply(
        &mut state,
        CreateEnvironment {
            metadata: meta(),
            environment: "staging".to_string(),
            config: EnvironmentConfig {
                upstream: Some(Upstream::latest()),
                ..EnvironmentConfig::default()
            },
        },
    )
    .unwrap();
    assert_eq!(message, r#"create environment "staging""#);
    assert!(state.environment_config("staging").unwrap().follows_latest());
    insta::assert_snapshot!(
        state.fs().read_to_string("environments/staging/config.json").unwrap(),
        @r#"
    {
      "upstream": {
        "latest": true
      }
    }
    "#
    );
}

#[test]
fn test_delete_environment_removes_config_and_argocd_manifest() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    create_environment(&mut state, "prod", EnvironmentConfig::default());
    state
        .fs_mut()
        .write_file(&paths::argocd_manifest("dev"), b"kind: Application")
        .unwrap();
    let delete = DeleteEnvironment {
        metadata: meta(),
        environment: "dev".to_string(),
    };

    let (message, _) = apply(&mut state, delete.clone()).unwrap();

    assert_eq!(message, r#"delete environment "dev""#);
    assert_eq!(state.environments().unwrap(), vec!["prod".to_string()]);
    assert!(!state.fs().exists(&paths::argocd_manifest("dev")).unwrap());
    apply(&mut state, delete).unwrap();
}

#[test]
fn test_delete_environment_rejects_empty_name() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    let err = apply(
        &mut state,
        DeleteEnvironment {
            metadata: meta(),
            environment: String::new(),
        },
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot delete environment: invalid environment: ''");
    assert_eq!(state.environments().unwrap(), vec!["dev".to_string()]);
}

// --- Undeploy ---

fn undeploy_version(app: &str) -> CreateUndeployApplicationVersion {
    CreateUndeployApplicationVersion {
        metadata: meta(),
        application: app.to_string(),
    }
}

#[test]
fn test_create_undeploy_version_marks_release_and_follows_latest() {
    let mut state = state();
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    create_environment(
        &mut state,
        "staging",
        EnvironmentConfig {
            upstream: Some(Upstream::environment("dev")),
            ..EnvironmentConfig::default()
        },
    );
    apply(&mut state, release("app", 1, &[("dev", "d"), ("staging", "s")])).unwrap();

    let (message, result) = apply(&mut state, undeploy_version("app")).unwrap();

    insta::assert_snapshot!(message, @r#"
    created undeploy-version 2 of 'app'
    deployed version 2 of "app" to "dev"
    "#);
    assert!(
        state
            .fs()
            .exists("applications/app/releases/2/undeploy")
            .unwrap()
    );
    let stored = state.application_release("app", 2).unwrap();
    assert!(stored.undeploy_version);
    assert_eq!(stored.created_at, Some(now()));
    assert_eq!(
        state.release_manifests("app", 2).unwrap(),
        manifests(&[("dev", " "), ("staging", " ")])
    );
    assert_eq!(state.environment_application_version("dev", "app").unwrap(), Some(2));
    assert_eq!(state.environment_application_version("staging", "app").unwrap(), None);
    assert_eq!(
        result.changed_environments().into_iter().collect::<Vec<_>>(),
        vec!["dev", "staging"]
    );
}

#[test]
fn test_create_undeploy_version_skips_locked_environment() {
    let db = Arc::new(MemoryDb::new());
    db.insert_environment_lock("dev", "freeze", lock("freeze"));
    let mut state = state_with(db, 20);
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    apply(&mut state, release("app", 1, &[("dev", "d")])).unwrap();
    apply(
        &mut state,
        CreateEnvironmentLock {
            metadata: meta(),
            environment: "dev".to_string(),
            lock_id: "freeze".to_string(),
        },
    )
    .unwrap();

    apply(&mut state, undeploy_version("app")).unwrap();

    assert_eq!(state.environment_application_version("dev", "app").unwrap(), Some(1));
    assert_eq!(state.queued_version("dev", "app").unwrap(), Some(2));
}

#[test]
fn test_create_undeploy_version_needs_a_release() {
    let mut state = state();
    let err = apply(&mut state, undeploy_version("ghost")).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"cannot undeploy application 'ghost'");
    assert!(!state.fs().exists(&paths::application_dir("ghost")).unwrap());
}

#[test]
fn test_undeploy_application_removes_all_traces() {
    let db = Arc::new(MemoryDb::new());
    db.insert_application("app", "db-team");
    db.insert_application_lock("dev", "app", "l1", lock("hold"));
    let mut state = state_with(db, 20);
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    create_environment(&mut state, "prod", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "d"), ("prod", "p")])).unwrap();
    apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap();
    apply(&mut state, undeploy_version("app")).unwrap();
    apply(&mut state, deploy("app", "dev", 2, LockBehavior::Fail)).unwrap();
    apply(
        &mut state,
        CreateEnvironmentApplicationLock {
            metadata: meta(),
            environment: "dev".to_string(),
            application: "app".to_string(),
            lock_id: "l1".to_string(),
        },
    )
    .unwrap();

    let (message, result) = apply(
        &mut state,
        UndeployApplication {
            metadata: meta(),
            application: "app".to_string(),
        },
    )
    .unwrap();

    assert_eq!(message, "application 'app' was deleted successfully");
    assert!(state.applications().unwrap().is_empty());
    assert!(state.environment_applications("dev").unwrap().is_empty());
    assert_eq!(
        result.changed_apps,
        vec![
            AppEnv {
                app: "app".to_string(),
                env: "dev".to_string(),
                team: "db-team".to_string(),
            },
            AppEnv {
                app: "app".to_string(),
                env: "prod".to_string(),
                team: "db-team".to_string(),
            },
        ]
    );
}

#[test]
fn test_undeploy_application_falls_back_to_team_file() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "d")])).unwrap();

    let (_, result) = apply(
        &mut state,
        UndeployApplication {
            metadata: meta(),
            application: "app".to_string(),
        },
    )
    .unwrap();

    assert_eq!(result.changed_apps[0].team, "team-123");
    assert!(!state.fs().exists(&paths::application_dir("app")).unwrap());
}

#[test]
fn test_delete_env_from_app_reports_root_app() {
    let mut state = state();
    create_environment(&mut state, "dev", EnvironmentConfig::default());
    create_environment(&mut state, "prod", EnvironmentConfig::default());
    apply(&mut state, release("app", 1, &[("dev", "d"), ("prod", "p")])).unwrap();
    apply(&mut state, deploy("app", "dev", 1, LockBehavior::Fail)).unwrap();
    apply(&mut state, deploy("app", "prod", 1, LockBehavior::Fail)).unwrap();
    let delete = DeleteEnvFromApp {
        metadata: meta(),
        application: "app".to_string(),
        environment: "dev".to_string(),
    };

    let (message, result) = apply(&mut state, delete.clone()).unwrap();

    assert_eq!(
        message,
        "Environment 'dev' was removed from application 'app' successfully."
    );
    assert!(
        !state
            .fs()
            .exists(&paths::environment_application_dir("dev", "app"))
            .unwrap()
    );
    assert_eq!(state.environment_application_version("prod", "app").unwrap(), Some(1));
    assert_eq!(result.deleted_root_apps, vec![RootApp { env: "dev".to_string() }]);
    assert_eq!(
        result.changed_apps,
        vec![AppEnv {
            app: "app".to_string(),
            env: "dev".to_string(),
            team: String::new(),
        }]
    );

    let (message, result) = apply(&mut state, delete).unwrap();
    assert_eq!(
        message,
        "Attempted to remove environment 'dev' from application 'app' but it did not exist"
    );
    assert!(result.deleted_root_apps.is_empty());
}

#[test]
fn test_delete_env_from_app_needs_both_names() {
    let mut state = state();
    let err = apply(
        &mut state,
        DeleteEnvFromApp {
            metadata: meta(),
            application: String::new(),
            environment: "dev".to_string(),
        },
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"DeleteEnvFromApp app '' on env 'dev': Need to provide the application");

    let err = apply(
        &mut state,
        DeleteEnvFromApp {
            metadata: meta(),
            application: "app".to_string(),
            environment: String::new(),
        },
    )
    .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"DeleteEnvFromApp app 'app' on env '': Need to provide the environment");
}

// --- ReleaseTrain ---

fn train_state() -> State {
    let mut state = state();
    create_environment(
        &mut state,
        "dev",
        EnvironmentConfig {
            upstream: Some(Upstream::latest()),
            ..EnvironmentConfig::default()
        },
    );
    for env in ["de-1", "de-2"] {
        create_environment(
            &mut state,
            env,
            EnvironmentConfig {
                upstream: Some(Upstream::environment("dev")),
                environment_group: Some("staging".to_string()),
                ..EnvironmentConfig::default()
            },
        );
    }
    apply(
        &mut state,
        release("app", 1, &[("dev", "d"), ("de-1", "s1"), ("de-2", "s2")]),
    )
    .unwrap();
    state
}

fn planned(env: &str, app: &str, version: u64) -> TrainDeployment {
    TrainDeployment {
        environment: env.to_string(),
        application: app.to_string(),
        version,
    }
}

fn train(target: &str, target_type: TrainTargetType, deployments: Vec<TrainDeployment>) -> ReleaseTrain {
    ReleaseTrain {
        metadata: meta(),
        target: target.to_string(),
        target_type,
        deployments,
        skipped: Vec::new(),
    }
}

#[test]
fn test_release_train_deploys_group_members() {
    let mut state = train_state();
    let mut request = train(
        "staging",
        TrainTargetType::Any,
        vec![planned("de-1", "app", 1), planned("de-2", "app", 1)],
    );
    request.skipped = vec![planned("de-1", "other", 4)];

    let (message, _) = apply(&mut state, request).unwrap();

    insta::assert_snapshot!(message, @r#"
    Release Train to environment/environment group 'staging':
    skipped application other on environment de-1
    deployed version 1 of "app" to "de-1"
    deployed version 1 of "app" to "de-2"
    "#);
    assert_eq!(state.environment_application_version("de-2", "app").unwrap(), Some(1));
}

#[test]
fn test_release_train_to_single_environment() {
    let mut state = train_state();
    let request = train(
        "de-1",
        TrainTargetType::Environment,
        vec![planned("de-1", "app", 1)],
    );
    apply(&mut state, request).unwrap();
    assert_eq!(state.environment_application_version("de-1", "app").unwrap(), Some(1));
    assert_eq!(state.environment_application_version("de-2", "app").unwrap(), None);
}

#[test]
fn test_release_train_rejects_environment_outside_target() {
    let mut state = train_state();
    let request = train(
        "staging",
        TrainTargetType::EnvironmentGroup,
        vec![planned("dev", "app", 1)],
    );
    let err = apply(&mut state, request).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"could not find upstream config for env 'dev'");
}

#[test]
fn test_release_train_without_deployments_is_a_no_op() {
    let mut state = train_state();
    let (message, result) =
        apply(&mut state, train("staging", TrainTargetType::Any, Vec::new())).unwrap();
    assert_eq!(message, "Empty Commit\nNo files changed in ReleaseTrain");
    assert!(result.changed_apps.is_empty());
}

// --- Runner ---

#[test]
fn test_runner_result_accumulates_in_order() {
    let mut ctx = TransformerContext::new(now());
    ctx.add_app_env("a", "dev", "t");
    ctx.delete_env_from_app("b", "prod");
    ctx.add_app_env("a", "dev", "t");
    let (message, result) = ctx.finish();
    assert_eq!(message, "");
    assert_eq!(result.changed_apps.len(), 3);
    assert_eq!(result.deleted_root_apps, vec![RootApp { env: "prod".to_string() }]);

    let mut combined = TransformerResult::default();
    combined.combine(result.clone());
    combined.combine(result);
    assert_eq!(combined.changed_apps.len(), 6);
    assert_eq!(
        combined.changed_environments().into_iter().collect::<Vec<_>>(),
        vec!["dev", "prod"]
    );
}

#[test]
fn test_failed_transformer_leaves_no_message() {
    let mut state = state();
    let mut ctx = TransformerContext::new(now());
    let err = ctx.execute(&deploy("app", "dev", 1, LockBehavior::Fail).into(), &mut state);
    assert!(err.is_err());
    assert_eq!(ctx.finish().0, "");
}
