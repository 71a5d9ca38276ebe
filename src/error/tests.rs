// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use super::{
    ConfigError, CreateReleaseError, FsError, LockedError, PushError, ReleaseField, RemoteError,
    StoreError, StoreResult, TeamNotFoundError, TransformerBatchApplyError,
};

#[test]
fn test_store_error_size() {
    // Every payload is boxed, Box<str> being the widest at 16 bytes.
    let size = std::mem::size_of::<StoreError>();
    assert!(size <= 24, "StoreError is {size} bytes, expected <= 24");
}

#[test]
fn test_store_result_size() {
    let size = std::mem::size_of::<StoreResult<()>>();
    assert!(size <= 24, "StoreResult<()> is {size} bytes, expected <= 24");
}

#[test]
fn test_release_error_messages() {
    let messages: Vec<String> = [
        CreateReleaseError::GeneralFailure("disk full".to_string()),
        CreateReleaseError::AlreadyExistsSame,
        CreateReleaseError::AlreadyExistsDifferent {
            field: ReleaseField::SourceAuthor,
            diff: "-alice\n+bob\n".to_string(),
        },
        CreateReleaseError::TooOld,
        CreateReleaseError::AppNameTooLong {
            app: "My_App".to_string(),
            pattern: crate::valid::NAME_PATTERN.to_string(),
            max_len: 39,
        },
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    insta::assert_debug_snapshot!(messages, @r#"
    [
        "general failure: disk full",
        "release already exists with the same content",
        "release already exists with a different SOURCE_AUTHOR:\n-alice\n+bob\n",
        "release is too old",
        "invalid application name: 'My_App' - must match regexp '\\A[a-z0-9]+(?:-[a-z0-9]+)*\\z' and <= 39 characters",
    ]
    "#);
}

#[test]
fn test_team_not_found_compares_by_kind() {
    let a = StoreError::from(TeamNotFoundError::new("team 'a' does not exist"));
    let b = StoreError::from(TeamNotFoundError::new("team 'b' does not exist"));
    assert_eq!(a, b);
    assert_ne!(a, StoreError::other("team 'a' does not exist"));
}

#[test]
fn test_batch_error_compares_index_and_cause() {
    let at = |index, cause: &str| {
        StoreError::from(TransformerBatchApplyError::at(
            index,
            StoreError::invalid_argument(cause),
        ))
    };
    assert_eq!(at(1, "bad name"), at(1, "bad name"));
    assert_ne!(at(1, "bad name"), at(2, "bad name"));
    assert_ne!(at(1, "bad name"), at(1, "other name"));
}

#[test]
fn test_batch_error_messages() {
    let attributed = TransformerBatchApplyError::at(3, LockedError::default().into());
    let unattributed =
        TransformerBatchApplyError::unattributed(StoreError::other("failure in StateAt"));
    insta::assert_snapshot!(attributed.to_string(), @"error at index 3 of transformer batch: locked");
    insta::assert_snapshot!(unattributed.to_string(), @"error not specific to one transformer of this batch: failure in StateAt");
}

#[test]
fn test_classification_sees_through_batches() {
    let broken = StoreError::from(TransformerBatchApplyError::at(
        0,
        StoreError::invalid_json("environments/dev/config.json"),
    ));
    assert!(broken.is_invalid_json());

    let locked = StoreError::from(TransformerBatchApplyError::unattributed(
        LockedError::default().into(),
    ));
    assert!(locked.as_locked().is_some());
    assert!(!locked.is_invalid_json());

    let release = StoreError::from(TransformerBatchApplyError::at(
        0,
        CreateReleaseError::TooOld.into(),
    ));
    assert_eq!(release.as_create_release(), Some(&CreateReleaseError::TooOld));
}

#[test]
fn test_remote_errors_classify_permanence() {
    let cases = [
        RemoteError::NonFastForward("refs/heads/master".to_string()),
        RemoteError::Timeout(Duration::from_secs(60)),
        RemoteError::Cancelled,
        RemoteError::Transport {
            command: "git push".to_string(),
            message: "connection reset".to_string(),
        },
    ];
    let classified: Vec<(String, bool)> = cases
        .iter()
        .map(|err| (err.to_string(), err.is_permanent()))
        .collect();
    insta::assert_debug_snapshot!(classified, @r#"
    [
        (
            "non-fast-forward update: refs/heads/master",
            true,
        ),
        (
            "timed out after 60s",
            false,
        ),
        (
            "operation cancelled",
            true,
        ),
        (
            "git push failed: connection reset",
            false,
        ),
    ]
    "#);
}

#[test]
fn test_push_error_fast_forward_detection() {
    assert!(StoreError::from(PushError::FastForward).is_fast_forward_conflict());
    assert!(!StoreError::from(PushError::Context).is_fast_forward_conflict());
}

#[test]
fn test_ambient_error_display() {
    let config = StoreError::from(ConfigError::MissingKey {
        section: "repository".to_string(),
        key: "url".to_string(),
    });
    let fs = StoreError::from(FsError::NotFound("applications/app/team".to_string()));
    insta::assert_snapshot!(config.to_string(), @"config error: missing required config key 'url' in section '[repository]'");
    insta::assert_snapshot!(fs.to_string(), @"filesystem error: file does not exist: applications/app/team");
}
