// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use tracing_subscriber::filter::LevelFilter;

use super::{LogConfig, LogLevel};

#[test]
fn test_log_level_bounds() {
    let levels: Vec<_> = (0..=6u8)
        .map(|n| (n, LogLevel::new(n).map(LogLevel::name).ok()))
        .collect();
    insta::assert_debug_snapshot!(levels, @r#"
    [
        (
            0,
            Some(
                "off",
            ),
        ),
        (
            1,
            Some(
                "error",
            ),
        ),
        (
            2,
            Some(
                "warn",
            ),
        ),
        (
            3,
            Some(
                "info",
            ),
        ),
        (
            4,
            Some(
                "debug",
            ),
        ),
        (
            5,
            Some(
                "trace",
            ),
        ),
        (
            6,
            None,
        ),
    ]
    "#);
}

#[test]
fn test_log_level_rejects_out_of_range_in_config() {
    let err = serde_json::from_str::<LogLevel>("9").unwrap_err();
    assert!(
        err.to_string()
            .starts_with("invalid value for 'level' in section '[log]': log level must be 0-5, got 9"),
        "{err}"
    );
}

#[test]
fn test_log_level_filters() {
    assert_eq!(LogLevel::OFF.level_filter(), LevelFilter::OFF);
    assert_eq!(LogLevel::TRACE.level_filter(), LevelFilter::TRACE);
    assert!(LogLevel::WARN < LogLevel::DEBUG);
}

#[test]
fn test_log_level_serializes_as_integer() {
    assert_eq!(serde_json::to_string(&LogLevel::DEBUG).unwrap(), "4");
    assert_eq!(serde_json::from_str::<LogLevel>("2").unwrap(), LogLevel::WARN);
}

#[test]
fn test_log_file_setter_accepts_str() {
    let config = LogConfig::builder()
        .with_log_file("logs/store.log")
        .with_json_file(true)
        .build();
    assert_eq!(config.log_file(), Some(Path::new("logs/store.log")));
    assert!(config.json_file());
}

#[test]
fn test_log_config_defaults() {
    let config = LogConfig::default();
    assert_eq!(config.console_level(), LogLevel::INFO);
    assert_eq!(config.file_level(), LogLevel::DEBUG);
    assert_eq!(config.log_file(), None);
    assert!(!config.json_file());
    assert!(!config.show_target());
}
