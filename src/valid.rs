// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Name validation.
//!
//! ```text
//! application  DNS-label pattern, <= max length (configurable, default 39)
//! environment  DNS-label pattern, < 21 bytes
//! team         DNS-label pattern, < 21 bytes
//! lock id      2..=99 bytes, not "." or "..", no '/'
//! commit id    40 hex digits
//! ```
//!
//! `{application}-{environment}` becomes a reconciler resource name, so
//! both halves must stay DNS-safe.

use std::sync::OnceLock;

use regex::Regex;

/// Pattern shared by application, environment and team names.
pub const NAME_PATTERN: &str = r"\A[a-z0-9]+(?:-[a-z0-9]+)*\z";

/// Default maximum application name length.
pub const MAX_APP_NAME_LEN: usize = 39;

fn name_regex() -> Option<&'static Regex> {
    static NAME: OnceLock<Option<Regex>> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(NAME_PATTERN).ok()).as_ref()
}

fn matches_name(name: &str) -> bool {
    name_regex().is_some_and(|rx| rx.is_match(name))
}

#[must_use]
pub fn application_name(name: &str, max_len: usize) -> bool {
    name.len() <= max_len && matches_name(name)
}

#[must_use]
pub fn environment_name(name: &str) -> bool {
    name.len() < 21 && matches_name(name)
}

#[must_use]
pub fn team_name(name: &str) -> bool {
    name.len() < 21 && matches_name(name)
}

/// Lock ids become directory names.
#[must_use]
pub fn lock_id(id: &str) -> bool {
    (2..100).contains(&id.len()) && id != "." && id != ".." && !id.contains('/')
}

#[must_use]
pub fn sha1_commit_id(id: &str) -> bool {
    id.len() == 40 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
