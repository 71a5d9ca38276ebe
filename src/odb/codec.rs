// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Canonical git encoding of tree and commit objects, via `gix-object`.
//!
//! ```text
//! TreeEntry / CommitInfo  --encode-->  gix::objs::{Tree, Commit}  --WriteTo-->  bytes
//! bytes  --TreeRef / CommitRef::from_bytes-->  TreeEntry / CommitInfo
//! ```

use chrono::{DateTime, FixedOffset, TimeZone};
use gix::objs::WriteTo;
use gix::objs::tree::{self, EntryKind};

use super::{CommitInfo, EntryMode, ObjectId, OdbResult, Signature, TreeEntry};
use crate::error::ObjectStoreError;

const fn to_entry_kind(mode: EntryMode) -> EntryKind {
    match mode {
        EntryMode::Tree => EntryKind::Tree,
        EntryMode::Blob => EntryKind::Blob,
        EntryMode::BlobExecutable => EntryKind::BlobExecutable,
        EntryMode::Link => EntryKind::Link,
        EntryMode::Submodule => EntryKind::Commit,
    }
}

const fn from_entry_kind(kind: EntryKind) -> EntryMode {
    match kind {
        EntryKind::Tree => EntryMode::Tree,
        EntryKind::Blob => EntryMode::Blob,
        EntryKind::BlobExecutable => EntryMode::BlobExecutable,
        EntryKind::Link => EntryMode::Link,
        EntryKind::Commit => EntryMode::Submodule,
    }
}

fn corrupt(id: &ObjectId, err: impl std::fmt::Display) -> ObjectStoreError {
    ObjectStoreError::Corrupt {
        id: id.to_string(),
        message: err.to_string(),
    }
}

fn write(object: &dyn WriteTo, what: &'static str) -> OdbResult<Vec<u8>> {
    let mut out = Vec::with_capacity(usize::try_from(object.size()).unwrap_or_default());
    object
        .write_to(&mut out)
        .map_err(|e| ObjectStoreError::backend(what, e))?;
    Ok(out)
}

/// Entries are sorted into git order, where trees compare with a trailing `/`.
pub(super) fn encode_tree(entries: &[TreeEntry]) -> OdbResult<Vec<u8>> {
    let mut entries: Vec<tree::Entry> = entries
        .iter()
        .map(|entry| tree::Entry {
            mode: to_entry_kind(entry.mode).into(),
            filename: entry.name.clone(),
            oid: entry.id.to_gix(),
        })
        .collect();
    entries.sort();
    write(&gix::objs::Tree { entries }, "encode tree")
}

pub(super) fn decode_tree(id: &ObjectId, data: &[u8]) -> OdbResult<Vec<TreeEntry>> {
    let tree = gix::objs::TreeRef::from_bytes(data).map_err(|e| corrupt(id, e))?;
    tree.entries
        .into_iter()
        .map(|entry| {
            Ok(TreeEntry {
                name: entry.filename.to_owned(),
                mode: from_entry_kind(entry.mode.kind()),
                id: ObjectId::from_gix(entry.oid)?,
            })
        })
        .collect()
}

fn to_gix_signature(sig: &Signature) -> gix::actor::Signature {
    gix::actor::Signature {
        name: sig.name.as_str().into(),
        email: sig.email.as_str().into(),
        time: gix::date::Time::new(sig.time.timestamp(), sig.time.offset().local_minus_utc()),
    }
}

fn from_gix_signature(
    id: &ObjectId,
    sig: gix::actor::SignatureRef<'_>,
) -> OdbResult<Signature> {
    let time = sig.time().map_err(|e| corrupt(id, e))?;
    let zone = FixedOffset::east_opt(time.offset)
        .ok_or_else(|| corrupt(id, format!("invalid timezone offset {}", time.offset)))?;
    let when: DateTime<FixedOffset> = zone
        .timestamp_opt(time.seconds, 0)
        .single()
        .ok_or_else(|| corrupt(id, format!("invalid timestamp {}", time.seconds)))?;
    Ok(Signature {
        name: sig.name.to_string(),
        email: sig.email.to_string(),
        time: when,
    })
}

pub(super) fn encode_commit(commit: &CommitInfo) -> OdbResult<Vec<u8>> {
    let object = gix::objs::Commit {
        tree: commit.tree.to_gix(),
        parents: commit.parents.iter().map(|p| p.to_gix()).collect(),
        author: to_gix_signature(&commit.author),
        committer: to_gix_signature(&commit.committer),
        encoding: None,
        message: commit.message.as_str().into(),
        extra_headers: Vec::new(),
    };
    write(&object, "encode commit")
}

pub(super) fn decode_commit(id: &ObjectId, data: &[u8]) -> OdbResult<CommitInfo> {
    let commit = gix::objs::CommitRef::from_bytes(data).map_err(|e| corrupt(id, e))?;
    let author = commit.author().map_err(|e| corrupt(id, e))?;
    let committer = commit.committer().map_err(|e| corrupt(id, e))?;
    Ok(CommitInfo {
        tree: ObjectId::from_gix(&commit.tree())?,
        parents: commit
            .parents()
            .map(|p| ObjectId::from_gix(&p))
            .collect::<OdbResult<_>>()?,
        author: from_gix_signature(id, author)?,
        committer: from_gix_signature(id, committer)?,
        message: commit.message.to_string(),
    })
}
