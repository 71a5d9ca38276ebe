// manifest-store: Git-backed transactional store for GitOps deployment state
//
// SPDX-FileCopyrightText: 2026 Romeo Ahmed
// SPDX-License-Identifier: GPL-3.0-or-later

//! Virtual filesystem over a git tree.
//!
//! ```text
//!   TreeFs::from_tree(store, tree_id)
//!             |
//!   root Dir { id: Some(tree), children: None }    (lazy)
//!             |
//!   read_*  --> walk loaded nodes, fall back to stored trees (no caching)
//!   write_* --> load path, mark every dir on it dirty (id = None)
//!             |
//!          flush()
//!             |
//!   dirty dirs re-encoded bottom-up, clean subtrees keep their id
//! ```
//!
//! Paths are forward-slash separated and relative to the tree root.
//! `.`/`..` and symlinks stored in the tree are resolved. Entries whose
//! names are not UTF-8 are not addressable but survive rewrites.

use std::collections::BTreeMap;
use std::sync::Arc;

use gix::bstr::ByteSlice;

use crate::error::FsError;
use crate::odb::{EntryMode, ObjectId, ObjectKind, ObjectStore, TreeEntry};

/// Result type for virtual filesystem operations.
pub type FsResult<T> = std::result::Result<T, crate::error::StoreError>;

const MAX_SYMLINK_HOPS: usize = 40;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Dir,
    File,
    Symlink,
}

/// One entry returned by [`TreeFs::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

#[derive(Debug, Clone)]
enum Node {
    Dir(Dir),
    File {
        id: Option<ObjectId>,
        data: Option<Vec<u8>>,
        mode: EntryMode,
    },
    Link(String),
    /// Entries this filesystem does not interpret, such as submodules.
    Opaque { mode: EntryMode, id: ObjectId },
}

#[derive(Debug, Clone, Default)]
struct Dir {
    /// `None` once the directory was modified.
    id: Option<ObjectId>,
    /// `None` until loaded from the store.
    children: Option<BTreeMap<String, Node>>,
    /// Stored entries whose names are not UTF-8; carried through unchanged.
    foreign: Vec<TreeEntry>,
}

impl Dir {
    const fn stored(id: ObjectId) -> Self {
        Self {
            id: Some(id),
            children: None,
            foreign: Vec::new(),
        }
    }

    fn new_empty() -> Self {
        Self {
            id: None,
            children: Some(BTreeMap::new()),
            foreign: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum DirRef<'a> {
    Mem(&'a Dir),
    Stored(ObjectId),
}

enum Handle<'a> {
    Dir(DirRef<'a>),
    File(FileRef<'a>),
    Link(String),
    Opaque,
}

enum FileRef<'a> {
    Mem(&'a [u8]),
    Stored(ObjectId),
}

/// Mutable, lazily loaded view of one git tree.
#[derive(Clone)]
pub struct TreeFs {
    store: Arc<dyn ObjectStore>,
    root: Dir,
}

impl std::fmt::Debug for TreeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFs")
            .field("root", &self.root.id)
            .finish_non_exhaustive()
    }
}

fn split(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .map(str::to_string)
        .collect()
}

fn display(parts: &[String]) -> String {
    parts.join("/")
}

fn node_from_entry(store: &dyn ObjectStore, entry: TreeEntry) -> FsResult<Node> {
    Ok(match entry.mode {
        EntryMode::Tree => Node::Dir(Dir::stored(entry.id)),
        EntryMode::Blob | EntryMode::BlobExecutable => Node::File {
            id: Some(entry.id),
            data: None,
            mode: entry.mode,
        },
        EntryMode::Link => Node::Link(link_target(store, &entry.id)?),
        EntryMode::Submodule => Node::Opaque {
            mode: entry.mode,
            id: entry.id,
        },
    })
}

fn link_target(store: &dyn ObjectStore, id: &ObjectId) -> FsResult<String> {
    let data = store.read_blob(id)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

impl<'a> DirRef<'a> {
    fn child(self, store: &dyn ObjectStore, name: &str) -> FsResult<Option<Handle<'a>>> {
        match self {
            DirRef::Mem(dir) => match (&dir.children, dir.id) {
                (Some(children), _) => Ok(children.get(name).map(|node| match node {
                    Node::Dir(d) => Handle::Dir(DirRef::Mem(d)),
                    Node::File { id, data, .. } => match (data, id) {
                        (Some(data), _) => Handle::File(FileRef::Mem(data)),
                        (None, Some(id)) => Handle::File(FileRef::Stored(*id)),
                        (None, None) => Handle::File(FileRef::Mem(&[])),
                    },
                    Node::Link(target) => Handle::Link(target.clone()),
                    Node::Opaque { .. } => Handle::Opaque,
                })),
                (None, Some(id)) => DirRef::Stored(id).child(store, name),
                (None, None) => Ok(None),
            },
            DirRef::Stored(id) => {
                let Some(entry) = store.read_tree(&id)?.into_iter().find(|e| e.name == name)
                else {
                    return Ok(None);
                };
                Ok(Some(match entry.mode {
                    EntryMode::Tree => Handle::Dir(DirRef::Stored(entry.id)),
                    EntryMode::Blob | EntryMode::BlobExecutable => {
                        Handle::File(FileRef::Stored(entry.id))
                    }
                    EntryMode::Link => Handle::Link(link_target(store, &entry.id)?),
                    EntryMode::Submodule => Handle::Opaque,
                }))
            }
        }
    }

    fn list(self, store: &dyn ObjectStore) -> FsResult<Vec<DirEntry>> {
        let kind_of_mode = |mode: EntryMode| match mode {
            EntryMode::Tree => FileKind::Dir,
            EntryMode::Link => FileKind::Symlink,
            _ => FileKind::File,
        };
        match self {
            DirRef::Mem(dir) => match (&dir.children, dir.id) {
                (Some(children), _) => Ok(children
                    .iter()
                    .map(|(name, node)| DirEntry {
                        name: name.clone(),
                        kind: match node {
                            Node::Dir(_) => FileKind::Dir,
                            Node::Link(_) => FileKind::Symlink,
                            Node::File { .. } | Node::Opaque { .. } => FileKind::File,
                        },
                    })
                    .collect()),
                (None, Some(id)) => DirRef::Stored(id).list(store),
                (None, None) => Ok(Vec::new()),
            },
            DirRef::Stored(id) => {
                let mut entries: Vec<DirEntry> = store
                    .read_tree(&id)?
                    .into_iter()
                    .filter_map(|e| {
                        let name = e.name.to_str().ok()?.to_string();
                        Some(DirEntry {
                            name,
                            kind: kind_of_mode(e.mode),
                        })
                    })
                    .collect();
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(entries)
            }
        }
    }
}

impl TreeFs {
    /// An empty filesystem.
    #[must_use]
    pub fn empty(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            root: Dir::new_empty(),
        }
    }

    /// A filesystem rooted at a stored tree. Nothing is read until needed.
    #[must_use]
    pub fn from_tree(store: Arc<dyn ObjectStore>, tree: ObjectId) -> Self {
        Self {
            store,
            root: Dir::stored(tree),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    // --- Resolution ---

    /// Resolve `path` to its canonical components and handle.
    ///
    /// Symlinks in intermediate components are always followed; the final
    /// component is followed only when `follow_last` is set. `Ok(None)` means
    /// some component does not exist.
    fn resolve(
        &self,
        path: &str,
        follow_last: bool,
    ) -> FsResult<Option<(Vec<String>, Handle<'_>)>> {
        let store = self.store.as_ref();
        let mut names: Vec<String> = Vec::new();
        let mut dirs: Vec<DirRef<'_>> = vec![DirRef::Mem(&self.root)];
        let mut pending: Vec<String> = split(path);
        pending.reverse();
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            if component == ".." {
                if names.pop().is_some() {
                    dirs.pop();
                }
                continue;
            }
            let Some(&current) = dirs.last() else {
                return Err(FsError::InvalidPath(path.to_string()).into());
            };
            let Some(handle) = current.child(store, &component)? else {
                return Ok(None);
            };
            let is_last = pending.is_empty();
            match handle {
                Handle::Link(target) if !is_last || follow_last => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(FsError::SymlinkLoop(path.to_string()).into());
                    }
                    if target.starts_with('/') {
                        names.clear();
                        dirs.truncate(1);
                    }
                    let mut expanded = split(&target);
                    expanded.reverse();
                    pending.extend(expanded);
                }
                Handle::Dir(dir) => {
                    names.push(component);
                    dirs.push(dir);
                }
                other if is_last => {
                    names.push(component);
                    return Ok(Some((names, other)));
                }
                _ => {
                    names.push(component);
                    return Err(FsError::NotADirectory(display(&names)).into());
                }
            }
        }

        let Some(&dir) = dirs.last() else {
            return Err(FsError::InvalidPath(path.to_string()).into());
        };
        Ok(Some((names, Handle::Dir(dir))))
    }

    /// Canonical parent directory and final name of `path`.
    ///
    /// The parent must exist and be a directory.
    fn resolve_parent(&self, path: &str) -> FsResult<(Vec<String>, String)> {
        let mut parts = split(path);
        let name = match parts.pop() {
            Some(name) if name != ".." => name,
            _ => return Err(FsError::InvalidPath(path.to_string()).into()),
        };
        match self.resolve(&display(&parts), true)? {
            Some((canonical, Handle::Dir(_))) => Ok((canonical, name)),
            Some((canonical, _)) => Err(FsError::NotADirectory(display(&canonical)).into()),
            None => Err(FsError::NotFound(display(&parts)).into()),
        }
    }

    // --- Reads ---

    /// Read a file, following symlinks.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if the file is missing and
    /// `FsError::IsDirectory` for directories.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        match self.resolve(path, true)? {
            Some((_, Handle::File(FileRef::Mem(data)))) => Ok(data.to_vec()),
            Some((_, Handle::File(FileRef::Stored(id)))) => Ok(self.store.read_blob(&id)?),
            Some((_, Handle::Dir(_))) => Err(FsError::IsDirectory(path.to_string()).into()),
            Some(_) | None => Err(FsError::NotFound(path.to_string()).into()),
        }
    }

    /// Read a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`TreeFs::read_file`].
    pub fn read_to_string(&self, path: &str) -> FsResult<String> {
        let data = self.read_file(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// List a directory sorted by name. `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotADirectory` if the path is a file.
    pub fn read_dir(&self, path: &str) -> FsResult<Option<Vec<DirEntry>>> {
        match self.resolve(path, true)? {
            Some((_, Handle::Dir(dir))) => Ok(Some(dir.list(self.store.as_ref())?)),
            Some(_) => Err(FsError::NotADirectory(path.to_string()).into()),
            None => Ok(None),
        }
    }

    /// Kind of the entry at `path` after following symlinks.
    ///
    /// Dangling symlinks report `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or resolution loops.
    pub fn stat(&self, path: &str) -> FsResult<Option<FileKind>> {
        Ok(self.resolve(path, true)?.map(|(_, handle)| kind_of(&handle)))
    }

    /// Kind of the entry at `path` without following a final symlink.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or resolution loops.
    pub fn lstat(&self, path: &str) -> FsResult<Option<FileKind>> {
        Ok(self.resolve(path, false)?.map(|(_, handle)| kind_of(&handle)))
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn exists(&self, path: &str) -> FsResult<bool> {
        Ok(self.lstat(path)?.is_some())
    }

    /// Target of the symlink at `path`.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if missing and `FsError::NotASymlink`
    /// if the entry is not a symlink.
    pub fn read_link(&self, path: &str) -> FsResult<String> {
        match self.resolve(path, false)? {
            Some((_, Handle::Link(target))) => Ok(target),
            Some(_) => Err(FsError::NotASymlink(path.to_string()).into()),
            None => Err(FsError::NotFound(path.to_string()).into()),
        }
    }

    // --- Writes ---

    fn load(store: &dyn ObjectStore, dir: &mut Dir) -> FsResult<()> {
        if dir.children.is_none() {
            let mut children = BTreeMap::new();
            if let Some(id) = dir.id {
                for entry in store.read_tree(&id)? {
                    match entry.name.to_str() {
                        Ok(name) => {
                            let name = name.to_string();
                            children.insert(name, node_from_entry(store, entry)?);
                        }
                        Err(_) => dir.foreign.push(entry),
                    }
                }
            }
            dir.children = Some(children);
        }
        Ok(())
    }

    /// Loaded, dirty directory at a canonical path.
    fn dir_mut(&mut self, canonical: &[String]) -> FsResult<&mut BTreeMap<String, Node>> {
        let store = self.store.as_ref();
        let mut dir = &mut self.root;
        for (depth, name) in canonical.iter().enumerate() {
            Self::load(store, dir)?;
            dir.id = None;
            let children = dir.children.get_or_insert_with(BTreeMap::new);
            match children.get_mut(name) {
                Some(Node::Dir(child)) => dir = child,
                Some(_) => {
                    return Err(FsError::NotADirectory(display(&canonical[..=depth])).into());
                }
                None => return Err(FsError::NotFound(display(&canonical[..=depth])).into()),
            }
        }
        Self::load(store, dir)?;
        dir.id = None;
        Ok(dir.children.get_or_insert_with(BTreeMap::new))
    }

    /// Create a directory and all missing parents.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotADirectory` if a component exists as a file.
    pub fn mkdir_all(&mut self, path: &str) -> FsResult<()> {
        let mut canonical: Vec<String> = Vec::new();
        let mut pending = split(path);
        pending.reverse();
        let mut hops = 0;

        while let Some(component) = pending.pop() {
            if component == ".." {
                canonical.pop();
                continue;
            }
            let candidate = format!("{}/{component}", display(&canonical));
            match self.lstat(&candidate)? {
                Some(FileKind::Dir) => canonical.push(component),
                Some(FileKind::Symlink) => {
                    hops += 1;
                    if hops > MAX_SYMLINK_HOPS {
                        return Err(FsError::SymlinkLoop(path.to_string()).into());
                    }
                    let target = self.read_link(&candidate)?;
                    if target.starts_with('/') {
                        canonical.clear();
                    }
                    let mut expanded = split(&target);
                    expanded.reverse();
                    pending.extend(expanded);
                }
                Some(FileKind::File) => {
                    canonical.push(component);
                    return Err(FsError::NotADirectory(display(&canonical)).into());
                }
                None => {
                    self.dir_mut(&canonical)?
                        .insert(component.clone(), Node::Dir(Dir::new_empty()));
                    canonical.push(component);
                }
            }
        }
        Ok(())
    }

    fn parent_for_write(&mut self, path: &str) -> FsResult<(Vec<String>, String)> {
        let mut parts = split(path);
        parts.pop();
        self.mkdir_all(&display(&parts))?;
        self.resolve_parent(path)
    }

    /// Write a file, creating missing parent directories.
    ///
    /// An existing non-directory entry is replaced. Empty content never
    /// overwrites a non-empty file.
    ///
    /// # Errors
    ///
    /// Returns `FsError::EmptyOverwrite` for empty content over a non-empty
    /// file and `FsError::IsDirectory` if the path is a directory.
    pub fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let (parent, name) = self.parent_for_write(path)?;
        let empty_blob = ObjectId::hash_object(ObjectKind::Blob, b"")?;
        let children = self.dir_mut(&parent)?;
        match children.get(&name) {
            Some(Node::Dir(_)) => return Err(FsError::IsDirectory(path.to_string()).into()),
            Some(Node::File { id, data: current, .. }) if data.is_empty() => {
                let current_empty = match (current, id) {
                    (Some(current), _) => current.is_empty(),
                    (None, Some(id)) => *id == empty_blob,
                    (None, None) => true,
                };
                if !current_empty {
                    return Err(FsError::EmptyOverwrite(path.to_string()).into());
                }
            }
            _ => {}
        }
        children.insert(
            name,
            Node::File {
                id: None,
                data: Some(data.to_vec()),
                mode: EntryMode::Blob,
            },
        );
        Ok(())
    }

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// Missing parents are created; an existing non-directory entry is replaced.
    ///
    /// # Errors
    ///
    /// Returns `FsError::IsDirectory` if `link` is a directory.
    pub fn symlink(&mut self, target: &str, link: &str) -> FsResult<()> {
        let (parent, name) = self.parent_for_write(link)?;
        let children = self.dir_mut(&parent)?;
        if matches!(children.get(&name), Some(Node::Dir(_))) {
            return Err(FsError::IsDirectory(link.to_string()).into());
        }
        children.insert(name, Node::Link(target.to_string()));
        Ok(())
    }

    /// Remove a file, symlink or whole directory.
    ///
    /// # Errors
    ///
    /// Returns `FsError::NotFound` if nothing exists at `path`.
    pub fn remove(&mut self, path: &str) -> FsResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        let children = self.dir_mut(&parent)?;
        if children.remove(&name).is_none() {
            return Err(FsError::NotFound(path.to_string()).into());
        }
        Ok(())
    }

    /// Like [`TreeFs::remove`], but a missing path is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn remove_all(&mut self, path: &str) -> FsResult<()> {
        match self.remove(path) {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    // --- Flush ---

    fn flush_dir(store: &dyn ObjectStore, dir: &mut Dir) -> FsResult<ObjectId> {
        if let Some(id) = dir.id {
            return Ok(id);
        }
        let mut entries = Vec::new();
        if let Some(children) = dir.children.as_mut() {
            for (name, node) in children.iter_mut() {
                let (mode, id) = match node {
                    Node::Dir(child) => (EntryMode::Tree, Self::flush_dir(store, child)?),
                    Node::File { id, data, mode } => {
                        let blob = match (*id, data.as_deref()) {
                            (Some(existing), _) => existing,
                            (None, Some(bytes)) => store.write_blob(bytes)?,
                            (None, None) => store.write_blob(b"")?,
                        };
                        *id = Some(blob);
                        (*mode, blob)
                    }
                    Node::Link(target) => (EntryMode::Link, store.write_blob(target.as_bytes())?),
                    Node::Opaque { mode, id } => (*mode, *id),
                };
                entries.push(TreeEntry::new(name.clone(), mode, id));
            }
        }
        entries.extend(dir.foreign.iter().cloned());
        let id = store.write_tree(&entries)?;
        dir.id = Some(id);
        Ok(id)
    }

    /// Write every modified directory and return the root tree id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot persist an object.
    pub fn flush(&mut self) -> FsResult<ObjectId> {
        let store = Arc::clone(&self.store);
        Self::flush_dir(store.as_ref(), &mut self.root)
    }
}

const fn kind_of(handle: &Handle<'_>) -> FileKind {
    match handle {
        Handle::Dir(_) => FileKind::Dir,
        Handle::Link(_) => FileKind::Symlink,
        Handle::File(_) | Handle::Opaque => FileKind::File,
    }
}

/// Join path components with `/`.
#[must_use]
pub fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}
