// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Virtual File System (VFS) module for fast, in-memory asset locator access.
//!
//! This module provides the [`AssetIndex`] contract the caches depend on and the
//! [`VirtualFileSystem`], its in-memory implementation. The VFS offers O(1)
//! lookups by [`AssetUUID`] and a navigable directory hierarchy over the
//! logical asset paths, kept current as entries are inserted, moved or removed.

use crate::asset::{AssetMetadata, AssetSource, AssetUUID};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Maps an asset key to the locator needed to read it.
pub trait AssetIndex: Send + Sync {
    /// Returns the locator for `key`, or `None` when the key is not indexed.
    fn resolve(&self, key: &AssetUUID) -> Option<AssetMetadata>;
}

#[derive(Debug, Default)]
struct DirNode {
    assets: BTreeSet<AssetUUID>,
    subdirs: BTreeSet<PathBuf>,
}

#[derive(Debug, Default)]
struct VfsState {
    index: HashMap<AssetUUID, AssetMetadata>,
    dirs: BTreeMap<PathBuf, DirNode>,
}

impl VfsState {
    fn link(&mut self, meta: &AssetMetadata) {
        let parent = parent_dir(&meta.source_path);
        self.dirs.entry(parent.clone()).or_default().assets.insert(meta.uuid);

        // Register every ancestor so the hierarchy is navigable from the root.
        let mut child = parent;
        while child != Path::new("") {
            let up = parent_dir(&child);
            let inserted = self.dirs.entry(up.clone()).or_default().subdirs.insert(child);
            if !inserted {
                break;
            }
            child = up;
        }
    }

    fn unlink(&mut self, meta: &AssetMetadata) {
        let mut dir = parent_dir(&meta.source_path);
        if let Some(node) = self.dirs.get_mut(&dir) {
            node.assets.remove(&meta.uuid);
        }

        // Prune directories left empty, walking towards the root.
        while dir != Path::new("") {
            let empty = self
                .dirs
                .get(&dir)
                .is_some_and(|node| node.assets.is_empty() && node.subdirs.is_empty());
            if !empty {
                break;
            }
            self.dirs.remove(&dir);
            let up = parent_dir(&dir);
            if let Some(node) = self.dirs.get_mut(&up) {
                node.subdirs.remove(&dir);
            }
            dir = up;
        }
    }
}

/// Swaps the `old` tail of `file` for `new`, keeping whatever root precedes it.
fn rebase(file: &Path, old: &Path, new: &Path) -> PathBuf {
    if file.ends_with(old) {
        if let Some(root) = file.ancestors().nth(old.components().count()) {
            return root.join(new);
        }
    }
    new.to_path_buf()
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// The runtime representation of the asset index (`index.bin`).
///
/// The Virtual File System is the primary source of truth for the caches when
/// they need to turn a key into a readable location. All methods take `&self`;
/// the index is guarded by a `RwLock` so lookups from many cache threads can
/// proceed in parallel while moves are applied.
#[derive(Debug, Default)]
pub struct VirtualFileSystem {
    state: RwLock<VfsState>,
}

impl VirtualFileSystem {
    /// Creates a `VirtualFileSystem` by decoding an `index.bin` produced by
    /// [`VirtualFileSystem::to_index_bytes`] or the index builder.
    ///
    /// # Errors
    /// Returns a `DecodeError` if the byte slice is not a valid, bincode-encoded
    /// list of `AssetMetadata`.
    pub fn new(index_bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let config = bincode::config::standard();
        let (metadata_vec, _): (Vec<AssetMetadata>, _) =
            bincode::serde::decode_from_slice(index_bytes, config)?;
        Ok(Self::from_metadata(metadata_vec))
    }

    /// Builds the index from an in-memory list of locators.
    pub fn from_metadata(metadata: impl IntoIterator<Item = AssetMetadata>) -> Self {
        let vfs = Self::default();
        for meta in metadata {
            vfs.insert(meta);
        }
        vfs
    }

    /// Encodes every entry as an `index.bin` payload.
    pub fn to_index_bytes(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        let mut entries: Vec<AssetMetadata> = self.read().index.values().cloned().collect();
        entries.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        bincode::serde::encode_to_vec(&entries, bincode::config::standard())
    }

    /// Adds or replaces an entry. Returns the previous locator for the key.
    pub fn insert(&self, meta: AssetMetadata) -> Option<AssetMetadata> {
        let mut state = self.write();
        let previous = state.index.remove(&meta.uuid);
        if let Some(old) = &previous {
            state.unlink(old);
        }
        state.link(&meta);
        state.index.insert(meta.uuid, meta);
        previous
    }

    /// Removes an entry.
    pub fn remove(&self, uuid: &AssetUUID) -> Option<AssetMetadata> {
        let mut state = self.write();
        let removed = state.index.remove(uuid)?;
        state.unlink(&removed);
        Some(removed)
    }

    /// Moves an entry to a new logical path, keeping the hierarchy current.
    /// A loose source file follows the move under the same root; packed
    /// sources are untouched. Returns `false` when the key is not indexed.
    pub fn relocate(&self, uuid: &AssetUUID, new_path: impl Into<PathBuf>) -> bool {
        let mut state = self.write();
        let Some(mut meta) = state.index.remove(uuid) else {
            return false;
        };
        state.unlink(&meta);
        let new_path = new_path.into();
        if let AssetSource::Path(file) = &meta.source {
            meta.source = AssetSource::Path(rebase(file, &meta.source_path, &new_path));
        }
        meta.source_path = new_path;
        log::debug!(
            "VirtualFileSystem: relocated {} to '{}'",
            uuid,
            meta.source_path.display()
        );
        state.link(&meta);
        state.index.insert(*uuid, meta);
        true
    }

    /// Retrieves a copy of the locator for a given asset UUID.
    pub fn get_metadata(&self, uuid: &AssetUUID) -> Option<AssetMetadata> {
        self.read().index.get(uuid).cloned()
    }

    /// Assets directly inside `dir`, ordered by UUID.
    pub fn children(&self, dir: &Path) -> Vec<AssetMetadata> {
        let state = self.read();
        state
            .dirs
            .get(dir)
            .map(|node| {
                node.assets
                    .iter()
                    .filter_map(|uuid| state.index.get(uuid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Directories directly inside `dir`.
    pub fn subdirectories(&self, dir: &Path) -> Vec<PathBuf> {
        self.read()
            .dirs
            .get(dir)
            .map(|node| node.subdirs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of indexed assets.
    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every indexed key.
    pub fn keys(&self) -> Vec<AssetUUID> {
        self.read().index.keys().copied().collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VfsState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VfsState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl AssetIndex for VirtualFileSystem {
    fn resolve(&self, key: &AssetUUID) -> Option<AssetMetadata> {
        self.get_metadata(key)
    }
}
