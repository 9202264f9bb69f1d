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

//! Builds the asset index and backing store from the `[index]` settings.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tessera_core::asset::{AssetMetadata, AssetSource};
use tessera_core::config::IndexConfig;
use tessera_core::vfs::VirtualFileSystem;
use tessera_io::{FsBlobStore, IndexBuilder};

/// The index and store every cache in the process shares.
pub struct AssetLibrary {
    pub index: Arc<VirtualFileSystem>,
    pub store: Arc<FsBlobStore>,
}

impl AssetLibrary {
    /// Loads `index_file` when configured and present, otherwise scans every root.
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let index = match &config.index_file {
            Some(path) if path.exists() => {
                let bytes = fs::read(path)
                    .with_context(|| format!("Failed to read index '{}'", path.display()))?;
                let vfs = VirtualFileSystem::new(&bytes)
                    .with_context(|| format!("Failed to decode index '{}'", path.display()))?;
                log::info!("AssetLibrary: loaded {} entries from '{}'", vfs.len(), path.display());
                vfs
            }
            _ => VirtualFileSystem::from_metadata(scan_roots(&config.roots)?),
        };

        // Loose paths are rooted per entry, so the store itself has no root.
        let mut store = FsBlobStore::new(PathBuf::new());
        if let Some(pack) = &config.pack_file {
            if pack.exists() {
                store = store.with_pack_file(pack);
            } else {
                log::warn!("AssetLibrary: pack file '{}' not found", pack.display());
            }
        }

        Ok(Self {
            index: Arc::new(index),
            store: Arc::new(store),
        })
    }

    /// Every indexed entry.
    pub fn entries(&self) -> Vec<AssetMetadata> {
        self.index
            .keys()
            .iter()
            .filter_map(|key| self.index.get_metadata(key))
            .collect()
    }
}

/// Scans each root and points loose sources at the root they came from.
/// Keys stay derived from the root-relative path; a later root wins on clashes.
fn scan_roots(roots: &[PathBuf]) -> Result<Vec<AssetMetadata>> {
    let mut entries = Vec::new();
    for root in roots {
        if !root.is_dir() {
            log::warn!("AssetLibrary: skipping missing root '{}'", root.display());
            continue;
        }
        for mut meta in IndexBuilder::new(root).scan()? {
            if let AssetSource::Path(relative) = &meta.source {
                meta.source = AssetSource::Path(root.join(relative));
            }
            entries.push(meta);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tessera_core::asset::AssetUUID;
    use tessera_io::BlobStore;

    #[test]
    fn scans_several_roots_into_one_index() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(first.path().join("a.txt"), b"from first").unwrap();
        fs::create_dir_all(second.path().join("sub")).unwrap();
        fs::write(second.path().join("sub/b.txt"), b"from second").unwrap();

        let library = AssetLibrary::open(&IndexConfig {
            roots: vec![
                first.path().to_path_buf(),
                second.path().to_path_buf(),
                first.path().join("missing"),
            ],
            pack_file: None,
            index_file: None,
        })
        .unwrap();

        assert_eq!(library.index.len(), 2);
        let meta = library
            .index
            .get_metadata(&AssetUUID::new_v5("sub/b.txt"))
            .unwrap();
        assert_eq!(library.store.read_all(&meta).unwrap(), b"from second");
    }

    #[test]
    fn prefers_a_prebuilt_index() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index.bin");
        let entries = vec![AssetMetadata::loose(
            AssetUUID::new_v5("only.bin"),
            "only.bin",
            "bin",
        )];
        tessera_io::write_index(&entries, &index_path).unwrap();

        let library = AssetLibrary::open(&IndexConfig {
            roots: vec![dir.path().join("never-scanned")],
            pack_file: None,
            index_file: Some(index_path),
        })
        .unwrap();

        assert_eq!(library.entries().len(), 1);
    }
}
