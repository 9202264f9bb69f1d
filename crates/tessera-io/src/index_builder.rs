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

//! Builds the asset index by scanning a directory tree.
//!
//! Top-level entries of the root are scanned in parallel; each subtree is
//! walked recursively. Every file becomes one [`AssetMetadata`] keyed by the
//! v5 UUID of its forward-slash path relative to the root.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};
use tessera_core::asset::{AssetMetadata, AssetUUID, ChunkLayout};
use tessera_core::vfs::VirtualFileSystem;
use walkdir::WalkDir;

/// Scans a root directory into index entries.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    root: PathBuf,
}

impl IndexBuilder {
    /// Creates a builder for the tree under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Walks the tree and returns one entry per file, sorted by path.
    pub fn scan(&self) -> Result<Vec<AssetMetadata>> {
        let top_level: Vec<PathBuf> = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read asset root '{}'", self.root.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();

        let mut entries: Vec<AssetMetadata> = top_level
            .par_iter()
            .flat_map_iter(|path| {
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .filter_map(|e| self.describe(e.path()))
                    .collect::<Vec<_>>()
            })
            .collect();

        entries.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        log::info!(
            "IndexBuilder: indexed {} assets under '{}'",
            entries.len(),
            self.root.display()
        );
        Ok(entries)
    }

    /// Scans the tree straight into a [`VirtualFileSystem`].
    pub fn build_vfs(&self) -> Result<VirtualFileSystem> {
        Ok(VirtualFileSystem::from_metadata(self.scan()?))
    }

    fn describe(&self, path: &Path) -> Option<AssetMetadata> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let Some(logical) = forward_slash(relative) else {
            log::warn!("IndexBuilder: skipping non UTF-8 path '{}'", path.display());
            return None;
        };

        let asset_type_name = relative
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let mut meta = AssetMetadata::loose(
            AssetUUID::new_v5(&logical),
            PathBuf::from(&logical),
            &asset_type_name,
        );
        if asset_type_name == "wav" {
            match probe_wav(path) {
                Ok(layout) => meta.chunk_layout = Some(layout),
                Err(e) => log::warn!("IndexBuilder: could not probe '{}': {:#}", logical, e),
            }
        }
        Some(meta)
    }
}

fn forward_slash(relative: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

/// Reads a WAV header and returns the PCM layout of its sample data.
pub fn probe_wav(path: &Path) -> Result<ChunkLayout> {
    let file = File::open(path).with_context(|| format!("Failed to open '{}'", path.display()))?;
    let reader = hound::WavReader::new(BufReader::new(file)).context("Invalid WAV header")?;
    let spec = reader.spec();
    let sample_width = spec.bits_per_sample.div_ceil(8);
    let data_len = u64::from(reader.len()) * u64::from(sample_width);

    // The header parser leaves the reader positioned on the first sample.
    let mut inner = reader.into_inner();
    let data_offset = inner.stream_position()?;

    Ok(ChunkLayout::Pcm {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        sample_width,
        data_offset,
        data_len,
    })
}

/// Writes entries as a bincode `index.bin`.
pub fn write_index(entries: &[AssetMetadata], path: &Path) -> Result<()> {
    let config = bincode::config::standard();
    let encoded =
        bincode::serde::encode_to_vec(entries, config).context("Failed to serialize index")?;
    fs::write(path, &encoded)
        .with_context(|| format!("Failed to write index file to '{}'", path.display()))?;
    log::info!(
        "IndexBuilder: wrote {} entries to '{}' ({:.2} KB)",
        entries.len(),
        path.display(),
        encoded.len() as f64 / 1024.0
    );
    Ok(())
}
