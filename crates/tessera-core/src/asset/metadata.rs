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

use super::uuid::AssetUUID;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the bytes of an asset physically live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetSource {
    /// A loose file, relative to the store root.
    Path(PathBuf),
    /// A byte range inside the store's `data.pack` file.
    Packed {
        /// Offset of the first byte in the pack file.
        offset: u64,
        /// Length of the asset in bytes.
        size: u64,
    },
}

/// How a large sequential asset is split into chunks ("spots").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkLayout {
    /// Uncompressed interleaved samples. The chunk stride is derived from the
    /// sample format and the stream cache's configured chunk duration.
    Pcm {
        /// Frames per second.
        sample_rate: u32,
        /// Interleaved channel count.
        channels: u16,
        /// Bytes per sample of one channel.
        sample_width: u16,
        /// Offset of the first sample byte inside the asset.
        data_offset: u64,
        /// Number of sample bytes.
        data_len: u64,
    },
    /// Variable-size compressed chunks, given as ordered start offsets.
    /// The last chunk extends to the end of the stream.
    OffsetTable {
        /// Start offset of every chunk, ascending.
        offsets: Vec<u64>,
    },
}

/// Serializable metadata that locates an asset in the backing store.
///
/// This is the "locator" both server-side caches need: it tells them where to
/// read from, what the asset declares itself to be, and how to chunk it when
/// it is streamed. It is also the unit persisted in `index.bin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// The unique, stable identifier for this asset.
    pub uuid: AssetUUID,

    /// Logical, forward-slash path of the asset (e.g. `audio/theme.wav`).
    /// Drives the navigable hierarchy of the index.
    pub source_path: PathBuf,

    /// Physical location of the bytes.
    pub source: AssetSource,

    /// A string identifier for the asset's type (e.g. "texture", "wav").
    pub asset_type_name: String,

    /// Chunking rule for streamed assets. `None` for whole-file assets.
    pub chunk_layout: Option<ChunkLayout>,

    /// Other assets this one depends on.
    pub dependencies: Vec<AssetUUID>,

    /// Free-form tags.
    pub tags: Vec<String>,
}

impl AssetMetadata {
    /// Creates metadata for a loose file with no dependencies or tags.
    pub fn loose(uuid: AssetUUID, path: impl Into<PathBuf>, asset_type_name: &str) -> Self {
        let path = path.into();
        Self {
            uuid,
            source: AssetSource::Path(path.clone()),
            source_path: path,
            asset_type_name: asset_type_name.to_string(),
            chunk_layout: None,
            dependencies: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Attaches a chunk layout, making the asset streamable.
    pub fn with_chunk_layout(mut self, layout: ChunkLayout) -> Self {
        self.chunk_layout = Some(layout);
        self
    }
}
