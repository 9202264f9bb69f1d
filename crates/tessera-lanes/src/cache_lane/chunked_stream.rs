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

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tessera_core::asset::{AssetMetadata, AssetUUID, ChunkLayout};
use tessera_core::config::StreamCacheConfig;
use tessera_core::vfs::AssetIndex;
use tessera_core::Clock;
use tessera_io::{AssetStream, BlobStore};
use thiserror::Error;

/// Hard errors of [`ChunkedStreamCache::get`]. I/O failures are not among
/// them: those are logged and reported as `Ok(None)`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The index has no locator for the key.
    #[error("asset {0} is not indexed")]
    NotIndexed(AssetUUID),
    /// The locator carries no chunk layout.
    #[error("asset {0} has no chunk layout")]
    NotStreamable(AssetUUID),
    /// The chunk layout cannot be used.
    #[error("asset {key} has an invalid chunk layout: {reason}")]
    InvalidLayout {
        /// The offending key.
        key: AssetUUID,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The requested chunk does not exist.
    #[error("chunk {index} of asset {key} is out of range (asset has {count} chunks)")]
    ChunkOutOfRange {
        /// The key.
        key: AssetUUID,
        /// The requested index.
        index: usize,
        /// Number of chunks in the asset.
        count: usize,
    },
}

/// Where one chunk lives inside the asset stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Offset of the first byte.
    pub start: u64,
    /// Length in bytes; `None` reads to the end of the stream.
    pub len: Option<u64>,
}

/// A [`ChunkLayout`] resolved against a chunk duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Equal-size chunks; the last one may be shorter.
    Stride {
        /// Offset of the first sample byte.
        data_offset: u64,
        /// Number of sample bytes.
        data_len: u64,
        /// Bytes per chunk, a whole number of frames.
        stride: u64,
    },
    /// Explicit chunk start offsets.
    Table {
        /// Ascending start offsets.
        offsets: Vec<u64>,
    },
}

impl ChunkPlan {
    /// Resolves a layout. PCM strides cover `chunk_duration` of playback,
    /// rounded down to whole frames and never shorter than one frame.
    pub fn from_layout(layout: &ChunkLayout, chunk_duration: Duration) -> Result<Self, &'static str> {
        match layout {
            ChunkLayout::Pcm {
                sample_rate,
                channels,
                sample_width,
                data_offset,
                data_len,
            } => {
                let frame = u64::from(*channels) * u64::from(*sample_width);
                if frame == 0 || *sample_rate == 0 {
                    return Err("PCM layout with an empty frame");
                }
                let per_second = u64::from(*sample_rate) * frame;
                let raw = (per_second as u128 * chunk_duration.as_millis() / 1000) as u64;
                let stride = (raw / frame).max(1) * frame;
                Ok(ChunkPlan::Stride {
                    data_offset: *data_offset,
                    data_len: *data_len,
                    stride,
                })
            }
            ChunkLayout::OffsetTable { offsets } => {
                if offsets.windows(2).any(|w| w[0] >= w[1]) {
                    return Err("offset table is not strictly ascending");
                }
                Ok(ChunkPlan::Table {
                    offsets: offsets.clone(),
                })
            }
        }
    }

    /// Number of chunks.
    pub fn chunk_count(&self) -> usize {
        match self {
            ChunkPlan::Stride {
                data_len, stride, ..
            } => data_len.div_ceil(*stride) as usize,
            ChunkPlan::Table { offsets } => offsets.len(),
        }
    }

    /// Location of chunk `index`, which must be below [`Self::chunk_count`].
    pub fn span(&self, index: usize) -> ChunkSpan {
        match self {
            ChunkPlan::Stride {
                data_offset,
                data_len,
                stride,
            } => {
                let rel = index as u64 * stride;
                ChunkSpan {
                    start: data_offset + rel,
                    len: Some((*stride).min(data_len - rel)),
                }
            }
            ChunkPlan::Table { offsets } => ChunkSpan {
                start: offsets[index],
                len: offsets.get(index + 1).map(|next| next - offsets[index]),
            },
        }
    }
}

/// Result of one expiration sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Spots dropped for being idle beyond the TTL.
    pub spots_dropped: usize,
    /// Stream handles closed because no spot stayed live.
    pub handles_closed: usize,
}

#[derive(Debug)]
struct Spot {
    bytes: Arc<[u8]>,
    last_access: Instant,
}

struct AccessorState {
    /// Refreshed from the index whenever the stream is (re)opened.
    locator: AssetMetadata,
    stream: Option<Box<dyn AssetStream>>,
    spots: Vec<Option<Spot>>,
}

/// Per-asset state: the lazily opened stream and one slot per chunk.
struct Accessor {
    key: AssetUUID,
    plan: ChunkPlan,
    state: Mutex<AccessorState>,
}

impl Accessor {
    fn lock(&self) -> MutexGuard<'_, AccessorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Streams large sequential assets chunk by chunk, keeping one open handle per
/// hot asset.
///
/// Handles are opened on first use and closed by [`ChunkedStreamCache::sweep`]
/// once every chunk of the asset has expired, so the number of open files
/// tracks the set of currently played assets.
pub struct ChunkedStreamCache {
    index: Arc<dyn AssetIndex>,
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: StreamCacheConfig,
    accessors: Mutex<HashMap<AssetUUID, Arc<Accessor>>>,
}

impl ChunkedStreamCache {
    /// Creates an empty cache.
    pub fn new(
        index: Arc<dyn AssetIndex>,
        store: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: StreamCacheConfig,
    ) -> Self {
        Self {
            index,
            store,
            clock,
            config,
            accessors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns chunk `index` of asset `key`.
    ///
    /// `Ok(None)` means the chunk could not be read this time; the failure has
    /// been logged and the next call retries with a fresh handle.
    pub fn get(&self, key: &AssetUUID, index: usize) -> Result<Option<Arc<[u8]>>, StreamError> {
        let accessor = self.accessor(key)?;
        let count = accessor.plan.chunk_count();
        if index >= count {
            return Err(StreamError::ChunkOutOfRange {
                key: *key,
                index,
                count,
            });
        }

        let now = self.clock.now();
        let mut state = accessor.lock();

        if let Some(spot) = state.spots[index].as_mut() {
            spot.last_access = now;
            return Ok(Some(spot.bytes.clone()));
        }

        if state.stream.as_mut().is_some_and(|s| !is_readable(s.as_mut())) {
            log::debug!("ChunkedStreamCache: reopening broken handle of {}", key);
            state.stream = None;
        }
        if state.stream.is_none() {
            // The entry may have moved since the handle was last open.
            if let Some(current) = self.index.resolve(key) {
                state.locator = current;
            }
            match self.store.open_stream(&state.locator) {
                Ok(stream) => state.stream = Some(stream),
                Err(e) => {
                    log::warn!(
                        "ChunkedStreamCache: failed to open '{}': {}",
                        state.locator.source_path.display(),
                        e
                    );
                    return Ok(None);
                }
            }
        }

        let span = accessor.plan.span(index);
        let read = match state.stream.as_mut() {
            Some(stream) => read_span(stream.as_mut(), span),
            None => return Ok(None),
        };
        match read {
            Ok(bytes) => {
                let bytes: Arc<[u8]> = Arc::from(bytes);
                state.spots[index] = Some(Spot {
                    bytes: bytes.clone(),
                    last_access: now,
                });
                Ok(Some(bytes))
            }
            Err(e) => {
                log::warn!(
                    "ChunkedStreamCache: failed to read chunk {} of '{}': {}",
                    index,
                    state.locator.source_path.display(),
                    e
                );
                state.stream = None;
                Ok(None)
            }
        }
    }

    /// Number of chunks of `key`, creating its accessor if needed.
    pub fn chunk_count(&self, key: &AssetUUID) -> Result<usize, StreamError> {
        Ok(self.accessor(key)?.plan.chunk_count())
    }

    /// Drops spots idle beyond the TTL and closes handles with no live spot.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let ttl = self.config.spot_ttl();
        let accessors: Vec<Arc<Accessor>> = self.lock().values().cloned().collect();

        let mut report = SweepReport::default();
        for accessor in accessors {
            let mut state = accessor.lock();
            for slot in state.spots.iter_mut() {
                let expired = slot
                    .as_ref()
                    .is_some_and(|spot| now.saturating_duration_since(spot.last_access) > ttl);
                if expired {
                    *slot = None;
                    report.spots_dropped += 1;
                }
            }
            if state.stream.is_some() && state.spots.iter().all(Option::is_none) {
                state.stream = None;
                report.handles_closed += 1;
                log::debug!("ChunkedStreamCache: closed idle handle of {}", accessor.key);
            }
        }

        if report.spots_dropped > 0 {
            log::debug!(
                "ChunkedStreamCache: sweep dropped {} spots, closed {} handles",
                report.spots_dropped,
                report.handles_closed
            );
        }
        report
    }

    /// Number of assets with an open stream handle.
    pub fn open_handles(&self) -> usize {
        let accessors: Vec<Arc<Accessor>> = self.lock().values().cloned().collect();
        accessors
            .iter()
            .filter(|accessor| accessor.lock().stream.is_some())
            .count()
    }

    /// Number of cached chunks of `key`.
    pub fn live_spots(&self, key: &AssetUUID) -> usize {
        let Some(accessor) = self.lock().get(key).cloned() else {
            return 0;
        };
        let state = accessor.lock();
        state.spots.iter().filter(|s| s.is_some()).count()
    }

    /// Forgets everything about `key`, closing its handle.
    pub fn evict(&self, key: &AssetUUID) -> bool {
        self.lock().remove(key).is_some()
    }

    fn accessor(&self, key: &AssetUUID) -> Result<Arc<Accessor>, StreamError> {
        let mut accessors = self.lock();
        if let Some(accessor) = accessors.get(key) {
            return Ok(accessor.clone());
        }

        let locator = self.index.resolve(key).ok_or(StreamError::NotIndexed(*key))?;
        let layout = locator
            .chunk_layout
            .as_ref()
            .ok_or(StreamError::NotStreamable(*key))?;
        let plan = ChunkPlan::from_layout(layout, self.config.chunk_duration())
            .map_err(|reason| StreamError::InvalidLayout { key: *key, reason })?;

        let mut spots = Vec::new();
        spots.resize_with(plan.chunk_count(), || None);
        log::debug!(
            "ChunkedStreamCache: new accessor for '{}' ({} chunks)",
            locator.source_path.display(),
            spots.len()
        );

        let accessor = Arc::new(Accessor {
            key: *key,
            plan,
            state: Mutex::new(AccessorState {
                locator,
                stream: None,
                spots,
            }),
        });
        accessors.insert(*key, accessor.clone());
        Ok(accessor)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AssetUUID, Arc<Accessor>>> {
        self.accessors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_readable(stream: &mut dyn AssetStream) -> bool {
    stream.stream_position().is_ok()
}

fn read_span(stream: &mut dyn AssetStream, span: ChunkSpan) -> io::Result<Vec<u8>> {
    stream.seek(SeekFrom::Start(span.start))?;
    let mut buffer = Vec::new();
    match span.len {
        // Bounded by what the stream holds, not by the declared length.
        Some(len) => {
            Read::take(&mut *stream, len).read_to_end(&mut buffer)?;
            if (buffer.len() as u64) < len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("chunk needs {} bytes, stream had {}", len, buffer.len()),
                ));
            }
        }
        None => {
            stream.read_to_end(&mut buffer)?;
        }
    }
    Ok(buffer)
}
