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

use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use tessera_core::asset::{AssetMetadata, AssetSource, AssetUUID, ChunkLayout};
use tessera_core::config::{BinaryCacheConfig, StreamCacheConfig};
use tessera_core::vfs::VirtualFileSystem;
use std::time::Duration;
use tessera_core::{ManualClock, SystemClock};
use tessera_io::FsBlobStore;
use tessera_lanes::{CacheError, ChunkedStreamCache, WholeFileBinaryCache};

#[test]
fn whole_file_cache_serves_files_from_disk() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("model.bin"), b"vertices").unwrap();

    let key = AssetUUID::new_v5("model.bin");
    let index = Arc::new(VirtualFileSystem::from_metadata([AssetMetadata::loose(
        key,
        "model.bin",
        "bin",
    )]));
    let cache = Arc::new(WholeFileBinaryCache::new(
        index.clone(),
        Arc::new(FsBlobStore::new(dir.path())),
        Arc::new(SystemClock),
        BinaryCacheConfig::default(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            thread::spawn(move || cache.get_binary(&key).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(&*handle.join().unwrap(), b"vertices");
    }

    // Serialized misses: exactly one storage read for eight callers.
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);

    // A deleted file stays served from memory until invalidated.
    fs::remove_file(dir.path().join("model.bin")).unwrap();
    assert!(cache.get_binary(&key).is_ok());
    assert!(cache.delete_cache(&key));
    assert!(matches!(cache.get_binary(&key), Err(CacheError::Io { .. })));
}

#[test]
fn stream_cache_reads_packed_offset_table_asset() {
    let dir = tempdir().unwrap();
    let pack = dir.path().join("data.pack");
    fs::write(&pack, b"HEADERchunk-onechunk-twotail").unwrap();

    let key = AssetUUID::new_v5("music/ogg-like.bin");
    let mut meta = AssetMetadata::loose(key, "music/ogg-like.bin", "ogg").with_chunk_layout(
        ChunkLayout::OffsetTable {
            offsets: vec![0, 9, 18],
        },
    );
    meta.source = AssetSource::Packed {
        offset: 6,
        size: 22,
    };

    let cache = ChunkedStreamCache::new(
        Arc::new(VirtualFileSystem::from_metadata([meta])),
        Arc::new(FsBlobStore::new(dir.path()).with_pack_file(&pack)),
        Arc::new(SystemClock),
        StreamCacheConfig::default(),
    );

    assert_eq!(cache.chunk_count(&key).unwrap(), 3);
    assert_eq!(&*cache.get(&key, 0).unwrap().unwrap(), b"chunk-one");
    assert_eq!(&*cache.get(&key, 1).unwrap().unwrap(), b"chunk-two");
    assert_eq!(&*cache.get(&key, 2).unwrap().unwrap(), b"tail");
    assert_eq!(cache.open_handles(), 1);
    assert_eq!(cache.live_spots(&key), 3);
}

#[test]
fn missing_file_is_a_soft_stream_failure() {
    let dir = tempdir().unwrap();
    let key = AssetUUID::new_v5("gone.wav");
    let meta = AssetMetadata::loose(key, "gone.wav", "wav").with_chunk_layout(ChunkLayout::Pcm {
        sample_rate: 8000,
        channels: 1,
        sample_width: 2,
        data_offset: 44,
        data_len: 16_000,
    });
    let cache = ChunkedStreamCache::new(
        Arc::new(VirtualFileSystem::from_metadata([meta])),
        Arc::new(FsBlobStore::new(dir.path())),
        Arc::new(SystemClock),
        StreamCacheConfig::default(),
    );

    assert_eq!(cache.get(&key, 0), Ok(None));
    assert_eq!(cache.open_handles(), 0);
}

#[test]
fn stream_cache_follows_a_relocated_entry_on_reopen() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("old")).unwrap();
    fs::create_dir_all(dir.path().join("new")).unwrap();
    fs::write(dir.path().join("old/voice.raw"), b"old-bytes").unwrap();

    let key = AssetUUID::new_v5("old/voice.raw");
    let meta = AssetMetadata::loose(key, "old/voice.raw", "raw").with_chunk_layout(
        ChunkLayout::OffsetTable {
            offsets: vec![0, 4],
        },
    );
    let index = Arc::new(VirtualFileSystem::from_metadata([meta]));
    let clock = Arc::new(ManualClock::new());
    let cache = ChunkedStreamCache::new(
        index.clone(),
        Arc::new(FsBlobStore::new(dir.path())),
        clock.clone(),
        StreamCacheConfig {
            spot_ttl_secs: 5,
            ..StreamCacheConfig::default()
        },
    );
    assert_eq!(&*cache.get(&key, 0).unwrap().unwrap(), b"old-");

    // Let the handle close, then move the file and its index entry.
    clock.advance(Duration::from_secs(6));
    assert_eq!(cache.sweep().handles_closed, 1);
    fs::remove_file(dir.path().join("old/voice.raw")).unwrap();
    fs::write(dir.path().join("new/voice.raw"), b"new-bytes").unwrap();
    assert!(index.relocate(&key, "new/voice.raw"));

    assert_eq!(&*cache.get(&key, 0).unwrap().unwrap(), b"new-");
    assert_eq!(&*cache.get(&key, 1).unwrap().unwrap(), b"bytes");
}
