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

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::asset::{AssetMetadata, AssetUUID};
use tessera_core::config::BinaryCacheConfig;
use tessera_core::vfs::VirtualFileSystem;
use tessera_core::ManualClock;
use tessera_io::{AssetStream, BlobStore};
use tessera_lanes::WholeFileBinaryCache;

/// Serves blobs whose size is derived from the path length.
struct SyntheticStore;

impl BlobStore for SyntheticStore {
    fn read_all(&self, locator: &AssetMetadata) -> io::Result<Vec<u8>> {
        let len = 256 + locator.source_path.as_os_str().len() * 64;
        Ok(vec![0x5A; len])
    }

    fn open_stream(&self, _locator: &AssetMetadata) -> io::Result<Box<dyn AssetStream>> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "bench store"))
    }
}

fn bench_eviction(c: &mut Criterion) {
    let keys: Vec<AssetUUID> = (0..2_000)
        .map(|i| AssetUUID::new_v5(&format!("bench/{}", "x".repeat(i % 40))))
        .collect();
    let metadata: Vec<AssetMetadata> = (0..2_000)
        .map(|i| {
            let path = format!("bench/{}", "x".repeat(i % 40));
            AssetMetadata::loose(AssetUUID::new_v5(&path), path, "bin")
        })
        .collect();
    let index = Arc::new(VirtualFileSystem::from_metadata(metadata));

    let mut group = c.benchmark_group("Whole-file cache");

    group.bench_function("Insert under pressure (256 KiB budget)", |b| {
        b.iter(|| {
            let clock = Arc::new(ManualClock::new());
            let cache = WholeFileBinaryCache::new(
                index.clone(),
                Arc::new(SyntheticStore),
                clock.clone(),
                BinaryCacheConfig {
                    enabled: true,
                    max_bytes: 256 * 1024,
                },
            );
            for key in &keys {
                clock.advance(Duration::from_millis(50));
                black_box(cache.get_binary(key).ok());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_eviction);
criterion_main!(benches);
