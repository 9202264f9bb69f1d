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
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tessera_core::asset::AssetUUID;
use tessera_core::config::BinaryCacheConfig;
use tessera_core::vfs::AssetIndex;
use tessera_core::Clock;
use tessera_io::BlobStore;
use thiserror::Error;

/// Entries touched within this window get a score bonus that shields them
/// from eviction regardless of size.
pub const RECENT_ACCESS_WINDOW: Duration = Duration::from_secs(60);

/// Errors returned by [`WholeFileBinaryCache::get_binary`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The index has no locator for the key.
    #[error("asset {0} is not indexed")]
    NotIndexed(AssetUUID),
    /// Reading the blob from storage failed.
    #[error("failed to read asset {key}: {source}")]
    Io {
        /// The key being read.
        key: AssetUUID,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Counters describing the cache's behaviour so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached blobs.
    pub entries: usize,
    /// Sum of cached blob sizes.
    pub total_bytes: usize,
    /// Lookups served from memory.
    pub hits: u64,
    /// Lookups that went to storage.
    pub misses: u64,
    /// Blobs dropped by the eviction pass.
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheEntry {
    bytes: Arc<[u8]>,
    last_access: Instant,
}

impl CacheEntry {
    /// Recently used entries carry a bonus that decays to zero over one minute;
    /// past that the score is the raw size, so the smallest stale blob goes first.
    fn score(&self, now: Instant) -> u64 {
        let idle_ms = now.saturating_duration_since(self.last_access).as_millis() as u64;
        let bonus = (RECENT_ACCESS_WINDOW.as_millis() as u64).saturating_sub(idle_ms);
        bonus + self.bytes.len() as u64
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<AssetUUID, CacheEntry>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    fn remove(&mut self, key: &AssetUUID) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.bytes.len();
        Some(entry)
    }

    /// Evicts minimum-score entries until the byte budget holds. A single
    /// entry larger than the budget is kept.
    fn shuffle(&mut self, now: Instant, max_bytes: usize) {
        while self.total_bytes > max_bytes && self.entries.len() > 1 {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.score(now), entry.last_access))
                .map(|(key, _)| *key);
            let Some(victim) = victim else { break };

            if let Some(entry) = self.remove(&victim) {
                self.evictions += 1;
                log::debug!(
                    "WholeFileBinaryCache: evicted {} ({} bytes, {} cached)",
                    victim,
                    entry.bytes.len(),
                    self.total_bytes
                );
            }
        }
    }
}

/// A bounded in-memory cache of complete asset blobs.
///
/// One mutex guards the whole cache. Misses read from storage while holding
/// it, so two threads asking for the same cold key never both hit the disk.
pub struct WholeFileBinaryCache {
    index: Arc<dyn AssetIndex>,
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    config: BinaryCacheConfig,
    state: Mutex<CacheState>,
}

impl WholeFileBinaryCache {
    /// Creates an empty cache.
    pub fn new(
        index: Arc<dyn AssetIndex>,
        store: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
        config: BinaryCacheConfig,
    ) -> Self {
        Self {
            index,
            store,
            clock,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the complete bytes of `key`.
    ///
    /// With the cache disabled every call reads through to storage and
    /// nothing is retained.
    pub fn get_binary(&self, key: &AssetUUID) -> Result<Arc<[u8]>, CacheError> {
        if !self.config.enabled {
            return self.read_from_store(key);
        }

        let mut state = self.lock();
        let now = self.clock.now();

        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = now;
            let bytes = entry.bytes.clone();
            state.hits += 1;
            return Ok(bytes);
        }

        state.misses += 1;
        let bytes = self.read_from_store(key)?;
        state.total_bytes += bytes.len();
        state.entries.insert(
            *key,
            CacheEntry {
                bytes: bytes.clone(),
                last_access: now,
            },
        );
        state.shuffle(now, self.config.max_bytes);
        Ok(bytes)
    }

    /// Drops the cached blob for `key`. Returns whether one was cached.
    pub fn delete_cache(&self, key: &AssetUUID) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Whether `key` is currently cached.
    pub fn contains(&self, key: &AssetUUID) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Drops every cached blob.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    /// A snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    fn read_from_store(&self, key: &AssetUUID) -> Result<Arc<[u8]>, CacheError> {
        let locator = self.index.resolve(key).ok_or(CacheError::NotIndexed(*key))?;
        match self.store.read_all(&locator) {
            Ok(bytes) => Ok(Arc::from(bytes)),
            Err(source) => {
                log::warn!(
                    "WholeFileBinaryCache: failed to read '{}': {}",
                    locator.source_path.display(),
                    source
                );
                Err(CacheError::Io { key: *key, source })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_core::asset::AssetMetadata;
    use tessera_core::vfs::VirtualFileSystem;
    use tessera_core::ManualClock;
    use tessera_io::AssetStream;

    #[derive(Default)]
    struct MemoryStore {
        blobs: HashMap<AssetUUID, Vec<u8>>,
        reads: AtomicUsize,
    }

    impl BlobStore for MemoryStore {
        fn read_all(&self, locator: &AssetMetadata) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.blobs
                .get(&locator.uuid)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "gone"))
        }

        fn open_stream(&self, _locator: &AssetMetadata) -> io::Result<Box<dyn AssetStream>> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "whole files only"))
        }
    }

    struct Fixture {
        cache: WholeFileBinaryCache,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture(sizes: &[(&str, usize)], config: BinaryCacheConfig) -> Fixture {
        let mut store = MemoryStore::default();
        let mut metadata = Vec::new();
        for (name, size) in sizes {
            let uuid = key(name);
            store.blobs.insert(uuid, vec![0xAB; *size]);
            metadata.push(AssetMetadata::loose(uuid, *name, "bin"));
        }
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new());
        let cache = WholeFileBinaryCache::new(
            Arc::new(VirtualFileSystem::from_metadata(metadata)),
            store.clone(),
            clock.clone(),
            config,
        );
        Fixture { cache, store, clock }
    }

    fn key(name: &str) -> AssetUUID {
        AssetUUID::new_v5(name)
    }

    fn bounded(max_bytes: usize) -> BinaryCacheConfig {
        BinaryCacheConfig {
            enabled: true,
            max_bytes,
        }
    }

    #[test]
    fn hit_does_not_touch_storage_again() {
        let f = fixture(&[("a", 10)], bounded(100));
        let first = f.cache.get_binary(&key("a")).unwrap();
        let second = f.cache.get_binary(&key("a")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.store.reads.load(Ordering::SeqCst), 1);

        let stats = f.cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn smallest_stale_entry_is_evicted_first() {
        let f = fixture(
            &[("A", 10), ("B", 100), ("C", 10), ("D", 5)],
            bounded(120),
        );
        f.cache.get_binary(&key("C")).unwrap();
        f.cache.get_binary(&key("B")).unwrap();
        f.clock.advance(Duration::from_secs(90));
        f.cache.get_binary(&key("A")).unwrap();
        f.clock.advance(Duration::from_secs(30));

        // A idles 30s, B and C idle 120s; D pushes the total to 125 bytes.
        f.cache.get_binary(&key("D")).unwrap();

        assert!(!f.cache.contains(&key("C")));
        assert!(f.cache.contains(&key("B")));
        assert!(f.cache.contains(&key("A")));
        assert!(f.cache.contains(&key("D")));
        assert_eq!(f.cache.stats().total_bytes, 115);
        assert_eq!(f.cache.stats().evictions, 1);
    }

    #[test]
    fn recently_used_large_entry_outlives_stale_small_ones() {
        let f = fixture(&[("big", 80), ("small1", 10), ("small2", 10), ("new", 10)], bounded(95));
        f.cache.get_binary(&key("small1")).unwrap();
        f.cache.get_binary(&key("small2")).unwrap();
        f.clock.advance(Duration::from_secs(61));
        f.cache.get_binary(&key("big")).unwrap();
        f.cache.get_binary(&key("new")).unwrap();

        assert!(f.cache.contains(&key("big")));
        assert!(f.cache.contains(&key("new")));
        assert!(!f.cache.contains(&key("small1")));
        assert!(!f.cache.contains(&key("small2")));
    }

    #[test]
    fn total_never_exceeds_budget_after_inserts() {
        let sizes: Vec<(String, usize)> = (0..40).map(|i| (format!("k{i}"), 1 + (i * 7) % 23)).collect();
        let borrowed: Vec<(&str, usize)> = sizes.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        let f = fixture(&borrowed, bounded(50));

        for (i, (name, _)) in borrowed.iter().enumerate() {
            f.clock.advance(Duration::from_secs((i % 3) as u64 * 25));
            f.cache.get_binary(&key(name)).unwrap();
            let stats = f.cache.stats();
            assert!(stats.total_bytes <= 50, "over budget: {stats:?}");
        }
    }

    #[test]
    fn single_oversize_entry_is_kept() {
        let f = fixture(&[("huge", 500)], bounded(100));
        let bytes = f.cache.get_binary(&key("huge")).unwrap();
        assert_eq!(bytes.len(), 500);
        assert!(f.cache.contains(&key("huge")));
        assert_eq!(f.cache.stats().total_bytes, 500);
    }

    #[test]
    fn disabled_cache_reads_through() {
        let f = fixture(
            &[("a", 10)],
            BinaryCacheConfig {
                enabled: false,
                max_bytes: 100,
            },
        );
        f.cache.get_binary(&key("a")).unwrap();
        f.cache.get_binary(&key("a")).unwrap();
        assert_eq!(f.store.reads.load(Ordering::SeqCst), 2);
        assert_eq!(f.cache.stats(), CacheStats::default());
    }

    #[test]
    fn delete_cache_adjusts_running_total() {
        let f = fixture(&[("a", 10), ("b", 20)], bounded(100));
        f.cache.get_binary(&key("a")).unwrap();
        f.cache.get_binary(&key("b")).unwrap();
        assert!(f.cache.delete_cache(&key("a")));
        assert!(!f.cache.delete_cache(&key("a")));
        assert_eq!(f.cache.stats().total_bytes, 20);
    }

    #[test]
    fn unknown_key_and_failed_read_are_errors() {
        let f = fixture(&[], bounded(100));
        assert!(matches!(
            f.cache.get_binary(&key("nope")),
            Err(CacheError::NotIndexed(_))
        ));

        // Indexed, but the store has no bytes for it.
        let clock = Arc::new(ManualClock::new());
        let cache = WholeFileBinaryCache::new(
            Arc::new(VirtualFileSystem::from_metadata([AssetMetadata::loose(
                key("ghost"),
                "ghost",
                "bin",
            )])),
            Arc::new(MemoryStore::default()),
            clock,
            bounded(100),
        );
        assert!(matches!(
            cache.get_binary(&key("ghost")),
            Err(CacheError::Io { .. })
        ));
        assert!(!cache.contains(&key("ghost")));
    }
}
