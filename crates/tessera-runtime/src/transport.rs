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

//! In-process transport answering resolver requests from the whole-file cache.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tessera_agents::Response;
use tessera_core::asset::{AssetUUID, ResponseKind, TypeHint};
use tessera_core::vfs::AssetIndex;
use tessera_lanes::{CacheError, WholeFileBinaryCache};

/// A request as sent by a fetch strategy.
pub type Request = (AssetUUID, TypeHint);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A pool of worker threads serving requests from a channel.
pub struct LocalTransport {
    cache: Arc<WholeFileBinaryCache>,
    index: Arc<dyn AssetIndex>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl LocalTransport {
    pub fn new(cache: Arc<WholeFileBinaryCache>, index: Arc<dyn AssetIndex>) -> Self {
        Self {
            cache,
            index,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Spawns `count` workers. Each answer is handed to `deliver`.
    pub fn start<F>(&mut self, count: usize, requests: Receiver<Request>, deliver: F) -> io::Result<()>
    where
        F: Fn(AssetUUID, Response) + Send + Sync + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let deliver = Arc::new(deliver);
        for id in 0..count.max(1) {
            let running = Arc::clone(&self.running);
            let requests = requests.clone();
            let deliver = Arc::clone(&deliver);
            let cache = Arc::clone(&self.cache);
            let index = Arc::clone(&self.index);
            let handle = thread::Builder::new()
                .name(format!("tessera-transport-{id}"))
                .spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        match requests.recv_timeout(POLL_INTERVAL) {
                            Ok((key, hint)) => deliver(key, serve(&cache, index.as_ref(), key, hint)),
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    log::debug!("LocalTransport: worker {} stopped", id);
                })?;
            self.workers.push(handle);
        }
        log::info!("LocalTransport: started {} worker(s)", self.workers.len());
        Ok(())
    }

    /// Signals the workers and waits for them.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("LocalTransport: a worker panicked");
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Answers one request. A file that vanished from disk counts as absent.
fn serve(
    cache: &WholeFileBinaryCache,
    index: &dyn AssetIndex,
    key: AssetUUID,
    hint: TypeHint,
) -> Response {
    match cache.get_binary(&key) {
        Ok(bytes) => {
            let response = Response::ok(hint, bytes);
            match index.resolve(&key) {
                Some(meta) => response.with_meta(meta),
                None => response,
            }
        }
        Err(CacheError::NotIndexed(_)) => Response::negative(hint, ResponseKind::NoAsset),
        Err(CacheError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            Response::negative(hint, ResponseKind::NoAsset)
        }
        Err(err) => {
            log::warn!("LocalTransport: {}", err);
            Response::negative(hint, ResponseKind::InternalError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::fs;
    use tempfile::tempdir;
    use tessera_core::asset::AssetMetadata;
    use tessera_core::config::BinaryCacheConfig;
    use tessera_core::vfs::VirtualFileSystem;
    use tessera_core::SystemClock;
    use tessera_io::FsBlobStore;

    #[test]
    fn workers_classify_responses() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("here.bin"), b"bytes").unwrap();
        let here = AssetUUID::new_v5("here.bin");
        let vanished = AssetUUID::new_v5("vanished.bin");
        let index = Arc::new(VirtualFileSystem::from_metadata([
            AssetMetadata::loose(here, "here.bin", "bin"),
            AssetMetadata::loose(vanished, "vanished.bin", "bin"),
        ]));
        let cache = Arc::new(WholeFileBinaryCache::new(
            index.clone(),
            Arc::new(FsBlobStore::new(dir.path())),
            Arc::new(SystemClock),
            BinaryCacheConfig::default(),
        ));

        let (req_tx, req_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let mut transport = LocalTransport::new(cache, index);
        transport
            .start(2, req_rx, move |key, response| {
                out_tx.send((key, response.kind, response.meta.is_some())).unwrap();
            })
            .unwrap();

        let unknown = AssetUUID::new_v5("unknown.bin");
        for key in [here, vanished, unknown] {
            req_tx.send((key, TypeHint::none())).unwrap();
        }
        let mut answers: Vec<_> = (0..3)
            .map(|_| out_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        answers.sort_by_key(|(key, ..)| *key);

        let mut expected = vec![
            (here, ResponseKind::Ok, true),
            (vanished, ResponseKind::NoAsset, false),
            (unknown, ResponseKind::NoAsset, false),
        ];
        expected.sort_by_key(|(key, ..)| *key);
        assert_eq!(answers, expected);

        transport.stop();
    }
}
