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

//! Tessera runtime.
//!
//! Indexes an asset library, then resolves every asset through the keyed
//! resolvers with a local transport behind them, and streams the streamable
//! ones chunk by chunk.

mod heartbeat;
mod library;
mod payload;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use env_logger::{Builder, Env};
use heartbeat::Heartbeat;
use library::AssetLibrary;
use payload::{EnvelopeStrategy, LoadedAsset, Summarize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_agents::{DerivedResolver, KeyedAssetResolver, Resolve};
use tessera_core::asset::{AssetHandle, AssetUUID, Resolution, TypeHint};
use tessera_core::{Clock, SystemClock, TesseraConfig};
use tessera_lanes::{ChunkedStreamCache, WholeFileBinaryCache};
use transport::LocalTransport;

#[derive(Parser, Debug)]
#[command(version, about = "Resolve an asset library through the Tessera caches")]
struct Args {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, default_value = "Tessera.toml")]
    config: PathBuf,

    /// Asset root, replacing the configured roots and index file.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Transport worker threads.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Give up waiting for resolutions after this many seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Write the index to this path and exit.
    #[arg(long)]
    write_index: Option<PathBuf>,
}

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = TesseraConfig::load(&args.config)
        .with_context(|| format!("Failed to load '{}'", args.config.display()))?;
    if let Some(root) = &args.root {
        config.index.roots = vec![root.clone()];
        config.index.index_file = None;
    }

    let library = AssetLibrary::open(&config.index)?;
    if let Some(path) = &args.write_index {
        let entries = library.entries();
        tessera_io::write_index(&entries, path)?;
        log::info!("Wrote {} entries to '{}'", entries.len(), path.display());
        return Ok(());
    }

    run(
        &config,
        library,
        args.workers,
        Duration::from_secs(args.timeout_secs),
    )
}

#[derive(Debug, Default)]
struct Tally {
    ready: usize,
    missing: usize,
    failed: usize,
    bytes: usize,
}

fn run(config: &TesseraConfig, library: AssetLibrary, workers: usize, timeout: Duration) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let AssetLibrary { index, store } = library;

    // --- 1. Caches and resolvers.
    let binary = Arc::new(WholeFileBinaryCache::new(
        index.clone(),
        store.clone(),
        clock.clone(),
        config.binary_cache.clone(),
    ));
    let streams = Arc::new(ChunkedStreamCache::new(
        index.clone(),
        store,
        clock.clone(),
        config.stream_cache.clone(),
    ));

    let (requests, request_rx) = unbounded();
    let assets: KeyedAssetResolver<AssetUUID, AssetHandle<LoadedAsset>, EnvelopeStrategy> =
        KeyedAssetResolver::new(
            "AssetResolver",
            EnvelopeStrategy::new(requests),
            clock.clone(),
            config.resolver.clone(),
        );
    let summaries = DerivedResolver::new(
        "SummaryResolver",
        Arc::new(assets.clone()) as Arc<dyn Resolve<AssetUUID, AssetHandle<LoadedAsset>>>,
        Summarize,
    );
    assets
        .strategy()
        .dependents()
        .register(summaries.invalidation_target());

    // --- 2. Transport and heartbeat.
    let mut transport = LocalTransport::new(binary.clone(), index.clone());
    let sink = assets.clone();
    transport
        .start(workers, request_rx, move |key, response| sink.receive(key, response))
        .context("Failed to start transport workers")?;

    let mut heartbeat = Heartbeat::new(config.stream_cache.sweep_interval());
    let (pulse_assets, sweep_streams) = (assets.clone(), streams.clone());
    heartbeat
        .start(move || {
            let pulse = pulse_assets.pulse();
            let sweep = sweep_streams.sweep();
            if pulse.dispatched || sweep.spots_dropped > 0 {
                log::debug!("Heartbeat: {:?}, {:?}", pulse, sweep);
            }
        })
        .context("Failed to start heartbeat")?;

    // --- 3. Resolve every indexed asset.
    let started = Instant::now();
    let keys = index.keys();
    let (done_tx, done_rx) = unbounded();
    for key in &keys {
        let hint = index
            .get_metadata(key)
            .map(|meta| TypeHint::new(meta.asset_type_name))
            .unwrap_or_default();
        let done = done_tx.clone();
        let owned = *key;
        summaries.act_upon(key, &hint, move |resolution| {
            let _ = done.send((owned, resolution));
        });
    }
    drop(done_tx);

    let deadline = started + timeout;
    let mut tally = Tally::default();
    for _ in 0..keys.len() {
        let wait = deadline.saturating_duration_since(Instant::now());
        match done_rx.recv_timeout(wait) {
            Ok((key, Resolution::Ready(summary))) => {
                log::debug!(
                    "Asset {} ({}, envelope {:?}): {} bytes, fnv1a {:08x}",
                    key,
                    summary.type_name,
                    summary.envelope_version,
                    summary.bytes,
                    summary.checksum
                );
                tally.ready += 1;
                tally.bytes += summary.bytes;
            }
            Ok((key, Resolution::Missing)) => {
                tally.missing += 1;
                log::warn!("Asset {} is missing", key);
            }
            Ok((key, _)) => {
                tally.failed += 1;
                log::warn!("Asset {} failed to resolve", key);
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!("Timed out waiting for resolutions");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!(
        "Resolved {} asset(s) in {:.2?}: {} ready ({} bytes), {} missing, {} failed",
        keys.len(),
        started.elapsed(),
        tally.ready,
        tally.bytes,
        tally.missing,
        tally.failed
    );

    // --- 4. Stream whatever has a chunk layout.
    for key in &keys {
        let Ok(count) = streams.chunk_count(key) else {
            continue;
        };
        let mut streamed = 0usize;
        for chunk in 0..count {
            match streams.get(key, chunk) {
                Ok(Some(bytes)) => streamed += bytes.len(),
                Ok(None) => log::warn!("Chunk {} of {} unavailable", chunk, key),
                Err(err) => log::warn!("{}", err),
            }
        }
        log::info!("Streamed {} in {} chunk(s), {} bytes", key, count, streamed);
    }

    log::info!("Resolver: {:?}", assets.stats());
    log::info!("Binary cache: {:?}", binary.stats());
    log::info!("Open stream handles: {}", streams.open_handles());

    heartbeat.stop();
    transport.stop();
    Ok(())
}
