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

//! Configuration for the caches, resolvers and index, read from `Tessera.toml`.
//!
//! Every section is optional; missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// The offending path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`TesseraConfig`].
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// The offending path.
        path: PathBuf,
        /// The TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Settings of the whole-file binary cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryCacheConfig {
    /// When `false`, every read goes straight to storage (low-memory mode).
    pub enabled: bool,
    /// Upper bound on cached bytes.
    pub max_bytes: usize,
}

impl Default for BinaryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Settings of the chunked stream cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamCacheConfig {
    /// A spot idle for longer than this is dropped by the next sweep.
    pub spot_ttl_secs: u64,
    /// Playback duration covered by one fixed-stride chunk.
    pub chunk_duration_ms: u64,
    /// How often the runtime sweeps expired spots.
    pub sweep_interval_secs: u64,
}

impl StreamCacheConfig {
    /// Spot time-to-live.
    pub fn spot_ttl(&self) -> Duration {
        Duration::from_secs(self.spot_ttl_secs)
    }

    /// Duration of one fixed-stride chunk.
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_duration_ms)
    }

    /// Interval between sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for StreamCacheConfig {
    fn default() -> Self {
        Self {
            spot_ttl_secs: 30,
            chunk_duration_ms: 1000,
            sweep_interval_secs: 5,
        }
    }
}

/// Settings shared by every keyed resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// `pulse` dispatches the queue head when nothing was dispatched for this long.
    pub watchdog_interval_secs: u64,
    /// Upper bound on concurrently dispatched requests. `None` is unbounded.
    pub max_in_flight: Option<usize>,
    /// When set, `pulse` re-queues requests in flight for longer than this.
    pub in_flight_timeout_secs: Option<u64>,
}

impl ResolverConfig {
    /// The dispatch watchdog interval.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// The in-flight timeout, if any.
    pub fn in_flight_timeout(&self) -> Option<Duration> {
        self.in_flight_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: 30,
            max_in_flight: None,
            in_flight_timeout_secs: None,
        }
    }
}

/// Where the asset index and backing store live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directories scanned for loose assets.
    pub roots: Vec<PathBuf>,
    /// Optional `data.pack` holding packed assets.
    pub pack_file: Option<PathBuf>,
    /// Optional pre-built `index.bin`; skips the scan when present.
    pub index_file: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("resources/assets")],
            pack_file: None,
            index_file: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Whole-file cache settings.
    pub binary_cache: BinaryCacheConfig,
    /// Chunked stream cache settings.
    pub stream_cache: StreamCacheConfig,
    /// Resolver settings.
    pub resolver: ResolverConfig,
    /// Index and store settings.
    pub index: IndexConfig,
}

impl TesseraConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Loads the configuration at `path`.
    /// If the file does not exist, the default configuration is returned.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!(
                "No '{}' found. Using default configuration.",
                path.display()
            );
            return Ok(Self::default());
        }

        log::info!("Found '{}'. Loading configuration.", path.display());
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
