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

//! Value types the runtime resolves, and the strategies producing them.

use crate::transport::Request;
use crossbeam_channel::Sender;
use std::sync::Arc;
use tessera_agents::{
    Deferrer, Dependents, Deriver, FetchStrategy, ParseError, Parsed, Response,
};
use tessera_core::asset::{Asset, AssetHandle, AssetUUID, Envelope, TypeHint, ENVELOPE_MAGIC};

/// A fetched asset with its envelope stripped.
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    pub type_name: String,
    /// `None` for files stored without an envelope.
    pub envelope_version: Option<u8>,
    pub payload: Arc<[u8]>,
}

impl Asset for LoadedAsset {}

/// Sends requests to the local transport and unwraps `VTAB` envelopes.
///
/// Plain media files are accepted as-is; bytes that start with the envelope
/// magic must parse as an envelope.
pub struct EnvelopeStrategy {
    requests: Sender<Request>,
    dependents: Dependents<AssetUUID>,
}

impl EnvelopeStrategy {
    pub fn new(requests: Sender<Request>) -> Self {
        Self {
            requests,
            dependents: Dependents::new(),
        }
    }

    pub fn dependents(&self) -> &Dependents<AssetUUID> {
        &self.dependents
    }
}

impl FetchStrategy<AssetUUID, AssetHandle<LoadedAsset>> for EnvelopeStrategy {
    fn request(&self, key: &AssetUUID, hint: &TypeHint) {
        if self.requests.send((*key, hint.clone())).is_err() {
            log::warn!("EnvelopeStrategy: transport is gone, {} not requested", key);
        }
    }

    fn parse(
        &self,
        _key: &AssetUUID,
        response: Response,
        _deferrer: &Deferrer<AssetUUID, AssetHandle<LoadedAsset>>,
    ) -> Result<Parsed<AssetHandle<LoadedAsset>>, ParseError> {
        let type_name = response
            .meta
            .as_ref()
            .map(|meta| meta.asset_type_name.clone())
            .unwrap_or_else(|| response.hint.to_string());

        if !response.bytes.starts_with(&ENVELOPE_MAGIC) {
            return Ok(Parsed::Ready(AssetHandle::new(LoadedAsset {
                type_name,
                envelope_version: None,
                payload: response.bytes,
            })));
        }

        let envelope = Envelope::parse(&response.bytes)?;
        Ok(Parsed::Ready(AssetHandle::new(LoadedAsset {
            type_name,
            envelope_version: Some(envelope.header.version()),
            payload: Arc::from(envelope.payload),
        })))
    }

    fn erase_dependents(&self, key: &AssetUUID) {
        self.dependents.erase(key);
    }
}

/// Size and checksum of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSummary {
    pub type_name: String,
    pub envelope_version: Option<u8>,
    pub bytes: usize,
    pub checksum: u32,
}

/// Derives an [`AssetSummary`] from a [`LoadedAsset`].
pub struct Summarize;

impl Deriver<AssetUUID> for Summarize {
    type Source = AssetHandle<LoadedAsset>;
    type Value = AssetSummary;

    fn derive(
        &self,
        _key: &AssetUUID,
        source: &AssetHandle<LoadedAsset>,
    ) -> Result<AssetSummary, ParseError> {
        Ok(AssetSummary {
            type_name: source.type_name.clone(),
            envelope_version: source.envelope_version,
            bytes: source.payload.len(),
            checksum: fnv1a(&source.payload),
        })
    }
}

fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811C_9DC5u32, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Arc;
    use tessera_agents::KeyedAssetResolver;
    use tessera_core::asset::{EnvelopeHeader, Resolution};
    use tessera_core::config::ResolverConfig;
    use tessera_core::SystemClock;

    fn resolver() -> KeyedAssetResolver<AssetUUID, AssetHandle<LoadedAsset>, EnvelopeStrategy> {
        let (tx, _rx) = unbounded();
        KeyedAssetResolver::new(
            "payload-test",
            EnvelopeStrategy::new(tx),
            Arc::new(SystemClock),
            ResolverConfig::default(),
        )
    }

    #[test]
    fn strips_envelope_and_keeps_raw_files() {
        let resolver = resolver();
        let hint = TypeHint::from("bin");
        let wrapped = AssetUUID::new_v5("wrapped");
        let raw = AssetUUID::new_v5("raw");
        resolver.get(&wrapped, &hint);
        resolver.get(&raw, &hint);

        resolver.receive(
            wrapped,
            Response::ok(hint.clone(), EnvelopeHeader::current().encode(b"inner")),
        );
        resolver.receive(raw, Response::ok(hint.clone(), b"RIFF....".to_vec()));

        let first = resolver.get(&wrapped, &hint).into_value().unwrap();
        let second = resolver.get(&wrapped, &hint).into_value().unwrap();
        assert!(AssetHandle::ptr_eq(&first, &second));
        assert_eq!(&*first.payload, b"inner");
        assert_eq!(first.envelope_version, Some(1));

        let raw = resolver.get(&raw, &hint).into_value().unwrap();
        assert_eq!(&*raw.payload, b"RIFF....");
        assert_eq!(raw.envelope_version, None);
    }

    #[test]
    fn truncated_envelope_is_an_error() {
        let resolver = resolver();
        let hint = TypeHint::none();
        let key = AssetUUID::new_v5("cut");
        resolver.get(&key, &hint);
        resolver.receive(key, Response::ok(hint.clone(), b"VTAB".to_vec()));
        assert_eq!(resolver.get(&key, &hint).status(), tessera_core::asset::AssetStatus::Error);
        assert!(matches!(resolver.get(&key, &hint), Resolution::Failed));
    }

    #[test]
    fn summary_checksum_is_stable() {
        let asset = AssetHandle::new(LoadedAsset {
            type_name: "txt".to_string(),
            envelope_version: None,
            payload: Arc::from(&b"a"[..]),
        });
        let summary = Summarize.derive(&AssetUUID::new_v5("a"), &asset).unwrap();
        assert_eq!(summary.bytes, 1);
        assert_eq!(summary.checksum, 0xE40C_292C);
    }
}
