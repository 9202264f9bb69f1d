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

//! The capability traits a resolver is specialized with, and the types that
//! cross the resolver/transport boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tessera_core::asset::{AssetMetadata, AssetStatus, Envelope, EnvelopeError, ResponseKind, TypeHint};
use thiserror::Error;

/// A response delivered by the transport for one dispatched request.
#[derive(Debug, Clone)]
pub struct Response {
    /// The hint the request was dispatched with.
    pub hint: TypeHint,
    /// How the transport classified the outcome.
    pub kind: ResponseKind,
    /// Raw bytes. Empty for negative responses.
    pub bytes: Arc<[u8]>,
    /// Locator of the served asset, when the transport knows it.
    pub meta: Option<AssetMetadata>,
}

impl Response {
    /// A successful response carrying `bytes`.
    pub fn ok(hint: TypeHint, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            hint,
            kind: ResponseKind::Ok,
            bytes: bytes.into(),
            meta: None,
        }
    }

    /// A value-less response of the given kind.
    pub fn negative(hint: TypeHint, kind: ResponseKind) -> Self {
        Self {
            hint,
            kind,
            bytes: Arc::from(Vec::new()),
            meta: None,
        }
    }

    /// Attaches the locator of the served asset.
    pub fn with_meta(mut self, meta: AssetMetadata) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Parses the `VTAB` envelope and returns the payload behind it.
    pub fn payload(&self) -> Result<&[u8], ParseError> {
        Ok(Envelope::parse(&self.bytes)?.payload)
    }
}

/// The result of parsing one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<V> {
    /// Decoded value, stored as `Return`.
    Ready(V),
    /// The payload says the asset does not exist.
    Missing,
    /// Decoding failed.
    Failed,
    /// Decoding continues elsewhere; the value arrives through a [`Completion`].
    Deferred,
}

/// Errors a parser or deriver may report. All of them resolve the key to `Error`.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The response bytes are not a valid envelope.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] EnvelopeError),
    /// The payload could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// The direct-fetch capability set of a resolver.
///
/// `request` and `parse` are required. The other hooks default to no-ops.
/// All of them are called without the resolver lock held, so they may call
/// back into the resolver.
pub trait FetchStrategy<K, V>: Send + Sync + 'static {
    /// Sends a request for `key` to the transport. Fire-and-forget: the answer
    /// comes back through `KeyedAssetResolver::receive`.
    fn request(&self, key: &K, hint: &TypeHint);

    /// Inspects a successful response before parsing. Returning a status
    /// reclassifies the response; `NoAsset` and `Error` are honoured, anything
    /// else is treated as `Error`.
    fn prefilter(&self, _key: &K, _response: &Response) -> Option<AssetStatus> {
        None
    }

    /// Decodes the response bytes into a value.
    fn parse(
        &self,
        key: &K,
        response: Response,
        deferrer: &Deferrer<K, V>,
    ) -> Result<Parsed<V>, ParseError>;

    /// Releases a value leaving the resolver.
    fn clean(&self, _key: &K, _value: V) {}

    /// Invalidates records derived from `key`.
    fn erase_dependents(&self, _key: &K) {}
}

/// Runs on every cache hit and may adjust the stored value in place.
///
/// `validate` is called with the resolver's lock held, so it must not call
/// back into the same resolver.
pub trait Validator<K, V>: Send + Sync + 'static {
    /// Validates `value` for a hit on `key`.
    fn validate(&self, key: &K, hint: &TypeHint, value: &mut V);
}

/// The default validator. Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl<K, V> Validator<K, V> for NoValidation {
    #[inline]
    fn validate(&self, _key: &K, _hint: &TypeHint, _value: &mut V) {}
}

/// Terminal outcome of one resolution.
#[derive(Debug)]
pub(crate) enum Outcome<V> {
    Ready(V),
    Missing,
    Failed,
}

impl<V> From<Parsed<V>> for Outcome<V> {
    fn from(parsed: Parsed<V>) -> Self {
        match parsed {
            Parsed::Ready(v) => Outcome::Ready(v),
            Parsed::Missing => Outcome::Missing,
            Parsed::Failed | Parsed::Deferred => Outcome::Failed,
        }
    }
}

/// Receiver of deferred outcomes, implemented by the resolver internals.
pub(crate) trait CompletionSink<K, V>: Send + Sync {
    fn complete_deferred(&self, key: K, epoch: u64, outcome: Outcome<V>);
}

/// Hands out a [`Completion`] to a parser that wants to finish later.
pub struct Deferrer<K, V> {
    key: K,
    epoch: u64,
    sink: Weak<dyn CompletionSink<K, V>>,
    armed: Arc<AtomicBool>,
    taken: AtomicBool,
}

impl<K: Clone, V> Deferrer<K, V> {
    pub(crate) fn new(key: K, epoch: u64, sink: Weak<dyn CompletionSink<K, V>>) -> Self {
        Self {
            key,
            epoch,
            sink,
            armed: Arc::new(AtomicBool::new(true)),
            taken: AtomicBool::new(false),
        }
    }

    /// Takes a completion for this key. The parser must then return
    /// [`Parsed::Deferred`]; with any other result the completion is disarmed.
    pub fn defer(&self) -> Completion<K, V> {
        self.taken.store(true, Ordering::Release);
        Completion {
            key: Some(self.key.clone()),
            epoch: self.epoch,
            sink: self.sink.clone(),
            armed: self.armed.clone(),
        }
    }

    pub(crate) fn was_taken(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }

    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }
}

/// One-shot handle finishing a deferred parse, from any thread.
///
/// Dropping it without calling [`Completion::finish`] resolves the key to
/// `Error`, so callbacks are never left hanging.
pub struct Completion<K, V> {
    key: Option<K>,
    epoch: u64,
    sink: Weak<dyn CompletionSink<K, V>>,
    armed: Arc<AtomicBool>,
}

impl<K, V> Completion<K, V> {
    /// Delivers the final parse result. `Deferred` counts as `Failed`.
    pub fn finish(mut self, parsed: Parsed<V>) {
        self.deliver(parsed.into());
    }

    fn deliver(&mut self, outcome: Outcome<V>) {
        let Some(key) = self.key.take() else {
            return;
        };
        if !self.armed.swap(false, Ordering::AcqRel) {
            return;
        }
        // The resolver may be gone already; then there is nobody to tell.
        if let Some(sink) = self.sink.upgrade() {
            sink.complete_deferred(key, self.epoch, outcome);
        }
    }
}

impl<K, V> Drop for Completion<K, V> {
    fn drop(&mut self) {
        if self.key.is_some() {
            log::warn!("Completion: dropped without finishing, resolving as error");
            self.deliver(Outcome::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(u32, u64, &'static str)>>,
    }

    impl CompletionSink<u32, String> for RecordingSink {
        fn complete_deferred(&self, key: u32, epoch: u64, outcome: Outcome<String>) {
            let tag = match outcome {
                Outcome::Ready(_) => "ready",
                Outcome::Missing => "missing",
                Outcome::Failed => "failed",
            };
            self.seen.lock().unwrap().push((key, epoch, tag));
        }
    }

    fn deferrer(sink: &Arc<RecordingSink>) -> Deferrer<u32, String> {
        let sink: Arc<dyn CompletionSink<u32, String>> = sink.clone();
        Deferrer::new(7, 3, Arc::downgrade(&sink))
    }

    #[test]
    fn finish_delivers_once() {
        let sink = Arc::new(RecordingSink::default());
        let deferrer = deferrer(&sink);
        deferrer.defer().finish(Parsed::Ready("v".to_string()));
        assert_eq!(*sink.seen.lock().unwrap(), vec![(7, 3, "ready")]);
    }

    #[test]
    fn dropped_completion_fails_the_key() {
        let sink = Arc::new(RecordingSink::default());
        let deferrer = deferrer(&sink);
        drop(deferrer.defer());
        assert_eq!(*sink.seen.lock().unwrap(), vec![(7, 3, "failed")]);
    }

    #[test]
    fn disarmed_completion_is_silent() {
        let sink = Arc::new(RecordingSink::default());
        let deferrer = deferrer(&sink);
        let completion = deferrer.defer();
        deferrer.disarm();
        completion.finish(Parsed::Missing);
        assert!(sink.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn payload_strips_the_envelope() {
        use tessera_core::asset::EnvelopeHeader;
        let bytes = EnvelopeHeader::current().encode(b"pixels");
        let response = Response::ok(TypeHint::from("texture"), bytes);
        assert_eq!(response.payload().unwrap(), b"pixels");

        let garbage = Response::ok(TypeHint::none(), b"no".to_vec());
        assert!(matches!(garbage.payload(), Err(ParseError::Envelope(_))));
    }
}
