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

//! Resolvers whose values are computed from another resolver's values.

use super::dependents::Invalidate;
use super::resolver::{Callback, Resolve, Slot};
use super::strategy::ParseError;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tessera_core::asset::{AssetKey, AssetStatus, Resolution, TypeHint};

/// Turns a source value into a derived one.
pub trait Deriver<K>: Send + Sync + 'static {
    /// The value type of the source resolver.
    type Source: Clone + Send + 'static;
    /// The derived value type.
    type Value: Clone + Send + 'static;

    /// Computes the derived value. An error records `Error` for the key.
    fn derive(&self, key: &K, source: &Self::Source) -> Result<Self::Value, ParseError>;

    /// Releases a derived value leaving the resolver.
    fn clean(&self, _key: &K, _value: Self::Value) {}
}

struct DerivedShared<K, D: Deriver<K>> {
    name: String,
    source: Arc<dyn Resolve<K, D::Source>>,
    deriver: D,
    slots: Mutex<HashMap<K, Slot<D::Value>>>,
}

/// A resolver that never dispatches requests itself.
///
/// | source     | derived                                    |
/// |------------|--------------------------------------------|
/// | `Ready`    | derive once, record and return the value   |
/// | `Pending`  | return `Pending`, record nothing           |
/// | `Missing`  | record and return `Missing`                |
/// | `Failed`   | record and return `Failed`                 |
pub struct DerivedResolver<K, D: Deriver<K>> {
    shared: Arc<DerivedShared<K, D>>,
}

impl<K, D: Deriver<K>> Clone for DerivedResolver<K, D> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K: AssetKey, D: Deriver<K>> DerivedResolver<K, D> {
    /// Creates a resolver deriving from `source`.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn Resolve<K, D::Source>>,
        deriver: D,
    ) -> Self {
        Self {
            shared: Arc::new(DerivedShared {
                name: name.into(),
                source,
                deriver,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The deriver in use.
    pub fn deriver(&self) -> &D {
        &self.shared.deriver
    }

    /// Returns the recorded resolution, or consults the source.
    pub fn get(&self, key: &K, hint: &TypeHint) -> Resolution<D::Value> {
        if let Some(recorded) = self.shared.recorded(key) {
            return recorded;
        }
        let source = self.shared.source.get(key, hint);
        self.shared.settle(key, source)
    }

    /// Calls `callback` with the terminal derived resolution of `key`.
    pub fn act_upon<F>(&self, key: &K, hint: &TypeHint, callback: F)
    where
        F: FnOnce(Resolution<D::Value>) + Send + 'static,
    {
        if let Some(recorded) = self.shared.recorded(key) {
            callback(recorded);
            return;
        }
        let shared = self.shared.clone();
        let owned_key = key.clone();
        self.shared.source.act_upon(
            key,
            hint,
            Box::new(move |source| callback(shared.settle(&owned_key, source))),
        );
    }

    /// The recorded derived status of `key`. The source is not consulted.
    pub fn status(&self, key: &K) -> Option<AssetStatus> {
        self.shared.lock().get(key).map(Slot::status)
    }

    /// Drops the derived record of `key`. The source keeps its own.
    pub fn erase_record(&self, key: &K) {
        self.shared.erase_record(key);
    }

    /// Drops every derived record.
    pub fn clear(&self) {
        let slots = mem::take(&mut *self.shared.lock());
        for (key, slot) in slots {
            if let Slot::Ready(value) = slot {
                self.shared.deriver.clean(&key, value);
            }
        }
    }

    /// Number of recorded keys.
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A weak handle for registering this resolver as a dependent of its source.
    pub fn invalidation_target(&self) -> Weak<dyn Invalidate<K>> {
        let target: Arc<dyn Invalidate<K>> = self.shared.clone();
        Arc::downgrade(&target)
    }
}

impl<K: AssetKey, D: Deriver<K>> DerivedShared<K, D> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<D::Value>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn recorded(&self, key: &K) -> Option<Resolution<D::Value>> {
        self.lock().get(key).map(Slot::resolution)
    }

    fn settle(&self, key: &K, source: Resolution<D::Source>) -> Resolution<D::Value> {
        match source {
            Resolution::Pending => Resolution::Pending,
            Resolution::Missing => self.record(key, Slot::NoAsset),
            Resolution::Failed => self.record(key, Slot::Error),
            Resolution::Ready(value) => match self.deriver.derive(key, &value) {
                Ok(derived) => self.record(key, Slot::Ready(derived)),
                Err(err) => {
                    log::warn!("{}: failed to derive {:?}: {}", self.name, key, err);
                    self.record(key, Slot::Error)
                }
            },
        }
    }

    /// Stores `slot` unless a concurrent caller recorded the key first.
    fn record(&self, key: &K, slot: Slot<D::Value>) -> Resolution<D::Value> {
        let mut slots = self.lock();
        if let Some(existing) = slots.get(key).map(Slot::resolution) {
            drop(slots);
            if let Slot::Ready(value) = slot {
                self.deriver.clean(key, value);
            }
            return existing;
        }
        let resolution = slot.resolution();
        slots.insert(key.clone(), slot);
        resolution
    }

    fn erase_record(&self, key: &K) {
        let removed = self.lock().remove(key);
        if let Some(Slot::Ready(value)) = removed {
            self.deriver.clean(key, value);
        }
    }
}

impl<K: AssetKey, D: Deriver<K>> Invalidate<K> for DerivedShared<K, D> {
    fn invalidate(&self, key: &K) {
        log::debug!("{}: invalidating {:?}", self.name, key);
        self.erase_record(key);
    }
}

impl<K: AssetKey, D: Deriver<K>> Resolve<K, D::Value> for DerivedResolver<K, D> {
    fn get(&self, key: &K, hint: &TypeHint) -> Resolution<D::Value> {
        DerivedResolver::get(self, key, hint)
    }

    fn act_upon(&self, key: &K, hint: &TypeHint, callback: Callback<D::Value>) {
        DerivedResolver::act_upon(self, key, hint, callback)
    }

    fn status(&self, key: &K) -> Option<AssetStatus> {
        DerivedResolver::status(self, key)
    }

    fn erase_record(&self, key: &K) {
        DerivedResolver::erase_record(self, key)
    }

    fn clear(&self) {
        DerivedResolver::clear(self)
    }
}
