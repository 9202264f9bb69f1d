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

//! The keyed get-or-fetch resolver.

use super::dependents::Invalidate;
use super::dispatch::DispatchQueue;
use super::strategy::{
    CompletionSink, Deferrer, FetchStrategy, NoValidation, Outcome, Parsed, Response, Validator,
};
use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tessera_core::asset::{AssetKey, AssetStatus, Resolution, ResponseKind, TypeHint};
use tessera_core::config::ResolverConfig;
use tessera_core::Clock;

/// A one-shot callback fired with the terminal resolution of a key.
pub type Callback<V> = Box<dyn FnOnce(Resolution<V>) + Send + 'static>;

/// The operations shared by every resolver flavour.
pub trait Resolve<K, V>: Send + Sync {
    /// Returns the current resolution, requesting the key when it is unknown.
    fn get(&self, key: &K, hint: &TypeHint) -> Resolution<V>;

    /// Like `get`, but reports the terminal resolution through `callback`.
    fn act_upon(&self, key: &K, hint: &TypeHint, callback: Callback<V>);

    /// The recorded status of `key`, if any.
    fn status(&self, key: &K) -> Option<AssetStatus>;

    /// Forgets everything recorded for `key`.
    fn erase_record(&self, key: &K);

    /// Forgets everything.
    fn clear(&self);
}

/// Recorded state of one key. Only `Ready` carries a value.
#[derive(Debug)]
pub(crate) enum Slot<V> {
    Ready(V),
    Await,
    NoAsset,
    Error,
}

impl<V: Clone> Slot<V> {
    pub(crate) fn status(&self) -> AssetStatus {
        match self {
            Slot::Ready(_) => AssetStatus::Return,
            Slot::Await => AssetStatus::Await,
            Slot::NoAsset => AssetStatus::NoAsset,
            Slot::Error => AssetStatus::Error,
        }
    }

    pub(crate) fn resolution(&self) -> Resolution<V> {
        match self {
            Slot::Ready(v) => Resolution::Ready(v.clone()),
            Slot::Await => Resolution::Pending,
            Slot::NoAsset => Resolution::Missing,
            Slot::Error => Resolution::Failed,
        }
    }
}

/// Counters describing a resolver at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Keys holding a value.
    pub ready: usize,
    /// Keys queued or in flight.
    pub awaiting: usize,
    /// Keys recorded as `NoAsset`.
    pub missing: usize,
    /// Keys recorded as `Error`.
    pub failed: usize,
    /// Requests waiting for dispatch.
    pub queued: usize,
    /// Requests dispatched and not answered yet.
    pub in_flight: usize,
    /// Requests dispatched since creation or the last `clear`.
    pub dispatched: u64,
}

/// What a call to [`KeyedAssetResolver::pulse`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseReport {
    /// Timed-out requests moved back into the queue.
    pub requeued: usize,
    /// Whether a request was dispatched.
    pub dispatched: bool,
}

struct State<K, V> {
    slots: HashMap<K, Slot<V>>,
    callbacks: HashMap<K, Vec<Callback<V>>>,
    queue: DispatchQueue<K>,
    /// Bumped by `clear`; deferred completions from an older epoch are dropped.
    epoch: u64,
}

struct Shared<K, V, S, Va> {
    name: String,
    strategy: S,
    validator: Va,
    clock: Arc<dyn Clock>,
    config: ResolverConfig,
    state: Mutex<State<K, V>>,
}

/// A keyed, asynchronous get-or-fetch cache of parsed values.
///
/// `get` never blocks on I/O: unknown keys are queued, handed to the
/// [`FetchStrategy`] one at a time, and resolved when the transport calls
/// [`receive`](Self::receive). Terminal outcomes, including negative ones, are
/// remembered until [`erase_record`](Self::erase_record) or
/// [`clear`](Self::clear).
///
/// The resolver is a cheap handle; clones share the same state.
pub struct KeyedAssetResolver<K, V, S, Va = NoValidation> {
    shared: Arc<Shared<K, V, S, Va>>,
}

impl<K, V, S, Va> Clone for KeyedAssetResolver<K, V, S, Va> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K, V, S> KeyedAssetResolver<K, V, S, NoValidation>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
{
    /// Creates a resolver without hit validation.
    pub fn new(
        name: impl Into<String>,
        strategy: S,
        clock: Arc<dyn Clock>,
        config: ResolverConfig,
    ) -> Self {
        Self::with_validator(name, strategy, NoValidation, clock, config)
    }
}

impl<K, V, S, Va> KeyedAssetResolver<K, V, S, Va>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
    Va: Validator<K, V>,
{
    /// Creates a resolver that runs `validator` on every hit.
    pub fn with_validator(
        name: impl Into<String>,
        strategy: S,
        validator: Va,
        clock: Arc<dyn Clock>,
        config: ResolverConfig,
    ) -> Self {
        let now = clock.now();
        let state = State {
            slots: HashMap::new(),
            callbacks: HashMap::new(),
            queue: DispatchQueue::new(&config, now),
            epoch: 0,
        };
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                strategy,
                validator,
                clock,
                config,
                state: Mutex::new(state),
            }),
        }
    }

    /// The strategy this resolver fetches through.
    pub fn strategy(&self) -> &S {
        &self.shared.strategy
    }

    /// Returns the current resolution of `key`.
    ///
    /// An unknown key is marked `Await`, queued, and one queued request is
    /// dispatched. Asking again while it is pending does not queue it twice.
    pub fn get(&self, key: &K, hint: &TypeHint) -> Resolution<V> {
        let next = {
            let mut state = self.shared.lock();
            if let Some(hit) = self.shared.lookup(&mut state, key, hint) {
                return hit;
            }
            self.shared.enqueue(&mut state, key, hint)
        };
        self.shared.send(next);
        Resolution::Pending
    }

    /// Calls `callback` with the terminal resolution of `key`.
    ///
    /// Fires immediately on the calling thread when the key is already
    /// terminal. Otherwise the callback is queued behind earlier ones for the
    /// same key and fires once, in registration order.
    pub fn act_upon<F>(&self, key: &K, hint: &TypeHint, callback: F)
    where
        F: FnOnce(Resolution<V>) + Send + 'static,
    {
        let next = {
            let mut state = self.shared.lock();
            match self.shared.lookup(&mut state, key, hint) {
                Some(Resolution::Pending) => {
                    state
                        .callbacks
                        .entry(key.clone())
                        .or_default()
                        .push(Box::new(callback));
                    return;
                }
                Some(terminal) => {
                    drop(state);
                    callback(terminal);
                    return;
                }
                None => {
                    state
                        .callbacks
                        .entry(key.clone())
                        .or_default()
                        .push(Box::new(callback));
                    self.shared.enqueue(&mut state, key, hint)
                }
            }
        };
        self.shared.send(next);
    }

    /// Delivers the transport's answer for `key`.
    ///
    /// Negative kinds resolve directly. `Ok` responses go through the
    /// strategy's prefilter and parser; errors and panics in either resolve
    /// the key to `Error`. A panicking callback is logged and the remaining
    /// callbacks still fire. Afterwards one more queued request is dispatched.
    pub fn receive(&self, key: K, response: Response) {
        self.shared.receive(key, response);
    }

    /// Watchdog tick.
    ///
    /// Re-queues timed-out requests when a timeout is configured, then
    /// dispatches the queue head if nothing was dispatched for a full
    /// watchdog interval. The watchdog ignores `max_in_flight`.
    pub fn pulse(&self) -> PulseReport {
        let now = self.shared.clock.now();
        let (report, next) = {
            let mut state = self.shared.lock();
            let requeued = state.queue.requeue_stale(now);
            let next = if state.queue.watchdog_due(now) {
                state.queue.next_forced(now)
            } else if requeued > 0 {
                state.queue.next(now)
            } else {
                None
            };
            (
                PulseReport {
                    requeued,
                    dispatched: next.is_some(),
                },
                next,
            )
        };
        if report.requeued > 0 {
            log::warn!(
                "{}: {} request(s) timed out and were re-queued",
                self.shared.name,
                report.requeued
            );
        }
        if report.dispatched {
            log::debug!("{}: watchdog dispatch", self.shared.name);
        }
        self.shared.send(next);
        report
    }

    /// The recorded status of `key`.
    pub fn status(&self, key: &K) -> Option<AssetStatus> {
        self.shared.lock().slots.get(key).map(Slot::status)
    }

    /// Drops the value and status of `key`, removes it from the queue and
    /// cascades to dependents. Callbacks still waiting on the key stay
    /// registered.
    pub fn erase_record(&self, key: &K) {
        self.shared.erase_record(key);
    }

    /// Drops every value, status, queued request and waiting callback.
    /// Dropped callbacks are not invoked.
    pub fn clear(&self) {
        let now = self.shared.clock.now();
        let (slots, callbacks) = {
            let mut state = self.shared.lock();
            state.queue = DispatchQueue::new(&self.shared.config, now);
            state.epoch += 1;
            (
                mem::take(&mut state.slots),
                mem::take(&mut state.callbacks),
            )
        };
        drop(callbacks);
        let mut cleaned = 0usize;
        for (key, slot) in slots {
            if let Slot::Ready(value) = slot {
                self.shared.strategy.clean(&key, value);
                cleaned += 1;
            }
        }
        log::debug!("{}: cleared, {} value(s) released", self.shared.name, cleaned);
    }

    /// Counters for observability.
    pub fn stats(&self) -> ResolverStats {
        let state = self.shared.lock();
        let mut stats = ResolverStats {
            queued: state.queue.pending_len(),
            in_flight: state.queue.in_flight_len(),
            dispatched: state.queue.dispatched(),
            ..ResolverStats::default()
        };
        for slot in state.slots.values() {
            match slot {
                Slot::Ready(_) => stats.ready += 1,
                Slot::Await => stats.awaiting += 1,
                Slot::NoAsset => stats.missing += 1,
                Slot::Error => stats.failed += 1,
            }
        }
        stats
    }

    /// A weak handle through which a strategy's `erase_dependents` can
    /// invalidate this resolver.
    pub fn invalidation_target(&self) -> Weak<dyn Invalidate<K>> {
        let target: Arc<dyn Invalidate<K>> = self.shared.clone();
        Arc::downgrade(&target)
    }
}

impl<K, V, S, Va> Shared<K, V, S, Va>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
    Va: Validator<K, V>,
{
    fn lock(&self) -> MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answers from recorded state, validating hits. `None` for unknown keys.
    ///
    /// Runs with the state lock held.
    fn lookup(&self, state: &mut State<K, V>, key: &K, hint: &TypeHint) -> Option<Resolution<V>> {
        match state.slots.get_mut(key)? {
            Slot::Ready(value) => {
                self.validator.validate(key, hint, value);
                Some(Resolution::Ready(value.clone()))
            }
            slot => Some(slot.resolution()),
        }
    }

    /// Marks `key` as awaiting, queues it and pops one request to send.
    fn enqueue(
        &self,
        state: &mut State<K, V>,
        key: &K,
        hint: &TypeHint,
    ) -> Option<(K, TypeHint)> {
        state.slots.insert(key.clone(), Slot::Await);
        state.queue.enqueue(key.clone(), hint.clone());
        state.queue.next(self.clock.now())
    }

    fn send(&self, next: Option<(K, TypeHint)>) {
        if let Some((key, hint)) = next {
            log::debug!("{}: requesting {:?} ({})", self.name, key, hint);
            self.strategy.request(&key, &hint);
        }
    }

    fn dispatch_next(&self) {
        let next = {
            let mut state = self.lock();
            state.queue.next(self.clock.now())
        };
        self.send(next);
    }

    fn receive(self: &Arc<Self>, key: K, response: Response) {
        let epoch = {
            let mut state = self.lock();
            state.queue.complete(&key);
            // A timed-out request may have been queued again; this answer covers it.
            state.queue.remove_pending(&key);
            state.epoch
        };
        let settled = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(outcome) = self.classify(&key, epoch, response) {
                self.settle(key, None, outcome);
            }
        }));
        self.dispatch_next();
        if let Err(payload) = settled {
            panic::resume_unwind(payload);
        }
    }

    fn classify(self: &Arc<Self>, key: &K, epoch: u64, response: Response) -> Option<Outcome<V>> {
        match response.kind {
            ResponseKind::NoAsset => return Some(Outcome::Missing),
            ResponseKind::InternalError => {
                log::warn!("{}: transport reported an error for {:?}", self.name, key);
                return Some(Outcome::Failed);
            }
            ResponseKind::Ok => {}
        }

        let prefiltered =
            panic::catch_unwind(AssertUnwindSafe(|| self.strategy.prefilter(key, &response)));
        let prefiltered = match prefiltered {
            Ok(status) => status,
            Err(_) => {
                log::error!("{}: prefilter panicked on {:?}", self.name, key);
                return Some(Outcome::Failed);
            }
        };
        if let Some(status) = prefiltered {
            return Some(match status {
                AssetStatus::NoAsset => Outcome::Missing,
                AssetStatus::Error => Outcome::Failed,
                other => {
                    log::warn!(
                        "{}: prefilter returned {:?} for {:?}, treating as error",
                        self.name,
                        other,
                        key
                    );
                    Outcome::Failed
                }
            });
        }

        let sink: Arc<dyn CompletionSink<K, V>> = self.clone();
        let deferrer = Deferrer::new(key.clone(), epoch, Arc::downgrade(&sink));
        let parsed = panic::catch_unwind(AssertUnwindSafe(|| {
            self.strategy.parse(key, response, &deferrer)
        }));
        match parsed {
            Ok(Ok(Parsed::Deferred)) if deferrer.was_taken() => None,
            Ok(Ok(Parsed::Deferred)) => {
                log::warn!(
                    "{}: parser deferred {:?} without taking a completion",
                    self.name,
                    key
                );
                Some(Outcome::Failed)
            }
            Ok(Ok(parsed)) => {
                deferrer.disarm();
                Some(parsed.into())
            }
            Ok(Err(err)) => {
                deferrer.disarm();
                log::warn!("{}: failed to parse {:?}: {}", self.name, key, err);
                Some(Outcome::Failed)
            }
            Err(_) => {
                deferrer.disarm();
                log::error!("{}: parser panicked on {:?}", self.name, key);
                Some(Outcome::Failed)
            }
        }
    }

    /// Records the terminal outcome and fires waiting callbacks.
    ///
    /// With `epoch` set, the outcome is dropped if `clear` ran since the
    /// request was parsed.
    fn settle(&self, key: K, epoch: Option<u64>, outcome: Outcome<V>) {
        let (resolution, replaced, callbacks) = {
            let mut state = self.lock();
            if epoch.is_some_and(|e| e != state.epoch) {
                drop(state);
                log::debug!("{}: dropping stale completion for {:?}", self.name, key);
                if let Outcome::Ready(value) = outcome {
                    self.strategy.clean(&key, value);
                }
                return;
            }
            let (slot, resolution) = match outcome {
                Outcome::Ready(value) => (Slot::Ready(value.clone()), Resolution::Ready(value)),
                Outcome::Missing => (Slot::NoAsset, Resolution::Missing),
                Outcome::Failed => (Slot::Error, Resolution::Failed),
            };
            let replaced = state.slots.insert(key.clone(), slot);
            let callbacks = state.callbacks.remove(&key).unwrap_or_default();
            (resolution, replaced, callbacks)
        };

        if let Some(Slot::Ready(old)) = replaced {
            self.strategy.clean(&key, old);
        }
        log::debug!(
            "{}: {:?} resolved as {:?}, {} callback(s)",
            self.name,
            key,
            resolution.status(),
            callbacks.len()
        );
        for callback in callbacks {
            let resolution = resolution.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| callback(resolution))).is_err() {
                log::error!("{}: a callback for {:?} panicked", self.name, key);
            }
        }
    }

    fn erase_record(&self, key: &K) {
        let removed = {
            let mut state = self.lock();
            state.queue.remove_pending(key);
            state.slots.remove(key)
        };
        if let Some(Slot::Ready(value)) = removed {
            self.strategy.clean(key, value);
        }
        self.strategy.erase_dependents(key);
    }
}

impl<K, V, S, Va> CompletionSink<K, V> for Shared<K, V, S, Va>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
    Va: Validator<K, V>,
{
    fn complete_deferred(&self, key: K, epoch: u64, outcome: Outcome<V>) {
        self.settle(key, Some(epoch), outcome);
    }
}

impl<K, V, S, Va> Invalidate<K> for Shared<K, V, S, Va>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
    Va: Validator<K, V>,
{
    fn invalidate(&self, key: &K) {
        self.erase_record(key);
    }
}

impl<K, V, S, Va> Resolve<K, V> for KeyedAssetResolver<K, V, S, Va>
where
    K: AssetKey,
    V: Clone + Send + 'static,
    S: FetchStrategy<K, V>,
    Va: Validator<K, V>,
{
    fn get(&self, key: &K, hint: &TypeHint) -> Resolution<V> {
        KeyedAssetResolver::get(self, key, hint)
    }

    fn act_upon(&self, key: &K, hint: &TypeHint, callback: Callback<V>) {
        KeyedAssetResolver::act_upon(self, key, hint, callback)
    }

    fn status(&self, key: &K) -> Option<AssetStatus> {
        KeyedAssetResolver::status(self, key)
    }

    fn erase_record(&self, key: &K) {
        KeyedAssetResolver::erase_record(self, key)
    }

    fn clear(&self) {
        KeyedAssetResolver::clear(self)
    }
}
