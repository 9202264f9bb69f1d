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

//! FIFO request queue with in-flight bookkeeping and watchdog pacing.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};
use tessera_core::asset::TypeHint;
use tessera_core::config::ResolverConfig;

#[derive(Debug)]
struct InFlight {
    hint: TypeHint,
    since: Instant,
}

/// Requests waiting to be sent, and those already sent but unanswered.
///
/// Every trigger pops at most one key. The queue is a pacing device, not a
/// limiter, unless `max_in_flight` is configured.
#[derive(Debug)]
pub(crate) struct DispatchQueue<K> {
    pending: VecDeque<(K, TypeHint)>,
    in_flight: HashMap<K, InFlight>,
    last_dispatch: Instant,
    dispatched: u64,
    watchdog: Duration,
    max_in_flight: Option<usize>,
    in_flight_timeout: Option<Duration>,
}

impl<K: Clone + Eq + Hash> DispatchQueue<K> {
    pub(crate) fn new(config: &ResolverConfig, now: Instant) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
            last_dispatch: now,
            dispatched: 0,
            watchdog: config.watchdog_interval(),
            max_in_flight: config.max_in_flight,
            in_flight_timeout: config.in_flight_timeout(),
        }
    }

    pub(crate) fn enqueue(&mut self, key: K, hint: TypeHint) {
        self.pending.push_back((key, hint));
    }

    /// Pops the oldest pending key, unless the in-flight bound is reached.
    pub(crate) fn next(&mut self, now: Instant) -> Option<(K, TypeHint)> {
        if self
            .max_in_flight
            .is_some_and(|max| self.in_flight.len() >= max)
        {
            return None;
        }
        self.pop(now)
    }

    /// Pops the oldest pending key regardless of the in-flight bound.
    pub(crate) fn next_forced(&mut self, now: Instant) -> Option<(K, TypeHint)> {
        self.pop(now)
    }

    fn pop(&mut self, now: Instant) -> Option<(K, TypeHint)> {
        let (key, hint) = self.pending.pop_front()?;
        self.in_flight.insert(
            key.clone(),
            InFlight {
                hint: hint.clone(),
                since: now,
            },
        );
        self.last_dispatch = now;
        self.dispatched += 1;
        Some((key, hint))
    }

    /// Marks the response for `key` as delivered.
    pub(crate) fn complete(&mut self, key: &K) {
        self.in_flight.remove(key);
    }

    /// Drops a key that has not been dispatched yet.
    pub(crate) fn remove_pending(&mut self, key: &K) {
        self.pending.retain(|(k, _)| k != key);
    }

    /// True when work is waiting and nothing was dispatched for a full interval.
    pub(crate) fn watchdog_due(&self, now: Instant) -> bool {
        !self.pending.is_empty() && now.saturating_duration_since(self.last_dispatch) >= self.watchdog
    }

    /// Moves requests unanswered for longer than the timeout back to the end
    /// of the queue. Returns how many were moved.
    pub(crate) fn requeue_stale(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.in_flight_timeout else {
            return 0;
        };
        let mut stale: Vec<(K, InFlight)> = Vec::new();
        self.in_flight.retain(|key, flight| {
            if now.saturating_duration_since(flight.since) > timeout {
                stale.push((key.clone(), InFlight {
                    hint: flight.hint.clone(),
                    since: flight.since,
                }));
                false
            } else {
                true
            }
        });
        // Oldest first, so the re-sent order follows the original one.
        stale.sort_by_key(|(_, flight)| flight.since);
        let moved = stale.len();
        for (key, flight) in stale {
            self.pending.push_back((key, flight.hint));
        }
        moved
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn dispatched(&self) -> u64 {
        self.dispatched
    }
}
