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

use std::sync::{RwLock, Weak};

/// Something whose record for a key can be invalidated.
pub trait Invalidate<K>: Send + Sync {
    /// Drops whatever is recorded for `key`.
    fn invalidate(&self, key: &K);
}

/// Resolvers whose records derive from another resolver's values.
///
/// A [`FetchStrategy`](super::FetchStrategy) owns one of these and forwards
/// `erase_dependents` to [`Dependents::erase`]. Targets are held weakly, so
/// registering a resolver built on top of the owner does not form a cycle.
pub struct Dependents<K> {
    targets: RwLock<Vec<Weak<dyn Invalidate<K>>>>,
}

impl<K> Default for Dependents<K> {
    fn default() -> Self {
        Self {
            targets: RwLock::new(Vec::new()),
        }
    }
}

impl<K> Dependents<K> {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependent.
    pub fn register(&self, target: Weak<dyn Invalidate<K>>) {
        self.targets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(target);
    }

    /// Invalidates `key` in every live dependent and forgets dead ones.
    /// Returns how many dependents were reached.
    pub fn erase(&self, key: &K) -> usize {
        let live: Vec<_> = {
            let mut targets = self.targets.write().unwrap_or_else(|e| e.into_inner());
            targets.retain(|t| t.strong_count() > 0);
            targets.iter().filter_map(Weak::upgrade).collect()
        };
        for target in &live {
            target.invalidate(key);
        }
        live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u8>>);

    impl Invalidate<u8> for Recorder {
        fn invalidate(&self, key: &u8) {
            self.0.lock().unwrap().push(*key);
        }
    }

    #[test]
    fn reaches_live_targets_and_prunes_dead_ones() {
        let dependents = Dependents::new();
        let kept = Arc::new(Recorder::default());
        let kept_dyn: Arc<dyn Invalidate<u8>> = kept.clone();
        dependents.register(Arc::downgrade(&kept_dyn));
        {
            let gone: Arc<dyn Invalidate<u8>> = Arc::new(Recorder::default());
            dependents.register(Arc::downgrade(&gone));
        }

        assert_eq!(dependents.erase(&4), 1);
        assert_eq!(*kept.0.lock().unwrap(), vec![4]);
    }
}
