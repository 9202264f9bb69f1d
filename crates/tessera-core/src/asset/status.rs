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

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one key inside a resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetStatus {
    /// A value is stored and returned.
    Return,
    /// Resolution is queued or in flight.
    Await,
    /// The backing store authoritatively does not have the key.
    NoAsset,
    /// Fetching or decoding failed. Retried only after explicit invalidation.
    Error,
}

impl AssetStatus {
    /// `Return`, `NoAsset` and `Error` are terminal; `Await` is not.
    pub fn is_terminal(self) -> bool {
        !matches!(self, AssetStatus::Await)
    }
}

/// How a transport classifies the response to one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Bytes were delivered.
    Ok,
    /// The store has no such key.
    NoAsset,
    /// The serving side failed.
    InternalError,
}

/// Opaque type hint travelling with a request, e.g. `"texture"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHint(String);

impl TypeHint {
    /// Creates a hint from any string.
    pub fn new(hint: impl Into<String>) -> Self {
        Self(hint.into())
    }

    /// The empty hint.
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Returns the hint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeHint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outcome of asking a resolver for a key.
///
/// A value exists only in the `Ready` variant, so "value present iff status is
/// `Return`" holds by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<V> {
    /// The value is available.
    Ready(V),
    /// Resolution is queued or in flight.
    Pending,
    /// Terminal: the key does not exist in the backing store.
    Missing,
    /// Terminal: fetching or decoding failed.
    Failed,
}

impl<V> Resolution<V> {
    /// The status code corresponding to this resolution.
    pub fn status(&self) -> AssetStatus {
        match self {
            Resolution::Ready(_) => AssetStatus::Return,
            Resolution::Pending => AssetStatus::Await,
            Resolution::Missing => AssetStatus::NoAsset,
            Resolution::Failed => AssetStatus::Error,
        }
    }

    /// Borrows the value, if any.
    pub fn value(&self) -> Option<&V> {
        match self {
            Resolution::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the resolution, returning the value if any.
    pub fn into_value(self) -> Option<V> {
        match self {
            Resolution::Ready(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tracks_value_presence() {
        let ready = Resolution::Ready(7u8);
        assert_eq!(ready.status(), AssetStatus::Return);
        assert_eq!(ready.value(), Some(&7));

        for negative in [Resolution::<u8>::Pending, Resolution::Missing, Resolution::Failed] {
            assert!(negative.value().is_none());
            assert_ne!(negative.status(), AssetStatus::Return);
        }
    }

    #[test]
    fn only_await_is_non_terminal() {
        assert!(!AssetStatus::Await.is_terminal());
        assert!(AssetStatus::Return.is_terminal());
        assert!(AssetStatus::NoAsset.is_terminal());
        assert!(AssetStatus::Error.is_terminal());
    }
}
