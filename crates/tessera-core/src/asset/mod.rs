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

//! Provides the foundational traits and primitive types for Tessera's asset system.
//!
//! This module defines the "common language" for all asset-related operations.
//! It contains the contracts that the storage, cache and resolver crates implement
//! or use, but it has no knowledge of how assets are fetched or cached.
//!
//! The key components are:
//! - The [`Asset`] trait: A marker for all types that can be treated as decoded assets.
//! - [`AssetUUID`] and [`AssetKey`]: stable identifiers used to address assets.
//! - [`AssetMetadata`]: the locator describing where an asset's bytes live.
//! - [`AssetStatus`] and [`ResponseKind`]: the resolution vocabulary.
//! - [`Envelope`]: the small binary header prefixed to every fetched payload.

mod envelope;
mod handle;
mod metadata;
mod status;
mod uuid;

pub use envelope::*;
pub use handle::*;
pub use metadata::*;
pub use status::*;
pub use uuid::*;

use std::fmt::Debug;
use std::hash::Hash;

/// A marker trait for types that can be managed by the asset system.
///
/// The supertraits enforce that decoded assets can be shared across the
/// threads that deliver responses and the threads that consume values.
///
/// # Examples
///
/// ```
/// use tessera_core::asset::Asset;
///
/// struct Portrait {
///     // ... fields
/// }
///
/// impl Asset for Portrait {}
/// ```
pub trait Asset: Send + Sync + 'static {}

/// Anything usable as a resolver key.
///
/// Implemented automatically for every type satisfying the bounds, so
/// `AssetUUID`, `String` and plain integers all work out of the box.
pub trait AssetKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> AssetKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
