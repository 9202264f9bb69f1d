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

//! I/O services for asset reads and index building.
//!
//! - [`store`]: the [`BlobStore`] contract and its filesystem implementation.
//! - [`index_builder`]: the startup scan producing the asset index.

#![warn(missing_docs)]

pub mod index_builder;
pub mod store;

pub use index_builder::{probe_wav, write_index, IndexBuilder};
pub use store::{AssetStream, BlobStore, FsBlobStore, PackWindow};
