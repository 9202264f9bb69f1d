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

//! # Tessera Lanes
//!
//! Hot-path execution pipelines of the serving side: the caches that sit
//! between an [`AssetIndex`](tessera_core::vfs::AssetIndex) plus a
//! [`BlobStore`](tessera_io::BlobStore) and the transport answering resolver
//! requests.

#![warn(missing_docs)]

pub mod cache_lane;

pub use cache_lane::*;
