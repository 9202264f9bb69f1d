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

//! Memory and file-handle bounded caches over the backing store.
//!
//! - [`WholeFileBinaryCache`]: complete blobs, evicted by a decayed score.
//! - [`ChunkedStreamCache`]: chunk-granular reads of large sequential assets,
//!   one lazily opened handle per hot asset.

mod chunked_stream;
mod whole_file;

pub use chunked_stream::*;
pub use whole_file::*;
