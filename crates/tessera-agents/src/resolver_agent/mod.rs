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

//! Keyed asset resolution.
//!
//! A [`KeyedAssetResolver`] maps keys to parsed values. It owns the request
//! queue and the status of every key it has seen, and delegates the actual
//! fetching and decoding to a [`FetchStrategy`]. A [`DerivedResolver`] builds
//! values from another resolver without touching the transport.

mod dependents;
mod derived;
mod dispatch;
mod resolver;
mod strategy;

pub use dependents::*;
pub use derived::*;
pub use resolver::{Callback, KeyedAssetResolver, PulseReport, Resolve, ResolverStats};
pub use strategy::{
    Completion, Deferrer, FetchStrategy, NoValidation, ParseError, Parsed, Response, Validator,
};
