// Copyright 2026 coffer Project Authors
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

//! Shared components and utils for coffer.

/// Strict assertion macros.
pub mod assert;
/// Key and payload definitions.
pub mod code;
/// Error type and kinds shared by all coffer crates.
pub mod error;
/// Removal reasons and notification event kinds.
pub mod event;
/// Per-client request and byte counters.
pub mod ledger;
/// The metrics model and registries, i.e. the counters sink.
pub mod metrics;
/// Typed object pools with store and transactional tiers.
pub mod object_pool;
