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


//! Entry model and concurrency core for coffer.
//!
//! The crate holds the per-entry state machine ([`CacheEntry`] with its expiration, eviction, lock, version and
//! notification metadata), the concurrency primitives around it ([`KeyBasedLockManager`], [`ShutdownGate`],
//! [`PoolManager`]) and the [`Cache`] facade tying them to a [`StorageBackend`].

/// Backend storage of cache entries.
pub mod backend;
/// The cache facade and its builder.
pub mod cache;
/// Removal of entries depending on removed keys.
pub mod cascade;
/// Cache settings.
pub mod config;
/// Per-operation context.
pub mod context;
/// The cache entry.
pub mod entry;
/// Eviction hints.
pub mod eviction;
/// Expiration hints and policies.
pub mod expiration;
/// Entry flags.
pub mod flags;
/// Caller-facing item and option types.
pub mod item;
/// Per-key mutual exclusion.
pub mod key_lock;
/// Event listeners and their dispatcher.
pub mod listener;
/// Item lock state.
pub mod lock;
/// Group and query metadata.
pub mod metadata;
/// Per-entry notification registrations.
pub mod notification;
/// Pools of entries and contexts.
pub mod pool;
/// Graceful shutdown gate.
pub mod shutdown;
/// Item versioning.
pub mod version;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
