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


pub use crate::{
    common::{
        code::{Key, Payload},
        error::{Error, ErrorKind, Result},
        event::{EventKind, RemoveReason},
        ledger::{ClientLedger, ClientUsage},
        metrics::{
            registry::{atomic::AtomicMetricsRegistry, noop::NoopMetricsRegistry},
            RegistryOps,
        },
        object_pool::{PoolStats, Reset},
    },
    memory::{
        Cache, CacheBuilder, CacheConfig, CacheEntry, CacheEvent, CacheItem, CacheListener, CallbackInfo,
        CallbackKind, CancellationToken, DataFilter, DeliveryError, EvictionHint, ExpirationHint, ExpirationPolicy,
        FlagSet, GroupInfo, InsertOutcome, InsertResult, KeyBasedLockManager, Lifetime, LockAccessType, LockHandle,
        LockId, LockOutcome, LockedRead, MemoryStore, NodeMembership, Notifications, OperationCategory,
        OperationContext, Priority, QueryInfo, ReadOptions, ResyncProvider, ShutdownGate, ShutdownStatus,
        StandaloneMembership, StorageBackend, WriteOptions,
    },
};
#[cfg(feature = "prometheus")]
pub use crate::common::metrics::registry::prometheus::PrometheusMetricsRegistry;
