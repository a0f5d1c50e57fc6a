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
    backend::{InsertResult, MemoryStore, SharedEntry, StorageBackend},
    cache::{Cache, CacheBuilder, NodeMembership, ResyncProvider, StandaloneMembership},
    cascade::cascade,
    config::CacheConfig,
    context::{CancellationToken, FieldName, FieldValue, OperationContext, OperationId},
    entry::CacheEntry,
    eviction::{EvictionHint, Priority},
    expiration::{make_expiration_hint, ExpirationContext, ExpirationHint, ExpirationPolicy, HintBits, HintKind, Lifetime},
    flags::FlagSet,
    item::{CacheItem, InsertOutcome, LockedRead, ReadOptions, WriteOptions},
    key_lock::{GlobalLockGuard, KeyBasedLockManager, KeyLockGuard},
    listener::{CacheEvent, CacheListener, DeliveryError, NotificationDispatcher},
    lock::{LockAccessType, LockExpiration, LockHandle, LockId, LockIdGenerator, LockOutcome, LockState},
    metadata::{is_group_compatible, GroupInfo, QueryInfo},
    notification::{CallbackInfo, CallbackKind, DataFilter, Notifications},
    pool::PoolManager,
    shutdown::{OperationCategory, ShutdownGate, ShutdownStatus},
    version::{check_version, clock_version, initial_version, overwrite_version},
};
