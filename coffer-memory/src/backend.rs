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

//! Storage backend seam and the in-memory store.

use std::{
    fmt::Debug,
    hash::{BuildHasher, RandomState},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use coffer_common::{
    code::Key,
    error::Result,
    object_pool::StoreLease,
};
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};

use crate::{context::OperationContext, entry::CacheEntry, shutdown::OperationCategory};

/// An entry owned by the store, guarded by its own mutex.
pub type SharedEntry = Arc<Mutex<CacheEntry>>;

/// Store level outcome of an insert.
#[derive(Debug)]
pub enum InsertResult {
    /// A new entry was stored.
    Success,
    /// An existing entry was replaced; it is handed back.
    SuccessOverwrite(SharedEntry),
    /// Nothing changed.
    Failure,
    /// The store is full and could not make room.
    NeedsEviction,
}

/// Storage consumed by the cache facade.
///
/// Implementations are called with the per-key lock of every key involved held, except for [`StorageBackend::clear`]
/// which runs under the global lock. They must not call back into the cache.
pub trait StorageBackend: Send + Sync + 'static + Debug {
    /// Look up `key`.
    fn get(&self, key: &str, ctx: &OperationContext) -> Result<Option<SharedEntry>>;

    /// Store `entry` under `key`.
    ///
    /// On success the lease is detached and the store owns the entry. Otherwise dropping the lease returns the
    /// entry to its pool.
    fn insert(&self, key: Key, entry: StoreLease<CacheEntry>, ctx: &OperationContext) -> Result<InsertResult>;

    /// Remove `key`, handing back the removed entry.
    fn remove(&self, key: &str, ctx: &OperationContext) -> Result<Option<SharedEntry>>;

    /// Remove everything, handing back the removed entries.
    fn clear(&self, ctx: &OperationContext) -> Result<Vec<SharedEntry>>;

    /// If `key` is stored.
    fn contains(&self, key: &str) -> bool;

    /// Number of stored entries.
    fn count(&self) -> usize;

    /// Snapshot of the stored keys.
    fn keys(&self) -> Vec<Key>;

    /// Keys whose expiration depends on `key`.
    fn dependents_of(&self, key: &str) -> Vec<Key>;

    /// If an operation of `category` on `keys` may proceed while a graceful shutdown drains the node.
    fn is_operation_allowed(&self, keys: &[Key], category: OperationCategory, ctx: &OperationContext) -> bool {
        let _ = (keys, category, ctx);
        false
    }
}

#[derive(Debug)]
struct Slot {
    entry: SharedEntry,
    depends_on: Vec<Key>,
}

/// Sharded in-memory [`StorageBackend`] with an index of key dependencies.
pub struct MemoryStore {
    shards: Vec<RwLock<HashMap<Key, Slot>>>,
    /// dependee -> dependents
    dependents: Mutex<HashMap<Key, HashSet<Key>>>,
    hash_builder: RandomState,
    capacity: usize,
    count: AtomicUsize,
}

impl Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("shards", &self.shards.len())
            .field("capacity", &self.capacity)
            .field("count", &self.count())
            .finish()
    }
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries, split into `shards` shards.
    pub fn new(capacity: usize, shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            dependents: Mutex::new(HashMap::new()),
            hash_builder: RandomState::new(),
            capacity,
            count: AtomicUsize::new(0),
        }
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<Key, Slot>> {
        let hash = self.hash_builder.hash_one(key);
        &self.shards[hash as usize % self.shards.len()]
    }

    fn index(&self, key: &Key, depends_on: &[Key]) {
        if depends_on.is_empty() {
            return;
        }
        let mut dependents = self.dependents.lock();
        for dependee in depends_on {
            dependents.entry(dependee.clone()).or_default().insert(key.clone());
        }
    }

    fn unindex(&self, key: &str, depends_on: &[Key]) {
        if depends_on.is_empty() {
            return;
        }
        let mut dependents = self.dependents.lock();
        for dependee in depends_on {
            if let Some(set) = dependents.get_mut(dependee) {
                set.remove(key);
                if set.is_empty() {
                    dependents.remove(dependee);
                }
            }
        }
    }
}

impl StorageBackend for MemoryStore {
    fn get(&self, key: &str, _: &OperationContext) -> Result<Option<SharedEntry>> {
        Ok(self.shard(key).read().get(key).map(|slot| slot.entry.clone()))
    }

    fn insert(&self, key: Key, entry: StoreLease<CacheEntry>, _: &OperationContext) -> Result<InsertResult> {
        if entry.value().is_none() {
            return Ok(InsertResult::Failure);
        }
        let depends_on = entry.key_dependencies();

        let old = {
            let mut shard = self.shard(&key).write();
            if !shard.contains_key(&key) {
                // Reserve room first so concurrent inserts on other shards cannot overshoot the capacity.
                let reserved = self
                    .count
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                        (count < self.capacity).then_some(count + 1)
                    });
                if reserved.is_err() {
                    return Ok(InsertResult::NeedsEviction);
                }
            }
            let slot = Slot {
                entry: Arc::new(Mutex::new(entry.detach())),
                depends_on: depends_on.clone(),
            };
            shard.insert(key.clone(), slot)
        };

        if let Some(old) = old.as_ref() {
            self.unindex(&key, &old.depends_on);
        }
        self.index(&key, &depends_on);

        Ok(match old {
            Some(old) => InsertResult::SuccessOverwrite(old.entry),
            None => InsertResult::Success,
        })
    }

    fn remove(&self, key: &str, _: &OperationContext) -> Result<Option<SharedEntry>> {
        let Some(slot) = self.shard(key).write().remove(key) else {
            return Ok(None);
        };
        self.count.fetch_sub(1, Ordering::AcqRel);
        self.unindex(key, &slot.depends_on);
        Ok(Some(slot.entry))
    }

    fn clear(&self, _: &OperationContext) -> Result<Vec<SharedEntry>> {
        let mut removed = vec![];
        for shard in self.shards.iter() {
            removed.extend(shard.write().drain().map(|(_, slot)| slot.entry));
        }
        self.count.fetch_sub(removed.len(), Ordering::AcqRel);
        self.dependents.lock().clear();
        Ok(removed)
    }

    fn contains(&self, key: &str) -> bool {
        self.shard(key).read().contains_key(key)
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn keys(&self) -> Vec<Key> {
        self.shards
            .iter()
            .flat_map(|shard| shard.read().keys().cloned().collect_vec())
            .collect()
    }

    fn dependents_of(&self, key: &str) -> Vec<Key> {
        self.dependents
            .lock()
            .get(key)
            .map(|set| set.iter().cloned().sorted().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use coffer_common::{code::Payload, metrics::model::Metrics, object_pool::StorePool};

    use super::*;
    use crate::expiration::ExpirationHint;

    fn pool() -> StorePool<CacheEntry> {
        StorePool::new("entries", 4, 16, Arc::new(Metrics::noop()))
    }

    fn lease(pool: &StorePool<CacheEntry>, value: &'static [u8], version: u64) -> StoreLease<CacheEntry> {
        let mut entry = pool.acquire();
        entry.set_value(Some(Payload::from(value)));
        entry.set_version(version);
        entry
    }

    fn key(s: &str) -> Key {
        s.into()
    }

    #[test]
    fn test_insert_overwrite_remove() {
        let pool = pool();
        let store = MemoryStore::new(16, 4);
        let ctx = OperationContext::new();

        assert!(matches!(
            store.insert(key("k"), lease(&pool, b"v1", 1), &ctx).unwrap(),
            InsertResult::Success
        ));
        let old = match store.insert(key("k"), lease(&pool, b"v2", 2), &ctx).unwrap() {
            InsertResult::SuccessOverwrite(old) => old,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(old.lock().version(), 1);
        assert_eq!(store.count(), 1);
        assert_eq!(store.get("k", &ctx).unwrap().unwrap().lock().version(), 2);

        assert!(store.remove("k", &ctx).unwrap().is_some());
        assert!(store.remove("k", &ctx).unwrap().is_none());
        assert_eq!(store.count(), 0);

        let stats = pool.stats();
        assert_eq!(stats.detached, 2);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_full_store_returns_lease() {
        let pool = pool();
        let store = MemoryStore::new(1, 2);
        let ctx = OperationContext::new();

        store.insert(key("a"), lease(&pool, b"a", 1), &ctx).unwrap();
        assert!(matches!(
            store.insert(key("b"), lease(&pool, b"b", 1), &ctx).unwrap(),
            InsertResult::NeedsEviction
        ));
        // Overwrites need no room.
        assert!(matches!(
            store.insert(key("a"), lease(&pool, b"a", 2), &ctx).unwrap(),
            InsertResult::SuccessOverwrite(_)
        ));
        assert!(matches!(
            store.insert(key("c"), pool.acquire(), &ctx).unwrap(),
            InsertResult::Failure
        ));

        let stats = pool.stats();
        assert_eq!(stats.rented, 4);
        assert_eq!(stats.detached, 2);
        assert_eq!(stats.returned, 2);
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_dependency_index() {
        let pool = pool();
        let store = MemoryStore::new(16, 4);
        let ctx = OperationContext::new();

        let mut dependent = lease(&pool, b"d", 1);
        dependent.set_expiration(Some(ExpirationHint::aggregate([
            ExpirationHint::ttl(Duration::from_secs(60), Utc::now()),
            ExpirationHint::key_dependency([key("a"), key("b")]),
        ])));
        store.insert(key("d"), dependent, &ctx).unwrap();
        assert_eq!(store.dependents_of("a"), vec![key("d")]);
        assert_eq!(store.dependents_of("b"), vec![key("d")]);

        let mut rewired = lease(&pool, b"d", 2);
        rewired.set_expiration(Some(ExpirationHint::key_dependency([key("b")])));
        store.insert(key("d"), rewired, &ctx).unwrap();
        assert!(store.dependents_of("a").is_empty());
        assert_eq!(store.dependents_of("b"), vec![key("d")]);

        store.remove("d", &ctx).unwrap();
        assert!(store.dependents_of("b").is_empty());
    }

    #[test]
    fn test_clear() {
        let pool = pool();
        let store = MemoryStore::new(16, 4);
        let ctx = OperationContext::new();
        for k in ["a", "b", "c"] {
            store.insert(key(k), lease(&pool, b"v", 1), &ctx).unwrap();
        }
        assert_eq!(store.keys().into_iter().sorted().collect_vec(), vec![key("a"), key("b"), key("c")]);
        assert_eq!(store.clear(&ctx).unwrap().len(), 3);
        assert_eq!(store.count(), 0);
        assert!(store.keys().is_empty());
        assert!(!store.is_operation_allowed(&[key("a")], OperationCategory::AtomicRead, &ctx));
    }
}
