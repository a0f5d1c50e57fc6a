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

use std::{
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use coffer_common::{
    code::{Key, Payload},
    error::{Error, ErrorKind, Result},
    event::{EventKind, RemoveReason},
    ledger::ClientLedger,
    metrics::{model::Metrics, registry::noop::NoopMetricsRegistry, BoxedRegistry, RegistryOps},
    object_pool::PoolStats,
};
use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    backend::{InsertResult, MemoryStore, SharedEntry, StorageBackend},
    cascade::cascade,
    config::CacheConfig,
    context::OperationContext,
    entry::CacheEntry,
    expiration::{make_expiration_hint, ExpirationContext},
    item::{CacheItem, InsertOutcome, LockedRead, ReadOptions, WriteOptions},
    key_lock::{KeyBasedLockManager, KeyLockGuard},
    listener::{CacheListener, NotificationDispatcher},
    lock::{LockAccessType, LockHandle, LockIdGenerator, LockOutcome},
    metadata::is_group_compatible,
    notification::CallbackInfo,
    pool::PoolManager,
    shutdown::{OperationCategory, ShutdownGate, ShutdownStatus},
    version::{check_version, initial_version, overwrite_version},
};

/// Liveness of cluster nodes, consulted by node-bound expiration.
pub trait NodeMembership: Send + Sync + 'static + Debug {
    /// If `node` is alive.
    fn is_alive(&self, node: &str) -> bool;
}

/// Membership of a node running alone: every node is alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneMembership;

impl NodeMembership for StandaloneMembership {
    fn is_alive(&self, _: &str) -> bool {
        true
    }
}

/// Source of fresh values for entries that are refreshed rather than dropped when they expire.
///
/// Providers are called with the key lock held and must not call back into the cache.
pub trait ResyncProvider: Send + Sync + 'static + Debug {
    /// Load the current value of `key`. `None` means the source no longer has one.
    fn reload(&self, key: &str, ctx: &OperationContext) -> Result<Option<Payload>>;
}

struct StoreView<'a> {
    backend: &'a dyn StorageBackend,
    membership: &'a dyn NodeMembership,
    now: DateTime<Utc>,
}

impl ExpirationContext for StoreView<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn contains_key(&self, key: &str) -> bool {
        self.backend.contains(key)
    }

    fn is_node_alive(&self, node: &str) -> bool {
        self.membership.is_alive(node)
    }
}

struct PendingEvent {
    key: Key,
    kind: EventKind,
    value: Option<Payload>,
    callbacks: Vec<CallbackInfo>,
}

/// Work left for after the key lock is released.
#[derive(Default)]
struct Effects {
    events: Vec<PendingEvent>,
    cascade_from: Vec<Key>,
    expired: usize,
}

impl Effects {
    fn inserted(&mut self, key: &Key) {
        self.cascade_from.push(key.clone());
    }

    fn updated(&mut self, key: &Key, value: Option<Payload>, replaced: &CacheEntry) {
        self.cascade_from.push(key.clone());
        if let Some(notifications) = replaced.notifications().filter(|n| !n.on_update().is_empty()) {
            self.events.push(PendingEvent {
                key: key.clone(),
                kind: EventKind::ItemUpdated,
                value,
                callbacks: notifications.on_update().to_vec(),
            });
        }
    }

    fn removed(&mut self, key: &Key, reason: RemoveReason, removed: &CacheEntry) {
        self.cascade_from.push(key.clone());
        if let Some(notifications) = removed.notifications().filter(|n| !n.on_remove().is_empty()) {
            self.events.push(PendingEvent {
                key: key.clone(),
                kind: EventKind::ItemRemoved(reason),
                value: removed.value().cloned(),
                callbacks: notifications.on_remove().to_vec(),
            });
        }
    }
}

/// Builder of a [`Cache`].
pub struct CacheBuilder {
    config: CacheConfig,
    registry: Option<BoxedRegistry>,
    backend: Option<Arc<dyn StorageBackend>>,
    membership: Arc<dyn NodeMembership>,
    ledger: Option<Arc<ClientLedger>>,
    listeners: Vec<(String, Arc<dyn CacheListener>)>,
    resync_providers: HashMap<String, Arc<dyn ResyncProvider>>,
    default_resync_provider: Option<String>,
}

impl CacheBuilder {
    /// A builder for a cache holding at most `capacity` entries, with default settings otherwise.
    pub fn new(capacity: usize) -> Self {
        Self::from_config(CacheConfig {
            capacity,
            ..Default::default()
        })
    }

    /// A builder starting from `config`.
    pub fn from_config(config: CacheConfig) -> Self {
        Self {
            config,
            registry: None,
            backend: None,
            membership: Arc::new(StandaloneMembership),
            ledger: None,
            listeners: vec![],
            resync_providers: HashMap::new(),
            default_resync_provider: None,
        }
    }

    /// Set the cache name, used as the metrics label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the shard count of the default in-memory store.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.config.shards = shards;
        self
    }

    /// Set the initial and the largest free-list capacity of the entry pool.
    pub fn with_store_pool_capacity(mut self, capacity: usize, max_capacity: usize) -> Self {
        self.config.store_pool_capacity = capacity;
        self.config.store_pool_max_capacity = max_capacity;
        self
    }

    /// Set how many per-item contexts bulk operations may hold at once.
    pub fn with_transactional_pool_capacity(mut self, capacity: usize) -> Self {
        self.config.transactional_pool_capacity = capacity;
        self
    }

    /// Set how long renting a context waits when all are in use.
    pub fn with_pool_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_wait_timeout = timeout;
        self
    }

    /// Set how long an operation waits for a key lock.
    pub fn with_key_lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.key_lock_timeout = timeout;
        self
    }

    /// Set how long an operation blocks while a graceful shutdown drains the node.
    pub fn with_graceful_block_interval(mut self, interval: Duration) -> Self {
        self.config.graceful_block_interval = interval;
        self
    }

    /// Set the node name used in lock ids.
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.config.node_name = node_name.into();
        self
    }

    /// Report metrics to `registry`. Without one, metrics are dropped.
    pub fn with_metrics_registry(mut self, registry: impl RegistryOps) -> Self {
        self.registry = Some(Box::new(registry));
        self
    }

    /// Store entries in `backend` instead of the default in-memory store.
    pub fn with_backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Ask `membership` about node liveness.
    pub fn with_membership(mut self, membership: Arc<dyn NodeMembership>) -> Self {
        self.membership = membership;
        self
    }

    /// Account client usage in `ledger`, which may be shared with other caches.
    pub fn with_client_ledger(mut self, ledger: Arc<ClientLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Register the event listener of `client_id`.
    pub fn with_listener(mut self, client_id: impl Into<String>, listener: Arc<dyn CacheListener>) -> Self {
        self.listeners.push((client_id.into(), listener));
        self
    }

    /// Refresh expired entries marked for resync from `provider`, registered under `name`.
    ///
    /// Entries that name no resync provider use the first one registered.
    pub fn with_resync_provider(mut self, name: impl Into<String>, provider: Arc<dyn ResyncProvider>) -> Self {
        let name = name.into();
        self.default_resync_provider.get_or_insert_with(|| name.clone());
        self.resync_providers.insert(name, provider);
        self
    }

    /// Build the cache.
    pub fn build(self) -> Result<Cache> {
        self.config.validate()?;
        let config = self.config;

        let metrics = Arc::new(match self.registry.as_ref() {
            Some(registry) => Metrics::new(config.name.clone(), registry.as_ref()),
            None => Metrics::new(config.name.clone(), &NoopMetricsRegistry),
        });
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryStore::new(config.capacity, config.shards)));
        let pools = PoolManager::new(
            config.store_pool_capacity,
            config.store_pool_max_capacity,
            config.transactional_pool_capacity,
            config.pool_wait_timeout,
            metrics.clone(),
        );
        let dispatcher = NotificationDispatcher::new(metrics.clone());
        for (client_id, listener) in self.listeners {
            dispatcher.register(client_id, listener);
        }

        tracing::info!(
            "[cache]: build cache {}, capacity: {}, node: {}",
            config.name,
            config.capacity,
            config.node_name
        );

        let inner = CacheInner {
            key_locks: KeyBasedLockManager::new(),
            gate: ShutdownGate::new(config.graceful_block_interval),
            lock_ids: LockIdGenerator::new(config.node_name.clone()),
            ledger: self.ledger.unwrap_or_default(),
            membership: self.membership,
            resync_providers: self.resync_providers,
            default_resync_provider: self.default_resync_provider,
            backend,
            pools,
            dispatcher,
            metrics,
            config,
        };
        Ok(Cache { inner: Arc::new(inner) })
    }
}

#[derive(Debug)]
struct CacheInner {
    config: CacheConfig,
    backend: Arc<dyn StorageBackend>,
    membership: Arc<dyn NodeMembership>,
    resync_providers: HashMap<String, Arc<dyn ResyncProvider>>,
    default_resync_provider: Option<String>,
    key_locks: KeyBasedLockManager,
    gate: ShutdownGate,
    pools: PoolManager,
    dispatcher: NotificationDispatcher,
    lock_ids: LockIdGenerator,
    metrics: Arc<Metrics>,
    ledger: Arc<ClientLedger>,
}

/// The cache facade.
///
/// Every operation passes the shutdown gate, then works under the lock of its key. Notifications and cascading
/// removals of dependent keys run after the key lock is released.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// A builder for a cache holding at most `capacity` entries.
    pub fn builder(capacity: usize) -> CacheBuilder {
        CacheBuilder::new(capacity)
    }

    /// Settings of the cache.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Metrics of the cache.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Client usage ledger.
    pub fn ledger(&self) -> &Arc<ClientLedger> {
        &self.inner.ledger
    }

    /// Bookkeeping of the entry pool and the context pool.
    pub fn pool_stats(&self) -> [PoolStats; 2] {
        self.inner.pools.stats()
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.inner.backend.count()
    }

    /* reads */

    /// Get the value of `key`, ignoring locks.
    pub fn get(&self, key: impl Into<Key>, ctx: &OperationContext) -> Result<Option<Payload>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicRead, std::slice::from_ref(&key))?;
        self.get_admitted(&key, ctx)
    }

    /// Get the value of `key` subject to the lock rules of `options`.
    ///
    /// Returns `None` if the key is missing.
    pub fn get_with_lock(
        &self,
        key: impl Into<Key>,
        options: &ReadOptions,
        ctx: &OperationContext,
    ) -> Result<Option<LockedRead>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicRead, std::slice::from_ref(&key))?;
        let metrics = &self.inner.metrics;
        metrics.cache_get.increase(1);

        let mut effects = Effects::default();
        let read = {
            let _guard = self.lock_key(&key)?;
            let now = Utc::now();
            self.fetch_live(&key, now, ctx, &mut effects)?.map(|shared| {
                let mut entry = shared.lock();
                let (granted, holder) = match options.access {
                    LockAccessType::Acquire => {
                        let outcome = entry.lock(&key, &self.inner.lock_ids, options.lock_ttl, now, ctx);
                        self.count_lock(outcome.granted);
                        (outcome.granted, outcome.holder)
                    }
                    access if access.ignores_lock() => (true, entry.lock_handle()),
                    _ => {
                        let granted = !entry.is_locked(now) || entry.compare_lock(options.lock_id.as_deref());
                        (granted, entry.lock_handle())
                    }
                };
                if granted {
                    entry.on_access(now);
                }
                LockedRead {
                    granted,
                    value: if granted { entry.value().cloned() } else { None },
                    version: entry.version(),
                    holder,
                }
            })
        };
        self.apply(effects, ctx);

        match read.is_some() {
            true => metrics.cache_hit.increase(1),
            false => metrics.cache_miss.increase(1),
        }
        Ok(read)
    }

    /// If `key` is stored and not expired.
    pub fn contains(&self, key: impl Into<Key>, ctx: &OperationContext) -> Result<bool> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicRead, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let found = {
            let _guard = self.lock_key(&key)?;
            self.fetch_live(&key, Utc::now(), ctx, &mut effects)?.is_some()
        };
        self.apply(effects, ctx);
        Ok(found)
    }

    /* writes */

    /// Add `item` under `key`, failing with [`ErrorKind::KeyExists`] if the key is stored.
    ///
    /// Returns `None` if the store did not take the entry.
    pub fn add(&self, key: impl Into<Key>, item: CacheItem, ctx: &OperationContext) -> Result<Option<InsertOutcome>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;
        self.write_admitted(&key, item, &WriteOptions::default(), ctx, true)
    }

    /// Insert or overwrite `key`.
    ///
    /// An overwrite fails with [`ErrorKind::ItemLocked`] if someone else holds the lock of the entry, unless the
    /// access mode ignores locks. Returns `None` if the store did not take the entry.
    pub fn insert(
        &self,
        key: impl Into<Key>,
        item: CacheItem,
        options: &WriteOptions,
        ctx: &OperationContext,
    ) -> Result<Option<InsertOutcome>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;
        self.write_admitted(&key, item, options, ctx, false)
    }

    /// Remove `key`, returning its value. Removing a missing key is a no-op.
    pub fn remove(
        &self,
        key: impl Into<Key>,
        options: &WriteOptions,
        ctx: &OperationContext,
    ) -> Result<Option<Payload>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;
        self.remove_admitted(&key, options, ctx)
    }

    /// Remove `key` without handing back its value. Returns if something was removed.
    pub fn delete(&self, key: impl Into<Key>, options: &WriteOptions, ctx: &OperationContext) -> Result<bool> {
        self.remove(key, options, ctx).map(|value| value.is_some())
    }

    /// Remove every entry, under the global lock. Returns how many were removed.
    pub fn clear(&self, ctx: &OperationContext) -> Result<usize> {
        self.admit(ctx, OperationCategory::BulkWrite, &[])?;
        let entries = {
            let _global = self.inner.key_locks.lock_global(self.inner.config.key_lock_timeout)?;
            self.backend_call("clear", "*", self.inner.backend.clear(ctx))?
        };
        let removed = entries.len();
        for shared in entries {
            self.recycle(shared);
        }
        self.inner.metrics.cache_clear.increase(1);
        self.refresh_count();
        tracing::info!("[cache]: cache {} cleared, removed: {}", self.inner.config.name, removed);
        Ok(removed)
    }

    /* locks */

    /// Lock the entry of `key` for the caller identified by `ctx`.
    ///
    /// The lock lapses after `ttl`, never if it is `None` or zero. A missing key is not granted.
    pub fn lock(&self, key: impl Into<Key>, ttl: Option<Duration>, ctx: &OperationContext) -> Result<LockOutcome> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let outcome = {
            let _guard = self.lock_key(&key)?;
            let now = Utc::now();
            match self.fetch_live(&key, now, ctx, &mut effects)? {
                Some(shared) => {
                    let outcome = shared.lock().lock(&key, &self.inner.lock_ids, ttl, now, ctx);
                    self.count_lock(outcome.granted);
                    outcome
                }
                None => LockOutcome {
                    granted: false,
                    holder: None,
                },
            }
        };
        self.apply(effects, ctx);
        Ok(outcome)
    }

    /// Release the lock of `key` if `lock_id` matches it, or unconditionally if `preemptive`.
    ///
    /// Returns if a lock was released.
    pub fn unlock(
        &self,
        key: impl Into<Key>,
        lock_id: Option<&str>,
        preemptive: bool,
        ctx: &OperationContext,
    ) -> Result<bool> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let released = {
            let _guard = self.lock_key(&key)?;
            match self.fetch_live(&key, Utc::now(), ctx, &mut effects)? {
                Some(shared) => {
                    let mut entry = shared.lock();
                    entry.unlock(lock_id, preemptive)
                }
                None => false,
            }
        };
        self.apply(effects, ctx);
        if released {
            self.inner.metrics.lock_release.increase(1);
        }
        Ok(released)
    }

    /// The lock held on `key`, if any. A lapsed lock is released and reported as absent.
    pub fn lock_holder(&self, key: impl Into<Key>, ctx: &OperationContext) -> Result<Option<LockHandle>> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicRead, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let holder = {
            let _guard = self.lock_key(&key)?;
            let now = Utc::now();
            match self.fetch_live(&key, now, ctx, &mut effects)? {
                Some(shared) => {
                    let mut entry = shared.lock();
                    match entry.is_locked(now) {
                        true => entry.lock_handle(),
                        false => None,
                    }
                }
                None => None,
            }
        };
        self.apply(effects, ctx);
        Ok(holder)
    }

    /// If `key` is locked. A lapsed lock is released and reported as unlocked.
    pub fn is_locked(&self, key: impl Into<Key>, ctx: &OperationContext) -> Result<bool> {
        self.lock_holder(key, ctx).map(|holder| holder.is_some())
    }

    /* bulk */

    /// Get the values of `keys`, skipping missing ones.
    ///
    /// Cancellation is checked before each key and aborts with [`ErrorKind::OperationCanceled`].
    pub fn get_bulk<K>(&self, keys: impl IntoIterator<Item = K>, ctx: &OperationContext) -> Result<Vec<(Key, Payload)>>
    where
        K: Into<Key>,
    {
        let keys = keys.into_iter().map(Into::into).collect_vec();
        self.admit(ctx, OperationCategory::BulkRead, &keys)?;

        let total = keys.len();
        let mut found = Vec::with_capacity(total);
        for (completed, key) in keys.into_iter().enumerate() {
            ctx.check_canceled("get_bulk", completed, total)?;
            let item_ctx = self.inner.pools.child_context(ctx)?;
            if let Some(value) = self.get_admitted(&key, &item_ctx)? {
                found.push((key, value));
            }
        }
        Ok(found)
    }

    /// Insert several items. Per-item failures are reported per item.
    ///
    /// Cancellation is checked before each item and aborts with [`ErrorKind::OperationCanceled`].
    pub fn insert_bulk<K>(
        &self,
        items: impl IntoIterator<Item = (K, CacheItem)>,
        options: &WriteOptions,
        ctx: &OperationContext,
    ) -> Result<Vec<(Key, Result<Option<InsertOutcome>>)>>
    where
        K: Into<Key>,
    {
        let items = items.into_iter().map(|(key, item)| (key.into(), item)).collect_vec();
        let keys = items.iter().map(|(key, _)| key.clone()).collect_vec();
        self.admit(ctx, OperationCategory::BulkWrite, &keys)?;

        let total = items.len();
        let mut results = Vec::with_capacity(total);
        for (completed, (key, item)) in items.into_iter().enumerate() {
            ctx.check_canceled("insert_bulk", completed, total)?;
            let item_ctx = self.inner.pools.child_context(ctx)?;
            let result = self.write_admitted(&key, item, options, &item_ctx, false);
            results.push((key, result));
        }
        Ok(results)
    }

    /// Remove several keys. Per-key failures are reported per key.
    ///
    /// Cancellation is checked before each key and aborts with [`ErrorKind::OperationCanceled`].
    pub fn remove_bulk<K>(
        &self,
        keys: impl IntoIterator<Item = K>,
        options: &WriteOptions,
        ctx: &OperationContext,
    ) -> Result<Vec<(Key, Result<Option<Payload>>)>>
    where
        K: Into<Key>,
    {
        let keys = keys.into_iter().map(Into::into).collect_vec();
        self.admit(ctx, OperationCategory::BulkWrite, &keys)?;

        let total = keys.len();
        let mut results = Vec::with_capacity(total);
        for (completed, key) in keys.into_iter().enumerate() {
            ctx.check_canceled("remove_bulk", completed, total)?;
            let item_ctx = self.inner.pools.child_context(ctx)?;
            let result = self.remove_admitted(&key, options, &item_ctx);
            results.push((key, result));
        }
        Ok(results)
    }

    /* notifications */

    /// Register callbacks on the entry of `key`. Returns `false` if the key is missing.
    pub fn register_key_notification(
        &self,
        key: impl Into<Key>,
        on_update: Option<CallbackInfo>,
        on_remove: Option<CallbackInfo>,
        ctx: &OperationContext,
    ) -> Result<bool> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let registered = {
            let _guard = self.lock_key(&key)?;
            match self.fetch_live(&key, Utc::now(), ctx, &mut effects)? {
                Some(shared) => {
                    let mut entry = shared.lock();
                    let notifications = entry.notifications_mut();
                    if let Some(info) = on_update {
                        notifications.add_update_callback(info, false);
                    }
                    if let Some(info) = on_remove {
                        notifications.add_remove_callback(info, false);
                    }
                    true
                }
                None => false,
            }
        };
        self.apply(effects, ctx);
        Ok(registered)
    }

    /// Unregister callbacks from the entry of `key`. Returns `false` if the key is missing.
    pub fn unregister_key_notification(
        &self,
        key: impl Into<Key>,
        on_update: Option<&CallbackInfo>,
        on_remove: Option<&CallbackInfo>,
        ctx: &OperationContext,
    ) -> Result<bool> {
        let key = key.into();
        self.admit(ctx, OperationCategory::AtomicWrite, std::slice::from_ref(&key))?;

        let mut effects = Effects::default();
        let unregistered = {
            let _guard = self.lock_key(&key)?;
            match self.fetch_live(&key, Utc::now(), ctx, &mut effects)? {
                Some(shared) => {
                    let mut entry = shared.lock();
                    let notifications = entry.notifications_mut();
                    if let Some(info) = on_update {
                        notifications.remove_update_callback(info.client_id(), info.callback());
                    }
                    if let Some(info) = on_remove {
                        notifications.remove_remove_callback(info.client_id(), info.callback());
                    }
                    if notifications.is_empty() {
                        entry.set_notifications(None);
                    }
                    true
                }
                None => false,
            }
        };
        self.apply(effects, ctx);
        Ok(unregistered)
    }

    /// Register the event listener of `client_id`, replacing the previous one.
    pub fn register_listener(&self, client_id: impl Into<String>, listener: Arc<dyn CacheListener>) {
        self.inner.dispatcher.register(client_id, listener);
    }

    /// Unregister the event listener of `client_id`.
    pub fn unregister_listener(&self, client_id: &str) -> bool {
        self.inner.dispatcher.unregister(client_id)
    }

    /* maintenance */

    /// Sweep the store for expired entries and remove them, with their dependents.
    ///
    /// Returns how many entries expired. Dependents removed in cascade and resynced entries are not counted. Keys
    /// whose lock cannot be taken in time are left for the next sweep.
    pub fn evict_expired(&self, ctx: &OperationContext) -> Result<usize> {
        let mut expired = 0;
        for key in self.inner.backend.keys() {
            let mut effects = Effects::default();
            {
                let _guard = match self.lock_key(&key) {
                    Ok(guard) => guard,
                    Err(e) => {
                        tracing::warn!("[cache]: sweep skips key {}, key lock error: {}", key, e);
                        continue;
                    }
                };
                self.fetch_live(&key, Utc::now(), ctx, &mut effects)?;
            }
            expired += effects.expired;
            self.apply(effects, ctx);
        }
        if expired > 0 {
            tracing::debug!("[cache]: swept {} expired entries", expired);
        }
        Ok(expired)
    }

    /// Enter graceful shutdown. Returns `false` unless the cache was serving normally.
    pub fn start_graceful_shutdown(&self) -> bool {
        self.inner.gate.start_graceful_shutdown()
    }

    /// Complete the shutdown. Blocked and later operations fail with [`ErrorKind::ShutDown`].
    pub fn complete_shutdown(&self) {
        self.inner.gate.complete_shutdown();
        tracing::warn!(critical = true, "[cache]: cache {} shut down", self.inner.config.name);
    }

    /// Abort a graceful shutdown in progress. Returns `false` if none was in progress.
    pub fn cancel_shutdown(&self) -> bool {
        self.inner.gate.cancel_shutdown()
    }

    /// Shutdown status.
    pub fn shutdown_status(&self) -> ShutdownStatus {
        self.inner.gate.status()
    }

    /* internals */

    fn admit(&self, ctx: &OperationContext, category: OperationCategory, keys: &[Key]) -> Result<()> {
        let inner = &self.inner;
        let blocked = inner
            .gate
            .admit(ctx, category, || inner.backend.is_operation_allowed(keys, category, ctx))?;
        if let Some(waited) = blocked {
            inner.metrics.shutdown_blocked.increase(1);
            inner.metrics.shutdown_block_duration.record(waited.as_secs_f64());
        }
        Ok(())
    }

    fn lock_key(&self, key: &Key) -> Result<KeyLockGuard<'_>> {
        self.inner.key_locks.lock(key.clone(), self.inner.config.key_lock_timeout)
    }

    /// Log unexpected backend failures before they reach the caller.
    fn backend_call<T>(&self, operation: &'static str, key: &str, result: Result<T>) -> Result<T> {
        result.map_err(|e| {
            if e.is_traceable() {
                tracing::error!("[cache]: backend {} on key {} error: {}", operation, key, e);
            }
            Error::operation_failed(operation, e)
        })
    }

    fn count_lock(&self, granted: bool) {
        match granted {
            true => self.inner.metrics.lock_acquire.increase(1),
            false => self.inner.metrics.lock_conflict.increase(1),
        }
    }

    fn refresh_count(&self) {
        self.inner.metrics.cache_count.absolute(self.inner.backend.count() as u64);
    }

    /// Look `key` up, removing it if it expired. The caller holds the key lock.
    ///
    /// An expired entry marked for resync is refreshed instead when its provider still has a value.
    fn fetch_live(
        &self,
        key: &Key,
        now: DateTime<Utc>,
        ctx: &OperationContext,
        effects: &mut Effects,
    ) -> Result<Option<SharedEntry>> {
        let inner = &self.inner;
        let Some(shared) = self.backend_call("get", key, inner.backend.get(key, ctx))? else {
            return Ok(None);
        };
        let view = StoreView {
            backend: inner.backend.as_ref(),
            membership: inner.membership.as_ref(),
            now,
        };
        let mut entry = shared.lock();
        if !entry.determine_expiration(&view) {
            drop(entry);
            return Ok(Some(shared));
        }
        let provider = match entry.needs_resync() {
            true => self.resync_provider(&entry),
            false => None,
        };
        drop(entry);

        if let Some(provider) = provider {
            if self.resync(key, &shared, provider.as_ref(), &view, ctx, effects) {
                return Ok(Some(shared));
            }
        }
        drop(shared);

        if let Some(removed) = self.backend_call("remove", key, inner.backend.remove(key, ctx))? {
            effects.removed(key, RemoveReason::Expired, &removed.lock());
            effects.expired += 1;
            inner.metrics.cache_expire.increase(1);
            self.refresh_count();
            tracing::trace!("[cache]: key {} expired", key);
            self.recycle(removed);
        }
        Ok(None)
    }

    fn resync_provider(&self, entry: &CacheEntry) -> Option<Arc<dyn ResyncProvider>> {
        let inner = &self.inner;
        let name = entry
            .resync_provider_name()
            .or(inner.default_resync_provider.as_deref())?;
        let provider = inner.resync_providers.get(name).cloned();
        if provider.is_none() {
            tracing::warn!("[cache]: resync provider {} is not registered", name);
        }
        provider
    }

    /// Reload an expired entry from `provider` and start its expiration over. Returns `false` if the entry has to be
    /// removed instead.
    fn resync(
        &self,
        key: &Key,
        shared: &SharedEntry,
        provider: &dyn ResyncProvider,
        view: &StoreView<'_>,
        ctx: &OperationContext,
        effects: &mut Effects,
    ) -> bool {
        let value = match provider.reload(key, ctx) {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!("[cache]: resync source has no value for key {}", key);
                return false;
            }
            Err(e) => {
                tracing::warn!("[cache]: resync of key {} error: {}", key, e);
                return false;
            }
        };

        let mut entry = shared.lock();
        if let Some(hint) = entry.expiration_mut() {
            hint.rearm(view.now);
        }
        // Absolute instants and lost dependencies keep firing.
        if entry.determine_expiration(view) {
            tracing::debug!("[cache]: key {} still expired after resync", key);
            return false;
        }
        entry.set_value(Some(value.clone()));
        let version = entry.version().saturating_add(1);
        entry.set_version(version);
        entry.set_last_modified_time(view.now);
        effects.updated(key, Some(value), &entry);
        self.inner.metrics.cache_resync.increase(1);
        tracing::trace!("[cache]: key {} resynced", key);
        true
    }

    /// Return an entry the store let go of to the entry pool, unless something still holds it.
    fn recycle(&self, shared: SharedEntry) {
        if let Ok(entry) = Arc::try_unwrap(shared) {
            self.inner.pools.recycle_entry(entry.into_inner());
        }
    }

    /// Lock and version checks of a write against the stored entry.
    fn check_write(&self, key: &Key, entry: &mut CacheEntry, options: &WriteOptions, now: DateTime<Utc>) -> Result<()> {
        if !options.access.ignores_lock() && entry.is_locked(now) && !entry.compare_lock(options.lock_id.as_deref()) {
            self.inner.metrics.lock_conflict.increase(1);
            let holder = entry.lock_handle();
            return Err(Error::item_locked(key, holder.as_ref().map(|h| &*h.lock_id)));
        }
        if let (LockAccessType::CompareVersion, Some(expected)) = (options.access, options.version) {
            check_version(key, entry.version(), expected)?;
        }
        Ok(())
    }

    fn get_admitted(&self, key: &Key, ctx: &OperationContext) -> Result<Option<Payload>> {
        let start = Instant::now();
        let metrics = &self.inner.metrics;
        metrics.cache_get.increase(1);

        let mut effects = Effects::default();
        let value = {
            let _guard = self.lock_key(key)?;
            let now = Utc::now();
            self.fetch_live(key, now, ctx, &mut effects)?.and_then(|shared| {
                let mut entry = shared.lock();
                entry.on_access(now);
                entry.value().cloned()
            })
        };
        self.apply(effects, ctx);

        match value.is_some() {
            true => metrics.cache_hit.increase(1),
            false => metrics.cache_miss.increase(1),
        }
        if let Some(client_id) = ctx.client_id() {
            self.inner.ledger.record(client_id, 0);
        }
        metrics.cache_get_duration.record(start.elapsed().as_secs_f64());
        Ok(value)
    }

    fn write_admitted(
        &self,
        key: &Key,
        item: CacheItem,
        options: &WriteOptions,
        ctx: &OperationContext,
        add: bool,
    ) -> Result<Option<InsertOutcome>> {
        let start = Instant::now();
        let mut effects = Effects::default();
        let result = {
            let _guard = self.lock_key(key)?;
            self.write_locked(key, item, options, ctx, add, &mut effects)
        };
        self.apply(effects, ctx);
        self.inner
            .metrics
            .cache_update_duration
            .record(start.elapsed().as_secs_f64());
        result
    }

    fn write_locked(
        &self,
        key: &Key,
        item: CacheItem,
        options: &WriteOptions,
        ctx: &OperationContext,
        add: bool,
        effects: &mut Effects,
    ) -> Result<Option<InsertOutcome>> {
        let inner = &self.inner;
        let now = Utc::now();

        if let Some(missing) = item
            .expiration
            .iter()
            .flat_map(|policy| policy.dependencies.iter())
            .find(|dependency| !inner.backend.contains(dependency))
        {
            return Err(
                Error::untraced(ErrorKind::DependencyKeyNotFound, "dependency key not found")
                    .with_context("key", key)
                    .with_context("dependency", missing),
            );
        }

        let old = self.fetch_live(key, now, ctx, effects)?;
        if add && old.is_some() {
            return Err(Error::key_exists(key));
        }

        let mut entry = inner.pools.entry();
        entry.set_value(Some(item.value));
        entry.set_expiration(item.expiration.as_ref().and_then(|policy| make_expiration_hint(policy, now)));
        entry.set_eviction(item.eviction);
        entry.set_group(item.group);
        entry.set_query_info(item.query_info);
        entry.add_flags(item.flags);
        entry.set_notifications(item.notifications);
        entry.set_provider_name(item.provider_name);
        entry.set_resync_provider_name(item.resync_provider_name);
        entry.set_creation_time(now);
        entry.set_last_modified_time(now);

        match old.as_ref() {
            Some(shared) => {
                let mut old = shared.lock();
                if !is_group_compatible(old.group(), entry.group()) {
                    return Err(
                        Error::untraced(ErrorKind::IncompatibleGroup, "data group of the item does not match")
                            .with_context("key", key),
                    );
                }
                self.check_write(key, &mut old, options, now)?;

                entry.set_version(overwrite_version(old.version(), options.access, ctx));
                entry.merge_callback_listeners(&old);
                entry.set_creation_time(old.creation_time());
                match options.access {
                    LockAccessType::DontRelease | LockAccessType::IgnoreLock | LockAccessType::PreserveVersion => {
                        entry.copy_lock(old.lock_state())
                    }
                    _ if old.is_item_locked() => inner.metrics.lock_release.increase(1),
                    _ => {}
                }
            }
            None => {
                if let (LockAccessType::CompareVersion, Some(expected)) = (options.access, options.version) {
                    return Err(Error::version_mismatch(key, expected, 0));
                }
                entry.set_version(initial_version(ctx, now));
            }
        }

        let version = entry.version();
        let value = entry.value().cloned();
        let size = entry.data_size(ctx);
        drop(old);

        let outcome = match self.backend_call("insert", key, inner.backend.insert(key.clone(), entry, ctx))? {
            InsertResult::Success => {
                inner.metrics.cache_add.increase(1);
                effects.inserted(key);
                InsertOutcome {
                    version,
                    overwritten: false,
                }
            }
            InsertResult::SuccessOverwrite(replaced) => {
                inner.metrics.cache_update.increase(1);
                effects.updated(key, value, &replaced.lock());
                self.recycle(replaced);
                InsertOutcome {
                    version,
                    overwritten: true,
                }
            }
            InsertResult::Failure => {
                tracing::debug!("[cache]: store declined entry of key {}", key);
                return Ok(None);
            }
            InsertResult::NeedsEviction => {
                tracing::debug!("[cache]: store is full, key {} not inserted", key);
                return Err(Error::needs_eviction(inner.config.capacity, inner.backend.count()));
            }
        };

        if let Some(client_id) = ctx.client_id() {
            inner.ledger.record(client_id, size);
        }
        self.refresh_count();
        Ok(Some(outcome))
    }

    fn remove_admitted(&self, key: &Key, options: &WriteOptions, ctx: &OperationContext) -> Result<Option<Payload>> {
        let mut effects = Effects::default();
        let result = {
            let _guard = self.lock_key(key)?;
            self.remove_locked(key, options, ctx, &mut effects)
        };
        self.apply(effects, ctx);
        result
    }

    fn remove_locked(
        &self,
        key: &Key,
        options: &WriteOptions,
        ctx: &OperationContext,
        effects: &mut Effects,
    ) -> Result<Option<Payload>> {
        let inner = &self.inner;
        let now = Utc::now();

        let Some(shared) = self.fetch_live(key, now, ctx, effects)? else {
            return Ok(None);
        };
        self.check_write(key, &mut shared.lock(), options, now)?;
        drop(shared);

        let Some(removed) = self.backend_call("remove", key, inner.backend.remove(key, ctx))? else {
            return Ok(None);
        };
        let value = {
            let entry = removed.lock();
            effects.removed(key, RemoveReason::Removed, &entry);
            entry.value().cloned()
        };
        inner.metrics.cache_remove.increase(1);
        self.refresh_count();
        self.recycle(removed);
        Ok(value)
    }

    /// Remove a dependent of a key that changed. Locks are ignored.
    fn remove_dependent(&self, key: &Key, ctx: &OperationContext) -> Result<bool> {
        let mut effects = Effects::default();
        let removed = {
            let _guard = self.lock_key(key)?;
            match self.backend_call("remove", key, self.inner.backend.remove(key, ctx))? {
                Some(removed) => {
                    effects.removed(key, RemoveReason::DependencyExpired, &removed.lock());
                    self.recycle(removed);
                    true
                }
                None => false,
            }
        };
        // The running wave expands this key, so only the events are delivered here.
        self.notify(effects.events);
        Ok(removed)
    }

    fn apply(&self, effects: Effects, ctx: &OperationContext) {
        self.notify(effects.events);
        if effects.cascade_from.is_empty() {
            return;
        }
        let removed = cascade(
            effects.cascade_from,
            |key| self.inner.backend.dependents_of(key),
            |key| self.remove_dependent(key, ctx),
        );
        if !removed.is_empty() {
            self.inner.metrics.cache_cascade_remove.increase(removed.len() as u64);
            self.refresh_count();
        }
    }

    fn notify(&self, events: Vec<PendingEvent>) {
        for event in events {
            let dead = self
                .inner
                .dispatcher
                .dispatch(&event.key, event.kind, event.value.as_ref(), &event.callbacks);
            if !dead.is_empty() && event.kind == EventKind::ItemUpdated {
                self.prune_callbacks(&event.key, &dead);
            }
        }
    }

    /// Drop the callbacks of disconnected clients from the entry of `key`.
    fn prune_callbacks(&self, key: &Key, clients: &[String]) {
        let Ok(_guard) = self.lock_key(key) else {
            tracing::warn!("[cache]: skip pruning callbacks of key {}, key lock timed out", key);
            return;
        };
        if let Ok(Some(shared)) = self.inner.backend.get(key, &OperationContext::new()) {
            let mut entry = shared.lock();
            for client_id in clients {
                entry.remove_client_callbacks(client_id);
            }
        }
    }
}
