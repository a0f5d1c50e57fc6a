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

//! Typed object pools in two tiers.
//!
//! - [`StorePool`] hands out [`StoreLease`]s for objects that may outlive the call that rented them. A lease can be
//!   [detached](StoreLease::detach) when ownership moves into the store. The free-list grows when the pool serves
//!   too few requests from it.
//! - [`TransactionalPool`] hands out [`TransactionalLease`]s for objects scoped to a single call. The pool has a fixed
//!   number of objects; renting blocks for a bounded time when all of them are in use.
//!
//! A lease always returns its object to the pool it came from, so objects never cross tiers. Returned objects are
//! [reset](Reset::reset) before reuse.

use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crossbeam::queue::ArrayQueue;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::{
    error::{Error, ErrorKind, Result},
    metrics::model::Metrics,
    strict_assert,
};

/// Requests observed between two growth checks of a store pool.
const GROWTH_CHECK_WINDOW: u64 = 64;
/// A store pool grows when fewer than this share of requests in a window were served from the free-list.
const SERVING_BORDERLINE: f64 = 0.75;

/// Clears an object before it is handed out again.
pub trait Reset {
    /// Restore the object to its freshly created state, dropping references it holds.
    fn reset(&mut self);
}

/// Snapshot of a pool's bookkeeping.
///
/// For a quiescent pool `rented == returned + detached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Pool name.
    pub name: &'static str,
    /// Leases handed out.
    pub rented: u64,
    /// Leases that came back.
    pub returned: u64,
    /// Store leases whose object moved into the store.
    pub detached: u64,
    /// Detached objects handed back by the store once it let go of them.
    pub recycled: u64,
    /// Rents served from the free-list.
    pub hits: u64,
    /// Rents that had to create a new object.
    pub misses: u64,
    /// Times the free-list grew.
    pub grows: u64,
    /// Current free-list capacity (store tier) or object budget (transactional tier).
    pub capacity: usize,
}

impl PoolStats {
    /// Leases currently outstanding.
    pub fn in_use(&self) -> u64 {
        self.rented.saturating_sub(self.returned + self.detached)
    }
}

#[derive(Debug, Default)]
struct Counters {
    rented: AtomicU64,
    returned: AtomicU64,
    detached: AtomicU64,
    recycled: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    grows: AtomicU64,
}

impl Counters {
    fn stats(&self, name: &'static str, capacity: usize) -> PoolStats {
        // Read `rented` last so a concurrent rent/return pair never makes `in_use` underflow.
        let returned = self.returned.load(Ordering::Acquire);
        let detached = self.detached.load(Ordering::Acquire);
        let recycled = self.recycled.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let grows = self.grows.load(Ordering::Relaxed);
        let rented = self.rented.load(Ordering::Acquire);
        PoolStats {
            name,
            rented,
            returned,
            detached,
            recycled,
            hits,
            misses,
            grows,
            capacity,
        }
    }
}

type Create<T> = Box<dyn Fn() -> T + Send + Sync + 'static>;

struct StorePoolInner<T> {
    name: &'static str,
    queue: RwLock<Option<ArrayQueue<T>>>,
    capacity: AtomicUsize,
    max_capacity: usize,
    window_requests: AtomicU64,
    window_hits: AtomicU64,
    create: Create<T>,
    counters: Counters,
    metrics: Arc<Metrics>,
}

/// Growable pool for objects that may outlive the renting call.
pub struct StorePool<T> {
    inner: Arc<StorePoolInner<T>>,
}

impl<T> Clone for StorePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for StorePool<T>
where
    T: Reset + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePool").field("stats", &self.stats()).finish()
    }
}

impl<T> StorePool<T>
where
    T: Reset + Default + Send + 'static,
{
    /// Create a store pool whose free-list starts at `capacity` and may grow up to `max_capacity`.
    pub fn new(name: &'static str, capacity: usize, max_capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self::new_with_create(name, capacity, max_capacity, metrics, T::default)
    }
}

impl<T> StorePool<T>
where
    T: Reset + Send + 'static,
{
    /// Create a store pool with a custom object factory.
    pub fn new_with_create(
        name: &'static str,
        capacity: usize,
        max_capacity: usize,
        metrics: Arc<Metrics>,
        create: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        let inner = StorePoolInner {
            name,
            queue: RwLock::new((capacity > 0).then(|| ArrayQueue::new(capacity))),
            capacity: AtomicUsize::new(capacity),
            max_capacity: max_capacity.max(capacity),
            window_requests: AtomicU64::new(0),
            window_hits: AtomicU64::new(0),
            create: Box::new(create),
            counters: Counters::default(),
            metrics,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Rent an object.
    pub fn acquire(&self) -> StoreLease<T> {
        let popped = self.inner.queue.read().as_ref().and_then(|queue| queue.pop());
        let hit = popped.is_some();
        let item = match popped {
            Some(item) => {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.pool_hit.increase(1);
                item
            }
            None => {
                self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                self.inner.metrics.pool_miss.increase(1);
                (self.inner.create)()
            }
        };
        self.inner.counters.rented.fetch_add(1, Ordering::Release);
        self.inner.observe(hit);

        StoreLease {
            item: Some(item),
            pool: self.inner.clone(),
        }
    }

    /// Put back an object that was [detached](StoreLease::detach) earlier.
    ///
    /// The object is reset and pushed to the free-list, or dropped if the free-list is full. The lease that rented it
    /// stays counted as detached.
    pub fn recycle(&self, mut item: T) {
        item.reset();
        let pushed = match self.inner.queue.read().as_ref() {
            Some(queue) => queue.push(item).is_ok(),
            None => false,
        };
        if pushed {
            self.inner.counters.recycled.fetch_add(1, Ordering::Relaxed);
            self.inner.metrics.pool_recycle.increase(1);
        }
    }

    /// Pool bookkeeping snapshot.
    pub fn stats(&self) -> PoolStats {
        self.inner
            .counters
            .stats(self.inner.name, self.inner.capacity.load(Ordering::Relaxed))
    }
}

impl<T> Debug for StorePoolInner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePoolInner").field("name", &self.name).finish()
    }
}

impl<T> StorePoolInner<T> {
    fn observe(&self, hit: bool) {
        if hit {
            self.window_hits.fetch_add(1, Ordering::Relaxed);
        }
        if self.window_requests.fetch_add(1, Ordering::Relaxed) + 1 < GROWTH_CHECK_WINDOW {
            return;
        }

        let requests = self.window_requests.swap(0, Ordering::Relaxed);
        let hits = self.window_hits.swap(0, Ordering::Relaxed);
        if requests == 0 {
            return;
        }
        let serving = hits as f64 / requests as f64;
        if serving < SERVING_BORDERLINE {
            self.grow();
        }
    }

    fn grow(&self) {
        let mut queue = self.queue.write();
        let Some(old) = queue.as_ref() else {
            return;
        };
        let capacity = old.capacity();
        if capacity >= self.max_capacity {
            return;
        }
        let grown = (capacity * 2).min(self.max_capacity);
        let fresh = ArrayQueue::new(grown);
        while let Some(item) = old.pop() {
            let _ = fresh.push(item);
        }
        *queue = Some(fresh);
        self.capacity.store(grown, Ordering::Relaxed);
        self.counters.grows.fetch_add(1, Ordering::Relaxed);
        self.metrics.pool_grow.increase(1);
        tracing::debug!(
            "[pool]: store pool {} grows from {} to {}",
            self.name,
            capacity,
            grown
        );
    }

    fn release(&self, mut item: T)
    where
        T: Reset,
    {
        item.reset();
        if let Some(queue) = self.queue.read().as_ref() {
            // A full free-list simply drops the object.
            let _ = queue.push(item);
        }
        self.counters.returned.fetch_add(1, Ordering::Release);
    }
}

/// RAII lease on a store-tier object.
///
/// Dropping the lease returns the object to its pool. [`StoreLease::detach`] hands the object over instead.
pub struct StoreLease<T>
where
    T: Reset + Send + 'static,
{
    item: Option<T>,
    pool: Arc<StorePoolInner<T>>,
}

impl<T> StoreLease<T>
where
    T: Reset + Send + 'static,
{
    /// Take the object out of the pool discipline, e.g. because the store now owns it.
    pub fn detach(mut self) -> T {
        self.pool.counters.detached.fetch_add(1, Ordering::Release);
        match self.item.take() {
            Some(item) => item,
            None => unreachable!("a lease always holds its object until dropped or detached"),
        }
    }
}

impl<T> Deref for StoreLease<T>
where
    T: Reset + Send + 'static,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.item.as_ref() {
            Some(item) => item,
            None => unreachable!("a lease always holds its object until dropped or detached"),
        }
    }
}

impl<T> DerefMut for StoreLease<T>
where
    T: Reset + Send + 'static,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.item.as_mut() {
            Some(item) => item,
            None => unreachable!("a lease always holds its object until dropped or detached"),
        }
    }
}

impl<T> Drop for StoreLease<T>
where
    T: Reset + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

impl<T> Debug for StoreLease<T>
where
    T: Reset + Send + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StoreLease").field(&self.item).finish()
    }
}

struct TransactionalState<T> {
    free: Vec<T>,
    created: usize,
}

struct TransactionalPoolInner<T> {
    name: &'static str,
    capacity: usize,
    wait_timeout: Duration,
    state: Mutex<TransactionalState<T>>,
    cond: Condvar,
    create: Create<T>,
    counters: Counters,
    metrics: Arc<Metrics>,
}

/// Fixed-capacity pool for objects scoped to one call.
pub struct TransactionalPool<T> {
    inner: Arc<TransactionalPoolInner<T>>,
}

impl<T> Clone for TransactionalPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for TransactionalPool<T>
where
    T: Reset + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalPool").field("stats", &self.stats()).finish()
    }
}

impl<T> TransactionalPool<T>
where
    T: Reset + Default + Send + 'static,
{
    /// Create a transactional pool owning at most `capacity` objects.
    pub fn new(name: &'static str, capacity: usize, wait_timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self::new_with_create(name, capacity, wait_timeout, metrics, T::default)
    }
}

impl<T> TransactionalPool<T>
where
    T: Reset + Send + 'static,
{
    /// Create a transactional pool with a custom object factory.
    pub fn new_with_create(
        name: &'static str,
        capacity: usize,
        wait_timeout: Duration,
        metrics: Arc<Metrics>,
        create: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        strict_assert!(capacity > 0, "transactional pool {name} needs a non-zero capacity");
        let inner = TransactionalPoolInner {
            name,
            capacity,
            wait_timeout,
            state: Mutex::new(TransactionalState {
                free: Vec::with_capacity(capacity),
                created: 0,
            }),
            cond: Condvar::new(),
            create: Box::new(create),
            counters: Counters::default(),
            metrics,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Rent an object, waiting up to the pool's wait timeout when all objects are in use.
    pub fn acquire(&self) -> Result<TransactionalLease<T>> {
        self.acquire_timeout(self.inner.wait_timeout)
    }

    /// Rent an object, waiting up to `timeout` when all objects are in use.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<TransactionalLease<T>> {
        let deadline = Instant::now() + timeout;
        let inner = &self.inner;

        let mut state = inner.state.lock();
        let item = loop {
            if let Some(item) = state.free.pop() {
                inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                inner.metrics.pool_hit.increase(1);
                break item;
            }
            if state.created < inner.capacity {
                state.created += 1;
                inner.counters.misses.fetch_add(1, Ordering::Relaxed);
                inner.metrics.pool_miss.increase(1);
                break (inner.create)();
            }
            if inner.cond.wait_until(&mut state, deadline).timed_out() && state.free.is_empty() {
                tracing::warn!(
                    "[pool]: transactional pool {} exhausted, capacity: {}, waited: {:?}",
                    inner.name,
                    inner.capacity,
                    timeout
                );
                return Err(Error::new(ErrorKind::Timeout, "transactional pool exhausted")
                    .with_context("pool", inner.name)
                    .with_context("capacity", inner.capacity));
            }
        };
        drop(state);
        inner.counters.rented.fetch_add(1, Ordering::Release);

        Ok(TransactionalLease {
            item: Some(item),
            pool: inner.clone(),
        })
    }

    /// Pool bookkeeping snapshot.
    pub fn stats(&self) -> PoolStats {
        self.inner.counters.stats(self.inner.name, self.inner.capacity)
    }
}

impl<T> TransactionalPoolInner<T>
where
    T: Reset,
{
    fn release(&self, mut item: T) {
        item.reset();
        self.state.lock().free.push(item);
        self.counters.returned.fetch_add(1, Ordering::Release);
        self.cond.notify_one();
    }
}

/// RAII lease on a transactional-tier object.
///
/// The object cannot be taken out of the lease; it always goes back to its pool when the lease drops.
pub struct TransactionalLease<T>
where
    T: Reset + Send + 'static,
{
    item: Option<T>,
    pool: Arc<TransactionalPoolInner<T>>,
}

impl<T> Deref for TransactionalLease<T>
where
    T: Reset + Send + 'static,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.item.as_ref() {
            Some(item) => item,
            None => unreachable!("a lease always holds its object until dropped"),
        }
    }
}

impl<T> DerefMut for TransactionalLease<T>
where
    T: Reset + Send + 'static,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.item.as_mut() {
            Some(item) => item,
            None => unreachable!("a lease always holds its object until dropped"),
        }
    }
}

impl<T> Drop for TransactionalLease<T>
where
    T: Reset + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

impl<T> Debug for TransactionalLease<T>
where
    T: Reset + Send + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TransactionalLease").field(&self.item).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use itertools::Itertools;

    use super::*;

    #[derive(Debug, Default)]
    struct Scratch {
        buf: Vec<u8>,
        generation: usize,
    }

    impl Reset for Scratch {
        fn reset(&mut self) {
            self.buf.clear();
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::noop())
    }

    fn is_send_sync_static<T: Send + Sync + 'static>() {}

    #[test]
    fn test_send_sync_static() {
        is_send_sync_static::<StorePool<Scratch>>();
        is_send_sync_static::<TransactionalPool<Scratch>>();
    }

    #[test]
    fn test_store_pool_reuses_reset_objects() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 4, 4, metrics());

        {
            let mut lease = pool.acquire();
            lease.buf.extend_from_slice(b"dirty");
            lease.generation = 7;
        }

        let lease = pool.acquire();
        assert!(lease.buf.is_empty());
        // Reset only clears what the type chooses to clear, proving the object was reused.
        assert_eq!(lease.generation, 7);
        drop(lease);

        let stats = pool.stats();
        assert_eq!(stats.rented, 2);
        assert_eq!(stats.returned, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_store_pool_detach_balances() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 4, 4, metrics());

        let kept = pool.acquire().detach();
        let dropped = pool.acquire();
        assert_eq!(pool.stats().in_use(), 1);
        drop(dropped);
        drop(kept);

        let stats = pool.stats();
        assert_eq!(stats.rented, stats.returned + stats.detached);
        assert_eq!(stats.detached, 1);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_store_pool_recycles_detached_objects() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 4, 4, metrics());

        let mut kept = pool.acquire().detach();
        kept.buf.extend_from_slice(b"stored");
        kept.generation = 3;
        pool.recycle(kept);

        let lease = pool.acquire();
        assert!(lease.buf.is_empty());
        assert_eq!(lease.generation, 3);
        drop(lease);

        let stats = pool.stats();
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.rented, stats.returned + stats.detached);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_store_pool_recycle_drops_when_full() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 1, 1, metrics());

        let a = pool.acquire().detach();
        let b = pool.acquire().detach();
        pool.recycle(a);
        pool.recycle(b);
        assert_eq!(pool.stats().recycled, 1);

        let zero: StorePool<Scratch> = StorePool::new("scratch", 0, 0, metrics());
        let c = zero.acquire().detach();
        zero.recycle(c);
        assert_eq!(zero.stats().recycled, 0);
    }

    #[test]
    fn test_pool_debug_reports_stats() {
        let store: StorePool<Scratch> = StorePool::new("scratch", 2, 2, metrics());
        drop(store.acquire());
        let rendered = format!("{store:?}");
        assert!(rendered.contains("StorePool"));
        assert!(rendered.contains("rented: 1"));

        let tx: TransactionalPool<Scratch> = TransactionalPool::new("scratch", 2, Duration::from_millis(10), metrics());
        drop(tx.acquire().unwrap());
        assert!(format!("{tx:?}").contains("TransactionalPool"));
    }

    #[test]
    fn test_store_pool_zero_capacity() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 0, 0, metrics());
        for _ in 0..GROWTH_CHECK_WINDOW * 2 {
            drop(pool.acquire());
        }
        let stats = pool.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.grows, 0);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_store_pool_grows_when_serving_poorly() {
        let pool: StorePool<Scratch> = StorePool::new("scratch", 1, 16, metrics());

        // Holding 8 leases at a time means at most 1 of every 8 rents can be served by a 1-slot free-list.
        for _ in 0..GROWTH_CHECK_WINDOW {
            let leases = (0..8).map(|_| pool.acquire()).collect_vec();
            drop(leases);
        }

        let stats = pool.stats();
        assert!(stats.grows > 0);
        assert!(stats.capacity > 1);
        assert!(stats.capacity <= 16);
        assert_eq!(stats.in_use(), 0);
    }

    #[test]
    fn test_transactional_pool_times_out_when_exhausted() {
        let pool: TransactionalPool<Scratch> =
            TransactionalPool::new("scratch", 2, Duration::from_millis(20), metrics());

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();

        let start = Instant::now();
        let err = pool.acquire().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(20));

        drop(a);
        drop(b);
        assert_eq!(pool.stats().in_use(), 0);
        assert_eq!(pool.stats().misses, 2);
    }

    #[test]
    fn test_transactional_pool_wakes_waiter_on_release() {
        let pool: TransactionalPool<Scratch> = TransactionalPool::new("scratch", 1, Duration::from_secs(10), metrics());

        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let lease = pool.acquire().unwrap();
                lease.buf.len()
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(waiter.join().unwrap(), 0);
        let stats = pool.stats();
        assert_eq!(stats.rented, 2);
        assert_eq!(stats.returned, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_transactional_pool_never_exceeds_capacity() {
        let pool: TransactionalPool<Scratch> = TransactionalPool::new("scratch", 3, Duration::from_secs(10), metrics());

        let handles = (0..8)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let mut lease = pool.acquire().unwrap();
                        lease.buf.push(i as u8);
                    }
                })
            })
            .collect_vec();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.rented, 800);
        assert_eq!(stats.in_use(), 0);
        assert!(stats.misses <= 3);
    }
}
