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
    collections::HashSet,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use coffer::{
    AtomicMetricsRegistry, CacheBuilder, CacheItem, ErrorKind, ExpirationPolicy, Lifetime, MemoryStore, NodeMembership,
    OperationContext, ShutdownStatus, WriteOptions,
};
use coffer_memory::test_utils::{Fault, FaultyBackend};
use parking_lot::Mutex;

fn item(value: &'static [u8]) -> CacheItem {
    CacheItem::new(value)
}

#[test_log::test]
fn test_version_lock_walkthrough() {
    let cache = CacheBuilder::new(64).with_name("walkthrough").build().unwrap();
    let w = WriteOptions::default();
    let ctx = OperationContext::new().with_item_version(1000);

    let first = cache.insert("k", item(b"v1"), &w, &ctx).unwrap().unwrap();
    assert_eq!(first.version, 1000);
    let second = cache.insert("k", item(b"v2"), &w, &OperationContext::new()).unwrap().unwrap();
    assert_eq!(second.version, 1001);

    let owner = OperationContext::new().with_client_id("owner");
    let outcome = cache.lock("k", None, &owner).unwrap();
    assert!(outcome.granted);
    let lock_id = outcome.holder.unwrap().lock_id;

    let e = cache
        .insert("k", item(b"v3"), &w, &OperationContext::new().with_client_id("other"))
        .unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ItemLocked);
    assert_eq!(e.context_value("lock_id"), Some(&*lock_id));

    assert!(cache.unlock("k", Some(&lock_id), false, &owner).unwrap());
    let third = cache.insert("k", item(b"v3"), &w, &OperationContext::new()).unwrap().unwrap();
    assert_eq!(third.version, 1002);
    assert_eq!(&cache.get("k", &owner).unwrap().unwrap().as_bytes().unwrap()[..], b"v3");
}

#[test]
fn test_retried_lock_is_idempotent() {
    let cache = CacheBuilder::new(64).build().unwrap();
    cache
        .insert("k", item(b"v"), &WriteOptions::default(), &OperationContext::new())
        .unwrap();

    let ctx = OperationContext::new().with_client_id("c1").with_thread_id(7);
    let first = cache.lock("k", None, &ctx).unwrap();
    assert!(first.granted);

    let retry = cache.lock("k", None, &ctx.clone().with_retry(true)).unwrap();
    assert!(retry.granted);
    assert_eq!(retry.holder.unwrap().lock_id, first.holder.as_ref().unwrap().lock_id);

    // Not a retry, or a retry from another thread, is a conflict.
    assert!(!cache.lock("k", None, &ctx).unwrap().granted);
    let foreign = OperationContext::new().with_client_id("c1").with_thread_id(8).with_retry(true);
    assert!(!cache.lock("k", None, &foreign).unwrap().granted);
}

#[test]
fn test_lazy_expiry_of_any_component() {
    let cache = CacheBuilder::new(64).build().unwrap();
    let w = WriteOptions::default();
    let ctx = OperationContext::new();
    cache.insert("parent", item(b"p"), &w, &ctx).unwrap();

    // A long lifetime and a dependency: the dependency fires first.
    let policy = ExpirationPolicy::lifetime(Lifetime::Ttl(Duration::from_secs(3600))).with_dependencies(["parent".into()]);
    cache.insert("by-dependency", item(b"x").with_expiration(policy), &w, &ctx).unwrap();

    // A short lifetime and a dependency: the lifetime fires first.
    let policy =
        ExpirationPolicy::lifetime(Lifetime::Ttl(Duration::from_millis(20))).with_dependencies(["parent".into()]);
    cache.insert("by-lifetime", item(b"x").with_expiration(policy), &w, &ctx).unwrap();

    thread::sleep(Duration::from_millis(50));
    assert!(cache.get("by-lifetime", &ctx).unwrap().is_none());
    assert!(cache.get("by-dependency", &ctx).unwrap().is_some());

    cache.remove("parent", &w, &ctx).unwrap();
    assert!(cache.get("by-dependency", &ctx).unwrap().is_none());
    assert_eq!(cache.count(), 0);
}

#[derive(Debug, Default)]
struct Membership {
    dead: Mutex<HashSet<String>>,
}

impl NodeMembership for Membership {
    fn is_alive(&self, node: &str) -> bool {
        !self.dead.lock().contains(node)
    }
}

#[test]
fn test_node_bound_expiry() {
    let membership = Arc::new(Membership::default());
    let cache = CacheBuilder::new(64).with_membership(membership.clone()).build().unwrap();
    let ctx = OperationContext::new();
    let policy = ExpirationPolicy::default().with_node("node-2");
    cache
        .insert("k", item(b"v").with_expiration(policy), &WriteOptions::default(), &ctx)
        .unwrap();

    assert!(cache.contains("k", &ctx).unwrap());
    membership.dead.lock().insert("node-2".to_string());
    assert!(!cache.contains("k", &ctx).unwrap());
}

#[test]
fn test_cyclic_dependencies_collapse() {
    let registry = AtomicMetricsRegistry::new();
    let cache = CacheBuilder::new(64)
        .with_name("cycle")
        .with_metrics_registry(registry.clone())
        .build()
        .unwrap();
    let w = WriteOptions::default();
    let ctx = OperationContext::new();

    cache.insert("a", item(b"a"), &w, &ctx).unwrap();
    let on_a = ExpirationPolicy::default().with_dependencies(["a".into()]);
    cache.insert("b", item(b"b").with_expiration(on_a.clone()), &w, &ctx).unwrap();
    cache.insert("c", item(b"c").with_expiration(on_a), &w, &ctx).unwrap();

    // Closing the loop replaces "a", which takes its dependents down with it.
    let on_b = ExpirationPolicy::default().with_dependencies(["b".into()]);
    cache.insert("a", item(b"a2").with_expiration(on_b), &w, &ctx).unwrap();
    assert!(!cache.contains("b", &ctx).unwrap());
    assert!(!cache.contains("c", &ctx).unwrap());

    // "a" now depends on a key that is gone.
    assert!(cache.get("a", &ctx).unwrap().is_none());
    assert_eq!(cache.count(), 0);
    assert_eq!(registry.counter("coffer_cache_op_total", &["cycle", "cascade_remove"]), 2);
}

#[test_log::test]
fn test_pools_balance_under_faults() {
    let backend = FaultyBackend::new(Arc::new(MemoryStore::new(4, 2)));
    let cache = CacheBuilder::new(4)
        .with_backend(Arc::new(backend.clone()))
        .with_transactional_pool_capacity(2)
        .build()
        .unwrap();
    let w = WriteOptions::default();
    let ctx = OperationContext::new();

    for fault in [Fault::Error, Fault::Failure, Fault::NeedsEviction] {
        backend.fail_insert(Some(fault));
        let results = cache
            .insert_bulk((0..8).map(|i| (format!("k{i}"), item(b"v"))), &w, &ctx)
            .unwrap();
        for (_, result) in results {
            match fault {
                Fault::Error => assert_eq!(result.unwrap_err().kind(), ErrorKind::OperationFailed),
                Fault::Failure => assert!(result.unwrap().is_none()),
                Fault::NeedsEviction => assert_eq!(result.unwrap_err().kind(), ErrorKind::NeedsEviction),
            }
        }
    }
    backend.fail_insert(None);

    // The store holds 4 entries, the rest need eviction.
    let results = cache
        .insert_bulk((0..8).map(|i| (format!("k{i}"), item(b"v"))), &w, &ctx)
        .unwrap();
    assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 4);

    backend.fail_remove(Some(Fault::Error));
    let results = cache.remove_bulk((0..8).map(|i| format!("k{i}")), &w, &ctx).unwrap();
    assert_eq!(
        results
            .iter()
            .filter(|(_, r)| matches!(r, Err(e) if e.kind() == ErrorKind::OperationFailed))
            .count(),
        4
    );
    backend.fail_remove(None);

    let [entries, contexts] = cache.pool_stats();
    assert_eq!(entries.in_use(), 0);
    assert_eq!(contexts.in_use(), 0);
    assert_eq!(cache.count(), 4);
}

#[test]
fn test_shutdown_block_times_out() {
    let registry = AtomicMetricsRegistry::new();
    let interval = Duration::from_millis(50);
    let cache = CacheBuilder::new(64)
        .with_name("drain")
        .with_graceful_block_interval(interval)
        .with_metrics_registry(registry.clone())
        .build()
        .unwrap();
    let ctx = OperationContext::new();
    assert!(cache.start_graceful_shutdown());
    assert!(!cache.start_graceful_shutdown());

    let start = Instant::now();
    cache.insert("k", item(b"v"), &WriteOptions::default(), &ctx).unwrap();
    assert!(start.elapsed() >= interval);
    assert_eq!(registry.counter("coffer_shutdown_blocked_total", &["drain"]), 1);

    // Exempt callers are not blocked.
    let start = Instant::now();
    cache.get("k", &OperationContext::new().with_no_graceful_block(true)).unwrap();
    assert!(start.elapsed() < interval);

    assert!(cache.cancel_shutdown());
    assert_eq!(cache.shutdown_status(), ShutdownStatus::None);
}

#[test]
fn test_shutdown_completion_fails_blocked_operations() {
    let cache = CacheBuilder::new(64)
        .with_graceful_block_interval(Duration::from_secs(10))
        .build()
        .unwrap();
    cache.start_graceful_shutdown();

    let blocked = {
        let cache = cache.clone();
        thread::spawn(move || cache.get("k", &OperationContext::new()))
    };
    thread::sleep(Duration::from_millis(50));
    cache.complete_shutdown();

    let e = blocked.join().unwrap().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ShutDown);
    assert_eq!(cache.shutdown_status(), ShutdownStatus::ShutdownCompleted);
}

#[test]
fn test_shutdown_allowed_by_backend() {
    let backend = FaultyBackend::new(Arc::new(MemoryStore::new(64, 4)));
    backend.allow_while_draining(true);
    let cache = CacheBuilder::new(64)
        .with_backend(Arc::new(backend))
        .with_graceful_block_interval(Duration::from_secs(10))
        .build()
        .unwrap();
    cache.start_graceful_shutdown();

    let start = Instant::now();
    assert!(cache.get("k", &OperationContext::new()).unwrap().is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
}
