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

use std::borrow::Cow;

use super::{BoxedCounter, BoxedGauge, BoxedHistogram, RegistryOps};
use crate::metrics::registry::noop::NoopMetricsRegistry;

// FIXME: https://github.com/rust-lang/rust-analyzer/issues/17685
// #[expect(missing_docs)]
/// The counters sink shared by one cache instance and its pools.
#[derive(Debug)]
pub struct Metrics {
    /* cache operation metrics */
    /// ... ...
    pub cache_get: BoxedCounter,
    /// ... ...
    pub cache_hit: BoxedCounter,
    /// ... ...
    pub cache_miss: BoxedCounter,
    /// ... ...
    pub cache_add: BoxedCounter,
    /// ... ...
    pub cache_update: BoxedCounter,
    /// ... ...
    pub cache_remove: BoxedCounter,
    /// ... ...
    pub cache_clear: BoxedCounter,
    /// ... ...
    pub cache_expire: BoxedCounter,
    /// ... ...
    pub cache_resync: BoxedCounter,
    /// ... ...
    pub cache_cascade_remove: BoxedCounter,
    /// ... ...
    pub cache_notify: BoxedCounter,

    /// ... ...
    pub cache_count: BoxedGauge,

    /// ... ...
    pub cache_get_duration: BoxedHistogram,
    /// ... ...
    pub cache_update_duration: BoxedHistogram,

    /* lock metrics */
    /// ... ...
    pub lock_acquire: BoxedCounter,
    /// ... ...
    pub lock_release: BoxedCounter,
    /// ... ...
    pub lock_conflict: BoxedCounter,

    /* admission metrics */
    /// ... ...
    pub shutdown_blocked: BoxedCounter,
    /// ... ...
    pub shutdown_block_duration: BoxedHistogram,

    /* pool metrics */
    /// ... ...
    pub pool_hit: BoxedCounter,
    /// ... ...
    pub pool_miss: BoxedCounter,
    /// ... ...
    pub pool_grow: BoxedCounter,
    /// ... ...
    pub pool_recycle: BoxedCounter,
}

impl Metrics {
    /// Create a new metric with the given name.
    pub fn new(name: impl Into<Cow<'static, str>>, registry: &dyn RegistryOps) -> Self {
        let name = name.into();

        let coffer_cache_op_total =
            registry.register_counter_vec("coffer_cache_op_total".into(), "coffer cache operations".into(), &[
                "name", "op",
            ]);
        let coffer_cache_op_duration = registry.register_histogram_vec(
            "coffer_cache_op_duration".into(),
            "coffer cache op durations".into(),
            &["name", "op"],
        );
        let coffer_cache_count =
            registry.register_gauge_vec("coffer_cache_count".into(), "coffer cache entry count".into(), &["name"]);

        let op = |op: &'static str| coffer_cache_op_total.counter(&[name.clone(), op.into()]);

        let cache_get = op("get");
        let cache_hit = op("hit");
        let cache_miss = op("miss");
        let cache_add = op("add");
        let cache_update = op("update");
        let cache_remove = op("remove");
        let cache_clear = op("clear");
        let cache_expire = op("expire");
        let cache_resync = op("resync");
        let cache_cascade_remove = op("cascade_remove");
        let cache_notify = op("notify");

        let cache_count = coffer_cache_count.gauge(&[name.clone()]);

        let cache_get_duration = coffer_cache_op_duration.histogram(&[name.clone(), "get".into()]);
        let cache_update_duration = coffer_cache_op_duration.histogram(&[name.clone(), "update".into()]);

        let coffer_lock_op_total =
            registry.register_counter_vec("coffer_lock_op_total".into(), "coffer item lock operations".into(), &[
                "name", "op",
            ]);

        let lock_acquire = coffer_lock_op_total.counter(&[name.clone(), "acquire".into()]);
        let lock_release = coffer_lock_op_total.counter(&[name.clone(), "release".into()]);
        let lock_conflict = coffer_lock_op_total.counter(&[name.clone(), "conflict".into()]);

        let coffer_shutdown_blocked_total = registry.register_counter_vec(
            "coffer_shutdown_blocked_total".into(),
            "coffer operations held by the graceful shutdown gate".into(),
            &["name"],
        );
        let coffer_shutdown_block_duration = registry.register_histogram_vec(
            "coffer_shutdown_block_duration".into(),
            "coffer time spent waiting on the graceful shutdown gate".into(),
            &["name"],
        );

        let shutdown_blocked = coffer_shutdown_blocked_total.counter(&[name.clone()]);
        let shutdown_block_duration = coffer_shutdown_block_duration.histogram(&[name.clone()]);

        let coffer_pool_op_total =
            registry.register_counter_vec("coffer_pool_op_total".into(), "coffer object pool operations".into(), &[
                "name", "op",
            ]);

        let pool_hit = coffer_pool_op_total.counter(&[name.clone(), "hit".into()]);
        let pool_miss = coffer_pool_op_total.counter(&[name.clone(), "miss".into()]);
        let pool_grow = coffer_pool_op_total.counter(&[name.clone(), "grow".into()]);
        let pool_recycle = coffer_pool_op_total.counter(&[name.clone(), "recycle".into()]);

        Self {
            cache_get,
            cache_hit,
            cache_miss,
            cache_add,
            cache_update,
            cache_remove,
            cache_clear,
            cache_expire,
            cache_resync,
            cache_cascade_remove,
            cache_notify,
            cache_count,
            cache_get_duration,
            cache_update_duration,
            lock_acquire,
            lock_release,
            lock_conflict,
            shutdown_blocked,
            shutdown_block_duration,
            pool_hit,
            pool_miss,
            pool_grow,
            pool_recycle,
        }
    }

    /// Build noop metrics.
    ///
    /// Normally only used in tests or benches.
    pub fn noop() -> Self {
        Self::new("test", &NoopMetricsRegistry)
    }
}
