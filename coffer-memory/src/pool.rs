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

use std::{sync::Arc, time::Duration};

use coffer_common::{
    error::Result,
    metrics::model::Metrics,
    object_pool::{PoolStats, StoreLease, StorePool, TransactionalLease, TransactionalPool},
};

use crate::{context::OperationContext, entry::CacheEntry};

/// Pools of one cache instance.
///
/// Entries come from the store tier since the backend may keep them. Per-item contexts of bulk operations come from
/// the transactional tier and never leave the call that rented them.
#[derive(Debug, Clone)]
pub struct PoolManager {
    entries: StorePool<CacheEntry>,
    contexts: TransactionalPool<OperationContext>,
}

impl PoolManager {
    /// Create the pools.
    pub fn new(
        store_capacity: usize,
        store_max_capacity: usize,
        transactional_capacity: usize,
        wait_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            entries: StorePool::new("entries", store_capacity, store_max_capacity, metrics.clone()),
            contexts: TransactionalPool::new("contexts", transactional_capacity, wait_timeout, metrics),
        }
    }

    /// Rent an empty entry.
    pub fn entry(&self) -> StoreLease<CacheEntry> {
        self.entries.acquire()
    }

    /// Return an entry the store no longer holds.
    pub fn recycle_entry(&self, entry: CacheEntry) {
        self.entries.recycle(entry);
    }

    /// Rent an empty context, waiting for one up to the pool's wait timeout.
    pub fn context(&self) -> Result<TransactionalLease<OperationContext>> {
        self.contexts.acquire()
    }

    /// Rent a context carrying the fields of `parent` under a fresh operation id.
    pub fn child_context(&self, parent: &OperationContext) -> Result<TransactionalLease<OperationContext>> {
        let mut ctx = self.context()?;
        ctx.copy_fields_from(parent);
        Ok(ctx)
    }

    /// Bookkeeping of the entry pool and the context pool.
    pub fn stats(&self) -> [PoolStats; 2] {
        [self.entries.stats(), self.contexts.stats()]
    }
}
