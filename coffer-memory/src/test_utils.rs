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


//! Utilities for testing.

use std::sync::Arc;

use coffer_common::{
    code::Key,
    error::{Error, ErrorKind, Result},
    object_pool::StoreLease,
};
use parking_lot::Mutex;

use crate::{
    backend::{InsertResult, SharedEntry, StorageBackend},
    context::OperationContext,
    entry::CacheEntry,
    shutdown::OperationCategory,
};

/// A fault injected into a [`FaultyBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the call with an operation error.
    Error,
    /// Decline the insert.
    Failure,
    /// Report the store as full.
    NeedsEviction,
}

#[derive(Debug, Default)]
struct Faults {
    get: Option<Fault>,
    insert: Option<Fault>,
    remove: Option<Fault>,
    allowed_while_draining: bool,
}

/// A backend that delegates to another one unless a fault is armed for the call.
#[derive(Debug, Clone)]
pub struct FaultyBackend {
    inner: Arc<dyn StorageBackend>,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyBackend {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }

    /// Arm or disarm the fault of `get`.
    pub fn fail_get(&self, fault: Option<Fault>) {
        self.faults.lock().get = fault;
    }

    /// Arm or disarm the fault of `insert`.
    pub fn fail_insert(&self, fault: Option<Fault>) {
        self.faults.lock().insert = fault;
    }

    /// Arm or disarm the fault of `remove`.
    pub fn fail_remove(&self, fault: Option<Fault>) {
        self.faults.lock().remove = fault;
    }

    /// Let every operation through a graceful shutdown.
    pub fn allow_while_draining(&self, allowed: bool) {
        self.faults.lock().allowed_while_draining = allowed;
    }

    fn error(operation: &'static str) -> Error {
        Error::new(ErrorKind::OperationFailed, "injected fault").with_context("operation", operation)
    }
}

impl StorageBackend for FaultyBackend {
    fn get(&self, key: &str, ctx: &OperationContext) -> Result<Option<SharedEntry>> {
        match self.faults.lock().get {
            Some(_) => Err(Self::error("get")),
            None => self.inner.get(key, ctx),
        }
    }

    fn insert(&self, key: Key, entry: StoreLease<CacheEntry>, ctx: &OperationContext) -> Result<InsertResult> {
        let fault = self.faults.lock().insert;
        match fault {
            Some(Fault::Error) => Err(Self::error("insert")),
            Some(Fault::Failure) => Ok(InsertResult::Failure),
            Some(Fault::NeedsEviction) => Ok(InsertResult::NeedsEviction),
            None => self.inner.insert(key, entry, ctx),
        }
    }

    fn remove(&self, key: &str, ctx: &OperationContext) -> Result<Option<SharedEntry>> {
        match self.faults.lock().remove {
            Some(_) => Err(Self::error("remove")),
            None => self.inner.remove(key, ctx),
        }
    }

    fn clear(&self, ctx: &OperationContext) -> Result<Vec<SharedEntry>> {
        self.inner.clear(ctx)
    }

    fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn keys(&self) -> Vec<Key> {
        self.inner.keys()
    }

    fn dependents_of(&self, key: &str) -> Vec<Key> {
        self.inner.dependents_of(key)
    }

    fn is_operation_allowed(&self, keys: &[Key], category: OperationCategory, ctx: &OperationContext) -> bool {
        self.faults.lock().allowed_while_draining || self.inner.is_operation_allowed(keys, category, ctx)
    }
}
