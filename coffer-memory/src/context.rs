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

//! Per-operation metadata threaded through every cache call.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use coffer_common::{
    error::{Error, Result},
    object_pool::Reset,
};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically increasing operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl OperationId {
    fn next() -> Self {
        Self(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Cooperative cancellation flag.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    /// If cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

/// Names of the fields an [`OperationContext`] may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    /// Identity of the calling client.
    ClientId,
    /// Thread of the calling client, used together with the client id for lock re-entry.
    ThreadId,
    /// Explicit item version supplied by the caller.
    ItemVersion,
    /// Skip the graceful shutdown gate.
    NoGracefulBlock,
    /// Payload size measured by the caller.
    ValueDataSize,
    /// Cancellation token of a bulk operation.
    CancellationToken,
    /// The request is a client retry of an earlier attempt.
    IsRetryOperation,
    /// The operation replays a change from another node.
    IsReplicationOperation,
}

/// Values stored in an [`OperationContext`].
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// A string value.
    Text(String),
    /// An unsigned number.
    Number(u64),
    /// A boolean.
    Flag(bool),
    /// A cancellation token.
    Cancellation(CancellationToken),
}

/// An insertion-ordered map from [`FieldName`] to [`FieldValue`] plus an [`OperationId`].
///
/// Contexts are small, so fields live in a vector and lookups are linear.
#[derive(Debug, Clone)]
pub struct OperationContext {
    id: OperationId,
    fields: Vec<(FieldName, FieldValue)>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Reset for OperationContext {
    fn reset(&mut self) {
        self.fields.clear();
        self.id = OperationId::next();
    }
}

impl OperationContext {
    /// Create an empty context with a fresh operation id.
    pub fn new() -> Self {
        Self {
            id: OperationId::next(),
            fields: Vec::with_capacity(4),
        }
    }

    /// The operation id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Set a field, keeping its original position if it was present, and return the previous value.
    pub fn set(&mut self, name: FieldName, value: FieldValue) -> Option<FieldValue> {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => Some(std::mem::replace(v, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Get a field.
    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Remove a field.
    pub fn remove(&mut self, name: FieldName) -> Option<FieldValue> {
        let index = self.fields.iter().position(|(n, _)| *n == name)?;
        Some(self.fields.remove(index).1)
    }

    /// If the field is present.
    pub fn contains(&self, name: FieldName) -> bool {
        self.get(name).is_some()
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &(FieldName, FieldValue)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// If no field is set.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy every field of `other` into this context, keeping this context's id.
    pub fn copy_fields_from(&mut self, other: &OperationContext) {
        for (name, value) in other.fields() {
            self.set(*name, value.clone());
        }
    }

    fn text(&self, name: FieldName) -> Option<&str> {
        match self.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    fn number(&self, name: FieldName) -> Option<u64> {
        match self.get(name) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    fn flag(&self, name: FieldName) -> bool {
        matches!(self.get(name), Some(FieldValue::Flag(true)))
    }

    /// Set the client id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.set(FieldName::ClientId, FieldValue::Text(client_id.into()));
        self
    }

    /// Set the client thread id.
    pub fn with_thread_id(mut self, thread_id: u64) -> Self {
        self.set(FieldName::ThreadId, FieldValue::Number(thread_id));
        self
    }

    /// Set an explicit item version.
    pub fn with_item_version(mut self, version: u64) -> Self {
        self.set(FieldName::ItemVersion, FieldValue::Number(version));
        self
    }

    /// Bypass the graceful shutdown gate.
    pub fn with_no_graceful_block(mut self, no_graceful_block: bool) -> Self {
        self.set(FieldName::NoGracefulBlock, FieldValue::Flag(no_graceful_block));
        self
    }

    /// Set the payload size measured by the caller.
    pub fn with_value_data_size(mut self, size: u64) -> Self {
        self.set(FieldName::ValueDataSize, FieldValue::Number(size));
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.set(FieldName::CancellationToken, FieldValue::Cancellation(token));
        self
    }

    /// Mark the request as a retry.
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.set(FieldName::IsRetryOperation, FieldValue::Flag(retry));
        self
    }

    /// Mark the operation as a replicated change.
    pub fn with_replication(mut self, replication: bool) -> Self {
        self.set(FieldName::IsReplicationOperation, FieldValue::Flag(replication));
        self
    }

    /// Client id, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.text(FieldName::ClientId)
    }

    /// Client thread id, if any.
    pub fn thread_id(&self) -> Option<u64> {
        self.number(FieldName::ThreadId)
    }

    /// Explicit item version, if any.
    pub fn item_version(&self) -> Option<u64> {
        self.number(FieldName::ItemVersion)
    }

    /// If the graceful shutdown gate must be skipped.
    pub fn no_graceful_block(&self) -> bool {
        self.flag(FieldName::NoGracefulBlock)
    }

    /// Payload size measured by the caller, if any.
    pub fn value_data_size(&self) -> Option<u64> {
        self.number(FieldName::ValueDataSize)
    }

    /// Cancellation token, if any.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        match self.get(FieldName::CancellationToken) {
            Some(FieldValue::Cancellation(token)) => Some(token),
            _ => None,
        }
    }

    /// If the request is a retry.
    pub fn is_retry(&self) -> bool {
        self.flag(FieldName::IsRetryOperation)
    }

    /// If the operation replays a change from another node.
    pub fn is_replication(&self) -> bool {
        self.flag(FieldName::IsReplicationOperation)
    }

    /// Fail with [`coffer_common::error::ErrorKind::OperationCanceled`] if the token was canceled.
    pub fn check_canceled(&self, operation: &'static str, completed: usize, total: usize) -> Result<()> {
        match self.cancellation() {
            Some(token) if token.is_canceled() => Err(Error::canceled(operation, completed, total)),
            _ => Ok(()),
        }
    }
}
