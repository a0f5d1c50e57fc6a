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

use std::{any::Any, fmt::Debug, sync::Arc};

use bytes::Bytes;

/// Cache key.
///
/// Keys are cloned into dependency indexes, lock tables and event payloads, so a shared string is used.
pub type Key = Arc<str>;

/// Opaque cached payload.
///
/// A payload is either a pre-serialized byte representation or a live object, never both.
#[derive(Clone)]
pub enum Payload {
    /// Pre-serialized ("flattened") bytes.
    Bytes(Bytes),
    /// A live object owned by the caller's type system.
    Object(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    /// Wrap a live object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Payload::Object(Arc::new(value))
    }

    /// If the payload holds pre-serialized bytes.
    pub fn is_flattened(&self) -> bool {
        matches!(self, Payload::Bytes(_))
    }

    /// The serialized bytes, if flattened.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Object(_) => None,
        }
    }

    /// Downcast a live object payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Bytes(_) => None,
            Payload::Object(object) => object.downcast_ref::<T>(),
        }
    }

    /// Size in bytes when it is known without serializing.
    pub fn known_size(&self) -> Option<usize> {
        self.as_bytes().map(Bytes::len)
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(bytes: &'static [u8]) -> Self {
        Payload::Bytes(Bytes::from_static(bytes))
    }
}
