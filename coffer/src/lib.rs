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


//! coffer - entry lifecycle core of a distributed cache.
//!
//! coffer keeps the state of every cached entry coherent under concurrent access: expiration and eviction hints,
//! item locks, versions, notification registrations and the removal of entries that depend on removed keys. Storage
//! is pluggable behind [`StorageBackend`].
//!
//! ```
//! use coffer::{CacheBuilder, CacheItem, OperationContext, WriteOptions};
//!
//! let cache = CacheBuilder::new(1024).with_name("doc").build().unwrap();
//! let ctx = OperationContext::new().with_client_id("client-1");
//!
//! let outcome = cache
//!     .insert("key", CacheItem::new(&b"value"[..]), &WriteOptions::default(), &ctx)
//!     .unwrap()
//!     .unwrap();
//! assert!(!outcome.overwritten);
//!
//! let value = cache.get("key", &ctx).unwrap().unwrap();
//! assert_eq!(&value.as_bytes().unwrap()[..], b"value");
//! ```

pub use coffer_common as common;
pub use coffer_memory as memory;

mod prelude;
pub use prelude::*;
