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

use serde::{Deserialize, Serialize};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoveReason {
    /// Removed explicitly by a client.
    Removed,
    /// An expiration hint fired.
    Expired,
    /// A key the entry depended on was changed or removed.
    DependencyExpired,
    /// Chosen by the eviction policy to make room.
    Evicted,
    /// The whole store was cleared.
    Cleared,
}

/// Notification event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An existing entry was overwritten.
    ItemUpdated,
    /// An entry left the cache.
    ItemRemoved(RemoveReason),
}
