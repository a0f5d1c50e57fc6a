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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Eviction priority, from first to last evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Evicted first.
    Low,
    /// Between low and normal.
    BelowNormal,
    /// The default priority.
    #[default]
    Normal,
    /// Between normal and high.
    AboveNormal,
    /// Evicted last among removable entries.
    High,
    /// Never chosen by the eviction policy.
    NotRemovable,
}

/// Data carried for the external eviction policy.
///
/// The core only carries, clones and refreshes these; choosing victims is up to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionHint {
    /// Priority based eviction.
    Priority(Priority),
    /// Frequency based eviction, counting hits.
    Counter(u32),
    /// Recency based eviction, remembering the last hit.
    Timestamp(DateTime<Utc>),
}

impl Default for EvictionHint {
    fn default() -> Self {
        EvictionHint::Priority(Priority::default())
    }
}

impl EvictionHint {
    /// Refresh the hint on a hit at `now`, returning if it changed.
    pub fn update(&mut self, now: DateTime<Utc>) -> bool {
        match self {
            EvictionHint::Priority(_) => false,
            EvictionHint::Counter(count) => {
                *count = count.saturating_add(1);
                true
            }
            EvictionHint::Timestamp(at) => {
                let changed = *at != now;
                *at = now;
                changed
            }
        }
    }

    /// If the policy may pick the entry at all.
    pub fn is_removable(&self) -> bool {
        !matches!(self, EvictionHint::Priority(Priority::NotRemovable))
    }

    /// Estimated memory footprint.
    pub fn in_memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}
