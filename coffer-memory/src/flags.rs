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

use bitflags::bitflags;

bitflags! {
    /// Per-entry bit flags.
    ///
    /// [`FlagSet::FLATTENED`] and [`FlagSet::LOCKED_ITEM`] are owned by the entry itself and follow its value and lock
    /// state. The other bits are caller hints carried alongside the entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct FlagSet: u16 {
        /// The payload bytes are compressed.
        const COMPRESSED = 0b0000_0000_0001;
        /// The payload holds pre-serialized bytes rather than a live object.
        const FLATTENED = 0b0000_0000_0010;
        /// The entry carries a pessimistic lock.
        const LOCKED_ITEM = 0b0000_0000_0100;
        /// Writes go through to the data source synchronously.
        const WRITE_THRU = 0b0000_0000_1000;
        /// Writes go to the data source asynchronously.
        const WRITE_BEHIND = 0b0000_0001_0000;
        /// Misses are loaded from the data source.
        const READ_THRU = 0b0000_0010_0000;
        /// Expired entries are reloaded from the data source instead of being dropped.
        const RESYNC_EXPIRED_ITEMS = 0b0000_0100_0000;
        /// Data source failures do not fail the cache operation.
        const OPTIONAL_DS_OPERATION = 0b0000_1000_0000;
    }
}

impl FlagSet {
    /// Bits maintained by the entry and never taken from callers.
    pub const OWNED: FlagSet = FlagSet::FLATTENED.union(FlagSet::LOCKED_ITEM);

    /// Caller-provided bits, i.e. everything except [`FlagSet::OWNED`].
    pub fn caller_bits(self) -> FlagSet {
        self.difference(Self::OWNED)
    }
}
