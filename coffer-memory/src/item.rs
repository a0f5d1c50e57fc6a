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

//! Request and result types of the cache facade.

use std::time::Duration;

use coffer_common::code::Payload;

use crate::{
    eviction::EvictionHint,
    expiration::ExpirationPolicy,
    flags::FlagSet,
    lock::{LockAccessType, LockHandle, LockId},
    metadata::{GroupInfo, QueryInfo},
    notification::Notifications,
};

/// What a caller asks to store under a key.
#[derive(Debug, Clone)]
pub struct CacheItem {
    /// The value.
    pub value: Payload,
    /// Expiration, built into a hint at insertion time.
    pub expiration: Option<ExpirationPolicy>,
    /// Eviction hint.
    pub eviction: Option<EvictionHint>,
    /// Group membership.
    pub group: Option<GroupInfo>,
    /// Secondary index attributes.
    pub query_info: Option<QueryInfo>,
    /// Caller flags.
    pub flags: FlagSet,
    /// Callbacks to register with the entry.
    pub notifications: Option<Notifications>,
    /// Read/write-through provider.
    pub provider_name: Option<String>,
    /// Provider used to resync the entry when it expires.
    pub resync_provider_name: Option<String>,
}

impl CacheItem {
    /// An item with `value` and no metadata.
    pub fn new(value: impl Into<Payload>) -> Self {
        Self {
            value: value.into(),
            expiration: None,
            eviction: None,
            group: None,
            query_info: None,
            flags: FlagSet::empty(),
            notifications: None,
            provider_name: None,
            resync_provider_name: None,
        }
    }

    /// Set the expiration policy.
    pub fn with_expiration(mut self, expiration: ExpirationPolicy) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Set the eviction hint.
    pub fn with_eviction(mut self, eviction: EvictionHint) -> Self {
        self.eviction = Some(eviction);
        self
    }

    /// Set the group membership.
    pub fn with_group(mut self, group: Option<GroupInfo>) -> Self {
        self.group = group;
        self
    }

    /// Set the secondary index attributes.
    pub fn with_query_info(mut self, query_info: QueryInfo) -> Self {
        self.query_info = Some(query_info);
        self
    }

    /// Set caller flags.
    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    /// Set the callbacks to register.
    pub fn with_notifications(mut self, notifications: Notifications) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Set the read/write-through provider.
    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Set the resync provider.
    pub fn with_resync_provider(mut self, name: impl Into<String>) -> Self {
        self.resync_provider_name = Some(name.into());
        self
    }
}

/// Lock and version requirements of a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Lock mode.
    pub access: LockAccessType,
    /// Lock the caller claims to hold.
    pub lock_id: Option<LockId>,
    /// Expected stored version, checked under [`LockAccessType::CompareVersion`].
    pub version: Option<u64>,
}

impl WriteOptions {
    /// Write in `access` mode.
    pub fn access(access: LockAccessType) -> Self {
        Self {
            access,
            ..Default::default()
        }
    }

    /// Write under the lock `lock_id`.
    pub fn with_lock_id(mut self, lock_id: LockId) -> Self {
        self.lock_id = Some(lock_id);
        self
    }

    /// Expect the stored version to be `version`.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }
}

/// Lock requirements of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Lock mode. [`LockAccessType::Acquire`] locks the entry while reading it.
    pub access: LockAccessType,
    /// Lock the caller claims to hold.
    pub lock_id: Option<LockId>,
    /// Lifetime of a lock acquired by the read. `None` or zero never lapses.
    pub lock_ttl: Option<Duration>,
}

impl ReadOptions {
    /// Read and lock the entry for `ttl`.
    pub fn acquire(ttl: Option<Duration>) -> Self {
        Self {
            access: LockAccessType::Acquire,
            lock_id: None,
            lock_ttl: ttl,
        }
    }

    /// Read under the lock `lock_id` without acquiring it.
    pub fn held(lock_id: LockId) -> Self {
        Self {
            access: LockAccessType::DontAcquire,
            lock_id: Some(lock_id),
            lock_ttl: None,
        }
    }
}

/// Outcome of a successful insert or add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Version now stored.
    pub version: u64,
    /// If an existing entry was replaced.
    pub overwritten: bool,
}

/// Outcome of a read subject to lock rules.
#[derive(Debug, Clone)]
pub struct LockedRead {
    /// If the lock rules let the read through: the lock was acquired, or it matched, or there was none.
    pub granted: bool,
    /// The value, when granted.
    pub value: Option<Payload>,
    /// Stored version.
    pub version: u64,
    /// Lock on the entry after the read.
    pub holder: Option<LockHandle>,
}
