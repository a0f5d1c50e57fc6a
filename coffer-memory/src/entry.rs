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

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use coffer_common::{
    code::{Key, Payload},
    object_pool::Reset,
};

use crate::{
    context::OperationContext,
    eviction::EvictionHint,
    expiration::{ExpirationContext, ExpirationHint},
    flags::FlagSet,
    lock::{LockAccessType, LockExpiration, LockHandle, LockIdGenerator, LockOutcome, LockState},
    metadata::{query_info_size, GroupInfo, QueryInfo},
    notification::Notifications,
};

/// [`CacheEntry`] is the unit of storage: a value plus everything that governs its lifecycle.
///
/// Invariants kept by the setters:
///
/// - [`FlagSet::FLATTENED`] is set iff the value holds pre-serialized bytes.
/// - [`FlagSet::LOCKED_ITEM`] is set iff the entry carries a lock with an id.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    value: Option<Payload>,
    expiration: Option<ExpirationHint>,
    eviction: Option<EvictionHint>,
    group: Option<GroupInfo>,
    query_info: Option<QueryInfo>,
    version: u64,
    lock: Option<LockState>,
    notifications: Option<Notifications>,
    flags: FlagSet,
    provider_name: Option<String>,
    resync_provider_name: Option<String>,
    /// Cached value size, -1 when unknown.
    data_size: i64,
    creation_time: DateTime<Utc>,
    last_modified_time: DateTime<Utc>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            value: None,
            expiration: None,
            eviction: None,
            group: None,
            query_info: None,
            version: 0,
            lock: None,
            notifications: None,
            flags: FlagSet::empty(),
            provider_name: None,
            resync_provider_name: None,
            data_size: -1,
            creation_time: DateTime::<Utc>::default(),
            last_modified_time: DateTime::<Utc>::default(),
        }
    }
}

impl Reset for CacheEntry {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

impl CacheEntry {
    /// Create an entry holding `value`, created at `now`.
    pub fn new(value: Payload, now: DateTime<Utc>) -> Self {
        let mut entry = Self::default();
        entry.set_value(Some(value));
        entry.creation_time = now;
        entry.last_modified_time = now;
        entry
    }

    /// The value.
    pub fn value(&self) -> Option<&Payload> {
        self.value.as_ref()
    }

    /// Replace the value, keeping [`FlagSet::FLATTENED`] in step. Returns the previous value.
    pub fn set_value(&mut self, value: Option<Payload>) -> Option<Payload> {
        self.flags
            .set(FlagSet::FLATTENED, value.as_ref().is_some_and(Payload::is_flattened));
        self.data_size = -1;
        std::mem::replace(&mut self.value, value)
    }

    /// Take the value out, leaving the entry empty.
    pub fn take_value(&mut self) -> Option<Payload> {
        self.set_value(None)
    }

    /// Expiration hint.
    pub fn expiration(&self) -> Option<&ExpirationHint> {
        self.expiration.as_ref()
    }

    /// Mutable expiration hint.
    pub fn expiration_mut(&mut self) -> Option<&mut ExpirationHint> {
        self.expiration.as_mut()
    }

    /// Replace the expiration hint.
    pub fn set_expiration(&mut self, expiration: Option<ExpirationHint>) -> Option<ExpirationHint> {
        std::mem::replace(&mut self.expiration, expiration)
    }

    /// Eviction hint.
    pub fn eviction(&self) -> Option<&EvictionHint> {
        self.eviction.as_ref()
    }

    /// Replace the eviction hint.
    pub fn set_eviction(&mut self, eviction: Option<EvictionHint>) {
        self.eviction = eviction;
    }

    /// Group membership.
    pub fn group(&self) -> Option<&GroupInfo> {
        self.group.as_ref()
    }

    /// Replace the group membership.
    pub fn set_group(&mut self, group: Option<GroupInfo>) {
        self.group = group;
    }

    /// Secondary index attributes.
    pub fn query_info(&self) -> Option<&QueryInfo> {
        self.query_info.as_ref()
    }

    /// Replace the secondary index attributes. An empty map is stored as `None`.
    pub fn set_query_info(&mut self, query_info: Option<QueryInfo>) {
        self.query_info = query_info.filter(|info| !info.is_empty());
    }

    /// Flags.
    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    /// OR caller flags into the entry. Bits owned by the entry are ignored.
    pub fn add_flags(&mut self, flags: FlagSet) {
        self.flags |= flags.caller_bits();
    }

    /// Name of the read/write-through provider.
    pub fn provider_name(&self) -> Option<&str> {
        self.provider_name.as_deref()
    }

    /// Set the name of the read/write-through provider.
    pub fn set_provider_name(&mut self, name: Option<String>) {
        self.provider_name = name;
    }

    /// Name of the provider used to resync expired entries.
    pub fn resync_provider_name(&self) -> Option<&str> {
        self.resync_provider_name.as_deref()
    }

    /// Set the name of the provider used to resync expired entries.
    pub fn set_resync_provider_name(&mut self, name: Option<String>) {
        self.resync_provider_name = name;
    }

    /// When the entry was first added.
    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// Set when the entry was first added.
    pub fn set_creation_time(&mut self, at: DateTime<Utc>) {
        self.creation_time = at;
    }

    /// When the entry was last written.
    pub fn last_modified_time(&self) -> DateTime<Utc> {
        self.last_modified_time
    }

    /// Set when the entry was last written.
    pub fn set_last_modified_time(&mut self, at: DateTime<Utc>) {
        self.last_modified_time = at;
    }

    /// Refresh sliding expiration and eviction hints after a hit at `now`.
    pub fn on_access(&mut self, now: DateTime<Utc>) {
        if let Some(expiration) = self.expiration.as_mut() {
            expiration.reset_variant(now);
        }
        if let Some(eviction) = self.eviction.as_mut() {
            eviction.update(now);
        }
    }

    /// If the expiration hint fires, without side effects.
    pub fn is_expired(&self, ctx: &dyn ExpirationContext) -> bool {
        self.expiration.as_ref().is_some_and(|hint| hint.is_expired(ctx))
    }

    /// If the expiration hint fires, latching its expired bit.
    pub fn determine_expiration(&mut self, ctx: &dyn ExpirationContext) -> bool {
        self.expiration
            .as_mut()
            .is_some_and(|hint| hint.determine_expiration(ctx))
    }

    /// If the entry is to be refreshed from its resync provider instead of dropped when it expires.
    pub fn needs_resync(&self) -> bool {
        self.flags.contains(FlagSet::RESYNC_EXPIRED_ITEMS)
            || self.expiration.as_ref().is_some_and(ExpirationHint::needs_resync)
    }

    /// Keys this entry depends on.
    pub fn key_dependencies(&self) -> Vec<Key> {
        self.expiration
            .as_ref()
            .map(ExpirationHint::key_dependencies)
            .unwrap_or_default()
    }

    /* lock */

    /// Lock metadata.
    pub fn lock_state(&self) -> Option<&LockState> {
        self.lock.as_ref()
    }

    /// The current lock as a handle.
    pub fn lock_handle(&self) -> Option<LockHandle> {
        self.lock.as_ref().and_then(LockState::handle)
    }

    /// Try to lock the entry for the caller identified by `ctx`.
    ///
    /// An unlocked entry, or one whose lock lapsed, is locked with a fresh id from `generator`. A locked entry is
    /// granted again only to a retried request from the client thread that owns the lock, which keeps its lock id.
    /// Otherwise the outcome reports the conflicting lock.
    pub fn lock(
        &mut self,
        key: &str,
        generator: &LockIdGenerator,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
        ctx: &OperationContext,
    ) -> LockOutcome {
        if self.is_locked(now) {
            let granted = ctx.is_retry()
                && self
                    .lock
                    .as_ref()
                    .is_some_and(|state| state.is_owned_by(ctx.client_id(), ctx.thread_id()));
            return LockOutcome {
                granted,
                holder: self.lock_handle(),
            };
        }

        let expiration = ttl.filter(|ttl| !ttl.is_zero()).map(|ttl| {
            let mut expiration = LockExpiration::new(ttl);
            expiration.arm(now);
            expiration
        });
        self.lock = Some(LockState {
            lock_id: Some(generator.generate(key)),
            lock_date: now,
            expiration,
            access_type: LockAccessType::Acquire,
            client_id: ctx.client_id().map(str::to_string),
            thread_id: ctx.thread_id(),
        });
        self.flags.insert(FlagSet::LOCKED_ITEM);

        LockOutcome {
            granted: true,
            holder: self.lock_handle(),
        }
    }

    /// If the entry is locked at `now`. A lapsed lock is released on the way.
    pub fn is_locked(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_item_locked() {
            return false;
        }
        if self.lock.as_ref().is_some_and(|state| state.has_expired(now)) {
            tracing::trace!("[entry]: release lapsed lock {:?}", self.lock_handle());
            self.release_lock();
            return false;
        }
        true
    }

    /// If the entry is flagged as locked, ignoring lock expiry.
    pub fn is_item_locked(&self) -> bool {
        self.flags.contains(FlagSet::LOCKED_ITEM)
    }

    /// If `lock_id` matches the lock held on the entry. Two empty ids match.
    pub fn compare_lock(&self, lock_id: Option<&str>) -> bool {
        if !self.is_item_locked() {
            return false;
        }
        let held = self.lock.as_ref().and_then(|state| state.lock_id.as_deref());
        held == lock_id
    }

    /// Release the lock if `preemptive` or if `lock_id` matches the held one. Returns if the lock was released.
    pub fn unlock(&mut self, lock_id: Option<&str>, preemptive: bool) -> bool {
        if preemptive || self.compare_lock(lock_id) {
            self.release_lock();
            return true;
        }
        false
    }

    /// Clear the lock and its flag.
    pub fn release_lock(&mut self) {
        self.lock = None;
        self.flags.remove(FlagSet::LOCKED_ITEM);
    }

    /// Take over `lock`, e.g. from the entry being overwritten.
    pub fn copy_lock(&mut self, lock: Option<&LockState>) {
        let locked = lock.is_some_and(|state| state.lock_id.is_some());
        self.lock = lock.filter(|_| locked).cloned();
        self.flags.set(FlagSet::LOCKED_ITEM, locked);
    }

    /* version */

    /// Stored version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Set the stored version.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Take the version following the one of `old`.
    pub fn update_version(&mut self, old: &CacheEntry) {
        self.version = old.version.saturating_add(1);
    }

    /// If the entry is newer than `version`.
    pub fn is_newer(&self, version: u64) -> bool {
        self.version > version
    }

    /// If the entry is at `version`.
    pub fn compare_version(&self, version: u64) -> bool {
        self.version == version
    }

    /* notifications */

    /// Registered callbacks.
    pub fn notifications(&self) -> Option<&Notifications> {
        self.notifications.as_ref()
    }

    /// Registered callbacks, created on first use.
    pub fn notifications_mut(&mut self) -> &mut Notifications {
        self.notifications.get_or_insert_with(Notifications::default)
    }

    /// Replace the registered callbacks. An empty registry is stored as `None`.
    pub fn set_notifications(&mut self, notifications: Option<Notifications>) {
        self.notifications = notifications.filter(|n| !n.is_empty());
    }

    /// Keep the callbacks registered on `old`, which this entry is replacing.
    pub fn merge_callback_listeners(&mut self, old: &CacheEntry) {
        if let Some(theirs) = old.notifications.as_ref().filter(|n| !n.is_empty()) {
            self.notifications_mut().merge(theirs);
        }
    }

    /// Drop every callback of `client_id`.
    pub fn remove_client_callbacks(&mut self, client_id: &str) -> usize {
        let Some(notifications) = self.notifications.as_mut() else {
            return 0;
        };
        let removed = notifications.remove_client(client_id);
        if notifications.is_empty() {
            self.notifications = None;
        }
        removed
    }

    /* sizes and copies */

    /// Size of the value in bytes.
    ///
    /// A size supplied through the context wins and is cached. Otherwise the size is computed from flattened values;
    /// live objects report 0 and stay unknown.
    pub fn data_size(&mut self, ctx: &OperationContext) -> u64 {
        if let Some(size) = ctx.value_data_size() {
            self.data_size = i64::try_from(size).unwrap_or(i64::MAX);
            return size;
        }
        if self.data_size >= 0 {
            return self.data_size as u64;
        }
        match self.value.as_ref().and_then(Payload::known_size) {
            Some(size) => {
                self.data_size = i64::try_from(size).unwrap_or(i64::MAX);
                size as u64
            }
            None => 0,
        }
    }

    /// Cached value size, -1 when unknown.
    pub fn cached_data_size(&self) -> i64 {
        self.data_size
    }

    /// Estimated memory footprint of the entry and its metadata.
    pub fn in_memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.value.as_ref().and_then(Payload::known_size).unwrap_or(0)
            + self.expiration.as_ref().map_or(0, ExpirationHint::in_memory_size)
            + self.eviction.as_ref().map_or(0, EvictionHint::in_memory_size)
            + self.group.as_ref().map_or(0, GroupInfo::in_memory_size)
            + self.query_info.as_ref().map_or(0, query_info_size)
            + self.notifications.as_ref().map_or(0, Notifications::in_memory_size)
            + self.lock.as_ref().map_or(0, |_| std::mem::size_of::<LockState>())
            + self.provider_name.as_ref().map_or(0, String::len)
            + self.resync_provider_name.as_ref().map_or(0, String::len)
    }

    /// A copy with every piece of metadata but without the value.
    pub fn clone_without_value(&self) -> CacheEntry {
        let mut entry = CacheEntry {
            value: None,
            ..self.clone_metadata()
        };
        entry.flags.remove(FlagSet::FLATTENED);
        entry
    }

    /// A copy that owns its own value buffer. Live objects stay shared.
    pub fn deep_clone(&self) -> CacheEntry {
        let value = self.value.as_ref().map(|value| match value {
            Payload::Bytes(bytes) => Payload::Bytes(Bytes::copy_from_slice(bytes)),
            Payload::Object(object) => Payload::Object(object.clone()),
        });
        CacheEntry {
            value,
            data_size: self.data_size,
            ..self.clone_metadata()
        }
    }

    fn clone_metadata(&self) -> CacheEntry {
        CacheEntry {
            value: None,
            expiration: self.expiration.clone(),
            eviction: self.eviction,
            group: self.group.clone(),
            query_info: self.query_info.clone(),
            version: self.version,
            lock: self.lock.clone(),
            notifications: self.notifications.clone(),
            flags: self.flags,
            provider_name: self.provider_name.clone(),
            resync_provider_name: self.resync_provider_name.clone(),
            data_size: -1,
            creation_time: self.creation_time,
            last_modified_time: self.last_modified_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::{
        expiration::{tests::TestContext, HintBits},
        notification::CallbackInfo,
    };

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn owner() -> OperationContext {
        OperationContext::new().with_client_id("c1").with_thread_id(7)
    }

    #[test]
    fn test_flattened_follows_value() {
        let mut entry = CacheEntry::new(Payload::from(b"bytes".as_slice()), t0());
        assert!(entry.flags().contains(FlagSet::FLATTENED));

        entry.set_value(Some(Payload::object(42u32)));
        assert!(!entry.flags().contains(FlagSet::FLATTENED));

        entry.set_value(Some(Payload::from(vec![1, 2, 3])));
        assert!(entry.flags().contains(FlagSet::FLATTENED));

        assert!(entry.take_value().is_some());
        assert!(!entry.flags().contains(FlagSet::FLATTENED));
    }

    #[test]
    fn test_add_flags_ignores_owned_bits() {
        let mut entry = CacheEntry::default();
        entry.add_flags(FlagSet::WRITE_THRU | FlagSet::LOCKED_ITEM | FlagSet::FLATTENED);
        entry.add_flags(FlagSet::COMPRESSED);
        assert_eq!(entry.flags(), FlagSet::WRITE_THRU | FlagSet::COMPRESSED);
        assert!(!entry.is_item_locked());
    }

    #[test]
    fn test_lock_conflict_reports_holder() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::default();

        let first = entry.lock("k", &generator, None, t0(), &owner());
        assert!(first.granted);
        assert!(entry.is_item_locked());

        let other = OperationContext::new().with_client_id("c2").with_thread_id(1);
        let second = entry.lock("k", &generator, None, t0(), &other);
        assert!(!second.granted);
        assert_eq!(second.holder, first.holder);
    }

    #[test]
    fn test_retry_reenters_with_same_id() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::default();

        let first = entry.lock("k", &generator, None, t0(), &owner());
        let plain = entry.lock("k", &generator, None, t0(), &owner());
        assert!(!plain.granted);

        let retried = entry.lock("k", &generator, None, t0(), &owner().with_retry(true));
        assert!(retried.granted);
        assert_eq!(retried.holder, first.holder);

        let stranger = OperationContext::new().with_client_id("c2").with_thread_id(7).with_retry(true);
        assert!(!entry.lock("k", &generator, None, t0(), &stranger).granted);
    }

    #[test]
    fn test_lapsed_lock_is_released_lazily() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::default();
        assert!(
            entry
                .lock("k", &generator, Some(Duration::from_secs(5)), t0(), &owner())
                .granted
        );

        assert!(entry.is_locked(t0() + TimeDelta::seconds(4)));
        assert!(!entry.is_locked(t0() + TimeDelta::seconds(6)));
        assert!(!entry.is_item_locked());
        assert!(entry.lock_state().is_none());

        let other = OperationContext::new().with_client_id("c2").with_thread_id(1);
        assert!(
            entry
                .lock("k", &generator, None, t0() + TimeDelta::seconds(6), &other)
                .granted
        );
    }

    #[test]
    fn test_zero_ttl_never_lapses() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::default();
        entry.lock("k", &generator, Some(Duration::ZERO), t0(), &owner());
        assert!(entry.is_locked(t0() + TimeDelta::days(365)));
    }

    #[test]
    fn test_unlock() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::default();
        let outcome = entry.lock("k", &generator, None, t0(), &owner());
        let id = outcome.holder.unwrap().lock_id;

        assert!(!entry.unlock(Some("other"), false));
        assert!(!entry.unlock(None, false));
        assert!(entry.is_item_locked());
        assert!(entry.unlock(Some(&*id), false));
        assert!(!entry.is_item_locked());
        assert!(entry.lock_handle().is_none());

        entry.lock("k", &generator, None, t0(), &owner());
        assert!(entry.unlock(Some("whatever"), true));
        assert!(!entry.is_item_locked());
    }

    #[test]
    fn test_compare_lock_empty_ids() {
        let mut entry = CacheEntry::default();
        assert!(!entry.compare_lock(None));

        let state = LockState {
            lock_id: None,
            ..Default::default()
        };
        entry.lock = Some(state);
        entry.flags.insert(FlagSet::LOCKED_ITEM);
        assert!(entry.compare_lock(None));
        assert!(!entry.compare_lock(Some("x")));
    }

    #[test]
    fn test_copy_lock() {
        let generator = LockIdGenerator::new("n");
        let mut old = CacheEntry::default();
        old.lock("k", &generator, None, t0(), &owner());

        let mut new = CacheEntry::default();
        new.copy_lock(old.lock_state());
        assert!(new.is_item_locked());
        assert_eq!(new.lock_handle(), old.lock_handle());

        new.copy_lock(None);
        assert!(!new.is_item_locked());
        assert!(new.lock_state().is_none());
    }

    #[test]
    fn test_versions() {
        let mut old = CacheEntry::default();
        old.set_version(1000);
        let mut new = CacheEntry::default();
        new.update_version(&old);
        assert_eq!(new.version(), 1001);
        assert!(new.is_newer(1000));
        assert!(!new.is_newer(1001));
        assert!(new.compare_version(1001));
    }

    #[test]
    fn test_merge_callback_listeners() {
        let mut old = CacheEntry::default();
        old.notifications_mut()
            .add_update_callback(CallbackInfo::new("c1", 1), false);
        old.notifications_mut()
            .add_remove_callback(CallbackInfo::new("c2", 2), false);

        let mut new = CacheEntry::default();
        new.notifications_mut()
            .add_update_callback(CallbackInfo::new("c1", 1), false);
        new.merge_callback_listeners(&old);

        let notifications = new.notifications().unwrap();
        assert_eq!(notifications.on_update().len(), 1);
        assert_eq!(notifications.on_remove().len(), 1);

        assert_eq!(new.remove_client_callbacks("c1"), 1);
        assert_eq!(new.remove_client_callbacks("c2"), 1);
        assert!(new.notifications().is_none());
    }

    #[test]
    fn test_data_size() {
        let mut entry = CacheEntry::new(Payload::from(vec![0u8; 10]), t0());
        assert_eq!(entry.cached_data_size(), -1);
        assert_eq!(entry.data_size(&OperationContext::new()), 10);
        assert_eq!(entry.cached_data_size(), 10);
        assert_eq!(entry.data_size(&OperationContext::new().with_value_data_size(64)), 64);
        assert_eq!(entry.data_size(&OperationContext::new()), 64);

        let mut live = CacheEntry::new(Payload::object("x"), t0());
        assert_eq!(live.data_size(&OperationContext::new()), 0);
        assert_eq!(live.cached_data_size(), -1);
    }

    #[test]
    fn test_clones() {
        let generator = LockIdGenerator::new("n");
        let mut entry = CacheEntry::new(Payload::from(vec![1u8, 2, 3]), t0());
        entry.set_version(9);
        entry.set_group(GroupInfo::new("g", None));
        entry.lock("k", &generator, None, t0(), &owner());

        let meta = entry.clone_without_value();
        assert!(meta.value().is_none());
        assert!(!meta.flags().contains(FlagSet::FLATTENED));
        assert!(meta.is_item_locked());
        assert_eq!(meta.version(), 9);
        assert_eq!(meta.group(), entry.group());

        let deep = entry.deep_clone();
        let (a, b) = (
            entry.value().and_then(Payload::as_bytes).unwrap(),
            deep.value().and_then(Payload::as_bytes).unwrap(),
        );
        assert_eq!(a, b);
        assert_ne!(a.as_ptr(), b.as_ptr());
        assert!(deep.flags().contains(FlagSet::FLATTENED));
    }

    #[test]
    fn test_expiry_and_access() {
        let mut entry = CacheEntry::new(Payload::from(vec![1u8]), t0());
        entry.set_expiration(Some(ExpirationHint::idle(Duration::from_secs(10), t0())));
        entry.set_eviction(Some(EvictionHint::Counter(0)));

        let later = TestContext::at(t0() + TimeDelta::seconds(8));
        assert!(!entry.is_expired(&later));
        entry.on_access(later.now);
        assert_eq!(entry.eviction(), Some(&EvictionHint::Counter(1)));

        let much_later = TestContext::at(t0() + TimeDelta::seconds(15));
        assert!(!entry.is_expired(&much_later));
        assert!(entry.determine_expiration(&TestContext::at(t0() + TimeDelta::seconds(19))));
    }

    #[test]
    fn test_needs_resync() {
        let mut entry = CacheEntry::new(Payload::from(vec![1u8]), t0());
        assert!(!entry.needs_resync());

        let mut hint = ExpirationHint::ttl(Duration::from_secs(1), t0());
        hint.set_bit(HintBits::NEEDS_RESYNC);
        entry.set_expiration(Some(hint));
        assert!(entry.needs_resync());

        let mut flagged = CacheEntry::new(Payload::from(vec![1u8]), t0());
        flagged.add_flags(FlagSet::RESYNC_EXPIRED_ITEMS);
        assert!(flagged.needs_resync());
    }

    #[test]
    fn test_reset() {
        let mut entry = CacheEntry::new(Payload::from(vec![1u8]), t0());
        entry.set_version(3);
        entry.reset();
        assert!(entry.value().is_none());
        assert_eq!(entry.version(), 0);
        assert_eq!(entry.flags(), FlagSet::empty());
        assert_eq!(entry.cached_data_size(), -1);
    }
}
