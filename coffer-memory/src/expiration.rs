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

//! Expiration hints.
//!
//! An [`ExpirationHint`] decides when an entry stops being valid. Hints compose through
//! [`HintKind::Aggregate`], which expires as soon as any of its children does.

use std::time::Duration;

use bitflags::bitflags;
use chrono::{DateTime, TimeDelta, Utc};
use coffer_common::code::Key;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Base footprint accounted for every hint.
const HINT_SIZE: usize = 24;

bitflags! {
    /// State bits of an expiration hint, independent of its kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HintBits: u8 {
        /// The hint has fired.
        const EXPIRED = 1;
        /// The entry must be refreshed from its data source instead of being dropped.
        const NEEDS_RESYNC = 2;
        /// The hint slides on access.
        const IS_VARIANT = 4;
        /// The hint is bound to a node and must not be routed elsewhere.
        const NON_ROUTABLE = 8;
        /// The hint has been disposed.
        const DISPOSED = 16;
    }
}

/// What a hint can observe about its surroundings when deciding expiry.
pub trait ExpirationContext {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// If `key` is currently stored.
    fn contains_key(&self, key: &str) -> bool;

    /// If the cluster still reports `node` as alive.
    fn is_node_alive(&self, node: &str) -> bool;
}

/// `from + after`, saturating at the maximum representable instant.
pub(crate) fn deadline(from: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(after)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The variant of an [`ExpirationHint`].
#[derive(Debug, Clone, PartialEq)]
pub enum HintKind {
    /// Expires a fixed duration after creation.
    Ttl {
        /// Lifetime.
        ttl: Duration,
        /// Creation time plus lifetime.
        deadline: DateTime<Utc>,
    },
    /// Expires when not accessed for a duration.
    Idle {
        /// Allowed idle time.
        idle: Duration,
        /// Last access.
        last_access: DateTime<Utc>,
    },
    /// Expires at an absolute instant.
    Fixed {
        /// Expiry instant.
        at: DateTime<Utc>,
    },
    /// Expires when idle for a duration, and at an absolute instant at the latest.
    FixedIdle {
        /// Hard expiry instant.
        at: DateTime<Utc>,
        /// Allowed idle time.
        idle: Duration,
        /// Last access.
        last_access: DateTime<Utc>,
    },
    /// Expires when the owning node leaves the cluster.
    NodeBound {
        /// Owner node address.
        owner: String,
    },
    /// Expires when any of the keys it depends on is no longer stored.
    KeyDependency {
        /// Keys depended on.
        keys: Vec<Key>,
    },
    /// Expires when any child expires.
    Aggregate {
        /// Children, never aggregates themselves.
        hints: Vec<ExpirationHint>,
        /// Index of the child that fired.
        expiring: Option<usize>,
    },
}

/// An expiration hint attached to a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpirationHint {
    kind: HintKind,
    bits: HintBits,
}

impl ExpirationHint {
    fn with_kind(kind: HintKind, bits: HintBits) -> Self {
        Self { kind, bits }
    }

    /// A hint that expires `ttl` after `now`.
    pub fn ttl(ttl: Duration, now: DateTime<Utc>) -> Self {
        Self::with_kind(
            HintKind::Ttl {
                ttl,
                deadline: deadline(now, ttl),
            },
            HintBits::empty(),
        )
    }

    /// A sliding hint that expires when idle for `idle`.
    pub fn idle(idle: Duration, now: DateTime<Utc>) -> Self {
        Self::with_kind(HintKind::Idle { idle, last_access: now }, HintBits::IS_VARIANT)
    }

    /// A hint that expires at `at`.
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::with_kind(HintKind::Fixed { at }, HintBits::empty())
    }

    /// A sliding hint capped by an absolute expiry.
    pub fn fixed_idle(at: DateTime<Utc>, idle: Duration, now: DateTime<Utc>) -> Self {
        Self::with_kind(
            HintKind::FixedIdle {
                at,
                idle,
                last_access: now,
            },
            HintBits::IS_VARIANT,
        )
    }

    /// A hint bound to the lifetime of node `owner`.
    pub fn node_bound(owner: impl Into<String>) -> Self {
        Self::with_kind(HintKind::NodeBound { owner: owner.into() }, HintBits::NON_ROUTABLE)
    }

    /// A hint that expires once any of `keys` is gone.
    pub fn key_dependency(keys: impl IntoIterator<Item = Key>) -> Self {
        Self::with_kind(
            HintKind::KeyDependency {
                keys: keys.into_iter().unique().collect(),
            },
            HintBits::empty(),
        )
    }

    /// Combine `hints` into one aggregate.
    pub fn aggregate(hints: impl IntoIterator<Item = ExpirationHint>) -> Self {
        let mut aggregate = Self::with_kind(
            HintKind::Aggregate {
                hints: vec![],
                expiring: None,
            },
            HintBits::empty(),
        );
        for hint in hints {
            aggregate.push_child(hint);
        }
        aggregate
    }

    /// The variant of the hint.
    pub fn kind(&self) -> &HintKind {
        &self.kind
    }

    /// The raw state bits.
    pub fn bits(&self) -> HintBits {
        self.bits
    }

    /// If the hint has been observed as expired.
    pub fn has_expired(&self) -> bool {
        self.bits.contains(HintBits::EXPIRED)
    }

    /// If the entry must be refreshed rather than dropped on expiry.
    ///
    /// An aggregate needs resync when it or any child is marked.
    pub fn needs_resync(&self) -> bool {
        if self.bits.contains(HintBits::NEEDS_RESYNC) {
            return true;
        }
        match &self.kind {
            HintKind::Aggregate { hints, .. } => hints.iter().any(ExpirationHint::needs_resync),
            _ => false,
        }
    }

    /// If the hint slides on access.
    pub fn is_variant(&self) -> bool {
        self.bits.contains(HintBits::IS_VARIANT)
    }

    /// If the hint may be routed to another node.
    pub fn is_routable(&self) -> bool {
        !self.bits.contains(HintBits::NON_ROUTABLE)
    }

    /// If the hint has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.bits.contains(HintBits::DISPOSED)
    }

    /// Set `bit`, returning if it was not set before.
    ///
    /// Setting [`HintBits::NEEDS_RESYNC`] on an aggregate also sets it on every child.
    pub fn set_bit(&mut self, bit: HintBits) -> bool {
        if bit.contains(HintBits::NEEDS_RESYNC) {
            if let HintKind::Aggregate { hints, .. } = &mut self.kind {
                for hint in hints.iter_mut() {
                    hint.set_bit(HintBits::NEEDS_RESYNC);
                }
            }
        }
        if self.bits.contains(bit) {
            return false;
        }
        self.bits.insert(bit);
        true
    }

    /// Add `hint` to this hint.
    ///
    /// A non-aggregate hint turns into an aggregate holding itself and `hint`. Nested aggregates are flattened and only
    /// the most recently added [`HintKind::Fixed`] child is kept.
    pub fn add(&mut self, hint: ExpirationHint) {
        if !matches!(self.kind, HintKind::Aggregate { .. }) {
            let this = std::mem::replace(self, Self::aggregate([]));
            self.push_child(this);
        }
        self.push_child(hint);
    }

    fn push_child(&mut self, hint: ExpirationHint) {
        if !hint.is_routable() {
            self.bits.insert(HintBits::NON_ROUTABLE);
        }
        if hint.is_variant() {
            self.bits.insert(HintBits::IS_VARIANT);
        }

        let HintKind::Aggregate { hints, .. } = &mut self.kind else {
            unreachable!("children are only pushed into aggregates");
        };
        match hint.kind {
            HintKind::Aggregate { hints: nested, .. } => hints.extend(nested),
            _ => hints.push(hint),
        }

        if let Some(last_fixed) = hints.iter().rposition(|h| matches!(h.kind, HintKind::Fixed { .. })) {
            let mut index = 0;
            hints.retain(|h| {
                let keep = index == last_fixed || !matches!(h.kind, HintKind::Fixed { .. });
                index += 1;
                keep
            });
        }
    }

    /// Evaluate expiry without latching any state.
    pub fn is_expired(&self, ctx: &dyn ExpirationContext) -> bool {
        if self.has_expired() {
            return true;
        }
        let now = ctx.now();
        match &self.kind {
            HintKind::Ttl { deadline, .. } => now >= *deadline,
            HintKind::Idle { idle, last_access } => now >= deadline(*last_access, *idle),
            HintKind::Fixed { at } => now >= *at,
            HintKind::FixedIdle { at, idle, last_access } => now >= *at || now >= deadline(*last_access, *idle),
            HintKind::NodeBound { owner } => !ctx.is_node_alive(owner),
            HintKind::KeyDependency { keys } => keys.iter().any(|key| !ctx.contains_key(key)),
            HintKind::Aggregate { hints, .. } => hints.iter().any(|hint| hint.is_expired(ctx)),
        }
    }

    /// Evaluate expiry and latch [`HintBits::EXPIRED`] once it fires.
    pub fn determine_expiration(&mut self, ctx: &dyn ExpirationContext) -> bool {
        if self.has_expired() {
            return true;
        }
        let expired = if matches!(self.kind, HintKind::Aggregate { .. }) {
            self.determine_children(ctx)
        } else {
            self.is_expired(ctx)
        };
        if expired {
            self.set_bit(HintBits::EXPIRED);
        }
        expired
    }

    fn determine_children(&mut self, ctx: &dyn ExpirationContext) -> bool {
        let HintKind::Aggregate { hints, expiring } = &mut self.kind else {
            return false;
        };
        match hints.iter_mut().position(|hint| hint.determine_expiration(ctx)) {
            Some(index) => {
                *expiring = Some(index);
                true
            }
            None => false,
        }
    }

    /// The leaf hint that caused expiry, if expired.
    pub fn expiring_hint(&self) -> Option<&ExpirationHint> {
        if !self.has_expired() {
            return None;
        }
        match &self.kind {
            HintKind::Aggregate { hints, expiring } => expiring
                .and_then(|index| hints.get(index))
                .and_then(ExpirationHint::expiring_hint),
            _ => Some(self),
        }
    }

    /// Re-arm sliding hints after an access at `now`.
    pub fn reset_variant(&mut self, now: DateTime<Utc>) {
        if !self.is_variant() {
            return;
        }
        match &mut self.kind {
            HintKind::Idle { last_access, .. } | HintKind::FixedIdle { last_access, .. } => {
                *last_access = now;
                self.bits.remove(HintBits::EXPIRED);
            }
            HintKind::Aggregate { hints, expiring } => {
                for hint in hints.iter_mut() {
                    hint.reset_variant(now);
                }
                if expiring.and_then(|index| hints.get(index)).is_some_and(|h| !h.has_expired()) {
                    *expiring = None;
                    self.bits.remove(HintBits::EXPIRED);
                }
            }
            _ => {}
        }
    }

    /// Start the hint over at `now` after the entry was refreshed, clearing the expired state.
    ///
    /// Lifetimes restart and idle clocks reset. Absolute instants, node owners and dependencies stay as they are.
    pub fn rearm(&mut self, now: DateTime<Utc>) {
        match &mut self.kind {
            HintKind::Ttl { ttl, deadline: at } => *at = deadline(now, *ttl),
            HintKind::Idle { last_access, .. } | HintKind::FixedIdle { last_access, .. } => *last_access = now,
            HintKind::Aggregate { hints, expiring } => {
                for hint in hints.iter_mut() {
                    hint.rearm(now);
                }
                *expiring = None;
            }
            _ => {}
        }
        self.bits.remove(HintBits::EXPIRED);
    }

    /// The earliest absolute instant at which the hint can fire on time alone.
    ///
    /// Hints that do not depend on time have no sort key.
    pub fn sort_key(&self) -> Option<DateTime<Utc>> {
        match &self.kind {
            HintKind::Ttl { deadline, .. } => Some(*deadline),
            HintKind::Idle { idle, last_access } => Some(deadline(*last_access, *idle)),
            HintKind::Fixed { at } => Some(*at),
            HintKind::FixedIdle { at, idle, last_access } => Some((*at).min(deadline(*last_access, *idle))),
            HintKind::NodeBound { .. } | HintKind::KeyDependency { .. } => None,
            HintKind::Aggregate { hints, .. } => hints.iter().filter_map(ExpirationHint::sort_key).min(),
        }
    }

    /// Keys this hint depends on, walking aggregates.
    pub fn key_dependencies(&self) -> Vec<Key> {
        match &self.kind {
            HintKind::KeyDependency { keys } => keys.clone(),
            HintKind::Aggregate { hints, .. } => hints
                .iter()
                .flat_map(ExpirationHint::key_dependencies)
                .unique()
                .collect(),
            _ => vec![],
        }
    }

    /// Mark the hint and all its children disposed.
    pub fn dispose(&mut self) {
        if let HintKind::Aggregate { hints, .. } = &mut self.kind {
            for hint in hints.iter_mut() {
                hint.dispose();
            }
        }
        self.bits.insert(HintBits::DISPOSED);
    }

    /// Estimated memory footprint.
    pub fn in_memory_size(&self) -> usize {
        HINT_SIZE
            + match &self.kind {
                HintKind::NodeBound { owner } => owner.len(),
                HintKind::KeyDependency { keys } => keys.iter().map(|key| key.len()).sum(),
                HintKind::Aggregate { hints, .. } => hints.iter().map(ExpirationHint::in_memory_size).sum(),
                _ => 0,
            }
    }
}

/// How long an entry lives on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifetime {
    /// Relative lifetime from insertion.
    Ttl(Duration),
    /// Sliding idle lifetime.
    Idle(Duration),
    /// Absolute expiry.
    Absolute(DateTime<Utc>),
    /// Sliding idle lifetime with an absolute cap.
    AbsoluteIdle {
        /// Hard expiry.
        at: DateTime<Utc>,
        /// Allowed idle time.
        idle: Duration,
    },
}

/// Caller-facing description of an entry's expiration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpirationPolicy {
    /// Time-based lifetime.
    pub lifetime: Option<Lifetime>,
    /// Keys the entry depends on.
    pub dependencies: Vec<Key>,
    /// Node the entry is bound to.
    pub node: Option<String>,
    /// Refresh from the data source on expiry instead of dropping.
    pub resync: bool,
}

impl ExpirationPolicy {
    /// A policy with a lifetime only.
    pub fn lifetime(lifetime: Lifetime) -> Self {
        Self {
            lifetime: Some(lifetime),
            ..Default::default()
        }
    }

    /// Add key dependencies.
    pub fn with_dependencies(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.dependencies.extend(keys);
        self
    }

    /// Bind the entry to a node.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Ask for resync on expiry.
    pub fn with_resync(mut self, resync: bool) -> Self {
        self.resync = resync;
        self
    }
}

/// Build the hint for `policy` as of `now`.
///
/// A lone component becomes a plain hint. Several components are wrapped in an aggregate, so whichever fires first
/// expires the entry.
pub fn make_expiration_hint(policy: &ExpirationPolicy, now: DateTime<Utc>) -> Option<ExpirationHint> {
    let base = policy.lifetime.map(|lifetime| match lifetime {
        Lifetime::Ttl(ttl) => ExpirationHint::ttl(ttl, now),
        Lifetime::Idle(idle) => ExpirationHint::idle(idle, now),
        Lifetime::Absolute(at) => ExpirationHint::fixed(at),
        Lifetime::AbsoluteIdle { at, idle } => ExpirationHint::fixed_idle(at, idle, now),
    });
    let dependency =
        (!policy.dependencies.is_empty()).then(|| ExpirationHint::key_dependency(policy.dependencies.iter().cloned()));
    let node = policy.node.as_ref().map(ExpirationHint::node_bound);

    let mut parts = [base, dependency, node].into_iter().flatten().collect_vec();
    let mut hint = match parts.len() {
        0 => return None,
        1 => parts.remove(0),
        _ => ExpirationHint::aggregate(parts),
    };
    if policy.resync {
        hint.set_bit(HintBits::NEEDS_RESYNC);
    }
    Some(hint)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;

    use super::*;

    pub(crate) struct TestContext {
        pub now: DateTime<Utc>,
        pub keys: HashSet<&'static str>,
        pub dead_nodes: HashSet<&'static str>,
    }

    impl TestContext {
        pub fn at(now: DateTime<Utc>) -> Self {
            Self {
                now,
                keys: HashSet::new(),
                dead_nodes: HashSet::new(),
            }
        }
    }

    impl ExpirationContext for TestContext {
        fn now(&self) -> DateTime<Utc> {
            self.now
        }

        fn contains_key(&self, key: &str) -> bool {
            self.keys.contains(key)
        }

        fn is_node_alive(&self, node: &str) -> bool {
            !self.dead_nodes.contains(node)
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_aggregate_is_or_of_children() {
        let ctx = TestContext::at(t0() + TimeDelta::seconds(30));

        let not_expired = ExpirationHint::ttl(secs(60), t0());
        let expired = ExpirationHint::fixed(t0() + TimeDelta::seconds(10));
        assert!(!not_expired.is_expired(&ctx));
        assert!(expired.is_expired(&ctx));

        let mixed = ExpirationHint::aggregate([not_expired.clone(), expired]);
        assert!(mixed.is_expired(&ctx));

        let fresh = ExpirationHint::aggregate([not_expired, ExpirationHint::idle(secs(60), t0())]);
        assert!(!fresh.is_expired(&ctx));
    }

    #[test]
    fn test_determine_latches_and_reports_expiring_child() {
        let mut ctx = TestContext::at(t0());
        ctx.keys.insert("parent");

        let mut hint = ExpirationHint::aggregate([
            ExpirationHint::ttl(secs(60), t0()),
            ExpirationHint::key_dependency([Key::from("parent")]),
        ]);
        assert!(!hint.determine_expiration(&ctx));
        assert!(hint.expiring_hint().is_none());

        ctx.keys.remove("parent");
        assert!(hint.determine_expiration(&ctx));
        assert!(hint.has_expired());
        assert!(matches!(
            hint.expiring_hint().map(ExpirationHint::kind),
            Some(HintKind::KeyDependency { .. })
        ));

        // Latched: restoring the key does not revive the hint.
        ctx.keys.insert("parent");
        assert!(hint.is_expired(&ctx));
    }

    #[test]
    fn test_aggregate_flattens_and_keeps_last_fixed() {
        let first = ExpirationHint::fixed(t0());
        let second = ExpirationHint::fixed(t0() + TimeDelta::seconds(5));
        let nested = ExpirationHint::aggregate([ExpirationHint::idle(secs(1), t0()), first]);

        let mut hint = ExpirationHint::node_bound("10.0.0.1:7800");
        hint.add(nested);
        hint.add(second.clone());

        let HintKind::Aggregate { hints, .. } = hint.kind() else {
            panic!("expected an aggregate");
        };
        assert_eq!(hints.len(), 3);
        assert!(hints.iter().all(|h| !matches!(h.kind(), HintKind::Aggregate { .. })));
        let fixed = hints
            .iter()
            .filter(|h| matches!(h.kind(), HintKind::Fixed { .. }))
            .collect_vec();
        assert_eq!(fixed, vec![&second]);

        assert!(hint.is_variant());
        assert!(!hint.is_routable());
    }

    #[test]
    fn test_resync_propagates_to_children() {
        let mut hint = ExpirationHint::aggregate([
            ExpirationHint::ttl(secs(1), t0()),
            ExpirationHint::idle(secs(1), t0()),
        ]);
        assert!(!hint.needs_resync());
        assert!(hint.set_bit(HintBits::NEEDS_RESYNC));
        assert!(!hint.set_bit(HintBits::NEEDS_RESYNC));

        let HintKind::Aggregate { hints, .. } = hint.kind() else {
            panic!("expected an aggregate");
        };
        assert!(hints.iter().all(|h| h.bits().contains(HintBits::NEEDS_RESYNC)));

        let mut child_only = ExpirationHint::aggregate([ExpirationHint::ttl(secs(1), t0())]);
        if let HintKind::Aggregate { hints, .. } = &mut child_only.kind {
            hints[0].set_bit(HintBits::NEEDS_RESYNC);
        }
        assert!(child_only.needs_resync());
    }

    #[test]
    fn test_idle_slides_on_reset() {
        let mut hint = ExpirationHint::idle(secs(10), t0());
        let later = TestContext::at(t0() + TimeDelta::seconds(8));
        assert!(!hint.is_expired(&later));

        hint.reset_variant(later.now);
        let much_later = TestContext::at(t0() + TimeDelta::seconds(15));
        assert!(!hint.is_expired(&much_later));
        assert_eq!(hint.sort_key(), Some(t0() + TimeDelta::seconds(18)));

        let capped = ExpirationHint::fixed_idle(t0() + TimeDelta::seconds(12), secs(10), t0());
        assert!(capped.is_expired(&much_later));
    }

    #[test]
    fn test_rearm_restarts_lifetimes() {
        let mut hint = ExpirationHint::aggregate([
            ExpirationHint::ttl(secs(10), t0()),
            ExpirationHint::idle(secs(10), t0()),
        ]);
        let later = TestContext::at(t0() + TimeDelta::seconds(20));
        assert!(hint.determine_expiration(&later));

        hint.rearm(later.now);
        assert!(!hint.has_expired());
        assert!(hint.expiring_hint().is_none());
        assert!(!hint.determine_expiration(&later));
        assert_eq!(hint.sort_key(), Some(t0() + TimeDelta::seconds(30)));

        let mut fixed = ExpirationHint::fixed(t0() + TimeDelta::seconds(5));
        assert!(fixed.determine_expiration(&later));
        fixed.rearm(later.now);
        assert!(fixed.determine_expiration(&later));
    }

    #[test]
    fn test_sort_key_is_min_of_children() {
        let hint = ExpirationHint::aggregate([
            ExpirationHint::ttl(secs(100), t0()),
            ExpirationHint::fixed(t0() + TimeDelta::seconds(40)),
            ExpirationHint::key_dependency([Key::from("k")]),
        ]);
        assert_eq!(hint.sort_key(), Some(t0() + TimeDelta::seconds(40)));
        assert_eq!(ExpirationHint::node_bound("n").sort_key(), None);
    }

    #[test]
    fn test_node_bound_follows_membership() {
        let mut ctx = TestContext::at(t0());
        let hint = ExpirationHint::node_bound("node-a");
        assert!(!hint.is_expired(&ctx));
        ctx.dead_nodes.insert("node-a");
        assert!(hint.is_expired(&ctx));
    }

    #[test]
    fn test_make_expiration_hint() {
        assert!(make_expiration_hint(&ExpirationPolicy::default(), t0()).is_none());

        let ttl_only = make_expiration_hint(&ExpirationPolicy::lifetime(Lifetime::Ttl(secs(5))), t0()).unwrap();
        assert!(matches!(ttl_only.kind(), HintKind::Ttl { .. }));

        let policy = ExpirationPolicy::lifetime(Lifetime::Ttl(secs(5)))
            .with_dependencies([Key::from("a"), Key::from("b"), Key::from("a")])
            .with_resync(true);
        let combined = make_expiration_hint(&policy, t0()).unwrap();
        assert!(matches!(combined.kind(), HintKind::Aggregate { hints, .. } if hints.len() == 2));
        assert_eq!(combined.key_dependencies(), vec![Key::from("a"), Key::from("b")]);
        assert!(combined.needs_resync());

        // Whichever component fires first expires the entry.
        let mut ctx = TestContext::at(t0());
        ctx.keys.extend(["a", "b"]);
        assert!(!combined.is_expired(&ctx));
        ctx.keys.remove("b");
        assert!(combined.is_expired(&ctx));
        ctx.keys.insert("b");
        ctx.now = t0() + TimeDelta::seconds(6);
        assert!(combined.is_expired(&ctx));
    }

    #[test]
    fn test_dispose_marks_children() {
        let mut hint = ExpirationHint::aggregate([ExpirationHint::ttl(secs(1), t0()), ExpirationHint::node_bound("n")]);
        hint.dispose();
        assert!(hint.is_disposed());
        let HintKind::Aggregate { hints, .. } = hint.kind() else {
            panic!("expected an aggregate");
        };
        assert!(hints.iter().all(ExpirationHint::is_disposed));
    }
}
