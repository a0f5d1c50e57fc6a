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

//! Pessimistic lock metadata.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expiration::deadline;

/// Opaque lock identifier handed to lock holders.
pub type LockId = Arc<str>;

/// How an operation treats pessimistic locks and versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LockAccessType {
    /// Fail on items locked by someone else.
    #[default]
    Default,
    /// Acquire the lock while reading.
    Acquire,
    /// Read or write under a lock that is already held, without acquiring it.
    DontAcquire,
    /// Write under a held lock and release it afterwards.
    Release,
    /// Write under a held lock and keep holding it.
    DontRelease,
    /// Ignore pessimistic locks altogether.
    IgnoreLock,
    /// Write only if the stored version equals the expected one.
    CompareVersion,
    /// Store the caller supplied version verbatim, ignoring locks.
    PreserveVersion,
}

impl LockAccessType {
    /// If writes in this mode skip the pessimistic lock check.
    pub fn ignores_lock(self) -> bool {
        matches!(self, LockAccessType::IgnoreLock | LockAccessType::PreserveVersion)
    }
}

/// Auto-release deadline of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockExpiration {
    ttl: Duration,
    armed_at: Option<DateTime<Utc>>,
}

impl LockExpiration {
    /// A lock expiration of `ttl`, not armed yet.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, armed_at: None }
    }

    /// Start counting at `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) {
        self.armed_at = Some(now);
    }

    /// Lock lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Instant at which the lock lapses, once armed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.armed_at.map(|at| deadline(at, self.ttl))
    }

    /// If the lock has lapsed at `now`. An unarmed expiration never lapses.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

/// Identity and date of a lock, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockHandle {
    /// Lock id.
    pub lock_id: LockId,
    /// When the lock was taken.
    pub lock_date: DateTime<Utc>,
}

/// Result of a lock attempt on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOutcome {
    /// If the caller holds the lock now.
    pub granted: bool,
    /// The lock now in place: the caller's when granted, the conflicting holder's otherwise.
    pub holder: Option<LockHandle>,
}

/// Per-entry pessimistic lock state.
#[derive(Debug, Clone, PartialEq)]
pub struct LockState {
    pub(crate) lock_id: Option<LockId>,
    pub(crate) lock_date: DateTime<Utc>,
    pub(crate) expiration: Option<LockExpiration>,
    pub(crate) access_type: LockAccessType,
    pub(crate) client_id: Option<String>,
    pub(crate) thread_id: Option<u64>,
}

impl Default for LockState {
    fn default() -> Self {
        Self {
            lock_id: None,
            lock_date: DateTime::<Utc>::default(),
            expiration: None,
            access_type: LockAccessType::Default,
            client_id: None,
            thread_id: None,
        }
    }
}

impl LockState {
    /// Lock id, if locked.
    pub fn lock_id(&self) -> Option<&LockId> {
        self.lock_id.as_ref()
    }

    /// When the lock was taken.
    pub fn lock_date(&self) -> DateTime<Utc> {
        self.lock_date
    }

    /// For how long the lock has been held at `now`.
    pub fn lock_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.lock_date).to_std().unwrap_or_default()
    }

    /// Auto-release deadline.
    pub fn expiration(&self) -> Option<&LockExpiration> {
        self.expiration.as_ref()
    }

    /// Access mode the lock was taken with.
    pub fn access_type(&self) -> LockAccessType {
        self.access_type
    }

    /// Client that took the lock.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Client thread that took the lock.
    pub fn thread_id(&self) -> Option<u64> {
        self.thread_id
    }

    /// If the lock lapsed at `now`.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|e| e.has_expired(now))
    }

    /// The lock as a handle, if locked.
    pub fn handle(&self) -> Option<LockHandle> {
        self.lock_id.clone().map(|lock_id| LockHandle {
            lock_id,
            lock_date: self.lock_date,
        })
    }

    /// If the lock was taken by `client_id`/`thread_id`.
    pub fn is_owned_by(&self, client_id: Option<&str>, thread_id: Option<u64>) -> bool {
        match (client_id, thread_id) {
            (Some(client_id), Some(thread_id)) => {
                self.client_id.as_deref() == Some(client_id) && self.thread_id == Some(thread_id)
            }
            _ => false,
        }
    }
}

/// Generates globally unique lock ids of the form `pid-node-key-counter`.
#[derive(Debug)]
pub struct LockIdGenerator {
    pid: u32,
    node: String,
    ticker: AtomicU64,
}

impl LockIdGenerator {
    /// Create a generator for node `node`.
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            pid: std::process::id(),
            node: node.into(),
            ticker: AtomicU64::new(0),
        }
    }

    /// A fresh lock id for `key`.
    pub fn generate(&self, key: &str) -> LockId {
        let n = self.ticker.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}-{}", self.pid, self.node, key, n).into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_lock_ids_are_unique() {
        let generator = LockIdGenerator::new("node-a");
        let ids = (0..100).map(|_| generator.generate("k")).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 100);
        let id = generator.generate("key");
        assert!(id.starts_with(&format!("{}-node-a-key-", std::process::id())));
    }

    #[test]
    fn test_lock_expiration() {
        let now = Utc::now();
        let mut expiration = LockExpiration::new(Duration::from_secs(5));
        assert!(!expiration.has_expired(now + TimeDelta::days(1)));

        expiration.arm(now);
        assert!(!expiration.has_expired(now + TimeDelta::seconds(4)));
        assert!(expiration.has_expired(now + TimeDelta::seconds(5)));
    }

    #[test]
    fn test_ownership_requires_both_ids() {
        let state = LockState {
            client_id: Some("c1".to_string()),
            thread_id: Some(1),
            ..Default::default()
        };
        assert!(state.is_owned_by(Some("c1"), Some(1)));
        assert!(!state.is_owned_by(Some("c1"), Some(2)));
        assert!(!state.is_owned_by(Some("c1"), None));
        assert!(!state.is_owned_by(None, None));
    }
}
