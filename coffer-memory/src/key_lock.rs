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

//! Per-key mutual exclusion with FIFO hand-off, plus a whole-store global lock.
//!
//! A released key is handed directly to its oldest waiter, so waiters are served in arrival order. The global lock
//! waits until the key table drains. While it is held or pending, new key acquirers block. Locks are not
//! re-entrant: acquiring a key twice from the same thread without releasing it deadlocks until the timeout.

use std::{
    collections::VecDeque,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use coffer_common::{
    code::Key,
    error::{Error, ErrorKind, Result},
    strict_assert,
};
use hashbrown::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};

type Ticket = u64;

#[derive(Debug, Default)]
struct Slot {
    waiters: VecDeque<(Ticket, Arc<Condvar>)>,
}

#[derive(Debug, Default)]
struct State {
    keys: HashMap<Key, Slot>,
    global_held: bool,
    global_waiters: VecDeque<(Ticket, Arc<Condvar>)>,
    granted: HashSet<Ticket>,
    next_ticket: Ticket,
}

impl State {
    fn ticket(&mut self) -> (Ticket, Arc<Condvar>) {
        self.next_ticket += 1;
        (self.next_ticket, Arc::new(Condvar::new()))
    }

    fn global_blocks_keys(&self) -> bool {
        self.global_held || !self.global_waiters.is_empty()
    }

    /// Grant the global lock to the oldest global waiter once no key is held. Returns if one was granted.
    fn promote_global(&mut self) -> bool {
        if self.global_held || !self.keys.is_empty() {
            return false;
        }
        match self.global_waiters.pop_front() {
            Some((ticket, cond)) => {
                self.global_held = true;
                self.granted.insert(ticket);
                cond.notify_one();
                true
            }
            None => false,
        }
    }
}

/// Per-key and global mutual exclusion.
#[derive(Debug, Default)]
pub struct KeyBasedLockManager {
    state: Mutex<State>,
    /// Key acquirers blocked by the global lock park here.
    admission: Condvar,
}

impl KeyBasedLockManager {
    /// Create a lock manager with an empty key table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key`, waiting up to `timeout`.
    pub fn lock(&self, key: Key, timeout: Duration) -> Result<KeyLockGuard<'_>> {
        self.acquire(&key, Instant::now() + timeout)?;
        Ok(KeyLockGuard { manager: self, key })
    }

    /// Take the global lock, waiting up to `timeout` for every key holder to finish.
    pub fn lock_global(&self, timeout: Duration) -> Result<GlobalLockGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if !state.global_blocks_keys() && state.keys.is_empty() {
            state.global_held = true;
            return Ok(GlobalLockGuard { manager: self });
        }

        let (ticket, cond) = state.ticket();
        state.global_waiters.push_back((ticket, cond.clone()));
        tracing::trace!(
            "[key lock]: global lock waits for {} held keys, ticket: {}",
            state.keys.len(),
            ticket
        );

        loop {
            if guard.granted.remove(&ticket) {
                return Ok(GlobalLockGuard { manager: self });
            }
            if cond.wait_until(&mut guard, deadline).timed_out() {
                let state = &mut *guard;
                if state.granted.remove(&ticket) {
                    return Ok(GlobalLockGuard { manager: self });
                }
                state.global_waiters.retain(|(t, _)| *t != ticket);
                if !state.global_blocks_keys() {
                    self.admission.notify_all();
                }
                return Err(Error::new(ErrorKind::Timeout, "global lock timed out")
                    .with_context("held_keys", state.keys.len()));
            }
        }
    }

    /// If `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.state.lock().keys.contains_key(key)
    }

    /// If the global lock is held.
    pub fn is_global_locked(&self) -> bool {
        self.state.lock().global_held
    }

    /// Number of held keys.
    pub fn held(&self) -> usize {
        self.state.lock().keys.len()
    }

    #[cfg(test)]
    fn waiters(&self, key: &str) -> usize {
        self.state.lock().keys.get(key).map_or(0, |slot| slot.waiters.len())
    }

    fn acquire(&self, key: &Key, deadline: Instant) -> Result<()> {
        let mut guard = self.state.lock();

        while guard.global_blocks_keys() {
            if self.admission.wait_until(&mut guard, deadline).timed_out() && guard.global_blocks_keys() {
                return Err(Error::new(ErrorKind::Timeout, "key lock timed out behind the global lock")
                    .with_context("key", key));
            }
        }

        let state = &mut *guard;
        let Some(slot) = state.keys.get_mut(key) else {
            state.keys.insert(key.clone(), Slot::default());
            return Ok(());
        };

        state.next_ticket += 1;
        let ticket = state.next_ticket;
        let cond = Arc::new(Condvar::new());
        slot.waiters.push_back((ticket, cond.clone()));

        loop {
            if guard.granted.remove(&ticket) {
                return Ok(());
            }
            if cond.wait_until(&mut guard, deadline).timed_out() {
                let state = &mut *guard;
                if state.granted.remove(&ticket) {
                    return Ok(());
                }
                if let Some(slot) = state.keys.get_mut(key) {
                    slot.waiters.retain(|(t, _)| *t != ticket);
                }
                return Err(Error::new(ErrorKind::Timeout, "key lock timed out").with_context("key", key));
            }
        }
    }

    fn release(&self, key: &str) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(slot) = state.keys.get_mut(key) else {
            tracing::warn!("[key lock]: release of key {} that is not held", key);
            return;
        };
        if let Some((ticket, cond)) = slot.waiters.pop_front() {
            state.granted.insert(ticket);
            cond.notify_one();
            return;
        }
        state.keys.remove(key);
        if state.promote_global() {
            tracing::trace!("[key lock]: key table drained, global lock granted");
        }
    }

    fn release_global(&self) {
        let mut guard = self.state.lock();
        strict_assert!(guard.global_held);
        guard.global_held = false;
        if !guard.promote_global() {
            self.admission.notify_all();
        }
    }
}

/// Holds a key until dropped.
#[must_use]
pub struct KeyLockGuard<'a> {
    manager: &'a KeyBasedLockManager,
    key: Key,
}

impl Debug for KeyLockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLockGuard").field("key", &self.key).finish()
    }
}

impl KeyLockGuard<'_> {
    /// Key held by the guard.
    pub fn key(&self) -> &Key {
        &self.key
    }
}

impl Drop for KeyLockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.key);
    }
}

/// Holds the global lock until dropped.
#[must_use]
pub struct GlobalLockGuard<'a> {
    manager: &'a KeyBasedLockManager,
}

impl Debug for GlobalLockGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalLockGuard").finish()
    }
}

impl Drop for GlobalLockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release_global();
    }
}
