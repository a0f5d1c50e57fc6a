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

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;

/// Per-client usage as observed by one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientUsage {
    /// Requests issued by the client.
    pub requests: u64,
    /// Payload bytes written by the client.
    pub bytes: u64,
}

#[derive(Debug, Default)]
struct ClientCounters {
    requests: AtomicU64,
    bytes: AtomicU64,
}

/// Per-client request and byte counters.
///
/// A ledger is injected into each cache as an `Arc<ClientLedger>`, so several instances in one process keep separate
/// books or share one on purpose.
#[derive(Debug, Default)]
pub struct ClientLedger {
    clients: RwLock<HashMap<String, ClientCounters>>,
}

impl ClientLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one request of `client_id` carrying `bytes` payload bytes.
    pub fn record(&self, client_id: &str, bytes: u64) {
        {
            let clients = self.clients.read();
            if let Some(counters) = clients.get(client_id) {
                counters.requests.fetch_add(1, Ordering::Relaxed);
                counters.bytes.fetch_add(bytes, Ordering::Relaxed);
                return;
            }
        }
        let mut clients = self.clients.write();
        let counters = clients.entry(client_id.to_string()).or_default();
        counters.requests.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Usage of `client_id` so far.
    pub fn usage(&self, client_id: &str) -> ClientUsage {
        self.clients
            .read()
            .get(client_id)
            .map(|counters| ClientUsage {
                requests: counters.requests.load(Ordering::Relaxed),
                bytes: counters.bytes.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Forget a client, e.g. after it disconnected.
    pub fn forget(&self, client_id: &str) -> Option<ClientUsage> {
        self.clients.write().remove(client_id).map(|counters| ClientUsage {
            requests: counters.requests.into_inner(),
            bytes: counters.bytes.into_inner(),
        })
    }

    /// Number of clients with recorded usage.
    pub fn clients(&self) -> usize {
        self.clients.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_ledger_accumulates_per_client() {
        let ledger = ClientLedger::new();
        ledger.record("alice", 10);
        ledger.record("alice", 5);
        ledger.record("bob", 1);

        assert_eq!(ledger.usage("alice"), ClientUsage { requests: 2, bytes: 15 });
        assert_eq!(ledger.usage("bob"), ClientUsage { requests: 1, bytes: 1 });
        assert_eq!(ledger.usage("carol"), ClientUsage::default());
        assert_eq!(ledger.clients(), 2);

        assert_eq!(ledger.forget("bob"), Some(ClientUsage { requests: 1, bytes: 1 }));
        assert_eq!(ledger.clients(), 1);
    }

    #[test]
    fn test_ledger_concurrent_first_touch() {
        let ledger = Arc::new(ClientLedger::new());
        let handles = (0..4)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        ledger.record("shared", 2);
                    }
                })
            })
            .collect_vec();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.usage("shared"), ClientUsage {
            requests: 1000,
            bytes: 2000
        });
    }
}
