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

use std::{fmt::Debug, sync::Arc};

use coffer_common::{
    code::{Key, Payload},
    event::EventKind,
    metrics::model::Metrics,
};
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::RwLock;
use thiserror::Error;

use crate::notification::{CallbackInfo, DataFilter};

/// A fully built event, as delivered to one callback.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    /// Key of the entry.
    pub key: Key,
    /// What happened.
    pub kind: EventKind,
    /// The value, only for callbacks that asked for data.
    pub value: Option<Payload>,
    /// Client side callback ref.
    pub callback: u16,
    /// Data filter of the callback.
    pub data_filter: DataFilter,
}

/// Failure to deliver an event.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The remote end is gone. The listener is unregistered.
    #[error("listener disconnected: {0}")]
    Disconnected(String),
    /// Delivery failed this time. Not retried.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Receives the events of one client.
pub trait CacheListener: Send + Sync + 'static {
    /// Deliver an event.
    fn on_event(&self, event: &CacheEvent) -> std::result::Result<(), DeliveryError>;
}

/// Fans events out to the listeners of registered clients.
///
/// Listeners reporting [`DeliveryError::Disconnected`] are unregistered. Failed deliveries are never retried.
pub struct NotificationDispatcher {
    listeners: RwLock<HashMap<String, Arc<dyn CacheListener>>>,
    metrics: Arc<Metrics>,
}

impl Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("clients", &self.listeners.read().keys().collect_vec())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Create an empty dispatcher.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    /// Register the listener of `client_id`, returning the one it replaces.
    pub fn register(
        &self,
        client_id: impl Into<String>,
        listener: Arc<dyn CacheListener>,
    ) -> Option<Arc<dyn CacheListener>> {
        self.listeners.write().insert(client_id.into(), listener)
    }

    /// Unregister the listener of `client_id`.
    pub fn unregister(&self, client_id: &str) -> bool {
        self.listeners.write().remove(client_id).is_some()
    }

    /// If `client_id` has a listener.
    pub fn contains(&self, client_id: &str) -> bool {
        self.listeners.read().contains_key(client_id)
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// If no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver `kind` on `key` to `callbacks`.
    ///
    /// Returns the clients found disconnected, which are unregistered already.
    pub fn dispatch(
        &self,
        key: &Key,
        kind: EventKind,
        value: Option<&Payload>,
        callbacks: &[CallbackInfo],
    ) -> Vec<String> {
        if callbacks.is_empty() {
            return vec![];
        }

        let targets = {
            let listeners = self.listeners.read();
            callbacks
                .iter()
                .filter_map(|info| listeners.get(info.client_id()).map(|l| (info, l.clone())))
                .collect_vec()
        };

        let mut dead = vec![];
        for (info, listener) in targets {
            if dead.iter().any(|client: &String| client == info.client_id()) {
                continue;
            }
            let event = CacheEvent {
                key: key.clone(),
                kind,
                value: value.filter(|_| info.data_filter().includes_value()).cloned(),
                callback: info.callback(),
                data_filter: info.data_filter(),
            };
            match listener.on_event(&event) {
                Ok(()) => self.metrics.cache_notify.increase(1),
                Err(DeliveryError::Disconnected(reason)) => {
                    tracing::debug!(
                        "[notification]: client {} disconnected, drop its listener: {}",
                        info.client_id(),
                        reason
                    );
                    dead.push(info.client_id().to_string());
                }
                Err(e) => {
                    tracing::warn!(
                        "[notification]: deliver {:?} on key {} to client {} error: {}",
                        kind,
                        key,
                        info.client_id(),
                        e
                    );
                }
            }
        }

        if !dead.is_empty() {
            let mut listeners = self.listeners.write();
            for client in &dead {
                listeners.remove(client.as_str());
            }
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use coffer_common::event::RemoveReason;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<CacheEvent>>,
    }

    impl CacheListener for Recorder {
        fn on_event(&self, event: &CacheEvent) -> std::result::Result<(), DeliveryError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    struct Gone;

    impl CacheListener for Gone {
        fn on_event(&self, _: &CacheEvent) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Disconnected("socket closed".to_string()))
        }
    }

    struct Flaky;

    impl CacheListener for Flaky {
        fn on_event(&self, _: &CacheEvent) -> std::result::Result<(), DeliveryError> {
            Err(DeliveryError::Failed("busy".to_string()))
        }
    }

    #[test_log::test]
    fn test_value_only_for_data_filter() {
        let dispatcher = NotificationDispatcher::new(Arc::new(Metrics::noop()));
        let recorder = Arc::new(Recorder::default());
        dispatcher.register("c1", recorder.clone());

        let key: Key = "k".into();
        let value = Payload::from(Bytes::from_static(b"v"));
        let callbacks = [
            CallbackInfo::new("c1", 1),
            CallbackInfo::new("c1", 2).with_data_filter(DataFilter::DataWithMetadata),
            CallbackInfo::new("unknown", 3),
        ];
        let dead = dispatcher.dispatch(&key, EventKind::ItemUpdated, Some(&value), &callbacks);
        assert!(dead.is_empty());

        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[0].value.is_none());
        assert_eq!(events[1].callback, 2);
        assert_eq!(events[1].value.as_ref().and_then(|v| v.as_bytes()), Some(&Bytes::from_static(b"v")));
    }

    #[test_log::test]
    fn test_disconnected_listener_is_dropped() {
        let dispatcher = NotificationDispatcher::new(Arc::new(Metrics::noop()));
        dispatcher.register("gone", Arc::new(Gone));
        dispatcher.register("flaky", Arc::new(Flaky));

        let key: Key = "k".into();
        let callbacks = [
            CallbackInfo::new("gone", 1),
            CallbackInfo::new("gone", 2),
            CallbackInfo::new("flaky", 1),
        ];
        let dead = dispatcher.dispatch(
            &key,
            EventKind::ItemRemoved(RemoveReason::Removed),
            None,
            &callbacks,
        );
        assert_eq!(dead, vec!["gone".to_string()]);
        assert!(!dispatcher.contains("gone"));
        assert!(dispatcher.contains("flaky"));
        assert_eq!(dispatcher.len(), 1);
    }
}
