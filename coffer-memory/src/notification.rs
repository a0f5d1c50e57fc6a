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

//! Per-entry callback registries.

use serde::{Deserialize, Serialize};

/// How much of an entry a listener wants delivered with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataFilter {
    /// Key and event kind only.
    #[default]
    None,
    /// Key, event kind and entry metadata.
    Metadata,
    /// Everything, including the value.
    DataWithMetadata,
}

impl DataFilter {
    /// If events filtered this way carry the value.
    pub fn includes_value(self) -> bool {
        matches!(self, DataFilter::DataWithMetadata)
    }
}

/// Delivery style of a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallbackKind {
    /// The server pushes events to the client.
    #[default]
    PushBased,
    /// The client polls for events.
    PullBased,
}

/// A callback registered by a client on an entry.
///
/// Two callbacks are the same registration when their client id and callback ref match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackInfo {
    client_id: String,
    callback: u16,
    data_filter: DataFilter,
    kind: CallbackKind,
}

impl CallbackInfo {
    /// Callback `callback` of client `client_id`.
    pub fn new(client_id: impl Into<String>, callback: u16) -> Self {
        Self {
            client_id: client_id.into(),
            callback,
            data_filter: DataFilter::default(),
            kind: CallbackKind::default(),
        }
    }

    /// Set the data filter.
    pub fn with_data_filter(mut self, data_filter: DataFilter) -> Self {
        self.data_filter = data_filter;
        self
    }

    /// Set the delivery style.
    pub fn with_kind(mut self, kind: CallbackKind) -> Self {
        self.kind = kind;
        self
    }

    /// Owning client.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client side callback ref.
    pub fn callback(&self) -> u16 {
        self.callback
    }

    /// Data filter.
    pub fn data_filter(&self) -> DataFilter {
        self.data_filter
    }

    /// Delivery style.
    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    fn same_registration(&self, client_id: &str, callback: u16) -> bool {
        self.callback == callback && self.client_id == client_id
    }
}

/// Update and remove callback lists of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    on_update: Vec<CallbackInfo>,
    on_remove: Vec<CallbackInfo>,
}

impl Notifications {
    /// Callbacks fired on update.
    pub fn on_update(&self) -> &[CallbackInfo] {
        &self.on_update
    }

    /// Callbacks fired on removal.
    pub fn on_remove(&self) -> &[CallbackInfo] {
        &self.on_remove
    }

    /// If no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.on_update.is_empty() && self.on_remove.is_empty()
    }

    /// Register an update callback. Returns `true` if it was not registered before.
    ///
    /// Re-registering only updates the data filter, unless `keep_old_filter` is set.
    pub fn add_update_callback(&mut self, info: CallbackInfo, keep_old_filter: bool) -> bool {
        upsert(&mut self.on_update, info, keep_old_filter)
    }

    /// Register a remove callback. Same rules as [`Notifications::add_update_callback`].
    pub fn add_remove_callback(&mut self, info: CallbackInfo, keep_old_filter: bool) -> bool {
        upsert(&mut self.on_remove, info, keep_old_filter)
    }

    /// Unregister an update callback. Returns `true` if it was registered.
    pub fn remove_update_callback(&mut self, client_id: &str, callback: u16) -> bool {
        remove(&mut self.on_update, client_id, callback)
    }

    /// Unregister a remove callback. Returns `true` if it was registered.
    pub fn remove_remove_callback(&mut self, client_id: &str, callback: u16) -> bool {
        remove(&mut self.on_remove, client_id, callback)
    }

    /// Drop every callback of `client_id`. Returns how many were dropped.
    pub fn remove_client(&mut self, client_id: &str) -> usize {
        let before = self.on_update.len() + self.on_remove.len();
        self.on_update.retain(|info| info.client_id != client_id);
        self.on_remove.retain(|info| info.client_id != client_id);
        before - self.on_update.len() - self.on_remove.len()
    }

    /// Add the callbacks of `other` that are not registered here yet.
    ///
    /// Filters already registered here win.
    pub fn merge(&mut self, other: &Notifications) {
        for info in &other.on_update {
            upsert(&mut self.on_update, info.clone(), true);
        }
        for info in &other.on_remove {
            upsert(&mut self.on_remove, info.clone(), true);
        }
    }

    /// Estimated heap footprint.
    pub fn in_memory_size(&self) -> usize {
        self.on_update
            .iter()
            .chain(self.on_remove.iter())
            .map(|info| std::mem::size_of::<CallbackInfo>() + info.client_id.len())
            .sum()
    }
}

fn upsert(list: &mut Vec<CallbackInfo>, info: CallbackInfo, keep_old_filter: bool) -> bool {
    match list
        .iter_mut()
        .find(|old| old.same_registration(&info.client_id, info.callback))
    {
        Some(old) => {
            if !keep_old_filter {
                old.data_filter = info.data_filter;
            }
            false
        }
        None => {
            list.push(info);
            true
        }
    }
}

fn remove(list: &mut Vec<CallbackInfo>, client_id: &str, callback: u16) -> bool {
    let before = list.len();
    list.retain(|info| !info.same_registration(client_id, callback));
    list.len() != before
}
