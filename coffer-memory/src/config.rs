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

use coffer_common::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Settings of a cache instance.
///
/// Durations are (de)serialized as milliseconds. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache name, used as the metrics label.
    pub name: String,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Number of store shards.
    pub shards: usize,
    /// Initial free-list capacity of the entry pool.
    pub store_pool_capacity: usize,
    /// Largest free-list capacity the entry pool may grow to.
    pub store_pool_max_capacity: usize,
    /// Number of per-item contexts bulk operations may hold at once.
    pub transactional_pool_capacity: usize,
    /// How long renting a context waits when all are in use.
    #[serde(with = "millis")]
    pub pool_wait_timeout: Duration,
    /// How long an operation waits for a key lock.
    #[serde(with = "millis")]
    pub key_lock_timeout: Duration,
    /// How long an operation blocks while a graceful shutdown drains the node.
    #[serde(with = "millis")]
    pub graceful_block_interval: Duration,
    /// Node name, part of every lock id.
    pub node_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "coffer".to_string(),
            capacity: 64 * 1024,
            shards: 16,
            store_pool_capacity: 1024,
            store_pool_max_capacity: 16 * 1024,
            transactional_pool_capacity: 256,
            pool_wait_timeout: Duration::from_secs(1),
            key_lock_timeout: Duration::from_secs(5),
            graceful_block_interval: Duration::from_secs(10),
            node_name: "localhost".to_string(),
        }
    }
}

impl CacheConfig {
    /// Parse a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::config("malformed cache config").with_source(e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("cache name must not be empty"));
        }
        if self.capacity == 0 {
            return Err(Error::config("capacity must be greater than zero").with_context("name", &self.name));
        }
        if self.shards == 0 {
            return Err(Error::config("shards must be greater than zero").with_context("name", &self.name));
        }
        if self.transactional_pool_capacity == 0 {
            return Err(Error::config("transactional pool capacity must be greater than zero")
                .with_context("name", &self.name));
        }
        if self.store_pool_max_capacity < self.store_pool_capacity {
            return Err(
                Error::config("store pool max capacity must not be below its capacity").with_context("name", &self.name)
            );
        }
        if self.node_name.is_empty() {
            return Err(Error::config("node name must not be empty").with_context("name", &self.name));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use coffer_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_default_is_valid() {
        CacheConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CacheConfig::from_json(r#"{ "name": "sessions", "capacity": 10, "key_lock_timeout": 250 }"#)
            .unwrap();
        assert_eq!(config.name, "sessions");
        assert_eq!(config.capacity, 10);
        assert_eq!(config.key_lock_timeout, Duration::from_millis(250));
        assert_eq!(config.shards, CacheConfig::default().shards);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""key_lock_timeout":250"#));
    }

    #[test]
    fn test_invalid_configs() {
        for json in [
            r#"{ "capacity": 0 }"#,
            r#"{ "shards": 0 }"#,
            r#"{ "transactional_pool_capacity": 0 }"#,
            r#"{ "store_pool_capacity": 10, "store_pool_max_capacity": 5 }"#,
            r#"{ "node_name": "" }"#,
            r#"{ "capacity": "many" }"#,
        ] {
            let err = CacheConfig::from_json(json).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{json}");
        }
    }
}
