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

//! Optimistic version rules.
//!
//! A fresh entry takes the caller supplied version or the current wall-clock milliseconds. An overwrite takes the
//! previous stored version plus one, unless the caller preserves its own version. Only per-key monotonicity holds;
//! fresh entries of different keys may share a version.

use chrono::{DateTime, Utc};
use coffer_common::error::{Error, Result};

use crate::{context::OperationContext, lock::LockAccessType};

/// Version derived from a wall-clock instant.
pub fn clock_version(now: DateTime<Utc>) -> u64 {
    now.timestamp_millis().max(0) as u64
}

/// Version of a fresh entry.
pub fn initial_version(ctx: &OperationContext, now: DateTime<Utc>) -> u64 {
    ctx.item_version().unwrap_or_else(|| clock_version(now))
}

/// Version of an entry overwriting one stored at `previous`.
pub fn overwrite_version(previous: u64, access: LockAccessType, ctx: &OperationContext) -> u64 {
    match (access, ctx.item_version()) {
        (LockAccessType::PreserveVersion, Some(version)) => version,
        _ => previous.saturating_add(1),
    }
}

/// Fail with a version mismatch unless `stored` equals `expected`.
pub fn check_version(key: &str, stored: u64, expected: u64) -> Result<()> {
    if stored == expected {
        Ok(())
    } else {
        Err(Error::version_mismatch(key, expected, stored))
    }
}

#[cfg(test)]
mod tests {
    use coffer_common::error::ErrorKind;

    use super::*;

    #[test]
    fn test_initial_version() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(initial_version(&OperationContext::new(), now), 1_700_000_000_123);
        assert_eq!(
            initial_version(&OperationContext::new().with_item_version(1000), now),
            1000
        );
    }

    #[test]
    fn test_overwrite_version() {
        let plain = OperationContext::new().with_item_version(5);
        assert_eq!(overwrite_version(1000, LockAccessType::Default, &plain), 1001);
        assert_eq!(overwrite_version(1000, LockAccessType::PreserveVersion, &plain), 5);
        assert_eq!(
            overwrite_version(1000, LockAccessType::PreserveVersion, &OperationContext::new()),
            1001
        );
        assert_eq!(
            overwrite_version(u64::MAX, LockAccessType::Default, &OperationContext::new()),
            u64::MAX
        );
    }

    #[test]
    fn test_check_version() {
        assert!(check_version("k", 3, 3).is_ok());
        let err = check_version("k", 4, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::VersionMismatch);
        assert!(!err.is_traceable());
    }
}
