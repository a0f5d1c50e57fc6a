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

use std::time::{Duration, Instant};

use coffer_common::error::{Error, ErrorKind, Result};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::context::OperationContext;

/// Shutdown state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShutdownStatus {
    /// Serving normally.
    #[default]
    None,
    /// Draining before stop.
    ShutdownInProgress,
    /// Stopped.
    ShutdownCompleted,
}

/// Kind of operation, as seen by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationCategory {
    /// Single key read.
    AtomicRead,
    /// Single key write.
    AtomicWrite,
    /// Multi key read.
    BulkRead,
    /// Multi key write.
    BulkWrite,
    /// Read on behalf of another node.
    ClusterRead,
}

/// Admission control latch consulted by every operation.
///
/// While a graceful shutdown is in progress, operations block for at most the block interval unless they carry
/// the no-graceful-block override or their category is allowed. An operation released by the shutdown completing
/// fails; one released by the timeout or a canceled shutdown proceeds.
#[derive(Debug)]
pub struct ShutdownGate {
    status: Mutex<ShutdownStatus>,
    cond: Condvar,
    block_interval: Duration,
}

impl ShutdownGate {
    /// Create an open gate blocking for at most `block_interval` while draining.
    pub fn new(block_interval: Duration) -> Self {
        Self {
            status: Mutex::new(ShutdownStatus::None),
            cond: Condvar::new(),
            block_interval,
        }
    }

    /// Current status.
    pub fn status(&self) -> ShutdownStatus {
        *self.status.lock()
    }

    /// Bound of the wait of a blocked operation.
    pub fn block_interval(&self) -> Duration {
        self.block_interval
    }

    /// Enter graceful shutdown. Returns `false` unless the gate was open.
    pub fn start_graceful_shutdown(&self) -> bool {
        let mut status = self.status.lock();
        if *status != ShutdownStatus::None {
            return false;
        }
        *status = ShutdownStatus::ShutdownInProgress;
        tracing::info!("[shutdown]: graceful shutdown started");
        true
    }

    /// Complete the shutdown, releasing every blocked operation.
    pub fn complete_shutdown(&self) {
        *self.status.lock() = ShutdownStatus::ShutdownCompleted;
        self.cond.notify_all();
        tracing::info!("[shutdown]: shutdown completed");
    }

    /// Abort a graceful shutdown in progress and reopen the gate. Returns `false` if none was in progress.
    pub fn cancel_shutdown(&self) -> bool {
        let mut status = self.status.lock();
        if *status != ShutdownStatus::ShutdownInProgress {
            return false;
        }
        *status = ShutdownStatus::None;
        self.cond.notify_all();
        tracing::info!("[shutdown]: graceful shutdown canceled");
        true
    }

    /// Wait up to `timeout` for the status to become one of `targets`. Returns the status reached, or `None` on
    /// timeout.
    pub fn wait_for_any(&self, targets: &[ShutdownStatus], timeout: Duration) -> Option<ShutdownStatus> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        loop {
            if targets.contains(&*status) {
                return Some(*status);
            }
            if self.cond.wait_until(&mut status, deadline).timed_out() {
                return targets.contains(&*status).then_some(*status);
            }
        }
    }

    /// Admit an operation of `category`.
    ///
    /// `allowed` is asked, only while draining, whether the backend lets this operation through. Returns how long
    /// the operation was blocked, if it was.
    pub fn admit(
        &self,
        ctx: &OperationContext,
        category: OperationCategory,
        allowed: impl FnOnce() -> bool,
    ) -> Result<Option<Duration>> {
        match self.status() {
            ShutdownStatus::None => return Ok(None),
            ShutdownStatus::ShutdownCompleted => return Err(shut_down(category)),
            ShutdownStatus::ShutdownInProgress => {}
        }
        if ctx.no_graceful_block() || allowed() {
            return Ok(None);
        }

        let start = Instant::now();
        let reached = self.wait_for_any(
            &[ShutdownStatus::None, ShutdownStatus::ShutdownCompleted],
            self.block_interval,
        );
        let waited = start.elapsed();
        match reached {
            Some(ShutdownStatus::ShutdownCompleted) => Err(shut_down(category)),
            Some(_) => Ok(Some(waited)),
            None => {
                tracing::debug!(
                    "[shutdown]: {:?} operation proceeds after blocking for {:?}",
                    category,
                    waited
                );
                Ok(Some(waited))
            }
        }
    }
}

fn shut_down(category: OperationCategory) -> Error {
    Error::new(ErrorKind::ShutDown, "node is shut down").with_context("category", format!("{category:?}"))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    const LONG: Duration = Duration::from_secs(10);

    #[test]
    fn test_open_gate_admits() {
        let gate = ShutdownGate::new(LONG);
        let admitted = gate
            .admit(&OperationContext::new(), OperationCategory::AtomicWrite, || {
                unreachable!("not asked while open")
            })
            .unwrap();
        assert_eq!(admitted, None);
    }

    #[test]
    fn test_completed_gate_rejects() {
        let gate = ShutdownGate::new(LONG);
        gate.complete_shutdown();
        let err = gate
            .admit(&OperationContext::new(), OperationCategory::AtomicRead, || true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShutDown);
        assert!(!gate.start_graceful_shutdown());
    }

    #[test]
    fn test_overrides_bypass_draining_gate() {
        let gate = ShutdownGate::new(LONG);
        assert!(gate.start_graceful_shutdown());
        assert!(!gate.start_graceful_shutdown());

        let ctx = OperationContext::new().with_no_graceful_block(true);
        assert_eq!(gate.admit(&ctx, OperationCategory::BulkWrite, || false).unwrap(), None);
        assert_eq!(
            gate.admit(&OperationContext::new(), OperationCategory::ClusterRead, || true)
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_blocked_operation_proceeds_after_timeout() {
        let interval = Duration::from_millis(50);
        let gate = ShutdownGate::new(interval);
        gate.start_graceful_shutdown();

        let start = Instant::now();
        let waited = gate
            .admit(&OperationContext::new(), OperationCategory::AtomicWrite, || false)
            .unwrap()
            .unwrap();
        assert!(waited >= interval);
        assert!(start.elapsed() < LONG);
    }

    #[test]
    fn test_blocked_operation_fails_on_completion() {
        let gate = Arc::new(ShutdownGate::new(LONG));
        gate.start_graceful_shutdown();

        let handle = {
            let gate = gate.clone();
            thread::spawn(move || gate.admit(&OperationContext::new(), OperationCategory::BulkRead, || false))
        };
        thread::sleep(Duration::from_millis(20));
        gate.complete_shutdown();
        let err = handle.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShutDown);
    }

    #[test]
    fn test_blocked_operation_resumes_on_cancel() {
        let gate = Arc::new(ShutdownGate::new(LONG));
        gate.start_graceful_shutdown();

        let handle = {
            let gate = gate.clone();
            thread::spawn(move || gate.admit(&OperationContext::new(), OperationCategory::AtomicRead, || false))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(gate.cancel_shutdown());
        let waited = handle.join().unwrap().unwrap().unwrap();
        assert!(waited < LONG);
        assert_eq!(gate.status(), ShutdownStatus::None);
    }

    #[test]
    fn test_wait_for_any_times_out() {
        let gate = ShutdownGate::new(LONG);
        gate.start_graceful_shutdown();
        assert_eq!(
            gate.wait_for_any(&[ShutdownStatus::ShutdownCompleted], Duration::from_millis(10)),
            None
        );
        assert_eq!(
            gate.wait_for_any(&[ShutdownStatus::ShutdownInProgress], Duration::from_millis(10)),
            Some(ShutdownStatus::ShutdownInProgress)
        );
    }
}
