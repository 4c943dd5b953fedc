//! Per-request handle: cancellation, abort reason and watchdog state

use crate::watchdog::{AbortReason, WatchdogConfig, WatchdogState};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A cloneable handle to one in-flight request.
///
/// Each request gets its own handle; clones share the same state so another
/// task can abort the request.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    cancel: CancellationToken,
    reason: Arc<Mutex<Option<AbortReason>>>,
    watchdog: Arc<Mutex<WatchdogState>>,
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
            watchdog: Arc::new(Mutex::new(WatchdogState::new(Instant::now()))),
        }
    }

    /// Abort on behalf of the user
    pub fn abort(&self) {
        self.abort_with(AbortReason::User);
    }

    /// Abort with a reason; the first reason recorded wins
    pub fn abort_with(&self, reason: AbortReason) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.reason.lock()
    }

    /// Resolves once the request is aborted
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Get the cancellation token (for external callers that need direct access)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Restart the watchdog clock at the start of the request
    pub(crate) fn start_watchdog(&self, now: Instant) {
        *self.watchdog.lock() = WatchdogState::new(now);
    }

    pub(crate) fn mark_chunk(&self, now: Instant) {
        self.watchdog.lock().mark_chunk(now);
    }

    /// Run the watchdog check, aborting the request if a threshold passed
    pub(crate) fn check_watchdog(&self, now: Instant, config: &WatchdogConfig) -> Option<AbortReason> {
        let reason = self.watchdog.lock().check(now, config)?;
        tracing::warn!(%reason, "watchdog aborting request");
        self.abort_with(reason);
        Some(reason)
    }

    /// Snapshot of the watchdog timing state
    pub fn watchdog_state(&self) -> WatchdogState {
        *self.watchdog.lock()
    }
}
