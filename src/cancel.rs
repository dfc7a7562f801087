//! Cancellation utilities.
//!
//! Generalizes the stream-scoped cancel handle used by upstream clients
//! (cancel a single SSE stream) to whole-pipeline cancellation: one
//! `CancelHandle` is shared by the orchestrator, every `ThinkingThread`,
//! every validator call, and the fusion call for a single request.
//! Cancellation propagates through a `tokio_util::sync::CancellationToken`,
//! so callers can either poll `is_cancelled()` or `select!` on the
//! `cancelled()` future to be woken the instant cancellation is requested —
//! including mid-flight inside a suspension point such as
//! `ModelClient::invoke`, not just before dispatch.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// A handle that can be used to request cancellation of an in-flight request.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a fresh, not-yet-cancelled handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Every clone observes the change.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves the instant cancellation is requested. Meant
    /// to be raced with an in-flight upstream call via `tokio::select!` so
    /// cancellation propagates within one suspension-point granularity
    /// (spec §5), not merely at the next poll-before-dispatch check.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
