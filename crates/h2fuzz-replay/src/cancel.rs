//! Cooperative cancellation for replay runs.
//!
//! The driver checks the token between records and while sleeping in
//! reconnect backoff. Cancelling never interrupts a connection write
//! that is already in progress; the I/O timeout bounds those.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

struct Inner {
    cancelled: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Shared cancellation flag. Clones observe the same state.
///
/// # Examples
///
/// ```
/// use h2fuzz_replay::CancelToken;
/// use std::time::Duration;
///
/// let token = CancelToken::new();
/// let remote = token.clone();
/// remote.cancel();
/// assert!(token.is_cancelled());
/// // A cancelled token never sleeps.
/// assert!(token.sleep(Duration::from_secs(60)));
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

// Compile-time assertion: CancelToken must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<CancelToken>();
};

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            // Wake a sleeper, if any. A full channel means one is already queued.
            let _ = self.inner.wake_tx.try_send(());
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, returning early if the token is cancelled.
    ///
    /// Returns `true` if the token is cancelled on return.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.inner.wake_rx.recv_timeout(duration) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.is_cancelled()
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
