use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::{WfsError, WfsResult};

/// Cancellation signal shared between a caller and the operations it starts.
///
/// Clones observe the same signal. Cancelling is sticky: once set it stays set.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `future` unless the token fires first, in which case the future
    /// is dropped (aborting any in-flight request) and `Cancelled` is returned.
    pub async fn run<F, T>(&self, future: F) -> WfsResult<T>
    where
        F: Future<Output = WfsResult<T>>,
    {
        if self.is_cancelled() {
            return Err(WfsError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(WfsError::Cancelled),
            result = future => result,
        }
    }
}
