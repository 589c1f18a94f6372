use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag checked between training epochs and tuning candidates.
///
/// Clones observe the same flag, so one handle can be moved into a blocking
/// fit while another stays with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Guard that cancels the token when dropped, e.g. when the future
    /// holding it is abandoned by a timeout.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

#[derive(Debug)]
pub struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
