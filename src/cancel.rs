//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag used to abort in-flight work.
///
/// Clones observe the same flag, so the caller keeps one clone and every attempt spawned
/// for the call holds another. Cancellation is cooperative: it is checked before each
/// attempt, between retries and between streaming frames, never mid-exchange.
#[derive(Clone, Debug, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent and callable from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
