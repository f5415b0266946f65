//! Cooperative cancellation for a running crawl

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, one-way stop flag
///
/// Clones observe the same flag. Once set it stays set for the rest of the
/// run: no new generation is dispatched, no queued worker starts, and no new
/// fetch attempt begins. Requests already in flight are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the crawl stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
