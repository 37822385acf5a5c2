//! Countdown latch.
//!
//! A latch starts at `n` and opens once it has been counted down `n` times.
//! The bulk loader gives each worker one count and blocks on [`wait`]
//! until every worker has reached a terminal state.
//!
//! [`wait`]: CountdownLatch::wait

use std::sync::Arc;

use tokio::sync::watch;

/// Opens after a fixed number of count-downs.
#[derive(Debug)]
pub struct CountdownLatch {
    remaining: watch::Sender<usize>,
}

impl CountdownLatch {
    /// Create a latch that needs `count` count-downs. A zero count is
    /// already open.
    pub fn new(count: usize) -> Self {
        let (remaining, _) = watch::channel(count);
        Self { remaining }
    }

    /// Record one unit of work as finished. Extra calls are ignored.
    pub fn count_down(&self) {
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Count-downs still needed.
    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Wait until the latch is open.
    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Counts a shared latch down when dropped, including on panic.
#[derive(Debug)]
pub struct LatchGuard(Arc<CountdownLatch>);

impl LatchGuard {
    /// Tie one count of `latch` to the guard's lifetime.
    pub fn new(latch: Arc<CountdownLatch>) -> Self {
        Self(latch)
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

// ============================================================================
// Tests
// ============================================================================
