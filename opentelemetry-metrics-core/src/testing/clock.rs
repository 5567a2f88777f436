use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::Clock;

/// A [Clock] that only moves when told to.
///
/// Clones share the same time, so a test can keep one clone and hand another
/// to the provider.
#[derive(Debug, Clone)]
pub struct TestClock {
    nanos: Arc<AtomicU64>,
}

impl TestClock {
    /// Create a clock reading `start_epoch_nanos`.
    pub fn new(start_epoch_nanos: u64) -> Self {
        TestClock {
            nanos: Arc::new(AtomicU64::new(start_epoch_nanos)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Set the clock to `epoch_nanos`.
    pub fn set(&self, epoch_nanos: u64) {
        self.nanos.store(epoch_nanos, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }

    fn nano_time(&self) -> u64 {
        self.now()
    }
}
