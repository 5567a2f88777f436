//! Time sources used to stamp collections.
use std::fmt;
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of wall-clock and monotonic time.
///
/// A single clock is shared by every meter of a provider, so all collected
/// data is stamped from the same time source.
pub trait Clock: fmt::Debug + Send + Sync + 'static {
    /// Nanoseconds since the UNIX epoch.
    fn now(&self) -> u64;

    /// Nanoseconds elapsed on a monotonic timer with an arbitrary origin.
    ///
    /// Only differences between two values are meaningful.
    fn nano_time(&self) -> u64;
}

/// The [Clock] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock {
    _private: (),
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        SystemClock { _private: () }
    }
}

fn monotonic_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    }

    fn nano_time(&self) -> u64 {
        monotonic_origin().elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_after_epoch() {
        let clock = SystemClock::new();
        // 2020-01-01T00:00:00Z
        assert!(clock.now() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn nano_time_never_goes_back() {
        let clock = SystemClock::new();
        let first = clock.nano_time();
        let second = clock.nano_time();
        assert!(second >= first);
    }
}
