use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::reader::MetricReader;

/// A reader bound to a provider, together with the state the provider keeps
/// for that reader alone.
///
/// The last collection timestamp is only written by collections made through
/// this reader's own producer and never moves backwards.
pub(crate) struct RegisteredReader {
    id: usize,
    reader: Box<dyn MetricReader>,
    last_collect_epoch_nanos: AtomicU64,
}

impl RegisteredReader {
    pub(crate) fn new(id: usize, reader: Box<dyn MetricReader>) -> Self {
        RegisteredReader {
            id,
            reader,
            last_collect_epoch_nanos: AtomicU64::new(0),
        }
    }

    /// Position of this reader within its provider, used to index per-reader
    /// storage.
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn reader(&self) -> &dyn MetricReader {
        self.reader.as_ref()
    }

    pub(crate) fn last_collect_epoch_nanos(&self) -> u64 {
        self.last_collect_epoch_nanos.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_collect_epoch_nanos(&self, epoch_nanos: u64) {
        self.last_collect_epoch_nanos
            .fetch_max(epoch_nanos, Ordering::AcqRel);
    }
}

impl fmt::Debug for RegisteredReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredReader")
            .field("id", &self.id)
            .field("reader", &self.reader)
            .field("last_collect_epoch_nanos", &self.last_collect_epoch_nanos())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestMetricReader;

    #[test]
    fn last_collect_never_moves_backwards() {
        let registered = RegisteredReader::new(0, Box::new(TestMetricReader::new()));
        registered.set_last_collect_epoch_nanos(200);
        registered.set_last_collect_epoch_nanos(100);
        assert_eq!(registered.last_collect_epoch_nanos(), 200);
        registered.set_last_collect_epoch_nanos(300);
        assert_eq!(registered.last_collect_epoch_nanos(), 300);
    }
}
