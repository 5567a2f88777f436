use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::metrics::{
    data::ResourceMetrics, InstrumentKind, MetricError, MetricProducer, MetricReader,
    MetricResult, Temporality, TemporalityPreference,
};
use crate::ResultCode;

/// A [MetricReader] recording how the provider drives it.
///
/// Clones share their state. Shutdown and flush calls are counted, and the
/// code returned by shutdown can be replaced to simulate slow or failing
/// readers.
#[derive(Debug, Clone, Default)]
pub struct TestMetricReader {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    producer: Mutex<Option<Arc<dyn MetricProducer>>>,
    shutdown_result: Mutex<Option<ResultCode>>,
    temporality: TemporalityPreference,
    shutdown_count: AtomicUsize,
    flush_count: AtomicUsize,
}

impl TestMetricReader {
    /// A cumulative reader whose shutdown succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reader reporting with `temporality`.
    pub fn with_temporality(temporality: TemporalityPreference) -> Self {
        TestMetricReader {
            inner: Arc::new(Inner {
                temporality,
                ..Inner::default()
            }),
        }
    }

    /// Makes every shutdown return `code` instead of an immediate success.
    pub fn set_shutdown_result(&self, code: ResultCode) {
        *self
            .inner
            .shutdown_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    /// Collects through the registered producer.
    pub fn collect(&self) -> MetricResult<ResourceMetrics> {
        let producer = self
            .inner
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| MetricError::Other("reader is not registered".into()))?;
        producer.produce()
    }

    /// Whether the provider handed this reader its producer.
    pub fn is_registered(&self) -> bool {
        self.inner
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of shutdown calls received.
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdown_count.load(Ordering::SeqCst)
    }

    /// Number of force flush calls received.
    pub fn flush_count(&self) -> usize {
        self.inner.flush_count.load(Ordering::SeqCst)
    }
}

impl MetricReader for TestMetricReader {
    fn register_producer(&self, producer: Box<dyn MetricProducer>) {
        *self
            .inner
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(producer));
    }

    fn force_flush(&self) -> ResultCode {
        self.inner.flush_count.fetch_add(1, Ordering::SeqCst);
        ResultCode::of_success()
    }

    fn shutdown(&self) -> ResultCode {
        self.inner.shutdown_count.fetch_add(1, Ordering::SeqCst);
        self.inner
            .shutdown_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(ResultCode::of_success)
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.inner.temporality.temporality(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn keeps_working_after_a_panic_while_locked() {
        let reader = TestMetricReader::new();
        let poisoner = reader.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.shutdown_result.lock();
            let _producer = poisoner.inner.producer.lock();
            panic!("poison the locks");
        })
        .join();
        assert!(reader.inner.producer.is_poisoned());

        assert!(!reader.is_registered());
        reader.set_shutdown_result(ResultCode::of_failure());
        assert!(reader.shutdown().is_done());
        assert!(!reader.shutdown().is_success());
        assert_eq!(reader.shutdown_count(), 2);
    }
}
