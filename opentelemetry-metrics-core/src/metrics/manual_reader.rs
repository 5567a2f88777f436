use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{error::OTelSdkError, ResultCode};

use super::{
    data::ResourceMetrics,
    instrument::InstrumentKind,
    reader::{MetricProducer, MetricReader},
    MetricError, MetricResult, Temporality, TemporalityPreference,
};

/// A simple [MetricReader] that allows an application to read metrics on demand.
///
/// The reader is a cheap handle: keep a clone after handing one to the
/// provider builder and call [`collect`](ManualReader::collect) on it.
///
/// See [ManualReaderBuilder] for configuration options.
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_core::metrics::ManualReader;
///
/// // can specify additional reader configuration
/// let reader = ManualReader::builder().build();
/// # drop(reader)
/// ```
#[derive(Clone)]
pub struct ManualReader {
    inner: Arc<ManualReaderInner>,
}

struct ManualReaderInner {
    state: Mutex<ManualReaderState>,
    temporality: TemporalityPreference,
}

#[derive(Debug, Default)]
struct ManualReaderState {
    producer: Option<Arc<dyn MetricProducer>>,
    is_shutdown: bool,
}

impl Default for ManualReader {
    fn default() -> Self {
        ManualReader::builder().build()
    }
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReader")
            .field("temporality", &self.inner.temporality)
            .finish()
    }
}

impl ManualReader {
    /// Configuration for this reader
    pub fn builder() -> ManualReaderBuilder {
        ManualReaderBuilder::default()
    }

    fn new(temporality: TemporalityPreference) -> Self {
        ManualReader {
            inner: Arc::new(ManualReaderInner {
                state: Mutex::new(ManualReaderState::default()),
                temporality,
            }),
        }
    }

    /// Gathers all metrics from the provider, calling any callbacks necessary
    /// and returning the results.
    ///
    /// Returns an error if called after shutdown or before the reader was
    /// registered with a provider.
    pub fn collect(&self) -> MetricResult<ResourceMetrics> {
        let producer = {
            let state = self.inner.state.lock()?;
            if state.is_shutdown {
                return Err(MetricError::Other("reader is shut down".into()));
            }
            state
                .producer
                .clone()
                .ok_or_else(|| MetricError::Other("reader is not registered".into()))?
        };
        // Callbacks run during produce, so the lock is released first.
        producer.produce()
    }
}

impl MetricReader for ManualReader {
    /// Stores the producer which enables the caller to read metrics on demand.
    fn register_producer(&self, producer: Box<dyn MetricProducer>) {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only register once. If producer is already set, do nothing.
        if state.producer.is_none() {
            state.producer = Some(Arc::from(producer));
        } else {
            otel_warn!(
                name: "ManualReader.DuplicateRegistration",
                message = "The reader is already registered with a provider, ignoring the new registration."
            );
        }
    }

    /// ForceFlush is a no-op, it always succeeds.
    fn force_flush(&self) -> ResultCode {
        ResultCode::of_success()
    }

    /// Closes any connections and frees any resources used by the reader.
    fn shutdown(&self) -> ResultCode {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.is_shutdown {
            return ResultCode::of_exceptional_failure(OTelSdkError::AlreadyShutdown);
        }

        // Any future call to collect will now return an error.
        state.producer = None;
        state.is_shutdown = true;
        ResultCode::of_success()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.inner.temporality.temporality(kind)
    }
}

/// Configuration for a [ManualReader]
#[derive(Debug, Default)]
pub struct ManualReaderBuilder {
    temporality: TemporalityPreference,
}

impl ManualReaderBuilder {
    /// New manual builder configuration
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the [TemporalityPreference] the reader reports with.
    ///
    /// Defaults to [TemporalityPreference::Cumulative].
    pub fn with_temporality(mut self, temporality: TemporalityPreference) -> Self {
        self.temporality = temporality;
        self
    }

    /// Create a new [ManualReader] from this configuration.
    pub fn build(self) -> ManualReader {
        ManualReader::new(self.temporality)
    }
}
