use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::{error::OTelSdkError, ResultCode};

use super::{
    data::ResourceMetrics, exporter::PushMetricExporter, InstrumentKind, MetricError,
    MetricResult, Temporality, TemporalityPreference,
};

/// An in-memory metrics exporter that stores metrics data in memory.
///
/// This exporter is useful for testing and debugging purposes. It stores
/// metric data in a `VecDeque<ResourceMetrics>`. Metrics can be retrieved
/// using the `get_finished_metrics` method. Clones share the same storage.
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_core::metrics::{
///     InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
/// };
/// use opentelemetry_metrics_core::KeyValue;
/// use std::time::Duration;
///
/// // Create an InMemoryMetricExporter
/// let exporter = InMemoryMetricExporter::default();
///
/// // Create a MeterProvider and register the exporter
/// let meter_provider = SdkMeterProvider::builder()
///     .with_reader(PeriodicReader::builder(exporter.clone()).build())
///     .build();
///
/// // Create and record metrics using the MeterProvider
/// let meter = meter_provider.meter("example");
/// let counter = meter.u64_counter("my_counter").build();
/// counter.add(1, &[KeyValue::new("key", "value")]);
///
/// meter_provider.force_flush().join(Duration::from_secs(5));
///
/// // Retrieve the finished metrics from the exporter
/// let finished_metrics = exporter.get_finished_metrics().unwrap();
/// assert_eq!(finished_metrics.len(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<VecDeque<ResourceMetrics>>>,
    temporality: TemporalityPreference,
}

impl fmt::Debug for InMemoryMetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricExporter")
            .field("temporality", &self.temporality)
            .finish()
    }
}

impl Default for InMemoryMetricExporter {
    fn default() -> Self {
        InMemoryMetricExporterBuilder::new().build()
    }
}

/// Builder for [`InMemoryMetricExporter`].
/// # Example
///
/// ```
/// # use opentelemetry_metrics_core::metrics::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};
///
/// let exporter = InMemoryMetricExporterBuilder::new().build();
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetricExporterBuilder {
    temporality: Option<TemporalityPreference>,
}

impl InMemoryMetricExporterBuilder {
    /// Creates a new instance of the `InMemoryMetricExporterBuilder`.
    pub fn new() -> Self {
        Self { temporality: None }
    }

    /// Set the [TemporalityPreference] of the exporter.
    pub fn with_temporality(mut self, temporality: TemporalityPreference) -> Self {
        self.temporality = Some(temporality);
        self
    }

    /// Creates a new instance of the `InMemoryMetricExporter`.
    pub fn build(self) -> InMemoryMetricExporter {
        InMemoryMetricExporter {
            metrics: Arc::new(Mutex::new(VecDeque::new())),
            temporality: self.temporality.unwrap_or_default(),
        }
    }
}

impl InMemoryMetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> InMemoryMetricExporterBuilder {
        InMemoryMetricExporterBuilder::new()
    }

    /// Returns the finished metrics as a vector of `ResourceMetrics`.
    ///
    /// # Errors
    ///
    /// Returns a `MetricError` if the internal lock cannot be acquired.
    pub fn get_finished_metrics(&self) -> MetricResult<Vec<ResourceMetrics>> {
        self.metrics
            .lock()
            .map(|metrics_guard| metrics_guard.iter().cloned().collect())
            .map_err(MetricError::from)
    }

    /// Clears the internal storage of finished metrics.
    pub fn reset(&self) {
        let _ = self
            .metrics
            .lock()
            .map(|mut metrics_guard| metrics_guard.clear());
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> ResultCode {
        match self.metrics.lock() {
            Ok(mut metrics_guard) => {
                metrics_guard.push_back(metrics.clone());
                ResultCode::of_success()
            }
            Err(err) => ResultCode::of_exceptional_failure(OTelSdkError::InternalFailure(
                err.to_string(),
            )),
        }
    }

    fn force_flush(&self) -> ResultCode {
        // exporter holds no state, nothing to flush
        ResultCode::of_success()
    }

    fn shutdown(&self) -> ResultCode {
        ResultCode::of_success()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.temporality(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::ScopeMetrics;
    use crate::Resource;

    fn batch() -> ResourceMetrics {
        ResourceMetrics {
            resource: Resource::empty(),
            scope_metrics: vec![ScopeMetrics::default()],
        }
    }

    #[test]
    fn clones_share_storage() {
        let exporter = InMemoryMetricExporter::default();
        let clone = exporter.clone();

        assert!(clone.export(&batch()).is_success());
        assert!(clone.export(&batch()).is_success());
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 2);

        exporter.reset();
        assert!(clone.get_finished_metrics().unwrap().is_empty());
    }

    #[test]
    fn temporality_defaults_to_cumulative() {
        let exporter = InMemoryMetricExporter::default();
        assert_eq!(
            exporter.temporality(InstrumentKind::Counter),
            Temporality::Cumulative
        );

        let exporter = InMemoryMetricExporter::builder()
            .with_temporality(TemporalityPreference::LowMemory)
            .build();
        assert_eq!(
            exporter.temporality(InstrumentKind::Counter),
            Temporality::Delta
        );
        assert_eq!(
            exporter.temporality(InstrumentKind::ObservableCounter),
            Temporality::Cumulative
        );
    }
}
