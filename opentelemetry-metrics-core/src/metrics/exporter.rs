//! Interfaces for exporting metrics
use std::fmt;

use crate::ResultCode;

use super::{data::ResourceMetrics, InstrumentKind, Temporality};

/// Exporter handles the delivery of metric data to external receivers.
///
/// This is the final component in the metric push pipeline. A
/// [PeriodicReader](super::PeriodicReader) drives it: every collection of the
/// reader is handed to [`export`](PushMetricExporter::export).
pub trait PushMetricExporter: fmt::Debug + Send + Sync + 'static {
    /// Export serializes and transmits metric data to a receiver.
    ///
    /// All retry logic must be contained in this function. The reader waits
    /// on the returned code for at most its export timeout and does not retry
    /// on failure.
    fn export(&self, metrics: &ResourceMetrics) -> ResultCode;

    /// Flushes any metric data held by an exporter.
    fn force_flush(&self) -> ResultCode;

    /// Releases any held computational resources.
    ///
    /// After shutdown is called, calls to export will fail.
    fn shutdown(&self) -> ResultCode;

    /// Access the [Temporality] of the MetricExporter.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}
