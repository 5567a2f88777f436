//! Interfaces for reading and producing metrics
use std::fmt;

use crate::ResultCode;

use super::{data::ResourceMetrics, InstrumentKind, MetricResult, Temporality};

/// The interface used between the provider and an exporter.
///
/// Control flow is bi-directional through the `MetricReader`, since the
/// provider initiates `force_flush` and `shutdown` while the reader initiates
/// collection. The `register_producer` method here informs the metric reader
/// that it can begin reading, signaling the start of bi-directional control
/// flow.
///
/// Typically, push-based exporters that are periodic will implement
/// [PushMetricExporter](super::exporter::PushMetricExporter) themselves and
/// construct a [PeriodicReader](super::PeriodicReader) to satisfy this
/// interface.
///
/// Pull-based exporters will typically implement `MetricReader` themselves,
/// since they read on demand.
pub trait MetricReader: fmt::Debug + Send + Sync + 'static {
    /// Hands the reader the producer it collects from.
    ///
    /// Called exactly once when the provider is built. The producer only ever
    /// collects on behalf of this reader.
    fn register_producer(&self, producer: Box<dyn MetricProducer>);

    /// Flushes all metric measurements held in an export pipeline.
    ///
    /// The returned code completes once the flush did. It must not block the
    /// caller until then.
    fn force_flush(&self) -> ResultCode;

    /// Flushes all metric measurements held in an export pipeline and releases any
    /// held computational resources.
    ///
    /// The returned code completes once the shutdown did. It must not block
    /// the caller until then.
    fn shutdown(&self) -> ResultCode;

    /// The output temporality, a function of instrument kind.
    /// This SHOULD be obtained from the exporter.
    ///
    /// If not configured, the Cumulative temporality SHOULD be used.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}

/// Produces metrics for a [MetricReader].
pub trait MetricProducer: fmt::Debug + Send + Sync {
    /// Returns aggregated metrics from a single collection.
    fn produce(&self) -> MetricResult<ResourceMetrics>;
}
