use std::sync::atomic::{AtomicBool, Ordering};

use crate::{error::OTelSdkError, ResultCode};

use super::{
    data::{MetricData, ResourceMetrics},
    exporter::PushMetricExporter,
    InstrumentKind, Temporality, TemporalityPreference,
};

/// A [PushMetricExporter] that writes every exported metric to the internal
/// log.
///
/// Each metric becomes one `info` event carrying the scope, name, unit and
/// number of data points, plus one `debug` event per data point. Events go
/// through `tracing` when the `internal-logs` feature is enabled, so any
/// subscriber decides where they end up.
#[derive(Debug, Default)]
pub struct LoggingMetricExporter {
    temporality: TemporalityPreference,
    is_shutdown: AtomicBool,
}

impl LoggingMetricExporter {
    /// Create an exporter reporting with the given [TemporalityPreference].
    pub fn new(temporality: TemporalityPreference) -> Self {
        LoggingMetricExporter {
            temporality,
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl PushMetricExporter for LoggingMetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> ResultCode {
        if self.is_shutdown.load(Ordering::Acquire) {
            return ResultCode::of_exceptional_failure(OTelSdkError::AlreadyShutdown);
        }
        for scope_metrics in &metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                let data_points = metric.data.data_points();
                let kind = match &metric.data {
                    MetricData::Gauge(_) => "gauge",
                    MetricData::Sum(_) => "sum",
                };
                otel_info!(
                    name: "LoggingMetricExporter.Metric",
                    scope = scope_metrics.scope.name(),
                    metric_name = metric.name.as_ref(),
                    unit = metric.unit.as_ref(),
                    kind = kind,
                    data_points = data_points.len()
                );
                for dp in data_points {
                    otel_debug!(
                        name: "LoggingMetricExporter.DataPoint",
                        metric_name = metric.name.as_ref(),
                        attributes = format!("{:?}", dp.attributes),
                        value = format!("{}", dp.value),
                        start_time_unix_nano = dp.start_time_unix_nano,
                        time_unix_nano = dp.time_unix_nano
                    );
                }
            }
        }
        ResultCode::of_success()
    }

    fn force_flush(&self) -> ResultCode {
        ResultCode::of_success()
    }

    fn shutdown(&self) -> ResultCode {
        self.is_shutdown.store(true, Ordering::Release);
        ResultCode::of_success()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.temporality.temporality(kind)
    }
}
