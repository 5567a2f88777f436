use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry_metrics_core::error::OTelSdkError;
use opentelemetry_metrics_core::metrics::{
    data::{MetricData, ResourceMetrics},
    InMemoryMetricExporter, InstrumentKind, ManualReader, MetricProducer, MetricReader,
    PeriodicReader, SdkMeterProvider, Temporality, TemporalityPreference,
};
use opentelemetry_metrics_core::{KeyValue, ResultCode};

/// Wraps a reader and counts how often the provider shuts it down.
#[derive(Debug, Clone)]
struct CountingReader<R> {
    reader: R,
    shutdowns: Arc<AtomicUsize>,
}

impl<R> CountingReader<R> {
    fn new(reader: R) -> Self {
        CountingReader {
            reader,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl<R: MetricReader> MetricReader for CountingReader<R> {
    fn register_producer(&self, producer: Box<dyn MetricProducer>) {
        self.reader.register_producer(producer)
    }

    fn force_flush(&self) -> ResultCode {
        self.reader.force_flush()
    }

    fn shutdown(&self) -> ResultCode {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.reader.shutdown()
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.reader.temporality(kind)
    }
}

fn only_point(metrics: &ResourceMetrics, name: &str) -> (Option<Temporality>, f64, u64) {
    let metric = metrics
        .scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .find(|metric| metric.name == name)
        .unwrap_or_else(|| panic!("metric {name} should be reported"));
    let temporality = match &metric.data {
        MetricData::Sum(sum) => Some(sum.temporality),
        MetricData::Gauge(_) => None,
    };
    let dp = &metric.data.data_points()[0];
    (temporality, dp.value.as_f64(), dp.start_time_unix_nano)
}

#[test]
fn push_and_pull_readers_collect_independently() {
    let exporter = InMemoryMetricExporter::builder()
        .with_temporality(TemporalityPreference::Delta)
        .build();
    let push = CountingReader::new(
        PeriodicReader::builder(exporter.clone())
            .with_interval(Duration::from_secs(3600))
            .build(),
    );
    let pull_reader = ManualReader::builder().build();
    let pull = CountingReader::new(pull_reader.clone());
    let provider = SdkMeterProvider::builder()
        .with_reader(push.clone())
        .with_reader(pull.clone())
        .build();

    let http = provider.meter("http");
    let db = provider.meter("db");
    http.u64_counter("requests")
        .build()
        .add(3, &[KeyValue::new("route", "/")]);
    db.f64_gauge("pool.utilization").build().record(0.5, &[]);

    // The pull reader sees every scope.
    let scraped = pull_reader.collect().unwrap();
    let mut scopes: Vec<_> = scraped
        .scope_metrics
        .iter()
        .map(|scope| scope.scope.name().to_string())
        .collect();
    scopes.sort();
    assert_eq!(scopes, vec!["db", "http"]);
    let (temporality, value, provider_start) = only_point(&scraped, "requests");
    assert_eq!(temporality, Some(Temporality::Cumulative));
    assert_eq!(value, 3.0);

    // The scrape did not move the push reader's window: its first delta still
    // starts at the provider start.
    assert!(provider
        .force_flush()
        .join(Duration::from_secs(5))
        .is_success());
    let exported = exporter.get_finished_metrics().unwrap();
    assert_eq!(exported.len(), 1);
    let (temporality, value, start) = only_point(&exported[0], "requests");
    assert_eq!(temporality, Some(Temporality::Delta));
    assert_eq!(value, 3.0);
    assert_eq!(start, provider_start);

    // Shutdown reaches both readers once and succeeds once both did.
    let shutdown = provider.shutdown();
    assert!(shutdown.join(Duration::from_secs(5)).is_success());
    assert_eq!(push.shutdowns(), 1);
    assert_eq!(pull.shutdowns(), 1);

    let again = provider.shutdown();
    assert!(again.is_done());
    assert!(again.is_success());
    assert_eq!(push.shutdowns(), 1);
    assert_eq!(pull.shutdowns(), 1);
}

#[test]
fn shutdown_reports_the_first_reader_failure() {
    let manual = ManualReader::builder().build();
    // A reader already shut down fails its next shutdown.
    assert!(manual.shutdown().is_success());
    let healthy = CountingReader::new(ManualReader::builder().build());
    let provider = SdkMeterProvider::builder()
        .with_reader(manual)
        .with_reader(healthy.clone())
        .build();

    let code = provider.close();
    assert!(code.is_done());
    assert_eq!(code.failure(), Some(OTelSdkError::AlreadyShutdown));
    assert_eq!(healthy.shutdowns(), 1);
}

#[test]
fn dropping_the_last_handle_shuts_down() {
    let reader = CountingReader::new(ManualReader::builder().build());
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let clone = provider.clone();

    drop(provider);
    assert_eq!(reader.shutdowns(), 0);
    drop(clone);
    assert_eq!(reader.shutdowns(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_can_be_awaited() {
    let exporter = InMemoryMetricExporter::default();
    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter.clone())
        .build();
    provider.meter("async").u64_counter("jobs").build().add(1, &[]);

    assert_eq!(provider.shutdown().await, Ok(()));
    assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    assert_eq!(
        provider.shutdown().await,
        Ok(()),
        "repeated shutdown is not an error"
    );
}
