//! The metrics collection core.
//!
//! ## Configuration
//!
//! The configuration is stored with each [SdkMeterProvider]. Configuration
//! for [Resource]s, [View]s, the [ExemplarFilter] and [ManualReader] or
//! [PeriodicReader] instances can be specified.
//!
//! ### Example
//!
//! ```
//! use opentelemetry_metrics_core::metrics::{
//!     InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
//! };
//! use opentelemetry_metrics_core::{KeyValue, Resource};
//! use std::time::Duration;
//!
//! // Generate configuration, resource, views, etc
//! let resource = Resource::builder().with_service_name("power-meter").build();
//!
//! // Create a meter provider with the desired config
//! let exporter = InMemoryMetricExporter::default();
//! let meter_provider = SdkMeterProvider::builder()
//!     .with_resource(resource)
//!     .with_reader(PeriodicReader::builder(exporter.clone()).build())
//!     .build();
//!
//! // Use the meter provider to create meter instances
//! let meter = meter_provider.meter("my_app");
//!
//! // Create instruments scoped to the meter
//! let counter = meter
//!     .u64_counter("power_consumption")
//!     .with_unit("kWh")
//!     .build();
//!
//! // use instruments to record measurements
//! counter.add(10, &[KeyValue::new("rate", "standard")]);
//!
//! // shutdown the provider at the end of the application to ensure any metrics not yet
//! // exported are flushed.
//! assert!(meter_provider
//!     .shutdown()
//!     .join(Duration::from_secs(5))
//!     .is_success());
//! ```
//!
//! [Resource]: crate::Resource

mod attribute_set;
pub mod data;
mod error;
pub mod exemplar;
pub mod exporter;
mod in_memory_exporter;
pub(crate) mod instrument;
mod logging_exporter;
mod manual_reader;
pub(crate) mod meter;
mod meter_provider;
pub(crate) mod noop;
mod periodic_reader;
pub mod reader;
pub(crate) mod registered_reader;
pub(crate) mod shared_state;
pub(crate) mod storage;
mod view;

pub use data::{Temporality, TemporalityPreference};
pub use error::{MetricError, MetricResult};
pub use exemplar::ExemplarFilter;
pub use exporter::PushMetricExporter;
pub use in_memory_exporter::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};
pub use instrument::{
    AsyncInstrument, AsyncInstrumentBuilder, Callback, Counter, Gauge, Instrument,
    InstrumentBuilder, InstrumentKind, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, UpDownCounter,
};
pub use logging_exporter::LoggingMetricExporter;
pub use manual_reader::{ManualReader, ManualReaderBuilder};
pub use meter::Meter;
pub use meter_provider::{MeterBuilder, MeterProviderBuilder, SdkMeterProvider, CLOSE_TIMEOUT};
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use reader::{MetricProducer, MetricReader};
pub use view::{Aggregation, View, ViewBuilder};

#[cfg(test)]
mod tests {
    use super::data::{DataPoint, Metric, MetricData, ResourceMetrics};
    use super::*;
    use crate::testing::TestClock;
    use crate::{Key, KeyValue};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    // use below command to run all tests
    // cargo test metrics::tests -- --nocapture

    struct TestContext {
        reader: ManualReader,
        meter_provider: SdkMeterProvider,
        meter: Meter,
    }

    impl TestContext {
        fn new(temporality: TemporalityPreference) -> Self {
            Self::with_builder(SdkMeterProvider::builder(), temporality)
        }

        fn with_builder(builder: MeterProviderBuilder, temporality: TemporalityPreference) -> Self {
            let reader = ManualReader::builder()
                .with_temporality(temporality)
                .build();
            let meter_provider = builder.with_reader(reader.clone()).build();
            let meter = meter_provider.meter("test");
            TestContext {
                reader,
                meter_provider,
                meter,
            }
        }

        fn collect(&self) -> ResourceMetrics {
            self.reader.collect().expect("collection should succeed")
        }

        fn metric(&self, name: &str) -> Option<Metric> {
            self.collect()
                .scope_metrics
                .into_iter()
                .flat_map(|scope| scope.metrics)
                .find(|metric| metric.name == name)
        }
    }

    fn point<'a>(metric: &'a Metric, attributes: &[KeyValue]) -> Option<&'a DataPoint> {
        let mut wanted = attributes.to_vec();
        wanted.sort_by(|a, b| a.key.cmp(&b.key));
        metric
            .data
            .data_points()
            .iter()
            .find(|dp| dp.attributes == wanted)
    }

    #[test]
    fn counter_aggregation_cumulative() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let counter = test_context.meter.u64_counter("my_counter").build();

        counter.add(1, &[KeyValue::new("key1", "value1")]);
        counter.add(1, &[KeyValue::new("key1", "value1")]);
        counter.add(5, &[KeyValue::new("key1", "value2")]);

        let metric = test_context.metric("my_counter").unwrap();
        let MetricData::Sum(sum) = &metric.data else {
            panic!("counter should produce a sum");
        };
        assert!(sum.is_monotonic);
        assert_eq!(sum.temporality, Temporality::Cumulative);
        assert_eq!(sum.data_points.len(), 2);
        assert_eq!(
            point(&metric, &[KeyValue::new("key1", "value1")]).unwrap().value,
            2.0
        );
        assert_eq!(
            point(&metric, &[KeyValue::new("key1", "value2")]).unwrap().value,
            5.0
        );

        // Cumulative keeps reporting unchanged series.
        let metric = test_context.metric("my_counter").unwrap();
        assert_eq!(metric.data.data_points().len(), 2);
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let counter = test_context.meter.f64_counter("my_counter").build();

        counter.add(
            1.0,
            &[KeyValue::new("a", "1"), KeyValue::new("b", "2")],
        );
        counter.add(
            1.0,
            &[KeyValue::new("b", "2"), KeyValue::new("a", "1")],
        );

        let metric = test_context.metric("my_counter").unwrap();
        assert_eq!(metric.data.data_points().len(), 1);
        assert_eq!(metric.data.data_points()[0].value, 2.0);
    }

    #[test]
    fn counter_ignores_negative_values() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let counter = test_context.meter.f64_counter("my_counter").build();

        counter.add(3.0, &[]);
        counter.add(-1.0, &[]);

        let metric = test_context.metric("my_counter").unwrap();
        assert_eq!(metric.data.data_points()[0].value, 3.0);
    }

    #[test]
    fn up_down_counter_stays_cumulative_for_delta_readers() {
        let test_context = TestContext::new(TemporalityPreference::Delta);
        let counter = test_context.meter.i64_up_down_counter("queue").build();

        counter.add(10, &[]);
        counter.add(-4, &[]);

        let metric = test_context.metric("queue").unwrap();
        let MetricData::Sum(sum) = &metric.data else {
            panic!("up-down counter should produce a sum");
        };
        assert!(!sum.is_monotonic);
        assert_eq!(sum.temporality, Temporality::Cumulative);
        assert_eq!(sum.data_points[0].value, 6.0);
    }

    #[test]
    fn gauge_keeps_last_value() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let gauge = test_context.meter.i64_gauge("temperature").build();

        gauge.record(20, &[]);
        gauge.record(-3, &[]);

        let metric = test_context.metric("temperature").unwrap();
        assert!(matches!(metric.data, MetricData::Gauge(_)));
        assert_eq!(metric.data.data_points()[0].value, -3.0);
    }

    #[test]
    fn observable_callbacks_run_on_every_collection() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = Arc::clone(&calls);
        let _gauge = test_context
            .meter
            .u64_observable_gauge("connections")
            .with_callback(move |observer| {
                let n = calls_in_callback.fetch_add(1, Ordering::Relaxed) as u64 + 1;
                observer.observe(n * 10, &[KeyValue::new("pool", "main")]);
            })
            .build();

        let metric = test_context.metric("connections").unwrap();
        assert_eq!(metric.data.data_points()[0].value, 10.0);
        let metric = test_context.metric("connections").unwrap();
        assert_eq!(metric.data.data_points()[0].value, 20.0);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn observable_counter_reports_precomputed_totals_as_delta() {
        let test_context = TestContext::new(TemporalityPreference::Delta);
        let total = Arc::new(AtomicUsize::new(0));
        let total_in_callback = Arc::clone(&total);
        let _counter = test_context
            .meter
            .f64_observable_counter("bytes")
            .with_callback(move |observer| {
                let value = total_in_callback.fetch_add(100, Ordering::Relaxed) + 100;
                observer.observe(value as f64, &[]);
            })
            .build();

        let first = test_context.metric("bytes").unwrap();
        assert_eq!(first.data.data_points()[0].value, 100.0);
        let second = test_context.metric("bytes").unwrap();
        assert_eq!(second.data.data_points()[0].value, 100.0);
    }

    #[test]
    fn same_scope_shares_instruments() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let other_meter = test_context.meter_provider.meter("test");

        test_context.meter.u64_counter("shared").build().add(1, &[]);
        other_meter.u64_counter("shared").build().add(2, &[]);

        let metrics = test_context.collect();
        assert_eq!(metrics.scope_metrics.len(), 1);
        let metric = &metrics.scope_metrics[0].metrics[0];
        assert_eq!(metric.data.data_points()[0].value, 3.0);
    }

    #[test]
    fn instrument_names_are_case_insensitive() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        test_context.meter.u64_counter("Requests").build().add(1, &[]);
        test_context.meter.u64_counter("requests").build().add(1, &[]);

        let metrics = test_context.collect();
        let metrics = &metrics.scope_metrics[0].metrics;
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "Requests");
        assert_eq!(metrics[0].data.data_points()[0].value, 2.0);
    }

    #[test]
    fn conflicting_duplicate_is_a_noop() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        test_context
            .meter
            .u64_counter("requests")
            .with_unit("1")
            .build()
            .add(1, &[]);
        test_context
            .meter
            .u64_counter("requests")
            .with_unit("ms")
            .build()
            .add(100, &[]);

        let metric = test_context.metric("requests").unwrap();
        assert_eq!(metric.unit, "1");
        assert_eq!(metric.data.data_points()[0].value, 1.0);
    }

    #[test]
    fn invalid_instrument_is_a_noop() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        test_context.meter.u64_counter("").build().add(1, &[]);
        test_context.meter.u64_counter("1st").build().add(1, &[]);
        test_context
            .meter
            .u64_counter("ok")
            .with_unit("m".repeat(64))
            .build()
            .add(1, &[]);

        assert!(test_context.collect().scope_metrics.is_empty());
    }

    #[test]
    fn view_renames_and_filters_attributes() {
        let view = View::builder()
            .with_instrument_name("requests")
            .with_stream_name("http.requests")
            .with_allowed_attribute_keys([Key::new("route")])
            .build()
            .unwrap();
        let test_context = TestContext::with_builder(
            SdkMeterProvider::builder().with_view(view),
            TemporalityPreference::Cumulative,
        );
        let counter = test_context.meter.u64_counter("requests").build();

        counter.add(
            1,
            &[KeyValue::new("route", "/"), KeyValue::new("user", "a")],
        );
        counter.add(
            1,
            &[KeyValue::new("route", "/"), KeyValue::new("user", "b")],
        );

        assert!(test_context.metric("requests").is_none());
        let metric = test_context.metric("http.requests").unwrap();
        assert_eq!(metric.data.data_points().len(), 1);
        let dp = point(&metric, &[KeyValue::new("route", "/")]).unwrap();
        assert_eq!(dp.value, 2.0);
    }

    #[test]
    fn drop_view_suppresses_instrument() {
        let view = View::builder()
            .with_instrument_name("debug.*")
            .with_aggregation(Aggregation::Drop)
            .build()
            .unwrap();
        let test_context = TestContext::with_builder(
            SdkMeterProvider::builder().with_view(view),
            TemporalityPreference::Cumulative,
        );

        test_context
            .meter
            .u64_counter("debug.allocations")
            .build()
            .add(1, &[]);
        test_context.meter.u64_counter("requests").build().add(1, &[]);

        let metrics = test_context.collect();
        let names: Vec<_> = metrics.scope_metrics[0]
            .metrics
            .iter()
            .map(|metric| metric.name.clone())
            .collect();
        assert_eq!(names, vec!["requests"]);
    }

    #[test]
    fn exemplars_follow_the_filter() {
        let clock = TestClock::new(42);
        let always_on = TestContext::with_builder(
            SdkMeterProvider::builder()
                .with_clock(clock)
                .with_exemplar_filter(ExemplarFilter::AlwaysOn),
            TemporalityPreference::Cumulative,
        );
        always_on.meter.f64_counter("latency").build().add(1.5, &[]);
        let metric = always_on.metric("latency").unwrap();
        let exemplars = &metric.data.data_points()[0].exemplars;
        assert_eq!(exemplars.len(), 1);
        assert_eq!(exemplars[0].value, 1.5);
        assert_eq!(exemplars[0].time_unix_nano, 42);

        let trace_based = TestContext::new(TemporalityPreference::Cumulative);
        trace_based.meter.f64_counter("latency").build().add(1.5, &[]);
        let metric = trace_based.metric("latency").unwrap();
        assert!(metric.data.data_points()[0].exemplars.is_empty());
    }

    #[test]
    fn resource_is_attached_to_every_collection() {
        let resource = crate::Resource::builder_empty()
            .with_service_name("checkout")
            .build();
        let test_context = TestContext::with_builder(
            SdkMeterProvider::builder().with_resource(resource.clone()),
            TemporalityPreference::Cumulative,
        );
        test_context.meter.u64_counter("requests").build().add(1, &[]);

        assert_eq!(test_context.collect().resource, resource);
    }

    #[test]
    fn scope_metadata_is_reported() {
        let test_context = TestContext::new(TemporalityPreference::Cumulative);
        let meter = test_context
            .meter_provider
            .meter_builder("versioned")
            .with_version("1.2.3")
            .with_schema_url("https://opentelemetry.io/schemas/1.21.0")
            .build();
        meter.u64_counter("requests").build().add(1, &[]);

        let metrics = test_context.collect();
        let scope = &metrics.scope_metrics[0].scope;
        assert_eq!(scope.name(), "versioned");
        assert_eq!(scope.version(), Some("1.2.3"));
        assert_eq!(
            scope.schema_url(),
            Some("https://opentelemetry.io/schemas/1.21.0")
        );
    }
}
