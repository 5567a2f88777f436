use core::fmt;
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use crate::{
    registry::ComponentRegistry, Clock, InstrumentationScope, KeyValue, Resource, ResultCode,
    SystemClock,
};

use super::{
    data::ResourceMetrics,
    exemplar::ExemplarFilter,
    exporter::PushMetricExporter,
    meter::{Meter, SdkMeter},
    noop::NoopMeter,
    reader::{MetricProducer, MetricReader},
    registered_reader::RegisteredReader,
    shared_state::MeterProviderSharedState,
    view::{View, ViewRegistry},
    MetricError, MetricResult, PeriodicReader,
};

/// Name used for meters requested without a name.
pub(crate) const DEFAULT_METER_NAME: &str = "unknown";

/// Upper bound [SdkMeterProvider::close] waits for shutdown to complete.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `MeterProvider` will be associated with the same
/// [Resource], have the same [View]s applied to them, and have their produced
/// metric telemetry passed to the configured [MetricReader]s. This is a
/// clonable handle to the MeterProvider implementation itself, and cloning it
/// will create a new reference, not a new instance of a MeterProvider. Dropping
/// the last reference to it will trigger shutdown of the provider. Shutdown can
/// also be triggered manually by calling the `shutdown` method.
///
/// Every reader is handed its own [MetricProducer] when the provider is built.
/// Readers collect independently of each other: a collection only advances the
/// state the provider keeps for the collecting reader.
#[derive(Clone)]
pub struct SdkMeterProvider {
    inner: Arc<SdkMeterProviderInner>,
}

struct SdkMeterProviderInner {
    shared_state: Arc<MeterProviderSharedState>,
    registered_readers: Arc<[Arc<RegisteredReader>]>,
    registry: Arc<ComponentRegistry<SdkMeter>>,
    is_shutdown: AtomicBool,
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Creates a [MeterBuilder] for the instrumentation scope `name`.
    ///
    /// An empty name is replaced with `"unknown"`.
    pub fn meter_builder(&self, name: impl Into<Cow<'static, str>>) -> MeterBuilder<'_> {
        let mut name = name.into();
        if name.is_empty() {
            otel_debug!(
                name: "MeterProvider.MeterNameEmpty",
                message = "Meter requested without a name, using the default name.",
                default_name = DEFAULT_METER_NAME
            );
            name = Cow::Borrowed(DEFAULT_METER_NAME);
        }
        MeterBuilder {
            provider: self,
            scope: InstrumentationScope::builder(name),
        }
    }

    /// Returns the [Meter] for the instrumentation scope `name`.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_builder(name).build()
    }

    /// Returns the [Meter] for `scope`.
    ///
    /// Meters are cached per scope name, version and schema URL, so requesting
    /// the same scope twice yields meters sharing their instruments.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if self.inner.registered_readers.is_empty() {
            return Meter::new(Arc::new(NoopMeter::new()));
        }
        if self.inner.is_shutdown.load(Ordering::Acquire) {
            otel_debug!(
                name: "MeterProvider.NoOpMeterReturned",
                meter_name = scope.name(),
            );
            return Meter::new(Arc::new(NoopMeter::new()));
        }

        let scope = if scope.name().is_empty() {
            otel_debug!(
                name: "MeterProvider.MeterNameEmpty",
                message = "Meter requested without a name, using the default name.",
                default_name = DEFAULT_METER_NAME
            );
            scope.with_name(DEFAULT_METER_NAME)
        } else {
            scope
        };
        Meter::new(self.inner.registry.get(&scope))
    }

    /// Flushes all pending telemetry of every reader.
    ///
    /// Readers are asked to flush without waiting on each other. The returned
    /// code succeeds once every reader flushed, and fails as soon as any of
    /// them fails.
    pub fn force_flush(&self) -> ResultCode {
        let readers = &self.inner.registered_readers;
        if readers.is_empty() {
            return ResultCode::of_success();
        }
        ResultCode::of_all(readers.iter().map(|r| r.reader().force_flush()))
    }

    /// Shuts down the meter provider flushing all pending telemetry and releasing
    /// any held computational resources.
    ///
    /// This call is idempotent. The first call shuts down every reader and
    /// returns a code tracking all of them; one reader failing does not stop
    /// the others from being shut down. Later calls, including concurrent
    /// ones, return a code that has already succeeded and leave the readers
    /// alone.
    ///
    /// Meters handed out after this call do nothing.
    pub fn shutdown(&self) -> ResultCode {
        otel_debug!(
            name: "MeterProvider.Shutdown",
            message = "User initiated shutdown of MeterProvider."
        );
        self.inner.shutdown()
    }

    /// Shuts the provider down and blocks until shutdown completes or
    /// [CLOSE_TIMEOUT] elapses.
    ///
    /// Timing out is not an error; the returned code still reports the
    /// eventual outcome of the shutdown.
    pub fn close(&self) -> ResultCode {
        let code = self.shutdown();
        code.join(CLOSE_TIMEOUT);
        code
    }

    /// Clears the recorded state of every instrument of every meter.
    #[cfg(any(test, feature = "testing"))]
    #[doc(hidden)]
    pub fn reset_for_test(&self) {
        for meter in self.inner.registry.get_components() {
            meter.reset();
        }
    }
}

impl SdkMeterProviderInner {
    fn shutdown(&self) -> ResultCode {
        if self
            .is_shutdown
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            otel_info!(
                name: "MeterProvider.AlreadyShutdown",
                message = "Shutdown was already invoked, ignoring the repeated call."
            );
            return ResultCode::of_success();
        }

        if self.registered_readers.is_empty() {
            return ResultCode::of_success();
        }
        ResultCode::of_all(
            self.registered_readers
                .iter()
                .map(|r| r.reader().shutdown()),
        )
    }
}

impl Drop for SdkMeterProviderInner {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.is_shutdown.load(Ordering::Acquire) {
            otel_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
            return;
        }
        otel_debug!(
            name: "MeterProvider.Drop",
            message = "Last reference of MeterProvider dropped, initiating shutdown."
        );
        let code = self.shutdown();
        if let Some(Err(err)) = code.join(CLOSE_TIMEOUT).result() {
            otel_error!(
                name: "MeterProvider.Drop.ShutdownFailed",
                message = "Shutdown attempt failed during drop of MeterProvider.",
                reason = format!("{}", err)
            );
        }
    }
}

impl fmt::Debug for SdkMeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared_state = &self.inner.shared_state;
        f.debug_struct("SdkMeterProvider")
            .field("clock", &shared_state.clock())
            .field("resource", shared_state.resource())
            .field("readers", &self.inner.registered_readers)
            .field("views", &shared_state.view_registry().len())
            .field("exemplar_filter", &shared_state.exemplar_filter())
            .finish()
    }
}

/// The producer handed to one reader.
///
/// It holds the provider's registry and the reader's binding weakly, so a
/// reader keeping its producer does not keep the provider alive.
struct LeasedMetricProducer {
    registry: Weak<ComponentRegistry<SdkMeter>>,
    shared_state: Arc<MeterProviderSharedState>,
    reader: Weak<RegisteredReader>,
}

impl MetricProducer for LeasedMetricProducer {
    fn produce(&self) -> MetricResult<ResourceMetrics> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| MetricError::Other("meter provider is dropped".into()))?;
        let reader = self
            .reader
            .upgrade()
            .ok_or_else(|| MetricError::Other("reader is no longer registered".into()))?;

        let collect_time = self.shared_state.clock().now();
        let scope_metrics = registry
            .get_components()
            .iter()
            .filter_map(|meter| meter.collect(&reader, collect_time))
            .collect();
        reader.set_last_collect_epoch_nanos(collect_time);

        Ok(ResourceMetrics {
            resource: self.shared_state.resource().clone(),
            scope_metrics,
        })
    }
}

impl fmt::Debug for LeasedMetricProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeasedMetricProducer")
            .field(
                "reader",
                &self.reader.upgrade().map(|reader| reader.id()),
            )
            .finish()
    }
}

/// Configuration of the [Meter] for one instrumentation scope.
#[derive(Debug)]
pub struct MeterBuilder<'a> {
    provider: &'a SdkMeterProvider,
    scope: crate::InstrumentationScopeBuilder,
}

impl MeterBuilder<'_> {
    /// Set the version of the instrumentation scope.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.scope = self.scope.with_version(version);
        self
    }

    /// Set the schema URL of the instrumentation scope.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        self.scope = self.scope.with_schema_url(schema_url);
        self
    }

    /// Set the attributes of the instrumentation scope.
    ///
    /// Attributes do not take part in the identity of the scope.
    pub fn with_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.scope = self.scope.with_attributes(attributes);
        self
    }

    /// Returns the [Meter] for the configured scope.
    pub fn build(self) -> Meter {
        self.provider.meter_with_scope(self.scope.build())
    }
}

/// Configuration options for a [SdkMeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    clock: Option<Arc<dyn Clock>>,
    readers: Vec<Box<dyn MetricReader>>,
    views: Vec<View>,
    exemplar_filter: ExemplarFilter,
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [SdkMeterProvider].
    ///
    /// This [Resource] represents the entity producing telemetry and is associated
    /// with all [Meter]s the [SdkMeterProvider] will create.
    ///
    /// By default, if this option is not used, the default [Resource] will be used.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Sets the [Clock] used to stamp collections. Defaults to [SystemClock].
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Associates a [MetricReader] with a [SdkMeterProvider].
    /// [`MeterProviderBuilder::with_periodic_exporter()`] can be used to add a
    /// PeriodicReader which is the most common use case.
    ///
    /// A [SdkMeterProvider] will export no metrics without [MetricReader]
    /// added.
    pub fn with_reader<T: MetricReader>(mut self, reader: T) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Adds a [`PushMetricExporter`] to the [`SdkMeterProvider`] and configures it
    /// to export metrics at **fixed** intervals (60 seconds) using a
    /// [`PeriodicReader`].
    ///
    /// To customize the export interval, set the
    /// **"OTEL_METRIC_EXPORT_INTERVAL"** environment variable (in
    /// milliseconds).
    pub fn with_periodic_exporter<T>(mut self, exporter: T) -> Self
    where
        T: PushMetricExporter,
    {
        let reader = PeriodicReader::builder(exporter).build();
        self.readers.push(Box::new(reader));
        self
    }

    /// Associates a [View] with a [SdkMeterProvider].
    ///
    /// [View]s are appended to existing ones in a [SdkMeterProvider] if this option is
    /// used multiple times.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Sets which measurements are offered as exemplars.
    ///
    /// Defaults to [ExemplarFilter::TraceBased].
    pub fn with_exemplar_filter(mut self, filter: ExemplarFilter) -> Self {
        self.exemplar_filter = filter;
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    pub fn build(self) -> SdkMeterProvider {
        otel_debug!(
            name: "MeterProvider.Building",
            builder = format!("{:?}", &self),
        );

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let shared_state = Arc::new(MeterProviderSharedState::new(
            clock,
            self.resource.unwrap_or_default(),
            ViewRegistry::new(self.views),
            self.exemplar_filter,
        ));
        let registered_readers: Arc<[Arc<RegisteredReader>]> = self
            .readers
            .into_iter()
            .enumerate()
            .map(|(id, reader)| Arc::new(RegisteredReader::new(id, reader)))
            .collect();

        let registry = {
            let shared_state = Arc::clone(&shared_state);
            let readers = Arc::clone(&registered_readers);
            Arc::new(ComponentRegistry::new(move |scope: &InstrumentationScope| {
                otel_debug!(name: "MeterProvider.NewMeterCreated", meter_name = scope.name());
                SdkMeter::new(
                    scope.clone(),
                    Arc::clone(&shared_state),
                    Arc::clone(&readers),
                )
            }))
        };

        let start = shared_state.start_epoch_nanos();
        for registered in registered_readers.iter() {
            registered.set_last_collect_epoch_nanos(start);
            registered
                .reader()
                .register_producer(Box::new(LeasedMetricProducer {
                    registry: Arc::downgrade(&registry),
                    shared_state: Arc::clone(&shared_state),
                    reader: Arc::downgrade(registered),
                }));
        }

        otel_debug!(
            name: "MeterProvider.Built",
            readers = registered_readers.len()
        );
        SdkMeterProvider {
            inner: Arc::new(SdkMeterProviderInner {
                shared_state,
                registered_readers,
                registry,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("clock", &self.clock)
            .field("readers", &self.readers)
            .field("views", &self.views.len())
            .field("exemplar_filter", &self.exemplar_filter)
            .finish()
    }
}
