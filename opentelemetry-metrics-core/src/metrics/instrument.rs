use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc};

use crate::{InstrumentationScope, KeyValue};

use super::{
    data::MetricValue, meter::Meter, noop::NoopSyncInstrument, storage::MetricStorage,
};

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// a group of instruments that record current value synchronously with
    /// the code path they are measuring.
    Gauge,
    /// A group of instruments that record increasing values in an asynchronous
    /// callback.
    ObservableCounter,
    /// A group of instruments that record increasing and decreasing values in an
    /// asynchronous callback.
    ObservableUpDownCounter,
    /// a group of instruments that record current values in an asynchronous callback.
    ObservableGauge,
}

impl InstrumentKind {
    /// Whether instruments of this kind aggregate into a sum.
    pub(crate) fn is_sum(&self) -> bool {
        !matches!(self, InstrumentKind::Gauge | InstrumentKind::ObservableGauge)
    }

    /// Whether the sum of instruments of this kind only ever increases.
    pub(crate) fn is_monotonic(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::ObservableCounter
        )
    }

    /// Whether a measurement replaces the current value instead of adding to it.
    ///
    /// Observable sums report the total directly, so they also replace.
    pub(crate) fn is_precomputed(&self) -> bool {
        !matches!(self, InstrumentKind::Counter | InstrumentKind::UpDownCounter)
    }
}

/// Describes the properties of an instrument at creation, used for selecting
/// instruments in views.
#[derive(Clone, Debug, PartialEq)]
pub struct Instrument {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) scope: InstrumentationScope,
}

impl Instrument {
    /// Instrument name.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Instrument description.
    pub fn description(&self) -> &str {
        self.description.as_ref()
    }

    /// Instrument kind.
    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// Instrument unit.
    pub fn unit(&self) -> &str {
        self.unit.as_ref()
    }

    /// Instrument scope.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }
}

/// Numeric types instruments can record.
pub(crate) trait Number: Copy + Send + Sync + 'static + Into<MetricValue> {}

impl Number for u64 {}

impl Number for i64 {}

impl Number for f64 {}

/// Records synchronous measurements.
pub(crate) trait SyncInstrument<T>: Send + Sync {
    fn measure(&self, value: T, attributes: &[KeyValue]);
}

/// An instrument handed to observable callbacks to report values.
pub trait AsyncInstrument<T>: Send + Sync {
    /// Observes the state of the instrument.
    ///
    /// It is only valid to call this within a callback.
    fn observe(&self, value: T, attributes: &[KeyValue]);
}

/// The storages one instrument records into, one per matching view.
#[derive(Clone)]
pub(crate) struct ResolvedMeasures {
    storages: Vec<Arc<MetricStorage>>,
}

impl ResolvedMeasures {
    pub(crate) fn new(storages: Vec<Arc<MetricStorage>>) -> Self {
        ResolvedMeasures { storages }
    }
}

impl<T: Number> SyncInstrument<T> for ResolvedMeasures {
    fn measure(&self, value: T, attributes: &[KeyValue]) {
        let value: MetricValue = value.into();
        for storage in &self.storages {
            storage.record(value, attributes);
        }
    }
}

impl<T: Number> AsyncInstrument<T> for ResolvedMeasures {
    fn observe(&self, value: T, attributes: &[KeyValue]) {
        let value: MetricValue = value.into();
        for storage in &self.storages {
            storage.record(value, attributes);
        }
    }
}

fn sync_instrument<T: Number>(
    measures: Option<ResolvedMeasures>,
) -> Arc<dyn SyncInstrument<T> + Send + Sync> {
    match measures {
        Some(measures) => Arc::new(measures),
        None => Arc::new(NoopSyncInstrument::new()),
    }
}

/// An instrument that records increasing values.
#[derive(Clone)]
pub struct Counter<T>(Arc<dyn SyncInstrument<T> + Send + Sync>);

impl<T> Counter<T> {
    /// Records an increment to the counter. Negative increments are ignored.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.0.measure(value, attributes)
    }
}

impl<T> fmt::Debug for Counter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Counter")
    }
}

/// An instrument that records increasing or decreasing values.
#[derive(Clone)]
pub struct UpDownCounter<T>(Arc<dyn SyncInstrument<T> + Send + Sync>);

impl<T> UpDownCounter<T> {
    /// Records an increment or decrement to the counter.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.0.measure(value, attributes)
    }
}

impl<T> fmt::Debug for UpDownCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpDownCounter")
    }
}

/// An instrument that records independent values.
#[derive(Clone)]
pub struct Gauge<T>(Arc<dyn SyncInstrument<T> + Send + Sync>);

impl<T> Gauge<T> {
    /// Records the current value.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        self.0.measure(value, attributes)
    }
}

impl<T> fmt::Debug for Gauge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Gauge")
    }
}

macro_rules! observable_handle {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        ///
        /// Values are reported by the callbacks registered on its builder.
        #[derive(Clone)]
        pub struct $name<T> {
            _marker: PhantomData<fn(T)>,
        }

        impl<T> $name<T> {
            fn new() -> Self {
                $name {
                    _marker: PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

observable_handle!(
    ObservableCounter,
    "An observable instrument reporting increasing totals."
);
observable_handle!(
    ObservableUpDownCounter,
    "An observable instrument reporting totals that can go up or down."
);
observable_handle!(
    ObservableGauge,
    "An observable instrument reporting the current value."
);

/// Configuration for a synchronous instrument.
pub struct InstrumentBuilder<'a, I> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    _marker: PhantomData<I>,
}

impl<'a, I> InstrumentBuilder<'a, I> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn resolve(self, kind: InstrumentKind) -> Option<ResolvedMeasures> {
        self.meter
            .provider()
            .resolve(kind, self.name, self.description, self.unit)
    }
}

impl<I> fmt::Debug for InstrumentBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .finish()
    }
}

macro_rules! build_sync_instrument {
    ($handle:ident, $kind:expr, $($num:ty),+) => {
        $(
            impl InstrumentBuilder<'_, $handle<$num>> {
                /// Creates the instrument, or a no-op one if the configuration is invalid.
                pub fn build(self) -> $handle<$num> {
                    $handle(sync_instrument(self.resolve($kind)))
                }
            }
        )+
    };
}

build_sync_instrument!(Counter, InstrumentKind::Counter, u64, f64);
build_sync_instrument!(UpDownCounter, InstrumentKind::UpDownCounter, i64, f64);
build_sync_instrument!(Gauge, InstrumentKind::Gauge, u64, i64, f64);

/// A function registered with an observable instrument, called on every
/// collection of its meter.
pub type Callback<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

/// Configuration for an observable instrument.
pub struct AsyncInstrumentBuilder<'a, I, M> {
    meter: &'a Meter,
    name: Cow<'static, str>,
    description: Option<Cow<'static, str>>,
    unit: Option<Cow<'static, str>>,
    callbacks: Vec<Callback<M>>,
    _marker: PhantomData<I>,
}

impl<'a, I, M> AsyncInstrumentBuilder<'a, I, M> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        AsyncInstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            callbacks: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the callback to be called for this instrument.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn AsyncInstrument<M>) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl<I, M: Number> AsyncInstrumentBuilder<'_, I, M> {
    fn register(self, kind: InstrumentKind) {
        let provider = self.meter.provider();
        let Some(measures) = provider.resolve(kind, self.name, self.description, self.unit)
        else {
            return;
        };
        if self.callbacks.is_empty() {
            return;
        }
        let callbacks = self.callbacks;
        provider.register_callback(Arc::new(move || {
            for callback in &callbacks {
                callback(&measures);
            }
        }));
    }
}

impl<I, M> fmt::Debug for AsyncInstrumentBuilder<'_, I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .field("callbacks_len", &self.callbacks.len())
            .finish()
    }
}

macro_rules! build_async_instrument {
    ($handle:ident, $kind:expr, $($num:ty),+) => {
        $(
            impl AsyncInstrumentBuilder<'_, $handle<$num>, $num> {
                /// Registers the instrument and its callbacks with the meter.
                pub fn build(self) -> $handle<$num> {
                    self.register($kind);
                    $handle::new()
                }
            }
        )+
    };
}

build_async_instrument!(ObservableCounter, InstrumentKind::ObservableCounter, u64, f64);
build_async_instrument!(
    ObservableUpDownCounter,
    InstrumentKind::ObservableUpDownCounter,
    i64,
    f64
);
build_async_instrument!(ObservableGauge, InstrumentKind::ObservableGauge, u64, i64, f64);
