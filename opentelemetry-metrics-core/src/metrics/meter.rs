use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use crate::InstrumentationScope;

use super::{
    data::{Metric, ScopeMetrics},
    instrument::{
        AsyncInstrumentBuilder, Counter, Gauge, Instrument, InstrumentBuilder, InstrumentKind,
        ObservableCounter, ObservableGauge, ObservableUpDownCounter, ResolvedMeasures,
        UpDownCounter,
    },
    registered_reader::RegisteredReader,
    shared_state::MeterProviderSharedState,
    storage::MetricStorage,
    MetricError, MetricResult,
};

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

type ObservableCallback = Arc<dyn Fn() + Send + Sync>;

/// The seam between the [Meter] handle and what backs it.
///
/// Every method defaults to producing nothing, which is what the no-op meter
/// relies on.
pub(crate) trait InstrumentProvider: Send + Sync {
    /// Resolves the storages an instrument records into, or `None` if its
    /// measurements are to be ignored.
    fn resolve(
        &self,
        _kind: InstrumentKind,
        _name: Cow<'static, str>,
        _description: Option<Cow<'static, str>>,
        _unit: Option<Cow<'static, str>>,
    ) -> Option<ResolvedMeasures> {
        None
    }

    /// Registers a callback run at the start of every collection.
    fn register_callback(&self, _callback: ObservableCallback) {}
}

/// Provides access to instrument instances for recording measurements.
///
/// A meter is obtained from a provider and is cheap to clone. All meters
/// obtained for the same instrumentation scope share their instruments.
///
/// ```
/// use opentelemetry_metrics_core::metrics::{ManualReader, SdkMeterProvider};
/// use opentelemetry_metrics_core::KeyValue;
///
/// let provider = SdkMeterProvider::builder()
///     .with_reader(ManualReader::builder().build())
///     .build();
/// let meter = provider.meter("my-library");
///
/// let queue_depth = meter.i64_up_down_counter("queue.depth").build();
/// queue_depth.add(3, &[KeyValue::new("queue", "jobs")]);
///
/// let _cpu = meter
///     .f64_observable_gauge("cpu.utilization")
///     .with_unit("1")
///     .with_callback(|observer| observer.observe(0.5, &[]))
///     .build();
/// ```
#[derive(Clone)]
pub struct Meter {
    provider: Arc<dyn InstrumentProvider>,
}

impl Meter {
    pub(crate) fn new(provider: Arc<dyn InstrumentProvider>) -> Self {
        Meter { provider }
    }

    pub(crate) fn provider(&self) -> &dyn InstrumentProvider {
        self.provider.as_ref()
    }

    /// creates an instrument builder for recording increasing values.
    pub fn u64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording increasing values.
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording changes of a value.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording changes of a value.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording independent values.
    pub fn u64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording independent values.
    pub fn i64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for recording independent values.
    pub fn f64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting increasing totals from a callback.
    pub fn u64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter<u64>, u64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting increasing totals from a callback.
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting totals from a callback.
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableUpDownCounter<i64>, i64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting totals from a callback.
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableUpDownCounter<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting current values from a callback.
    pub fn u64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<u64>, u64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting current values from a callback.
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<i64>, i64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// creates an instrument builder for reporting current values from a callback.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Meter")
    }
}

/// Handles the creation and coordination of all metric instruments.
///
/// A meter represents a single instrumentation scope; all metric telemetry
/// produced by an instrumentation scope will use metric instruments from a
/// single meter.
pub(crate) struct SdkMeter {
    scope: InstrumentationScope,
    shared_state: Arc<MeterProviderSharedState>,
    readers: Arc<[Arc<RegisteredReader>]>,
    storages: RwLock<HashMap<String, Arc<MetricStorage>>>,
    callbacks: RwLock<Vec<ObservableCallback>>,
}

impl SdkMeter {
    pub(crate) fn new(
        scope: InstrumentationScope,
        shared_state: Arc<MeterProviderSharedState>,
        readers: Arc<[Arc<RegisteredReader>]>,
    ) -> Self {
        SdkMeter {
            scope,
            shared_state,
            readers,
            storages: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Collects this meter's data on behalf of `reader`.
    ///
    /// Observable callbacks run first, so their observations are part of the
    /// collection. Returns `None` if no instrument has anything to report.
    pub(crate) fn collect(
        &self,
        reader: &RegisteredReader,
        collect_time: u64,
    ) -> Option<ScopeMetrics> {
        // Callbacks may create instruments, so none of the locks are held
        // while they run.
        let callbacks: Vec<ObservableCallback> = self
            .callbacks
            .read()
            .map(|callbacks| callbacks.clone())
            .unwrap_or_default();
        for callback in callbacks {
            callback();
        }

        let storages: Vec<Arc<MetricStorage>> = self
            .storages
            .read()
            .map(|storages| storages.values().cloned().collect())
            .unwrap_or_default();
        let mut metrics: Vec<Metric> = storages
            .iter()
            .filter_map(|storage| storage.collect(reader, collect_time))
            .collect();
        if metrics.is_empty() {
            return None;
        }
        metrics.sort_by(|a, b| a.name.cmp(&b.name));

        Some(ScopeMetrics {
            scope: self.scope.clone(),
            metrics,
        })
    }

    pub(crate) fn reset(&self) {
        if let Ok(storages) = self.storages.read() {
            for storage in storages.values() {
                storage.reset();
            }
        }
    }
}

impl InstrumentProvider for SdkMeter {
    fn resolve(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
    ) -> Option<ResolvedMeasures> {
        if let Err(err) = validate_instrument_config(name.as_ref(), unit.as_deref()) {
            otel_warn!(
                name: "InstrumentCreationFailed",
                meter_name = self.scope.name(),
                instrument_name = name.as_ref(),
                message = "Measurements from this instrument will be ignored.",
                reason = format!("{}", err)
            );
            return None;
        }

        let instrument = Instrument {
            name,
            description: description.unwrap_or_default(),
            kind,
            unit: unit.unwrap_or_default(),
            scope: self.scope.clone(),
        };
        let streams = self.shared_state.view_registry().find_streams(&instrument);

        let Ok(mut storages) = self.storages.write() else {
            return None;
        };
        let mut measures = Vec::with_capacity(streams.len());
        for stream in streams {
            // Instrument names are case-insensitive.
            let id = stream.name.to_ascii_lowercase();
            match storages.get(&id) {
                Some(existing) if existing.descriptor().is_same_stream(&stream) => {
                    measures.push(Arc::clone(existing));
                }
                Some(_) => {
                    otel_warn!(
                        name: "DuplicateMetricStreamDefinition",
                        meter_name = self.scope.name(),
                        instrument_name = instrument.name(),
                        stream_name = stream.name.as_ref(),
                        message = "A stream with this name but a different definition already exists, measurements for it will be ignored."
                    );
                }
                None => {
                    let storage = Arc::new(MetricStorage::new(
                        stream,
                        Arc::clone(&self.shared_state),
                        &self.readers,
                    ));
                    storages.insert(id, Arc::clone(&storage));
                    measures.push(storage);
                }
            }
        }

        if measures.is_empty() {
            None
        } else {
            Some(ResolvedMeasures::new(measures))
        }
    }

    fn register_callback(&self, callback: ObservableCallback) {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.push(callback);
        }
    }
}

impl fmt::Debug for SdkMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter").field("scope", &self.scope).finish()
    }
}

fn validate_instrument_config(name: &str, unit: Option<&str>) -> MetricResult<()> {
    validate_instrument_name(name).and_then(|_| validate_instrument_unit(unit))
}

pub(crate) fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

fn validate_instrument_unit(unit: Option<&str>) -> MetricResult<()> {
    if let Some(unit) = unit {
        if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
            return Err(MetricError::InvalidInstrumentConfiguration(
                INSTRUMENT_UNIT_LENGTH,
            ));
        }
        if unit.contains(|c: char| !c.is_ascii()) {
            return Err(MetricError::InvalidInstrumentConfiguration(
                INSTRUMENT_UNIT_INVALID_CHAR,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("validateName", None)]
    #[case("_startWithNoneAlphabet", Some(INSTRUMENT_NAME_FIRST_ALPHABETIC))]
    #[case("utf8char锈", Some(INSTRUMENT_NAME_INVALID_CHAR))]
    #[case("", Some(INSTRUMENT_NAME_EMPTY))]
    #[case("invalid name", Some(INSTRUMENT_NAME_INVALID_CHAR))]
    #[case("allow/slash", None)]
    #[case("allow_under_score", None)]
    #[case("allow.dots.ok", None)]
    fn instrument_name_validation(#[case] name: &str, #[case] expected: Option<&str>) {
        match expected {
            None => assert!(validate_instrument_name(name).is_ok()),
            Some(expected) => assert!(matches!(
                validate_instrument_name(name),
                Err(MetricError::InvalidInstrumentConfiguration(msg)) if msg == expected
            )),
        }
    }

    #[test]
    fn instrument_name_length_limit() {
        assert!(validate_instrument_name(&"a".repeat(255)).is_ok());
        assert!(matches!(
            validate_instrument_name(&"a".repeat(256)),
            Err(MetricError::InvalidInstrumentConfiguration(msg)) if msg == INSTRUMENT_NAME_LENGTH
        ));
    }

    #[rstest]
    #[case(
        "0123456789012345678901234567890123456789012345678901234567890123",
        Some(INSTRUMENT_UNIT_LENGTH)
    )]
    #[case("utf8char锈", Some(INSTRUMENT_UNIT_INVALID_CHAR))]
    #[case("kb", None)]
    #[case("Kb/sec", None)]
    #[case("%", None)]
    #[case("", None)]
    fn instrument_unit_validation(#[case] unit: &str, #[case] expected: Option<&str>) {
        match expected {
            None => assert!(validate_instrument_unit(Some(unit)).is_ok()),
            Some(expected) => assert!(matches!(
                validate_instrument_unit(Some(unit)),
                Err(MetricError::InvalidInstrumentConfiguration(msg)) if msg == expected
            )),
        }
    }
}
