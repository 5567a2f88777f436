use crate::metrics::InstrumentKind;

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,
}

/// The temporality an exporter asks for, resolved per instrument kind.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TemporalityPreference {
    /// Every instrument reports cumulative data.
    #[default]
    Cumulative,

    /// Counters and gauges report deltas. Up-down counters stay cumulative
    /// since a delta of a non-monotonic sum is rarely useful.
    Delta,

    /// Only synchronous counters report deltas, so their per-attribute state
    /// can be dropped after each collection.
    LowMemory,
}

impl TemporalityPreference {
    /// The temporality to use for instruments of `kind`.
    pub fn temporality(&self, kind: InstrumentKind) -> Temporality {
        match (self, kind) {
            (TemporalityPreference::Cumulative, _) => Temporality::Cumulative,
            (
                TemporalityPreference::Delta,
                InstrumentKind::UpDownCounter | InstrumentKind::ObservableUpDownCounter,
            ) => Temporality::Cumulative,
            (TemporalityPreference::Delta, _) => Temporality::Delta,
            (TemporalityPreference::LowMemory, InstrumentKind::Counter) => Temporality::Delta,
            (TemporalityPreference::LowMemory, _) => Temporality::Cumulative,
        }
    }
}
