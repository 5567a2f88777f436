use std::{
    borrow::Cow,
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{Key, KeyValue};

use super::{
    attribute_set::AttributeSet,
    data::{self, DataPoint, Exemplar, Metric, MetricData, MetricValue},
    instrument::InstrumentKind,
    registered_reader::RegisteredReader,
    shared_state::MeterProviderSharedState,
    Temporality,
};

/// Number of distinct attribute sets a stream tracks when no view sets a
/// limit.
pub(crate) const DEFAULT_CARDINALITY_LIMIT: usize = 2000;

const STREAM_OVERFLOW_KEY: &str = "otel.metric.overflow";

/// The identity and shape of one metric stream.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StreamDescriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    pub(crate) kind: InstrumentKind,
    pub(crate) allowed_attribute_keys: Option<Arc<HashSet<Key>>>,
    pub(crate) cardinality_limit: usize,
}

impl StreamDescriptor {
    /// Whether both describe the same stream. Names compare case-insensitively.
    pub(crate) fn is_same_stream(&self, other: &StreamDescriptor) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.description == other.description
            && self.unit == other.unit
            && self.kind == other.kind
            && self.allowed_attribute_keys == other.allowed_attribute_keys
            && self.cardinality_limit == other.cardinality_limit
    }
}

#[derive(Clone, Debug)]
struct Accumulation {
    value: MetricValue,
    updates: u64,
    // Distinguishes a series from an earlier, evicted one with the same
    // attributes.
    generation: u64,
    // Readers that reported the current `updates`.
    acks: usize,
    exemplar: Option<Exemplar>,
}

#[derive(Clone, Copy, Debug)]
struct Reported {
    value: MetricValue,
    updates: u64,
    generation: u64,
}

/// The running accumulations of a stream, keyed by attribute set.
#[derive(Debug, Default)]
struct Series {
    accumulations: HashMap<AttributeSet, Accumulation>,
    // Attribute sets counting towards the cardinality limit.
    tracked: usize,
    next_generation: u64,
    overflow_logged: bool,
}

impl Series {
    fn accumulation(
        &mut self,
        attributes: AttributeSet,
        storage: &MetricStorage,
        zero: MetricValue,
    ) -> &mut Accumulation {
        let limit = storage.descriptor.cardinality_limit;
        let counted = storage.counts_towards_limit(&attributes);
        let key = if counted && !self.accumulations.contains_key(&attributes) {
            if self.tracked < limit {
                self.tracked += 1;
                attributes
            } else {
                if !self.overflow_logged {
                    self.overflow_logged = true;
                    otel_warn!(
                        name: "MetricStorage.CardinalityLimitReached",
                        stream_name = storage.descriptor.name.as_ref(),
                        cardinality_limit = limit,
                        message = "Measurements for new attribute sets are reported under the overflow attribute set."
                    );
                }
                storage.overflow_attributes.clone()
            }
        } else {
            attributes
        };

        let generation = self.next_generation;
        let accumulation = self.accumulations.entry(key).or_insert_with(|| Accumulation {
            value: zero,
            updates: 0,
            generation,
            acks: 0,
            exemplar: None,
        });
        if accumulation.generation == generation {
            self.next_generation += 1;
        }
        accumulation
    }

    fn evict(&mut self, attributes: &AttributeSet, storage: &MetricStorage) {
        if self.accumulations.remove(attributes).is_some()
            && storage.counts_towards_limit(attributes)
        {
            self.tracked -= 1;
        }
    }
}

/// Aggregated state of one metric stream.
///
/// The stream keeps a single running accumulation per attribute set, shared by
/// all readers. Each reader additionally owns a slot remembering what it last
/// reported, which is all that is needed to compute deltas for that reader
/// without touching the state of any other reader.
///
/// When every reader of the stream reports deltas, an attribute set is
/// dropped once all readers reported its latest value, so idle series do not
/// accumulate.
pub(crate) struct MetricStorage {
    descriptor: StreamDescriptor,
    shared_state: Arc<MeterProviderSharedState>,
    current: Mutex<Series>,
    reader_slots: Vec<Mutex<HashMap<AttributeSet, Reported>>>,
    overflow_attributes: AttributeSet,
    evict_reported: bool,
}

impl MetricStorage {
    pub(crate) fn new(
        descriptor: StreamDescriptor,
        shared_state: Arc<MeterProviderSharedState>,
        readers: &[Arc<RegisteredReader>],
    ) -> Self {
        let evict_reported = !readers.is_empty()
            && readers
                .iter()
                .all(|r| r.reader().temporality(descriptor.kind) == Temporality::Delta);
        let overflow = [KeyValue::new(STREAM_OVERFLOW_KEY, true)];
        MetricStorage {
            descriptor,
            shared_state,
            current: Mutex::new(Series::default()),
            reader_slots: readers
                .iter()
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
            overflow_attributes: AttributeSet::from(&overflow[..]),
            evict_reported,
        }
    }

    pub(crate) fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    // The empty set and the overflow set are always accepted.
    fn counts_towards_limit(&self, attributes: &AttributeSet) -> bool {
        !attributes.is_empty() && *attributes != self.overflow_attributes
    }

    pub(crate) fn record(&self, value: MetricValue, attributes: &[KeyValue]) {
        let kind = self.descriptor.kind;
        if kind.is_monotonic() && value.is_negative() {
            otel_warn!(
                name: "Counter.NegativeValue",
                instrument_name = self.descriptor.name.as_ref(),
                message = "Counters only accept non-negative increments, the measurement is ignored."
            );
            return;
        }

        let attributes = AttributeSet::from(attributes);
        let attributes = match &self.descriptor.allowed_attribute_keys {
            Some(keys) => attributes.filtered(keys),
            None => attributes,
        };
        let exemplar = if self.shared_state.exemplar_filter().should_sample() {
            Some(Exemplar {
                time_unix_nano: self.shared_state.clock().now(),
                value,
            })
        } else {
            None
        };

        let Ok(mut series) = self.current.lock() else {
            return;
        };
        let accumulation = series.accumulation(attributes, self, value.zero());
        if kind.is_precomputed() {
            accumulation.value = value;
        } else {
            accumulation.value = accumulation.value + value;
        }
        accumulation.updates += 1;
        accumulation.acks = 0;
        if exemplar.is_some() {
            accumulation.exemplar = exemplar;
        }
    }

    /// Builds the data reported to `reader` for a collection that started at
    /// `collect_time`. Returns `None` when there is nothing to report.
    pub(crate) fn collect(&self, reader: &RegisteredReader, collect_time: u64) -> Option<Metric> {
        let kind = self.descriptor.kind;
        let temporality = reader.reader().temporality(kind);
        let data_points = match temporality {
            Temporality::Delta => self.delta_points(reader, collect_time)?,
            Temporality::Cumulative => self.cumulative_points(collect_time)?,
        };
        if data_points.is_empty() {
            return None;
        }

        let data = if kind.is_sum() {
            MetricData::Sum(data::Sum {
                data_points,
                temporality,
                is_monotonic: kind.is_monotonic(),
            })
        } else {
            MetricData::Gauge(data::Gauge { data_points })
        };
        Some(Metric {
            name: self.descriptor.name.clone(),
            description: self.descriptor.description.clone(),
            unit: self.descriptor.unit.clone(),
            data,
        })
    }

    fn cumulative_points(&self, collect_time: u64) -> Option<Vec<DataPoint>> {
        let start = self.shared_state.start_epoch_nanos();
        let series = self.current.lock().ok()?;
        Some(
            series
                .accumulations
                .iter()
                .map(|(attrs, acc)| DataPoint {
                    attributes: attrs.to_vec(),
                    start_time_unix_nano: start,
                    time_unix_nano: collect_time,
                    value: acc.value,
                    exemplars: acc.exemplar.iter().cloned().collect(),
                })
                .collect(),
        )
    }

    // Only attribute sets updated since this reader's previous collection are
    // reported, starting at that collection. The reader's slot stays locked
    // for the whole collection, so overlapping collections through the same
    // reader apply to it one after the other.
    fn delta_points(&self, reader: &RegisteredReader, collect_time: u64) -> Option<Vec<DataPoint>> {
        let mut reported = self.reader_slots.get(reader.id())?.lock().ok()?;
        let mut series = self.current.lock().ok()?;
        let start = reader.last_collect_epoch_nanos();
        let kind = self.descriptor.kind;
        let is_sum = kind.is_sum();
        // Observable sums carry totals, so their last report has to be kept
        // for as long as they are observed.
        let reports_totals = is_sum && kind.is_precomputed();
        let readers = self.reader_slots.len();

        let mut points = Vec::new();
        let mut evicted = Vec::new();
        for (attrs, acc) in series.accumulations.iter_mut() {
            let previous = reported
                .get(attrs)
                .filter(|p| p.generation == acc.generation)
                .copied();
            if previous.is_some_and(|p| p.updates == acc.updates) {
                if self.evict_reported && reports_totals && acc.acks == readers {
                    evicted.push(attrs.clone());
                }
                continue;
            }

            let value = match previous {
                Some(p) if is_sum => acc.value - p.value,
                _ => acc.value,
            };
            points.push(DataPoint {
                attributes: attrs.to_vec(),
                start_time_unix_nano: start,
                time_unix_nano: collect_time,
                value,
                exemplars: acc.exemplar.iter().cloned().collect(),
            });
            reported.insert(
                attrs.clone(),
                Reported {
                    value: acc.value,
                    updates: acc.updates,
                    generation: acc.generation,
                },
            );
            acc.acks += 1;
            if self.evict_reported && !reports_totals && acc.acks == readers {
                evicted.push(attrs.clone());
            }
        }

        for attrs in &evicted {
            series.evict(attrs, self);
        }
        reported.retain(|attrs, p| {
            series
                .accumulations
                .get(attrs)
                .is_some_and(|acc| acc.generation == p.generation)
        });
        Some(points)
    }

    /// Drops all recorded state, for every reader.
    pub(crate) fn reset(&self) {
        {
            let mut series = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            series.accumulations.clear();
            series.tracked = 0;
            series.overflow_logged = false;
        }
        for slot in &self.reader_slots {
            slot.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    #[cfg(test)]
    fn tracked_series(&self) -> (usize, Vec<usize>) {
        let series = self.current.lock().unwrap();
        let slots = self
            .reader_slots
            .iter()
            .map(|slot| slot.lock().unwrap().len())
            .collect();
        (series.accumulations.len(), slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{
        exemplar::ExemplarFilter, view::ViewRegistry, MetricReader, TemporalityPreference,
    };
    use crate::testing::{TestClock, TestMetricReader};
    use crate::Resource;
    use std::thread;

    fn descriptor(kind: InstrumentKind, cardinality_limit: usize) -> StreamDescriptor {
        StreamDescriptor {
            name: "requests".into(),
            description: "".into(),
            unit: "".into(),
            kind,
            allowed_attribute_keys: None,
            cardinality_limit,
        }
    }

    fn storage_with(
        kind: InstrumentKind,
        cardinality_limit: usize,
        temporalities: &[TemporalityPreference],
    ) -> (MetricStorage, Vec<Arc<RegisteredReader>>) {
        let shared_state = Arc::new(MeterProviderSharedState::new(
            Arc::new(TestClock::new(1_000)),
            Resource::empty(),
            ViewRegistry::default(),
            ExemplarFilter::AlwaysOff,
        ));
        let readers: Vec<Arc<RegisteredReader>> = temporalities
            .iter()
            .enumerate()
            .map(|(id, temporality)| {
                let reader: Box<dyn MetricReader> =
                    Box::new(TestMetricReader::with_temporality(*temporality));
                Arc::new(RegisteredReader::new(id, reader))
            })
            .collect();
        let storage =
            MetricStorage::new(descriptor(kind, cardinality_limit), shared_state, &readers);
        (storage, readers)
    }

    fn points(storage: &MetricStorage, reader: &RegisteredReader) -> Vec<DataPoint> {
        storage
            .collect(reader, 2_000)
            .map(|metric| metric.data.data_points().to_vec())
            .unwrap_or_default()
    }

    fn route(value: &'static str) -> [KeyValue; 1] {
        [KeyValue::new("route", value)]
    }

    #[test]
    fn overlapping_delta_collections_report_each_increment_once() {
        let (storage, readers) = storage_with(
            InstrumentKind::Counter,
            DEFAULT_CARDINALITY_LIMIT,
            &[TemporalityPreference::Delta],
        );
        let storage = Arc::new(storage);
        let reader = Arc::clone(&readers[0]);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let storage = Arc::clone(&storage);
                let reader = Arc::clone(&reader);
                thread::spawn(move || {
                    let mut reported = 0;
                    for _ in 0..500 {
                        storage.record(MetricValue::U64(1), &[]);
                        for dp in points(&storage, &reader) {
                            match dp.value {
                                MetricValue::U64(v) => reported += v,
                                other => panic!("unexpected value {other:?}"),
                            }
                        }
                    }
                    reported
                })
            })
            .collect();
        let mut total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        for dp in points(&storage, &reader) {
            total += dp.value.as_f64() as u64;
        }

        assert_eq!(total, 2_000);
    }

    #[test]
    fn delta_only_streams_drop_reported_series() {
        let (storage, readers) = storage_with(
            InstrumentKind::Counter,
            DEFAULT_CARDINALITY_LIMIT,
            &[TemporalityPreference::Delta, TemporalityPreference::Delta],
        );
        for i in 0..100 {
            storage.record(MetricValue::U64(1), &[KeyValue::new("id", i as i64)]);
        }

        assert_eq!(points(&storage, &readers[0]).len(), 100);
        // the second reader has not reported yet
        assert_eq!(storage.tracked_series().0, 100);

        assert_eq!(points(&storage, &readers[1]).len(), 100);
        assert_eq!(storage.tracked_series().0, 0);

        // a series coming back starts over for both readers
        storage.record(MetricValue::U64(4), &[KeyValue::new("id", 7_i64)]);
        for reader in &readers {
            let points = points(&storage, reader);
            assert_eq!(points.len(), 1);
            assert_eq!(points[0].value, MetricValue::U64(4));
        }
        // the first reader drops its stale report on its next collection
        assert_eq!(storage.tracked_series(), (0, vec![1, 0]));
        assert!(points(&storage, &readers[0]).is_empty());
        assert_eq!(storage.tracked_series(), (0, vec![0, 0]));
    }

    #[test]
    fn cumulative_readers_keep_series() {
        let (storage, readers) = storage_with(
            InstrumentKind::Counter,
            DEFAULT_CARDINALITY_LIMIT,
            &[TemporalityPreference::Delta, TemporalityPreference::Cumulative],
        );
        storage.record(MetricValue::U64(3), &route("/"));
        assert_eq!(points(&storage, &readers[0]).len(), 1);
        assert_eq!(points(&storage, &readers[1]).len(), 1);

        assert!(points(&storage, &readers[0]).is_empty());
        let cumulative = points(&storage, &readers[1]);
        assert_eq!(cumulative[0].value, MetricValue::U64(3));
    }

    #[test]
    fn observable_totals_are_kept_while_observed() {
        let (storage, readers) = storage_with(
            InstrumentKind::ObservableCounter,
            DEFAULT_CARDINALITY_LIMIT,
            &[TemporalityPreference::Delta],
        );
        let reader = &readers[0];

        storage.record(MetricValue::U64(100), &route("/"));
        assert_eq!(points(&storage, reader)[0].value, MetricValue::U64(100));
        storage.record(MetricValue::U64(105), &route("/"));
        assert_eq!(points(&storage, reader)[0].value, MetricValue::U64(5));

        // not observed during the last cycle
        assert!(points(&storage, reader).is_empty());
        assert_eq!(storage.tracked_series(), (0, vec![0]));
    }

    #[test]
    fn attribute_sets_beyond_the_limit_overflow() {
        let (storage, readers) = storage_with(
            InstrumentKind::Counter,
            3,
            &[TemporalityPreference::Cumulative],
        );
        for i in 0..3 {
            storage.record(MetricValue::U64(10), &[KeyValue::new("id", i as i64)]);
        }
        storage.record(MetricValue::U64(1), &[]);
        storage.record(MetricValue::U64(5), &[KeyValue::new("id", 3_i64)]);
        storage.record(MetricValue::U64(5), &[KeyValue::new("id", 4_i64)]);
        // known sets keep recording into their own series
        storage.record(MetricValue::U64(10), &[KeyValue::new("id", 0_i64)]);

        let points = points(&storage, &readers[0]);
        assert_eq!(points.len(), 5);
        let overflow = points
            .iter()
            .find(|dp| dp.attributes == vec![KeyValue::new(STREAM_OVERFLOW_KEY, true)])
            .expect("overflow point expected");
        assert_eq!(overflow.value, MetricValue::U64(10));
        let first = points
            .iter()
            .find(|dp| dp.attributes == vec![KeyValue::new("id", 0_i64)])
            .unwrap();
        assert_eq!(first.value, MetricValue::U64(20));
    }

    #[test]
    fn evicted_series_free_room_under_the_limit() {
        let (storage, readers) =
            storage_with(InstrumentKind::Counter, 2, &[TemporalityPreference::Delta]);
        storage.record(MetricValue::U64(1), &route("/a"));
        storage.record(MetricValue::U64(1), &route("/b"));
        assert_eq!(points(&storage, &readers[0]).len(), 2);

        storage.record(MetricValue::U64(1), &route("/c"));
        let points = points(&storage, &readers[0]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].attributes, route("/c").to_vec());
    }

    #[test]
    fn integer_sums_are_exact() {
        let (storage, readers) = storage_with(
            InstrumentKind::Counter,
            DEFAULT_CARDINALITY_LIMIT,
            &[TemporalityPreference::Cumulative],
        );
        storage.record(MetricValue::U64(u64::MAX - 10), &[]);
        storage.record(MetricValue::U64(3), &[]);
        assert_eq!(
            points(&storage, &readers[0])[0].value,
            MetricValue::U64(u64::MAX - 7)
        );
    }
}
