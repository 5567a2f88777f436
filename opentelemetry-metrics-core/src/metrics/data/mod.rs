//! Types for delivery of pre-aggregated metric time series data.
//!
//! All timestamps are nanoseconds since the UNIX epoch, as reported by the
//! provider's [Clock](crate::Clock).

use std::borrow::Cow;
use std::fmt;
use std::ops::{Add, Sub};

use crate::{InstrumentationScope, KeyValue, Resource};

mod temporality;

pub use temporality::{Temporality, TemporalityPreference};

/// A collection of [ScopeMetrics] and the associated [Resource] that created them.
#[derive(Debug, Clone)]
pub struct ResourceMetrics {
    /// The entity that collected the metrics.
    pub resource: Resource,
    /// The collection of metrics with unique [InstrumentationScope]s.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// A collection of metrics produced by a meter.
#[derive(Default, Debug, Clone)]
pub struct ScopeMetrics {
    /// The [InstrumentationScope] that the meter was created with.
    pub scope: InstrumentationScope,
    /// The list of aggregations created by the meter.
    pub metrics: Vec<Metric>,
}

/// A collection of one or more aggregated time series from an instrument.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The name of the instrument that created this data.
    pub name: Cow<'static, str>,
    /// The description of the instrument, which can be used in documentation.
    pub description: Cow<'static, str>,
    /// The unit in which the instrument reports.
    pub unit: Cow<'static, str>,
    /// The aggregated data from an instrument.
    pub data: MetricData,
}

/// Metric data for all supported aggregations.
#[derive(Debug, Clone)]
pub enum MetricData {
    /// The last observed value of each time series.
    Gauge(Gauge),
    /// The arithmetic sum of each time series.
    Sum(Sum),
}

impl MetricData {
    /// The data points of this metric, whatever its aggregation.
    pub fn data_points(&self) -> &[DataPoint] {
        match self {
            MetricData::Gauge(gauge) => &gauge.data_points,
            MetricData::Sum(sum) => &sum.data_points,
        }
    }
}

/// A single data point in a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Attributes is the set of key value pairs that uniquely identify the
    /// time series.
    pub attributes: Vec<KeyValue>,
    /// The time when the time series was started.
    pub start_time_unix_nano: u64,
    /// The time when the time series was recorded.
    pub time_unix_nano: u64,
    /// The value of this data point.
    pub value: MetricValue,
    /// The sampled [Exemplar]s collected during the time series.
    pub exemplars: Vec<Exemplar>,
}

/// A measurement of the current value of an instrument.
#[derive(Debug, Clone)]
pub struct Gauge {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<DataPoint>,
}

/// Represents the sum of all measurements of values from an instrument.
#[derive(Debug, Clone)]
pub struct Sum {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<DataPoint>,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
    /// Whether this aggregation only increases or decreases.
    pub is_monotonic: bool,
}

/// A measurement sampled from a time series providing a typical example.
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    /// The time when the measurement was recorded.
    pub time_unix_nano: u64,
    /// The measured value.
    pub value: MetricValue,
}

/// A measured or aggregated value, in the number type of its instrument.
///
/// Integer instruments keep exact integer arithmetic. Values of different
/// types only meet when two instruments of different number types report
/// into the same stream, in which case the result is an `F64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Value of a `u64` instrument.
    U64(u64),
    /// Value of an `i64` instrument.
    I64(i64),
    /// Value of an `f64` instrument.
    F64(f64),
}

impl MetricValue {
    /// The value as a float, which is lossy for integers above 2^53.
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::U64(v) => v as f64,
            MetricValue::I64(v) => v as f64,
            MetricValue::F64(v) => v,
        }
    }

    pub(crate) fn is_negative(&self) -> bool {
        match *self {
            MetricValue::U64(_) => false,
            MetricValue::I64(v) => v < 0,
            MetricValue::F64(v) => v < 0.0,
        }
    }

    /// Zero of the same number type.
    pub(crate) fn zero(&self) -> MetricValue {
        match self {
            MetricValue::U64(_) => MetricValue::U64(0),
            MetricValue::I64(_) => MetricValue::I64(0),
            MetricValue::F64(_) => MetricValue::F64(0.0),
        }
    }
}

impl Add for MetricValue {
    type Output = MetricValue;

    fn add(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs) {
            (MetricValue::U64(a), MetricValue::U64(b)) => MetricValue::U64(a.wrapping_add(b)),
            (MetricValue::I64(a), MetricValue::I64(b)) => MetricValue::I64(a.wrapping_add(b)),
            (a, b) => MetricValue::F64(a.as_f64() + b.as_f64()),
        }
    }
}

impl Sub for MetricValue {
    type Output = MetricValue;

    fn sub(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs) {
            (MetricValue::U64(a), MetricValue::U64(b)) => MetricValue::U64(a.wrapping_sub(b)),
            (MetricValue::I64(a), MetricValue::I64(b)) => MetricValue::I64(a.wrapping_sub(b)),
            (a, b) => MetricValue::F64(a.as_f64() - b.as_f64()),
        }
    }
}

impl PartialEq<f64> for MetricValue {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == *other
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::U64(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::I64(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::F64(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::U64(v) => v.fmt(f),
            MetricValue::I64(v) => v.fmt(f),
            MetricValue::F64(v) => v.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_stay_exact_beyond_float_precision() {
        let big = MetricValue::U64(1 << 53);
        let total = big + MetricValue::U64(1);
        assert_eq!(total, MetricValue::U64((1 << 53) + 1));
        assert_eq!(total - big, MetricValue::U64(1));

        let down = MetricValue::I64(i64::MAX - 1) - MetricValue::I64(i64::MAX);
        assert_eq!(down, MetricValue::I64(-1));
    }

    #[test]
    fn mixed_types_fall_back_to_float() {
        assert_eq!(
            MetricValue::U64(2) + MetricValue::F64(0.5),
            MetricValue::F64(2.5)
        );
        assert_eq!(MetricValue::I64(-3), -3.0);
        assert!(MetricValue::I64(-3).is_negative());
        assert!(!MetricValue::U64(0).is_negative());
    }
}
