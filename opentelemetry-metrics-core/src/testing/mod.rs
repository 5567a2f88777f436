//! Readers and clocks for testing purpose.

mod clock;
mod metric_reader;

pub use clock::TestClock;
pub use metric_reader::TestMetricReader;
