/*
    Stress test for meter lookups.
    Run with `cargo run --release --bin meter_provider`.

    Every iteration asks the provider for one of a handful of meters, the hot
    path of libraries that do not cache their meter. All threads race on the
    same registry entries.
*/

use lazy_static::lazy_static;
use opentelemetry_metrics_core::metrics::{ManualReader, SdkMeterProvider};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::cell::RefCell;
use tracing::level_filters::LevelFilter;

mod throughput;

const METER_NAMES: [&str; 8] = [
    "http", "grpc", "db", "cache", "queue", "scheduler", "auth", "storage",
];

lazy_static! {
    static ref PROVIDER: SdkMeterProvider = SdkMeterProvider::builder()
        .with_reader(ManualReader::builder().build())
        .build();
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn main() {
    // Surface internal warnings, such as a failing shutdown, while the test runs.
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::WARN)
        .init();
    throughput::test_throughput(test_meter_lookup);
}

fn test_meter_lookup() {
    let index = CURRENT_RNG.with(|rng| rng.borrow_mut().random_range(0..METER_NAMES.len()));
    let meter = PROVIDER.meter(METER_NAMES[index]);
    meter.u64_counter("lookups").build().add(1, &[]);
}
