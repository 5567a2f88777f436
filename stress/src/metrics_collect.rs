//! Measures how much recording slows down while a reader collects.
//!
//! Run with `cargo run --release --bin metrics_collect -- delta` (or
//! `cumulative`). Collection must not stop the world: recording threads keep
//! going while the collecting thread walks every stream.

use std::{
    cell::RefCell,
    env,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Barrier,
    },
    time::{Duration, Instant},
};

use lazy_static::lazy_static;
use opentelemetry_metrics_core::{
    metrics::{Counter, ManualReader, SdkMeterProvider, TemporalityPreference},
    KeyValue,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};

lazy_static! {
    static ref ATTRIBUTE_VALUES: [&'static str; 10] = [
        "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
        "value10"
    ];
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn main() {
    let temporality = match env::args().nth(1).as_deref() {
        Some("delta") => TemporalityPreference::Delta,
        Some("cumulative") | None => TemporalityPreference::Cumulative,
        Some(other) => {
            eprintln!("unknown temporality '{other}', expected 'delta' or 'cumulative'");
            std::process::exit(2);
        }
    };
    println!("Temporality: {:?}", temporality);

    let reader = ManualReader::builder()
        .with_temporality(temporality)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("test").u64_counter("hello").build();

    calculate_measurements_during_collection(&counter, &reader).print_results();
    provider.close();
}

fn record(counter: &Counter<u64>) {
    CURRENT_RNG.with(|rng| {
        let attributes = random_attribute_set3(&mut rng.borrow_mut());
        counter.add(1, &attributes);
    });
}

fn calculate_measurements_during_collection(
    counter: &Counter<u64>,
    reader: &ManualReader,
) -> MeasurementResults {
    // Leave the other half of the CPUs to the operating system, so the
    // recording threads run at a stable pace.
    let num_threads = (num_cpus::get() / 2).max(2);

    let mut res = MeasurementResults {
        total_measurements_count: 0,
        total_time_collecting: 0,
        num_iterations: 0,
    };
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(3) {
        res.num_iterations += 1;
        let is_collecting = AtomicBool::new(false);
        let measurements_while_collecting = AtomicUsize::new(0);
        let time_while_collecting = AtomicUsize::new(0);
        let barrier = Barrier::new(num_threads + 1);
        std::thread::scope(|s| {
            // first create bunch of measurements,
            // so that collection phase wouldn't be "empty"
            let handles: Vec<_> = (0..num_threads)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..1000 {
                            record(counter);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            // simultaneously start collecting and creating more measurements
            for _ in 0..num_threads - 1 {
                s.spawn(|| {
                    barrier.wait();
                    let now = Instant::now();
                    let mut count = 0;
                    while is_collecting.load(Ordering::Acquire) {
                        record(counter);
                        count += 1;
                    }
                    measurements_while_collecting.fetch_add(count, Ordering::AcqRel);
                    time_while_collecting
                        .fetch_add(now.elapsed().as_micros() as usize, Ordering::AcqRel);
                });
            }

            let collect_handle = s.spawn(|| {
                is_collecting.store(true, Ordering::Release);
                barrier.wait();
                reader.collect().unwrap();
                is_collecting.store(false, Ordering::Release);
            });
            barrier.wait();
            collect_handle.join().unwrap();
        });
        res.total_measurements_count += measurements_while_collecting.load(Ordering::Acquire);
        res.total_time_collecting += time_while_collecting.load(Ordering::Acquire);
    }
    res
}

struct MeasurementResults {
    total_measurements_count: usize,
    total_time_collecting: usize,
    num_iterations: usize,
}

impl MeasurementResults {
    fn print_results(&self) {
        println!(
            "{:>10.2} measurements/ms",
            self.total_measurements_count as f32 / (self.total_time_collecting as f32 / 1000.0f32)
        );
        println!(
            "{:>10.2} measurements/it",
            self.total_measurements_count as f32 / self.num_iterations as f32,
        );
        println!(
            "{:>10.2} μs/it",
            self.total_time_collecting as f32 / self.num_iterations as f32,
        );
    }
}

fn random_attribute_set3(rng: &mut SmallRng) -> [KeyValue; 3] {
    let len = ATTRIBUTE_VALUES.len();
    [
        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
    ]
}
