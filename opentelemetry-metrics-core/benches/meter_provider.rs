use criterion::{criterion_group, criterion_main, Criterion};
use opentelemetry_metrics_core::metrics::{ManualReader, SdkMeterProvider};
use opentelemetry_metrics_core::KeyValue;
use std::hint::black_box;

// Run this benchmark with:
// cargo bench --bench meter_provider

const ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

fn provider_with(readers: usize) -> (SdkMeterProvider, Vec<ManualReader>) {
    let readers: Vec<ManualReader> = (0..readers)
        .map(|_| ManualReader::builder().build())
        .collect();
    let provider = readers
        .iter()
        .fold(SdkMeterProvider::builder(), |builder, reader| {
            builder.with_reader(reader.clone())
        })
        .build();
    (provider, readers)
}

fn criterion_benchmark(c: &mut Criterion) {
    let (provider, readers) = provider_with(1);

    c.bench_function("MeterProvider_Meter_Cached", |b| {
        provider.meter("benchmarks");
        b.iter(|| black_box(provider.meter("benchmarks")));
    });

    let counter = provider.meter("benchmarks").u64_counter("counter_bench").build();
    c.bench_function("Counter_Add_3_Attributes", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % ATTRIBUTE_VALUES.len();
            counter.add(
                1,
                &[
                    KeyValue::new("attribute1", ATTRIBUTE_VALUES[i]),
                    KeyValue::new("attribute2", ATTRIBUTE_VALUES[(i + 3) % 10]),
                    KeyValue::new("attribute3", ATTRIBUTE_VALUES[(i + 7) % 10]),
                ],
            );
        });
    });

    c.bench_function("ManualReader_Collect_100_Series", |b| {
        for first in ATTRIBUTE_VALUES {
            for second in ATTRIBUTE_VALUES {
                counter.add(
                    1,
                    &[
                        KeyValue::new("attribute1", first),
                        KeyValue::new("attribute2", second),
                    ],
                );
            }
        }
        b.iter(|| black_box(readers[0].collect()));
    });

    c.bench_function("MeterProvider_Shutdown_4_Readers", |b| {
        b.iter_with_setup(
            || provider_with(4),
            |(provider, _readers)| black_box(provider.shutdown().is_success()),
        );
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
