use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flexpack_core::archive::Archive;

fn records(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| vec![(i % 251) as u8; size]).collect()
}

fn bench_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");

    for count in [100, 1000, 5000] {
        let data = Archive::from_records(&records(count, 256)).unwrap().into_bytes();

        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| Archive::open(black_box(data)).unwrap());
        });
    }

    group.finish();
}

fn bench_put_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_record");
    let archive = Archive::from_records(&records(1000, 256)).unwrap();

    group.bench_function("in_place", |b| {
        let mut archive = archive.clone();
        let payload = vec![0xAB; 200];
        b.iter(|| archive.put_record(black_box(500), &payload).unwrap());
    });

    group.bench_function("rebuild", |b| {
        let payload = vec![0xCD; 512];
        b.iter(|| {
            let mut archive = archive.clone();
            archive.put_record(black_box(500), &payload).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_open, bench_put_record);
criterion_main!(benches);
