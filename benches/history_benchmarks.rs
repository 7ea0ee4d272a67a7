use battery_history::history::relay::chunks;
use battery_history::history::store::MemoryKvStore;
use battery_history::history::{HistoryBuffer, HistoryEntry, PersistenceCodec};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn full_buffer(capacity: usize) -> HistoryBuffer {
    let mut buffer = HistoryBuffer::with_capacity(capacity).expect("valid capacity");
    for i in 0..capacity as u32 {
        buffer.append(HistoryEntry::new(i, (i % 101) as u8));
    }
    buffer
}

fn bench_append_at_capacity(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_at_capacity");
    for capacity in [64usize, 1_000, 65_535] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            let mut buffer = full_buffer(cap);
            let mut ts = cap as u32;
            b.iter(|| {
                ts = ts.wrapping_add(1);
                buffer.append(black_box(HistoryEntry::new(ts, 50)));
            });
        });
    }
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let buffer = full_buffer(1_000);
    let codec = PersistenceCodec::new("battery_history", 1_000);
    let store = MemoryKvStore::new();
    c.bench_function("encode_and_save_1000", |b| {
        b.iter(|| {
            let blob = codec.encode(buffer.entries());
            codec.save(black_box(&blob), &store).expect("memory save");
        });
    });
}

fn bench_relay_frames(c: &mut Criterion) {
    let entries: Vec<_> = full_buffer(1_000).entries().collect();
    c.bench_function("relay_frames_1000", |b| {
        b.iter(|| {
            for chunk in chunks(black_box(&entries)) {
                black_box(chunk.encode());
            }
        });
    });
}

criterion_group!(benches, bench_append_at_capacity, bench_save, bench_relay_frames);
criterion_main!(benches);
