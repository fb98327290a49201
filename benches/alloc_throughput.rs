use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rangebin::OffsetAllocator;
use std::hint::black_box;

const OPS: u64 = 10_000;
const HEAP_SIZE: u32 = 256 * 1024 * 1024;

/// Tight allocate/free pairs of a single size: hot path, no fragmentation.
fn alloc_free_pairs(heap: &mut OffsetAllocator, size: u32) {
    for _ in 0..OPS {
        let allocation = heap.allocate(size).unwrap();
        black_box(allocation.offset());
        heap.free(allocation);
    }
}

/// Windowed churn: keep a rolling window of live regions of mixed sizes,
/// freeing the oldest on each step. Exercises splitting and coalescing.
fn windowed_churn(heap: &mut OffsetAllocator) {
    const WINDOW: usize = 64;
    let sizes = [48u32, 1024, 3456, 16384, 700, 65536];
    let mut live = Vec::with_capacity(WINDOW);

    for i in 0..OPS as usize {
        if live.len() == WINDOW {
            heap.free(live.remove(0));
        }
        let allocation = heap.allocate(sizes[i % sizes.len()]).unwrap();
        black_box(allocation.offset());
        live.push(allocation);
    }
    for allocation in live {
        heap.free(allocation);
    }
}

fn benchmark_alloc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_throughput");

    for size in [16u32, 256, 1024, 16384, 1 << 20] {
        group.throughput(Throughput::Elements(OPS));
        group.bench_with_input(BenchmarkId::new("alloc_free", size), &size, |b, &size| {
            let mut heap = OffsetAllocator::new(HEAP_SIZE).unwrap();
            b.iter(|| alloc_free_pairs(&mut heap, size))
        });
    }

    group.throughput(Throughput::Elements(OPS));
    group.bench_function("windowed_churn", |b| {
        let mut heap = OffsetAllocator::new(HEAP_SIZE).unwrap();
        b.iter(|| windowed_churn(&mut heap))
    });

    group.finish();
}

criterion_group!(benches, benchmark_alloc_throughput);
criterion_main!(benches);
