use criterion::{BatchSize, Criterion};

use omnimem::memory_manager as mm;
use omnimem::MemContext;

pub fn bench(c: &mut Criterion) {
    let ctx = MemContext::default();

    // The inline-buffer fast path: 32 small objects fit in one buffer.
    c.bench_function("region_alloc_inline", |b| {
        b.iter_batched(
            || mm::region_create(&ctx),
            |r| {
                for _ in 0..32 {
                    std::hint::black_box(mm::region_alloc(r, 16));
                }
                mm::region_exit(r);
            },
            BatchSize::SmallInput,
        );
    });

    // Arena bumps past the small-object threshold.
    c.bench_function("region_alloc_arena", |b| {
        b.iter_batched(
            || mm::region_create(&ctx),
            |r| {
                for _ in 0..256 {
                    std::hint::black_box(mm::region_alloc(r, 256));
                }
                mm::region_exit(r);
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("region_create_exit", |b| {
        b.iter(|| {
            let r = mm::region_create(&ctx);
            mm::region_exit(std::hint::black_box(r));
        });
    });
}
