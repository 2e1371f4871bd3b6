use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

mod region_alloc;

pub fn bench_main(c: &mut Criterion) {
    region_alloc::bench(c);
    scratch_frames::bench(c);
    transmigrate_graphs::bench(c);
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
