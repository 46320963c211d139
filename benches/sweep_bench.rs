// Benchmark the block-sweep kernel: one full write sweep plus one full
// verify sweep per iteration, on the scalar reference lane and on the
// vector lanes the host supports.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::sync::atomic::AtomicU64;

use ramscan::buffer::AlignedBuffer;
use ramscan::simd::{Lane, Pattern, PatternRng, Scalar};
use ramscan::sweep::{Direction, TestContext};

const SIZE: usize = 4 * 1024 * 1024;
const CPUS: usize = 4;

fn bench_lane<L: Lane>(c: &mut Criterion, name: &str) {
    let errors = AtomicU64::new(0);
    let ctx = TestContext::new(CPUS, &errors, PatternRng::from_seeds(1, 2)).unwrap();
    let mut buf = AlignedBuffer::new(SIZE).unwrap();
    let pattern = Pattern::splat_u8(0x5A);

    let mut group = c.benchmark_group("sweep");
    group.throughput(Throughput::Bytes(2 * SIZE as u64));
    group.bench_function(name, |b| {
        b.iter(|| {
            ctx.set_all::<L>(&mut buf, Direction::Up, &pattern);
            ctx.get_all::<L>(&mut buf, Direction::Up, &pattern);
        })
    });
    group.finish();
}

fn bench_sweeps(c: &mut Criterion) {
    bench_lane::<Scalar>(c, "scalar_write_verify");

    #[cfg(target_arch = "x86_64")]
    {
        use ramscan::simd::{Avx2, Avx512};
        if Avx2::available() {
            bench_lane::<Avx2>(c, "avx2_write_verify");
        }
        if Avx512::available() {
            bench_lane::<Avx512>(c, "avx512_write_verify");
        }
    }
}

criterion_group!(benches, bench_sweeps);
criterion_main!(benches);
