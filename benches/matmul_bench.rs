//! Matrix multiply benchmarks: host reference vs raster dispatch.
//!
//! Run with: cargo bench --bench matmul_bench
//!
//! The raster numbers include upload and read-back. Machines without a GPU
//! adapter only run the host group.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use texcompute::{ComputeSettings, DeviceContext, HostReference, MatmulExecutor, RasterMatmul};

const SIZES: [usize; 4] = [8, 16, 32, 64];

fn matrices(n: usize) -> (Vec<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(n as u64);
    let mut values = || -> Vec<f32> { (0..n * n).map(|_| rng.random_range(1.0..2.0)).collect() };
    (values(), values())
}

fn bench_executor(c: &mut Criterion, group_name: &str, executor: &mut dyn MatmulExecutor) {
    let mut group = c.benchmark_group(group_name);
    for n in SIZES {
        let (a, b) = matrices(n);
        if let Err(e) = executor.matmul(&a, &b, n) {
            eprintln!("skipping {group_name}/{n}: {e}");
            continue;
        }
        group.throughput(Throughput::Elements((n * n * n) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bench, &n| {
            bench.iter(|| {
                black_box(executor.matmul(black_box(&a), black_box(&b), n))
                    .expect("matmul succeeded before timing");
            });
        });
    }
    group.finish();
}

fn bench_host(c: &mut Criterion) {
    bench_executor(c, "matmul_host", &mut HostReference);
}

fn bench_raster(c: &mut Criterion) {
    let ctx = match DeviceContext::new(ComputeSettings::default()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("skipping raster benchmarks: {e}");
            return;
        }
    };
    let mut raster = match RasterMatmul::new(&ctx) {
        Ok(raster) => raster,
        Err(e) => {
            eprintln!("skipping raster benchmarks: {e}");
            return;
        }
    };
    bench_executor(c, "matmul_raster", &mut raster);
}

criterion_group!(benches, bench_host, bench_raster);
criterion_main!(benches);
