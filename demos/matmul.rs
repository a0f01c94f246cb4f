//! Host vs raster matrix multiply.
//!
//! Multiplies two random 64×64 matrices 100 times with each executor, prints
//! the mean time per multiply and checks that the results agree.
//!
//! ```text
//! RUST_LOG=info cargo run --release --example matmul
//! ```

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use texcompute::prelude::*;
use texcompute::{DEFAULT_TOLERANCE, compare};

const N: usize = 64;
const ITERATIONS: u32 = 100;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(42);
    let a: Vec<f32> = (0..N * N).map(|_| rng.random_range(1.0..2.0)).collect();
    let b: Vec<f32> = (0..N * N).map(|_| rng.random_range(1.0..2.0)).collect();

    let mut host = HostReference;
    let start = Instant::now();
    let mut expected = Vec::new();
    for _ in 0..ITERATIONS {
        expected = host.matmul(&a, &b, N)?;
    }
    let host_mean = start.elapsed() / ITERATIONS;

    let ctx = DeviceContext::new(ComputeSettings::default())?;
    log::info!(
        "{} argument slots, scratch slot {}",
        ctx.num_argument_slots(),
        ctx.scratch_slot()
    );

    let mut raster = RasterMatmul::new(&ctx)?.with_iterations(ITERATIONS);
    let actual = raster.matmul(&a, &b, N)?;
    let raster_mean = raster
        .last_report()
        .map(DispatchReport::mean)
        .unwrap_or_default();

    println!("{:<8}{:>12.1?}", host.name(), host_mean);
    println!("{:<8}{:>12.1?}", raster.name(), raster_mean);

    compare(&expected, &actual, DEFAULT_TOLERANCE)?;
    println!("results agree within {DEFAULT_TOLERANCE}");
    Ok(())
}
