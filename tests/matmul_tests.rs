//! Matrix Multiply Tests
//!
//! Tests for:
//! - Raster matmul against the host reference for several sizes
//! - Determinism across timed iterations
//! - Direct use of the built-in kernel through a binding table

mod common;

use common::{random_values, seeded_rng, with_context};
use texcompute::kernels::MATMUL_WGSL;
use texcompute::{
    BindingTable, ComputeError, DEFAULT_TOLERANCE, HostReference, MatmulExecutor, RasterMatmul,
    compare,
};

// ============================================================================
// Against the host reference
// ============================================================================

#[test]
fn raster_matches_host_reference() -> anyhow::Result<()> {
    with_context(|ctx| {
        let mut rng = seeded_rng();
        let mut raster = RasterMatmul::new(ctx)?;
        let mut host = HostReference;

        for n in [1_usize, 2, 8, 64] {
            let a = random_values(&mut rng, n * n);
            let b = random_values(&mut rng, n * n);

            let expected = host.matmul(&a, &b, n)?;
            let actual = raster.matmul(&a, &b, n)?;
            compare(&expected, &actual, DEFAULT_TOLERANCE)
                .map_err(|e| anyhow::anyhow!("N = {n}: {e}"))?;
        }
        Ok(())
    })
}

#[test]
fn identity_times_matrix() -> anyhow::Result<()> {
    with_context(|ctx| {
        let n = 5;
        let mut identity = vec![0.0; n * n];
        for i in 0..n {
            identity[i * n + i] = 1.0;
        }
        let m: Vec<f32> = (0..n * n).map(|v| v as f32 - 12.0).collect();

        let mut raster = RasterMatmul::new(ctx)?;
        assert_eq!(raster.matmul(&identity, &m, n)?, m);
        assert_eq!(raster.matmul(&m, &identity, n)?, m);
        Ok(())
    })
}

#[test]
fn mismatched_inputs_are_rejected() -> anyhow::Result<()> {
    with_context(|ctx| {
        let mut raster = RasterMatmul::new(ctx)?;
        let err = raster.matmul(&[1.0; 4], &[1.0; 9], 2).unwrap_err();
        assert!(matches!(err, ComputeError::DataLength { .. }));
        Ok(())
    })
}

#[test]
fn executors_agree_on_edge_sizes() -> anyhow::Result<()> {
    with_context(|ctx| {
        let mut raster = RasterMatmul::new(ctx)?;
        let mut host = HostReference;

        assert!(raster.matmul(&[], &[], 0)?.is_empty());
        assert!(host.matmul(&[], &[], 0)?.is_empty());

        // N·N cells no longer fit in one texture row.
        let n = 200_usize;
        assert!(n * n > ctx.limits().max_texture_dimension_2d as usize);
        let ones = vec![1.0; n * n];
        assert!(matches!(
            raster.matmul(&ones, &ones, n),
            Err(ComputeError::InvalidShape { .. })
        ));
        Ok(())
    })
}

// ============================================================================
// Iterations
// ============================================================================

#[test]
fn iterations_are_deterministic() -> anyhow::Result<()> {
    with_context(|ctx| {
        let n = 16_usize;
        let cells = (n * n) as u32;
        let mut rng = seeded_rng();
        let a = ctx.create_buffer(Some(&random_values(&mut rng, n * n)), cells, 1)?;
        let b = ctx.create_buffer(Some(&random_values(&mut rng, n * n)), cells, 1)?;
        let mut c = ctx.create_buffer(None, cells, 1)?;

        let kernel = ctx.create_kernel_labeled("matmul", MATMUL_WGSL)?;
        let bindings = BindingTable::new()
            .input("A", &a)
            .input("B", &b)
            .uniform("N", n as i32);
        let dispatcher = ctx.dispatcher();

        dispatcher.dispatch(&kernel, &bindings, &mut c)?;
        let once = c.to_vec(ctx)?;

        let report = dispatcher.dispatch_n(&kernel, &bindings, &mut c, 10)?;
        assert_eq!(report.iterations, 10);
        let repeated = c.to_vec(ctx)?;

        let once_bits: Vec<u32> = once.iter().map(|v| v.to_bits()).collect();
        let repeated_bits: Vec<u32> = repeated.iter().map(|v| v.to_bits()).collect();
        assert_eq!(once_bits, repeated_bits);
        Ok(())
    })
}

#[test]
fn raster_executor_reports_timing() -> anyhow::Result<()> {
    with_context(|ctx| {
        let mut rng = seeded_rng();
        let a = random_values(&mut rng, 9);
        let b = random_values(&mut rng, 9);

        let mut raster = RasterMatmul::new(ctx)?.with_iterations(3);
        assert!(raster.last_report().is_none());
        raster.matmul(&a, &b, 3)?;

        let report = raster.last_report().expect("report after matmul");
        assert_eq!(report.timings.len(), 3);
        assert_eq!(raster.name(), "raster");
        assert_eq!(raster.kernel().label(), "matmul");
        Ok(())
    })
}
