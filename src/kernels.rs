//! Built-in Kernels
//!
//! [`MATMUL_WGSL`] multiplies two `N × N` matrices stored as `N·N × 1`
//! buffers. Destination cell `idx` holds `C[idx / N][idx % N]`.
//!
//! [`RasterMatmul`] wraps it as a [`MatmulExecutor`] so it can be compared and
//! benchmarked against [`HostReference`](crate::reference::HostReference).

use crate::binding::BindingTable;
use crate::context::DeviceContext;
use crate::dispatch::DispatchReport;
use crate::errors::{ComputeError, Result};
use crate::kernel::Kernel;
use crate::reference::{MatmulExecutor, check_square};

/// Square matrix multiply over flat row-major inputs `A` and `B`.
pub const MATMUL_WGSL: &str = r"
var A: texture_2d<f32>;
var B: texture_2d<f32>;
var<uniform> N: i32;

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) f32 {
    let idx = i32(frag_coord.x);
    let row = idx / N;
    let col = idx % N;

    var sum = 0.0;
    for (var i = 0; i < N; i++) {
        let a = textureLoad(A, vec2<i32>(row * N + i, 0), 0).r;
        let b = textureLoad(B, vec2<i32>(i * N + col, 0), 0).r;
        sum += a * b;
    }
    return sum;
}
";

/// Runs [`MATMUL_WGSL`] through the dispatcher.
pub struct RasterMatmul<'ctx> {
    ctx: &'ctx DeviceContext,
    kernel: Kernel,
    iterations: u32,
    last_report: Option<DispatchReport>,
}

impl<'ctx> RasterMatmul<'ctx> {
    /// Compiles the kernel once for every later multiply.
    pub fn new(ctx: &'ctx DeviceContext) -> Result<Self> {
        Ok(Self {
            ctx,
            kernel: ctx.create_kernel_labeled("matmul", MATMUL_WGSL)?,
            iterations: 1,
            last_report: None,
        })
    }

    /// Repeats each multiply `iterations` times for timing. Zero is rejected at dispatch.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Timing of the most recent multiply.
    #[must_use]
    pub fn last_report(&self) -> Option<&DispatchReport> {
        self.last_report.as_ref()
    }

    #[must_use]
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }
}

impl MatmulExecutor for RasterMatmul<'_> {
    fn name(&self) -> &str {
        "raster"
    }

    fn matmul(&mut self, a: &[f32], b: &[f32], n: usize) -> Result<Vec<f32>> {
        check_square(a, b, n)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        // Inputs are laid out as one row of N·N cells.
        let max = self.ctx.limits().max_texture_dimension_2d;
        let too_large = || ComputeError::InvalidShape {
            width: u32::MAX,
            height: 1,
            max,
        };
        let cells = u32::try_from(n * n).map_err(|_| too_large())?;
        let order = i32::try_from(n).map_err(|_| too_large())?;

        let a = self.ctx.create_buffer(Some(a), cells, 1)?;
        let b = self.ctx.create_buffer(Some(b), cells, 1)?;
        let mut c = self.ctx.create_buffer(None, cells, 1)?;

        let bindings = BindingTable::new()
            .input("A", &a)
            .input("B", &b)
            .uniform("N", order);
        let report =
            self.ctx
                .dispatcher()
                .dispatch_n(&self.kernel, &bindings, &mut c, self.iterations)?;
        self.last_report = Some(report);

        c.to_vec(self.ctx)
    }
}
