//! Reference Executors
//!
//! A [`MatmulExecutor`] multiplies two `N × N` row-major matrices. Every
//! implementation honors the same contract:
//!
//! ```text
//! result[row * N + col] = Σ_i a[row * N + i] * b[i * N + col]
//! ```
//!
//! [`HostReference`] is the plain CPU triple loop. It exists to validate and
//! benchmark the device executor ([`RasterMatmul`](crate::kernels::RasterMatmul)),
//! never to feed the dispatcher.

use crate::errors::{ComputeError, Result};

/// Absolute per-cell tolerance used when comparing executors.
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// An implementation of square matrix multiplication.
pub trait MatmulExecutor {
    /// Short name for logs and benchmark ids.
    fn name(&self) -> &str;

    /// Returns `a × b` for two `n × n` row-major matrices.
    fn matmul(&mut self, a: &[f32], b: &[f32], n: usize) -> Result<Vec<f32>>;
}

/// Fails unless `a` and `b` both hold `n × n` values.
pub fn check_square(a: &[f32], b: &[f32], n: usize) -> Result<()> {
    let expected = n.checked_mul(n).unwrap_or(usize::MAX);
    for len in [a.len(), b.len()] {
        if len != expected {
            return Err(ComputeError::DataLength {
                expected,
                actual: len,
            });
        }
    }
    Ok(())
}

/// CPU matrix multiply, accumulating in `f32`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostReference;

impl MatmulExecutor for HostReference {
    fn name(&self) -> &str {
        "host"
    }

    fn matmul(&mut self, a: &[f32], b: &[f32], n: usize) -> Result<Vec<f32>> {
        check_square(a, b, n)?;
        let mut result = vec![0.0; n * n];
        for row in 0..n {
            for col in 0..n {
                let mut sum = 0.0_f32;
                for i in 0..n {
                    sum += a[row * n + i] * b[i * n + col];
                }
                result[row * n + col] = sum;
            }
        }
        Ok(result)
    }
}

/// Compares two results cell by cell with an absolute tolerance.
///
/// Reports the first cell that differs by more than `tolerance`.
pub fn compare(expected: &[f32], actual: &[f32], tolerance: f32) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(ComputeError::DataLength {
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    for (index, (&e, &a)) in expected.iter().zip(actual).enumerate() {
        // NaN never compares within tolerance.
        if (e - a).abs() <= tolerance {
            continue;
        }
        return Err(ComputeError::ResultMismatch {
            index,
            expected: e,
            actual: a,
        });
    }
    Ok(())
}
