//! Shared helpers for device tests.
//!
//! Only one [`DeviceContext`] may be alive per process, and test functions in
//! one binary run on parallel threads. Every device test takes [`DEVICE_LOCK`]
//! for its whole duration. Machines without a usable adapter skip the test.

#![allow(dead_code)]

use parking_lot::{Mutex, MutexGuard, const_mutex};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use texcompute::{ComputeError, ComputeSettings, DeviceContext};

pub static DEVICE_LOCK: Mutex<()> = const_mutex(());

pub fn lock_device() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    DEVICE_LOCK.lock()
}

/// Creates a context, or `None` when the machine has no adapter.
pub fn try_context(settings: ComputeSettings) -> anyhow::Result<Option<DeviceContext>> {
    match DeviceContext::new(settings) {
        Ok(ctx) => Ok(Some(ctx)),
        Err(ComputeError::AdapterRequestFailed(reason)) => {
            eprintln!("skipping device test: {reason}");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Runs `test` with a fresh context built from `settings`.
pub fn with_context_settings(
    settings: ComputeSettings,
    test: impl FnOnce(&DeviceContext) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let _guard = lock_device();
    match try_context(settings)? {
        Some(ctx) => test(&ctx),
        None => Ok(()),
    }
}

pub fn with_context(test: impl FnOnce(&DeviceContext) -> anyhow::Result<()>) -> anyhow::Result<()> {
    with_context_settings(ComputeSettings::default(), test)
}

/// `len` values uniformly drawn from `[1, 2)`.
pub fn random_values(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.random_range(1.0..2.0)).collect()
}

pub fn seeded_rng() -> StdRng {
    StdRng::seed_from_u64(42)
}
