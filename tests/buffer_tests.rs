//! Buffer Tests
//!
//! Tests for:
//! - Upload / read-back identity for arbitrary float values
//! - Shape and data-length validation
//! - Scratch slot bookkeeping during transfers
//! - Explicit destroy and move semantics

mod common;

use common::with_context;
use texcompute::ComputeError;

// ============================================================================
// Round-trip
// ============================================================================

#[test]
fn round_trip_preserves_values() -> anyhow::Result<()> {
    with_context(|ctx| {
        let data = [
            0.0,
            -0.0,
            1.0,
            -1.5,
            0.1,
            3.25,
            -2.5e-7,
            1.0e30,
            -65_504.25,
            f32::MIN_POSITIVE,
            12_345.678,
            -0.333_333_34,
        ];
        let buffer = ctx.create_buffer(Some(&data), 4, 3)?;
        let back = buffer.to_vec(ctx)?;

        assert_eq!(back.len(), data.len());
        for (expected, actual) in data.iter().zip(&back) {
            assert_eq!(expected.to_bits(), actual.to_bits(), "{expected} != {actual}");
        }
        Ok(())
    })
}

#[test]
fn round_trip_wide_row_crosses_padding() -> anyhow::Result<()> {
    // 100 cells = 400 bytes per row, padded to 512 on read-back.
    with_context(|ctx| {
        let data: Vec<f32> = (0..300).map(|v| v as f32 * 0.25 - 10.0).collect();
        let buffer = ctx.create_buffer(Some(&data), 100, 3)?;
        assert_eq!(buffer.to_vec(ctx)?, data);
        Ok(())
    })
}

#[test]
fn read_into_caller_slice() -> anyhow::Result<()> {
    with_context(|ctx| {
        let data = [7.0, 8.0, 9.0];
        let buffer = ctx.create_buffer(Some(&data), 3, 1)?;
        let mut out = [0.0; 3];
        buffer.read(ctx, &mut out)?;
        assert_eq!(out, data);

        let mut short = [0.0; 2];
        let err = buffer.read(ctx, &mut short).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::DataLength {
                expected: 3,
                actual: 2
            }
        ));
        Ok(())
    })
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn zero_and_oversized_shapes_are_rejected() -> anyhow::Result<()> {
    with_context(|ctx| {
        assert!(matches!(
            ctx.create_buffer(None, 0, 1),
            Err(ComputeError::InvalidShape { .. })
        ));
        assert!(matches!(
            ctx.create_buffer(None, 4, 0),
            Err(ComputeError::InvalidShape { .. })
        ));

        let too_wide = ctx.limits().max_texture_dimension_2d + 1;
        assert!(matches!(
            ctx.create_buffer(None, too_wide, 1),
            Err(ComputeError::InvalidShape { .. })
        ));
        Ok(())
    })
}

#[test]
fn data_length_must_match_shape() -> anyhow::Result<()> {
    with_context(|ctx| {
        let err = ctx.create_buffer(Some(&[1.0; 5]), 2, 2).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::DataLength {
                expected: 4,
                actual: 5
            }
        ));
        Ok(())
    })
}

// ============================================================================
// Slots & lifecycle
// ============================================================================

#[test]
fn transfers_occupy_the_scratch_slot() -> anyhow::Result<()> {
    with_context(|ctx| {
        let scratch = ctx.scratch_slot();
        assert_eq!(scratch, ctx.num_argument_slots() - 1);

        let buffer = ctx.create_buffer(Some(&[1.0, 2.0]), 2, 1)?;
        assert_eq!(ctx.bound_buffer(scratch), Some(buffer.id()));

        ctx.bind_slot(0, &buffer)?;
        assert_eq!(ctx.bound_buffer(0), Some(buffer.id()));
        assert!(matches!(
            ctx.bind_slot(ctx.num_argument_slots(), &buffer),
            Err(ComputeError::SlotOutOfRange { .. })
        ));
        Ok(())
    })
}

#[test]
fn destroy_releases_and_move_keeps_identity() -> anyhow::Result<()> {
    with_context(|ctx| {
        let buffer = ctx.create_buffer(Some(&[4.0, 5.0]), 2, 1)?;
        let id = buffer.id();

        let moved = buffer;
        assert_eq!(moved.id(), id);
        assert_eq!(moved.to_vec(ctx)?, [4.0, 5.0]);

        ctx.bind_slot(0, &moved)?;
        assert_eq!(ctx.bound_buffer(0), Some(id));
        assert_eq!(ctx.bound_buffer(ctx.scratch_slot()), Some(id));

        moved.destroy();
        assert_eq!(ctx.bound_buffer(0), None);
        assert_eq!(ctx.bound_buffer(ctx.scratch_slot()), None);
        ctx.check_device()?;
        Ok(())
    })
}

#[test]
fn dropped_buffer_leaves_its_slots() -> anyhow::Result<()> {
    with_context(|ctx| {
        let kept = ctx.create_buffer(Some(&[1.0]), 1, 1)?;
        {
            let scoped = ctx.create_buffer(Some(&[2.0]), 1, 1)?;
            ctx.bind_slot(1, &scoped)?;
            ctx.bind_slot(0, &kept)?;
            assert_eq!(ctx.bound_buffer(1), Some(scoped.id()));
        }
        assert_eq!(ctx.bound_buffer(1), None);
        assert_eq!(ctx.bound_buffer(0), Some(kept.id()));
        Ok(())
    })
}

#[test]
fn buffer_ids_are_unique() -> anyhow::Result<()> {
    with_context(|ctx| {
        let a = ctx.create_buffer(None, 1, 1)?;
        let b = ctx.create_buffer(None, 1, 1)?;
        assert_ne!(a.id(), b.id());
        assert_eq!((a.width(), a.height(), a.len()), (1, 1, 1));
        Ok(())
    })
}
