// src/buffer.rs

//! Device Buffers
//!
//! A [`Buffer`] is a two-dimensional grid of `f32` cells stored in a single
//! channel `R32Float` texture. It is both a kernel input (sampled texture) and
//! a dispatch destination (render attachment).
//!
//! Contents are uploaded once at creation and read back whole with
//! [`Buffer::read`]. There is no partial update.

use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::binding::SlotTable;
use crate::context::DeviceContext;
use crate::errors::{ComputeError, Result};

/// Texel format of every buffer: one 32-bit float per cell.
pub const BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Usages every buffer texture is created with.
pub const BUFFER_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

const BYTES_PER_CELL: u32 = std::mem::size_of::<f32>() as u32;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Fails unless the adapter can sample, render to and copy [`BUFFER_FORMAT`].
pub fn check_format_support(features: &wgpu::TextureFormatFeatures) -> Result<()> {
    let missing = BUFFER_USAGES - features.allowed_usages;
    if missing.is_empty() {
        return Ok(());
    }
    Err(ComputeError::AdapterRequestFailed(format!(
        "adapter does not support {missing:?} on {BUFFER_FORMAT:?} textures"
    )))
}

/// A device-resident `width × height` array of `f32`.
///
/// Move-only. The device texture is released exactly once, by
/// [`destroy`](Self::destroy) or on drop, and the buffer leaves every
/// argument slot it occupied.
pub struct Buffer {
    id: u64,
    context_id: u64,
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    slots: Weak<Mutex<SlotTable>>,
}

impl Buffer {
    pub(crate) fn create(
        ctx: &DeviceContext,
        data: Option<&[f32]>,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let max = ctx.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ComputeError::InvalidShape { width, height, max });
        }
        let expected = width as usize * height as usize;
        if let Some(data) = data
            && data.len() != expected
        {
            return Err(ComputeError::DataLength {
                expected,
                actual: data.len(),
            });
        }

        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        let label = format!("buffer {id}");
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BUFFER_FORMAT,
            usage: BUFFER_USAGES,
            view_formats: &[],
        });

        // Transfers go through the scratch slot and never disturb kernel inputs.
        ctx.lock_slots().bind_scratch(id)?;

        if let Some(data) = data {
            ctx.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(data),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * BYTES_PER_CELL),
                    rows_per_image: Some(height),
                },
                size,
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::trace!("Created buffer [{id}] {width}x{height}");

        let buffer = Self {
            id,
            context_id: ctx.id(),
            width,
            height,
            texture,
            view,
            slots: ctx.slot_table(),
        };
        ctx.check_device()?;
        Ok(buffer)
    }

    // ========================================================================
    // Read-back
    // ========================================================================

    /// Copies the whole buffer into `out` (row-major, `width × height` values).
    ///
    /// Blocks until every earlier dispatch has finished.
    pub fn read(&self, ctx: &DeviceContext, out: &mut [f32]) -> Result<()> {
        ctx.check_owner("buffer", self.id, self.context_id)?;
        let texture = &self.texture;
        if out.len() != self.len() {
            return Err(ComputeError::DataLength {
                expected: self.len(),
                actual: out.len(),
            });
        }

        let unpadded = self.width * BYTES_PER_CELL;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("buffer read-back"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        ctx.lock_slots().bind_scratch(self.id)?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("buffer read-back"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = flume::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle()?;
        rx.recv()
            .map_err(|e| ComputeError::Device(format!("read-back callback dropped: {e}")))??;

        {
            let mapped = slice.get_mapped_range();
            let unpadded = unpadded as usize;
            for (chunk, out_row) in mapped
                .chunks(padded as usize)
                .zip(out.chunks_mut(self.width as usize))
            {
                bytemuck::cast_slice_mut(out_row).copy_from_slice(&chunk[..unpadded]);
            }
        }
        staging.unmap();

        ctx.check_device()
    }

    /// Reads the whole buffer into a new vector.
    pub fn to_vec(&self, ctx: &DeviceContext) -> Result<Vec<f32>> {
        let mut out = vec![0.0; self.len()];
        self.read(ctx, &mut out)?;
        Ok(out)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Releases the device texture now.
    pub fn destroy(self) {
        drop(self);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn context_id(&self) -> u64 {
        self.context_id
    }

    pub(crate) fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        log::trace!("Deleting buffer [{}]", self.id);
        // The context may already be gone; its slot table went with it.
        if let Some(slots) = self.slots.upgrade() {
            slots.lock().release(self.id);
        }
        self.texture.destroy();
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(allowed_usages: wgpu::TextureUsages) -> wgpu::TextureFormatFeatures {
        wgpu::TextureFormatFeatures {
            allowed_usages,
            flags: wgpu::TextureFormatFeatureFlags::empty(),
        }
    }

    #[test]
    fn full_format_support_is_accepted() {
        assert!(check_format_support(&features(wgpu::TextureUsages::all())).is_ok());
        assert!(check_format_support(&features(BUFFER_USAGES)).is_ok());
    }

    #[test]
    fn missing_render_attachment_is_rejected() {
        let downlevel = BUFFER_USAGES - wgpu::TextureUsages::RENDER_ATTACHMENT;
        let err = check_format_support(&features(downlevel)).unwrap_err();
        match err {
            ComputeError::AdapterRequestFailed(reason) => {
                assert!(reason.contains("RENDER_ATTACHMENT"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
