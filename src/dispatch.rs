//! Dispatch
//!
//! Runs a kernel once per destination cell by drawing the full-surface quad
//! into the destination texture. Two targets exist:
//!
//! - **Off-screen** ([`Dispatcher::dispatch`], [`Dispatcher::dispatch_n`]): the
//!   destination is a [`Buffer`]. Results stay on the device until read back.
//! - **Surface** ([`Dispatcher::present`]): the destination is the current
//!   surface texture. Used to eyeball a kernel's output; the caller owns the
//!   redraw loop.
//!
//! Every precondition (ownership, iteration count, slot capacity, names) is
//! checked before the first device command, so a failed dispatch leaves the
//! destination untouched.

use std::time::{Duration, Instant};

use wgpu::util::DeviceExt;

use crate::binding::{BindingTable, ResolvedBindings, TargetKind};
use crate::buffer::{BUFFER_FORMAT, Buffer};
use crate::context::DeviceContext;
use crate::errors::{ComputeError, Result};
use crate::kernel::{Kernel, SpecializedPipeline};
use crate::quad;

/// Timing of one off-screen dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub iterations: u32,
    /// Wall time of each iteration, submission to device idle.
    pub timings: Vec<Duration>,
}

impl DispatchReport {
    #[must_use]
    pub fn total(&self) -> Duration {
        self.timings.iter().sum()
    }

    /// Mean iteration time. Zero for an empty report.
    #[must_use]
    pub fn mean(&self) -> Duration {
        match u32::try_from(self.timings.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.total() / count,
        }
    }
}

/// Issues kernel draws on one context.
pub struct Dispatcher<'ctx> {
    ctx: &'ctx DeviceContext,
}

impl<'ctx> Dispatcher<'ctx> {
    #[must_use]
    pub fn new(ctx: &'ctx DeviceContext) -> Self {
        Self { ctx }
    }

    /// Runs `kernel` once into `dest`.
    pub fn dispatch(
        &self,
        kernel: &Kernel,
        bindings: &BindingTable<'_>,
        dest: &mut Buffer,
    ) -> Result<DispatchReport> {
        self.dispatch_n(kernel, bindings, dest, 1)
    }

    /// Runs `kernel` into `dest` `iterations` times, waiting for the device
    /// after each one.
    ///
    /// Every iteration recomputes the whole destination from the inputs, so
    /// repeated runs produce identical results.
    pub fn dispatch_n(
        &self,
        kernel: &Kernel,
        bindings: &BindingTable<'_>,
        dest: &mut Buffer,
        iterations: u32,
    ) -> Result<DispatchReport> {
        let ctx = self.ctx;
        self.check_ownership(kernel, bindings)?;
        ctx.check_owner("buffer", dest.id(), dest.context_id())?;
        if iterations == 0 {
            return Err(ComputeError::InvalidIterations);
        }

        // The slot table stays locked for the whole configure-and-draw sequence.
        let mut slots = ctx.lock_slots();
        let resolved = bindings.resolve(kernel, &slots, TargetKind::OffScreen)?;
        let target = check_target(dest)?;

        let pipeline = kernel.pipeline(ctx, &resolved.texture_slots, BUFFER_FORMAT)?;

        slots.clear_inputs();
        for &(slot, buffer) in &resolved.inputs {
            slots.bind(slot, buffer.id())?;
        }
        let (texture_group, uniform_group) = self.create_bind_groups(&pipeline, &resolved);

        let dest_view = target.create_view(&wgpu::TextureViewDescriptor {
            label: Some("dispatch destination"),
            ..Default::default()
        });
        let clear = wgpu::Color {
            r: ctx.settings().clear_value,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };

        let mut timings = Vec::with_capacity(iterations as usize);
        for _ in 0..iterations {
            let start = Instant::now();
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some(kernel.label()),
                });
            self.encode_draw(
                &mut encoder,
                &dest_view,
                clear,
                (dest.width(), dest.height()),
                &pipeline,
                &texture_group,
                &uniform_group,
            );
            ctx.queue.submit(Some(encoder.finish()));
            ctx.wait_idle()?;
            ctx.check_device()?;
            timings.push(start.elapsed());
        }

        let report = DispatchReport {
            iterations,
            timings,
        };
        log::debug!(
            "Dispatched '{}' into {}x{} x{iterations}: mean {:?}",
            kernel.label(),
            dest.width(),
            dest.height(),
            report.mean()
        );
        Ok(report)
    }

    /// Draws `kernel` once into the presentation surface and presents it.
    ///
    /// The kernel must return a `vec4<f32>`: surface formats have four channels.
    pub fn present(&self, kernel: &Kernel, bindings: &BindingTable<'_>) -> Result<()> {
        let ctx = self.ctx;
        self.check_ownership(kernel, bindings)?;
        let state = ctx.surface()?;

        let mut slots = ctx.lock_slots();
        let resolved = bindings.resolve(kernel, &slots, TargetKind::Surface)?;
        let pipeline = kernel.pipeline(ctx, &resolved.texture_slots, state.config.format)?;

        slots.clear_inputs();
        for &(slot, buffer) in &resolved.inputs {
            slots.bind(slot, buffer.id())?;
        }
        let (texture_group, uniform_group) = self.create_bind_groups(&pipeline, &resolved);

        let output = state.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(kernel.label()),
            });
        self.encode_draw(
            &mut encoder,
            &view,
            wgpu::Color::BLACK,
            (output.texture.width(), output.texture.height()),
            &pipeline,
            &texture_group,
            &uniform_group,
        );
        ctx.queue.submit(Some(encoder.finish()));
        output.present();

        ctx.check_device()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_ownership(&self, kernel: &Kernel, bindings: &BindingTable<'_>) -> Result<()> {
        self.ctx
            .check_owner("kernel", kernel.id(), kernel.context_id())?;
        for (_, buffer) in bindings.inputs() {
            self.ctx
                .check_owner("buffer", buffer.id(), buffer.context_id())?;
        }
        Ok(())
    }

    fn create_bind_groups(
        &self,
        pipeline: &SpecializedPipeline,
        resolved: &ResolvedBindings<'_>,
    ) -> (wgpu::BindGroup, wgpu::BindGroup) {
        let device = &self.ctx.device;

        let texture_entries: Vec<wgpu::BindGroupEntry> = resolved
            .inputs
            .iter()
            .map(|&(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot,
                resource: wgpu::BindingResource::TextureView(buffer.view()),
            })
            .collect();
        let texture_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dispatch inputs"),
            layout: &pipeline.texture_layout,
            entries: &texture_entries,
        });

        // One 16-byte buffer per scalar, the minimum uniform binding size.
        let uniform_buffers: Vec<wgpu::Buffer> = resolved
            .uniform_values
            .iter()
            .map(|&value| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("dispatch uniform"),
                    contents: bytemuck::cast_slice(&[value, 0, 0, 0]),
                    usage: wgpu::BufferUsages::UNIFORM,
                })
            })
            .collect();
        let uniform_entries: Vec<wgpu::BindGroupEntry> = uniform_buffers
            .iter()
            .enumerate()
            .map(|(ordinal, buffer)| wgpu::BindGroupEntry {
                binding: ordinal as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let uniform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dispatch uniforms"),
            layout: &pipeline.uniform_layout,
            entries: &uniform_entries,
        });

        (texture_group, uniform_group)
    }

    fn encode_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        clear: wgpu::Color,
        (width, height): (u32, u32),
        pipeline: &SpecializedPipeline,
        texture_group: &wgpu::BindGroup,
        uniform_group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("kernel pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(&pipeline.pipeline);
        pass.set_bind_group(0, texture_group, &[]);
        pass.set_bind_group(1, uniform_group, &[]);
        pass.set_vertex_buffer(0, self.ctx.vertex_buffer().slice(..));
        pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
        pass.draw(0..quad::NUM_VERTICES, 0..1);
    }
}

/// The destination texture, if it can be rendered to.
fn check_target(dest: &Buffer) -> Result<&wgpu::Texture> {
    let texture = dest.texture();
    if texture.format() != BUFFER_FORMAT {
        return Err(ComputeError::IncompleteTarget(format!(
            "buffer {} has format {:?}",
            dest.id(),
            texture.format()
        )));
    }
    if !texture
        .usage()
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
    {
        return Err(ComputeError::IncompleteTarget(format!(
            "buffer {} is not renderable",
            dest.id()
        )));
    }
    Ok(texture)
}
