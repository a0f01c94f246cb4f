//! Kernels
//!
//! A [`Kernel`] is a compiled fragment stage. It is reflected into a
//! [`KernelSignature`] and linked against the shared vertex stage once, at
//! creation, by building its off-screen pipeline. Further pipelines are built
//! on demand: one per slot assignment and target format, cached inside the
//! kernel.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::binding::{TargetKind, check_capacity};
use crate::buffer::BUFFER_FORMAT;
use crate::context::DeviceContext;
use crate::errors::{ComputeError, Result};
use crate::quad;
use crate::reflect::{self, KernelSignature};

static NEXT_KERNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Cache key of a specialized pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    /// Argument slot of each texture parameter, in declaration order.
    pub texture_slots: Vec<u32>,
    pub format: wgpu::TextureFormat,
}

/// A render pipeline built for one slot assignment.
pub(crate) struct SpecializedPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub texture_layout: wgpu::BindGroupLayout,
    pub uniform_layout: wgpu::BindGroupLayout,
}

/// A compiled, linked kernel. Reusable across any number of dispatches.
pub struct Kernel {
    id: u64,
    context_id: u64,
    label: String,
    source: String,
    module: naga::Module,
    signature: KernelSignature,
    pipelines: Mutex<FxHashMap<PipelineKey, Arc<SpecializedPipeline>>>,
}

impl Kernel {
    pub(crate) fn compile(ctx: &DeviceContext, label: &str, source: &str) -> Result<Self> {
        let module = reflect::parse(label, source)?;
        let signature = reflect::reflect(label, &module)?;
        let id = NEXT_KERNEL_ID.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "Compiled kernel '{label}' [{id}]: {} texture(s), {} uniform(s)",
            signature.textures().count(),
            signature.uniforms().count()
        );

        let kernel = Self {
            id,
            context_id: ctx.id(),
            label: label.to_string(),
            source: source.to_string(),
            module,
            signature,
            pipelines: Mutex::new(FxHashMap::default()),
        };
        kernel.link(ctx)?;
        Ok(kernel)
    }

    /// Builds the pipeline of an off-screen dispatch whose inputs are bound in
    /// declaration order, so link failures surface at creation.
    ///
    /// Kernels with more inputs than the context has free slots are left
    /// unlinked; every dispatch of them fails the capacity check.
    fn link(&self, ctx: &DeviceContext) -> Result<()> {
        let textures = self.signature.textures().count();
        let texture_slots: Vec<u32> = {
            let slots = ctx.lock_slots();
            if check_capacity(textures, TargetKind::OffScreen, slots.len()).is_err() {
                log::debug!(
                    "Kernel '{}' needs {textures} input slot(s), not linking",
                    self.label
                );
                return Ok(());
            }
            slots.input_slots().take(textures).collect()
        };
        self.pipeline(ctx, &texture_slots, BUFFER_FORMAT)?;
        Ok(())
    }

    /// Fetches or builds the pipeline for `texture_slots` rendering to `format`.
    pub(crate) fn pipeline(
        &self,
        ctx: &DeviceContext,
        texture_slots: &[u32],
        format: wgpu::TextureFormat,
    ) -> Result<Arc<SpecializedPipeline>> {
        let key = PipelineKey {
            texture_slots: texture_slots.to_vec(),
            format,
        };
        let mut pipelines = self.pipelines.lock();
        if let Some(pipeline) = pipelines.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let pipeline = Arc::new(self.build_pipeline(ctx, &key)?);
        pipelines.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }

    fn build_pipeline(&self, ctx: &DeviceContext, key: &PipelineKey) -> Result<SpecializedPipeline> {
        log::debug!(
            "Specializing kernel '{}' for slots {:?} ({:?})",
            self.label,
            key.texture_slots,
            key.format
        );
        let device = &ctx.device;

        let module = reflect::specialize(&self.module, &self.signature, &key.texture_slots);
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&self.label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
        });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = key
            .texture_slots
            .iter()
            .map(|&slot| wgpu::BindGroupLayoutEntry {
                binding: slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel textures"),
            entries: &texture_entries,
        });

        let uniform_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..self.signature.uniforms().count())
            .map(|ordinal| wgpu::BindGroupLayoutEntry {
                binding: ordinal as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel uniforms"),
            entries: &uniform_entries,
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&self.label),
            bind_group_layouts: &[&texture_layout, &uniform_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&self.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: ctx.vertex_shader(),
                entry_point: Some(quad::VERTEX_ENTRY_POINT),
                buffers: &[quad::vertex_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some(self.signature.fragment_entry_point()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        // Stage mismatches surface as device validation errors.
        ctx.check_device().map_err(|e| match e {
            ComputeError::Device(reason) => ComputeError::KernelLink {
                label: self.label.clone(),
                reason,
            },
            other => other,
        })?;

        Ok(SpecializedPipeline {
            pipeline,
            texture_layout,
            uniform_layout,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn signature(&self) -> &KernelSignature {
        &self.signature
    }

    #[must_use]
    pub fn fragment_entry_point(&self) -> &str {
        self.signature.fragment_entry_point()
    }

    /// Number of pipelines built so far.
    #[must_use]
    pub fn cached_pipelines(&self) -> usize {
        self.pipelines.lock().len()
    }

    pub(crate) fn context_id(&self) -> u64 {
        self.context_id
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}
