//! Device Context
//!
//! The [`DeviceContext`] holds the core GPU handles: device, queue, and the
//! optional presentation surface used by the debug path. It also owns the
//! pieces every kernel shares: the full-surface quad, the vertex stage, and
//! the argument slot table.
//!
//! At most one context is alive per process. It is an explicit object: create
//! it in the entry point and pass it by reference to every operation.
//!
//! ```rust,ignore
//! let ctx = DeviceContext::new(ComputeSettings::default())?;
//! let kernel = ctx.create_kernel(texcompute::kernels::MATMUL_WGSL)?;
//! let a = ctx.create_buffer(Some(&data), 4096, 1)?;
//! ```

use std::borrow::Cow;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use wgpu::util::DeviceExt;

use crate::binding::SlotTable;
use crate::buffer::{self, BUFFER_FORMAT, Buffer};
use crate::dispatch::Dispatcher;
use crate::errors::{ComputeError, Result};
use crate::kernel::Kernel;
use crate::quad;
use crate::settings::ComputeSettings;

static CONTEXT_ALIVE: AtomicBool = AtomicBool::new(false);
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Marks the single live context; released when the context drops.
struct LiveGuard;

impl LiveGuard {
    fn acquire() -> Result<Self> {
        CONTEXT_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| ComputeError::ContextAlreadyLive)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        CONTEXT_ALIVE.store(false, Ordering::Release);
    }
}

pub(crate) struct SurfaceState {
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

/// The single compute/display context.
pub struct DeviceContext {
    id: u64,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    surface: Option<SurfaceState>,

    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    settings: ComputeSettings,

    vertex_buffer: wgpu::Buffer,
    vertex_shader: wgpu::ShaderModule,

    slots: Arc<Mutex<SlotTable>>,
    errors: Arc<Mutex<Vec<String>>>,

    // Dropped last so no other context can start while handles are released.
    _live: LiveGuard,
}

impl DeviceContext {
    /// Creates a headless context, blocking until the device is ready.
    pub fn new(settings: ComputeSettings) -> Result<Self> {
        pollster::block_on(Self::new_async(settings))
    }

    pub async fn new_async(settings: ComputeSettings) -> Result<Self> {
        let live = LiveGuard::acquire()?;
        let instance = wgpu::Instance::default();
        Self::build(live, &instance, None, settings).await
    }

    /// Creates a context that can also present to `window`.
    pub fn with_window<W>(
        window: W,
        width: u32,
        height: u32,
        settings: ComputeSettings,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        pollster::block_on(Self::with_window_async(window, width, height, settings))
    }

    pub async fn with_window_async<W>(
        window: W,
        width: u32,
        height: u32,
        settings: ComputeSettings,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let live = LiveGuard::acquire()?;
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;
        Self::build(live, &instance, Some((surface, width, height)), settings).await
    }

    async fn build(
        live: LiveGuard,
        instance: &wgpu::Instance,
        surface: Option<(wgpu::Surface<'static>, u32, u32)>,
        settings: ComputeSettings,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: surface.as_ref().map(|(surface, _, _)| surface),
                force_fallback_adapter: settings.force_fallback_adapter,
            })
            .await
            .map_err(|e| ComputeError::AdapterRequestFailed(e.to_string()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Using adapter '{}' ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        // Downlevel adapters may not render to single-channel float targets.
        let format_features = adapter.get_texture_format_features(BUFFER_FORMAT);
        buffer::check_format_support(&format_features)?;
        let required_features = settings.required_features
            | (adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);

        // Argument slots are whatever the adapter offers, not the portable default.
        let required_limits = wgpu::Limits {
            max_sampled_textures_per_shader_stage: adapter
                .limits()
                .max_sampled_textures_per_shader_stage,
            ..settings.required_limits.clone()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("texcompute device"),
                required_features,
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            log::error!("Device error: {error}");
            sink.lock().push(error.to_string());
        }));

        let surface = match surface {
            Some((surface, width, height)) => {
                let mut config = surface
                    .get_default_config(&adapter, width.max(1), height.max(1))
                    .ok_or_else(|| {
                        ComputeError::SurfaceCreateFailed(
                            "Surface not supported by adapter".to_string(),
                        )
                    })?;
                config.present_mode = if settings.vsync {
                    wgpu::PresentMode::AutoVsync
                } else {
                    wgpu::PresentMode::AutoNoVsync
                };
                surface.configure(&device, &config);
                Some(SurfaceState { surface, config })
            }
            None => None,
        };

        // Every dispatch draws the same two triangles through the same vertex stage.
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("texcompute quad"),
            contents: bytemuck::cast_slice(&quad::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let vertex_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("texcompute vertex stage"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(quad::VERTEX_SHADER_WGSL)),
        });

        let limits = device.limits();
        let num_slots = settings.argument_slots(limits.max_sampled_textures_per_shader_stage);
        let slots = SlotTable::new(num_slots, settings.scratch_slot);
        log::debug!(
            "{num_slots} argument slots, scratch slot {}",
            slots.scratch()
        );

        let ctx = Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            device,
            queue,
            surface,
            adapter_info,
            limits,
            settings,
            vertex_buffer,
            vertex_shader,
            slots: Arc::new(Mutex::new(slots)),
            errors,
            _live: live,
        };
        ctx.check_device()?;
        Ok(ctx)
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    /// Compiles a kernel from fragment-stage source.
    pub fn create_kernel(&self, source: &str) -> Result<Kernel> {
        self.create_kernel_labeled("kernel", source)
    }

    pub fn create_kernel_labeled(&self, label: &str, source: &str) -> Result<Kernel> {
        Kernel::compile(self, label, source)
    }

    /// Allocates a `width × height` buffer, optionally filled from `data`.
    pub fn create_buffer(&self, data: Option<&[f32]>, width: u32, height: u32) -> Result<Buffer> {
        Buffer::create(self, data, width, height)
    }

    /// A dispatcher issuing draws on this context.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self)
    }

    // ========================================================================
    // Argument slots
    // ========================================================================

    /// Number of argument slots, scratch slot included.
    #[must_use]
    pub fn num_argument_slots(&self) -> u32 {
        self.slots.lock().len()
    }

    /// Slot reserved for buffer transfers.
    #[must_use]
    pub fn scratch_slot(&self) -> u32 {
        self.slots.lock().scratch()
    }

    /// Records `buffer` as bound to `slot`.
    pub fn bind_slot(&self, slot: u32, buffer: &Buffer) -> Result<()> {
        self.check_owner("buffer", buffer.id(), buffer.context_id())?;
        self.slots.lock().bind(slot, buffer.id())
    }

    /// Id of the buffer last bound to `slot`.
    #[must_use]
    pub fn bound_buffer(&self, slot: u32) -> Option<u64> {
        self.slots.lock().bound(slot)
    }

    pub(crate) fn lock_slots(&self) -> MutexGuard<'_, SlotTable> {
        self.slots.lock()
    }

    /// Handle buffers use to leave their slots when dropped.
    pub(crate) fn slot_table(&self) -> Weak<Mutex<SlotTable>> {
        Arc::downgrade(&self.slots)
    }

    // ========================================================================
    // Device state
    // ========================================================================

    /// Drains device errors raised since the last check.
    pub fn check_device(&self) -> Result<()> {
        let mut errors = self.errors.lock();
        if errors.is_empty() {
            return Ok(());
        }
        let message = errors.join("\n");
        errors.clear();
        Err(ComputeError::Device(message))
    }

    /// Blocks until every submitted command has finished.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }

    pub(crate) fn check_owner(&self, kind: &'static str, id: u64, owner: u64) -> Result<()> {
        if owner == self.id {
            Ok(())
        } else {
            Err(ComputeError::ForeignResource {
                kind,
                id,
                owner,
                current: self.id,
            })
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    #[must_use]
    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    #[must_use]
    pub fn settings(&self) -> &ComputeSettings {
        &self.settings
    }

    pub(crate) fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub(crate) fn vertex_shader(&self) -> &wgpu::ShaderModule {
        &self.vertex_shader
    }

    // ========================================================================
    // Surface
    // ========================================================================

    pub(crate) fn surface(&self) -> Result<&SurfaceState> {
        self.surface.as_ref().ok_or(ComputeError::NoSurface)
    }

    #[must_use]
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Current surface dimensions, if the context presents to a window.
    #[must_use]
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface
            .as_ref()
            .map(|state| (state.config.width, state.config.height))
    }

    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(state) = &mut self.surface {
            state.config.width = width;
            state.config.height = height;
            state.surface.configure(&self.device, &state.config);
        }
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("id", &self.id)
            .field("adapter", &self.adapter_info.name)
            .field("backend", &self.adapter_info.backend)
            .field("slots", &self.slots.try_lock().map(|slots| slots.len()))
            .field("surface", &self.surface_size())
            .finish_non_exhaustive()
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::debug!("Destroying device context {}", self.id);
    }
}
