//! Visible-surface debug path.
//!
//! Fills a buffer on the host, then redraws a kernel that colors it straight
//! into the window on every frame.
//!
//! ```text
//! cargo run --example window
//! ```

use std::sync::Arc;

use texcompute::prelude::*;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const FIELD_SIZE: u32 = 256;

const HEATMAP_WGSL: &str = r"
var Field: texture_2d<f32>;
var<uniform> Size: i32;

@fragment
fn fs_main(@builtin(position) p: vec4<f32>) -> @location(0) vec4<f32> {
    let c = vec2<i32>(p.xy) % vec2<i32>(Size, Size);
    let v = textureLoad(Field, c, 0).r;
    return vec4<f32>(v, 0.25, 1.0 - v, 1.0);
}
";

fn field() -> Vec<f32> {
    let size = FIELD_SIZE as usize;
    (0..size * size)
        .map(|i| {
            let (x, y) = ((i % size) as f32, (i / size) as f32);
            0.5 + 0.25 * ((x * 0.05).sin() + (y * 0.07).cos())
        })
        .collect()
}

struct Viewer {
    field: Option<Buffer>,
    kernel: Option<Kernel>,
    ctx: Option<DeviceContext>,
    window: Option<Arc<Window>>,
    error: Option<anyhow::Error>,
}

impl Viewer {
    fn new() -> Self {
        Self {
            field: None,
            kernel: None,
            ctx: None,
            window: None,
            error: None,
        }
    }

    fn init(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let size = window.inner_size();
        let ctx = DeviceContext::with_window(
            Arc::clone(&window),
            size.width,
            size.height,
            ComputeSettings::default(),
        )?;
        log::info!("Presenting through '{}'", ctx.adapter_info().name);

        self.field = Some(ctx.create_buffer(Some(&field()), FIELD_SIZE, FIELD_SIZE)?);
        self.kernel = Some(ctx.create_kernel_labeled("heatmap", HEATMAP_WGSL)?);
        self.ctx = Some(ctx);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&self) -> texcompute::Result<()> {
        let (Some(ctx), Some(kernel), Some(field)) = (&self.ctx, &self.kernel, &self.field) else {
            return Ok(());
        };
        let bindings = BindingTable::new()
            .input("Field", field)
            .uniform("Size", FIELD_SIZE as i32);
        ctx.dispatcher().present(kernel, &bindings)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal error: {error}");
        self.error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("texcompute")
            .with_inner_size(winit::dpi::LogicalSize::new(800.0, 600.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };
        if let Err(e) = self.init(Arc::clone(&window)) {
            return self.fail(event_loop, e);
        }
        window.request_redraw();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(ctx) = &mut self.ctx {
                    ctx.resize_surface(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(()) => {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
                // Lost or outdated surfaces recover on the next configure.
                Err(ComputeError::Surface(e)) => {
                    log::warn!("Skipping frame: {e}");
                    if let (Some(ctx), Some(window)) = (&mut self.ctx, &self.window) {
                        let size = window.inner_size();
                        ctx.resize_surface(size.width, size.height);
                        window.request_redraw();
                    }
                }
                Err(e) => self.fail(event_loop, e.into()),
            },
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut viewer = Viewer::new();
    event_loop.run_app(&mut viewer)?;

    match viewer.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
