#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GPGPU compute through the rasterization pipeline.
//!
//! Buffers are single-channel float textures, kernels are fragment stages,
//! and a dispatch draws one full-surface quad into the destination so the
//! kernel runs once per cell.
//!
//! ```rust,ignore
//! use texcompute::prelude::*;
//!
//! let ctx = DeviceContext::new(ComputeSettings::default())?;
//! let kernel = ctx.create_kernel(texcompute::kernels::MATMUL_WGSL)?;
//!
//! let a = ctx.create_buffer(Some(&a_data), n * n, 1)?;
//! let b = ctx.create_buffer(Some(&b_data), n * n, 1)?;
//! let mut c = ctx.create_buffer(None, n * n, 1)?;
//!
//! let bindings = BindingTable::new().input("A", &a).input("B", &b).uniform("N", n as i32);
//! ctx.dispatcher().dispatch(&kernel, &bindings, &mut c)?;
//! let result = c.to_vec(&ctx)?;
//! ```

pub mod binding;
pub mod buffer;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod kernel;
pub mod kernels;
pub mod quad;
pub mod reference;
pub mod reflect;
pub mod settings;

pub use binding::{BindingTable, SlotTable, TargetKind};
pub use buffer::{BUFFER_FORMAT, Buffer};
pub use context::DeviceContext;
pub use dispatch::{DispatchReport, Dispatcher};
pub use errors::{ComputeError, Result};
pub use kernel::Kernel;
pub use kernels::RasterMatmul;
pub use reference::{DEFAULT_TOLERANCE, HostReference, MatmulExecutor, compare};
pub use reflect::{KernelSignature, Parameter, ParameterKind};
pub use settings::{ComputeSettings, ScratchSlot};

pub mod prelude {
    pub use crate::{
        BindingTable, Buffer, ComputeError, ComputeSettings, DeviceContext, DispatchReport,
        Dispatcher, HostReference, Kernel, MatmulExecutor, RasterMatmul, ScratchSlot,
    };
}
