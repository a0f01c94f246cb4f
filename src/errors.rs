//! Error Types
//!
//! This module defines the error type used throughout the crate.
//!
//! # Overview
//!
//! [`ComputeError`] covers every failure mode of the compute workspace:
//! - Device, adapter and surface failures
//! - Kernel compile and link failures (with the full diagnostic text)
//! - Capacity and precondition violations detected before any draw
//! - Device errors raised after a command was issued
//!
//! None of these are transient. A caller embedding the workspace is expected
//! to treat them as fatal (see [`ComputeError::is_fatal`]); the library itself
//! never aborts the process.
//!
//! ```rust,ignore
//! use texcompute::errors::{ComputeError, Result};
//!
//! fn run() -> Result<()> {
//!     let ctx = texcompute::DeviceContext::new(Default::default())?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the compute workspace.
#[derive(Error, Debug)]
pub enum ComputeError {
    // ========================================================================
    // Device & Context Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create or configure the presentation surface.
    #[error("Failed to create surface: {0}")]
    SurfaceCreateFailed(String),

    /// A second context was requested while one is still alive.
    #[error("A device context is already alive in this process")]
    ContextAlreadyLive,

    /// The visible-surface path was used on a headless context.
    #[error("The device context has no presentation surface")]
    NoSurface,

    /// Acquiring the next surface texture failed.
    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// A device command raised an error (validation, out-of-memory, internal).
    #[error("Device error: {0}")]
    Device(String),

    /// Mapping a staging buffer for read-back failed.
    #[error("Buffer map error: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    /// Waiting for the device to become idle failed.
    #[error("Device poll error: {0}")]
    Poll(#[from] wgpu::PollError),

    // ========================================================================
    // Kernel Errors
    // ========================================================================
    /// The kernel source failed to parse or validate.
    #[error("Kernel '{label}' failed to compile:\n{diagnostic}")]
    KernelCompile {
        /// Kernel label
        label: String,
        /// Compiler output, verbatim
        diagnostic: String,
    },

    /// The kernel does not fit the shared vertex stage or the dispatch model.
    #[error("Kernel '{label}' failed to link: {reason}")]
    KernelLink {
        /// Kernel label
        label: String,
        /// What the linker rejected
        reason: String,
    },

    /// A module-scope resource is neither a 2D float texture nor an `i32` uniform.
    #[error("Unsupported kernel parameter '{name}': {reason}")]
    UnsupportedParameter {
        /// Parameter name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    // ========================================================================
    // Capacity & Precondition Errors
    // ========================================================================
    /// More inputs were bound than there are free argument slots.
    #[error("Too many inputs: {inputs} inputs + {reserved} reserved slots > {available} argument slots")]
    TooManyInputs {
        /// Number of buffer inputs requested
        inputs: usize,
        /// Slots reserved for the destination and transfers
        reserved: u32,
        /// Argument slots offered by the device
        available: u32,
    },

    /// The destination cannot be used as a render target.
    #[error("Incomplete output target: {0}")]
    IncompleteTarget(String),

    /// An argument slot index is outside the slot table.
    #[error("Argument slot {slot} out of range (device has {available})")]
    SlotOutOfRange {
        /// Requested slot
        slot: u32,
        /// Argument slots offered by the device
        available: u32,
    },

    /// Buffer dimensions are zero or exceed the device limit.
    #[error("Invalid buffer shape {width}x{height} (max dimension {max})")]
    InvalidShape {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Maximum 2D texture dimension of the device
        max: u32,
    },

    /// A host array does not match the buffer it is copied to or from.
    #[error("Data length mismatch: expected {expected} values, got {actual}")]
    DataLength {
        /// Required number of values
        expected: usize,
        /// Supplied number of values
        actual: usize,
    },

    /// A dispatch was requested with zero iterations.
    #[error("Dispatch needs at least one iteration")]
    InvalidIterations,

    /// A resource created by another (possibly dropped) context was used.
    #[error("{kind} {id} belongs to context {owner}, not to context {current}")]
    ForeignResource {
        /// Resource kind ("buffer", "kernel")
        kind: &'static str,
        /// Resource id
        id: u64,
        /// Context that created it
        owner: u64,
        /// Context it was used with
        current: u64,
    },

    // ========================================================================
    // Binding Errors
    // ========================================================================
    /// A bound name is not a parameter of the kernel.
    #[error("Kernel '{kernel}' has no parameter named '{name}'")]
    UnknownParameter {
        /// Kernel label
        kernel: String,
        /// Bound name
        name: String,
    },

    /// A kernel parameter was left without a value.
    #[error("Kernel '{kernel}' parameter '{name}' is not bound")]
    UnboundParameter {
        /// Kernel label
        kernel: String,
        /// Parameter name
        name: String,
    },

    /// The same name was bound twice.
    #[error("Parameter '{0}' is bound more than once")]
    DuplicateParameter(String),

    /// A buffer was bound to a uniform parameter or a scalar to a texture.
    #[error("Parameter '{name}' expects a {expected}, got a {found}")]
    ParameterKind {
        /// Parameter name
        name: String,
        /// Declared kind
        expected: &'static str,
        /// Bound kind
        found: &'static str,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Two executors disagree beyond the tolerance.
    #[error("Result mismatch at {index}: expected {expected}, got {actual}")]
    ResultMismatch {
        /// Flat cell index
        index: usize,
        /// Reference value
        expected: f32,
        /// Compared value
        actual: f32,
    },
}

impl ComputeError {
    /// Returns `true` for conditions the workspace cannot continue after.
    ///
    /// Only [`ResultMismatch`](Self::ResultMismatch) is a data outcome rather
    /// than a failure of the device, the kernel or the caller's configuration.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ResultMismatch { .. })
    }
}

impl From<wgpu::CreateSurfaceError> for ComputeError {
    fn from(err: wgpu::CreateSurfaceError) -> Self {
        ComputeError::SurfaceCreateFailed(err.to_string())
    }
}

/// Alias for `Result<T, ComputeError>`.
pub type Result<T> = std::result::Result<T, ComputeError>;
