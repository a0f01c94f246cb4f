//! Compute Settings
//!
//! [`ComputeSettings`] is consumed once by [`DeviceContext`](crate::DeviceContext)
//! construction. It selects the adapter, the device limits, and the argument
//! slot policy used by every dispatch on that context.
//!
//! ```rust,ignore
//! use texcompute::{ComputeSettings, ScratchSlot};
//!
//! // Pretend the device offers only eight argument slots, keep slot 0 for transfers.
//! let settings = ComputeSettings {
//!     argument_slot_limit: Some(8),
//!     scratch_slot: ScratchSlot::Fixed(0),
//!     ..Default::default()
//! };
//! ```

// ---------------------------------------------------------------------------
// ScratchSlot
// ---------------------------------------------------------------------------

/// Which argument slot is reserved for buffer uploads and read-backs.
///
/// The reserved slot is never assigned to a kernel input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScratchSlot {
    /// The highest-indexed slot the device offers.
    #[default]
    Highest,
    /// A fixed slot index. Clamped to the highest slot on smaller devices.
    Fixed(u32),
}

impl ScratchSlot {
    /// Resolves the policy against a slot table of `num_slots` entries.
    #[inline]
    #[must_use]
    pub fn resolve(self, num_slots: u32) -> u32 {
        let highest = num_slots.saturating_sub(1);
        match self {
            Self::Highest => highest,
            Self::Fixed(slot) => slot.min(highest),
        }
    }
}

// ---------------------------------------------------------------------------
// ComputeSettings
// ---------------------------------------------------------------------------

/// Configuration for device context initialization.
///
/// | Field                    | Description                                   | Default           |
/// |--------------------------|-----------------------------------------------|-------------------|
/// | `power_preference`       | GPU adapter selection strategy                | `HighPerformance` |
/// | `force_fallback_adapter` | Use the software adapter                      | `false`           |
/// | `required_features`      | Required wgpu features                        | Empty             |
/// | `required_limits`        | Required wgpu limits                          | Default           |
/// | `vsync`                  | Vertical sync on the debug surface            | `true`            |
/// | `argument_slot_limit`    | Cap on the argument slots the device reports  | `None`            |
/// | `scratch_slot`           | Slot reserved for transfers                   | `Highest`         |
/// | `clear_value`            | Destination value before each iteration      | `0.0`             |
#[derive(Debug, Clone)]
pub struct ComputeSettings {
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Request the fallback (software) adapter.
    pub force_fallback_adapter: bool,

    /// Required wgpu features that must be supported by the adapter.
    pub required_features: wgpu::Features,

    /// Required wgpu limits.
    pub required_limits: wgpu::Limits,

    /// Enable vertical synchronization on the presentation surface.
    pub vsync: bool,

    /// Upper bound on the number of argument slots used by the workspace.
    ///
    /// `None` uses the device's `max_sampled_textures_per_shader_stage`.
    pub argument_slot_limit: Option<u32>,

    /// Slot reserved for buffer transfers.
    pub scratch_slot: ScratchSlot,

    /// Value written to every destination cell before each iteration.
    pub clear_value: f64,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            vsync: true,
            argument_slot_limit: None,
            scratch_slot: ScratchSlot::Highest,
            clear_value: 0.0,
        }
    }
}

impl ComputeSettings {
    /// Number of argument slots available given the device's own limit.
    ///
    /// Never below one: the scratch slot always exists.
    #[inline]
    #[must_use]
    pub fn argument_slots(&self, device_slots: u32) -> u32 {
        let slots = match self.argument_slot_limit {
            Some(limit) => limit.min(device_slots),
            None => device_slots,
        };
        slots.max(1)
    }
}
