//! Argument Slots & Binding Tables
//!
//! The device offers a fixed number of argument slots (sampled texture
//! bindings per fragment stage). This module owns the bookkeeping around them:
//!
//! - [`SlotTable`]: which buffer occupies which slot, plus the scratch slot
//!   reserved for transfers. One table per context, guarded by the context.
//! - [`BindingTable`]: the caller's named inputs and scalar uniforms for one
//!   dispatch.
//! - [`BindingTable::resolve`]: capacity validation and slot assignment, done
//!   before any device command is recorded.
//!
//! ```rust,ignore
//! let bindings = BindingTable::new()
//!     .input("A", &a)
//!     .input("B", &b)
//!     .uniform("N", 64);
//! ```

use rustc_hash::FxHashSet;

use crate::buffer::Buffer;
use crate::errors::{ComputeError, Result};
use crate::kernel::Kernel;
use crate::reflect::{KernelSignature, ParameterKind};
use crate::settings::ScratchSlot;

// ---------------------------------------------------------------------------
// TargetKind
// ---------------------------------------------------------------------------

/// Where a dispatch writes its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Into a [`Buffer`] through a transient render target.
    OffScreen,
    /// Into the presentation surface (debug path).
    Surface,
}

impl TargetKind {
    /// Slots unavailable to inputs: the scratch slot, plus the destination
    /// when rendering off-screen.
    #[inline]
    #[must_use]
    pub fn reserved_slots(self) -> u32 {
        match self {
            Self::OffScreen => 2,
            Self::Surface => 1,
        }
    }
}

/// Fails when `inputs` buffers cannot be bound next to the reserved slots.
pub fn check_capacity(inputs: usize, target: TargetKind, available: u32) -> Result<()> {
    let reserved = target.reserved_slots();
    if inputs + reserved as usize > available as usize {
        return Err(ComputeError::TooManyInputs {
            inputs,
            reserved,
            available,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SlotTable
// ---------------------------------------------------------------------------

/// Explicit mirror of the device's argument slots.
///
/// Each entry holds the id of the buffer last bound there. A dispatch rebinds
/// every slot it uses; nothing is assumed to persist between dispatches.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<Option<u64>>,
    scratch: u32,
}

impl SlotTable {
    #[must_use]
    pub fn new(num_slots: u32, scratch: ScratchSlot) -> Self {
        Self {
            slots: vec![None; num_slots as usize],
            scratch: scratch.resolve(num_slots),
        }
    }

    /// Total number of slots, scratch included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn scratch(&self) -> u32 {
        self.scratch
    }

    pub fn bind(&mut self, slot: u32, buffer_id: u64) -> Result<()> {
        let available = self.len();
        let entry = self
            .slots
            .get_mut(slot as usize)
            .ok_or(ComputeError::SlotOutOfRange { slot, available })?;
        *entry = Some(buffer_id);
        Ok(())
    }

    /// Occupies the scratch slot for a transfer.
    pub fn bind_scratch(&mut self, buffer_id: u64) -> Result<()> {
        self.bind(self.scratch, buffer_id)
    }

    #[must_use]
    pub fn bound(&self, slot: u32) -> Option<u64> {
        self.slots.get(slot as usize).copied().flatten()
    }

    /// Clears every slot except the scratch slot.
    pub fn clear_inputs(&mut self) {
        let scratch = self.scratch as usize;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if index != scratch {
                *slot = None;
            }
        }
    }

    /// Forgets a buffer wherever it is bound.
    pub fn release(&mut self, buffer_id: u64) {
        for slot in &mut self.slots {
            if *slot == Some(buffer_id) {
                *slot = None;
            }
        }
    }

    /// Slots that may hold kernel inputs, in assignment order.
    pub fn input_slots(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).filter(move |&slot| slot != self.scratch)
    }
}

// ---------------------------------------------------------------------------
// Slot assignment
// ---------------------------------------------------------------------------

/// Result of matching caller bindings against a kernel signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Slot of each caller input, in caller order.
    pub input_slots: Vec<u32>,
    /// Slot of each texture parameter, in declaration order.
    pub texture_slots: Vec<u32>,
    /// Index into the caller's uniforms for each uniform parameter, in declaration order.
    pub uniform_sources: Vec<usize>,
}

/// Validates capacity and names, then assigns slots.
///
/// Input `i` receives the `i`-th slot of [`SlotTable::input_slots`].
pub fn assign(
    kernel_label: &str,
    signature: &KernelSignature,
    input_names: &[&str],
    uniform_names: &[&str],
    slots: &SlotTable,
    target: TargetKind,
) -> Result<Assignment> {
    check_capacity(input_names.len(), target, slots.len())?;

    let mut seen = FxHashSet::default();
    for name in input_names.iter().chain(uniform_names) {
        if !seen.insert(*name) {
            return Err(ComputeError::DuplicateParameter((*name).to_string()));
        }
    }

    let check_kind = |name: &str, bound: ParameterKind| -> Result<()> {
        let parameter = signature
            .get(name)
            .ok_or_else(|| ComputeError::UnknownParameter {
                kernel: kernel_label.to_string(),
                name: name.to_string(),
            })?;
        if parameter.kind != bound {
            return Err(ComputeError::ParameterKind {
                name: name.to_string(),
                expected: parameter.kind.describe(),
                found: bound.describe(),
            });
        }
        Ok(())
    };
    for name in input_names {
        check_kind(*name, ParameterKind::Texture)?;
    }
    for name in uniform_names {
        check_kind(*name, ParameterKind::Uniform)?;
    }

    let input_slots: Vec<u32> = slots.input_slots().take(input_names.len()).collect();

    let unbound = |name: &str| ComputeError::UnboundParameter {
        kernel: kernel_label.to_string(),
        name: name.to_string(),
    };
    let texture_slots = signature
        .textures()
        .map(|parameter| {
            input_names
                .iter()
                .position(|name| *name == parameter.name)
                .map(|index| input_slots[index])
                .ok_or_else(|| unbound(parameter.name.as_str()))
        })
        .collect::<Result<Vec<_>>>()?;
    let uniform_sources = signature
        .uniforms()
        .map(|parameter| {
            uniform_names
                .iter()
                .position(|name| *name == parameter.name)
                .ok_or_else(|| unbound(parameter.name.as_str()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Assignment {
        input_slots,
        texture_slots,
        uniform_sources,
    })
}

// ---------------------------------------------------------------------------
// BindingTable
// ---------------------------------------------------------------------------

/// Named arguments for one dispatch. Buffers are lent, not moved.
#[derive(Default)]
pub struct BindingTable<'a> {
    inputs: Vec<(String, &'a Buffer)>,
    uniforms: Vec<(String, i32)>,
}

/// A [`BindingTable`] matched against a kernel.
pub struct ResolvedBindings<'a> {
    /// `(slot, buffer)` for every input, in caller order.
    pub inputs: Vec<(u32, &'a Buffer)>,
    /// Slot of each texture parameter, in declaration order.
    pub texture_slots: Vec<u32>,
    /// Value of each uniform parameter, in declaration order.
    pub uniform_values: Vec<i32>,
}

impl<'a> BindingTable<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a buffer to a texture parameter.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, buffer: &'a Buffer) -> Self {
        self.push_input(name, buffer);
        self
    }

    /// Binds an integer to a uniform parameter.
    #[must_use]
    pub fn uniform(mut self, name: impl Into<String>, value: i32) -> Self {
        self.push_uniform(name, value);
        self
    }

    pub fn push_input(&mut self, name: impl Into<String>, buffer: &'a Buffer) {
        self.inputs.push((name.into(), buffer));
    }

    pub fn push_uniform(&mut self, name: impl Into<String>, value: i32) {
        self.uniforms.push((name.into(), value));
    }

    #[must_use]
    pub fn inputs(&self) -> &[(String, &'a Buffer)] {
        &self.inputs
    }

    #[must_use]
    pub fn uniforms(&self) -> &[(String, i32)] {
        &self.uniforms
    }

    /// Matches the table against `kernel` for a dispatch into `target`.
    pub fn resolve(
        &self,
        kernel: &Kernel,
        slots: &SlotTable,
        target: TargetKind,
    ) -> Result<ResolvedBindings<'a>> {
        let input_names: Vec<&str> = self.inputs.iter().map(|(name, _)| name.as_str()).collect();
        let uniform_names: Vec<&str> =
            self.uniforms.iter().map(|(name, _)| name.as_str()).collect();

        let assignment = assign(
            kernel.label(),
            kernel.signature(),
            &input_names,
            &uniform_names,
            slots,
            target,
        )?;

        Ok(ResolvedBindings {
            inputs: assignment
                .input_slots
                .iter()
                .zip(&self.inputs)
                .map(|(&slot, (_, buffer))| (slot, *buffer))
                .collect(),
            texture_slots: assignment.texture_slots,
            uniform_values: assignment
                .uniform_sources
                .iter()
                .map(|&index| self.uniforms[index].1)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect;

    const TWO_INPUTS: &str = r"
var A: texture_2d<f32>;
var B: texture_2d<f32>;
var<uniform> N: i32;

@fragment
fn fs_main(@builtin(position) p: vec4<f32>) -> @location(0) f32 {
    let c = vec2<i32>(p.xy);
    return textureLoad(A, c, 0).r + textureLoad(B, c, 0).r + f32(N);
}
";

    fn signature() -> KernelSignature {
        let module = reflect::parse("two_inputs", TWO_INPUTS).unwrap();
        reflect::reflect("two_inputs", &module).unwrap()
    }

    #[test]
    fn scratch_slot_is_never_an_input_slot() {
        let table = SlotTable::new(4, ScratchSlot::Highest);
        assert_eq!(table.input_slots().collect::<Vec<_>>(), [0, 1, 2]);

        let table = SlotTable::new(4, ScratchSlot::Fixed(0));
        assert_eq!(table.input_slots().collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn bind_out_of_range_slot_fails() {
        let mut table = SlotTable::new(2, ScratchSlot::Highest);
        assert!(table.bind(1, 7).is_ok());
        assert!(matches!(
            table.bind(2, 7),
            Err(ComputeError::SlotOutOfRange { slot: 2, available: 2 })
        ));
    }

    #[test]
    fn clear_inputs_keeps_scratch() {
        let mut table = SlotTable::new(3, ScratchSlot::Highest);
        table.bind(0, 1).unwrap();
        table.bind_scratch(9).unwrap();
        table.clear_inputs();
        assert_eq!(table.bound(0), None);
        assert_eq!(table.bound(2), Some(9));

        table.release(9);
        assert_eq!(table.bound(2), None);
    }

    #[test]
    fn capacity_counts_reserved_slots() {
        assert!(check_capacity(2, TargetKind::OffScreen, 4).is_ok());
        assert!(matches!(
            check_capacity(3, TargetKind::OffScreen, 4),
            Err(ComputeError::TooManyInputs { inputs: 3, reserved: 2, available: 4 })
        ));
        assert!(check_capacity(3, TargetKind::Surface, 4).is_ok());
        assert!(check_capacity(4, TargetKind::Surface, 4).is_err());
    }

    #[test]
    fn inputs_take_slots_in_caller_order() {
        let table = SlotTable::new(16, ScratchSlot::Highest);
        let assignment = assign(
            "k",
            &signature(),
            &["B", "A"],
            &["N"],
            &table,
            TargetKind::OffScreen,
        )
        .unwrap();

        assert_eq!(assignment.input_slots, [0, 1]);
        // A is declared first but bound second.
        assert_eq!(assignment.texture_slots, [1, 0]);
        assert_eq!(assignment.uniform_sources, [0]);
    }

    #[test]
    fn fixed_scratch_shifts_assignment() {
        let table = SlotTable::new(16, ScratchSlot::Fixed(0));
        let assignment = assign(
            "k",
            &signature(),
            &["A", "B"],
            &["N"],
            &table,
            TargetKind::OffScreen,
        )
        .unwrap();
        assert_eq!(assignment.texture_slots, [1, 2]);
    }

    #[test]
    fn capacity_is_checked_before_names() {
        let table = SlotTable::new(3, ScratchSlot::Highest);
        let err = assign(
            "k",
            &signature(),
            &["A", "missing"],
            &[],
            &table,
            TargetKind::OffScreen,
        )
        .unwrap_err();
        assert!(matches!(err, ComputeError::TooManyInputs { .. }), "{err}");
    }

    #[test]
    fn unknown_and_unbound_names_are_rejected() {
        let table = SlotTable::new(16, ScratchSlot::Highest);
        let sig = signature();

        let err = assign("k", &sig, &["A", "C"], &["N"], &table, TargetKind::OffScreen)
            .unwrap_err();
        assert!(matches!(err, ComputeError::UnknownParameter { ref name, .. } if name == "C"));

        let err = assign("k", &sig, &["A"], &["N"], &table, TargetKind::OffScreen).unwrap_err();
        assert!(matches!(err, ComputeError::UnboundParameter { ref name, .. } if name == "B"));

        let err = assign("k", &sig, &["A", "B"], &[], &table, TargetKind::OffScreen).unwrap_err();
        assert!(matches!(err, ComputeError::UnboundParameter { ref name, .. } if name == "N"));
    }

    #[test]
    fn kind_mismatch_and_duplicates_are_rejected() {
        let table = SlotTable::new(16, ScratchSlot::Highest);
        let sig = signature();

        let err = assign("k", &sig, &["A", "N"], &["B"], &table, TargetKind::OffScreen)
            .unwrap_err();
        assert!(matches!(err, ComputeError::ParameterKind { .. }), "{err}");

        let err = assign("k", &sig, &["A", "A"], &["N"], &table, TargetKind::OffScreen)
            .unwrap_err();
        assert!(matches!(err, ComputeError::DuplicateParameter(ref name) if name == "A"));
    }
}
