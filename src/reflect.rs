//! Kernel Reflection
//!
//! Parses kernel source with naga, checks that it links against the shared
//! vertex stage, and extracts the named parameters the dispatcher binds.
//!
//! Parameters are module-scope resources:
//!
//! | WGSL declaration                | [`ParameterKind`] | Bound with                  |
//! |---------------------------------|-------------------|-----------------------------|
//! | `var A: texture_2d<f32>;`       | `Texture`         | `BindingTable::input`       |
//! | `var<uniform> N: i32;`          | `Uniform`         | `BindingTable::uniform`     |
//!
//! `@group` / `@binding` attributes on parameters may be omitted. They are
//! overwritten per dispatch by [`specialize`].

use crate::errors::{ComputeError, Result};
use crate::quad::POINT_ATTRIBUTE;

/// Bind group holding texture parameters. Binding index = argument slot.
pub const TEXTURE_GROUP: u32 = 0;
/// Bind group holding uniform parameters. Binding index = uniform ordinal.
pub const UNIFORM_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// A `texture_2d<f32>` read with `textureLoad`.
    Texture,
    /// A `var<uniform>` of type `i32`.
    Uniform,
}

impl ParameterKind {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Texture => "buffer",
            Self::Uniform => "scalar uniform",
        }
    }
}

/// A named kernel parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    global: naga::Handle<naga::GlobalVariable>,
}

/// The reflected interface of a kernel: its parameters in declaration order
/// and the fragment entry point.
#[derive(Debug, Clone)]
pub struct KernelSignature {
    parameters: Vec<Parameter>,
    fragment_entry_point: String,
}

impl KernelSignature {
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Texture parameters in declaration order.
    pub fn textures(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Texture)
    }

    /// Uniform parameters in declaration order.
    pub fn uniforms(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(|p| p.kind == ParameterKind::Uniform)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    #[inline]
    #[must_use]
    pub fn fragment_entry_point(&self) -> &str {
        &self.fragment_entry_point
    }
}

/// Parses and validates kernel source.
///
/// Binding validation is skipped: parameters get their bindings at dispatch time.
pub fn parse(label: &str, source: &str) -> Result<naga::Module> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| ComputeError::KernelCompile {
            label: label.to_string(),
            diagnostic: e.emit_to_string(source),
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all() - naga::valid::ValidationFlags::BINDINGS,
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| ComputeError::KernelCompile {
            label: label.to_string(),
            diagnostic: e.emit_to_string(source),
        })?;

    Ok(module)
}

/// Checks the module against the shared vertex stage and collects its parameters.
pub fn reflect(label: &str, module: &naga::Module) -> Result<KernelSignature> {
    let link_error = |reason: String| ComputeError::KernelLink {
        label: label.to_string(),
        reason,
    };

    let fragments: Vec<_> = module
        .entry_points
        .iter()
        .filter(|ep| ep.stage == naga::ShaderStage::Fragment)
        .collect();
    let entry = match fragments.as_slice() {
        [entry] => *entry,
        [] => return Err(link_error("no @fragment entry point".to_string())),
        _ => {
            return Err(link_error(format!(
                "{} @fragment entry points, expected exactly one",
                fragments.len()
            )));
        }
    };

    for argument in &entry.function.arguments {
        if let Some(location) = consumed_location(module, argument) {
            return Err(link_error(format!(
                "fragment input at @location({location}) is not produced by the vertex stage"
            )));
        }
    }
    let Some(result) = &entry.function.result else {
        return Err(link_error(format!(
            "fragment entry point '{}' writes no output",
            entry.name
        )));
    };
    check_output(module, result).map_err(link_error)?;

    let mut parameters = Vec::new();
    for (handle, var) in module.global_variables.iter() {
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;

        let kind = match var.space {
            naga::AddressSpace::Handle => {
                if is_float_texture_2d(inner) {
                    ParameterKind::Texture
                } else {
                    return Err(ComputeError::UnsupportedParameter {
                        name,
                        reason: "only texture_2d<f32> resources can be bound".to_string(),
                    });
                }
            }
            naga::AddressSpace::Uniform => {
                if matches!(inner, naga::TypeInner::Scalar(scalar) if *scalar == naga::Scalar::I32)
                {
                    ParameterKind::Uniform
                } else {
                    return Err(ComputeError::UnsupportedParameter {
                        name,
                        reason: "uniforms must be a single i32".to_string(),
                    });
                }
            }
            naga::AddressSpace::Private
            | naga::AddressSpace::WorkGroup
            | naga::AddressSpace::Function => continue,
            _ => {
                return Err(ComputeError::UnsupportedParameter {
                    name,
                    reason: format!("address space {:?} cannot be bound", var.space),
                });
            }
        };

        if name == POINT_ATTRIBUTE {
            return Err(link_error(format!(
                "'{POINT_ATTRIBUTE}' is reserved by the vertex stage"
            )));
        }

        parameters.push(Parameter {
            name,
            kind,
            global: handle,
        });
    }

    Ok(KernelSignature {
        parameters,
        fragment_entry_point: entry.name.clone(),
    })
}

/// Returns a copy of `module` with every parameter bound for one dispatch.
///
/// `texture_slots[i]` is the argument slot of the `i`-th texture parameter.
#[must_use]
pub fn specialize(
    module: &naga::Module,
    signature: &KernelSignature,
    texture_slots: &[u32],
) -> naga::Module {
    let mut bindings = rustc_hash::FxHashMap::default();
    for (parameter, &slot) in signature.textures().zip(texture_slots) {
        bindings.insert(
            parameter.global,
            naga::ResourceBinding {
                group: TEXTURE_GROUP,
                binding: slot,
            },
        );
    }
    for (ordinal, parameter) in signature.uniforms().enumerate() {
        bindings.insert(
            parameter.global,
            naga::ResourceBinding {
                group: UNIFORM_GROUP,
                binding: ordinal as u32,
            },
        );
    }

    let mut module = module.clone();
    for (handle, var) in module.global_variables.iter_mut() {
        if let Some(binding) = bindings.get(&handle) {
            var.binding = Some(binding.clone());
        }
    }
    module
}

fn is_float_texture_2d(inner: &naga::TypeInner) -> bool {
    matches!(
        inner,
        naga::TypeInner::Image {
            dim: naga::ImageDimension::D2,
            arrayed: false,
            class: naga::ImageClass::Sampled {
                kind: naga::ScalarKind::Float,
                multi: false,
            },
        }
    )
}

/// The kernel must write one float color to `@location(0)`, the single
/// render target of every dispatch.
fn check_output(
    module: &naga::Module,
    result: &naga::FunctionResult,
) -> std::result::Result<(), String> {
    if let Some(binding) = &result.binding {
        return check_color_output(module, binding, result.ty);
    }
    let naga::TypeInner::Struct { members, .. } = &module.types[result.ty].inner else {
        return Err("fragment output has no @location".to_string());
    };
    let mut color = false;
    for member in members {
        match &member.binding {
            Some(naga::Binding::BuiltIn(_)) | None => {}
            Some(binding) => {
                check_color_output(module, binding, member.ty)?;
                color = true;
            }
        }
    }
    if color {
        Ok(())
    } else {
        Err("fragment output has no @location(0) member".to_string())
    }
}

fn check_color_output(
    module: &naga::Module,
    binding: &naga::Binding,
    ty: naga::Handle<naga::Type>,
) -> std::result::Result<(), String> {
    match binding {
        naga::Binding::Location { location: 0, .. } => {}
        naga::Binding::Location { location, .. } => {
            return Err(format!(
                "output at @location({location}) has no render target, only @location(0) is written"
            ));
        }
        naga::Binding::BuiltIn(builtin) => {
            return Err(format!("fragment output {builtin:?} is not a color"));
        }
    }
    let scalar = match &module.types[ty].inner {
        naga::TypeInner::Scalar(scalar) | naga::TypeInner::Vector { scalar, .. } => Some(*scalar),
        _ => None,
    };
    match scalar {
        Some(naga::Scalar {
            kind: naga::ScalarKind::Float,
            width: 4,
        }) => Ok(()),
        _ => Err("@location(0) output must be f32 or a vector of f32".to_string()),
    }
}

fn consumed_location(module: &naga::Module, argument: &naga::FunctionArgument) -> Option<u32> {
    match &argument.binding {
        Some(naga::Binding::Location { location, .. }) => Some(*location),
        Some(naga::Binding::BuiltIn(_)) => None,
        None => match &module.types[argument.ty].inner {
            naga::TypeInner::Struct { members, .. } => {
                members.iter().find_map(|member| match &member.binding {
                    Some(naga::Binding::Location { location, .. }) => Some(*location),
                    _ => None,
                })
            }
            _ => None,
        },
    }
}
