//! WGSL validation and interface reflection.
//!
//! Programs follow one resource layout:
//! - a single uniform block at `@group(0) @binding(0)`
//! - texture unit `k` at `@group(1) @binding(2k)`, its sampler at `@binding(2k + 1)`
//! - vertex inputs at location 0 (position), 1 (normal), 2 (tex coords)

use std::collections::{BTreeMap, HashMap};

use naga::{AddressSpace, ArraySize, Binding, Module, Scalar, ScalarKind, ShaderStage, TypeInner, VectorSize};
use thiserror::Error;

use crate::device::{ShaderInterface, UniformKind, UniformLocation};

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

const UNIFORM_GROUP: u32 = 0;
const TEXTURE_GROUP: u32 = 1;

/// Vertex input kinds by location, matching [`crate::Vertex`].
const VERTEX_INPUTS: [UniformKind; 3] = [UniformKind::Vec3, UniformKind::Vec3, UniformKind::Vec2];

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to parse shader `{label}`:\n{message}")]
    Parse { label: String, message: String },
    #[error("shader `{label}` failed validation: {message}")]
    Validation { label: String, message: String },
    #[error("shader `{label}` has no {stage} entry point `{entry}`")]
    MissingEntryPoint {
        label: String,
        stage: &'static str,
        entry: &'static str,
    },
    #[error("shader `{label}` uses an unsupported resource layout: {reason}")]
    Layout { label: String, reason: String },
    #[error("device rejected shader `{label}`: {message}")]
    Device { label: String, message: String },
}

/// Parse, validate and reflect a WGSL program.
pub fn reflect_wgsl(label: &str, source: &str) -> Result<ShaderInterface, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
        label: label.to_string(),
        message: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::empty())
        .validate(&module)
        .map_err(|e| ShaderError::Validation {
            label: label.to_string(),
            message: e.as_inner().to_string(),
        })?;

    let layout_err = |reason: String| ShaderError::Layout {
        label: label.to_string(),
        reason,
    };

    let mut interface = ShaderInterface::default();
    let mut uniform_block_seen = false;
    let mut textures: BTreeMap<u32, String> = BTreeMap::new();
    let mut samplers: BTreeMap<u32, String> = BTreeMap::new();

    for (_, var) in module.global_variables.iter() {
        let name = var.name.clone().unwrap_or_default();
        match var.space {
            AddressSpace::Uniform => {
                let binding = var.binding.as_ref().map(|b| (b.group, b.binding));
                if binding != Some((UNIFORM_GROUP, 0)) {
                    return Err(layout_err(format!(
                        "uniform `{name}` must be bound at @group({UNIFORM_GROUP}) @binding(0)"
                    )));
                }
                if uniform_block_seen {
                    return Err(layout_err("more than one uniform block".to_string()));
                }
                uniform_block_seen = true;

                let ty = &module.types[var.ty];
                let prefix = match ty.inner {
                    TypeInner::Struct { .. } => String::new(),
                    _ => name,
                };
                flatten_uniforms(&module, var.ty, 0, &prefix, &mut interface.uniforms);
                interface.uniform_block_size = ty.inner.size(module.to_ctx());
            }
            AddressSpace::Handle => {
                let Some(binding) = var.binding.as_ref() else {
                    continue;
                };
                if binding.group != TEXTURE_GROUP {
                    return Err(layout_err(format!(
                        "`{name}` must live in @group({TEXTURE_GROUP})"
                    )));
                }
                match module.types[var.ty].inner {
                    TypeInner::Image { .. } if binding.binding % 2 == 0 => {
                        textures.insert(binding.binding / 2, name);
                    }
                    TypeInner::Sampler { .. } if binding.binding % 2 == 1 => {
                        samplers.insert(binding.binding / 2, name);
                    }
                    _ => {
                        return Err(layout_err(format!(
                            "`{name}` at @binding({}) breaks the texture/sampler pairing",
                            binding.binding
                        )))
                    }
                }
            }
            AddressSpace::Storage { .. } | AddressSpace::PushConstant => {
                return Err(layout_err(format!("`{name}` uses an unsupported address space")));
            }
            _ => {}
        }
    }

    for (index, unit) in textures.keys().enumerate() {
        if *unit != index as u32 {
            return Err(layout_err(format!("texture units must be contiguous from 0, found unit {unit}")));
        }
        if !samplers.contains_key(unit) {
            return Err(layout_err(format!("texture unit {unit} has no sampler")));
        }
    }
    if let Some(unit) = samplers.keys().find(|u| !textures.contains_key(u)) {
        return Err(layout_err(format!("sampler for unit {unit} has no texture")));
    }
    interface.samplers = textures.into_iter().map(|(unit, name)| (name, unit)).collect();

    find_entry(&module, label, ShaderStage::Vertex, VERTEX_ENTRY)?;
    find_entry(&module, label, ShaderStage::Fragment, FRAGMENT_ENTRY)?;
    interface.attributes = vertex_attributes(&module).map_err(layout_err)?;

    Ok(interface)
}

fn find_entry<'m>(
    module: &'m Module,
    label: &str,
    stage: ShaderStage,
    entry: &'static str,
) -> Result<&'m naga::EntryPoint, ShaderError> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == entry)
        .ok_or_else(|| ShaderError::MissingEntryPoint {
            label: label.to_string(),
            stage: match stage {
                ShaderStage::Vertex => "vertex",
                ShaderStage::Fragment => "fragment",
                _ => "compute",
            },
            entry,
        })
}

fn flatten_uniforms(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    base_offset: u32,
    prefix: &str,
    out: &mut HashMap<String, UniformLocation>,
) {
    match module.types[ty].inner {
        TypeInner::Struct { ref members, .. } => {
            for member in members {
                let Some(name) = member.name.as_deref() else {
                    continue;
                };
                let path = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten_uniforms(module, member.ty, base_offset + member.offset, &path, out);
            }
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => {
            for i in 0..count.get() {
                flatten_uniforms(module, base, base_offset + i * stride, &format!("{prefix}[{i}]"), out);
            }
        }
        ref inner => match leaf_kind(inner) {
            Some(kind) => {
                out.insert(
                    prefix.to_string(),
                    UniformLocation {
                        offset: base_offset,
                        kind,
                    },
                );
            }
            None => log::debug!("Uniform `{}` has no settable kind; skipped", prefix),
        },
    }
}

fn leaf_kind(inner: &TypeInner) -> Option<UniformKind> {
    const F32: Scalar = Scalar {
        kind: ScalarKind::Float,
        width: 4,
    };
    const I32: Scalar = Scalar {
        kind: ScalarKind::Sint,
        width: 4,
    };
    match *inner {
        TypeInner::Scalar(s) if s == F32 => Some(UniformKind::Float),
        TypeInner::Scalar(s) if s == I32 => Some(UniformKind::Int),
        TypeInner::Vector { size, scalar } if scalar == F32 => Some(match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        }),
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == F32 => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn vertex_attributes(module: &Module) -> Result<HashMap<String, u32>, String> {
    let mut attributes = HashMap::new();
    let Some(entry) = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == ShaderStage::Vertex && ep.name == VERTEX_ENTRY)
    else {
        return Ok(attributes);
    };

    let mut record = |name: Option<&str>, ty: naga::Handle<naga::Type>, location: u32| -> Result<(), String> {
        let name = name.unwrap_or("").to_string();
        let expected = VERTEX_INPUTS
            .get(location as usize)
            .ok_or_else(|| format!("vertex input `{name}` uses location {location}; only 0..=2 are provided"))?;
        if leaf_kind(&module.types[ty].inner) != Some(*expected) {
            return Err(format!("vertex input `{name}` at location {location} must be {expected:?}"));
        }
        attributes.insert(name, location);
        Ok(())
    };

    for arg in &entry.function.arguments {
        match arg.binding {
            Some(Binding::Location { location, .. }) => record(arg.name.as_deref(), arg.ty, location)?,
            Some(Binding::BuiltIn(_)) => {}
            None => {
                if let TypeInner::Struct { ref members, .. } = module.types[arg.ty].inner {
                    for member in members {
                        if let Some(Binding::Location { location, .. }) = member.binding {
                            record(member.name.as_deref(), member.ty, location)?;
                        }
                    }
                }
            }
        }
    }
    Ok(attributes)
}
