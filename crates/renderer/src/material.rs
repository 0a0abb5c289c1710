//! Materials: a compiled program plus its cached uniform and texture bindings.
//!
//! Uniform values are stored by name and only reach the device when
//! [`Material::apply_uniforms`] runs, so a material can be configured
//! before it is compiled and shared by any number of entities.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::device::{GraphicsDevice, ProgramHandle, ShaderInterface, TextureHandle, UniformLocation, UniformValue};
use crate::reflect::ShaderError;
use crate::texture::{PendingTexture, TextureData};

#[derive(Debug)]
struct TextureSlot {
    texture: TextureHandle,
    placeholder: bool,
    pending: Option<PendingTexture>,
}

#[derive(Debug)]
pub struct Material {
    label: String,
    source: String,
    program: Option<ProgramHandle>,
    interface: ShaderInterface,
    uniforms: BTreeMap<String, UniformValue>,
    textures: BTreeMap<String, TextureSlot>,
    /// Bound to every reflected sampler without a slot of its own.
    fallback: Option<TextureHandle>,
    warned: HashSet<String>,
}

impl Material {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            program: None,
            interface: ShaderInterface::default(),
            uniforms: BTreeMap::new(),
            textures: BTreeMap::new(),
            fallback: None,
            warned: HashSet::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The compiled program, `None` until [`Material::compile`] succeeds.
    pub fn program(&self) -> Option<ProgramHandle> {
        self.program
    }

    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    /// Compile the source and rebuild the location caches from reflection.
    ///
    /// On failure the material is left without a program and with empty
    /// caches; pending uniform values and textures are kept.
    pub fn compile(&mut self, gpu: &mut dyn GraphicsDevice) -> Result<(), ShaderError> {
        if let Some(old) = self.program.take() {
            gpu.release_program(old);
        }
        self.interface = ShaderInterface::default();
        self.warned.clear();

        let (program, interface) = gpu.compile_program(&self.label, &self.source)?;
        log::debug!(
            "Material '{}' compiled: {} uniforms, {} attributes, {} textures",
            self.label,
            interface.uniforms.len(),
            interface.attributes.len(),
            interface.samplers.len()
        );
        self.program = Some(program);
        self.interface = interface;
        Ok(())
    }

    pub fn uniform_locations(&self) -> &HashMap<String, UniformLocation> {
        &self.interface.uniforms
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.interface.uniforms.get(name).copied()
    }

    pub fn attribute_locations(&self) -> &HashMap<String, u32> {
        &self.interface.attributes
    }

    pub fn sampler_units(&self) -> &HashMap<String, u32> {
        &self.interface.samplers
    }

    /// Store a value for `name`, replacing any earlier one. No device call.
    pub fn set_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.into(), value.into());
    }

    /// Float-slice form; the arity picks the uniform type.
    pub fn set_uniform_slice(&mut self, name: impl Into<String>, values: &[f32]) {
        let name = name.into();
        match UniformValue::from_slice(values) {
            Some(value) => {
                self.uniforms.insert(name, value);
            }
            None => log::warn!(
                "Material '{}': uniform '{}' has unsupported arity {}",
                self.label,
                name,
                values.len()
            ),
        }
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }

    /// Flush every stored value to its location and bind every texture
    /// slot to its unit. Units with no slot get the placeholder, so nothing
    /// bound by an earlier material leaks into this draw. Unknown names and
    /// type mismatches are reported once and skipped.
    pub fn apply_uniforms(&mut self, gpu: &mut dyn GraphicsDevice) {
        if self.program.is_none() {
            return;
        }

        for (name, value) in &self.uniforms {
            match self.interface.uniforms.get(name) {
                Some(location) if location.kind == value.kind() => gpu.upload_uniform(*location, value),
                Some(location) => {
                    if self.warned.insert(name.clone()) {
                        log::warn!(
                            "Material '{}': uniform '{}' expects {:?}, got {:?}",
                            self.label,
                            name,
                            location.kind,
                            value.kind()
                        );
                    }
                }
                None => {
                    if self.warned.insert(name.clone()) {
                        log::warn!("Material '{}': no uniform named '{}'", self.label, name);
                    }
                }
            }
        }

        for (sampler, slot) in &self.textures {
            match self.interface.samplers.get(sampler) {
                Some(&unit) => gpu.bind_texture(unit, slot.texture),
                None => {
                    if self.warned.insert(sampler.clone()) {
                        log::warn!("Material '{}': no texture named '{}'", self.label, sampler);
                    }
                }
            }
        }

        for (sampler, &unit) in &self.interface.samplers {
            if self.textures.contains_key(sampler) {
                continue;
            }
            let fallback = *self
                .fallback
                .get_or_insert_with(|| gpu.create_texture(&TextureData::placeholder()));
            gpu.bind_texture(unit, fallback);
        }
    }

    /// Bind a placeholder to `sampler` now and decode `path` in the background.
    pub fn add_texture(&mut self, gpu: &mut dyn GraphicsDevice, path: impl Into<PathBuf>, sampler: impl Into<String>) {
        self.attach_texture(gpu, PendingTexture::spawn(path), sampler);
    }

    /// Like [`Material::add_texture`] with a caller-supplied load.
    pub fn attach_texture(&mut self, gpu: &mut dyn GraphicsDevice, pending: PendingTexture, sampler: impl Into<String>) {
        let sampler = sampler.into();
        let placeholder = gpu.create_texture(&TextureData::placeholder());
        let slot = TextureSlot {
            texture: placeholder,
            placeholder: true,
            pending: Some(pending),
        };
        if let Some(old) = self.textures.insert(sampler, slot) {
            gpu.release_texture(old.texture);
        }
    }

    /// Swap in every decode that has finished. Never blocks.
    /// Returns the number of loads that resolved, successfully or not.
    pub fn poll_textures(&mut self, gpu: &mut dyn GraphicsDevice) -> usize {
        let mut resolved = 0;
        for (sampler, slot) in self.textures.iter_mut() {
            let Some(result) = slot.pending.as_ref().and_then(|p| p.try_take()) else {
                continue;
            };
            slot.pending = None;
            resolved += 1;
            resolve_slot(gpu, &self.label, sampler, slot, result);
        }
        resolved
    }

    /// Block until every pending decode has completed or failed.
    pub fn finish_loading(&mut self, gpu: &mut dyn GraphicsDevice) {
        for (sampler, slot) in self.textures.iter_mut() {
            if let Some(pending) = slot.pending.take() {
                let result = pending.wait();
                resolve_slot(gpu, &self.label, sampler, slot, result);
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.textures.values().any(|slot| slot.pending.is_some())
    }

    /// The texture currently bound for `sampler` and whether it is the placeholder.
    pub fn texture(&self, sampler: &str) -> Option<(TextureHandle, bool)> {
        self.textures.get(sampler).map(|slot| (slot.texture, slot.placeholder))
    }

    /// Free the program and every texture this material owns.
    pub fn release(&mut self, gpu: &mut dyn GraphicsDevice) {
        if let Some(program) = self.program.take() {
            gpu.release_program(program);
        }
        for (_, slot) in std::mem::take(&mut self.textures) {
            gpu.release_texture(slot.texture);
        }
        if let Some(fallback) = self.fallback.take() {
            gpu.release_texture(fallback);
        }
        self.interface = ShaderInterface::default();
    }
}

fn resolve_slot(
    gpu: &mut dyn GraphicsDevice,
    label: &str,
    sampler: &str,
    slot: &mut TextureSlot,
    result: Result<TextureData, crate::texture::TextureError>,
) {
    match result {
        Ok(data) => {
            let texture = gpu.create_texture(&data);
            gpu.release_texture(slot.texture);
            slot.texture = texture;
            slot.placeholder = false;
            log::info!(
                "Material '{}': texture '{}' loaded ({}x{})",
                label,
                sampler,
                data.width,
                data.height
            );
        }
        Err(e) => log::error!("Material '{}': {}; keeping placeholder for '{}'", label, e, sampler),
    }
}
