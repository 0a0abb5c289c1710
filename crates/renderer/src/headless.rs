//! A [`GraphicsDevice`] that needs no GPU.
//!
//! Programs go through the same WGSL reflection as the wgpu backend, so
//! shader sources are fully validated. Every call is recorded for tests
//! and tooling to inspect.

use std::collections::HashMap;

use crate::device::{
    GraphicsDevice, MeshHandle, ProgramHandle, ShaderInterface, TextureHandle, UniformLocation, UniformValue,
};
use crate::mesh::Geometry;
use crate::reflect::{reflect_wgsl, ShaderError};
use crate::texture::TextureData;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CompileProgram { program: ProgramHandle, label: String },
    ReleaseProgram(ProgramHandle),
    CreateMesh { mesh: MeshHandle, index_count: u32 },
    ReleaseMesh(MeshHandle),
    CreateTexture { texture: TextureHandle, width: u32, height: u32 },
    ReleaseTexture(TextureHandle),
    UseProgram(ProgramHandle),
    UploadUniform { location: UniformLocation, value: UniformValue },
    BindTexture { unit: u32, texture: TextureHandle },
    DrawIndexed { program: Option<ProgramHandle>, mesh: MeshHandle, index_count: u32 },
}

#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_id: u32,
    calls: Vec<DeviceCall>,
    programs: HashMap<ProgramHandle, ShaderInterface>,
    meshes: HashMap<MeshHandle, u32>,
    textures: HashMap<TextureHandle, (u32, u32)>,
    current: Option<ProgramHandle>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> Vec<(Option<ProgramHandle>, MeshHandle, u32)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DrawIndexed {
                    program,
                    mesh,
                    index_count,
                } => Some((*program, *mesh, *index_count)),
                _ => None,
            })
            .collect()
    }

    pub fn uniform_uploads(&self) -> Vec<(UniformLocation, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::UploadUniform { location, value } => Some((*location, *value)),
                _ => None,
            })
            .collect()
    }

    pub fn bound_textures(&self) -> Vec<(u32, TextureHandle)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::BindTexture { unit, texture } => Some((*unit, *texture)),
                _ => None,
            })
            .collect()
    }

    pub fn released_meshes(&self) -> Vec<MeshHandle> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::ReleaseMesh(mesh) => Some(*mesh),
                _ => None,
            })
            .collect()
    }

    pub fn released_textures(&self) -> Vec<TextureHandle> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::ReleaseTexture(texture) => Some(*texture),
                _ => None,
            })
            .collect()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn interface(&self, program: ProgramHandle) -> Option<&ShaderInterface> {
        self.programs.get(&program)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn compile_program(&mut self, label: &str, source: &str) -> Result<(ProgramHandle, ShaderInterface), ShaderError> {
        let interface = reflect_wgsl(label, source)?;
        let program = ProgramHandle(self.next());
        self.programs.insert(program, interface.clone());
        self.calls.push(DeviceCall::CompileProgram {
            program,
            label: label.to_string(),
        });
        Ok((program, interface))
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            log::warn!("Release of unknown program {:?}", program);
        }
        if self.current == Some(program) {
            self.current = None;
        }
        self.calls.push(DeviceCall::ReleaseProgram(program));
    }

    fn create_mesh(&mut self, geometry: &Geometry) -> MeshHandle {
        let mesh = MeshHandle(self.next());
        self.meshes.insert(mesh, geometry.index_count());
        self.calls.push(DeviceCall::CreateMesh {
            mesh,
            index_count: geometry.index_count(),
        });
        mesh
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        if self.meshes.remove(&mesh).is_none() {
            log::warn!("Release of unknown mesh {:?}", mesh);
        }
        self.calls.push(DeviceCall::ReleaseMesh(mesh));
    }

    fn create_texture(&mut self, data: &TextureData) -> TextureHandle {
        let texture = TextureHandle(self.next());
        self.textures.insert(texture, (data.width, data.height));
        self.calls.push(DeviceCall::CreateTexture {
            texture,
            width: data.width,
            height: data.height,
        });
        texture
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("Release of unknown texture {:?}", texture);
        }
        self.calls.push(DeviceCall::ReleaseTexture(texture));
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current = Some(program);
        self.calls.push(DeviceCall::UseProgram(program));
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.calls.push(DeviceCall::UploadUniform { location, value: *value });
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        self.calls.push(DeviceCall::BindTexture { unit, texture });
    }

    fn draw_indexed(&mut self, mesh: MeshHandle, index_count: u32) {
        self.calls.push(DeviceCall::DrawIndexed {
            program: self.current,
            mesh,
            index_count,
        });
    }
}
