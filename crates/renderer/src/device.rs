//! The graphics device surface that materials, scenes and the renderer
//! draw through.
//!
//! The interface is GL-shaped: select a program, upload uniforms to
//! reflected locations, bind textures to units, then issue an indexed draw.
//! [`crate::WgpuDevice`] maps it onto wgpu; [`crate::HeadlessDevice`]
//! records it.

use std::collections::HashMap;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::mesh::Geometry;
use crate::reflect::ShaderError;
use crate::texture::TextureData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Shape of a uniform slot as reported by shader reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    /// Size in bytes inside a uniform block.
    pub fn size(self) -> usize {
        match self {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
        }
    }
}

/// Where a uniform lives inside its program's uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// A value waiting to be flushed to a uniform location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    /// Build a value from a float slice, dispatching on its arity.
    /// Returns `None` for lengths other than 1, 2, 3, 4 or 16.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match *values {
            [x] => Some(Self::Float(x)),
            [x, y] => Some(Self::Vec2(Vec2::new(x, y))),
            [x, y, z] => Some(Self::Vec3(Vec3::new(x, y, z))),
            [x, y, z, w] => Some(Self::Vec4(Vec4::new(x, y, z, w))),
            _ if values.len() == 16 => Some(Self::Mat4(Mat4::from_cols_slice(values))),
            _ => None,
        }
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
            Self::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Write the value's bytes into `dst`, which must be at least
    /// `self.kind().size()` long.
    pub fn write_bytes(&self, dst: &mut [u8]) {
        let size = self.kind().size();
        match self {
            Self::Float(v) => dst[..size].copy_from_slice(bytemuck::bytes_of(v)),
            Self::Int(v) => dst[..size].copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => dst[..size].copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Vec3(v) => dst[..size].copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Vec4(v) => dst[..size].copy_from_slice(bytemuck::cast_slice(&v.to_array())),
            Self::Mat4(v) => dst[..size].copy_from_slice(bytemuck::cast_slice(&v.to_cols_array())),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        Self::Vec3(Vec3::from(v))
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        Self::Vec4(Vec4::from(v))
    }
}

/// Everything reflection learned about a compiled program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderInterface {
    /// Flattened uniform names (`view_pos`, `lights[2].diffuse`).
    pub uniforms: HashMap<String, UniformLocation>,
    /// Vertex input name to shader location.
    pub attributes: HashMap<String, u32>,
    /// Texture variable name to texture unit.
    pub samplers: HashMap<String, u32>,
    /// Byte size of the uniform block (0 when the program has none).
    pub uniform_block_size: u32,
}

/// Backend that can compile programs, own GPU buffers and draw.
pub trait GraphicsDevice {
    /// Compile and link a WGSL module with `vs_main`/`fs_main` entry points.
    fn compile_program(&mut self, label: &str, source: &str) -> Result<(ProgramHandle, ShaderInterface), ShaderError>;
    fn release_program(&mut self, program: ProgramHandle);

    fn create_mesh(&mut self, geometry: &Geometry) -> MeshHandle;
    fn release_mesh(&mut self, mesh: MeshHandle);

    fn create_texture(&mut self, data: &TextureData) -> TextureHandle;
    fn release_texture(&mut self, texture: TextureHandle);

    /// Select the program subsequent uploads and draws apply to.
    fn use_program(&mut self, program: ProgramHandle);
    fn upload_uniform(&mut self, location: UniformLocation, value: &UniformValue);
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);
    fn draw_indexed(&mut self, mesh: MeshHandle, index_count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_dispatch_by_arity() {
        assert_eq!(UniformValue::from_slice(&[1.0]), Some(UniformValue::Float(1.0)));
        assert_eq!(UniformValue::from_slice(&[1.0, 2.0]).map(|v| v.kind()), Some(UniformKind::Vec2));
        assert_eq!(UniformValue::from_slice(&[1.0, 2.0, 3.0]).map(|v| v.kind()), Some(UniformKind::Vec3));
        assert_eq!(UniformValue::from_slice(&[0.0; 4]).map(|v| v.kind()), Some(UniformKind::Vec4));
        assert_eq!(UniformValue::from_slice(&[0.0; 16]).map(|v| v.kind()), Some(UniformKind::Mat4));
        assert_eq!(UniformValue::from_slice(&[0.0; 5]), None);
        assert_eq!(UniformValue::from_slice(&[]), None);
    }

    #[test]
    fn vec3_writes_twelve_bytes() {
        let mut buf = [0xffu8; 16];
        UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)).write_bytes(&mut buf);
        let floats: [f32; 3] = bytemuck::pod_read_unaligned(&buf[..12]);
        assert_eq!(floats, [1.0, 2.0, 3.0]);
        assert_eq!(&buf[12..], &[0xff; 4]);
    }

    #[test]
    fn matrices_are_written_column_major() {
        let m = Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0));
        let mut buf = [0u8; 64];
        UniformValue::from(m).write_bytes(&mut buf);
        let floats: [f32; 16] = bytemuck::pod_read_unaligned(&buf);
        assert_eq!(floats[12..15], [7.0, 8.0, 9.0]);
    }
}
