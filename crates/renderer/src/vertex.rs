//! Vertex type and buffer layout.

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex matching the shader inputs at locations 0, 1 and 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coords,
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_tightly_packed() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 32);
        let offsets: Vec<_> = layout.attributes.iter().map(|a| (a.shader_location, a.offset)).collect();
        assert_eq!(offsets, vec![(0, 0), (1, 12), (2, 24)]);
    }
}
