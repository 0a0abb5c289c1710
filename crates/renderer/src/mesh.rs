//! Geometry data, primitive generation and reference-counted mesh storage.

use std::collections::HashMap;

use crate::device::{GraphicsDevice, MeshHandle};
use crate::vertex::Vertex;
use wgpu::util::DeviceExt;

/// CPU-side geometry in flat arrays: 3 floats per position and normal,
/// 2 per texture coordinate, triangle-list indices.
///
/// Normals and texture coordinates may be empty; missing entries default
/// to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub tex_coords: Vec<f32>,
    pub indices: Vec<u32>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Interleave into [`Vertex`] records.
    pub fn to_vertices(&self) -> Vec<Vertex> {
        (0..self.vertex_count())
            .map(|i| {
                let position = [self.positions[i * 3], self.positions[i * 3 + 1], self.positions[i * 3 + 2]];
                let normal = match self.normals.get(i * 3..i * 3 + 3) {
                    Some(n) => [n[0], n[1], n[2]],
                    None => [0.0; 3],
                };
                let tex_coords = match self.tex_coords.get(i * 2..i * 2 + 2) {
                    Some(t) => [t[0], t[1]],
                    None => [0.0; 2],
                };
                Vertex::new(position, normal, tex_coords)
            })
            .collect()
    }

    fn push(&mut self, v: Vertex) {
        self.positions.extend_from_slice(&v.position);
        self.normals.extend_from_slice(&v.normal);
        self.tex_coords.extend_from_slice(&v.tex_coords);
    }

    fn from_vertices(vertices: &[Vertex], indices: &[u32]) -> Self {
        let mut geometry = Self::default();
        for v in vertices {
            geometry.push(*v);
        }
        geometry.indices = indices.to_vec();
        geometry
    }

    /// Cube of edge `size` centered at the origin.
    pub fn cube(size: f32) -> Self {
        let h = size / 2.0;
        let vertices = [
            // Front face
            Vertex::new([-h, -h, h], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([h, -h, h], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([h, h, h], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-h, h, h], [0.0, 0.0, 1.0], [0.0, 0.0]),
            // Back face
            Vertex::new([h, -h, -h], [0.0, 0.0, -1.0], [0.0, 1.0]),
            Vertex::new([-h, -h, -h], [0.0, 0.0, -1.0], [1.0, 1.0]),
            Vertex::new([-h, h, -h], [0.0, 0.0, -1.0], [1.0, 0.0]),
            Vertex::new([h, h, -h], [0.0, 0.0, -1.0], [0.0, 0.0]),
            // Top face
            Vertex::new([-h, h, h], [0.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex::new([h, h, h], [0.0, 1.0, 0.0], [1.0, 1.0]),
            Vertex::new([h, h, -h], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-h, h, -h], [0.0, 1.0, 0.0], [0.0, 0.0]),
            // Bottom face
            Vertex::new([-h, -h, -h], [0.0, -1.0, 0.0], [0.0, 1.0]),
            Vertex::new([h, -h, -h], [0.0, -1.0, 0.0], [1.0, 1.0]),
            Vertex::new([h, -h, h], [0.0, -1.0, 0.0], [1.0, 0.0]),
            Vertex::new([-h, -h, h], [0.0, -1.0, 0.0], [0.0, 0.0]),
            // Right face
            Vertex::new([h, -h, h], [1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([h, -h, -h], [1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([h, h, -h], [1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([h, h, h], [1.0, 0.0, 0.0], [0.0, 0.0]),
            // Left face
            Vertex::new([-h, -h, -h], [-1.0, 0.0, 0.0], [0.0, 1.0]),
            Vertex::new([-h, -h, h], [-1.0, 0.0, 0.0], [1.0, 1.0]),
            Vertex::new([-h, h, h], [-1.0, 0.0, 0.0], [1.0, 0.0]),
            Vertex::new([-h, h, -h], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        ];

        #[rustfmt::skip]
        let indices: [u32; 36] = [
            0, 1, 2, 2, 3, 0,       // Front
            4, 5, 6, 6, 7, 4,       // Back
            8, 9, 10, 10, 11, 8,    // Top
            12, 13, 14, 14, 15, 12, // Bottom
            16, 17, 18, 18, 19, 16, // Right
            20, 21, 22, 22, 23, 20, // Left
        ];

        Self::from_vertices(&vertices, &indices)
    }

    /// Square in the XY plane facing +Z with half-extent `half`.
    pub fn quad(half: f32) -> Self {
        let vertices = [
            Vertex::new([-half, -half, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            Vertex::new([half, -half, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([half, half, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([-half, half, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        ];
        let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
        Self::from_vertices(&vertices, &indices)
    }
}

/// A GPU mesh with vertex and index buffers.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

impl GpuMesh {
    /// Upload geometry. Empty geometry still gets valid (one-element) buffers.
    pub fn new(device: &wgpu::Device, geometry: &Geometry) -> Self {
        let mut vertices = geometry.to_vertices();
        if vertices.is_empty() {
            vertices.push(Vertex::new([0.0; 3], [0.0; 3], [0.0; 2]));
        }
        let indices: &[u32] = if geometry.indices.is_empty() { &[0] } else { &geometry.indices };

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: geometry.index_count(),
        }
    }
}

/// Identifier for a mesh registered in a [`MeshStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(u32);

#[derive(Debug)]
struct MeshEntry {
    handle: MeshHandle,
    index_count: u32,
    refs: u32,
}

/// Uploaded meshes shared by any number of entities.
///
/// Each holder owns one reference. When the count reaches zero the GPU
/// handle moves to the release queue, so buffers are freed exactly once.
#[derive(Debug, Default)]
pub struct MeshStore {
    entries: HashMap<MeshId, MeshEntry>,
    next_id: u32,
    released: Vec<MeshHandle>,
}

impl MeshStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload geometry. The caller holds the first reference.
    pub fn upload(&mut self, gpu: &mut dyn GraphicsDevice, geometry: &Geometry) -> MeshId {
        let handle = gpu.create_mesh(geometry);
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            MeshEntry {
                handle,
                index_count: geometry.index_count(),
                refs: 1,
            },
        );
        id
    }

    /// Add a reference. Returns false if the mesh is unknown.
    pub fn retain(&mut self, id: MeshId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference; queues the GPU handle when it was the last one.
    pub fn release(&mut self, id: MeshId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            log::warn!("Release of unknown mesh {:?}", id);
            return;
        };
        entry.refs -= 1;
        if entry.refs == 0 {
            if let Some(entry) = self.entries.remove(&id) {
                self.released.push(entry.handle);
            }
        }
    }

    /// GPU handle and index count of a live mesh.
    pub fn get(&self, id: MeshId) -> Option<(MeshHandle, u32)> {
        self.entries.get(&id).map(|e| (e.handle, e.index_count))
    }

    pub fn ref_count(&self, id: MeshId) -> u32 {
        self.entries.get(&id).map_or(0, |e| e.refs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Free every queued GPU mesh.
    pub fn flush_releases(&mut self, gpu: &mut dyn GraphicsDevice) -> usize {
        let count = self.released.len();
        for handle in self.released.drain(..) {
            gpu.release_mesh(handle);
        }
        count
    }

    pub fn pending_releases(&self) -> usize {
        self.released.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;

    #[test]
    fn cube_has_24_vertices_and_12_triangles() {
        let cube = Geometry::cube(1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertex_count()));
    }

    #[test]
    fn missing_normals_and_uvs_default_to_zero() {
        let geometry = Geometry {
            positions: vec![1.0, 2.0, 3.0],
            normals: vec![],
            tex_coords: vec![],
            indices: vec![0, 0, 0],
        };
        let v = geometry.to_vertices();
        assert_eq!(v[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(v[0].normal, [0.0; 3]);
        assert_eq!(v[0].tex_coords, [0.0; 2]);
    }

    #[test]
    fn last_release_queues_gpu_buffers_once() {
        let mut gpu = HeadlessDevice::new();
        let mut store = MeshStore::new();
        let id = store.upload(&mut gpu, &Geometry::quad(0.05));
        assert!(store.retain(id));
        assert_eq!(store.ref_count(id), 2);

        store.release(id);
        assert_eq!(store.pending_releases(), 0);
        store.release(id);
        assert_eq!(store.pending_releases(), 1);
        assert!(store.get(id).is_none());

        // A stale release after the mesh is gone must not double-free.
        store.release(id);
        assert_eq!(store.flush_releases(&mut gpu), 1);
        assert_eq!(gpu.released_meshes().len(), 1);
    }
}
