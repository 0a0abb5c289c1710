//! wgpu implementation of [`GraphicsDevice`].
//!
//! Each distinct shader source becomes one cached pipeline. A program
//! keeps a CPU copy of its uniform block; `upload_uniform` writes into
//! that copy and `draw_indexed` snapshots it into the frame's uniform ring
//! at the device's dynamic-offset alignment. Draws are recorded and
//! replayed in a single render pass by [`WgpuDevice::present`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use winit::window::Window;

use crate::device::{
    GraphicsDevice, MeshHandle, ProgramHandle, ShaderInterface, TextureHandle, UniformLocation, UniformValue,
};
use crate::mesh::{Geometry, GpuMesh};
use crate::pipeline::{
    create_program_pipeline, create_texture_bind_group, create_texture_bind_group_layout, create_uniform_bind_group,
    create_uniform_bind_group_layout,
};
use crate::reflect::{reflect_wgsl, ShaderError};
use crate::texture::{GpuTexture, TextureData};

/// Initial uniform ring size; grows when a frame needs more.
const INITIAL_RING_SIZE: u64 = 256 * 1024;

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_bind_group: wgpu::BindGroup,
    block_size: u32,
    texture_units: u32,
    refs: u32,
}

struct Program {
    source: String,
    block: Vec<u8>,
}

struct RecordedDraw {
    source: String,
    uniform_offset: u32,
    mesh: MeshHandle,
    index_count: u32,
    textures: Vec<Option<TextureHandle>>,
}

pub struct WgpuDevice {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub window: Arc<Window>,

    depth_texture: GpuTexture,
    fallback_texture: GpuTexture,

    pipelines: HashMap<String, PipelineEntry>,
    programs: HashMap<ProgramHandle, Program>,
    meshes: HashMap<MeshHandle, GpuMesh>,
    textures: HashMap<TextureHandle, GpuTexture>,
    texture_layouts: HashMap<u32, wgpu::BindGroupLayout>,
    texture_bind_groups: HashMap<Vec<Option<TextureHandle>>, wgpu::BindGroup>,
    next_id: u32,

    uniform_ring: wgpu::Buffer,
    ring_size: u64,
    uniform_alignment: u32,
    frame_uniforms: Vec<u8>,

    current: Option<ProgramHandle>,
    bound_textures: Vec<Option<TextureHandle>>,
    draws: Vec<RecordedDraw>,
}

impl WgpuDevice {
    /// Create the device for a window.
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no texture formats"))?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = GpuTexture::create_depth_texture(&device, config.width, config.height, "Depth Texture");
        let fallback_texture = GpuTexture::from_data(&device, &queue, &TextureData::placeholder(), "Fallback Texture");

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment;
        let uniform_ring = create_ring(&device, INITIAL_RING_SIZE);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
            depth_texture,
            fallback_texture,
            pipelines: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            texture_layouts: HashMap::new(),
            texture_bind_groups: HashMap::new(),
            next_id: 0,
            uniform_ring,
            ring_size: INITIAL_RING_SIZE,
            uniform_alignment,
            frame_uniforms: Vec::new(),
            current: None,
            bound_textures: Vec::new(),
            draws: Vec::new(),
        })
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Handle window resize.
    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture =
                GpuTexture::create_depth_texture(&self.device, self.config.width, self.config.height, "Depth Texture");
        }
    }

    /// Get surface dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Discard anything recorded since the last present.
    pub fn begin_frame(&mut self) {
        self.draws.clear();
        self.frame_uniforms.clear();
    }

    /// Replay the recorded draws into the swap chain and present.
    pub fn present(&mut self, clear_color: wgpu::Color) -> Result<()> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated; reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.begin_frame();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timeout; skipping frame");
                self.begin_frame();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.upload_frame_uniforms();
        self.prepare_texture_bind_groups();

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &self.draws {
                let (Some(entry), Some(mesh)) = (self.pipelines.get(&draw.source), self.meshes.get(&draw.mesh)) else {
                    continue;
                };
                pass.set_pipeline(&entry.pipeline);
                if entry.block_size > 0 {
                    pass.set_bind_group(0, &entry.uniform_bind_group, &[draw.uniform_offset]);
                } else {
                    pass.set_bind_group(0, &entry.uniform_bind_group, &[]);
                }
                if entry.texture_units > 0 {
                    let Some(group) = self.texture_bind_groups.get(&self.resolve_textures(&draw.textures)) else {
                        continue;
                    };
                    pass.set_bind_group(1, group, &[]);
                }
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count.min(mesh.num_indices), 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.begin_frame();
        Ok(())
    }

    // Released textures fall back to the white pixel.
    fn resolve_textures(&self, textures: &[Option<TextureHandle>]) -> Vec<Option<TextureHandle>> {
        textures
            .iter()
            .map(|t| t.filter(|h| self.textures.contains_key(h)))
            .collect()
    }

    fn upload_frame_uniforms(&mut self) {
        if self.frame_uniforms.is_empty() {
            return;
        }
        let needed = self.frame_uniforms.len() as u64;
        if needed > self.ring_size {
            let size = needed.next_power_of_two();
            log::debug!("Growing uniform ring to {} bytes", size);
            self.uniform_ring = create_ring(&self.device, size);
            self.ring_size = size;
            for entry in self.pipelines.values_mut() {
                entry.uniform_bind_group =
                    create_uniform_bind_group(&self.device, &entry.uniform_layout, &self.uniform_ring, entry.block_size);
            }
        }
        self.queue.write_buffer(&self.uniform_ring, 0, &self.frame_uniforms);
    }

    fn prepare_texture_bind_groups(&mut self) {
        for i in 0..self.draws.len() {
            let key = self.resolve_textures(&self.draws[i].textures);
            if key.is_empty() || self.texture_bind_groups.contains_key(&key) {
                continue;
            }
            let units = key.len() as u32;
            let layout = self
                .texture_layouts
                .entry(units)
                .or_insert_with(|| create_texture_bind_group_layout(&self.device, units));
            let views: Vec<&GpuTexture> = key
                .iter()
                .map(|t| t.and_then(|h| self.textures.get(&h)).unwrap_or(&self.fallback_texture))
                .collect();
            let group = create_texture_bind_group(&self.device, layout, &views);
            self.texture_bind_groups.insert(key, group);
        }
    }

    fn build_pipeline(&mut self, label: &str, source: &str, interface: &ShaderInterface) -> Result<PipelineEntry, ShaderError> {
        let block_size = interface.uniform_block_size;
        let texture_units = interface.samplers.len() as u32;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let uniform_layout = create_uniform_bind_group_layout(&self.device, block_size);
        let texture_layout = self
            .texture_layouts
            .entry(texture_units)
            .or_insert_with(|| create_texture_bind_group_layout(&self.device, texture_units));
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&uniform_layout, &*texture_layout],
            push_constant_ranges: &[],
        });
        let pipeline = create_program_pipeline(&self.device, label, &layout, &shader, self.config.format);
        let uniform_bind_group = create_uniform_bind_group(&self.device, &uniform_layout, &self.uniform_ring, block_size);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::Device {
                label: label.to_string(),
                message: error.to_string(),
            });
        }

        Ok(PipelineEntry {
            pipeline,
            uniform_layout,
            uniform_bind_group,
            block_size,
            texture_units,
            refs: 0,
        })
    }
}

fn create_ring(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Uniform Ring"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl GraphicsDevice for WgpuDevice {
    fn compile_program(&mut self, label: &str, source: &str) -> Result<(ProgramHandle, ShaderInterface), ShaderError> {
        let interface = reflect_wgsl(label, source)?;
        if !self.pipelines.contains_key(source) {
            let entry = self.build_pipeline(label, source, &interface)?;
            log::debug!("Created pipeline for '{}'", label);
            self.pipelines.insert(source.to_string(), entry);
        }
        if let Some(entry) = self.pipelines.get_mut(source) {
            entry.refs += 1;
        }

        let program = ProgramHandle(self.next());
        self.programs.insert(
            program,
            Program {
                source: source.to_string(),
                block: vec![0; interface.uniform_block_size as usize],
            },
        );
        Ok((program, interface))
    }

    fn release_program(&mut self, program: ProgramHandle) {
        let Some(removed) = self.programs.remove(&program) else {
            return;
        };
        if self.current == Some(program) {
            self.current = None;
        }
        let drop_pipeline = match self.pipelines.get_mut(&removed.source) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if drop_pipeline {
            self.pipelines.remove(&removed.source);
        }
    }

    fn create_mesh(&mut self, geometry: &Geometry) -> MeshHandle {
        let handle = MeshHandle(self.next());
        self.meshes.insert(handle, GpuMesh::new(&self.device, geometry));
        handle
    }

    fn release_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
    }

    fn create_texture(&mut self, data: &TextureData) -> TextureHandle {
        let handle = TextureHandle(self.next());
        let label = format!("Texture {}", handle.0);
        let texture = GpuTexture::from_data(&self.device, &self.queue, data, &label);
        self.textures.insert(handle, texture);
        handle
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_some() {
            self.texture_bind_groups.retain(|key, _| !key.contains(&Some(texture)));
        }
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.current = Some(program);
        // Units the next material leaves unbound fall back to white.
        self.bound_textures.clear();
    }

    fn upload_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(program) = self.current.and_then(|p| self.programs.get_mut(&p)) else {
            return;
        };
        let start = location.offset as usize;
        let end = start + location.kind.size();
        if let Some(dst) = program.block.get_mut(start..end) {
            value.write_bytes(dst);
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) {
        let unit = unit as usize;
        if self.bound_textures.len() <= unit {
            self.bound_textures.resize(unit + 1, None);
        }
        self.bound_textures[unit] = Some(texture);
    }

    fn draw_indexed(&mut self, mesh: MeshHandle, index_count: u32) {
        let Some(program) = self.current.and_then(|p| self.programs.get(&p)) else {
            log::warn!("draw_indexed without a program");
            return;
        };
        let Some(entry) = self.pipelines.get(&program.source) else {
            return;
        };

        let uniform_offset = self.frame_uniforms.len();
        if entry.block_size > 0 {
            self.frame_uniforms.extend_from_slice(&program.block);
            let padded = align_to(self.frame_uniforms.len(), self.uniform_alignment as usize);
            self.frame_uniforms.resize(padded, 0);
        }

        let textures = (0..entry.texture_units as usize)
            .map(|unit| self.bound_textures.get(unit).copied().flatten())
            .collect();

        self.draws.push(RecordedDraw {
            source: program.source.clone(),
            uniform_offset: uniform_offset as u32,
            mesh,
            index_count,
            textures,
        });
    }
}
