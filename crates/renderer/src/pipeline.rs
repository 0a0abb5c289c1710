//! Render pipeline and bind group layout construction.

use std::num::NonZeroU64;

use crate::texture::GpuTexture;
use crate::vertex::Vertex;

/// Group 0: the program's uniform block, addressed with a dynamic offset.
/// A program without uniforms gets an empty layout so group numbering holds.
pub fn create_uniform_bind_group_layout(device: &wgpu::Device, block_size: u32) -> wgpu::BindGroupLayout {
    let entry = [wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(block_size as u64),
        },
        count: None,
    }];
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Uniform Block Layout"),
        entries: if block_size > 0 { &entry[..] } else { &entry[..0] },
    })
}

/// Group 1: `units` texture/sampler pairs at bindings 2k and 2k+1.
pub fn create_texture_bind_group_layout(device: &wgpu::Device, units: u32) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = (0..units)
        .flat_map(|unit| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: unit * 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: unit * 2 + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ]
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Texture Units Layout"),
        entries: &entries,
    })
}

/// Bind group holding one texture/sampler pair per unit, in unit order.
pub fn create_texture_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    textures: &[&GpuTexture],
) -> wgpu::BindGroup {
    let entries: Vec<_> = textures
        .iter()
        .enumerate()
        .flat_map(|(unit, texture)| {
            let unit = unit as u32;
            [
                wgpu::BindGroupEntry {
                    binding: unit * 2,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: unit * 2 + 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ]
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Texture Units Bind Group"),
        layout,
        entries: &entries,
    })
}

/// Bind group exposing a `block_size` window of the uniform ring.
pub fn create_uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    ring: &wgpu::Buffer,
    block_size: u32,
) -> wgpu::BindGroup {
    let buffer_binding = [wgpu::BindGroupEntry {
        binding: 0,
        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: ring,
            offset: 0,
            size: NonZeroU64::new(block_size as u64),
        }),
    }];
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Uniform Block Bind Group"),
        layout,
        entries: if block_size > 0 { &buffer_binding[..] } else { &buffer_binding[..0] },
    })
}

/// Pipeline for a material program: [`Vertex`] input, depth tested,
/// alpha blended, no culling.
pub fn create_program_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(crate::reflect::VERTEX_ENTRY),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(crate::reflect::FRAGMENT_ENTRY),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // OBJ exports do not agree on winding.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: GpuTexture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
