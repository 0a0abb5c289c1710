//! Texture decoding, background loading and GPU texture creation.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("could not read texture {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode texture {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("texture loader for {path:?} stopped before finishing")]
    Aborted { path: PathBuf },
}

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// 1x1 opaque white, bound while a real texture is loading.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255, 255, 255, 255],
        }
    }

    /// Decode PNG or JPEG bytes.
    pub fn decode(path: &Path, bytes: &[u8]) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes).map_err(|source| TextureError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw(),
        })
    }

    /// Read and decode a file.
    pub fn load(path: &Path) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path).map_err(|source| TextureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(path, &bytes)
    }
}

/// A texture being read and decoded on a worker thread.
#[derive(Debug)]
pub struct PendingTexture {
    path: PathBuf,
    receiver: Receiver<Result<TextureData, TextureError>>,
}

impl PendingTexture {
    /// Start loading `path` in the background.
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (sender, receiver) = mpsc::channel();
        let worker_path = path.clone();
        let spawned = std::thread::Builder::new()
            .name("texture-decode".to_string())
            .spawn({
                let sender = sender.clone();
                move || {
                    let _ = sender.send(TextureData::load(&worker_path));
                }
            });
        if let Err(source) = spawned {
            let _ = sender.send(Err(TextureError::Io {
                path: path.clone(),
                source,
            }));
        }
        Self { path, receiver }
    }

    /// Build an already-resolved load. Used for in-memory sources.
    pub fn ready(path: impl Into<PathBuf>, result: Result<TextureData, TextureError>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(result);
        Self {
            path: path.into(),
            receiver,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking check. `None` while the worker is still running.
    pub fn try_take(&self) -> Option<Result<TextureData, TextureError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TextureError::Aborted {
                path: self.path.clone(),
            })),
        }
    }

    /// Block until the worker finishes.
    pub fn wait(self) -> Result<TextureData, TextureError> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(TextureError::Aborted { path: self.path }))
    }
}

/// A GPU texture with its view and sampler.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl GpuTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Upload RGBA8 pixels as an sRGB texture.
    pub fn from_data(device: &wgpu::Device, queue: &wgpu::Queue, data: &TextureData, label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: data.width.max(1),
            height: data.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        Self { texture, view, sampler }
    }

    /// Depth attachment sized to the surface.
    pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        Self { texture, view, sampler }
    }
}
