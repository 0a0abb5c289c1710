//! Rendering: a GL-style device abstraction with wgpu and headless
//! backends, materials, scenes and the per-frame draw walk.

pub mod camera;
pub mod device;
pub mod headless;
pub mod light;
pub mod material;
pub mod mesh;
pub mod obj;
pub mod pipeline;
pub mod reflect;
pub mod renderer;
pub mod scene;
pub mod shaders;
pub mod texture;
pub mod vertex;
pub mod wgpu_device;

pub use camera::*;
pub use device::*;
pub use headless::*;
pub use light::*;
pub use material::*;
pub use mesh::*;
pub use obj::*;
pub use reflect::*;
pub use renderer::*;
pub use scene::*;
pub use texture::*;
pub use vertex::*;
pub use wgpu_device::*;
