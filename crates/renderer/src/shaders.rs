//! Built-in WGSL programs.

/// Textured, lit with up to [`crate::MAX_LIGHTS`] point lights, tinted by `color`.
pub const LIT: &str = include_str!("shaders/lit.wgsl");

/// Solid `color`, no texture.
pub const UNLIT: &str = include_str!("shaders/unlit.wgsl");
