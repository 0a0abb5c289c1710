//! Core engine types shared by every other crate.
//!
//! - Transform and model-matrix composition
//! - Frame clock with a clamped step
//! - Events with disconnectable listeners
//! - Engine start/stop and the per-tick OnUpdate event

pub mod engine;
pub mod event;
pub mod time;
pub mod transform;

pub use engine::*;
pub use event::*;
pub use time::*;
pub use transform::*;

// Re-export commonly used types
pub use glam::{Mat4, Vec2, Vec3, Vec4};
pub use hecs::{Entity, World};
