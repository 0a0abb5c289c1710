//! Transform component and model-matrix composition.

use glam::{Mat4, Vec3};

/// Position, Euler rotation (radians) and scale of a world-space object.
///
/// The model matrix is always recomposed from these three fields; nothing
/// is accumulated incrementally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the given position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and uniform scale.
    pub fn from_position_scale(position: Vec3, scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::splat(scale),
            ..Default::default()
        }
    }

    /// `translate(position) * rotX * rotY * rotZ * scale`.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_scale(self.scale)
    }
}
