//! The player ship: keyboard strafing with a banking tilt.

use std::f32::consts::PI;

use hecs::Entity;
use input::{KeyCode, KeyInput};
use renderer::Scene;

/// Half-width of the strip the ship may strafe along.
pub const PLAYER_BOUND: f32 = 4.0;
/// Roll applied while strafing, in radians.
const BANK_ANGLE: f32 = PI / 10.0;

#[derive(Debug, Clone, Copy)]
pub struct Player {
    pub entity: Entity,
    pub speed: f32,
    pub bound: f32,
}

impl Player {
    pub fn new(entity: Entity, speed: f32) -> Self {
        Self {
            entity,
            speed,
            bound: PLAYER_BOUND,
        }
    }

    /// Strafe with the arrow keys. Right wins the bank when both are held.
    pub fn handle_input(&self, input: &impl KeyInput, dt: f32, scene: &mut Scene) {
        let Some(mut transform) = scene.transform_mut(self.entity) else {
            return;
        };
        let left = input.is_key_down(KeyCode::ArrowLeft);
        let right = input.is_key_down(KeyCode::ArrowRight);

        if left {
            transform.position.x -= self.speed * dt;
            transform.rotation.z = BANK_ANGLE;
        }
        if right {
            transform.position.x += self.speed * dt;
            transform.rotation.z = -BANK_ANGLE;
        }
        if !left && !right {
            transform.rotation.z = 0.0;
        }
        transform.position.x = transform.position.x.clamp(-self.bound, self.bound);
    }
}
