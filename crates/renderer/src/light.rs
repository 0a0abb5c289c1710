//! Scene lights and their projection into material uniforms.

use glam::Vec3;

use crate::material::Material;

/// Number of light slots in the built-in shaders' `lights` array.
pub const MAX_LIGHTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightKind {
    #[default]
    Point,
    Directional,
    Spot,
}

/// Uniform-ready light values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightData {
    pub kind: LightKind,
    pub position: Vec3,
    /// Color scaled by intensity.
    pub color: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

#[derive(Debug, Clone)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    /// Euler angles in radians; only x (pitch) and y (yaw) steer the direction.
    pub rotation: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    direction: Vec3,
}

impl Default for Light {
    fn default() -> Self {
        Self::new(LightKind::Point, Vec3::ONE, 1.0)
    }
}

impl Light {
    pub fn new(kind: LightKind, color: Vec3, intensity: f32) -> Self {
        let mut light = Self {
            kind,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            color,
            intensity,
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            direction: Vec3::X,
        };
        light.direction = light.compute_direction();
        light
    }

    pub fn point(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            ..Self::new(LightKind::Point, color, intensity)
        }
    }

    fn compute_direction(&self) -> Vec3 {
        let (x, y) = (self.rotation.x, self.rotation.y);
        Vec3::new(y.cos() * x.cos(), x.sin(), y.sin() * x.cos())
    }

    /// Refresh derived state after position or rotation changed.
    pub fn update(&mut self, _dt: f32) {
        self.direction = self.compute_direction();
    }

    /// Direction for directional and spot lights, as of the last update.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn light_data(&self) -> LightData {
        LightData {
            kind: self.kind,
            position: self.position,
            color: self.color * self.intensity,
            ambient: self.ambient,
            diffuse: self.diffuse,
            specular: self.specular,
        }
    }

    /// Write this light into slot `index` of the material's `lights` array.
    /// The lighting factors are tinted by the light's effective color.
    pub fn apply_to_material(&self, material: &mut Material, index: usize) {
        let data = self.light_data();
        let base = format!("lights[{index}]");
        material.set_uniform(format!("{base}.position"), data.position);
        material.set_uniform(format!("{base}.ambient"), data.ambient * data.color);
        material.set_uniform(format!("{base}.diffuse"), data.diffuse * data.color);
        material.set_uniform(format!("{base}.specular"), data.specular * data.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UniformValue;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn defaults_match_phong_factors() {
        let light = Light::default();
        assert_eq!(light.ambient, Vec3::splat(0.1));
        assert_eq!(light.diffuse, Vec3::ONE);
        assert_eq!(light.specular, Vec3::ONE);
    }

    #[test]
    fn light_data_scales_color_by_intensity() {
        let light = Light::point(Vec3::new(-5.0, 5.0, -5.0), Vec3::new(0.8, 0.8, 1.0), 0.5);
        let data = light.light_data();
        assert!(data.color.abs_diff_eq(Vec3::new(0.4, 0.4, 0.5), 1e-6));
        assert_eq!(data.position, Vec3::new(-5.0, 5.0, -5.0));
    }

    #[test]
    fn direction_follows_rotation_after_update() {
        let mut light = Light::new(LightKind::Directional, Vec3::ONE, 1.0);
        assert!(light.direction().abs_diff_eq(Vec3::X, 1e-6));
        light.rotation = Vec3::new(FRAC_PI_2, 0.0, 0.0);
        light.update(0.0);
        assert!(light.direction().abs_diff_eq(Vec3::Y, 1e-6));
        light.rotation = Vec3::new(0.0, FRAC_PI_2, 0.0);
        light.update(0.0);
        assert!(light.direction().abs_diff_eq(Vec3::Z, 1e-6));
    }

    #[test]
    fn apply_writes_indexed_uniforms() {
        let light = Light::point(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, 1.0);
        let mut material = Material::new("m", crate::shaders::LIT);
        light.apply_to_material(&mut material, 3);
        assert_eq!(
            material.uniform("lights[3].position"),
            Some(UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(material.uniform("lights[3].ambient"), Some(UniformValue::Vec3(Vec3::splat(0.1))));
        assert!(material.uniform("lights[0].position").is_none());
    }
}
