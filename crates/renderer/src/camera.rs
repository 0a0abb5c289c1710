//! Perspective camera with cached view and projection matrices.

use glam::{Mat4, Vec3};

/// What the camera looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraTarget {
    /// A fixed world-space point.
    Point(Vec3),
    /// A direction from the camera position.
    Direction(Vec3),
}

#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space.
    pub position: Vec3,
    pub target: CameraTarget,
    /// Up vector used by the look-at construction.
    pub up: Vec3,
    /// Field of view in degrees.
    pub fov_degrees: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Aspect ratio (width / height), refreshed by [`Camera::update`].
    aspect: f32,
    view: Mat4,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            target: CameraTarget::Direction(Vec3::NEG_Z),
            up: Vec3::Y,
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            aspect: 1.0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking along `direction`.
    pub fn looking_along(position: Vec3, direction: Vec3, up: Vec3) -> Self {
        Self {
            position,
            target: CameraTarget::Direction(direction),
            up,
            ..Default::default()
        }
    }

    /// Create a camera at `position` looking at `point`.
    pub fn looking_at(position: Vec3, point: Vec3, up: Vec3) -> Self {
        Self {
            position,
            target: CameraTarget::Point(point),
            up,
            ..Default::default()
        }
    }

    /// World-space point the camera looks at.
    pub fn look_point(&self) -> Vec3 {
        match self.target {
            CameraTarget::Point(p) => p,
            CameraTarget::Direction(d) => self.position + d,
        }
    }

    /// Recompute view and projection for a viewport. Zero height counts as 1.
    pub fn update(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
        self.view = Mat4::look_at_rh(self.position, self.look_point(), self.up);
        self.projection = Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// View matrix as of the last [`Camera::update`].
    pub fn view_matrix(&self) -> Mat4 {
        self.view
    }

    /// Projection matrix as of the last [`Camera::update`].
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_and_point_targets_agree() {
        let mut a = Camera::looking_along(Vec3::new(0.0, 20.0, -10.0), Vec3::NEG_Y, Vec3::NEG_Z);
        let mut b = Camera::looking_at(Vec3::new(0.0, 20.0, -10.0), Vec3::new(0.0, 19.0, -10.0), Vec3::NEG_Z);
        a.update(800, 600);
        b.update(800, 600);
        assert!(a.view_matrix().abs_diff_eq(b.view_matrix(), 1e-6));
    }

    #[test]
    fn view_maps_camera_position_to_origin() {
        let mut camera = Camera::looking_along(Vec3::new(1.0, 2.0, 3.0), Vec3::NEG_Z, Vec3::Y);
        camera.update(100, 100);
        let p = camera.view_matrix().transform_point3(camera.position);
        assert!(p.length() < 1e-6);
    }

    #[test]
    fn projection_tracks_aspect_ratio() {
        let mut camera = Camera::default();
        camera.update(1600, 800);
        assert!((camera.aspect() - 2.0).abs() < 1e-6);
        let expected = Mat4::perspective_rh(45f32.to_radians(), 2.0, 0.1, 100.0);
        assert!(camera.projection_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn zero_height_viewport_is_clamped() {
        let mut camera = Camera::default();
        camera.update(640, 0);
        assert!(camera.aspect().is_finite());
        assert!((camera.aspect() - 640.0).abs() < 1e-3);
    }
}
