//! Fixed-radius sphere overlap test.

use glam::Vec3;

/// Distance below which two entities are considered touching.
pub const COLLISION_RADIUS: f32 = 1.0;

/// True when `a` and `b` are strictly closer than [`COLLISION_RADIUS`].
pub fn spheres_overlap(a: Vec3, b: Vec3) -> bool {
    within_radius(a, b, COLLISION_RADIUS)
}

/// True when `a` and `b` are strictly closer than `radius`.
pub fn within_radius(a: Vec3, b: Vec3, radius: f32) -> bool {
    a.distance_squared(b) < radius * radius
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_unit_apart_overlaps() {
        assert!(spheres_overlap(Vec3::ZERO, Vec3::new(0.0, 0.0, 0.5)));
    }

    #[test]
    fn one_and_a_half_units_apart_does_not_overlap() {
        assert!(!spheres_overlap(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.5)));
    }

    #[test]
    fn exactly_radius_apart_does_not_overlap() {
        assert!(!spheres_overlap(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn distance_is_euclidean_across_all_axes() {
        // sqrt(0.5^2 * 3) ~= 0.866
        assert!(spheres_overlap(Vec3::ZERO, Vec3::splat(0.5)));
        // sqrt(0.6^2 * 3) ~= 1.039
        assert!(!spheres_overlap(Vec3::ZERO, Vec3::splat(0.6)));
    }
}
