//! Projectiles: one shared mesh and material, per-bullet motion and expiry,
//! and the pairwise hit scan.

use std::f32::consts::FRAC_PI_2;

use engine_core::Transform;
use glam::{Vec3, Vec4};
use hecs::Entity;
use physics::spheres_overlap;
use renderer::shaders::UNLIT;
use renderer::{Geometry, GraphicsDevice, Material, MaterialId, MeshId, Scene, ShaderError};

/// Seconds a bullet lives before it expires.
pub const BULLET_LIFETIME: f32 = 5.0;
/// A bullet past this distance from the origin on any axis is dropped.
pub const BULLET_BOUND: f32 = 50.0;
const BULLET_HALF_SIZE: f32 = 0.05;
const BULLET_COLOR: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);

#[derive(Debug, Clone)]
pub struct Bullet {
    pub entity: Entity,
    pub direction: Vec3,
    pub speed: f32,
    pub age: f32,
    pub lifetime: f32,
    /// Entities this bullet never hits, usually whoever fired it.
    pub ignore: Vec<Entity>,
}

/// A bullet overlapping a target during [`BulletManager::check_collisions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub bullet: Entity,
    pub target: Entity,
}

/// Owns every live bullet. The level holds the only instance.
#[derive(Debug)]
pub struct BulletManager {
    bullets: Vec<Bullet>,
    mesh: MeshId,
    material: MaterialId,
}

impl BulletManager {
    /// Upload the shared quad and compile the flat red material.
    pub fn new(scene: &mut Scene, gpu: &mut dyn GraphicsDevice) -> Result<Self, ShaderError> {
        let mut material = Material::new("bullet", UNLIT);
        material.compile(gpu)?;
        material.set_uniform("color", BULLET_COLOR);
        let material = scene.add_material(material);
        let mesh = scene.upload_mesh(gpu, &Geometry::quad(BULLET_HALF_SIZE));
        Ok(Self {
            bullets: Vec::new(),
            mesh,
            material,
        })
    }

    pub fn create_bullet(
        &mut self,
        scene: &mut Scene,
        position: Vec3,
        direction: Vec3,
        speed: f32,
        ignore: Vec<Entity>,
    ) -> Entity {
        // Lay the quad flat so it faces the overhead camera.
        let transform = Transform {
            position,
            rotation: Vec3::new(-FRAC_PI_2, 0.0, 0.0),
            ..Default::default()
        };
        let entity = scene.spawn(transform, self.mesh, Some(self.material));
        self.bullets.push(Bullet {
            entity,
            direction,
            speed,
            age: 0.0,
            lifetime: BULLET_LIFETIME,
            ignore,
        });
        entity
    }

    /// Advance, age and retire bullets in one pass. A bullet that expires,
    /// leaves the bounds or was destroyed elsewhere is removed from the
    /// scene and dropped. Returns how many were retired.
    pub fn update(&mut self, dt: f32, scene: &mut Scene) -> usize {
        let before = self.bullets.len();
        self.bullets.retain_mut(|bullet| {
            if scene.is_destroyed(bullet.entity) {
                return false;
            }
            let position = {
                let Some(mut transform) = scene.transform_mut(bullet.entity) else {
                    return false;
                };
                transform.position += bullet.direction * bullet.speed * dt;
                transform.position
            };
            bullet.age += dt;

            let expired = bullet.age >= bullet.lifetime;
            let out_of_bounds = position.abs().max_element() > BULLET_BOUND;
            if expired || out_of_bounds {
                scene.destroy_entity(bullet.entity);
                return false;
            }
            true
        });
        before - self.bullets.len()
    }

    /// Test every live bullet against every live target it does not ignore.
    ///
    /// Hits are gathered first and delivered after the scan, so `on_hit`
    /// may destroy entities freely. A hit whose bullet or target was
    /// destroyed by an earlier callback is skipped. Returns the number of
    /// hits delivered.
    pub fn check_collisions<F>(&self, targets: &[Entity], scene: &mut Scene, mut on_hit: F) -> usize
    where
        F: FnMut(Hit, &mut Scene),
    {
        let mut hits = Vec::new();
        for bullet in &self.bullets {
            let Some(bullet_pos) = scene.position(bullet.entity) else {
                continue;
            };
            for &target in targets {
                if target == bullet.entity || bullet.ignore.contains(&target) {
                    continue;
                }
                let Some(target_pos) = scene.position(target) else {
                    continue;
                };
                if spheres_overlap(bullet_pos, target_pos) {
                    hits.push(Hit {
                        bullet: bullet.entity,
                        target,
                    });
                }
            }
        }

        let mut delivered = 0;
        for hit in hits {
            if scene.is_destroyed(hit.bullet) || scene.is_destroyed(hit.target) {
                continue;
            }
            on_hit(hit, scene);
            delivered += 1;
        }
        delivered
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn len(&self) -> usize {
        self.bullets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bullets.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.bullets.iter().any(|b| b.entity == entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::HeadlessDevice;

    fn setup() -> (Scene, HeadlessDevice, BulletManager) {
        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        let bullets = BulletManager::new(&mut scene, &mut gpu).unwrap();
        (scene, gpu, bullets)
    }

    fn target_at(scene: &mut Scene, gpu: &mut HeadlessDevice, position: Vec3) -> Entity {
        let mesh = scene.upload_mesh(gpu, &Geometry::cube(1.0));
        scene.spawn(Transform::from_position(position), mesh, None)
    }

    #[test]
    fn bullets_advance_along_their_direction() {
        let (mut scene, _gpu, mut bullets) = setup();
        let b = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), 10.0, Vec::new());
        bullets.update(0.1, &mut scene);
        let p = scene.position(b).unwrap();
        assert!((p.z + 1.0).abs() < 1e-5);
        assert!((bullets.bullets()[0].age - 0.1).abs() < 1e-6);
    }

    #[test]
    fn bullet_expires_after_its_lifetime() {
        let (mut scene, _gpu, mut bullets) = setup();
        let b = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::X, 0.0, Vec::new());
        // 0.5 is exact in binary, so the age reaches 5.0 on the tenth update.
        for _ in 0..9 {
            assert_eq!(bullets.update(0.5, &mut scene), 0);
        }
        assert!(bullets.contains(b));
        assert!(!scene.is_destroyed(b));
        assert_eq!(bullets.update(0.5, &mut scene), 1);
        assert!(bullets.is_empty());
        assert!(scene.is_destroyed(b));
        assert!(!scene.entities().contains(&b));
    }

    #[test]
    fn bullet_leaving_bounds_is_retired_on_the_same_update() {
        let (mut scene, _gpu, mut bullets) = setup();
        let b = bullets.create_bullet(&mut scene, Vec3::new(0.0, 49.5, 0.0), Vec3::Y, 10.0, Vec::new());
        let kept = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::Y, 10.0, Vec::new());
        assert_eq!(bullets.update(0.1, &mut scene), 1);
        assert!(scene.is_destroyed(b));
        assert!(bullets.contains(kept));
    }

    #[test]
    fn externally_destroyed_bullets_are_dropped() {
        let (mut scene, _gpu, mut bullets) = setup();
        let b = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::X, 1.0, Vec::new());
        scene.destroy_entity(b);
        bullets.update(0.016, &mut scene);
        assert!(bullets.is_empty());
    }

    #[test]
    fn hit_is_strictly_inside_one_unit() {
        let (mut scene, mut gpu, mut bullets) = setup();
        let near = target_at(&mut scene, &mut gpu, Vec3::new(0.0, 0.0, 0.5));
        let far = target_at(&mut scene, &mut gpu, Vec3::new(0.0, 0.0, 1.5));
        let b = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::Z, 0.0, Vec::new());

        let mut hits = Vec::new();
        bullets.check_collisions(&[near, far], &mut scene, |hit, _| hits.push(hit));
        assert_eq!(hits, vec![Hit { bullet: b, target: near }]);
    }

    #[test]
    fn ignored_targets_are_never_hit() {
        let (mut scene, mut gpu, mut bullets) = setup();
        let shooter = target_at(&mut scene, &mut gpu, Vec3::ZERO);
        bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::Z, 0.0, vec![shooter]);
        let delivered = bullets.check_collisions(&[shooter], &mut scene, |_, _| panic!("ignored target hit"));
        assert_eq!(delivered, 0);
    }

    #[test]
    fn hits_on_already_destroyed_entities_are_skipped() {
        let (mut scene, mut gpu, mut bullets) = setup();
        let target = target_at(&mut scene, &mut gpu, Vec3::ZERO);
        bullets.create_bullet(&mut scene, Vec3::new(0.1, 0.0, 0.0), Vec3::Z, 0.0, Vec::new());
        bullets.create_bullet(&mut scene, Vec3::new(-0.1, 0.0, 0.0), Vec3::Z, 0.0, Vec::new());

        let delivered = bullets.check_collisions(&[target], &mut scene, |hit, scene| {
            scene.destroy_entity(hit.bullet);
            scene.destroy_entity(hit.target);
        });
        assert_eq!(delivered, 1);

        bullets.update(0.0, &mut scene);
        assert_eq!(bullets.len(), 1);
    }

    #[test]
    fn bullets_share_one_mesh_and_material() {
        let (mut scene, _gpu, mut bullets) = setup();
        let a = bullets.create_bullet(&mut scene, Vec3::ZERO, Vec3::X, 1.0, Vec::new());
        let b = bullets.create_bullet(&mut scene, Vec3::ONE, Vec3::X, 1.0, Vec::new());
        let (ra, rb) = (scene.renderable(a).unwrap(), scene.renderable(b).unwrap());
        assert_eq!(ra.mesh, rb.mesh);
        assert_eq!(ra.material, rb.material);
        assert_eq!(scene.meshes().ref_count(ra.mesh), 3);
    }
}
