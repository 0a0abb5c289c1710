//! Enemy formation: shared march/descend state and per-enemy chase and fire.

use glam::{Vec3, Vec4};
use hecs::Entity;
use rand::Rng;
use renderer::{MaterialId, Scene};

use crate::bullet::BulletManager;

pub const MARCH_SPEED: f32 = 0.6;
/// Z distance between formation rows.
pub const ROW_OFFSET: f32 = 1.5;
/// Fraction of the remaining distance covered per update while descending.
pub const DESCENT_BLEND: f32 = 0.1;
pub const ROW_EPSILON: f32 = 0.01;
pub const INITIAL_DESCENT_COOLDOWN: f32 = 3.0;
/// Minimum wait between descents; up to two more seconds are added at random.
const DESCENT_INTERVAL: f32 = 1.0;
const DESCENT_JITTER: f32 = 2.0;
const COLOR_CYCLE_INTERVAL: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Marching,
    Descending,
}

/// State shared by every enemy in one formation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnemyGroupState {
    /// +1 or -1 along X.
    pub direction: f32,
    pub mode: GroupMode,
    pub current_row: u32,
    pub descent_cooldown: f32,
}

impl Default for EnemyGroupState {
    fn default() -> Self {
        Self {
            direction: 1.0,
            mode: GroupMode::Marching,
            current_row: 0,
            descent_cooldown: INITIAL_DESCENT_COOLDOWN,
        }
    }
}

/// How chasing enemies shoot.
#[derive(Debug, Clone, Copy)]
pub struct AttackSettings {
    pub interval: f32,
    pub bullet_speed: f32,
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub entity: Entity,
    /// Each enemy owns its material so its color can cycle independently.
    pub material: MaterialId,
    pub original_position: Vec3,
    pub march_speed: f32,
    pub march_bound: f32,
    pub target: Option<Entity>,
    pub attack_cooldown: f32,
    color_timer: f32,
}

impl Enemy {
    pub fn new(entity: Entity, material: MaterialId, original_position: Vec3, rng: &mut impl Rng) -> Self {
        Self {
            entity,
            material,
            original_position,
            march_speed: MARCH_SPEED,
            march_bound: rng.gen_range(3.0..5.0),
            target: None,
            attack_cooldown: 0.0,
            color_timer: 0.0,
        }
    }

    /// Leave the formation and chase `target`, first shot after `interval`.
    pub fn set_target(&mut self, target: Entity, interval: f32) {
        self.target = Some(target);
        self.attack_cooldown = interval;
    }

    pub fn is_targeting(&self) -> bool {
        self.target.is_some()
    }

    fn cycle_color(&mut self, dt: f32, scene: &mut Scene, rng: &mut impl Rng) {
        self.color_timer += dt;
        if self.color_timer < COLOR_CYCLE_INTERVAL {
            return;
        }
        self.color_timer = 0.0;
        if let Some(material) = scene.material_mut(self.material) {
            material.set_uniform("color", random_color(rng));
        }
    }

    /// Steer toward the target and fire when the attack cooldown runs out.
    fn chase(
        &mut self,
        target: Entity,
        dt: f32,
        scene: &mut Scene,
        bullets: &mut BulletManager,
        attack: &AttackSettings,
        friendly: &[Entity],
    ) {
        let Some(target_pos) = scene.position(target) else {
            self.target = None;
            return;
        };
        let Some(position) = scene.position(self.entity) else {
            return;
        };
        let approach = (target_pos - position).normalize_or_zero();
        if let Some(mut transform) = scene.transform_mut(self.entity) {
            transform.position += approach * self.march_speed * dt;
        }

        self.attack_cooldown -= dt;
        if self.attack_cooldown <= 0.0 {
            self.attack_cooldown = attack.interval;
            let origin = position + approach * self.march_speed * dt;
            bullets.create_bullet(scene, origin, approach, attack.bullet_speed, friendly.to_vec());
        }
    }
}

pub fn random_color(rng: &mut impl Rng) -> Vec4 {
    Vec4::new(rng.gen(), rng.gen(), rng.gen(), 1.0)
}

/// What a formation enemy reported during one group pass.
#[derive(Debug)]
struct PassReport {
    flip: bool,
    all_aligned: bool,
}

impl EnemyGroupState {
    /// Advance the whole formation by one tick.
    ///
    /// Every enemy reads the group state as it was at the start of the
    /// pass. A direction flip (at most one per pass, and only for an enemy
    /// past its bound and still moving outward) and the end of a descent
    /// are applied after every enemy has moved.
    pub fn update(
        &mut self,
        dt: f32,
        enemies: &mut [Enemy],
        scene: &mut Scene,
        bullets: &mut BulletManager,
        attack: &AttackSettings,
        rng: &mut impl Rng,
    ) {
        if self.descent_cooldown > 0.0 {
            self.descent_cooldown -= dt;
        }
        if self.mode == GroupMode::Marching && self.descent_cooldown <= 0.0 {
            self.mode = GroupMode::Descending;
            self.descent_cooldown = DESCENT_INTERVAL + rng.gen::<f32>() * DESCENT_JITTER;
            log::debug!("Formation descending to row {}", self.current_row);
        }

        let snapshot = self.clone();
        let friendly: Vec<Entity> = enemies.iter().map(|e| e.entity).collect();
        let mut report = PassReport {
            flip: false,
            all_aligned: true,
        };

        for enemy in enemies.iter_mut() {
            if scene.is_destroyed(enemy.entity) {
                continue;
            }
            enemy.cycle_color(dt, scene, rng);

            if let Some(target) = enemy.target {
                enemy.chase(target, dt, scene, bullets, attack, &friendly);
                continue;
            }

            let Some(mut transform) = scene.transform_mut(enemy.entity) else {
                continue;
            };
            match snapshot.mode {
                GroupMode::Descending => {
                    let target_z = enemy.original_position.z + snapshot.current_row as f32 * ROW_OFFSET;
                    let remaining = target_z - transform.position.z;
                    if remaining.abs() > ROW_EPSILON {
                        report.all_aligned = false;
                    }
                    transform.position.z += remaining * DESCENT_BLEND;
                }
                GroupMode::Marching => {
                    transform.position.x += snapshot.direction * enemy.march_speed * dt;
                    let x = transform.position.x;
                    let outward = (x > enemy.march_bound && snapshot.direction > 0.0)
                        || (x < -enemy.march_bound && snapshot.direction < 0.0);
                    report.flip |= outward;
                }
            }
        }

        if report.flip {
            self.direction = -snapshot.direction;
        }
        if snapshot.mode == GroupMode::Descending && report.all_aligned {
            self.mode = GroupMode::Marching;
            self.current_row += 1;
            log::debug!("Formation reached row {}", self.current_row);
        }
    }
}
