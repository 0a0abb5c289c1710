//! Level setup and the per-tick game flow.

use std::path::Path;

use anyhow::{Context, Result};
use engine_core::{Tick, Transform};
use glam::{Vec3, Vec4};
use hecs::Entity;
use input::{InputState, KeyCode, KeyInput};
use physics::spheres_overlap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use renderer::shaders::LIT;
use renderer::{
    load_obj, Camera, Geometry, GraphicsDevice, Light, Material, MaterialId, MeshId, Scene,
};

use crate::bullet::BulletManager;
use crate::config::GameConfig;
use crate::enemy::{random_color, AttackSettings, Enemy, EnemyGroupState};
use crate::player::Player;

const CAMERA_POSITION: Vec3 = Vec3::new(0.0, 20.0, -10.0);
const PLAYER_START: Vec3 = Vec3::new(0.0, 0.0, -5.0);
const PLAYER_SCALE: f32 = 0.1;
const PLAYER_COLOR: Vec4 = Vec4::new(0.4, 0.8, 1.0, 1.0);
const ENEMY_SCALE: f32 = 0.4;
const ENEMY_ROWS: usize = 3;
const ENEMY_COLUMNS: usize = 4;
/// Bullets leave from just above the ship.
const MUZZLE_OFFSET: Vec3 = Vec3::new(0.0, 0.5, 0.0);
const TEXTURE_SAMPLER: &str = "diffuse_texture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
}

/// Gameplay numbers copied out of [`GameConfig`].
#[derive(Debug, Clone, Copy)]
struct Tuning {
    fire_cooldown: f32,
    bullet_speed: f32,
    targeting_interval: f32,
    attack: AttackSettings,
}

pub struct Level {
    pub scene: Scene,
    player: Player,
    enemies: Vec<Enemy>,
    group: EnemyGroupState,
    bullets: BulletManager,
    tuning: Tuning,
    fire_cooldown: f32,
    targeting_timer: f32,
    /// Materials of destroyed enemies, released on the next prune.
    retired_materials: Vec<MaterialId>,
    outcome: Option<Outcome>,
    rng: StdRng,
}

impl Level {
    /// Build the scene: camera, two lights, the player and the enemy grid.
    /// Blocks until every texture has decoded or failed.
    pub fn new(config: &GameConfig, gpu: &mut dyn GraphicsDevice, mut rng: StdRng) -> Result<Self> {
        let camera = Camera::looking_along(CAMERA_POSITION, Vec3::NEG_Y, Vec3::NEG_Z);
        let mut scene = Scene::new(camera);

        scene.add_light(Light::point(Vec3::new(5.0, 5.0, 5.0), Vec3::new(1.0, 0.8, 0.8), 1.0));
        scene.add_light(Light::point(Vec3::new(-5.0, 5.0, -5.0), Vec3::new(0.8, 0.8, 1.0), 0.7));

        // Fallback cubes are sized so they read at the entity's scale.
        let player_mesh = load_model(&mut scene, gpu, config.player_model.as_deref(), 1.0 / PLAYER_SCALE);
        let enemy_mesh = load_model(&mut scene, gpu, config.enemy_model.as_deref(), 0.8 / ENEMY_SCALE);

        let mut material = lit_material("player", gpu, config.player_texture.as_deref())?;
        material.set_uniform("color", PLAYER_COLOR);
        let player_material = scene.add_material(material);
        let player_entity = scene.spawn(
            Transform::from_position_scale(PLAYER_START, PLAYER_SCALE),
            player_mesh,
            Some(player_material),
        );
        let player = Player::new(player_entity, config.player_speed);

        let mut enemies = Vec::with_capacity(ENEMY_ROWS * ENEMY_COLUMNS);
        for i in 0..ENEMY_ROWS {
            for j in 0..ENEMY_COLUMNS {
                let position = Vec3::new(-3.0 + 2.0 * j as f32, 0.0, 2.0 - 1.5 * i as f32 - 15.0);
                let mut material = lit_material("enemy", gpu, config.enemy_texture.as_deref())?;
                material.set_uniform("color", random_color(&mut rng));
                let material = scene.add_material(material);
                let entity = scene.spawn(
                    Transform::from_position_scale(position, ENEMY_SCALE),
                    enemy_mesh,
                    Some(material),
                );
                enemies.push(Enemy::new(entity, material, position, &mut rng));
            }
        }

        // Entities hold their own references now.
        scene.release_mesh(player_mesh);
        scene.release_mesh(enemy_mesh);

        let bullets = BulletManager::new(&mut scene, gpu).context("Failed to build bullet material")?;
        scene.finish_loading(gpu);

        log::info!("Level ready: {} enemies, {} lights", enemies.len(), scene.light_count());

        Ok(Self {
            scene,
            player,
            enemies,
            group: EnemyGroupState::default(),
            bullets,
            tuning: Tuning {
                fire_cooldown: config.fire_cooldown,
                bullet_speed: config.bullet_speed,
                targeting_interval: config.targeting_interval,
                attack: AttackSettings {
                    interval: config.enemy_attack_interval,
                    bullet_speed: config.enemy_bullet_speed,
                },
            },
            fire_cooldown: 0.0,
            targeting_timer: 0.0,
            retired_materials: Vec::new(),
            outcome: None,
            rng,
        })
    }

    /// Run one simulation step. Returns the outcome once the game is decided;
    /// after that the level no longer changes.
    pub fn update(&mut self, dt: f32, input: &impl KeyInput, viewport: (u32, u32)) -> Option<Outcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }

        self.player.handle_input(input, dt, &mut self.scene);
        self.fire(dt, input);
        self.bullets.update(dt, &mut self.scene);
        self.pick_attacker(dt);
        self.group.update(
            dt,
            &mut self.enemies,
            &mut self.scene,
            &mut self.bullets,
            &self.tuning.attack,
            &mut self.rng,
        );

        let defeated = self.resolve_collisions();
        self.prune_enemies();

        self.outcome = if defeated {
            Some(Outcome::Defeat)
        } else if self.enemies.is_empty() {
            Some(Outcome::Victory)
        } else {
            None
        };

        self.scene.update(dt, viewport);
        self.outcome
    }

    /// Space fires when the cooldown has run out.
    fn fire(&mut self, dt: f32, input: &impl KeyInput) {
        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);
        if self.fire_cooldown > 0.0 || !input.is_key_down(KeyCode::Space) {
            return;
        }
        let Some(position) = self.scene.position(self.player.entity) else {
            return;
        };
        self.bullets.create_bullet(
            &mut self.scene,
            position + MUZZLE_OFFSET,
            Vec3::NEG_Z,
            self.tuning.bullet_speed,
            vec![self.player.entity],
        );
        self.fire_cooldown = self.tuning.fire_cooldown;
    }

    /// Periodically send one idle enemy after the player.
    fn pick_attacker(&mut self, dt: f32) {
        self.targeting_timer += dt;
        if self.targeting_timer < self.tuning.targeting_interval {
            return;
        }
        self.targeting_timer = 0.0;
        if self.scene.is_destroyed(self.player.entity) {
            return;
        }

        let scene = &self.scene;
        let idle: Vec<usize> = self
            .enemies
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.is_targeting() && !scene.is_destroyed(e.entity))
            .map(|(i, _)| i)
            .collect();
        if let Some(&index) = idle.choose(&mut self.rng) {
            self.enemies[index].set_target(self.player.entity, self.tuning.attack.interval);
            log::debug!("Enemy {:?} is attacking", self.enemies[index].entity);
        }
    }

    /// Returns true when the player was destroyed.
    fn resolve_collisions(&mut self) -> bool {
        let player = self.player.entity;
        let targets: Vec<Entity> = self.enemies.iter().map(|e| e.entity).collect();

        self.bullets.check_collisions(&targets, &mut self.scene, |hit, scene| {
            scene.destroy_entity(hit.target);
            scene.destroy_entity(hit.bullet);
        });

        let mut defeated = false;
        self.bullets.check_collisions(&[player], &mut self.scene, |hit, scene| {
            scene.destroy_entity(hit.bullet);
            scene.destroy_entity(hit.target);
            defeated = true;
        });

        for enemy in &self.enemies {
            let (Some(enemy_pos), Some(player_pos)) =
                (self.scene.position(enemy.entity), self.scene.position(player))
            else {
                continue;
            };
            if spheres_overlap(enemy_pos, player_pos) {
                self.scene.destroy_entity(enemy.entity);
                self.scene.destroy_entity(player);
                defeated = true;
            }
        }
        defeated
    }

    fn prune_enemies(&mut self) {
        let scene = &self.scene;
        let retired = &mut self.retired_materials;
        self.enemies.retain(|enemy| {
            let alive = !scene.is_destroyed(enemy.entity);
            if !alive {
                retired.push(enemy.material);
            }
            alive
        });
    }

    /// Release GPU resources of everything destroyed since the last call and
    /// pick up finished texture decodes.
    pub fn prune(&mut self, gpu: &mut dyn GraphicsDevice) {
        for material in self.retired_materials.drain(..) {
            self.scene.remove_material(gpu, material);
        }
        self.scene.prune(gpu);
        self.scene.poll_textures(gpu);
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn bullets(&self) -> &BulletManager {
        &self.bullets
    }
}

/// Upload the OBJ at `path`, or a cube of edge `fallback_size` when there
/// is no path or it fails to load.
fn load_model(scene: &mut Scene, gpu: &mut dyn GraphicsDevice, path: Option<&Path>, fallback_size: f32) -> MeshId {
    let geometry = match path.map(load_obj) {
        Some(Ok(geometry)) => geometry,
        Some(Err(e)) => {
            log::error!("{}; using a cube", e);
            Geometry::cube(fallback_size)
        }
        None => Geometry::cube(fallback_size),
    };
    scene.upload_mesh(gpu, &geometry)
}

fn lit_material(label: &str, gpu: &mut dyn GraphicsDevice, texture: Option<&Path>) -> Result<Material> {
    let mut material = Material::new(label, LIT);
    material
        .compile(gpu)
        .with_context(|| format!("Failed to compile '{}' material", label))?;
    if let Some(path) = texture {
        material.add_texture(gpu, path, TEXTURE_SAMPLER);
    }
    Ok(material)
}

/// Everything an engine tick needs: the level, keyboard state and the
/// current surface size.
pub struct Session {
    pub level: Level,
    pub input: InputState,
    pub viewport: (u32, u32),
}

impl Session {
    pub fn new(level: Level, viewport: (u32, u32)) -> Self {
        Self {
            level,
            input: InputState::new(),
            viewport,
        }
    }

    /// OnUpdate handler. Stops the engine once the game is decided.
    pub fn on_tick(&mut self, tick: &Tick) {
        if let Some(outcome) = self.level.update(tick.delta, &self.input, self.viewport) {
            match outcome {
                Outcome::Victory => log::info!("All enemies destroyed after {:.1}s", tick.elapsed),
                Outcome::Defeat => log::info!("Player destroyed after {:.1}s", tick.elapsed),
            }
            tick.control.stop();
        }
        self.input.begin_frame();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Engine;
    use rand::SeedableRng;
    use renderer::{HeadlessDevice, Renderer};
    use std::collections::HashSet;

    const VIEWPORT: (u32, u32) = (800, 600);

    fn level(gpu: &mut HeadlessDevice) -> Level {
        Level::new(&GameConfig::default(), gpu, StdRng::seed_from_u64(11)).unwrap()
    }

    fn no_keys() -> HashSet<KeyCode> {
        HashSet::new()
    }

    #[test]
    fn setup_places_player_and_grid() {
        let mut gpu = HeadlessDevice::new();
        let level = level(&mut gpu);
        assert_eq!(level.enemies().len(), 12);
        assert_eq!(level.scene.light_count(), 2);
        assert_eq!(level.scene.position(level.player().entity), Some(PLAYER_START));

        let first = level.enemies()[0].original_position;
        let last = level.enemies()[11].original_position;
        assert_eq!(first, Vec3::new(-3.0, 0.0, -13.0));
        assert_eq!(last, Vec3::new(3.0, 0.0, -16.0));
        assert_eq!(level.scene.transform(level.enemies()[0].entity).unwrap().scale, Vec3::splat(ENEMY_SCALE));
    }

    #[test]
    fn missing_model_file_falls_back_to_a_cube() {
        let mut gpu = HeadlessDevice::new();
        let config = GameConfig {
            enemy_model: Some("does/not/exist.obj".into()),
            ..Default::default()
        };
        let level = Level::new(&config, &mut gpu, StdRng::seed_from_u64(1)).unwrap();
        let mesh = level.scene.renderable(level.enemies()[0].entity).unwrap().mesh;
        assert_eq!(level.scene.meshes().get(mesh).map(|(_, count)| count), Some(36));
        assert_eq!(level.scene.meshes().ref_count(mesh), 12);
    }

    #[test]
    fn space_fires_with_cooldown() {
        let mut gpu = HeadlessDevice::new();
        // Parked bullets cannot reach the formation and disappear early.
        let config = GameConfig {
            bullet_speed: 0.0,
            ..Default::default()
        };
        let mut level = Level::new(&config, &mut gpu, StdRng::seed_from_u64(3)).unwrap();
        let keys = HashSet::from([KeyCode::Space]);

        level.update(0.1, &keys, VIEWPORT);
        assert_eq!(level.bullets().len(), 1);
        let bullet = &level.bullets().bullets()[0];
        assert!(bullet.ignore.contains(&level.player().entity));
        assert_eq!(bullet.direction, Vec3::NEG_Z);

        for _ in 0..5 {
            level.update(0.1, &keys, VIEWPORT);
        }
        assert_eq!(level.bullets().len(), 1);
        for _ in 0..6 {
            level.update(0.1, &keys, VIEWPORT);
        }
        assert_eq!(level.bullets().len(), 2);
    }

    #[test]
    fn an_enemy_is_sent_after_the_player_every_interval() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        level.update(2.9, &no_keys(), VIEWPORT);
        assert!(level.enemies().iter().all(|e| !e.is_targeting()));
        level.update(0.2, &no_keys(), VIEWPORT);
        let attackers: Vec<_> = level.enemies().iter().filter(|e| e.is_targeting()).collect();
        assert_eq!(attackers.len(), 1);
        assert_eq!(attackers[0].target, Some(level.player().entity));
    }

    #[test]
    fn bullet_hitting_an_enemy_destroys_both() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        let enemy = level.enemies()[0].entity;
        let at = level.scene.position(enemy).unwrap();
        let bullet = level
            .bullets
            .create_bullet(&mut level.scene, at + Vec3::new(0.0, 0.0, 0.5), Vec3::NEG_Z, 0.0, Vec::new());

        assert_eq!(level.update(0.016, &no_keys(), VIEWPORT), None);
        assert!(level.scene.is_destroyed(enemy));
        assert!(level.scene.is_destroyed(bullet));
        assert_eq!(level.enemies().len(), 11);

        let material = level.retired_materials[0];
        level.prune(&mut gpu);
        assert!(level.scene.material(material).is_none());
    }

    #[test]
    fn bullet_hitting_the_player_is_a_defeat() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        let player = level.player().entity;
        level
            .bullets
            .create_bullet(&mut level.scene, PLAYER_START, Vec3::Z, 0.0, Vec::new());

        assert_eq!(level.update(0.016, &no_keys(), VIEWPORT), Some(Outcome::Defeat));
        assert!(level.scene.is_destroyed(player));
        assert!(level.bullets().is_empty() || level.scene.is_destroyed(level.bullets().bullets()[0].entity));
    }

    #[test]
    fn enemy_reaching_the_player_is_a_defeat() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        let enemy = level.enemies()[5].entity;
        level.scene.transform_mut(enemy).unwrap().position = PLAYER_START + Vec3::new(0.2, 0.0, 0.0);

        assert_eq!(level.update(0.016, &no_keys(), VIEWPORT), Some(Outcome::Defeat));
        assert!(level.scene.is_destroyed(enemy));
        assert!(level.scene.is_destroyed(level.player().entity));
    }

    #[test]
    fn clearing_the_grid_is_a_victory() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        let all: Vec<Entity> = level.enemies().iter().map(|e| e.entity).collect();
        for entity in all {
            level.scene.destroy_entity(entity);
        }
        assert_eq!(level.update(0.016, &no_keys(), VIEWPORT), Some(Outcome::Victory));
    }

    #[test]
    fn engine_stops_when_the_game_is_decided() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        let player = level.player().entity;
        let enemy = level.enemies()[0].entity;
        level.scene.transform_mut(enemy).unwrap().position = PLAYER_START;

        let mut engine = Engine::new(Session::new(level, VIEWPORT));
        engine.on_update(Session::on_tick);
        engine.start();
        assert!(engine.tick_with(0.016));
        assert!(!engine.is_running());
        assert!(!engine.tick_with(0.016));
        assert_eq!(engine.state().level.outcome(), Some(Outcome::Defeat));
        assert!(engine.state().level.scene.is_destroyed(player));
    }

    #[test]
    fn a_full_frame_renders_every_live_entity() {
        let mut gpu = HeadlessDevice::new();
        let mut level = level(&mut gpu);
        level.update(0.016, &HashSet::from([KeyCode::Space]), VIEWPORT);
        level.prune(&mut gpu);
        gpu.clear_calls();

        let stats = Renderer::new().render(&mut level.scene, &mut gpu);
        assert_eq!(stats.drawn, 1 + 12 + 1);
        assert_eq!(stats.skipped, 0);
    }
}
