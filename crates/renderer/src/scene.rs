//! The scene: renderable entities, lights, the camera, and the GPU
//! resources they share.
//!
//! Entities live in a hecs [`World`] with a [`Transform`] and a
//! [`Renderable`]. Draw order is the insertion order of the entity list,
//! which is kept separately from the world so an entity can be taken out
//! of the scene without being despawned.

use std::cell::Cell;
use std::collections::HashMap;

use engine_core::Transform;
use glam::{Mat4, Vec3};
use hecs::{Entity, World};

use crate::camera::Camera;
use crate::device::GraphicsDevice;
use crate::light::{Light, MAX_LIGHTS};
use crate::material::Material;
use crate::mesh::{Geometry, MeshId, MeshStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(u32);

/// Geometry and shading for an entity, plus its last computed model matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
    pub model_matrix: Mat4,
}

pub struct Scene {
    pub(crate) world: World,
    pub(crate) entities: Vec<Entity>,
    pub(crate) lights: Vec<(LightId, Light)>,
    pub(crate) materials: HashMap<MaterialId, Material>,
    pub(crate) meshes: MeshStore,
    pub camera: Camera,
    next_light: u32,
    next_material: u32,
    pub(crate) light_cap_reported: Cell<bool>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            world: World::new(),
            entities: Vec::new(),
            lights: Vec::new(),
            materials: HashMap::new(),
            meshes: MeshStore::new(),
            camera,
            next_light: 0,
            next_material: 0,
            light_cap_reported: Cell::new(false),
        }
    }

    // --- Resources ---

    /// Upload geometry. The caller owns one reference; drop it with
    /// [`Scene::release_mesh`] once no new entities need the mesh.
    pub fn upload_mesh(&mut self, gpu: &mut dyn GraphicsDevice, geometry: &Geometry) -> MeshId {
        self.meshes.upload(gpu, geometry)
    }

    pub fn release_mesh(&mut self, mesh: MeshId) {
        self.meshes.release(mesh);
    }

    pub fn meshes(&self) -> &MeshStore {
        &self.meshes
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        let id = MaterialId(self.next_material);
        self.next_material += 1;
        self.materials.insert(id, material);
        id
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(&id)
    }

    /// Remove a material and free its GPU resources. Entities still
    /// pointing at it are skipped by the renderer.
    pub fn remove_material(&mut self, gpu: &mut dyn GraphicsDevice, id: MaterialId) {
        if let Some(mut material) = self.materials.remove(&id) {
            material.release(gpu);
        }
    }

    /// Swap in finished texture decodes on every material. Never blocks.
    pub fn poll_textures(&mut self, gpu: &mut dyn GraphicsDevice) {
        for material in self.materials.values_mut() {
            material.poll_textures(gpu);
        }
    }

    /// Block until every material's textures have loaded or failed.
    pub fn finish_loading(&mut self, gpu: &mut dyn GraphicsDevice) {
        for material in self.materials.values_mut() {
            material.finish_loading(gpu);
        }
    }

    // --- Entities ---

    /// Create an entity and append it to the draw list.
    pub fn spawn(&mut self, transform: Transform, mesh: MeshId, material: Option<MaterialId>) -> Entity {
        if !self.meshes.retain(mesh) {
            log::warn!("Spawning entity with unknown mesh {:?}", mesh);
        }
        let renderable = Renderable {
            mesh,
            material,
            model_matrix: transform.model_matrix(),
        };
        let entity = self.world.spawn((transform, renderable));
        self.entities.push(entity);
        entity
    }

    /// Put a live entity back on the draw list. No-op if already listed.
    pub fn add_entity(&mut self, entity: Entity) {
        if self.world.contains(entity) && !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
    }

    /// Take an entity off the draw list without destroying it.
    /// No-op if it is not listed.
    pub fn remove_entity(&mut self, entity: Entity) {
        if let Some(index) = self.entities.iter().position(|&e| e == entity) {
            self.entities.remove(index);
        }
    }

    /// Remove, despawn and drop the entity's mesh reference.
    /// Returns false if it was already destroyed.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.world.contains(entity) {
            return false;
        }
        self.remove_entity(entity);
        let mesh = self.world.get::<&Renderable>(entity).ok().map(|r| r.mesh);
        self.world.despawn(entity).ok();
        if let Some(mesh) = mesh {
            self.meshes.release(mesh);
        }
        true
    }

    pub fn is_destroyed(&self, entity: Entity) -> bool {
        !self.world.contains(entity)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn transform(&self, entity: Entity) -> Option<Transform> {
        self.world.get::<&Transform>(entity).ok().map(|t| *t)
    }

    pub fn transform_mut(&mut self, entity: Entity) -> Option<hecs::RefMut<'_, Transform>> {
        self.world.get::<&mut Transform>(entity).ok()
    }

    pub fn position(&self, entity: Entity) -> Option<Vec3> {
        self.world.get::<&Transform>(entity).ok().map(|t| t.position)
    }

    pub fn renderable(&self, entity: Entity) -> Option<Renderable> {
        self.world.get::<&Renderable>(entity).ok().map(|r| *r)
    }

    // --- Lights ---

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.next_light);
        self.next_light += 1;
        self.lights.push((id, light));
        if self.lights.len() > MAX_LIGHTS {
            log::warn!(
                "Scene has {} lights; only the first {} are drawn",
                self.lights.len(),
                MAX_LIGHTS
            );
        }
        id
    }

    pub fn remove_light(&mut self, id: LightId) -> Option<Light> {
        let index = self.lights.iter().position(|(lid, _)| *lid == id)?;
        Some(self.lights.remove(index).1)
    }

    pub fn lights(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter().map(|(_, l)| l)
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Push up to [`MAX_LIGHTS`] lights into the material and set
    /// `num_lights`. Extra lights are dropped and reported once.
    pub fn apply_lights_to_material(&self, material: &mut Material) {
        apply_lights(&self.lights, &self.light_cap_reported, material);
    }

    // --- Frame ---

    /// Recompute the camera for the viewport, then every listed entity's
    /// model matrix, then every light, in insertion order.
    pub fn update(&mut self, dt: f32, viewport: (u32, u32)) {
        self.camera.update(viewport.0, viewport.1);
        for &entity in &self.entities {
            if let Ok((transform, renderable)) = self.world.query_one_mut::<(&Transform, &mut Renderable)>(entity) {
                renderable.model_matrix = transform.model_matrix();
            }
        }
        for (_, light) in self.lights.iter_mut() {
            light.update(dt);
        }
    }

    /// Drop destroyed entities from the draw list and free GPU buffers of
    /// meshes that lost their last reference. Returns the number freed.
    pub fn prune(&mut self, gpu: &mut dyn GraphicsDevice) -> usize {
        let world = &self.world;
        self.entities.retain(|&e| world.contains(e));
        self.meshes.flush_releases(gpu)
    }

    /// Destroy everything and free every GPU resource the scene owns.
    pub fn clear(&mut self, gpu: &mut dyn GraphicsDevice) {
        let all: Vec<Entity> = self.world.iter().map(|e| e.entity()).collect();
        for entity in all {
            self.destroy_entity(entity);
        }
        for (_, mut material) in self.materials.drain() {
            material.release(gpu);
        }
        self.lights.clear();
        self.meshes.flush_releases(gpu);
    }
}

pub(crate) fn apply_lights(lights: &[(LightId, Light)], reported: &Cell<bool>, material: &mut Material) {
    if lights.len() > MAX_LIGHTS && !reported.replace(true) {
        log::warn!(
            "Maximum light limit ({}) reached; {} lights dropped",
            MAX_LIGHTS,
            lights.len() - MAX_LIGHTS
        );
    }
    for (index, (_, light)) in lights.iter().take(MAX_LIGHTS).enumerate() {
        light.apply_to_material(material, index);
    }
    material.set_uniform("num_lights", lights.len().min(MAX_LIGHTS) as i32);
}
