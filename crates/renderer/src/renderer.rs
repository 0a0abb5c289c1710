//! Draws a [`Scene`] through a [`GraphicsDevice`].

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use glam::{Mat4, Vec3};
use hecs::{Entity, World};
use thiserror::Error;

use crate::device::GraphicsDevice;
use crate::light::Light;
use crate::material::Material;
use crate::mesh::MeshStore;
use crate::scene::{apply_lights, LightId, MaterialId, Renderable, Scene};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("entity {entity:?} has no material")]
    MissingMaterial { entity: Entity },
    #[error("entity {entity:?} uses material {material:?} which does not exist")]
    UnknownMaterial { entity: Entity, material: MaterialId },
    #[error("entity {entity:?}: material '{label}' has no compiled program")]
    NotCompiled { entity: Entity, label: String },
    #[error("entity {entity:?} references a released mesh")]
    UnknownMesh { entity: Entity },
}

/// Draw counts for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub drawn: usize,
    pub skipped: usize,
}

/// Walks the scene's entity list and issues one draw per entity.
/// Entities that cannot be drawn are reported once and skipped.
#[derive(Debug, Default)]
pub struct Renderer {
    reported: HashSet<Entity>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw every listed entity in insertion order.
    pub fn render(&mut self, scene: &mut Scene, gpu: &mut dyn GraphicsDevice) -> FrameStats {
        let Scene {
            world,
            entities,
            lights,
            materials,
            meshes,
            camera,
            light_cap_reported,
            ..
        } = scene;

        self.reported.retain(|&e| world.contains(e));

        let frame = FrameContext {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            eye: camera.position,
            lights,
            light_cap_reported,
        };
        let mut stats = FrameStats::default();

        for &entity in entities.iter() {
            match draw_entity(&frame, world, materials, meshes, gpu, entity) {
                Ok(()) => stats.drawn += 1,
                Err(err) => {
                    stats.skipped += 1;
                    if self.reported.insert(entity) {
                        log::warn!("Skipping draw: {}", err);
                    }
                }
            }
        }
        stats
    }
}

struct FrameContext<'a> {
    view: Mat4,
    projection: Mat4,
    eye: Vec3,
    lights: &'a [(LightId, Light)],
    light_cap_reported: &'a Cell<bool>,
}

fn draw_entity(
    frame: &FrameContext<'_>,
    world: &World,
    materials: &mut HashMap<MaterialId, Material>,
    meshes: &MeshStore,
    gpu: &mut dyn GraphicsDevice,
    entity: Entity,
) -> Result<(), DrawError> {
    let renderable = world
        .get::<&Renderable>(entity)
        .map(|r| *r)
        .map_err(|_| DrawError::UnknownMesh { entity })?;
    let material_id = renderable.material.ok_or(DrawError::MissingMaterial { entity })?;
    let material = materials.get_mut(&material_id).ok_or(DrawError::UnknownMaterial {
        entity,
        material: material_id,
    })?;
    let program = material.program().ok_or_else(|| DrawError::NotCompiled {
        entity,
        label: material.label().to_string(),
    })?;
    let (mesh, index_count) = meshes.get(renderable.mesh).ok_or(DrawError::UnknownMesh { entity })?;

    gpu.use_program(program);
    material.set_uniform("model_matrix", renderable.model_matrix);
    material.set_uniform("view_matrix", frame.view);
    material.set_uniform("projection_matrix", frame.projection);
    material.set_uniform("view_pos", frame.eye);
    apply_lights(frame.lights, frame.light_cap_reported, material);
    material.apply_uniforms(gpu);
    gpu.draw_indexed(mesh, index_count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::UniformValue;
    use crate::headless::{DeviceCall, HeadlessDevice};
    use crate::mesh::Geometry;
    use crate::shaders::{LIT, UNLIT};
    use engine_core::Transform;

    fn compiled(gpu: &mut HeadlessDevice, source: &str) -> Material {
        let mut material = Material::new("m", source);
        material.compile(gpu).unwrap();
        material
    }

    #[test]
    fn draws_each_entity_with_its_matrices() {
        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        let mesh = scene.upload_mesh(&mut gpu, &Geometry::cube(1.0));
        let material = scene.add_material(compiled(&mut gpu, LIT));
        scene.add_light(Light::point(Vec3::new(5.0, 5.0, 5.0), Vec3::ONE, 1.0));
        let e = scene.spawn(Transform::from_position(Vec3::new(1.0, 2.0, 3.0)), mesh, Some(material));
        scene.update(0.016, (800, 600));
        gpu.clear_calls();

        let stats = Renderer::new().render(&mut scene, &mut gpu);
        assert_eq!(stats, FrameStats { drawn: 1, skipped: 0 });
        assert_eq!(gpu.draws().len(), 1);
        assert_eq!(gpu.draws()[0].2, 36);

        let model = scene.material(material).unwrap().uniform_location("model_matrix").unwrap();
        let expected = UniformValue::Mat4(scene.renderable(e).unwrap().model_matrix);
        assert!(gpu.uniform_uploads().contains(&(model, expected)));

        let count = scene.material(material).unwrap().uniform_location("num_lights").unwrap();
        assert!(gpu.uniform_uploads().contains(&(count, UniformValue::Int(1))));

        let draw_at = gpu.calls().iter().position(|c| matches!(c, DeviceCall::DrawIndexed { .. }));
        let use_at = gpu.calls().iter().position(|c| matches!(c, DeviceCall::UseProgram(_)));
        assert!(use_at < draw_at);
    }

    #[test]
    fn missing_or_uncompiled_material_skips_draw() {
        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        let mesh = scene.upload_mesh(&mut gpu, &Geometry::cube(1.0));
        let uncompiled = scene.add_material(Material::new("raw", UNLIT));
        let ok = scene.add_material(compiled(&mut gpu, UNLIT));

        scene.spawn(Transform::default(), mesh, None);
        scene.spawn(Transform::default(), mesh, Some(uncompiled));
        scene.spawn(Transform::default(), mesh, Some(ok));
        scene.update(0.016, (800, 600));

        let mut renderer = Renderer::new();
        let stats = renderer.render(&mut scene, &mut gpu);
        assert_eq!(stats, FrameStats { drawn: 1, skipped: 2 });
        let stats = renderer.render(&mut scene, &mut gpu);
        assert_eq!(stats.skipped, 2);
        assert_eq!(renderer.reported.len(), 2);
    }

    #[test]
    fn untextured_material_does_not_inherit_the_previous_texture() {
        use crate::texture::{PendingTexture, TextureData};

        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        let mesh = scene.upload_mesh(&mut gpu, &Geometry::cube(1.0));
        let mut textured = compiled(&mut gpu, LIT);
        textured.attach_texture(
            &mut gpu,
            PendingTexture::ready("ship.png", Ok(TextureData::placeholder())),
            "diffuse_texture",
        );
        textured.finish_loading(&mut gpu);
        let (ship_texture, _) = textured.texture("diffuse_texture").unwrap();
        let textured = scene.add_material(textured);
        let plain = scene.add_material(compiled(&mut gpu, LIT));
        let plain_program = scene.material(plain).unwrap().program().unwrap();
        scene.spawn(Transform::default(), mesh, Some(textured));
        scene.spawn(Transform::default(), mesh, Some(plain));
        scene.update(0.016, (800, 600));

        let mut renderer = Renderer::new();
        renderer.render(&mut scene, &mut gpu);
        gpu.clear_calls();
        renderer.render(&mut scene, &mut gpu);

        let calls = gpu.calls();
        let start = calls
            .iter()
            .position(|c| *c == DeviceCall::UseProgram(plain_program))
            .unwrap();
        let draw = start
            + calls[start..]
                .iter()
                .position(|c| matches!(c, DeviceCall::DrawIndexed { .. }))
                .unwrap();
        let unit0: Vec<_> = calls[start..draw]
            .iter()
            .filter_map(|c| match c {
                DeviceCall::BindTexture { unit: 0, texture } => Some(*texture),
                _ => None,
            })
            .collect();
        assert_eq!(unit0.len(), 1);
        assert_ne!(unit0[0], ship_texture);
    }

    #[test]
    fn destroyed_entities_are_not_drawn() {
        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        let mesh = scene.upload_mesh(&mut gpu, &Geometry::cube(1.0));
        let material = scene.add_material(compiled(&mut gpu, UNLIT));
        let a = scene.spawn(Transform::default(), mesh, Some(material));
        scene.spawn(Transform::default(), mesh, Some(material));
        scene.destroy_entity(a);
        scene.prune(&mut gpu);
        scene.update(0.016, (800, 600));

        let stats = Renderer::new().render(&mut scene, &mut gpu);
        assert_eq!(stats.drawn, 1);
    }

    #[test]
    fn view_and_projection_come_from_the_camera() {
        let mut gpu = HeadlessDevice::new();
        let mut scene = Scene::default();
        scene.camera.position = Vec3::new(0.0, 20.0, -10.0);
        let mesh = scene.upload_mesh(&mut gpu, &Geometry::quad(0.05));
        let material = scene.add_material(compiled(&mut gpu, UNLIT));
        scene.spawn(Transform::default(), mesh, Some(material));
        scene.update(0.016, (800, 600));
        Renderer::new().render(&mut scene, &mut gpu);

        let m = scene.material(material).unwrap();
        assert_eq!(m.uniform("view_matrix"), Some(UniformValue::Mat4(scene.camera.view_matrix())));
        assert_eq!(m.uniform("view_pos"), Some(UniformValue::Vec3(Vec3::new(0.0, 20.0, -10.0))));
        assert_ne!(m.uniform("projection_matrix"), Some(UniformValue::Mat4(Mat4::IDENTITY)));
    }
}
