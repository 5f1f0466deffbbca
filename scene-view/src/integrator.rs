//! Numeric integrator for an assembled physics model.
//!
//! This is a collaborator of the scene core, not part of it: the core
//! hands over harvested entity ids and coefficients and only tracks the
//! running flag. The scheme here is a plain semi-implicit Euler step
//! with Hooke spring forces, gravity, friction damping, and a bounce
//! against the plane.
//!
//! Springs couple particles by harvest order: spring `k` connects
//! particles `k` and `k + 1`. A spring without a second particle is
//! anchored at its own assemble-time position.

use glam::Vec3;
use scene_core::entity::{EntityKind, SceneEntity};
use scene_core::sim::PhysicsModel;
use scene_core::tree::Tree;

const MIN_MASS: f32 = 1e-3;

/// Integration state carried between frames.
///
/// Velocities and spring anchors are seeded from the scene on the first
/// step after a [`reset`]; the scene entities themselves only hold the
/// editable initial values.
///
/// [`reset`]: Integrator::reset
#[derive(Debug, Default)]
pub struct Integrator {
    velocities: Vec<Vec3>,
    anchors: Vec<Vec3>,
}

impl Integrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the carried state so the next step reseeds from the scene.
    ///
    /// Call after assembling a model or restoring its snapshot.
    pub fn reset(&mut self) {
        self.velocities.clear();
        self.anchors.clear();
    }

    fn seed(&mut self, tree: &Tree<SceneEntity>, model: &PhysicsModel) {
        self.velocities = model
            .particles
            .iter()
            .map(|&id| {
                let u = match tree.get(id).map(|e| &e.kind) {
                    Some(&EntityKind::Particle { velocity, .. }) => velocity,
                    _ => 0.0,
                };
                Vec3::new(0.0, u, 0.0)
            })
            .collect();
        self.anchors = model
            .springs
            .iter()
            .map(|&id| tree.get(id).map(|e| e.position).unwrap_or(Vec3::ZERO))
            .collect();
    }

    /// Advances every model participant by one `dt` step.
    pub fn step(&mut self, tree: &mut Tree<SceneEntity>, model: &PhysicsModel, dt: f32) {
        let dt = dt * model.coefficients.time_scale;
        if dt <= 0.0 {
            return;
        }
        if self.velocities.len() != model.particles.len()
            || self.anchors.len() != model.springs.len()
        {
            self.seed(tree, model);
        }

        let mut forces = vec![Vec3::ZERO; model.particles.len()];
        let masses: Vec<f32> = model
            .particles
            .iter()
            .map(|&id| match tree.get(id).map(|e| &e.kind) {
                Some(&EntityKind::Particle { mass, .. }) => mass.max(MIN_MASS),
                _ => MIN_MASS,
            })
            .collect();

        // Gravity plus the editable applied force, per particle.
        for (i, &id) in model.particles.iter().enumerate() {
            let applied = match tree.get(id).map(|e| &e.kind) {
                Some(&EntityKind::Particle { force, .. }) => force,
                _ => 0.0,
            };
            forces[i].y += applied - model.coefficients.gravity * masses[i];
        }

        // Hooke force along each spring axis, plus spring display state.
        for (k, &spring_id) in model.springs.iter().enumerate() {
            let Some(&a_id) = model.particles.get(k) else {
                break;
            };
            let a = tree.get(a_id).map(|e| e.position).unwrap_or(Vec3::ZERO);
            let b = match model.particles.get(k + 1) {
                Some(&b_id) => tree.get(b_id).map(|e| e.position).unwrap_or(Vec3::ZERO),
                None => self.anchors[k],
            };

            let (rest, elasticity) = match tree.get(spring_id).map(|e| &e.kind) {
                Some(&EntityKind::Spring {
                    length, elasticity, ..
                }) => (length, elasticity),
                _ => continue,
            };

            let delta = b - a;
            let dist = delta.length();
            let dir = if dist > 1e-6 { delta / dist } else { Vec3::ZERO };
            let stretch = dist - rest;
            let pull = dir * (elasticity * stretch);

            forces[k] += pull;
            if k + 1 < forces.len() {
                forces[k + 1] -= pull;
            }

            if let Some(spring) = tree.get_mut(spring_id) {
                spring.snap_to(a);
                if let EntityKind::Spring {
                    extension,
                    rotation,
                    ..
                } = &mut spring.kind
                {
                    *extension = stretch;
                    if dist > 1e-6 {
                        *rotation = f32::atan2(-dir.x, dir.y);
                    }
                }
            }
        }

        // Semi-implicit Euler with friction damping and plane bounce.
        let damping = (1.0 - model.coefficients.friction * dt).max(0.0);
        let (plane_point, plane_normal) = plane_surface(tree, model);

        for (i, &id) in model.particles.iter().enumerate() {
            self.velocities[i] += forces[i] / masses[i] * dt;
            self.velocities[i] *= damping;

            let Some(entity) = tree.get_mut(id) else {
                continue;
            };
            let radius = entity.scale;
            let mut position = entity.position + self.velocities[i] * dt;

            let depth = (position - plane_point).dot(plane_normal);
            if depth < radius {
                position += plane_normal * (radius - depth);
                let closing = self.velocities[i].dot(plane_normal);
                if closing < 0.0 {
                    self.velocities[i] -=
                        plane_normal * ((1.0 + model.coefficients.restitution) * closing);
                }
            }

            entity.snap_to(position);
        }
    }
}

fn plane_surface(tree: &Tree<SceneEntity>, model: &PhysicsModel) -> (Vec3, Vec3) {
    match tree.get(model.plane) {
        Some(entity) => {
            let rotation = match entity.kind {
                EntityKind::Plane { rotation, .. } => rotation,
                _ => 0.0,
            };
            let normal = Vec3::new(-rotation.sin(), rotation.cos(), 0.0);
            (entity.position, normal)
        }
        None => (Vec3::ZERO, Vec3::Y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_core::sim::{self, SimState};
    use scene_core::types::NodeId;

    struct Scene {
        tree: Tree<SceneEntity>,
        world: NodeId,
        particle: NodeId,
        spring: NodeId,
        plane: NodeId,
    }

    fn build_scene() -> Scene {
        let mut rng = rand::rng();
        let mut tree = Tree::new();
        let root = tree.create(SceneEntity::root());
        let world = tree.create(SceneEntity::world("world", 1.0, &mut rng));
        let particle = tree.create(SceneEntity::particle("pa", 0.1));
        let spring = tree.create(SceneEntity::spring("sp", 1.0));
        let plane = tree.create(SceneEntity::plane("pl", 1.0));
        tree.insert(root, world, None);
        tree.insert(world, particle, None);
        tree.insert(world, spring, None);
        tree.insert(world, plane, None);
        Scene {
            tree,
            world,
            particle,
            spring,
            plane,
        }
    }

    fn take_model(scene: &mut Scene) -> PhysicsModel {
        scene
            .tree
            .get_mut(scene.world)
            .unwrap()
            .as_world_mut()
            .unwrap()
            .model
            .take()
            .unwrap()
    }

    #[test]
    fn gravity_pulls_a_free_particle_down() {
        let mut scene = build_scene();
        // Drop the plane well below so the particle falls freely, and
        // leave the spring anchored exactly at the particle (no force).
        scene
            .tree
            .get_mut(scene.plane)
            .unwrap()
            .snap_to(Vec3::new(0.0, -100.0, 0.0));
        if let EntityKind::Plane { rotation, .. } =
            &mut scene.tree.get_mut(scene.plane).unwrap().kind
        {
            *rotation = 0.0;
        }

        sim::assemble(&mut scene.tree, scene.world).unwrap();
        sim::start(&mut scene.tree, scene.world).unwrap();
        let model = take_model(&mut scene);

        let mut integrator = Integrator::new();
        for _ in 0..10 {
            integrator.step(&mut scene.tree, &model, 0.01);
        }

        assert!(scene.tree.get(scene.particle).unwrap().position.y < 0.0);
    }

    #[test]
    fn plane_bounce_keeps_the_particle_above_the_surface() {
        let mut scene = build_scene();
        // Horizontal plane through the origin, particle resting just on it.
        if let EntityKind::Plane { rotation, .. } =
            &mut scene.tree.get_mut(scene.plane).unwrap().kind
        {
            *rotation = 0.0;
        }
        {
            let particle = scene.tree.get_mut(scene.particle).unwrap();
            particle.snap_to(Vec3::new(0.0, 0.2, 0.0));
            if let EntityKind::Particle { velocity, .. } = &mut particle.kind {
                *velocity = -5.0;
            }
        }

        sim::assemble(&mut scene.tree, scene.world).unwrap();
        let model = take_model(&mut scene);

        let mut integrator = Integrator::new();
        for _ in 0..100 {
            integrator.step(&mut scene.tree, &model, 0.01);
            let y = scene.tree.get(scene.particle).unwrap().position.y;
            let radius = scene.tree.get(scene.particle).unwrap().scale;
            assert!(y >= radius - 1e-3, "particle sank through the plane: {y}");
        }
    }

    #[test]
    fn anchored_spring_pulls_the_particle_back() {
        let mut scene = build_scene();
        // No gravity: the only force is the stretched spring anchored at
        // the origin.
        scene
            .tree
            .get_mut(scene.world)
            .unwrap()
            .as_world_mut()
            .unwrap()
            .gravity = 0.0;
        scene
            .tree
            .get_mut(scene.plane)
            .unwrap()
            .snap_to(Vec3::new(0.0, -100.0, 0.0));
        scene
            .tree
            .get_mut(scene.particle)
            .unwrap()
            .snap_to(Vec3::new(0.0, -3.0, 0.0));

        sim::assemble(&mut scene.tree, scene.world).unwrap();
        let model = take_model(&mut scene);

        let mut integrator = Integrator::new();
        for _ in 0..10 {
            integrator.step(&mut scene.tree, &model, 0.01);
        }

        // Pulled up toward the anchor, and the spring now reports a
        // positive extension along the updated axis.
        assert!(scene.tree.get(scene.particle).unwrap().position.y > -3.0);
        match scene.tree.get(scene.spring).unwrap().kind {
            EntityKind::Spring { extension, .. } => assert!(extension > 0.0),
            _ => unreachable!(),
        }
    }

    #[test]
    fn paused_model_state_survives_a_reset_of_the_integrator() {
        let mut scene = build_scene();
        sim::assemble(&mut scene.tree, scene.world).unwrap();
        assert_eq!(
            scene
                .tree
                .get(scene.world)
                .unwrap()
                .as_world()
                .unwrap()
                .state,
            SimState::Simulating
        );

        let model = take_model(&mut scene);
        let mut integrator = Integrator::new();
        integrator.step(&mut scene.tree, &model, 0.01);
        integrator.reset();

        // A reset integrator reseeds and keeps stepping without panicking.
        integrator.step(&mut scene.tree, &model, 0.01);
    }
}
