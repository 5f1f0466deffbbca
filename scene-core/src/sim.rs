//! Simulation lifecycle for world entities.
//!
//! A world assembles a physics model by harvesting typed entities from
//! its subtree, then moves between editing and simulating:
//!
//! 1. [`assemble`] — walk the subtree, collect particles/springs/plane,
//!    snapshot them, install the model, enter [`SimState::Simulating`].
//! 2. [`start`] / [`end`] — run and pause integration; ending keeps the
//!    model, so a paused run can be restarted.
//! 3. [`request_reset`] — upward dispatch from any entity to its owning
//!    world, restoring the assemble-time snapshot without discarding
//!    the model.
//! 4. [`enter_edit`] — explicit return to [`SimState::Edit`]; the next
//!    [`assemble`] replaces the model.

use crate::entity::{EntityKind, SceneEntity, World};
use crate::tree::Tree;
use crate::types::NodeId;
use glam::Vec3;
use log::debug;
use thiserror::Error;

/// Lifecycle state owned by a world entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SimState {
    /// Authoring: parameters are freely editable, no model is required.
    #[default]
    Edit,
    /// A model is assembled; integration may be running or paused.
    Simulating,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("node is not a world entity")]
    NotAWorld,

    #[error("assembly requires edit state")]
    NotEditing,

    #[error("world subtree has no {0}")]
    AssemblyFailed(&'static str),

    #[error("no physics model assembled")]
    NotAssembled,
}

pub type SimResult<T> = Result<T, SimError>;

/// Global coefficients copied from the world at assemble time.
#[derive(Clone, Copy, Debug)]
pub struct Coefficients {
    pub time_scale: f32,
    pub friction: f32,
    pub gravity: f32,
    pub restitution: f32,
}

/// Variant parameters captured in the pre-simulation snapshot.
#[derive(Clone, Copy, Debug)]
enum SavedParams {
    Plane { rotation: f32, length: f32 },
    Particle { mass: f32, force: f32, velocity: f32 },
    Spring { length: f32, extension: f32, elasticity: f32, rotation: f32 },
}

#[derive(Clone, Debug)]
struct SnapshotEntry {
    id: NodeId,
    position: Vec3,
    params: SavedParams,
}

/// Physics model assembled from a world subtree.
///
/// Owns the harvested entity ids, the coefficients in force when it was
/// built, and a snapshot of every participant's pre-run state. The
/// integrator collaborator polls [`is_running`] and advances the
/// referenced entities itself; the model only carries the start/end
/// hooks and the snapshot.
///
/// [`is_running`]: PhysicsModel::is_running
#[derive(Clone, Debug)]
pub struct PhysicsModel {
    pub particles: Vec<NodeId>,
    pub springs: Vec<NodeId>,
    pub plane: NodeId,
    pub coefficients: Coefficients,
    snapshot: Vec<SnapshotEntry>,
    running: bool,
}

impl PhysicsModel {
    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn end(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

fn world_ref(tree: &Tree<SceneEntity>, id: NodeId) -> SimResult<&World> {
    tree.get(id)
        .and_then(SceneEntity::as_world)
        .ok_or(SimError::NotAWorld)
}

fn world_mut(tree: &mut Tree<SceneEntity>, id: NodeId) -> SimResult<&mut World> {
    tree.get_mut(id)
        .and_then(SceneEntity::as_world_mut)
        .ok_or(SimError::NotAWorld)
}

fn saved_params(entity: &SceneEntity) -> Option<SavedParams> {
    match entity.kind {
        EntityKind::Plane { rotation, length } => Some(SavedParams::Plane { rotation, length }),
        EntityKind::Particle {
            mass,
            force,
            velocity,
        } => Some(SavedParams::Particle {
            mass,
            force,
            velocity,
        }),
        EntityKind::Spring {
            length,
            extension,
            elasticity,
            rotation,
        } => Some(SavedParams::Spring {
            length,
            extension,
            elasticity,
            rotation,
        }),
        _ => None,
    }
}

/// Builds a physics model from the world's subtree and transitions the
/// world from [`SimState::Edit`] to [`SimState::Simulating`].
///
/// The subtree is walked preorder with the traversal engine; particles,
/// springs, and the first plane are harvested by type code. Branches
/// under a nested world are pruned, since a nested world assembles its
/// own model. Fails without any state change when a required entity
/// kind is absent.
pub fn assemble(tree: &mut Tree<SceneEntity>, world_id: NodeId) -> SimResult<()> {
    let world = world_ref(tree, world_id)?;
    if world.state != SimState::Edit {
        return Err(SimError::NotEditing);
    }
    let coefficients = Coefficients {
        time_scale: world.time_scale,
        friction: world.friction,
        gravity: world.gravity,
        restitution: world.restitution,
    };

    let mut particles = Vec::new();
    let mut springs = Vec::new();
    let mut plane = None;

    let mut walk = tree.preorder(world_id);
    while let Some(id) = walk.next() {
        let entity = tree.get(id).expect("walked a stale node");
        match entity.kind {
            EntityKind::World(_) if id != world_id => {
                // A nested world owns its own simulation.
                walk.prune_branch();
            }
            EntityKind::Particle { .. } => particles.push(id),
            EntityKind::Spring { .. } => springs.push(id),
            EntityKind::Plane { .. } => {
                if plane.is_none() {
                    plane = Some(id);
                }
            }
            _ => {}
        }
    }

    let Some(plane) = plane else {
        return Err(SimError::AssemblyFailed("plane"));
    };
    if particles.is_empty() {
        return Err(SimError::AssemblyFailed("particle"));
    }
    if springs.is_empty() {
        return Err(SimError::AssemblyFailed("spring"));
    }

    let mut snapshot = Vec::with_capacity(particles.len() + springs.len() + 1);
    for &id in particles.iter().chain(springs.iter()).chain([plane].iter()) {
        let entity = tree.get(id).expect("harvested a stale node");
        let params = saved_params(entity).expect("harvested a non-physics entity");
        snapshot.push(SnapshotEntry {
            id,
            position: entity.position,
            params,
        });
    }

    debug!(
        "assembled model: {} particles, {} springs",
        particles.len(),
        springs.len()
    );

    let world = world_mut(tree, world_id)?;
    world.model = Some(PhysicsModel {
        particles,
        springs,
        plane,
        coefficients,
        snapshot,
        running: false,
    });
    world.state = SimState::Simulating;
    Ok(())
}

/// Begins integration on the assembled model.
///
/// Must be preceded by a successful [`assemble`].
pub fn start(tree: &mut Tree<SceneEntity>, world_id: NodeId) -> SimResult<()> {
    let world = world_mut(tree, world_id)?;
    match world.model.as_mut() {
        Some(model) => {
            debug!("world initiating simulation");
            model.start();
            Ok(())
        }
        None => Err(SimError::NotAssembled),
    }
}

/// Pauses integration.
///
/// The model stays assembled and the world stays in
/// [`SimState::Simulating`]; a later [`start`] resumes the run.
pub fn end(tree: &mut Tree<SceneEntity>, world_id: NodeId) -> SimResult<()> {
    let world = world_mut(tree, world_id)?;
    match world.model.as_mut() {
        Some(model) => {
            debug!("world ending simulation");
            model.end();
            Ok(())
        }
        None => Err(SimError::NotAssembled),
    }
}

/// Returns the world to [`SimState::Edit`].
///
/// Any running integration is paused. The model is kept, so the
/// start/end cycle stays valid until the next [`assemble`] replaces it.
pub fn enter_edit(tree: &mut Tree<SceneEntity>, world_id: NodeId) -> SimResult<()> {
    let world = world_mut(tree, world_id)?;
    if let Some(model) = world.model.as_mut() {
        model.end();
    }
    world.state = SimState::Edit;
    debug!("world back to edit state");
    Ok(())
}

/// Upward reset dispatch: restores the owning world's pre-simulation
/// snapshot.
///
/// `node` may be any entity; parent links are followed to the nearest
/// enclosing world (or `node` itself when it is a world). Editing a
/// parameter while simulating calls this to invalidate the in-flight
/// run. Without an enclosing world or an assembled model this is a
/// no-op; the model and the lifecycle state are never changed here.
pub fn request_reset(tree: &mut Tree<SceneEntity>, node: NodeId) {
    let Some(world_id) = enclosing_world(tree, node) else {
        return;
    };
    reset_world(tree, world_id);
}

/// Hook invoked after a node is attached under a world's subtree.
///
/// Like a parameter edit, a shape change invalidates the in-flight run:
/// the assembled model is reset to its snapshot. The model itself is
/// kept; only re-assembly rebuilds the harvested sets.
pub fn child_added(tree: &mut Tree<SceneEntity>, world_id: NodeId, child: NodeId) {
    debug!("world notified: child {child} added");
    reset_world(tree, world_id);
}

/// Hook invoked before a node is detached from a world's subtree.
///
/// Mirrors [`child_added`].
pub fn child_removed(tree: &mut Tree<SceneEntity>, world_id: NodeId, child: NodeId) {
    debug!("world notified: child {child} removed");
    reset_world(tree, world_id);
}

/// Nearest world entity at or above `node`, following parent links.
pub fn enclosing_world(tree: &Tree<SceneEntity>, node: NodeId) -> Option<NodeId> {
    let mut cursor = Some(node);
    while let Some(id) = cursor {
        if tree.get(id)?.as_world().is_some() {
            return Some(id);
        }
        cursor = tree.parent(id);
    }
    None
}

fn reset_world(tree: &mut Tree<SceneEntity>, world_id: NodeId) {
    let entries = match world_ref(tree, world_id) {
        Ok(world) => match &world.model {
            Some(model) => model.snapshot.clone(),
            None => return,
        },
        Err(_) => return,
    };

    debug!("world resetting simulation state");
    for entry in entries {
        let Some(entity) = tree.get_mut(entry.id) else {
            continue;
        };
        entity.snap_to(entry.position);
        match (&mut entity.kind, entry.params) {
            (
                EntityKind::Plane { rotation, length },
                SavedParams::Plane {
                    rotation: r,
                    length: l,
                },
            ) => {
                *rotation = r;
                *length = l;
            }
            (
                EntityKind::Particle {
                    mass,
                    force,
                    velocity,
                },
                SavedParams::Particle {
                    mass: m,
                    force: f,
                    velocity: v,
                },
            ) => {
                *mass = m;
                *force = f;
                *velocity = v;
            }
            (
                EntityKind::Spring {
                    length,
                    extension,
                    elasticity,
                    rotation,
                },
                SavedParams::Spring {
                    length: l,
                    extension: x,
                    elasticity: e,
                    rotation: r,
                },
            ) => {
                *length = l;
                *extension = x;
                *elasticity = e;
                *rotation = r;
            }
            // The slot was recycled into a different kind; skip it.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::SceneEntity;

    struct Scene {
        tree: Tree<SceneEntity>,
        world: NodeId,
        particle: NodeId,
        spring: NodeId,
        plane: NodeId,
    }

    /// root -> world -> [particle, spring, plane]
    fn build_scene() -> Scene {
        let mut rng = rand::rng();
        let mut tree = Tree::new();
        let root = tree.create(SceneEntity::root());
        let world = tree.create(SceneEntity::world("world", 1.0, &mut rng));
        let particle = tree.create(SceneEntity::particle("pa", 0.5));
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

    fn state_of(tree: &Tree<SceneEntity>, world: NodeId) -> SimState {
        tree.get(world).unwrap().as_world().unwrap().state
    }

    #[test]
    fn assemble_harvests_by_type_code_and_transitions() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();

        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert_eq!(world.state, SimState::Simulating);

        let model = world.model.as_ref().unwrap();
        assert_eq!(model.particles, vec![scene.particle]);
        assert_eq!(model.springs, vec![scene.spring]);
        assert_eq!(model.plane, scene.plane);
        assert!(!model.is_running());
    }

    #[test]
    fn assemble_fails_without_a_particle_and_stays_in_edit() {
        let mut scene = build_scene();
        scene.tree.destroy(scene.particle).unwrap();

        assert_eq!(
            assemble(&mut scene.tree, scene.world),
            Err(SimError::AssemblyFailed("particle"))
        );

        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert_eq!(world.state, SimState::Edit);
        assert!(world.model.is_none());
    }

    #[test]
    fn assemble_fails_without_a_plane() {
        let mut scene = build_scene();
        scene.tree.destroy(scene.plane).unwrap();
        assert_eq!(
            assemble(&mut scene.tree, scene.world),
            Err(SimError::AssemblyFailed("plane"))
        );
    }

    #[test]
    fn assemble_is_rejected_while_simulating() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();
        assert_eq!(
            assemble(&mut scene.tree, scene.world),
            Err(SimError::NotEditing)
        );
    }

    #[test]
    fn assemble_rejects_non_world_nodes() {
        let mut scene = build_scene();
        assert_eq!(
            assemble(&mut scene.tree, scene.particle),
            Err(SimError::NotAWorld)
        );
    }

    #[test]
    fn nested_world_branches_are_not_harvested() {
        let mut rng = rand::rng();
        let mut scene = build_scene();

        // An inner world with its own particle hangs under the outer one.
        let inner = scene
            .tree
            .create(SceneEntity::world("inner", 1.0, &mut rng));
        let inner_particle = scene.tree.create(SceneEntity::particle("inner pa", 0.5));
        scene.tree.insert(scene.world, inner, None);
        scene.tree.insert(inner, inner_particle, None);

        assemble(&mut scene.tree, scene.world).unwrap();

        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        let model = world.model.as_ref().unwrap();
        assert_eq!(model.particles, vec![scene.particle]);
    }

    #[test]
    fn start_requires_an_assembled_model() {
        let mut scene = build_scene();
        assert_eq!(
            start(&mut scene.tree, scene.world),
            Err(SimError::NotAssembled)
        );
    }

    #[test]
    fn end_is_a_pause_not_a_teardown() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();

        start(&mut scene.tree, scene.world).unwrap();
        end(&mut scene.tree, scene.world).unwrap();

        // The model survives an end, and the world is still simulating.
        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert_eq!(world.state, SimState::Simulating);
        assert!(world.model.is_some());
        assert!(!world.model.as_ref().unwrap().is_running());

        // Start is valid again after an end.
        start(&mut scene.tree, scene.world).unwrap();
        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert!(world.model.as_ref().unwrap().is_running());
    }

    #[test]
    fn reset_restores_pre_run_values_and_keeps_the_model() {
        let mut scene = build_scene();
        let start_pos = glam::Vec3::new(1.0, 2.0, 0.0);
        scene.tree.get_mut(scene.particle).unwrap().snap_to(start_pos);

        assemble(&mut scene.tree, scene.world).unwrap();
        start(&mut scene.tree, scene.world).unwrap();

        // Simulate drift plus a parameter edit mid-run.
        {
            let particle = scene.tree.get_mut(scene.particle).unwrap();
            particle.snap_to(glam::Vec3::new(-5.0, 0.0, 0.0));
            if let EntityKind::Particle { mass, .. } = &mut particle.kind {
                *mass = 99.0;
            }
        }

        request_reset(&mut scene.tree, scene.particle);

        let particle = scene.tree.get(scene.particle).unwrap();
        assert_eq!(particle.position, start_pos);
        match particle.kind {
            EntityKind::Particle { mass, .. } => assert_eq!(mass, 1.0),
            _ => unreachable!(),
        }

        // Neither the model nor the lifecycle state was touched.
        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert_eq!(world.state, SimState::Simulating);
        assert!(world.model.is_some());
    }

    #[test]
    fn reset_dispatches_upward_from_a_deep_child() {
        let mut scene = build_scene();
        // A point nested two levels under the world.
        let mut rng = rand::rng();
        let group = scene.tree.create(SceneEntity::point("anchor", 0.2, &mut rng));
        let leaf = scene.tree.create(SceneEntity::point("leaf", 0.2, &mut rng));
        scene.tree.insert(scene.world, group, None);
        scene.tree.insert(group, leaf, None);

        assemble(&mut scene.tree, scene.world).unwrap();
        scene
            .tree
            .get_mut(scene.spring)
            .unwrap()
            .snap_to(glam::Vec3::new(9.0, 9.0, 9.0));

        // Dispatch from the deep leaf, not from the spring itself.
        request_reset(&mut scene.tree, leaf);

        assert_eq!(
            scene.tree.get(scene.spring).unwrap().position,
            glam::Vec3::ZERO
        );
    }

    #[test]
    fn reset_without_a_model_is_a_no_op() {
        let mut scene = build_scene();
        let pos = glam::Vec3::new(3.0, 0.0, 0.0);
        scene.tree.get_mut(scene.particle).unwrap().snap_to(pos);

        request_reset(&mut scene.tree, scene.particle);

        assert_eq!(scene.tree.get(scene.particle).unwrap().position, pos);
    }

    #[test]
    fn shape_changes_reset_the_assembled_model() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();

        scene
            .tree
            .get_mut(scene.particle)
            .unwrap()
            .snap_to(glam::Vec3::new(4.0, 4.0, 0.0));

        // Attaching a new node invalidates the in-flight run.
        let mut rng = rand::rng();
        let extra = scene.tree.create(SceneEntity::point("pt", 0.2, &mut rng));
        scene.tree.insert(scene.world, extra, None);
        child_added(&mut scene.tree, scene.world, extra);

        assert_eq!(
            scene.tree.get(scene.particle).unwrap().position,
            glam::Vec3::ZERO
        );

        // Detach notifications behave the same way.
        scene
            .tree
            .get_mut(scene.particle)
            .unwrap()
            .snap_to(glam::Vec3::new(4.0, 4.0, 0.0));
        child_removed(&mut scene.tree, scene.world, extra);
        scene.tree.destroy(extra).unwrap();

        assert_eq!(
            scene.tree.get(scene.particle).unwrap().position,
            glam::Vec3::ZERO
        );
    }

    #[test]
    fn enter_edit_pauses_and_keeps_the_model() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();
        start(&mut scene.tree, scene.world).unwrap();

        enter_edit(&mut scene.tree, scene.world).unwrap();

        let world = scene.tree.get(scene.world).unwrap().as_world().unwrap();
        assert_eq!(world.state, SimState::Edit);
        assert!(world.model.is_some());
        assert!(!world.model.as_ref().unwrap().is_running());

        // Back in edit, re-assembly replaces the model.
        assemble(&mut scene.tree, scene.world).unwrap();
        assert_eq!(state_of(&scene.tree, scene.world), SimState::Simulating);
    }

    #[test]
    fn destroying_the_world_releases_its_model() {
        let mut scene = build_scene();
        assemble(&mut scene.tree, scene.world).unwrap();
        scene.tree.destroy(scene.world).unwrap();
        assert!(scene.tree.get(scene.world).is_none());
    }
}
