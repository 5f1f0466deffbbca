use crate::sim::{PhysicsModel, SimState};
use glam::{Mat4, Quat, Vec3};
use rand::Rng;
use std::f32::consts::PI;

/// Fixed duration of an ease-driven move, in simulation time units.
pub const TRANSITION_TIME: f32 = 0.2;

/// Slow-in/slow-out profile applied to the elapsed-time fraction of a
/// move. Monotonic over `[0, 1]`, with `ease(0)` just above 0 and
/// `ease(1)` just below 1.
pub fn ease(x: f32) -> f32 {
    (x.sqrt() * 6.0 - PI).tanh() / 2.0 + 0.503
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum MotionMode {
    #[default]
    Still,
    Active,
}

/// In-flight ease-based move between two positions.
///
/// Time is accumulated from per-frame deltas; a new `begin` overwrites
/// whatever move was in flight and restarts the clock.
#[derive(Clone, Debug, Default)]
struct Motion {
    start: Vec3,
    end: Vec3,
    elapsed: f32,
    mode: MotionMode,
}

impl Motion {
    fn begin(&mut self, start: Vec3, end: Vec3) {
        self.start = start;
        self.end = end;
        self.elapsed = 0.0;
        self.mode = MotionMode::Active;
    }

    fn halt(&mut self) {
        self.mode = MotionMode::Still;
    }

    /// Advances the clock and yields the new position while a move is in
    /// flight; settles exactly on the end point when the window elapses.
    fn step(&mut self, dt: f32) -> Option<Vec3> {
        if self.mode == MotionMode::Still {
            return None;
        }
        self.elapsed += dt;
        if self.elapsed >= TRANSITION_TIME {
            self.mode = MotionMode::Still;
            Some(self.end)
        } else {
            let t = self.elapsed / TRANSITION_TIME;
            Some(self.start.lerp(self.end, ease(t)))
        }
    }
}

/// World-entity payload: global simulation coefficients plus the
/// lifecycle state and the physics model assembled from its subtree.
#[derive(Clone, Debug)]
pub struct World {
    pub time_scale: f32,
    pub friction: f32,
    pub gravity: f32,
    pub restitution: f32,
    pub state: SimState,
    pub model: Option<PhysicsModel>,
}

impl Default for World {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            friction: 0.0,
            gravity: 9.8,
            restitution: 0.5,
            state: SimState::Edit,
            model: None,
        }
    }
}

/// Closed set of scene entity variants with their physics parameters.
#[derive(Clone, Debug)]
pub enum EntityKind {
    Root,
    World(World),
    Plane { rotation: f32, length: f32 },
    Point,
    Particle { mass: f32, force: f32, velocity: f32 },
    Spring { length: f32, extension: f32, elasticity: f32, rotation: f32 },
}

/// One scene object: shared display state plus a typed variant.
#[derive(Clone, Debug)]
pub struct SceneEntity {
    pub name: String,
    pub position: Vec3,
    pub scale: f32,
    pub colour: Vec3,
    pub selected: bool,
    motion: Motion,
    pub kind: EntityKind,
}

pub fn random_colour(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(
        rng.random_range(0.0..=1.0),
        rng.random_range(0.0..=1.0),
        rng.random_range(0.0..=1.0),
    )
}

impl SceneEntity {
    fn new(name: impl Into<String>, scale: f32, colour: Vec3, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            position: Vec3::ZERO,
            scale,
            colour,
            selected: false,
            motion: Motion::default(),
            kind,
        }
    }

    pub fn root() -> Self {
        Self::new("root", 0.0, Vec3::ZERO, EntityKind::Root)
    }

    pub fn world(name: impl Into<String>, scale: f32, rng: &mut impl Rng) -> Self {
        Self::new(
            name,
            scale,
            random_colour(rng),
            EntityKind::World(World::default()),
        )
    }

    pub fn plane(name: impl Into<String>, scale: f32) -> Self {
        Self::new(
            name,
            scale,
            Vec3::new(0.133, 0.11, 0.208),
            EntityKind::Plane {
                rotation: 3.0 * PI / 8.0,
                length: 3.0,
            },
        )
    }

    pub fn point(name: impl Into<String>, scale: f32, rng: &mut impl Rng) -> Self {
        Self::new(name, scale, random_colour(rng), EntityKind::Point)
    }

    pub fn particle(name: impl Into<String>, scale: f32) -> Self {
        Self::new(
            name,
            scale,
            Vec3::new(0.0, 0.0, 1.0),
            EntityKind::Particle {
                mass: 1.0,
                force: 0.0,
                velocity: 0.0,
            },
        )
    }

    pub fn spring(name: impl Into<String>, scale: f32) -> Self {
        Self::new(
            name,
            scale,
            Vec3::new(0.667, 0.663, 0.678),
            EntityKind::Spring {
                length: 1.0,
                extension: 0.5,
                elasticity: 9.8,
                rotation: 0.0,
            },
        )
    }

    /// Stable integer identifying the variant, used when harvesting a
    /// world subtree and when dispatching draw calls.
    pub fn type_code(&self) -> i32 {
        match self.kind {
            EntityKind::Root => -1,
            EntityKind::World(_) => 0,
            EntityKind::Plane { .. } => 1,
            EntityKind::Point => 2,
            EntityKind::Particle { .. } => 3,
            EntityKind::Spring { .. } => 4,
        }
    }

    /// Local model transform for this entity.
    ///
    /// Planes stretch along their own x axis by `length` and tilt by
    /// `rotation`; springs stretch along y by their current rest length
    /// plus extension and tilt by `rotation`; everything else is a plain
    /// translate-and-scale.
    pub fn local_transform(&self) -> Mat4 {
        match self.kind {
            EntityKind::Root => Mat4::IDENTITY,
            EntityKind::World(_) => Mat4::from_scale_rotation_translation(
                Vec3::splat(self.scale),
                Quat::IDENTITY,
                self.position,
            ),
            EntityKind::Plane { rotation, length } => Mat4::from_scale_rotation_translation(
                Vec3::new(length * self.scale, self.scale, self.scale),
                Quat::from_rotation_z(rotation),
                self.position,
            ),
            EntityKind::Point | EntityKind::Particle { .. } => {
                Mat4::from_scale_rotation_translation(
                    Vec3::splat(self.scale),
                    Quat::IDENTITY,
                    self.position,
                )
            }
            EntityKind::Spring {
                length,
                extension,
                rotation,
                ..
            } => Mat4::from_scale_rotation_translation(
                Vec3::new(self.scale, (length + extension) * self.scale, self.scale),
                Quat::from_rotation_z(rotation),
                self.position,
            ),
        }
    }

    /// Starts an ease-driven move from the current position to `target`.
    ///
    /// Calling this mid-move simply restarts the clock with the new
    /// endpoints.
    pub fn move_to(&mut self, target: Vec3) {
        let start = self.position;
        self.motion.begin(start, target);
    }

    /// Places the entity immediately, cancelling any move in flight.
    pub fn snap_to(&mut self, position: Vec3) {
        self.motion.halt();
        self.position = position;
    }

    pub fn is_moving(&self) -> bool {
        self.motion.mode == MotionMode::Active
    }

    /// Per-frame tick: advances any in-flight ease motion.
    pub fn update(&mut self, dt: f32) {
        if let Some(position) = self.motion.step(dt) {
            self.position = position;
        }
    }

    pub fn as_world(&self) -> Option<&World> {
        match &self.kind {
            EntityKind::World(world) => Some(world),
            _ => None,
        }
    }

    pub fn as_world_mut(&mut self) -> Option<&mut World> {
        match &mut self.kind {
            EntityKind::World(world) => Some(world),
            _ => None,
        }
    }
}
