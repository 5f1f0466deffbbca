//! Interactive scene editor/simulator built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns the scene tree and the
//! integrator, and implements [`eframe::App`] to edit, draw, and drive
//! the simulation lifecycle through an egui UI.

use eframe::App;
use glam::Vec3;
use log::debug;
use scene_core::{
    config::SpringStyle,
    entity::{EntityKind, SceneEntity},
    sim::{self, SimState},
    tree::Tree,
    types::NodeId,
};

use crate::integrator::Integrator;

/// Main application state for the interactive editor.
///
/// [`Viewer`] glues together:
/// - The scene core: [`Tree`] of [`SceneEntity`] nodes and the world's
///   simulation lifecycle.
/// - The integrator collaborator advancing the assembled model.
/// - UI state (camera pan/zoom, selection, status line).
///
/// The per-frame update is:
/// 1. Tick every entity (ease motions), then step the integrator while
///    the model is running.
/// 2. Render the control panels, the scene tree, and the inspector.
/// 3. Draw every entity from a preorder walk of the tree.
pub struct Viewer {
    tree: Tree<SceneEntity>,
    root: NodeId,
    world: NodeId,
    spring_style: SpringStyle,
    integrator: Integrator,

    rng: rand::rngs::ThreadRng,
    next_name: u32,

    selected: Option<NodeId>,
    status: String,
    zoom: f32,
    pan: egui::Vec2,
}

fn colour32(colour: Vec3) -> egui::Color32 {
    let c = colour.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    egui::Color32::from_rgb(c.x as u8, c.y as u8, c.z as u8)
}

impl Viewer {
    /// Creates a viewer with a small starter assembly: a world holding
    /// one particle hanging under a spring, above a plane.
    pub fn new() -> Self {
        let mut rng = rand::rng();
        let mut tree = Tree::new();
        let root = tree.create(SceneEntity::root());
        let world = tree.create(SceneEntity::world("world", 2.5, &mut rng));
        tree.insert(root, world, None);

        let particle = tree.create(SceneEntity::particle("particle", 0.15));
        let spring = tree.create(SceneEntity::spring("spring", 1.0));
        let plane = tree.create(SceneEntity::plane("plane", 1.0));
        tree.insert(world, particle, None);
        tree.insert(world, spring, None);
        tree.insert(world, plane, None);

        tree.get_mut(particle)
            .unwrap()
            .snap_to(Vec3::new(0.0, -1.5, 0.0));
        tree.get_mut(spring).unwrap().snap_to(Vec3::ZERO);
        tree.get_mut(plane)
            .unwrap()
            .snap_to(Vec3::new(0.0, -2.0, 0.0));

        Self {
            tree,
            root,
            world,
            spring_style: SpringStyle::default(),
            integrator: Integrator::new(),
            rng,
            next_name: 1,
            selected: None,
            status: String::new(),
            zoom: 80.0,
            pan: egui::vec2(0.0, 0.0),
        }
    }

    fn sim_state(&self) -> SimState {
        self.tree
            .get(self.world)
            .and_then(SceneEntity::as_world)
            .map(|w| w.state)
            .unwrap_or(SimState::Edit)
    }

    fn preorder_ids(&self) -> Vec<NodeId> {
        self.tree.preorder(self.root).collect()
    }

    fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cursor = self.tree.parent(id);
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.tree.parent(parent);
        }
        depth
    }

    /// Converts a world-space position to screen-space.
    ///
    /// World coordinates are scaled by `zoom`, offset by `pan`, and
    /// centered inside `rect`; the y-axis is flipped so positive y goes
    /// up in world space.
    fn world_to_screen(&self, p: Vec3, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        egui::pos2(
            center.x + p.x * self.zoom + self.pan.x,
            center.y - p.y * self.zoom + self.pan.y,
        )
    }

    /// Inverse of [`Viewer::world_to_screen`] on the z = 0 plane.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec3 {
        let center = rect.center();
        let x = (p.x - center.x - self.pan.x) / self.zoom;
        let y = (center.y - p.y + self.pan.y) / self.zoom;
        Vec3::new(x, y, 0.0)
    }

    /// Helper to draw a labeled `f32` [`egui::DragValue`]; reports
    /// whether the value was edited this frame.
    fn labeled_drag_f32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f32,
        range: std::ops::RangeInclusive<f32>,
        speed: f64,
    ) -> bool {
        let mut changed = false;
        ui.horizontal(|ui| {
            ui.label(label);
            changed = ui
                .add(egui::DragValue::new(value).range(range).speed(speed))
                .changed();
        });
        changed
    }

    fn fresh_name(&mut self, base: &str) -> String {
        let name = format!("{base} {}", self.next_name);
        self.next_name += 1;
        name
    }

    /// Attaches a new entity under the selected node (or the world) and
    /// fires the owning world's attach hook.
    fn spawn(&mut self, entity: SceneEntity) {
        let parent = self.selected.unwrap_or(self.world);
        let id = self.tree.create(entity);
        self.tree.insert(parent, id, None);
        debug!("spawned node {id} under {parent}");
        if let Some(world_id) = sim::enclosing_world(&self.tree, parent) {
            sim::child_added(&mut self.tree, world_id, id);
            self.integrator.reset();
        }
        self.selected = Some(id);
    }

    /// Destroys the selected node's subtree after firing the detach hook.
    fn remove_selected(&mut self) {
        let Some(id) = self.selected else {
            return;
        };
        if id == self.root || id == self.world {
            self.status = "cannot remove the root or the main world".to_owned();
            return;
        }
        if let Some(parent) = self.tree.parent(id) {
            if let Some(world_id) = sim::enclosing_world(&self.tree, parent) {
                sim::child_removed(&mut self.tree, world_id, id);
                self.integrator.reset();
            }
        }
        if let Err(err) = self.tree.destroy(id) {
            self.status = err.to_string();
        } else {
            debug!("removed node {id}");
        }
        self.selected = None;
    }

    /// Advances ease motions and, while the model runs, the integrator.
    fn tick(&mut self, dt: f32) {
        for id in self.preorder_ids() {
            if let Some(entity) = self.tree.get_mut(id) {
                entity.update(dt);
            }
        }

        // Borrow the model only for the duration of the step.
        let model = self
            .tree
            .get_mut(self.world)
            .and_then(SceneEntity::as_world_mut)
            .and_then(|w| w.model.take());
        if let Some(model) = model {
            if model.is_running() {
                self.integrator.step(&mut self.tree, &model, dt);
            }
            if let Some(world) = self
                .tree
                .get_mut(self.world)
                .and_then(SceneEntity::as_world_mut)
            {
                world.model = Some(model);
            }
        }
    }

    fn anything_animating(&self) -> bool {
        let running = self
            .tree
            .get(self.world)
            .and_then(SceneEntity::as_world)
            .and_then(|w| w.model.as_ref())
            .is_some_and(|m| m.is_running());
        running
            || self
                .preorder_ids()
                .iter()
                .any(|&id| self.tree.get(id).is_some_and(SceneEntity::is_moving))
    }

    /// Builds the top panel: lifecycle controls gated on the current
    /// state, plus the zoom slider.
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match self.sim_state() {
                    SimState::Edit => {
                        if ui.button("⚙ Assemble").clicked() {
                            match sim::assemble(&mut self.tree, self.world) {
                                Ok(()) => {
                                    self.integrator.reset();
                                    self.status = "model assembled".to_owned();
                                }
                                Err(err) => self.status = err.to_string(),
                            }
                        }
                    }
                    SimState::Simulating => {
                        if ui.button("▶ Start").clicked() {
                            if let Err(err) = sim::start(&mut self.tree, self.world) {
                                self.status = err.to_string();
                            }
                        }
                        if ui.button("⏸ End").clicked() {
                            if let Err(err) = sim::end(&mut self.tree, self.world) {
                                self.status = err.to_string();
                            }
                        }
                        if ui.button("↺ Reset").clicked() {
                            sim::request_reset(&mut self.tree, self.world);
                            self.integrator.reset();
                        }
                        if ui.button("✏ Edit").clicked() {
                            if let Err(err) = sim::enter_edit(&mut self.tree, self.world) {
                                self.status = err.to_string();
                            }
                        }
                    }
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 10.0..=300.0).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar (state, node count, last message).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("nodes = {}", self.tree.size(self.root)));
                ui.label(format!("state = {:?}", self.sim_state()));
                ui.separator();
                ui.label(&self.status);
            });
        });
    }

    /// Builds the left panel: the scene tree with selection and the
    /// entity spawn/remove controls.
    fn ui_tree_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("scene_tree")
            .resizable(true)
            .default_width(190.0)
            .show(ctx, |ui| {
                ui.heading("Scene");

                for id in self.preorder_ids() {
                    let Some(entity) = self.tree.get(id) else {
                        continue;
                    };
                    let label = format!(
                        "{}{} [{}]",
                        "    ".repeat(self.depth(id)),
                        entity.name,
                        entity.type_code()
                    );
                    if ui
                        .selectable_label(self.selected == Some(id), label)
                        .clicked()
                    {
                        self.selected = Some(id);
                    }
                }

                ui.separator();
                ui.label("Add under selection");
                ui.horizontal_wrapped(|ui| {
                    if ui.button("+ Particle").clicked() {
                        let name = self.fresh_name("particle");
                        self.spawn(SceneEntity::particle(name, 0.15));
                    }
                    if ui.button("+ Spring").clicked() {
                        let name = self.fresh_name("spring");
                        self.spawn(SceneEntity::spring(name, 1.0));
                    }
                    if ui.button("+ Plane").clicked() {
                        let name = self.fresh_name("plane");
                        self.spawn(SceneEntity::plane(name, 1.0));
                    }
                    if ui.button("+ Point").clicked() {
                        let name = self.fresh_name("point");
                        let entity = SceneEntity::point(name, 0.08, &mut self.rng);
                        self.spawn(entity);
                    }
                    if ui.button("+ World").clicked() {
                        let name = self.fresh_name("world");
                        let entity = SceneEntity::world(name, 1.5, &mut self.rng);
                        self.spawn(entity);
                    }
                });

                ui.separator();
                if ui.button("🗑 Remove selected").clicked() {
                    self.remove_selected();
                }
            });
    }

    /// Builds the right panel: parameter editors for the selected
    /// entity. Edits made while simulating invalidate the in-flight run
    /// through the world's reset dispatch, keeping the edited values.
    fn ui_inspector_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("inspector")
            .resizable(true)
            .default_width(230.0)
            .show(ctx, |ui| {
                ui.heading("Inspector");

                let Some(id) = self.selected else {
                    ui.label("nothing selected");
                    return;
                };
                let editing = self.sim_state() == SimState::Edit;
                let mut changed = false;

                let Some(entity) = self.tree.get_mut(id) else {
                    return;
                };
                ui.label(format!(
                    "{} (type {})",
                    entity.name,
                    entity.type_code()
                ));

                ui.separator();
                changed |= Self::labeled_drag_f32(
                    ui,
                    "x:",
                    &mut entity.position.x,
                    -100.0..=100.0,
                    0.02,
                );
                changed |= Self::labeled_drag_f32(
                    ui,
                    "y:",
                    &mut entity.position.y,
                    -100.0..=100.0,
                    0.02,
                );
                changed |=
                    Self::labeled_drag_f32(ui, "scale:", &mut entity.scale, 0.01..=10.0, 0.01);

                ui.separator();
                match &mut entity.kind {
                    EntityKind::Root => {}
                    EntityKind::World(world) => {
                        // Coefficients feed the next assembly; lock them
                        // while a model is live.
                        ui.add_enabled_ui(editing, |ui| {
                            Self::labeled_drag_f32(
                                ui,
                                "time scale:",
                                &mut world.time_scale,
                                0.0..=10.0,
                                0.01,
                            );
                            Self::labeled_drag_f32(
                                ui,
                                "friction:",
                                &mut world.friction,
                                0.0..=10.0,
                                0.01,
                            );
                            Self::labeled_drag_f32(
                                ui,
                                "gravity:",
                                &mut world.gravity,
                                -50.0..=50.0,
                                0.05,
                            );
                            Self::labeled_drag_f32(
                                ui,
                                "restitution:",
                                &mut world.restitution,
                                0.0..=1.0,
                                0.01,
                            );
                        });
                    }
                    EntityKind::Plane { rotation, length } => {
                        changed |=
                            Self::labeled_drag_f32(ui, "rotation:", rotation, -6.3..=6.3, 0.01);
                        changed |= Self::labeled_drag_f32(ui, "length:", length, 0.1..=50.0, 0.05);
                    }
                    EntityKind::Point => {}
                    EntityKind::Particle {
                        mass,
                        force,
                        velocity,
                    } => {
                        changed |= Self::labeled_drag_f32(ui, "mass:", mass, 0.001..=100.0, 0.01);
                        changed |= Self::labeled_drag_f32(ui, "force:", force, -100.0..=100.0, 0.1);
                        changed |= Self::labeled_drag_f32(
                            ui,
                            "initial velocity:",
                            velocity,
                            -50.0..=50.0,
                            0.05,
                        );
                    }
                    EntityKind::Spring {
                        length,
                        extension,
                        elasticity,
                        rotation,
                    } => {
                        changed |=
                            Self::labeled_drag_f32(ui, "rest length:", length, 0.1..=50.0, 0.05);
                        changed |=
                            Self::labeled_drag_f32(ui, "extension:", extension, -10.0..=10.0, 0.01);
                        changed |= Self::labeled_drag_f32(
                            ui,
                            "elasticity:",
                            elasticity,
                            0.0..=500.0,
                            0.1,
                        );
                        changed |=
                            Self::labeled_drag_f32(ui, "rotation:", rotation, -6.3..=6.3, 0.01);
                    }
                }

                if changed && !editing {
                    self.invalidate_run_keeping_edit(id);
                }
            });
    }

    /// A mid-run edit resets the world to its snapshot, then the edited
    /// node gets the new values back so the edit survives the reset.
    fn invalidate_run_keeping_edit(&mut self, id: NodeId) {
        let Some(entity) = self.tree.get(id) else {
            return;
        };
        if entity.as_world().is_some() {
            return;
        }
        let position = entity.position;
        let scale = entity.scale;
        let kind = entity.kind.clone();

        sim::request_reset(&mut self.tree, id);
        self.integrator.reset();

        if let Some(entity) = self.tree.get_mut(id) {
            entity.snap_to(position);
            entity.scale = scale;
            entity.kind = kind;
        }
    }

    /// Builds the central panel: draws every entity from a preorder
    /// walk and handles pan/zoom, selection, and eased moves.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            // Pan with drag.
            if response.dragged() {
                self.pan += response.drag_delta();
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(10.0, 300.0);

                let screen_after = self.world_to_screen(world_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            // Click to select the nearest entity.
            if response.clicked()
                && let Some(pointer) = response.hover_pos()
            {
                self.selected = self.pick_entity(pointer, rect);
            }

            // Double-click moves the selected entity there with an ease.
            if response.double_clicked()
                && self.sim_state() == SimState::Edit
                && let Some(pointer) = response.hover_pos()
                && let Some(id) = self.selected
            {
                let target = self.screen_to_world(pointer, rect);
                if let Some(entity) = self.tree.get_mut(id) {
                    entity.move_to(target);
                }
            }

            for id in self.preorder_ids() {
                self.draw_entity(&painter, rect, id);
            }

            if self.anything_animating() {
                ctx.request_repaint();
            }
        });
    }

    fn pick_entity(&self, pointer: egui::Pos2, rect: egui::Rect) -> Option<NodeId> {
        let mut best = None;
        let mut best_d = f32::MAX;
        for id in self.preorder_ids() {
            let Some(entity) = self.tree.get(id) else {
                continue;
            };
            if matches!(entity.kind, EntityKind::Root) {
                continue;
            }
            let p = self.world_to_screen(entity.position, rect);
            let d = p.distance(pointer);
            let reach = (entity.scale * self.zoom).max(8.0);
            if d < reach && d < best_d {
                best_d = d;
                best = Some(id);
            }
        }
        best
    }

    fn draw_entity(&self, painter: &egui::Painter, rect: egui::Rect, id: NodeId) {
        let Some(entity) = self.tree.get(id) else {
            return;
        };
        let transform = entity.local_transform();
        let colour = colour32(entity.colour);
        let to_screen = |local: Vec3| -> egui::Pos2 {
            self.world_to_screen(transform.transform_point3(local), rect)
        };

        match entity.kind {
            EntityKind::Root => return,

            EntityKind::World(_) => {
                let corners = [
                    Vec3::new(-1.0, -1.0, 0.0),
                    Vec3::new(1.0, -1.0, 0.0),
                    Vec3::new(1.0, 1.0, 0.0),
                    Vec3::new(-1.0, 1.0, 0.0),
                ];
                let points: Vec<egui::Pos2> = corners.iter().map(|&c| to_screen(c)).collect();
                painter.add(egui::Shape::closed_line(points, egui::Stroke::new(1.0, colour)));
            }

            EntityKind::Plane { .. } => {
                let a = to_screen(Vec3::new(-0.5, 0.0, 0.0));
                let b = to_screen(Vec3::new(0.5, 0.0, 0.0));
                painter.line_segment([a, b], egui::Stroke::new(3.0, colour));
            }

            EntityKind::Point => {
                let p = self.world_to_screen(entity.position, rect);
                painter.circle_filled(p, (entity.scale * self.zoom).max(2.0), colour);
            }

            EntityKind::Particle { .. } => {
                let p = self.world_to_screen(entity.position, rect);
                painter.circle_filled(p, (entity.scale * self.zoom).max(2.0), colour);
            }

            EntityKind::Spring { .. } => {
                // Zigzag through the unit-length local body; the
                // transform applies extension and rotation.
                let style = self.spring_style;
                let mut points = Vec::with_capacity(style.coils as usize + 2);
                points.push(to_screen(Vec3::ZERO));
                for c in 0..style.coils {
                    let t = (c as f32 + 0.5) / style.coils as f32;
                    let side = if c % 2 == 0 { 1.0 } else { -1.0 };
                    points.push(to_screen(Vec3::new(side * style.coil_width, t, 0.0)));
                }
                points.push(to_screen(Vec3::Y));
                painter.add(egui::Shape::line(points, egui::Stroke::new(1.5, colour)));
            }
        }

        if self.selected == Some(id) {
            let p = self.world_to_screen(entity.position, rect);
            painter.circle_stroke(
                p,
                (entity.scale * self.zoom).max(8.0) + 4.0,
                egui::Stroke::new(1.0, egui::Color32::YELLOW),
            );
        }
    }
}

impl App for Viewer {
    /// eframe callback that advances the scene and builds all panels.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dt = ctx.input(|i| i.stable_dt).min(0.1);
        self.tick(dt);

        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_tree_panel(ctx);
        self.ui_inspector_panel(ctx);
        self.ui_central_panel(ctx);
    }
}
