//! Interactive toroidal aggregate viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns a [`Simulation`] plus the
//! configuration being edited in the side panel, and implements
//! [`eframe::App`] to render and control the simulation through an egui UI.

use std::ops::RangeInclusive;

use eframe::App;
use glam::Vec2;
use rand::rng;
use swirly_core::{
    BehaviorMode, Blob, BlobId, Config, ConfigError, Simulation, SubParticle,
    blob::random_kick, maintenance::escape_offset,
};

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The simulation core: a [`Simulation`] and the [`Config`] it was built from.
/// - A pending [`Config`] edited in the side panel and applied on demand.
/// - UI configuration (pan/zoom, timing).
///
/// The typical per-frame update is:
/// 1. Handle UI interactions / input.
/// 2. If `running` is `true` and enough time has passed, call [`Viewer::step_once`].
/// 3. Render the world border, every sub-particle and the spawn hint.
///
/// ### Fields
/// - `sim` - The running simulation.
/// - `pending` - Configuration being edited; applied by rebuilding `sim`.
/// - `error` - Last validation error from applying `pending`, shown in the panel.
///
/// - `rng` - Random number generator used for click-to-spawn.
///
/// - `running` - Whether the simulation is currently auto-advancing.
/// - `zoom` - Zoom factor for world-to-screen coordinate mapping.
/// - `pan` - Screen-space pan offset in pixels.
///
/// - `last_spawned` - Aggregate created by the last click (for highlighting).
///
/// - `step_interval` - Target time step between automatic simulation steps (seconds).
/// - `last_step_time` - Time stamp of the last step (egui time).
/// - `last_step_dt` - Actual time delta between the last two steps (for display only).
pub struct Viewer {
    sim: Simulation,
    pending: Config,
    error: Option<String>,

    rng: rand::rngs::ThreadRng,

    running: bool,
    zoom: f32,
    pan: egui::Vec2,

    last_spawned: Option<BlobId>,

    step_interval: f64,
    last_step_time: f64,
    last_step_dt: f64,
}

impl Viewer {
    /// Creates a viewer around a freshly spawned simulation.
    ///
    /// ### Returns
    /// The viewer, or the validation error for `config`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let sim = Simulation::new(config.clone())?;
        Ok(Self {
            sim,
            pending: config,
            error: None,
            rng: rng(),
            running: false,
            zoom: 1.0,
            pan: egui::vec2(0.0, 0.0),
            last_spawned: None,
            step_interval: 1.0 / 60.0,
            last_step_time: 0.0,
            last_step_dt: 0.0,
        })
    }

    pub fn seed(&self) -> u64 {
        self.sim.seed()
    }

    /// Restarts the simulation from its seed and stops auto-running.
    ///
    /// The configuration and camera are kept.
    fn reset(&mut self) {
        self.sim.reset();
        self.last_spawned = None;
        self.running = false;
    }

    /// Rebuilds the simulation from the pending configuration.
    ///
    /// On a validation error the running simulation is kept and the error
    /// is stored for display.
    fn apply_pending(&mut self) {
        match Simulation::new(self.pending.clone()) {
            Ok(sim) => {
                self.sim = sim;
                self.error = None;
                self.last_spawned = None;
            }
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    /// Advances the simulation by a single frame.
    fn step_once(&mut self) {
        self.sim.step();
    }

    /// Spawns a random singleton at `pos`, moved just outside any aggregate
    /// it would otherwise land inside.
    fn spawn_at(&mut self, pos: Vec2) -> BlobId {
        let world = *self.sim.world();
        let cfg = self.sim.config();
        let mut particle = SubParticle::random(
            &world,
            cfg.blob_radius,
            cfg.color_min,
            cfg.color_max,
            &mut self.rng,
        );
        particle.pos = world.wrap(pos);
        let velocity = random_kick(cfg.normal_speed, &mut self.rng);

        let escape = self
            .sim
            .snapshot()
            .filter(|view| view.particles.len() > 1)
            .filter_map(|view| view.bounding_circle(&world))
            .find_map(|bc| escape_offset(&bc, particle.pos, particle.radius, &world));
        if let Some(offset) = escape {
            particle.pos = world.wrap(particle.pos + offset);
        }

        let id = self.sim.spawn(Blob::singleton(particle, velocity));
        self.last_spawned = Some(id);
        id
    }

    /// Converts a world-space position to screen-space.
    ///
    /// The world's center is placed at the center of `rect`, scaled by
    /// `zoom` and offset by `pan`. The y-axis is flipped so that positive y
    /// goes up on screen.
    fn world_to_screen(&self, p: Vec2, rect: egui::Rect) -> egui::Pos2 {
        let center = rect.center();
        let half = self.sim.world().size() * 0.5;
        egui::pos2(
            center.x + (p.x - half.x) * self.zoom + self.pan.x,
            center.y - (p.y - half.y) * self.zoom + self.pan.y,
        )
    }

    /// Converts a screen-space position back to world-space.
    ///
    /// This is the inverse of [`Viewer::world_to_screen`] (up to floating
    /// point rounding). The result is not wrapped.
    fn screen_to_world(&self, p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        let center = rect.center();
        let half = self.sim.world().size() * 0.5;
        let x = (p.x - center.x - self.pan.x) / self.zoom + half.x;
        let y = (center.y - p.y + self.pan.y) / self.zoom + half.y;
        Vec2::new(x, y)
    }

    /// Helper to draw a labeled numeric [`egui::DragValue`].
    fn labeled_drag<N: egui::emath::Numeric>(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut N,
        range: RangeInclusive<N>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (run controls, stepping, zoom).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .button(if self.running { "⏸ Pause" } else { "▶ Run" })
                    .clicked()
                {
                    self.running = !self.running;
                }

                ui.add(
                    egui::DragValue::new(&mut self.step_interval)
                        .prefix("dt target = ")
                        .range(0.0..=1.0)
                        .speed(0.005),
                );

                if ui.button("Step").clicked() {
                    let now = ctx.input(|i| i.time);
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = now - self.last_step_time;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                if ui.button("Reset").clicked() {
                    self.reset();
                }

                ui.separator();
                ui.add(egui::Slider::new(&mut self.zoom, 0.1..=10.0).text("Zoom"));
            });
        });
    }

    /// Builds the bottom status bar (frame, counts, last-frame events).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        let stats = self.sim.last_stats();
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt last = {:.3} s", self.last_step_dt));
                ui.separator();
                ui.label(format!("seed = {}", self.sim.seed()));
                ui.label(format!(
                    "merges = {}  bounces = {}  flocks = {}",
                    stats.merges, stats.bounces, stats.flocks
                ));
                ui.separator();
                ui.label(format!(
                    "particles = {}",
                    self.sim.population().particle_count()
                ));
                ui.label(format!("blobs = {}", self.sim.population().len()));
                ui.label(format!("frame = {}", self.sim.frame()));
            });
        });
    }

    /// Builds the right-hand configuration panel.
    ///
    /// Edits go to `pending` and only take effect on "Apply", which
    /// rebuilds the simulation.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Config");

                    ui.separator();
                    ui.label("Mode");
                    ui.horizontal(|ui| {
                        ui.radio_value(&mut self.pending.mode, BehaviorMode::Bounce, "Bounce");
                        ui.radio_value(&mut self.pending.mode, BehaviorMode::Flock, "Flock");
                        ui.radio_value(
                            &mut self.pending.mode,
                            BehaviorMode::Composite,
                            "Composite",
                        );
                    });

                    let cfg = &mut self.pending;
                    ui.separator();
                    ui.label("World");
                    Self::labeled_drag(ui, "width:", &mut cfg.world_width, 50.0..=4000.0, 5.0);
                    Self::labeled_drag(ui, "height:", &mut cfg.world_height, 50.0..=4000.0, 5.0);
                    Self::labeled_drag(ui, "num_blobs:", &mut cfg.num_blobs, 0..=5000, 1.0);
                    Self::labeled_drag(ui, "blob_radius:", &mut cfg.blob_radius, 1.0..=50.0, 0.2);
                    Self::labeled_drag(ui, "cell_size:", &mut cfg.cell_size, 5.0..=200.0, 0.5);

                    ui.separator();
                    ui.label("Motion");
                    Self::labeled_drag(ui, "substeps:", &mut cfg.substeps, 1..=8, 1.0);
                    Self::labeled_drag(ui, "buffer_factor:", &mut cfg.buffer_factor, 0.1..=2.0, 0.01);
                    Self::labeled_drag(
                        ui,
                        "repulsion:",
                        &mut cfg.repulsion_strength,
                        0.0..=5.0,
                        0.01,
                    );
                    Self::labeled_drag(
                        ui,
                        "max_step_fraction:",
                        &mut cfg.max_step_fraction,
                        0.05..=1.0,
                        0.01,
                    );
                    Self::labeled_drag(ui, "jitter:", &mut cfg.jitter, 0.0..=2.0, 0.01);
                    ui.checkbox(&mut cfg.regulate_speed, "regulate speed");
                    Self::labeled_drag(ui, "normal_speed:", &mut cfg.normal_speed, 0.0..=10.0, 0.05);
                    Self::labeled_drag(ui, "max_speed:", &mut cfg.max_speed, 0.1..=20.0, 0.05);

                    ui.separator();
                    ui.label("Color");
                    Self::labeled_drag(ui, "color_min:", &mut cfg.color_min, 0..=255, 1.0);
                    Self::labeled_drag(ui, "color_max:", &mut cfg.color_max, 0..=255, 1.0);
                    Self::labeled_drag(
                        ui,
                        "attraction:",
                        &mut cfg.attraction_threshold,
                        0.0..=450.0,
                        0.5,
                    );
                    Self::labeled_drag(
                        ui,
                        "bounce_strength:",
                        &mut cfg.color_bounce_strength,
                        0..=100,
                        1.0,
                    );

                    ui.separator();
                    ui.label("Aggregates");
                    Self::labeled_drag(ui, "merge_cooldown:", &mut cfg.merge_cooldown, 0..=600, 1.0);
                    Self::labeled_drag(
                        ui,
                        "max_subblobs:",
                        &mut cfg.max_subblobs_per_blob,
                        1..=200,
                        1.0,
                    );
                    Self::labeled_drag(
                        ui,
                        "outlier_threshold:",
                        &mut cfg.outlier_threshold,
                        1.0..=450.0,
                        0.5,
                    );
                    Self::labeled_drag(
                        ui,
                        "max_merges/frame:",
                        &mut cfg.max_collisions_per_frame,
                        0..=500,
                        1.0,
                    );
                    Self::labeled_drag(ui, "stagger:", &mut cfg.stagger_divisor, 1..=16, 1.0);

                    ui.separator();
                    ui.horizontal(|ui| {
                        if ui.button("Apply").clicked() {
                            self.apply_pending();
                        }
                        if ui.button("Reset cfg to default").clicked() {
                            self.pending = Config::default();
                        }
                    });
                    if let Some(err) = &self.error {
                        ui.colored_label(egui::Color32::LIGHT_RED, err.as_str());
                    }
                });
            });
    }

    /// Draws the outline of a blob that a click would spawn at the hovered position.
    fn ui_spawn_hint(&self, painter: &egui::Painter, rect: egui::Rect, hover_world: Option<Vec2>) {
        let Some(center) = hover_world else {
            return;
        };
        let stroke = egui::Stroke::new(1.5, egui::Color32::YELLOW);
        let p = self.world_to_screen(center, rect);
        painter.circle_stroke(p, self.sim.config().blob_radius * self.zoom, stroke);
    }

    /// Builds the central panel where aggregates are drawn and interacted with.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
            let rect = response.rect;
            let painter = ui.painter_at(rect);

            // Pan with drag.
            if response.dragged() {
                self.pan += response.drag_delta();
            }

            let hover_world = response.hover_pos().map(|p| self.screen_to_world(p, rect));

            if response.clicked()
                && let Some(pos) = hover_world
            {
                self.spawn_at(pos);
            }

            // Zoom around the mouse cursor.
            let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                let pointer_screen = response.hover_pos().unwrap_or(rect.center());
                let world_before = self.screen_to_world(pointer_screen, rect);

                let factor = (1.0 + scroll * 0.001).clamp(0.5, 2.0);
                self.zoom = (self.zoom * factor).clamp(0.1, 10.0);

                let screen_after = self.world_to_screen(world_before, rect);
                self.pan += pointer_screen - screen_after;
            }

            // World border.
            let world = *self.sim.world();
            let corner_a = self.world_to_screen(Vec2::ZERO, rect);
            let corner_b = self.world_to_screen(world.size(), rect);
            painter.rect_stroke(
                egui::Rect::from_two_pos(corner_a, corner_b),
                0.0,
                egui::Stroke::new(1.0, egui::Color32::DARK_GRAY),
                egui::StrokeKind::Outside,
            );

            // Sub-particles, with the last spawned blob outlined.
            for view in self.sim.snapshot() {
                let highlight = self.last_spawned == Some(view.id);
                for p in view.particles {
                    let center = self.world_to_screen(p.pos, rect);
                    let r = (p.radius * self.zoom).max(1.0);
                    let [red, green, blue] = p.color;
                    painter.circle_filled(center, r, egui::Color32::from_rgb(red, green, blue));
                    if highlight {
                        painter.circle_stroke(center, r, egui::Stroke::new(1.5, egui::Color32::WHITE));
                    }
                }
            }

            self.ui_spawn_hint(&painter, rect, hover_world);

            // Auto-run simulation if requested.
            if self.running {
                let now = ctx.input(|i| i.time);
                let elapsed = now - self.last_step_time;
                if elapsed >= self.step_interval {
                    if self.last_step_time > 0.0 {
                        self.last_step_dt = elapsed;
                    }
                    self.step_once();
                    self.last_step_time = now;
                }

                ctx.request_repaint();
            }
        });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);
        self.ui_central_panel(ctx);
    }
}
