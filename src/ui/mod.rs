//! User interface using egui.
//!
//! Provides the info/controls side panel and the route alert modal.

use egui::Context;

use crate::view::TerrainView;

/// UI state and rendering.
pub struct Ui {
    /// Whether the side panel is visible
    pub panel_visible: bool,
    /// Pending alert message, shown until dismissed
    alert: Option<String>,
}

impl Ui {
    pub fn new() -> Self {
        Self {
            panel_visible: true,
            alert: None,
        }
    }

    /// Render the UI and report requested actions.
    ///
    /// Picks up at most one alert per scene update from the view and keeps
    /// it on screen until the user dismisses it.
    pub fn render(&mut self, ctx: &Context, view: &mut TerrainView, fps: f32) -> UiResponse {
        let mut response = UiResponse::default();

        if let Some(message) = view.take_alert() {
            self.alert = Some(message);
        }

        // Toggle panel with Tab key
        if ctx.input(|i| i.key_pressed(egui::Key::Tab)) {
            self.panel_visible = !self.panel_visible;
        }

        if self.panel_visible {
            egui::SidePanel::left("controls")
                .default_width(200.0)
                .show(ctx, |ui| {
                    ui.heading("trailview");
                    ui.separator();

                    // Performance
                    ui.label(format!("FPS: {:.1}", fps));
                    ui.separator();

                    // Scene section
                    if let Some(scene) = view.scene() {
                        ui.collapsing("Terrain", |ui| {
                            ui.label(format!("Grid: {} x {}", scene.grid.nx, scene.grid.ny));
                            ui.label(format!(
                                "Extent: {:.0} x {:.0}",
                                scene.grid.long_dist, scene.grid.lat_dist
                            ));
                            ui.label(format!("Texture: {}", scene.texture.label()));
                            if view.texture_pending() {
                                ui.label("Image loading...");
                            }
                            ui.label(format!("Route: {}", scene.status.label()));
                        });
                        ui.separator();
                    }

                    // Camera section
                    ui.collapsing("Camera", |ui| {
                        let camera = &mut view.camera;
                        ui.horizontal(|ui| {
                            ui.label("Distance:");
                            let speed = camera.distance.abs().max(100.0) * 0.01;
                            ui.add(egui::DragValue::new(&mut camera.distance).speed(speed));
                        });

                        ui.horizontal(|ui| {
                            ui.label("Azimuth:");
                            let mut degrees = camera.azimuth.to_degrees();
                            if ui
                                .add(egui::DragValue::new(&mut degrees).speed(1.0).suffix("°"))
                                .changed()
                            {
                                camera.azimuth = degrees.to_radians();
                            }
                        });

                        ui.horizontal(|ui| {
                            ui.label("Elevation:");
                            let mut degrees = camera.elevation.to_degrees();
                            if ui
                                .add(
                                    egui::DragValue::new(&mut degrees)
                                        .speed(1.0)
                                        .suffix("°")
                                        .range(0.0..=89.0),
                                )
                                .changed()
                            {
                                camera.elevation = degrees.to_radians();
                            }
                        });

                        ui.horizontal(|ui| {
                            ui.label("FOV:");
                            ui.add(
                                egui::DragValue::new(&mut camera.fov)
                                    .speed(1.0)
                                    .suffix("°")
                                    .range(10.0..=120.0),
                            );
                        });

                        if ui.button("Reset View").clicked() {
                            response.reset_view = true;
                        }
                    });

                    ui.separator();

                    if ui.button("Reload Payload").clicked() {
                        response.reload_requested = true;
                    }

                    ui.separator();

                    // Help section
                    ui.collapsing("Controls", |ui| {
                        ui.label("Left Drag: Rotate");
                        ui.label("Scroll: Zoom");
                        ui.label("Shift+Drag: Pan");
                        ui.label("Middle Drag: Pan");
                        ui.label("R: Reset View");
                        ui.label("L: Reload Payload");
                        ui.label("Tab: Toggle Panel");
                        ui.label("ESC: Quit");
                    });
                });
        }

        // Route alert, modal until dismissed
        if let Some(message) = &self.alert {
            let mut dismissed = false;
            let modal = egui::Modal::new(egui::Id::new("route_alert")).show(ctx, |ui| {
                ui.set_width(280.0);
                ui.label(message);
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
            if modal.should_close() {
                dismissed = true;
            }
            if dismissed {
                self.alert = None;
            }
        }

        response
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from UI indicating what actions to take.
#[derive(Default)]
pub struct UiResponse {
    pub reset_view: bool,
    pub reload_requested: bool,
}
