//! The terrain view.
//!
//! [`TerrainView`] owns the scene, the orbit camera, and the pointer
//! marker. The surrounding application holds exactly one and drives it
//! with payloads, pointer positions, and resize events; the renderer
//! reads from it every frame. The view starts empty and stays empty
//! until the first payload arrives.

use glam::{Mat4, Quat, Vec2, Vec3};
use image::RgbaImage;
use log::{info, warn};

use crate::picking::{self, Ray};
use crate::renderer::camera::Camera;
use crate::response::{PathStatus, ResponseError, TerrainResponse};
use crate::scene::Scene;
use crate::terrain::texture::PendingTexture;

pub struct TerrainView {
    scene: Option<Scene>,
    pub camera: Camera,
    home: Camera,
    width: u32,
    height: u32,
    marker_position: Vec3,
    marker_rotation: Quat,
    alert: Option<String>,
    pending_texture: Option<PendingTexture>,
    generation: u64,
}

impl TerrainView {
    /// An empty view: no scene renders until the first payload.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            scene: None,
            camera: Camera::new(),
            home: Camera::new(),
            width: width.max(1),
            height: height.max(1),
            marker_position: Vec3::ZERO,
            marker_rotation: Quat::IDENTITY,
            alert: None,
            pending_texture: None,
            generation: 0,
        }
    }

    /// Apply a payload: raise the alert its result code calls for,
    /// then rebuild the whole scene from the new data. Rejects
    /// payloads that fail validation, leaving the current scene up.
    pub fn update(&mut self, response: &TerrainResponse) -> Result<(), ResponseError> {
        response.validate()?;

        let status = response.status();
        if let Some(message) = status.alert() {
            warn!("server reported: {}", message);
            self.alert = Some(message.to_string());
        }
        if let PathStatus::Unknown(code) = status {
            warn!("unrecognized result code {}, proceeding", code);
        }

        self.generation += 1;
        let scene = Scene::from_response(response, &mut rand::rng());
        info!(
            "scene rebuilt: {}x{} grid, {} texture, path {}",
            scene.grid.nx,
            scene.grid.ny,
            scene.texture.label(),
            scene.status.label()
        );

        self.pending_texture = scene
            .texture
            .source()
            .map(|source| PendingTexture::spawn(source.to_string(), self.generation));

        self.home = scene.camera_home();
        self.camera = self.home;
        self.marker_position = Vec3::ZERO;
        self.marker_rotation = Quat::IDENTITY;
        self.scene = Some(scene);
        Ok(())
    }

    /// The pending alert, if any. Consuming it clears it, so each
    /// update surfaces its message exactly once.
    pub fn take_alert(&mut self) -> Option<String> {
        self.alert.take()
    }

    /// Non-blocking poll of the background texture load. An image is
    /// returned once, ready for upload; failures and deliveries for a
    /// superseded scene are swallowed (the placeholder stays bound).
    pub fn poll_texture(&mut self) -> Option<RgbaImage> {
        let pending = self.pending_texture.as_ref()?;
        let result = pending.poll()?;
        let generation = pending.generation;
        self.pending_texture = None;

        match result {
            Ok(image) if generation == self.generation => Some(image),
            Ok(_) => None,
            Err(err) => {
                warn!("texture load failed: {}", err);
                None
            }
        }
    }

    /// Move the marker to the terrain point under the cursor, oriented
    /// along the surface normal. Returns false (marker untouched) when
    /// nothing is hit.
    pub fn pointer_moved(&mut self, x: f32, y: f32) -> bool {
        let Some(scene) = &self.scene else {
            return false;
        };

        let cursor = Vec2::new(x, y);
        let viewport = Vec2::new(self.width as f32, self.height as f32);
        let Some(ray) = Ray::from_cursor(cursor, viewport, self.view_projection()) else {
            return false;
        };
        let Some(hit) =
            picking::intersect_mesh(&ray, &scene.terrain.vertices, &scene.terrain.indices)
        else {
            return false;
        };

        self.marker_position = hit.point;
        self.marker_rotation = Quat::from_rotation_arc(Vec3::Y, hit.normal);
        true
    }

    /// Track the viewport so the projection aspect follows the window.
    pub fn resized(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn view_projection(&self) -> Mat4 {
        self.camera.build_view_projection_matrix(self.aspect())
    }

    pub fn marker_transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.marker_rotation, self.marker_position)
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    /// Whether a texture load is still in flight.
    pub fn texture_pending(&self) -> bool {
        self.pending_texture.is_some()
    }

    /// The scene's initial framing, restored by the camera-reset key.
    pub fn home(&self) -> &Camera {
        &self.home
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn payload() -> TerrainResponse {
        TerrainResponse {
            nx: 4,
            ny: 4,
            long_dist: 400.0,
            lat_dist: 300.0,
            elev: vec![5.0; 16],
            result: 0,
            image_url: None,
            tex_scale_x: None,
            tex_scale_y: None,
            tex_shift_x: None,
            tex_shift_y: None,
            path: None,
        }
    }

    fn look_straight_down(view: &mut TerrainView) {
        view.camera.target = Vec3::ZERO;
        view.camera.azimuth = 0.0;
        view.camera.elevation = std::f32::consts::FRAC_PI_2 - 0.01;
        view.camera.distance = 500.0;
    }

    #[test]
    fn test_view_starts_empty() {
        let mut view = TerrainView::new(800, 600);
        assert!(view.scene().is_none());
        assert!(view.take_alert().is_none());
        assert!(view.poll_texture().is_none());
    }

    #[test]
    fn test_update_rebuilds_scene() {
        let mut view = TerrainView::new(800, 600);
        view.update(&payload()).unwrap();

        let scene = view.scene().unwrap();
        assert_eq!(scene.grid.nx, 4);
        assert_eq!(view.camera.distance, 400.0);
        assert!(view.take_alert().is_none());
    }

    #[test]
    fn test_invalid_end_alerts_exactly_once_and_still_rebuilds() {
        let mut view = TerrainView::new(800, 600);
        let mut response = payload();
        response.result = 3;
        view.update(&response).unwrap();

        assert_eq!(view.take_alert().as_deref(), Some("Invalid Ending Location"));
        assert!(view.take_alert().is_none());
        assert!(view.scene().is_some());
    }

    #[test]
    fn test_alert_messages_per_code() {
        for (code, message) in [
            (2, "Invalid Starting Location"),
            (4, "No Path Found"),
        ] {
            let mut view = TerrainView::new(800, 600);
            let mut response = payload();
            response.result = code;
            view.update(&response).unwrap();
            assert_eq!(view.take_alert().as_deref(), Some(message));
        }
    }

    #[test]
    fn test_rejected_payload_keeps_previous_scene() {
        let mut view = TerrainView::new(800, 600);
        view.update(&payload()).unwrap();

        let mut bad = payload();
        bad.elev.pop();
        assert!(view.update(&bad).is_err());
        assert!(view.scene().is_some());
        assert_eq!(view.scene().unwrap().grid.nx, 4);
    }

    #[test]
    fn test_pointer_hit_moves_marker() {
        let mut view = TerrainView::new(800, 600);
        view.update(&payload()).unwrap();
        look_straight_down(&mut view);

        assert!(view.pointer_moved(400.0, 300.0));
        let translation = view.marker_transform().w_axis;
        assert!((translation.y - 50.0).abs() < 0.1);
        assert!(translation.x.abs() < 10.0);
    }

    #[test]
    fn test_pointer_miss_keeps_marker() {
        let mut view = TerrainView::new(800, 600);
        view.update(&payload()).unwrap();
        look_straight_down(&mut view);
        assert!(view.pointer_moved(400.0, 300.0));
        let before = view.marker_transform();

        // Aim far above the terrain: the view ray descends kilometers
        // away from the plane and never crosses it.
        view.camera.target = Vec3::new(0.0, 100_000.0, 0.0);
        view.camera.elevation = std::f32::consts::FRAC_PI_6;
        assert!(!view.pointer_moved(400.0, 300.0));
        assert_eq!(view.marker_transform(), before);
    }

    #[test]
    fn test_pointer_ignored_without_scene() {
        let mut view = TerrainView::new(800, 600);
        assert!(!view.pointer_moved(400.0, 300.0));
    }

    #[test]
    fn test_resize_updates_aspect() {
        let mut view = TerrainView::new(800, 600);
        assert!((view.aspect() - 800.0 / 600.0).abs() < 1e-6);

        view.resized(1024, 512);
        assert_eq!(view.aspect(), 2.0);

        // Degenerate sizes never divide by zero
        view.resized(100, 0);
        assert_eq!(view.aspect(), 100.0);
    }

    #[test]
    fn test_texture_delivery_for_image_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.png");
        RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let mut view = TerrainView::new(800, 600);
        let mut response = payload();
        response.image_url = Some(path.display().to_string());
        view.update(&response).unwrap();
        assert!(view.scene().unwrap().texture_image.is_none());

        let mut delivered = None;
        for _ in 0..250 {
            if let Some(image) = view.poll_texture() {
                delivered = Some(image);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let image = delivered.expect("texture never delivered");
        assert_eq!((image.width(), image.height()), (2, 2));

        // Delivered once; later polls stay quiet
        assert!(view.poll_texture().is_none());
    }

    #[test]
    fn test_failed_texture_load_is_silent() {
        let mut view = TerrainView::new(800, 600);
        let mut response = payload();
        response.image_url = Some("/nonexistent/map.png".to_string());
        view.update(&response).unwrap();
        assert!(view.texture_pending());

        let mut rounds = 0;
        while view.texture_pending() {
            assert!(view.poll_texture().is_none());
            std::thread::sleep(std::time::Duration::from_millis(10));
            rounds += 1;
            assert!(rounds < 500, "load result never arrived");
        }
        assert!(view.poll_texture().is_none());
    }
}
