//! Scene assembly.
//!
//! A [`Scene`] is the full CPU-side description built from one payload:
//! ground mesh, texture plan, optional path tube, marker, light, and
//! the initial camera framing. Every update tears the previous scene
//! down and builds a fresh one; nothing is patched incrementally.

use glam::Vec3;
use image::RgbaImage;
use rand::Rng;

use crate::renderer::camera::Camera;
use crate::response::{PathStatus, TerrainResponse};
use crate::terrain::mesh::MarkerMesh;
use crate::terrain::{texture, HeightfieldMesh, PathMesh, TerrainGrid, TextureStrategy};

/// The one directional light.
#[derive(Debug, Clone, Copy)]
pub struct LightConfig {
    /// Direction the light travels, normalized at use.
    pub direction: Vec3,
    pub color: [f32; 3],
    /// Ambient term added to the lambert response.
    pub ambient: f32,
    pub shadow: ShadowConfig,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            // Sun at (1, 1, 1), matching the procedural shading
            direction: Vec3::new(-1.0, -1.0, -1.0),
            color: [1.0, 1.0, 1.0],
            ambient: 0.35,
            shadow: ShadowConfig::default(),
        }
    }
}

/// Shadow-map tuning; scene-scale dependent values are multipliers,
/// not absolutes.
#[derive(Debug, Clone, Copy)]
pub struct ShadowConfig {
    /// Square shadow map resolution in texels.
    pub resolution: u32,
    /// Depth bias applied during the comparison.
    pub bias: f32,
    /// Frustum half-extent as a multiple of the scene half-diagonal.
    pub margin: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            bias: 0.0015,
            margin: 1.1,
        }
    }
}

/// Everything one payload builds.
pub struct Scene {
    pub grid: TerrainGrid,
    pub terrain: HeightfieldMesh,
    pub path: Option<PathMesh>,
    pub marker: MarkerMesh,
    pub texture: TextureStrategy,
    /// Pixels ready at build time (procedural synthesis). Image-backed
    /// strategies start `None` and fill in when the async load lands.
    pub texture_image: Option<RgbaImage>,
    pub light: LightConfig,
    pub status: PathStatus,
}

impl Scene {
    /// Build the scene for a validated payload. The `rng` feeds the
    /// procedural texture dither.
    pub fn from_response<R: Rng>(response: &TerrainResponse, rng: &mut R) -> Self {
        let grid = TerrainGrid::from_response(response);
        let terrain = HeightfieldMesh::from_grid(&grid);

        let strategy = TextureStrategy::from_response(response);
        let texture_image = match strategy {
            TextureStrategy::Procedural => Some(texture::shaded_texture(&grid, rng)),
            _ => None,
        };

        let path = PathMesh::from_cells(&response.path_cells(), &grid);

        let diagonal = grid.diagonal();
        let marker = MarkerMesh::cone(diagonal / 70.0, diagonal / 14.0);

        Self {
            grid,
            terrain,
            path,
            marker,
            texture: strategy,
            texture_image,
            light: LightConfig::default(),
            status: response.status(),
        }
    }

    /// The orbit minimum: the larger of the two plane extents.
    pub fn min_zoom(&self) -> f32 {
        self.grid.long_dist.max(self.grid.lat_dist)
    }

    /// Initial camera framing: orbit the center of the plane at the
    /// minimum zoom distance, targeting the center sample's height.
    pub fn camera_home(&self) -> Camera {
        let center_height = self.grid.height(self.grid.nx / 2, self.grid.ny / 2);
        Camera::framed(Vec3::new(0.0, center_height, 0.0), self.min_zoom())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn payload() -> TerrainResponse {
        TerrainResponse {
            nx: 4,
            ny: 4,
            long_dist: 400.0,
            lat_dist: 300.0,
            elev: vec![2.0; 16],
            result: 1,
            image_url: None,
            tex_scale_x: None,
            tex_scale_y: None,
            tex_shift_x: None,
            tex_shift_y: None,
            path: None,
        }
    }

    #[test]
    fn test_procedural_scene_has_texture_at_build() {
        let scene = Scene::from_response(&payload(), &mut StdRng::seed_from_u64(1));

        assert_eq!(scene.texture, TextureStrategy::Procedural);
        let image = scene.texture_image.as_ref().unwrap();
        assert_eq!((image.width(), image.height()), (16, 16));
        assert!(scene.path.is_none());
        assert_eq!(scene.status, PathStatus::Found);
    }

    #[test]
    fn test_image_scene_waits_for_load() {
        let mut response = payload();
        response.image_url = Some("map.png".to_string());
        let scene = Scene::from_response(&response, &mut StdRng::seed_from_u64(1));

        assert!(scene.texture_image.is_none());
        assert_eq!(scene.texture.source(), Some("map.png"));
    }

    #[test]
    fn test_path_built_when_present() {
        let mut response = payload();
        response.path = Some(vec![0, 0, 1, 1, 2, 2, 3, 3]);
        let scene = Scene::from_response(&response, &mut StdRng::seed_from_u64(1));

        let path = scene.path.as_ref().unwrap();
        assert_eq!(path.waypoints.len(), 4);
    }

    #[test]
    fn test_camera_home_framing() {
        let mut response = payload();
        response.elev[10] = 30.0; // center sample (2, 2)
        let scene = Scene::from_response(&response, &mut StdRng::seed_from_u64(1));
        let home = scene.camera_home();

        assert_eq!(scene.min_zoom(), 400.0);
        assert_eq!(home.distance, 400.0);
        assert_eq!(home.target, Vec3::new(0.0, 300.0, 0.0));
    }

    #[test]
    fn test_marker_scaled_to_diagonal() {
        let scene = Scene::from_response(&payload(), &mut StdRng::seed_from_u64(1));
        let diagonal = 500.0; // 3-4-5 triangle

        let apex_height = scene
            .marker
            .vertices
            .iter()
            .map(|v| v.position[1])
            .fold(f32::MIN, f32::max);
        assert!((apex_height - diagonal / 14.0).abs() < 1e-3);
    }
}
