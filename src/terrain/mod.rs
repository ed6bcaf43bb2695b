//! Terrain data structures and scene geometry.
//!
//! This module provides:
//! - [`TerrainGrid`] - Elevation grid with the world-space mapping
//! - [`HeightfieldMesh`] - GPU-ready ground mesh generation
//! - [`TextureStrategy`] - The three drape modes behind one interface
//! - [`PathMesh`] - Tube geometry for a highlighted path

pub mod mesh;
pub mod path;
pub mod texture;

pub use mesh::{HeightfieldMesh, Vertex};
pub use path::PathMesh;
pub use texture::{TextureStrategy, UvTransform};

use glam::Vec3;

use crate::response::TerrainResponse;

/// World-space height of one elevation unit. Terrain vertices sit at
/// `VERTICAL_SCALE * elev[k]`.
pub const VERTICAL_SCALE: f32 = 10.0;

/// The elevation grid plus its world-space footprint.
///
/// The grid is row-major with `nx` samples per row; sample `(i, j)` is
/// `elev[j * nx + i]`. The terrain plane spans `long_dist x lat_dist`
/// centered on the origin in XZ, with +Y up: `i` walks +X and `j`
/// walks +Z.
#[derive(Debug, Clone)]
pub struct TerrainGrid {
    /// Number of samples along X.
    pub nx: u32,
    /// Number of samples along Z.
    pub ny: u32,
    /// Plane extent along X.
    pub long_dist: f32,
    /// Plane extent along Z.
    pub lat_dist: f32,
    elev: Vec<f32>,
}

impl TerrainGrid {
    pub fn from_response(response: &TerrainResponse) -> Self {
        Self {
            nx: response.nx,
            ny: response.ny,
            long_dist: response.long_dist,
            lat_dist: response.lat_dist,
            elev: response.elev.clone(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.nx as usize * self.ny as usize
    }

    /// Raw elevation sample at grid point `(i, j)`.
    pub fn elevation(&self, i: u32, j: u32) -> f32 {
        self.elev[j as usize * self.nx as usize + i as usize]
    }

    /// Raw elevation with indices clamped to the grid border, so
    /// finite-difference stencils stay in bounds at the edges.
    pub fn elevation_clamped(&self, i: i64, j: i64) -> f32 {
        let i = i.clamp(0, self.nx as i64 - 1) as u32;
        let j = j.clamp(0, self.ny as i64 - 1) as u32;
        self.elevation(i, j)
    }

    /// World-space height of the surface at grid point `(i, j)`.
    pub fn height(&self, i: u32, j: u32) -> f32 {
        VERTICAL_SCALE * self.elevation(i, j)
    }

    /// World position of grid vertex `(i, j)`.
    ///
    /// A degenerate axis (`nx == 1` or `ny == 1`) collapses to 0 rather
    /// than dividing by zero.
    pub fn vertex_position(&self, i: u32, j: u32) -> Vec3 {
        let x = if self.nx > 1 {
            -self.long_dist / 2.0 + i as f32 * self.long_dist / (self.nx - 1) as f32
        } else {
            0.0
        };
        let z = if self.ny > 1 {
            -self.lat_dist / 2.0 + j as f32 * self.lat_dist / (self.ny - 1) as f32
        } else {
            0.0
        };
        Vec3::new(x, self.height(i, j), z)
    }

    /// World position of the center of grid cell `(i, j)`, on the
    /// surface. Cells partition the plane into `nx x ny` tiles, so the
    /// center sits half a tile in from the cell's corner.
    pub fn cell_center(&self, i: u32, j: u32) -> Vec3 {
        let x = -self.long_dist / 2.0 + (i as f32 + 0.5) * self.long_dist / self.nx as f32;
        let z = -self.lat_dist / 2.0 + (j as f32 + 0.5) * self.lat_dist / self.ny as f32;
        Vec3::new(x, self.height(i, j), z)
    }

    /// Length of the plane diagonal; the scene's characteristic scale.
    pub fn diagonal(&self) -> f32 {
        (self.long_dist * self.long_dist + self.lat_dist * self.lat_dist).sqrt()
    }

    /// Minimum and maximum world-space surface heights.
    ///
    /// Returns `(0.0, 0.0)` for an empty grid.
    pub fn height_bounds(&self) -> (f32, f32) {
        let mut min = f32::MAX;
        let mut max = f32::MIN;

        for &h in &self.elev {
            min = min.min(h);
            max = max.max(h);
        }

        if min > max {
            (0.0, 0.0)
        } else {
            (min * VERTICAL_SCALE, max * VERTICAL_SCALE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_3x2() -> TerrainGrid {
        TerrainGrid {
            nx: 3,
            ny: 2,
            long_dist: 300.0,
            lat_dist: 200.0,
            elev: vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        }
    }

    #[test]
    fn test_elevation_row_major() {
        let grid = grid_3x2();
        assert_eq!(grid.elevation(0, 0), 0.0);
        assert_eq!(grid.elevation(2, 0), 2.0);
        assert_eq!(grid.elevation(0, 1), 3.0);
        assert_eq!(grid.elevation(2, 1), 5.0);
    }

    #[test]
    fn test_height_applies_vertical_scale() {
        let grid = grid_3x2();
        assert_eq!(grid.height(1, 1), 40.0);
    }

    #[test]
    fn test_vertex_position_spans_extents() {
        let grid = grid_3x2();
        let first = grid.vertex_position(0, 0);
        let last = grid.vertex_position(2, 1);

        assert_eq!(first.x, -150.0);
        assert_eq!(first.z, -100.0);
        assert_eq!(last.x, 150.0);
        assert_eq!(last.z, 100.0);
        assert_eq!(grid.vertex_position(1, 0).x, 0.0);
    }

    #[test]
    fn test_vertex_position_degenerate_axis() {
        let grid = TerrainGrid {
            nx: 1,
            ny: 1,
            long_dist: 100.0,
            lat_dist: 100.0,
            elev: vec![7.0],
        };
        let p = grid.vertex_position(0, 0);
        assert_eq!(p, Vec3::new(0.0, 70.0, 0.0));
    }

    #[test]
    fn test_cell_center() {
        let grid = grid_3x2();
        let c = grid.cell_center(0, 0);
        assert_eq!(c.x, -150.0 + 0.5 * 100.0);
        assert_eq!(c.z, -100.0 + 0.5 * 100.0);
        assert_eq!(c.y, 0.0);

        let c = grid.cell_center(2, 1);
        assert_eq!(c.x, -150.0 + 2.5 * 100.0);
        assert_eq!(c.z, -100.0 + 1.5 * 100.0);
        assert_eq!(c.y, 50.0);
    }

    #[test]
    fn test_elevation_clamped_borders() {
        let grid = grid_3x2();
        assert_eq!(grid.elevation_clamped(-2, 0), grid.elevation(0, 0));
        assert_eq!(grid.elevation_clamped(5, 0), grid.elevation(2, 0));
        assert_eq!(grid.elevation_clamped(1, -1), grid.elevation(1, 0));
        assert_eq!(grid.elevation_clamped(1, 9), grid.elevation(1, 1));
    }

    #[test]
    fn test_diagonal() {
        let grid = TerrainGrid {
            nx: 2,
            ny: 2,
            long_dist: 300.0,
            lat_dist: 400.0,
            elev: vec![0.0; 4],
        };
        assert_eq!(grid.diagonal(), 500.0);
    }

    #[test]
    fn test_height_bounds_scaled() {
        let grid = grid_3x2();
        let (min, max) = grid.height_bounds();
        assert_eq!(min, 0.0);
        assert_eq!(max, 50.0);
    }
}
