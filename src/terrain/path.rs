//! Path tube geometry.
//!
//! The server's path arrives as ordered grid cells. Each cell maps to a
//! waypoint at its cell center, lifted to 1.1x the scaled surface height
//! so the tube clears the terrain, and a Catmull-Rom curve through the
//! waypoints is swept with a circular cross-section.

use glam::Vec3;

use super::mesh::Vertex;
use super::TerrainGrid;

/// Lift factor applied to waypoint heights to avoid z-fighting.
const LIFT: f32 = 1.1;
/// Cross-section vertices per ring.
const RADIAL_SEGMENTS: u32 = 8;

/// Tube mesh along the server-reported path.
pub struct PathMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Cell-center waypoints the curve interpolates, in path order.
    pub waypoints: Vec<Vec3>,
}

impl PathMesh {
    /// Build the tube for `cells` over `grid`.
    ///
    /// The tube radius is `diagonal / 300` and the sweep uses
    /// `nx + ny` longitudinal segments; the ends stay open since the
    /// cross-section is too small to show. Returns `None` for fewer
    /// than two waypoints, where no curve exists.
    pub fn from_cells(cells: &[(u32, u32)], grid: &TerrainGrid) -> Option<Self> {
        let waypoints: Vec<Vec3> = cells
            .iter()
            .map(|&(i, j)| {
                let center = grid.cell_center(i, j);
                Vec3::new(center.x, LIFT * center.y, center.z)
            })
            .collect();
        if waypoints.len() < 2 {
            return None;
        }

        let radius = grid.diagonal() / 300.0;
        let segments = grid.nx + grid.ny;
        Some(Self::sweep(waypoints, radius, segments))
    }

    fn sweep(waypoints: Vec<Vec3>, radius: f32, segments: u32) -> Self {
        let samples: Vec<Vec3> = (0..=segments)
            .map(|s| {
                let t = s as f32 / segments as f32 * (waypoints.len() - 1) as f32;
                catmull_rom(&waypoints, t)
            })
            .collect();

        // Central-difference tangents, carrying the previous direction
        // across degenerate (zero-length) steps.
        let mut tangents = Vec::with_capacity(samples.len());
        let mut last = Vec3::X;
        for s in 0..samples.len() {
            let ahead = samples[(s + 1).min(samples.len() - 1)];
            let behind = samples[s.saturating_sub(1)];
            let tangent = (ahead - behind).normalize_or_zero();
            last = if tangent == Vec3::ZERO { last } else { tangent };
            tangents.push(last);
        }

        // Parallel-transport frames: rotate the previous ring normal by
        // the rotation between consecutive tangents.
        let up = if tangents[0].y.abs() > 0.99 {
            Vec3::X
        } else {
            Vec3::Y
        };
        let mut normal = (up.cross(tangents[0])).normalize_or_zero();
        if normal == Vec3::ZERO {
            normal = Vec3::Z;
        }

        let mut vertices = Vec::with_capacity(samples.len() * RADIAL_SEGMENTS as usize);
        let mut prev_tangent = tangents[0];
        for (sample, &tangent) in samples.iter().zip(&tangents) {
            let rotation = glam::Quat::from_rotation_arc(prev_tangent, tangent);
            normal = (rotation * normal).normalize_or_zero();
            if normal == Vec3::ZERO {
                normal = Vec3::Y;
            }
            prev_tangent = tangent;
            let binormal = tangent.cross(normal);

            for r in 0..RADIAL_SEGMENTS {
                let angle = r as f32 * std::f32::consts::TAU / RADIAL_SEGMENTS as f32;
                let offset = normal * angle.cos() + binormal * angle.sin();
                vertices.push(Vertex {
                    position: (*sample + offset * radius).to_array(),
                    normal: offset.to_array(),
                    uv: [0.0, 0.0],
                });
            }
        }

        let ring = RADIAL_SEGMENTS;
        let mut indices = Vec::with_capacity(segments as usize * ring as usize * 6);
        for s in 0..segments {
            for r in 0..ring {
                let a = s * ring + r;
                let b = s * ring + (r + 1) % ring;
                let c = (s + 1) * ring + r;
                let d = (s + 1) * ring + (r + 1) % ring;

                indices.extend_from_slice(&[a, b, c]);
                indices.extend_from_slice(&[b, d, c]);
            }
        }

        Self {
            vertices,
            indices,
            waypoints,
        }
    }
}

/// Evaluate the Catmull-Rom curve through `points` at parameter `t`,
/// where integer values of `t` land exactly on the control points.
/// Endpoint neighbors are clamped, the usual open-curve convention; a
/// single control point yields that point for every `t`.
///
/// # Panics
///
/// Panics if `points` is empty.
pub fn catmull_rom(points: &[Vec3], t: f32) -> Vec3 {
    assert!(
        !points.is_empty(),
        "Catmull-Rom evaluation needs at least one control point"
    );
    let last = points.len() - 1;
    let seg = (t.floor() as usize).min(last.saturating_sub(1));
    let local = t - seg as f32;

    let p0 = points[seg.saturating_sub(1)];
    let p1 = points[seg];
    let p2 = points[(seg + 1).min(last)];
    let p3 = points[(seg + 2).min(last)];

    let t2 = local * local;
    let t3 = t2 * local;

    let h1 = -0.5 * t3 + t2 - 0.5 * local;
    let h2 = 1.5 * t3 - 2.5 * t2 + 1.0;
    let h3 = -1.5 * t3 + 2.0 * t2 + 0.5 * local;
    let h4 = 0.5 * t3 - 0.5 * t2;

    p0 * h1 + p1 * h2 + p2 * h3 + p3 * h4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::TerrainResponse;
    use crate::terrain::VERTICAL_SCALE;

    fn grid(nx: u32, ny: u32, elev: Vec<f32>) -> TerrainGrid {
        TerrainGrid::from_response(&TerrainResponse {
            nx,
            ny,
            long_dist: 400.0,
            lat_dist: 400.0,
            elev,
            result: 0,
            image_url: None,
            tex_scale_x: None,
            tex_scale_y: None,
            tex_shift_x: None,
            tex_shift_y: None,
            path: None,
        })
    }

    #[test]
    fn test_waypoints_at_lifted_cell_centers() {
        let g = grid(4, 4, vec![0.0; 16]);
        let cells = [(0, 0), (1, 1), (2, 2), (3, 3)];
        let path = PathMesh::from_cells(&cells, &g).unwrap();

        assert_eq!(path.waypoints.len(), 4);
        for (&(i, j), waypoint) in cells.iter().zip(&path.waypoints) {
            let expected_x = -200.0 + (i as f32 + 0.5) * 100.0;
            let expected_z = -200.0 + (j as f32 + 0.5) * 100.0;
            assert_eq!(waypoint.x, expected_x);
            assert_eq!(waypoint.z, expected_z);
            assert_eq!(waypoint.y, 0.0);
        }
    }

    #[test]
    fn test_waypoint_height_lift() {
        let mut elev = vec![0.0; 16];
        elev[5] = 8.0; // cell (1, 1)
        let g = grid(4, 4, elev);
        let path = PathMesh::from_cells(&[(0, 0), (1, 1)], &g).unwrap();

        assert_eq!(path.waypoints[1].y, 1.1 * VERTICAL_SCALE * 8.0);
    }

    #[test]
    fn test_curve_interpolates_waypoints() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 5.0, 0.0),
            Vec3::new(20.0, 0.0, 10.0),
            Vec3::new(30.0, 2.0, 10.0),
        ];
        for (k, &p) in points.iter().enumerate() {
            let on_curve = catmull_rom(&points, k as f32);
            assert!((on_curve - p).length() < 1e-4, "point {}: {:?}", k, on_curve);
        }
    }

    #[test]
    fn test_curve_single_point_is_constant() {
        let points = vec![Vec3::new(3.0, 1.0, -2.0)];
        for t in [-1.0, 0.0, 0.5, 4.0] {
            assert_eq!(catmull_rom(&points, t), points[0]);
        }
    }

    #[test]
    #[should_panic(expected = "at least one control point")]
    fn test_curve_rejects_empty_input() {
        catmull_rom(&[], 0.0);
    }

    #[test]
    fn test_tube_dimensions() {
        let g = grid(4, 4, vec![0.0; 16]);
        let path = PathMesh::from_cells(&[(0, 0), (3, 3)], &g).unwrap();

        // nx + ny segments of 8-vertex rings
        let rings = (4 + 4 + 1) as usize;
        assert_eq!(path.vertices.len(), rings * 8);
        assert_eq!(path.indices.len(), (4 + 4) * 8 * 6);
    }

    #[test]
    fn test_tube_radius_from_diagonal() {
        let g = grid(4, 4, vec![0.0; 16]);
        let path = PathMesh::from_cells(&[(0, 1), (3, 1)], &g).unwrap();
        let radius = g.diagonal() / 300.0;

        // First ring is centered on the first waypoint
        let center = path.waypoints[0];
        for vertex in &path.vertices[..8] {
            let p = Vec3::from_array(vertex.position);
            assert!(((p - center).length() - radius).abs() < 1e-3);
        }
    }

    #[test]
    fn test_too_few_waypoints() {
        let g = grid(4, 4, vec![0.0; 16]);
        assert!(PathMesh::from_cells(&[], &g).is_none());
        assert!(PathMesh::from_cells(&[(2, 2)], &g).is_none());
    }
}
