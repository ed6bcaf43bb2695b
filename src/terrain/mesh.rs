use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::TerrainGrid;

/// Vertex data for GPU
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// The ground mesh: one vertex per grid sample, two triangles per cell.
///
/// Vertex `k` corresponds to grid sample `k` (row-major), so lookups by
/// grid index carry over from the elevation array unchanged.
pub struct HeightfieldMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl HeightfieldMesh {
    /// Generate the displaced grid mesh with smoothed vertex normals.
    ///
    /// Triangles wind counter-clockwise seen from +Y. Normals are the
    /// normalized sum of unnormalized face normals, which weights each
    /// face by its area. UVs span `[0,1]` across the full plane.
    pub fn from_grid(grid: &TerrainGrid) -> Self {
        let nx = grid.nx as usize;
        let ny = grid.ny as usize;

        let mut vertices = Vec::with_capacity(nx * ny);
        for j in 0..grid.ny {
            for i in 0..grid.nx {
                let position = grid.vertex_position(i, j);
                let u = if grid.nx > 1 {
                    i as f32 / (grid.nx - 1) as f32
                } else {
                    0.0
                };
                let v = if grid.ny > 1 {
                    j as f32 / (grid.ny - 1) as f32
                } else {
                    0.0
                };
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal: [0.0, 0.0, 0.0],
                    uv: [u, v],
                });
            }
        }

        // Two triangles per cell: (tl, bl, tr) and (tr, bl, br)
        let mut indices = Vec::with_capacity(nx.saturating_sub(1) * ny.saturating_sub(1) * 6);
        for j in 0..ny.saturating_sub(1) {
            for i in 0..nx.saturating_sub(1) {
                let tl = (j * nx + i) as u32;
                let tr = tl + 1;
                let bl = tl + nx as u32;
                let br = bl + 1;

                indices.extend_from_slice(&[tl, bl, tr]);
                indices.extend_from_slice(&[tr, bl, br]);
            }
        }

        // Accumulate unnormalized face normals onto their corners
        let mut normals = vec![Vec3::ZERO; vertices.len()];
        for tri in indices.chunks_exact(3) {
            let p0 = Vec3::from_array(vertices[tri[0] as usize].position);
            let p1 = Vec3::from_array(vertices[tri[1] as usize].position);
            let p2 = Vec3::from_array(vertices[tri[2] as usize].position);
            let face = (p1 - p0).cross(p2 - p0);

            for &idx in tri {
                normals[idx as usize] += face;
            }
        }

        for (vertex, normal) in vertices.iter_mut().zip(&normals) {
            let n = normal.normalize_or_zero();
            vertex.normal = if n == Vec3::ZERO {
                [0.0, 1.0, 0.0]
            } else {
                n.to_array()
            };
        }

        Self { vertices, indices }
    }
}

/// The pointer marker: a three-sided cone standing on its base.
///
/// The base circle sits on y = 0 and the apex points up +Y; the view
/// re-orients +Y along the picked surface normal.
pub struct MarkerMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MarkerMesh {
    pub fn cone(radius: f32, height: f32) -> Self {
        let apex = Vec3::new(0.0, height, 0.0);
        let ring: Vec<Vec3> = (0..3)
            .map(|k| {
                let angle = k as f32 * std::f32::consts::TAU / 3.0;
                Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin())
            })
            .collect();

        let mut mesh = Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        };
        for k in 0..3 {
            mesh.push_triangle(ring[(k + 1) % 3], ring[k], apex);
        }
        mesh.push_triangle(ring[0], ring[1], ring[2]);
        mesh
    }

    // Flat-shaded: each face gets its own vertices carrying the face normal.
    fn push_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) {
        let normal = (b - a).cross(c - a).normalize_or_zero().to_array();
        let base = self.vertices.len() as u32;
        for p in [a, b, c] {
            self.vertices.push(Vertex {
                position: p.to_array(),
                normal,
                uv: [0.0, 0.0],
            });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::TerrainResponse;

    fn grid(nx: u32, ny: u32, elev: Vec<f32>) -> TerrainGrid {
        TerrainGrid::from_response(&TerrainResponse {
            nx,
            ny,
            long_dist: 100.0 * nx as f32,
            lat_dist: 100.0 * ny as f32,
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
    fn test_vertex_and_triangle_counts() {
        for (nx, ny) in [(2, 2), (3, 2), (5, 7)] {
            let g = grid(nx, ny, vec![1.0; (nx * ny) as usize]);
            let mesh = HeightfieldMesh::from_grid(&g);

            assert_eq!(mesh.vertices.len(), (nx * ny) as usize);
            assert_eq!(
                mesh.indices.len(),
                ((nx - 1) * (ny - 1) * 2 * 3) as usize,
                "{}x{} grid",
                nx,
                ny
            );
        }
    }

    #[test]
    fn test_single_sample_has_no_triangles() {
        let mesh = HeightfieldMesh::from_grid(&grid(1, 1, vec![3.0]));
        assert_eq!(mesh.vertices.len(), 1);
        assert!(mesh.indices.is_empty());
    }

    #[test]
    fn test_vertex_height_is_scaled_elevation() {
        let elev = vec![0.0, 1.5, 3.0, 4.5, 6.0, 7.5];
        let mesh = HeightfieldMesh::from_grid(&grid(3, 2, elev.clone()));

        for (k, &e) in elev.iter().enumerate() {
            assert_eq!(mesh.vertices[k].position[1], 10.0 * e);
        }
    }

    #[test]
    fn test_flat_grid_normals_point_up() {
        let mesh = HeightfieldMesh::from_grid(&grid(4, 4, vec![2.0; 16]));
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn test_triangles_wind_ccw_from_above() {
        let mesh = HeightfieldMesh::from_grid(&grid(2, 2, vec![0.0; 4]));
        for tri in mesh.indices.chunks_exact(3) {
            let p0 = Vec3::from_array(mesh.vertices[tri[0] as usize].position);
            let p1 = Vec3::from_array(mesh.vertices[tri[1] as usize].position);
            let p2 = Vec3::from_array(mesh.vertices[tri[2] as usize].position);
            assert!((p1 - p0).cross(p2 - p0).y > 0.0);
        }
    }

    #[test]
    fn test_uv_corners_span_unit_square() {
        let mesh = HeightfieldMesh::from_grid(&grid(3, 3, vec![0.0; 9]));
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(mesh.vertices[2].uv, [1.0, 0.0]);
        assert_eq!(mesh.vertices[6].uv, [0.0, 1.0]);
        assert_eq!(mesh.vertices[8].uv, [1.0, 1.0]);
        assert_eq!(mesh.vertices[4].uv, [0.5, 0.5]);
    }

    #[test]
    fn test_mesh_is_deterministic() {
        let g = grid(4, 3, (0..12).map(|k| k as f32 * 0.7).collect());
        let a = HeightfieldMesh::from_grid(&g);
        let b = HeightfieldMesh::from_grid(&g);

        assert_eq!(a.indices, b.indices);
        for (va, vb) in a.vertices.iter().zip(&b.vertices) {
            assert_eq!(va.position, vb.position);
            assert_eq!(va.normal, vb.normal);
            assert_eq!(va.uv, vb.uv);
        }
    }

    #[test]
    fn test_marker_cone_shape() {
        let marker = MarkerMesh::cone(20.0, 100.0);

        // 3 sides + base, flat-shaded
        assert_eq!(marker.vertices.len(), 12);
        assert_eq!(marker.indices.len(), 12);

        let apex_count = marker
            .vertices
            .iter()
            .filter(|v| v.position[1] == 100.0)
            .count();
        assert_eq!(apex_count, 3);
        assert!(marker.vertices.iter().all(|v| v.position[1] >= 0.0));
    }
}
