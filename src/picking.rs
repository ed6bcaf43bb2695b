//! Pointer picking against the terrain mesh.

use glam::{Mat4, Vec2, Vec3};

use crate::terrain::Vertex;

/// A world-space ray.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Ray from the camera through a window pixel.
    ///
    /// The cursor is in physical pixels with the origin at the top
    /// left; depth 0 and 1 in NDC are unprojected through the inverse
    /// view-projection to recover the near and far points. `None` for
    /// a degenerate matrix or an empty viewport.
    pub fn from_cursor(cursor: Vec2, viewport: Vec2, view_proj: Mat4) -> Option<Self> {
        if viewport.x <= 0.0 || viewport.y <= 0.0 {
            return None;
        }
        let ndc_x = 2.0 * cursor.x / viewport.x - 1.0;
        let ndc_y = 1.0 - 2.0 * cursor.y / viewport.y;

        let inverse = view_proj.inverse();
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));

        let direction = (far - near).normalize_or_zero();
        if !direction.is_finite() || direction == Vec3::ZERO {
            return None;
        }
        Some(Self {
            origin: near,
            direction,
        })
    }

    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A ray/mesh intersection.
#[derive(Debug, Clone, Copy)]
pub struct MeshHit {
    pub point: Vec3,
    /// Unit geometric normal of the hit triangle, by winding.
    pub normal: Vec3,
    pub t: f32,
}

/// Nearest intersection of `ray` with an indexed triangle list,
/// Möller-Trumbore per triangle. Triangles are treated as two-sided.
pub fn intersect_mesh(ray: &Ray, vertices: &[Vertex], indices: &[u32]) -> Option<MeshHit> {
    const EPSILON: f32 = 1e-7;

    let mut best: Option<MeshHit> = None;
    for tri in indices.chunks_exact(3) {
        let v0 = Vec3::from_array(vertices[tri[0] as usize].position);
        let v1 = Vec3::from_array(vertices[tri[1] as usize].position);
        let v2 = Vec3::from_array(vertices[tri[2] as usize].position);

        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);
        if a.abs() < EPSILON {
            continue; // Ray is parallel to triangle
        }

        let f = 1.0 / a;
        let s = ray.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            continue;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            continue;
        }

        let t = f * edge2.dot(q);
        if t <= 1e-4 {
            continue; // Behind or on the origin
        }
        if best.map_or(true, |hit| t < hit.t) {
            best = Some(MeshHit {
                point: ray.point_at(t),
                normal: edge1.cross(edge2).normalize_or_zero(),
                t,
            });
        }
    }
    best
}
