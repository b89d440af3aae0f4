//! Triangle primitive: the watertight ray/triangle test (spec 4.1).

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::aabb::Aabb;
use crate::math::barycentric_interp;
use crate::primitive::{Hit, MaterialId};
use crate::ray::Ray;

/// Shared, world-space-baked mesh data. Multiple [`Triangle`]s reference the
/// same mesh through an `Arc`; this is the "back-reference to the owning
/// mesh for shading lookup" spec 4.1 calls for. No instancing: a mesh is
/// already in world space (spec non-goals).
pub struct TriangleMesh {
    pub material: MaterialId,
    pub reverse_normals: bool,

    pub indices: Box<[u32]>,
    pub positions: Box<[Vec3]>,
    pub normals: Option<Box<[Vec3]>>,
    pub uvs: Option<Box<[Vec2]>>,
    pub tangents: Option<Box<[Vec3]>>,
}

impl TriangleMesh {
    pub fn new(
        indices: Vec<u32>,
        positions: Vec<Vec3>,
        normals: Option<Vec<Vec3>>,
        uvs: Option<Vec<Vec2>>,
        tangents: Option<Vec<Vec3>>,
        material: MaterialId,
        reverse_normals: bool,
    ) -> Self {
        debug_assert!(indices.len() % 3 == 0);
        Self {
            material,
            reverse_normals,
            indices: indices.into_boxed_slice(),
            positions: positions.into_boxed_slice(),
            normals: normals.map(Vec::into_boxed_slice),
            uvs: uvs.map(Vec::into_boxed_slice),
            tangents: tangents.map(Vec::into_boxed_slice),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[derive(Clone)]
pub struct Triangle {
    mesh: Arc<TriangleMesh>,
    tri_index: u32,
}

impl Triangle {
    pub fn new(mesh: Arc<TriangleMesh>, tri_index: u32) -> Self {
        Self { mesh, tri_index }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn indices(&self) -> (usize, usize, usize) {
        let base = self.tri_index as usize * 3;
        (
            self.mesh.indices[base] as usize,
            self.mesh.indices[base + 1] as usize,
            self.mesh.indices[base + 2] as usize,
        )
    }

    /// Raw world-space vertex positions, exposed for SIMD leaf-pack
    /// construction (spec 4.6.2).
    pub fn positions(&self) -> (Vec3, Vec3, Vec3) {
        let (i0, i1, i2) = self.indices();
        (
            self.mesh.positions[i0],
            self.mesh.positions[i1],
            self.mesh.positions[i2],
        )
    }

    pub fn bbox(&self) -> Aabb {
        let (p0, p1, p2) = self.positions();
        Aabb::new(p0, p1).union_point(p2)
    }

    pub fn surface_area(&self) -> f32 {
        let (p0, p1, p2) = self.positions();
        (p1 - p0).cross(p2 - p0).length() * 0.5
    }

    /// Watertight ray/triangle test (Woop, Benthin, Wald 2013; spec 4.1):
    /// translate to ray-origin space, permute so the ray's major axis is
    /// `Y` in the permuted frame... here `Z` plays that role and the shear
    /// places the direction at `(0, 0, 1)` in permuted-sheared space — the
    /// edge functions are then computed in the sheared `XY` plane. Both
    /// winding orders are accepted (triangles are double-sided).
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let (p0, p1, p2) = self.positions();

        let p0t = translate_permute(p0, ray);
        let p1t = translate_permute(p1, ray);
        let p2t = translate_permute(p2, ray);

        let p0t = shear_xy(p0t, ray);
        let p1t = shear_xy(p1t, ray);
        let p2t = shear_xy(p2t, ray);

        let e0 = p1t.x * p2t.y - p1t.y * p2t.x;
        let e1 = p2t.x * p0t.y - p2t.y * p0t.x;
        let e2 = p0t.x * p1t.y - p0t.y * p1t.x;

        // Mixed signs: the ray passes outside the triangle in the sheared plane.
        if (e0 < 0.0 || e1 < 0.0 || e2 < 0.0) && (e0 > 0.0 || e1 > 0.0 || e2 > 0.0) {
            return None;
        }

        let det = e0 + e1 + e2;
        // Degenerate triangle: all edge functions sum to zero (spec 4.6.5).
        if det == 0.0 {
            return None;
        }

        let p0tz = p0t.z * ray.shear.z;
        let p1tz = p1t.z * ray.shear.z;
        let p2tz = p2t.z * ray.shear.z;
        let t_scaled = e0 * p0tz + e1 * p1tz + e2 * p2tz;

        let bound = t_max.min(ray.t_max);
        if det < 0.0 && (t_scaled >= 0.0 || t_scaled < bound * det) {
            return None;
        } else if det > 0.0 && (t_scaled <= 0.0 || t_scaled > bound * det) {
            return None;
        }

        let inv_det = 1.0 / det;
        let b0 = e0 * inv_det;
        let b1 = e1 * inv_det;
        let b2 = e2 * inv_det;
        let t = t_scaled * inv_det;

        if t <= ray.t_min {
            return None;
        }

        let bar = [b0, b1, b2];
        let (i0, i1, i2) = self.indices();
        let position = barycentric_interp(&bar, &p0, &p1, &p2);

        let geometric_normal = {
            let n = (p1 - p0).cross(p2 - p0).normalize();
            if self.mesh.reverse_normals {
                -n
            } else {
                n
            }
        };

        let shading_normal = if let Some(normals) = &self.mesh.normals {
            let n = barycentric_interp(&bar, &normals[i0], &normals[i1], &normals[i2]).normalize();
            if self.mesh.reverse_normals {
                -n
            } else {
                n
            }
        } else {
            geometric_normal
        };

        let uv = if let Some(uvs) = &self.mesh.uvs {
            barycentric_interp(&bar, &uvs[i0], &uvs[i1], &uvs[i2])
        } else {
            Vec2::new(b1, b2)
        };

        let tangent = if let Some(tangents) = &self.mesh.tangents {
            barycentric_interp(&bar, &tangents[i0], &tangents[i1], &tangents[i2]).normalize()
        } else {
            triangle_tangent(p0, p1, p2, geometric_normal)
        };

        Some(Hit {
            t,
            position,
            geometric_normal,
            shading_normal,
            tangent,
            uv,
            primitive_index: u32::MAX,
        })
    }
}

fn translate_permute(p: Vec3, ray: &Ray) -> Vec3 {
    let t = p - ray.orig;
    Vec3::new(t[ray.kx], t[ray.ky], t[ray.kz])
}

fn shear_xy(mut p: Vec3, ray: &Ray) -> Vec3 {
    p.x += ray.shear.x * p.z;
    p.y += ray.shear.y * p.z;
    p
}

/// Arbitrary but consistent tangent perpendicular to the geometric normal,
/// used when the mesh has no explicit tangent or UV data.
fn triangle_tangent(p0: Vec3, p1: Vec3, _p2: Vec3, normal: Vec3) -> Vec3 {
    let edge = (p1 - p0).normalize_or_zero();
    let t = edge - normal * normal.dot(edge);
    if t.length_squared() > 1e-12 {
        t.normalize()
    } else {
        let fallback = normal.cross(Vec3::Y);
        if fallback.length_squared() > 1e-12 {
            fallback.normalize()
        } else {
            Vec3::X
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn single_triangle() -> Triangle {
        let mesh = Arc::new(TriangleMesh::new(
            vec![0, 1, 2],
            vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
            None,
            None,
            None,
            MaterialId(0),
            false,
        ));
        Triangle::new(mesh, 0)
    }

    /// Scenario S1 from spec section 8.
    #[test]
    fn scenario_s1_hit_with_expected_barycentrics() {
        let tri = single_triangle();
        let ray = Ray::new(vec3(0.25, 0.25, 1.0), vec3(0.0, 0.0, -1.0), 0.0, 10.0);
        let hit = tri.intersect(&ray, ray.t_max).expect("triangle hit");
        assert!((hit.t - 1.0).abs() < 1e-5);
        assert!((hit.uv.x - 0.25).abs() < 1e-5);
        assert!((hit.uv.y - 0.25).abs() < 1e-5);
    }

    #[test]
    fn backface_hit_accepted() {
        let tri = single_triangle();
        let ray = Ray::new(vec3(0.25, 0.25, -1.0), vec3(0.0, 0.0, 1.0), 0.0, 10.0);
        assert!(tri.intersect(&ray, ray.t_max).is_some());
    }

    #[test]
    fn miss_outside_triangle() {
        let tri = single_triangle();
        let ray = Ray::new(vec3(5.0, 5.0, 1.0), vec3(0.0, 0.0, -1.0), 0.0, 10.0);
        assert!(tri.intersect(&ray, ray.t_max).is_none());
    }

    #[test]
    fn degenerate_triangle_is_skipped() {
        let mesh = Arc::new(TriangleMesh::new(
            vec![0, 1, 2],
            vec![vec3(0.0, 0.0, 0.0), vec3(1.0, 0.0, 0.0), vec3(2.0, 0.0, 0.0)],
            None,
            None,
            None,
            MaterialId(0),
            false,
        ));
        let tri = Triangle::new(mesh, 0);
        let ray = Ray::new(vec3(0.5, 1.0, 0.0), vec3(0.0, -1.0, 0.0), 0.0, 10.0);
        assert!(tri.intersect(&ray, ray.t_max).is_none());
    }
}
