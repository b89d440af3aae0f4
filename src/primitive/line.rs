//! Line (tapered-cylinder curve segment) primitive (spec 4.1).

use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};

use crate::aabb::Aabb;
use crate::math::lerp_f32;
use crate::primitive::{Hit, MaterialId};
use crate::ray::Ray;

/// Shared curve data a [`Line`] indexes into, mirroring [`crate::primitive::triangle::TriangleMesh`].
pub struct LineMesh {
    pub material: MaterialId,
    /// Consecutive endpoint pairs: segment `i` spans `endpoints[2*i]..endpoints[2*i+1]`.
    pub endpoints: Box<[Vec3]>,
    /// Per-endpoint half-width (radius), same indexing as `endpoints`.
    pub radii: Box<[f32]>,
}

impl LineMesh {
    pub fn new(endpoints: Vec<Vec3>, radii: Vec<f32>, material: MaterialId) -> Self {
        debug_assert_eq!(endpoints.len(), radii.len());
        debug_assert!(endpoints.len() % 2 == 0);
        Self {
            material,
            endpoints: endpoints.into_boxed_slice(),
            radii: radii.into_boxed_slice(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.endpoints.len() / 2
    }
}

#[derive(Clone)]
pub struct Line {
    mesh: Arc<LineMesh>,
    seg_index: u32,
}

impl Line {
    pub fn new(mesh: Arc<LineMesh>, seg_index: u32) -> Self {
        Self { mesh, seg_index }
    }

    pub fn mesh(&self) -> &LineMesh {
        &self.mesh
    }

    /// World-space endpoints and half-widths, exposed for SIMD leaf-pack
    /// construction (spec 4.6.1).
    pub fn endpoints(&self) -> (Vec3, Vec3, f32, f32) {
        let i = self.seg_index as usize * 2;
        (
            self.mesh.endpoints[i],
            self.mesh.endpoints[i + 1],
            self.mesh.radii[i],
            self.mesh.radii[i + 1],
        )
    }

    pub fn bbox(&self) -> Aabb {
        let (p0, p1, r0, r1) = self.endpoints();
        Aabb::new(p0, p1).expand(r0.max(r1))
    }

    pub fn length(&self) -> f32 {
        let (p0, p1, _, _) = self.endpoints();
        (p1 - p0).length()
    }

    pub fn surface_area(&self) -> f32 {
        let (_, _, r0, r1) = self.endpoints();
        std::f32::consts::PI * (r0 + r1) * self.length()
    }

    /// World-to-local affine used both here and by the SIMD line pack: a
    /// rotation taking `+Y` to the segment axis, plus the translation `-p0`.
    fn local_frame(&self) -> (Quat, Vec3, f32) {
        let (p0, p1, _, _) = self.endpoints();
        let delta = p1 - p0;
        let length = delta.length();
        let axis = if length > 0.0 { delta / length } else { Vec3::Y };
        let rot = Quat::from_rotation_arc(Vec3::Y, axis);
        (rot, p0, length)
    }

    /// Tapered-cylinder test: transform the ray into the frame where the
    /// segment runs along `+Y` from `0` to `length`, solve the quadratic for
    /// the linearly-varying radius, then clip by the segment length.
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let (_, _, r0, r1) = self.endpoints();
        let (rot, origin, length) = self.local_frame();
        if length <= 0.0 {
            return None;
        }
        let inv_rot = rot.inverse();

        let o = inv_rot * (ray.orig - origin);
        let d = inv_rot * ray.dir;

        let k = (r1 - r0) / length;

        let a = d.x * d.x + d.z * d.z - k * k * d.y * d.y;
        let b = o.x * d.x + o.z * d.z - k * d.y * (r0 + k * o.y);
        let c = o.x * o.x + o.z * o.z - (r0 + k * o.y) * (r0 + k * o.y);

        let bound = t_max.min(ray.t_max);

        let mut best: Option<(f32, f32)> = None; // (t, y)
        if a.abs() < 1e-12 {
            if b.abs() > 1e-12 {
                let t = -c / (2.0 * b);
                let y = o.y + t * d.y;
                if t > ray.t_min && t <= bound && (0.0..=length).contains(&y) {
                    best = Some((t, y));
                }
            }
        } else {
            let disc = b * b - a * c;
            if disc < 0.0 {
                return None;
            }
            let sqrt_disc = disc.sqrt();
            for t in [(-b - sqrt_disc) / a, (-b + sqrt_disc) / a] {
                if t <= ray.t_min || t > bound {
                    continue;
                }
                let y = o.y + t * d.y;
                if !(0.0..=length).contains(&y) {
                    continue;
                }
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, y));
                }
            }
        }

        let (t, y) = best?;
        let radius_at_y = lerp_f32(y / length, r0, r1);

        let local_pos = o + d * t;
        let lateral = Vec3::new(local_pos.x, 0.0, local_pos.z);

        let local_normal = if radius_at_y < 1e-6 {
            // Cone tip: fall back to the axial direction (spec 4.1).
            if r1 < r0 { Vec3::Y } else { Vec3::NEG_Y }
        } else {
            Vec3::new(lateral.x, -radius_at_y * k, lateral.z).normalize()
        };

        let world_normal = (rot * local_normal).normalize();
        let world_pos = origin + rot * local_pos;
        let tangent = rot * Vec3::Y;

        Some(Hit {
            t,
            position: world_pos,
            geometric_normal: world_normal,
            shading_normal: world_normal,
            tangent,
            uv: Vec2::new(0.0, y / length),
            primitive_index: u32::MAX,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    /// Scenario S6 from spec section 8.
    #[test]
    fn scenario_s6_cylinder_hit() {
        let mesh = Arc::new(LineMesh::new(
            vec![vec3(0.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
            vec![0.1, 0.1],
            MaterialId(0),
        ));
        let line = Line::new(mesh, 0);
        let ray = Ray::new(vec3(1.0, 0.5, 0.0), vec3(-1.0, 0.0, 0.0), 0.0, f32::INFINITY);
        let hit = line.intersect(&ray, ray.t_max).expect("line hit");
        assert!((hit.t - 0.9).abs() < 1e-4, "t = {}", hit.t);
        assert!((hit.geometric_normal - vec3(1.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn miss_beyond_length() {
        let mesh = Arc::new(LineMesh::new(
            vec![vec3(0.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0)],
            vec![0.1, 0.1],
            MaterialId(0),
        ));
        let line = Line::new(mesh, 0);
        let ray = Ray::new(vec3(1.0, 2.0, 0.0), vec3(-1.0, 0.0, 0.0), 0.0, f32::INFINITY);
        assert!(line.intersect(&ray, ray.t_max).is_none());
    }
}
