//! Planar quad primitive (spec 4.1): intersect the supporting plane, then
//! bound-test in the quad's local parameterization.

use glam::{Vec2, Vec3};

use crate::aabb::Aabb;
use crate::primitive::{Hit, MaterialId};
use crate::ray::Ray;

#[derive(Clone)]
pub struct Quad {
    pub center: Vec3,
    /// Full edge vector spanning the quad along local `u`.
    pub u: Vec3,
    /// Full edge vector spanning the quad along local `v`.
    pub v: Vec3,
    pub material: MaterialId,
}

impl Quad {
    pub fn new(center: Vec3, u: Vec3, v: Vec3, material: MaterialId) -> Self {
        Self { center, u, v, material }
    }

    fn normal(&self) -> Vec3 {
        self.u.cross(self.v).normalize()
    }

    pub fn bbox(&self) -> Aabb {
        let hu = self.u * 0.5;
        let hv = self.v * 0.5;
        let corners = [
            self.center + hu + hv,
            self.center + hu - hv,
            self.center - hu + hv,
            self.center - hu - hv,
        ];
        corners
            .into_iter()
            .fold(Aabb::EMPTY, |b, c| b.union_point(c))
    }

    pub fn surface_area(&self) -> f32 {
        self.u.cross(self.v).length()
    }

    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let normal = self.normal();
        let denom = normal.dot(ray.dir);
        if denom.abs() < 1e-9 {
            return None;
        }

        let t = normal.dot(self.center - ray.orig) / denom;
        let bound = t_max.min(ray.t_max);
        if t <= ray.t_min || t > bound {
            return None;
        }

        let p = ray.orig + ray.dir * t;
        let rel = p - self.center;

        let u_len2 = self.u.length_squared();
        let v_len2 = self.v.length_squared();
        let a = rel.dot(self.u) / u_len2;
        let b = rel.dot(self.v) / v_len2;

        if !(-0.5..=0.5).contains(&a) || !(-0.5..=0.5).contains(&b) {
            return None;
        }

        let tangent = self.u.normalize();

        Some(Hit {
            t,
            position: p,
            geometric_normal: normal,
            shading_normal: normal,
            tangent,
            uv: Vec2::new(a + 0.5, b + 0.5),
            primitive_index: u32::MAX,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn perpendicular_hit_at_center() {
        let quad = Quad::new(
            vec3(0.0, 0.0, 0.0),
            vec3(2.0, 0.0, 0.0),
            vec3(0.0, 2.0, 0.0),
            MaterialId(0),
        );
        let ray = Ray::new(vec3(0.0, 0.0, 5.0), vec3(0.0, 0.0, -1.0), 0.0, f32::INFINITY);
        let hit = quad.intersect(&ray, ray.t_max).unwrap();
        assert!((hit.t - 5.0).abs() < 1e-5);
        assert!((hit.uv - Vec2::new(0.5, 0.5)).length() < 1e-5);
    }

    #[test]
    fn miss_outside_extent() {
        let quad = Quad::new(
            vec3(0.0, 0.0, 0.0),
            vec3(2.0, 0.0, 0.0),
            vec3(0.0, 2.0, 0.0),
            MaterialId(0),
        );
        let ray = Ray::new(vec3(5.0, 5.0, 5.0), vec3(0.0, 0.0, -1.0), 0.0, f32::INFINITY);
        assert!(quad.intersect(&ray, ray.t_max).is_none());
    }
}
