//! Planar disk primitive (spec 4.1): intersect the supporting plane, then
//! bound-test by radius.

use glam::{Vec2, Vec3};

use crate::aabb::Aabb;
use crate::primitive::{Hit, MaterialId};
use crate::ray::Ray;

#[derive(Clone)]
pub struct Disk {
    pub center: Vec3,
    pub normal: Vec3,
    pub radius: f32,
    pub inner_radius: f32,
    pub material: MaterialId,
}

impl Disk {
    pub fn new(center: Vec3, normal: Vec3, radius: f32, material: MaterialId) -> Self {
        Self {
            center,
            normal: normal.normalize(),
            radius,
            inner_radius: 0.0,
            material,
        }
    }

    pub fn bbox(&self) -> Aabb {
        Aabb::new(self.center, self.center).expand(self.radius)
    }

    pub fn surface_area(&self) -> f32 {
        std::f32::consts::PI * (self.radius * self.radius - self.inner_radius * self.inner_radius)
    }

    fn tangent_frame(&self) -> (Vec3, Vec3) {
        let candidate = self.normal.cross(Vec3::Y);
        let tangent = if candidate.length_squared() > 1e-12 {
            candidate.normalize()
        } else {
            self.normal.cross(Vec3::X).normalize()
        };
        let bitangent = self.normal.cross(tangent);
        (tangent, bitangent)
    }

    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let denom = self.normal.dot(ray.dir);
        if denom.abs() < 1e-9 {
            return None;
        }

        let t = self.normal.dot(self.center - ray.orig) / denom;
        let bound = t_max.min(ray.t_max);
        if t <= ray.t_min || t > bound {
            return None;
        }

        let p = ray.orig + ray.dir * t;
        let rel = p - self.center;
        let dist2 = rel.length_squared();
        if dist2 > self.radius * self.radius || dist2 < self.inner_radius * self.inner_radius {
            return None;
        }

        let (tangent, bitangent) = self.tangent_frame();
        let u = rel.dot(tangent);
        let v = rel.dot(bitangent);
        let r = dist2.sqrt();
        let theta = v.atan2(u) / (2.0 * std::f32::consts::PI) + 0.5;
        let radial = if self.radius > 0.0 {
            (r - self.inner_radius) / (self.radius - self.inner_radius).max(1e-9)
        } else {
            0.0
        };

        Some(Hit {
            t,
            position: p,
            geometric_normal: self.normal,
            shading_normal: self.normal,
            tangent,
            uv: Vec2::new(theta, radial),
            primitive_index: u32::MAX,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn hit_within_radius() {
        let disk = Disk::new(Vec3::ZERO, Vec3::Z, 1.0, MaterialId(0));
        let ray = Ray::new(vec3(0.2, 0.0, 5.0), vec3(0.0, 0.0, -1.0), 0.0, f32::INFINITY);
        let hit = disk.intersect(&ray, ray.t_max).unwrap();
        assert!((hit.t - 5.0).abs() < 1e-5);
    }

    #[test]
    fn miss_beyond_radius() {
        let disk = Disk::new(Vec3::ZERO, Vec3::Z, 1.0, MaterialId(0));
        let ray = Ray::new(vec3(2.0, 0.0, 5.0), vec3(0.0, 0.0, -1.0), 0.0, f32::INFINITY);
        assert!(disk.intersect(&ray, ray.t_max).is_none());
    }
}
