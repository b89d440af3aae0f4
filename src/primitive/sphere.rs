//! Sphere primitive (spec 4.1): the standard quadratic solution.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::aabb::Aabb;
use crate::math::sqr;
use crate::primitive::{Hit, MaterialId};
use crate::ray::Ray;

#[derive(Clone)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub material: MaterialId,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32, material: MaterialId) -> Self {
        Self { center, radius, material }
    }

    pub fn bbox(&self) -> Aabb {
        Aabb::new(self.center - self.radius, self.center + self.radius)
    }

    pub fn surface_area(&self) -> f32 {
        4.0 * PI * sqr(self.radius)
    }

    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let oc = ray.orig - self.center;
        // PBRT always solves this in f64 for precision near the sphere's surface.
        let a = ray.dir.as_dvec3().length_squared();
        let half_b = ray.dir.as_dvec3().dot(oc.as_dvec3());
        let c = oc.as_dvec3().length_squared() - sqr(self.radius as f64);

        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let t0 = (-half_b - sqrt_d) / a;
        let t1 = (-half_b + sqrt_d) / a;

        let bound = t_max.min(ray.t_max) as f64;
        let t = if t0 > ray.t_min as f64 && t0 <= bound {
            t0
        } else if t1 > ray.t_min as f64 && t1 <= bound {
            t1
        } else {
            return None;
        } as f32;

        let position = ray.orig + ray.dir * t;
        let normal = (position - self.center).normalize();

        let phi = normal.z.atan2(normal.x);
        let theta = (normal.y / self.radius).clamp(-1.0, 1.0).acos();
        let u = 0.5 + phi / (2.0 * PI);
        let v = theta / PI;
        let tangent = Vec3::new(-normal.z, 0.0, normal.x).normalize_or_zero();
        let tangent = if tangent.length_squared() > 1e-12 {
            tangent
        } else {
            Vec3::X
        };

        Some(Hit {
            t,
            position,
            geometric_normal: normal,
            shading_normal: normal,
            tangent,
            uv: Vec2::new(u, v),
            primitive_index: u32::MAX,
        })
    }
}
