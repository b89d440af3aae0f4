//! Geometric primitives and the ray/primitive intersection contract
//! (spec component C1).
//!
//! Primitives are a tagged variant of five concrete shapes rather than a
//! trait object: triangles dominate a typical scene, and matching on the tag
//! lets the wide-BVH leaf packer (C6) group same-shape primitives into SIMD
//! packs without going through a vtable.

pub mod disk;
pub mod line;
pub mod quad;
pub mod sphere;
pub mod triangle;

use glam::{Vec2, Vec3};

use crate::aabb::Aabb;
use crate::ray::Ray;

pub use disk::Disk;
pub use line::Line;
pub use quad::Quad;
pub use sphere::Sphere;
pub use triangle::{Triangle, TriangleMesh};

/// Opaque per-primitive material identifier. The core never interprets it —
/// it is read only by the bounded multi-hit predicate (spec 4.6.4 / 6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Triangle,
    Line,
    Quad,
    Disk,
    Sphere,
}

/// Hit record returned to integrators (spec 4.1 / section 6).
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub t: f32,
    pub position: Vec3,
    pub geometric_normal: Vec3,
    pub shading_normal: Vec3,
    pub tangent: Vec3,
    pub uv: Vec2,
    /// Index into the scene's primitive array this hit belongs to. Filled in
    /// by the traversal engine, not by the primitive itself.
    pub primitive_index: u32,
}

/// A single geometric primitive. Owns its own world-space data — there is no
/// instancing and no motion blur (spec non-goals), so every primitive is
/// already baked to world space.
pub enum Primitive {
    Triangle(Triangle),
    Line(Line),
    Quad(Quad),
    Disk(Disk),
    Sphere(Sphere),
}

impl Primitive {
    /// Tests `ray` against this primitive in world space. `t_max` bounds the
    /// search in addition to `ray.t_max`; on a closer hit, returns the
    /// updated hit record. Must not report hits outside
    /// `(ray.t_min, min(ray.t_max, t_max)]`.
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        match self {
            Primitive::Triangle(t) => t.intersect(ray, t_max),
            Primitive::Line(l) => l.intersect(ray, t_max),
            Primitive::Quad(q) => q.intersect(ray, t_max),
            Primitive::Disk(d) => d.intersect(ray, t_max),
            Primitive::Sphere(s) => s.intersect(ray, t_max),
        }
    }

    /// Conservative ray/AABB test: false positives allowed, false negatives
    /// forbidden. Implemented as an overlap test between the primitive's own
    /// bounding box and `aabb` — always conservative since the primitive's
    /// geometry is contained within its bbox.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let a = self.bbox();
        a.min.x <= aabb.max.x
            && a.max.x >= aabb.min.x
            && a.min.y <= aabb.max.y
            && a.max.y >= aabb.min.y
            && a.min.z <= aabb.max.z
            && a.max.z >= aabb.min.z
    }

    pub fn bbox(&self) -> Aabb {
        match self {
            Primitive::Triangle(t) => t.bbox(),
            Primitive::Line(l) => l.bbox(),
            Primitive::Quad(q) => q.bbox(),
            Primitive::Disk(d) => d.bbox(),
            Primitive::Sphere(s) => s.bbox(),
        }
    }

    pub fn surface_area(&self) -> f32 {
        match self {
            Primitive::Triangle(t) => t.surface_area(),
            Primitive::Line(l) => l.surface_area(),
            Primitive::Quad(q) => q.surface_area(),
            Primitive::Disk(d) => d.surface_area(),
            Primitive::Sphere(s) => s.surface_area(),
        }
    }

    pub fn shape_kind(&self) -> ShapeKind {
        match self {
            Primitive::Triangle(_) => ShapeKind::Triangle,
            Primitive::Line(_) => ShapeKind::Line,
            Primitive::Quad(_) => ShapeKind::Quad,
            Primitive::Disk(_) => ShapeKind::Disk,
            Primitive::Sphere(_) => ShapeKind::Sphere,
        }
    }
}
