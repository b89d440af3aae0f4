//! Axis-aligned bounding boxes and the slab test (spec component C2).

use std::ops::Index;

use glam::Vec3;

use crate::ray::Ray;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Min/max point pair. A freshly constructed box is the empty set: `union(EMPTY, x) == x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    /// A degenerate box far outside the scene, used to fill unused SIMD lanes
    /// in a partially-populated wide node (spec 4.6.1).
    pub const DEGENERATE: Aabb = Aabb {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MAX),
    };

    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: Vec3::min(a, b),
            max: Vec3::max(a, b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn union_point(self, p: Vec3) -> Self {
        Self {
            min: Vec3::min(self.min, p),
            max: Vec3::max(self.max, p),
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        Self {
            min: Vec3::min(self.min, other.min),
            max: Vec3::max(self.max, other.max),
        }
    }

    pub fn expand(self, radius: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(radius),
            max: self.max + Vec3::splat(radius),
        }
    }

    pub fn fits_within(&self, other: Aabb) -> bool {
        self.min.cmpge(other.min).all() && self.max.cmple(other.max).all()
    }

    pub fn diagonal(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn delta(&self, axis: Axis) -> f32 {
        self.max[axis.index()] - self.min[axis.index()]
    }

    /// Surface area / 2. SAH only ever compares ratios of this quantity so
    /// the constant factor of 2 is dropped, per spec 4.4.
    pub fn half_surface_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.diagonal();
        d.x * d.y + d.y * d.z + d.z * d.x
    }

    pub fn surface_area(&self) -> f32 {
        2.0 * self.half_surface_area()
    }

    pub fn centroid(&self) -> Vec3 {
        0.5 * (self.min + self.max)
    }

    pub fn max_extent_axis(&self) -> Axis {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z {
            Axis::X
        } else if d.y > d.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// Fractional position of `p` within this box along each axis, used to
    /// bucket a centroid into one of the SAH bins.
    pub fn offset_of(&self, p: Vec3) -> Vec3 {
        let mut off = p - self.min;
        if self.max.x > self.min.x {
            off.x /= self.max.x - self.min.x;
        }
        if self.max.y > self.min.y {
            off.y /= self.max.y - self.min.y;
        }
        if self.max.z > self.min.z {
            off.z /= self.max.z - self.min.z;
        }
        off
    }

    /// Slab test (spec 4.2 / PBRT "An Efficient and Robust Ray-Box
    /// Intersection Algorithm"). `ray` must already be prepared (reciprocal
    /// direction computed, zero components nudged). Returns `Some(t_enter)`
    /// with `t_enter` possibly negative (origin inside the box) when the ray
    /// intersects `[ray.t_min, t_max]`, `None` otherwise.
    pub fn intersect(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let inv_dir = ray.inv_dir;
        let neg = ray.dir_is_neg;

        let mut t_min = (self[neg[0]].x - ray.orig.x) * inv_dir.x;
        let mut tmax_ = (self[!neg[0]].x - ray.orig.x) * inv_dir.x;
        let ty_min = (self[neg[1]].y - ray.orig.y) * inv_dir.y;
        let ty_max = (self[!neg[1]].y - ray.orig.y) * inv_dir.y;

        if t_min > ty_max || ty_min > tmax_ {
            return None;
        }
        if ty_min > t_min {
            t_min = ty_min;
        }
        if ty_max < tmax_ {
            tmax_ = ty_max;
        }

        let tz_min = (self[neg[2]].z - ray.orig.z) * inv_dir.z;
        let tz_max = (self[!neg[2]].z - ray.orig.z) * inv_dir.z;

        if t_min > tz_max || tz_min > tmax_ {
            return None;
        }
        if tz_min > t_min {
            t_min = tz_min;
        }
        if tz_max < tmax_ {
            tmax_ = tz_max;
        }

        if t_min <= t_max.min(tmax_) && tmax_ >= ray.t_min {
            Some(t_min)
        } else {
            None
        }
    }
}

impl Index<bool> for Aabb {
    type Output = Vec3;

    fn index(&self, index: bool) -> &Self::Output {
        match index {
            true => &self.max,
            false => &self.min,
        }
    }
}
