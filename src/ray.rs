//! Ray representation and preparation (spec component C2).
//!
//! A [`Ray`] is prepared once before traversal: reciprocal direction,
//! zero-component nudging, the per-axis sign used by the binary BVH's
//! negative-axis traversal optimization, and the permuted-axis/shear terms
//! the watertight triangle test needs (Woop, Benthin, Wald 2013).

use glam::Vec3;

use crate::math::nudge_zero;

#[derive(Clone, Debug, PartialEq)]
pub struct Ray {
    pub orig: Vec3,
    pub dir: Vec3,
    pub t_min: f32,
    pub t_max: f32,
    /// Shadow rays short-circuit on the first non-transparent hit (spec 4.6.4).
    pub is_shadow: bool,

    pub inv_dir: Vec3,
    /// `dir_is_neg[axis]`: whether the ray travels in the negative direction
    /// along `axis`, used to pick the near/far child of an AABB slab.
    pub dir_is_neg: [bool; 3],

    /// Permutation placing the ray's dominant direction component last, and
    /// the shear terms that make the sheared direction exactly `(0, 1, 0)`
    /// in permuted space. See [`crate::primitive::triangle`].
    pub kz: usize,
    pub kx: usize,
    pub ky: usize,
    pub shear: Vec3,
}

impl Ray {
    pub fn new(orig: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Self {
        Self::new_with_shadow(orig, dir, t_min, t_max, false)
    }

    pub fn new_with_shadow(orig: Vec3, dir: Vec3, t_min: f32, t_max: f32, is_shadow: bool) -> Self {
        debug_assert!(!orig.is_nan() && !dir.is_nan(), "InvalidRay: NaN origin or direction");

        let dir = Vec3::new(nudge_zero(dir.x), nudge_zero(dir.y), nudge_zero(dir.z));
        let inv_dir = Vec3::ONE / dir;
        let dir_is_neg = [dir.x < 0.0, dir.y < 0.0, dir.z < 0.0];

        let kz = Self::major_axis(dir);
        let kx = (kz + 1) % 3;
        let ky = (kx + 1) % 3;
        let (kx, ky) = if dir[kz] < 0.0 { (ky, kx) } else { (kx, ky) };

        let shear = Vec3::new(-dir[kx] / dir[kz], -dir[ky] / dir[kz], 1.0 / dir[kz]);

        Self {
            orig,
            dir,
            t_min,
            t_max,
            is_shadow,
            inv_dir,
            dir_is_neg,
            kz,
            kx,
            ky,
            shear,
        }
    }

    fn major_axis(dir: Vec3) -> usize {
        let ad = dir.abs();
        if ad.x > ad.y && ad.x > ad.z {
            0
        } else if ad.y > ad.z {
            1
        } else {
            2
        }
    }

    /// Shrinks the far bound of the search, as a closer hit is recorded.
    pub fn with_t_max(&self, t_max: f32) -> Self {
        let mut r = self.clone();
        r.t_max = t_max;
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_axis_picks_dominant_component() {
        assert_eq!(Ray::major_axis(Vec3::new(5.0, 1.0, 1.0)), 0);
        assert_eq!(Ray::major_axis(Vec3::new(1.0, 5.0, 1.0)), 1);
        assert_eq!(Ray::major_axis(Vec3::new(1.0, 1.0, 5.0)), 2);
    }

    #[test]
    fn prepare_nudges_zero_components() {
        let r = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), 0.0, f32::INFINITY);
        assert!(r.dir.x != 0.0);
        assert!(r.dir.y != 0.0);
        assert!(r.inv_dir.x.is_finite());
        assert!(r.inv_dir.y.is_finite());
    }
}
