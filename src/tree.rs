//! Traversal engine (spec component C7): builds one of the tree variants
//! (C5 binary, C6 wide) from a configuration and dispatches nearest-hit,
//! any-hit, and bounded multi-hit queries to whichever variant was built.
//! A scene author never touches [`crate::bvh::Bvh`] or
//! [`crate::wide::WideBvh`] directly; this is the one entry point.

use crate::bvh::Bvh;
use crate::error::BuildError;
use crate::primitive::{Hit, Primitive};
use crate::ray::Ray;
use crate::sah::SAH_BINS;
use crate::stats::Stats;
use crate::wide::WideBvh;

/// Which acceleration structure [`Tree::build`] produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeVariant {
    /// Binary BVH (C5).
    Binary,
    /// 4-wide QBVH (C6).
    Quad,
    /// 8-wide OBVH (C6).
    Oct,
}

/// Build-time configuration (spec section 7). `sah_bins` is validated but
/// not otherwise threaded through: the binned SAH evaluator (C4) always
/// buckets into [`SAH_BINS`] bins per the spec's fixed bin count, so this
/// field exists to reject obviously-wrong configuration rather than to
/// parameterize the bucket count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildOptions {
    pub max_prims_per_leaf: usize,
    pub max_depth: usize,
    pub variant: TreeVariant,
    pub sah_bins: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_prims_per_leaf: 8,
            max_depth: 16,
            variant: TreeVariant::Binary,
            sah_bins: SAH_BINS,
        }
    }
}

/// The built acceleration structure, holding whichever variant
/// [`BuildOptions::variant`] selected.
pub enum Tree {
    Binary(Bvh),
    Quad(WideBvh<4>),
    Oct(WideBvh<8>),
}

impl Tree {
    /// Builds a tree over `primitives`, reordering them in place to match
    /// leaf-contiguous layout (spec 4.3 / C3). Fails only on malformed
    /// `options`; an empty primitive list or a degenerate split is handled
    /// without failing the build (spec 4.6.5).
    #[tracing::instrument(skip_all, fields(variant = ?options.variant, primitive_count = primitives.len()))]
    pub fn build(primitives: &mut [Primitive], options: &BuildOptions) -> Result<Self, BuildError> {
        if options.sah_bins == 0 {
            return Err(BuildError::ZeroSahBins);
        }
        if options.max_depth == 0 {
            return Err(BuildError::ZeroMaxDepth);
        }

        let tree = match options.variant {
            TreeVariant::Binary => {
                Tree::Binary(Bvh::build(primitives, options.max_prims_per_leaf, options.max_depth))
            }
            TreeVariant::Quad => Tree::Quad(WideBvh::<4>::build(
                primitives,
                options.max_prims_per_leaf,
                options.max_depth,
            )),
            TreeVariant::Oct => Tree::Oct(WideBvh::<8>::build(
                primitives,
                options.max_prims_per_leaf,
                options.max_depth,
            )),
        };

        let stats = tree.build_stats();
        tracing::debug!(
            nodes = stats.nodes_visited(),
            leaves = stats.leaves_visited(),
            max_leaf_size = stats.max_prims_in_leaf(),
            "tree built"
        );

        Ok(tree)
    }

    /// One-time structural statistics gathered during [`Self::build`] —
    /// dispatches to whichever variant was built.
    pub fn build_stats(&self) -> &Stats {
        match self {
            Tree::Binary(bvh) => bvh.build_stats(),
            Tree::Quad(bvh) => bvh.build_stats(),
            Tree::Oct(bvh) => bvh.build_stats(),
        }
    }

    /// Nearest-hit query (spec 4.6.3).
    pub fn query_nearest(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> Option<Hit> {
        match self {
            Tree::Binary(bvh) => bvh.intersect(ray, primitives, stats),
            Tree::Quad(bvh) => bvh.intersect(ray, primitives, stats),
            Tree::Oct(bvh) => bvh.intersect(ray, primitives, stats),
        }
    }

    /// Any-hit query (spec 4.6.3), typically used for shadow rays.
    pub fn query_any(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> bool {
        match self {
            Tree::Binary(bvh) => bvh.intersect_any(ray, primitives, stats),
            Tree::Quad(bvh) => bvh.intersect_any(ray, primitives, stats),
            Tree::Oct(bvh) => bvh.intersect_any(ray, primitives, stats),
        }
    }

    /// Bounded multi-hit query (spec 4.6.4 / section 6): collects up to `k`
    /// hits satisfying `predicate`. Used for effects like subsurface
    /// scattering that need several entry/exit points along one ray rather
    /// than just the nearest.
    pub fn query_k_nearest(
        &self,
        ray: &Ray,
        primitives: &[Primitive],
        k: usize,
        predicate: impl Fn(&Hit) -> bool,
        stats: &Stats,
    ) -> Vec<Hit> {
        match self {
            Tree::Binary(bvh) => bvh.intersect_k(ray, primitives, k, predicate, stats),
            Tree::Quad(bvh) => bvh.intersect_k(ray, primitives, k, &predicate, stats),
            Tree::Oct(bvh) => bvh.intersect_k(ray, primitives, k, &predicate, stats),
        }
    }

    pub fn bounds(&self) -> crate::aabb::Aabb {
        match self {
            Tree::Binary(bvh) => bvh.bounds(),
            Tree::Quad(bvh) => bvh.bounds(),
            Tree::Oct(bvh) => bvh.bounds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{MaterialId, Sphere};
    use glam::{vec3, Vec3};

    fn spheres() -> Vec<Primitive> {
        vec![
            Primitive::Sphere(Sphere::new(vec3(0.0, 0.0, 2.0), 0.5, MaterialId(0))),
            Primitive::Sphere(Sphere::new(vec3(0.0, 0.0, -2.0), 0.5, MaterialId(0))),
        ]
    }

    #[test]
    fn zero_sah_bins_rejected() {
        let mut primitives = spheres();
        let options = BuildOptions { sah_bins: 0, ..BuildOptions::default() };
        assert_eq!(Tree::build(&mut primitives, &options), Err(BuildError::ZeroSahBins));
    }

    #[test]
    fn zero_max_depth_rejected() {
        let mut primitives = spheres();
        let options = BuildOptions { max_depth: 0, ..BuildOptions::default() };
        assert_eq!(Tree::build(&mut primitives, &options), Err(BuildError::ZeroMaxDepth));
    }

    #[test]
    fn all_variants_agree_on_nearest_hit() {
        let ray = Ray::new(Vec3::ZERO, vec3(0.0, 0.0, 1.0), 0.0, f32::INFINITY);
        let stats = Stats::default();

        for variant in [TreeVariant::Binary, TreeVariant::Quad, TreeVariant::Oct] {
            let mut primitives = spheres();
            let options = BuildOptions { variant, ..BuildOptions::default() };
            let tree = Tree::build(&mut primitives, &options).unwrap();
            let hit = tree.query_nearest(&ray, &primitives, &stats).unwrap();
            assert!((hit.t - 1.5).abs() < 1e-4, "variant {variant:?} got t={}", hit.t);
        }
    }
}
