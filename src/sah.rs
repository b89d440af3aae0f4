//! Binned surface-area-heuristic split evaluator (spec component C4).
//!
//! Shared by the binary BVH (C5) and the wide-tree builder (C6): both bucket
//! primitive centroids into 16 bins along the widest centroid-bound axis,
//! sweep prefix/suffix bounds across the bin boundaries, and pick the
//! boundary with lowest estimated traversal cost. Grounded on
//! `bvh_utils.h::pickBestSplit` in the original renderer and on the bucket
//! sweep in the teacher's own `bvh.rs::build_recursive` (which used 12
//! buckets; this core uses the spec-mandated 16).

use crate::aabb::Aabb;
use crate::build::BuildPrimitive;

pub const SAH_BINS: usize = 16;

#[derive(Clone, Copy)]
struct Bin {
    count: u32,
    bbox: Aabb,
}

impl Bin {
    const EMPTY: Bin = Bin { count: 0, bbox: Aabb::EMPTY };
}

/// Result of evaluating a binned SAH split along one axis.
#[derive(Clone, Copy, Debug)]
pub struct SahSplit {
    pub axis: usize,
    /// Primitives with a bucket index `<= bin` go left of the split.
    pub bin: usize,
    pub cost: f32,
}

/// Which SAH bin a centroid offset in `[0, 1]` along `axis` falls into.
fn bucket_of(centroid_bounds: &Aabb, prim: &BuildPrimitive, axis: usize) -> usize {
    let offset = centroid_bounds.offset_of(prim.centroid)[axis];
    let bucket = (SAH_BINS as f32 * offset) as usize;
    bucket.min(SAH_BINS - 1)
}

/// Evaluates the binned SAH split along a single axis, returning the least
/// costly bin boundary found. `node_area` is the surface area of the node's
/// own bbox, used to normalize the cost estimate (spec 4.4).
pub fn best_split_along_axis(
    primitives: &[BuildPrimitive],
    centroid_bounds: &Aabb,
    axis: usize,
    node_area: f32,
) -> Option<SahSplit> {
    let mut bins = [Bin::EMPTY; SAH_BINS];
    for prim in primitives {
        let b = bucket_of(centroid_bounds, prim, axis);
        bins[b].count += 1;
        bins[b].bbox = bins[b].bbox.union(prim.bbox);
    }

    const SPLITS: usize = SAH_BINS - 1;
    let mut costs = [0f32; SPLITS];

    let mut count_below = 0u32;
    let mut bbox_below = Aabb::EMPTY;
    for i in 0..SPLITS {
        bbox_below = bbox_below.union(bins[i].bbox);
        count_below += bins[i].count;
        costs[i] += count_below as f32 * bbox_below.half_surface_area();
    }

    let mut count_above = 0u32;
    let mut bbox_above = Aabb::EMPTY;
    for i in (1..=SPLITS).rev() {
        bbox_above = bbox_above.union(bins[i].bbox);
        count_above += bins[i].count;
        costs[i - 1] += count_above as f32 * bbox_above.half_surface_area();
    }

    let (bin, &cost) = costs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))?;

    if node_area <= 0.0 {
        return None;
    }
    Some(SahSplit {
        axis,
        bin,
        cost: 0.5 + cost / node_area,
    })
}

/// Evaluates all three axes and returns the globally best split.
pub fn best_split(
    primitives: &[BuildPrimitive],
    centroid_bounds: &Aabb,
    node_area: f32,
) -> Option<SahSplit> {
    (0..3)
        .filter_map(|axis| best_split_along_axis(primitives, centroid_bounds, axis, node_area))
        .min_by(|a, b| a.cost.total_cmp(&b.cost))
}

/// Partitions `primitives` in place so that every primitive belonging to
/// `split`'s left side precedes every primitive on the right, returning the
/// split point (`mid`). Mirrors `Iterator::partition_in_place` in the
/// teacher's builder.
pub fn partition(primitives: &mut [BuildPrimitive], centroid_bounds: &Aabb, split: &SahSplit) -> usize {
    partition_in_place(primitives, |prim| {
        bucket_of(centroid_bounds, prim, split.axis) <= split.bin
    })
}

fn partition_in_place<T>(data: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut left = 0;
    for right in 0..data.len() {
        if pred(&data[right]) {
            data.swap(left, right);
            left += 1;
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    fn prim(centroid: glam::Vec3) -> BuildPrimitive {
        BuildPrimitive {
            primitive_ref: 0,
            bbox: Aabb::new(centroid - 0.1, centroid + 0.1),
            centroid,
        }
    }

    #[test]
    fn splits_two_clusters_between_them() {
        let mut prims = vec![
            prim(vec3(-5.0, 0.0, 0.0)),
            prim(vec3(-4.9, 0.0, 0.0)),
            prim(vec3(5.0, 0.0, 0.0)),
            prim(vec3(4.9, 0.0, 0.0)),
        ];
        let centroid_bounds = prims.iter().fold(Aabb::EMPTY, |b, p| b.union_point(p.centroid));
        let node_bounds = prims.iter().fold(Aabb::EMPTY, |b, p| b.union(p.bbox));
        let split = best_split(&prims, &centroid_bounds, node_bounds.half_surface_area()).unwrap();
        assert_eq!(split.axis, 0);

        let mid = partition(&mut prims, &centroid_bounds, &split);
        assert_eq!(mid, 2);
        assert!(prims[..mid].iter().all(|p| p.centroid.x < 0.0));
        assert!(prims[mid..].iter().all(|p| p.centroid.x > 0.0));
    }
}
