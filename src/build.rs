//! Build-time primitive buffer (spec component C3).
//!
//! [`Bvh::build`](crate::bvh::Bvh::build) and the wide-tree builder both
//! operate on a [`BuildPrimitive`] slice rather than on [`Primitive`]
//! directly: the bbox and centroid are computed once up front so the
//! recursive split search never re-derives them.

use glam::Vec3;

use crate::aabb::Aabb;
use crate::primitive::Primitive;

#[derive(Clone, Copy, Debug)]
pub struct BuildPrimitive {
    /// Index into the original primitive slice passed to `build`.
    pub primitive_ref: u32,
    pub bbox: Aabb,
    pub centroid: Vec3,
}

impl BuildPrimitive {
    fn new(primitive_ref: u32, bbox: Aabb) -> Self {
        Self {
            primitive_ref,
            bbox,
            centroid: bbox.centroid(),
        }
    }
}

/// Computes bbox and centroid for every primitive in one pass.
pub fn build_primitives(primitives: &[Primitive]) -> Vec<BuildPrimitive> {
    primitives
        .iter()
        .enumerate()
        .map(|(i, prim)| BuildPrimitive::new(i as u32, prim.bbox()))
        .collect()
}

/// Permutes `primitives` in place to match `order` (a list of original
/// indices, one per output slot) without allocating a second buffer. Used
/// after a tree build to physically reorder primitives into leaf-contiguous
/// layout, matching the build's `ordered_primitives` index list.
pub fn reorder_by_indices<T>(data: &mut [T], mut order: Vec<usize>) {
    for idx in 0..data.len() {
        if order[idx] != idx {
            let mut current_idx = idx;
            loop {
                let target_idx = order[current_idx];
                order[current_idx] = current_idx;
                if order[target_idx] == target_idx {
                    break;
                }
                data.swap(current_idx, target_idx);
                current_idx = target_idx;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::{MaterialId, Primitive, Sphere};
    use glam::vec3;

    #[test]
    fn centroid_matches_bbox_midpoint() {
        let prims = vec![Primitive::Sphere(Sphere::new(vec3(1.0, 2.0, 3.0), 1.0, MaterialId(0)))];
        let built = build_primitives(&prims);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].centroid, vec3(1.0, 2.0, 3.0));
        assert_eq!(built[0].primitive_ref, 0);
    }

    #[test]
    fn reorder_permutes_in_place() {
        let mut data = vec!["a", "b", "c", "d"];
        reorder_by_indices(&mut data, vec![2, 0, 3, 1]);
        assert_eq!(data, vec!["c", "a", "d", "b"]);
    }
}
