//! Binary BVH build and traversal (spec component C5).
//!
//! The build is PBRTv4-style top-down recursion over a [`BuildPrimitive`]
//! slice, reusing the binned SAH evaluator (C4) for interior splits. The
//! result is flattened into a single array of 32-byte [`LinearBvhNode`]s so
//! traversal never chases pointers.

use crate::aabb::Aabb;
use crate::build::{build_primitives, reorder_by_indices, BuildPrimitive};
use crate::primitive::{Hit, Primitive};
use crate::ray::Ray;
use crate::sah;
use crate::stats::Stats;

/// Primitive count at or below which the build stops trying to split and
/// always emits a leaf, regardless of SAH cost (spec 4.3: equal-counts
/// fallback for tiny primitive counts).
const EQUAL_COUNT_THRESHOLD: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum SplitAxis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl SplitAxis {
    fn from_index(i: usize) -> Self {
        match i {
            0 => SplitAxis::X,
            1 => SplitAxis::Y,
            _ => SplitAxis::Z,
        }
    }
}

/// 32-byte alignment keeps a node from straddling two cache lines.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(32))]
struct LinearBvhNode {
    bbox: Aabb,
    primitive_offset_or_second_child_offset: u32,
    primitive_count: u16,
    split_axis: SplitAxis,
}

impl LinearBvhNode {
    fn new_leaf(bbox: Aabb, primitive_offset: u32, primitive_count: u16) -> Self {
        Self {
            bbox,
            primitive_offset_or_second_child_offset: primitive_offset,
            primitive_count,
            split_axis: SplitAxis::X,
        }
    }

    fn new_interior(bbox: Aabb, second_child_offset: u32, axis: SplitAxis) -> Self {
        Self {
            bbox,
            primitive_offset_or_second_child_offset: second_child_offset,
            primitive_count: 0,
            split_axis: axis,
        }
    }

    fn is_leaf(&self) -> bool {
        self.primitive_count > 0
    }
}

struct BuildNode {
    bbox: Aabb,
    split_axis: SplitAxis,
    first_prim_offset: usize,
    primitive_count: usize,
    child_l: Option<Box<BuildNode>>,
    child_r: Option<Box<BuildNode>>,
}

impl BuildNode {
    fn new_leaf(bbox: Aabb, first_prim_offset: usize, primitive_count: usize) -> Self {
        Self {
            bbox,
            split_axis: SplitAxis::X,
            first_prim_offset,
            primitive_count,
            child_l: None,
            child_r: None,
        }
    }

    fn new_interior(split_axis: SplitAxis, child_l: BuildNode, child_r: BuildNode) -> Self {
        Self {
            bbox: child_l.bbox.union(child_r.bbox),
            split_axis,
            first_prim_offset: 0,
            primitive_count: 0,
            child_l: Some(Box::new(child_l)),
            child_r: Some(Box::new(child_r)),
        }
    }
}

/// Binary bounding volume hierarchy over a fixed set of primitives.
///
/// Immutable once built: no refitting, no incremental insertion (spec
/// non-goals). Safe to share across threads — traversal only reads.
#[derive(Debug)]
pub struct Bvh {
    nodes: Vec<LinearBvhNode>,
    max_prims_per_leaf: usize,
    /// One-time structural counters (node/leaf count, max leaf size),
    /// recorded once during [`Self::build`] rather than accumulated per
    /// query — grounded on the `SORT_STATS_COUNTER` macros in
    /// `qbvh.cpp::Build`, which increment at build time, not per traversal.
    build_stats: Stats,
}

impl Bvh {
    /// Builds a tree over `primitives`, reordering them in place into
    /// leaf-contiguous order. `max_prims_per_leaf` and `max_depth` bound leaf
    /// size and recursion depth respectively (spec 4.3).
    pub fn build(primitives: &mut [Primitive], max_prims_per_leaf: usize, max_depth: usize) -> Self {
        if primitives.is_empty() {
            let nodes = vec![LinearBvhNode::new_leaf(Aabb::EMPTY, 0, 0)];
            let build_stats = Self::compute_build_stats(&nodes);
            return Self { nodes, max_prims_per_leaf, build_stats };
        }

        let mut build_prims = build_primitives(primitives);
        let mut ordered: Vec<usize> = Vec::with_capacity(build_prims.len());
        let mut total_nodes = 0usize;

        let root = Self::build_recursive(
            &mut build_prims,
            &mut ordered,
            &mut total_nodes,
            max_prims_per_leaf,
            max_depth,
            0,
        );
        drop(build_prims);

        reorder_by_indices(primitives, ordered);

        let mut nodes = Vec::with_capacity(total_nodes);
        Self::flatten(&root, &mut nodes);

        let build_stats = Self::compute_build_stats(&nodes);
        Self { nodes, max_prims_per_leaf, build_stats }
    }

    /// One pass over the flattened node array, counting every node and every
    /// leaf (with its primitive count) exactly once.
    fn compute_build_stats(nodes: &[LinearBvhNode]) -> Stats {
        let stats = Stats::default();
        for node in nodes {
            stats.record_node();
            if node.is_leaf() {
                stats.record_leaf();
                stats.record_leaf_size(node.primitive_count as usize);
            }
        }
        stats
    }

    /// One-time structural statistics gathered during [`Self::build`] (node
    /// count, leaf count, largest leaf) — distinct from the per-query
    /// [`Stats`] a caller passes into `intersect`/`intersect_any`/
    /// `intersect_k`.
    pub fn build_stats(&self) -> &Stats {
        &self.build_stats
    }

    fn flatten(node: &BuildNode, flat: &mut Vec<LinearBvhNode>) -> u32 {
        if node.primitive_count > 0 {
            flat.push(LinearBvhNode::new_leaf(
                node.bbox,
                node.first_prim_offset as u32,
                node.primitive_count as u16,
            ));
            1
        } else {
            let index = flat.len();
            flat.push(LinearBvhNode::new_interior(node.bbox, 0, node.split_axis));

            let left_count = Self::flatten(node.child_l.as_ref().unwrap(), flat);
            flat[index].primitive_offset_or_second_child_offset = index as u32 + left_count + 1;
            let right_count = Self::flatten(node.child_r.as_ref().unwrap(), flat);

            left_count + right_count + 1
        }
    }

    fn build_recursive(
        build_prims: &mut [BuildPrimitive],
        ordered: &mut Vec<usize>,
        total_nodes: &mut usize,
        max_prims_per_leaf: usize,
        max_depth: usize,
        depth: usize,
    ) -> BuildNode {
        *total_nodes += 1;
        let bbox = build_prims.iter().fold(Aabb::EMPTY, |b, p| b.union(p.bbox));

        let make_leaf = |build_prims: &[BuildPrimitive], ordered: &mut Vec<usize>| {
            let first = ordered.len();
            ordered.extend(build_prims.iter().map(|p| p.primitive_ref as usize));
            BuildNode::new_leaf(bbox, first, build_prims.len())
        };

        // Too deep or degenerate bbox: stop splitting regardless of count
        // (spec 4.6.5 TooDeep / DegenerateSplit).
        if depth >= max_depth || bbox.half_surface_area() == 0.0 || build_prims.len() == 1 {
            return make_leaf(build_prims, ordered);
        }

        let centroid_bounds = build_prims.iter().fold(Aabb::EMPTY, |b, p| b.union_point(p.centroid));
        if centroid_bounds.diagonal() == glam::Vec3::ZERO {
            return make_leaf(build_prims, ordered);
        }
        let split_axis = centroid_bounds.max_extent_axis();

        let mid = if build_prims.len() <= EQUAL_COUNT_THRESHOLD {
            let mid = build_prims.len() / 2;
            build_prims.select_nth_unstable_by(mid, |a, b| {
                a.centroid[split_axis.index()]
                    .partial_cmp(&b.centroid[split_axis.index()])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            mid
        } else {
            let split = sah::best_split(build_prims, &centroid_bounds, bbox.half_surface_area());
            match split {
                Some(split)
                    if build_prims.len() > max_prims_per_leaf || split.cost < build_prims.len() as f32 =>
                {
                    sah::partition(build_prims, &centroid_bounds, &split)
                }
                _ => return make_leaf(build_prims, ordered),
            }
        };

        if mid == 0 || mid == build_prims.len() {
            return make_leaf(build_prims, ordered);
        }

        let axis = SplitAxis::from_index(split_axis.index());
        let (left, right) = build_prims.split_at_mut(mid);
        let child_l = Self::build_recursive(left, ordered, total_nodes, max_prims_per_leaf, max_depth, depth + 1);
        let child_r = Self::build_recursive(right, ordered, total_nodes, max_prims_per_leaf, max_depth, depth + 1);

        BuildNode::new_interior(axis, child_l, child_r)
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes[0].bbox
    }

    pub fn max_prims_per_leaf(&self) -> usize {
        self.max_prims_per_leaf
    }

    /// Nearest-hit query (spec 4.6.3): returns the closest hit with
    /// `t <= ray.t_max`, or `None`.
    pub fn intersect(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> Option<Hit> {
        stats.record_ray();
        let mut t_max = ray.t_max;
        let mut closest = None;
        let mut max_depth_seen = 0usize;

        self.walk(ray, &mut t_max, |node, depth, t_max| {
            max_depth_seen = max_depth_seen.max(depth);
            let offset = node.primitive_offset_or_second_child_offset;
            for i in offset..offset + node.primitive_count as u32 {
                stats.record_intersection_test();
                let prim = &primitives[i as usize];
                if let Some(mut hit) = prim.intersect(ray, *t_max) {
                    hit.primitive_index = i;
                    *t_max = hit.t;
                    closest = Some(hit);
                }
            }
        });

        stats.record_max_depth(max_depth_seen);
        closest
    }

    /// Any-hit query (spec 4.6.3): true as soon as a single blocking
    /// primitive is found, short-circuiting the rest of the tree.
    pub fn intersect_any(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> bool {
        stats.record_ray();
        let mut t_max = ray.t_max;
        let mut found = false;
        let mut max_depth_seen = 0usize;

        self.walk(ray, &mut t_max, |node, depth, t_max| {
            if found {
                return;
            }
            max_depth_seen = max_depth_seen.max(depth);
            let offset = node.primitive_offset_or_second_child_offset;
            for i in offset..offset + node.primitive_count as u32 {
                stats.record_intersection_test();
                let prim = &primitives[i as usize];
                if prim.intersect(ray, *t_max).is_some() {
                    found = true;
                    break;
                }
            }
        });

        stats.record_max_depth(max_depth_seen);
        found
    }

    /// Bounded multi-hit query (spec 4.6.4 / section 6): collects up to `k`
    /// hits satisfying `predicate`, nearest first. Grounded on the
    /// `BSSRDFIntersections` overload of `traverseNode` in `qbvh.cpp`, which
    /// keeps a capped intersection list and shrinks the traversal bound to
    /// the worst entry once the list is full, rather than returning on the
    /// first or single closest hit.
    pub fn intersect_k(
        &self,
        ray: &Ray,
        primitives: &[Primitive],
        k: usize,
        predicate: impl Fn(&Hit) -> bool,
        stats: &Stats,
    ) -> Vec<Hit> {
        stats.record_ray();
        if k == 0 {
            return Vec::new();
        }

        let mut t_max = ray.t_max;
        let mut hits: Vec<Hit> = Vec::with_capacity(k);
        let mut max_depth_seen = 0usize;

        self.walk(ray, &mut t_max, |node, depth, t_max| {
            max_depth_seen = max_depth_seen.max(depth);
            let offset = node.primitive_offset_or_second_child_offset;
            for i in offset..offset + node.primitive_count as u32 {
                stats.record_intersection_test();
                let prim = &primitives[i as usize];
                let Some(mut hit) = prim.intersect(ray, *t_max) else { continue };
                if !predicate(&hit) {
                    continue;
                }
                hit.primitive_index = i;

                if hits.len() < k {
                    hits.push(hit);
                    if hits.len() == k {
                        *t_max = worst_t(&hits);
                    }
                } else {
                    let worst_idx = worst_index(&hits);
                    if hit.t < hits[worst_idx].t {
                        hits[worst_idx] = hit;
                        *t_max = worst_t(&hits);
                    }
                }
            }
        });

        stats.record_max_depth(max_depth_seen);
        hits
    }

    /// Shared traversal core: walks nodes in near-to-far order using the
    /// negative-axis push optimization (PBRT), invoking `visit_leaf` at
    /// every leaf reached while `bbox.intersect` still succeeds against the
    /// current `t_max`.
    fn walk(
        &self,
        ray: &Ray,
        t_max: &mut f32,
        mut visit_leaf: impl FnMut(&LinearBvhNode, usize, &mut f32),
    ) {
        let mut stack = [(0usize, 0usize); 64];
        let mut stack_len = 0usize;
        let mut current = 0usize;
        let mut depth = 0usize;

        loop {
            let node = &self.nodes[current];
            if node.bbox.intersect(ray, *t_max).is_some() {
                if node.is_leaf() {
                    visit_leaf(node, depth, t_max);
                    if stack_len == 0 {
                        break;
                    }
                    stack_len -= 1;
                    (current, depth) = stack[stack_len];
                } else {
                    let is_neg = ray.dir_is_neg[node.split_axis as usize];
                    let second = node.primitive_offset_or_second_child_offset as usize;
                    if is_neg {
                        stack[stack_len] = (current + 1, depth + 1);
                        stack_len += 1;
                        current = second;
                    } else {
                        stack[stack_len] = (second, depth + 1);
                        stack_len += 1;
                        current += 1;
                    }
                    depth += 1;
                }
            } else {
                if stack_len == 0 {
                    break;
                }
                stack_len -= 1;
                (current, depth) = stack[stack_len];
            }
        }
    }
}

/// Index of the farthest hit in a non-empty bounded-hit buffer.
fn worst_index(hits: &[Hit]) -> usize {
    hits.iter()
        .enumerate()
        .map(|(i, h)| (i, h.t))
        .fold((0, f32::MIN), |acc, x| if x.1 > acc.1 { x } else { acc })
        .0
}

/// Distance of the farthest hit in a non-empty bounded-hit buffer.
fn worst_t(hits: &[Hit]) -> f32 {
    hits[worst_index(hits)].t
}
