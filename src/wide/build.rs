//! Wide-tree builder (spec component C6).
//!
//! Builds an `N`-ary tree by repeatedly binary-splitting a node's primitive
//! range with the binned SAH evaluator (C4) until either `N` children have
//! accumulated or no more of the pending ranges are worth splitting, then
//! recursing into each child. This is the "queue/done-FIFO collapse"
//! algorithm in `qbvh.cpp::splitNode`, generalized from a fixed `N = 4` to
//! the generic lane width used here (4 or 8).

use std::collections::VecDeque;

use crate::aabb::Aabb;
use crate::build::{build_primitives, reorder_by_indices, BuildPrimitive};
use crate::primitive::{Hit, Line, Primitive, ShapeKind, Triangle};
use crate::ray::Ray;
use crate::sah;
use crate::stats::Stats;
use crate::wide::node::{WideChild, WideNode};
use crate::wide::pack::{LinePack, TrianglePack};

/// A leaf's contents: one or more lane-packed triangle groups (when every
/// primitive in the leaf is a triangle), one or more lane-packed line groups
/// (when every primitive is a line), or a plain contiguous range tested the
/// scalar way (spec 4.6.2 fallback note).
enum LeafContents<const N: usize> {
    Triangles(Vec<TrianglePack<N>>),
    Lines(Vec<LinePack<N>>),
    Mixed { offset: u32, count: u16 },
}

struct WideBuildNode<const N: usize> {
    bbox: Aabb,
    children: Vec<WideBuildNode<N>>,
    leaf_range: Option<(usize, usize)>,
}

impl<const N: usize> WideBuildNode<N> {
    fn leaf(bbox: Aabb, start: usize, end: usize) -> Self {
        Self { bbox, children: Vec::new(), leaf_range: Some((start, end)) }
    }

    fn interior(bbox: Aabb, children: Vec<WideBuildNode<N>>) -> Self {
        Self { bbox, children, leaf_range: None }
    }
}

/// An `N`-ary wide BVH: `N = 4` (QBVH) or `N = 8` (OBVH) per spec 4.6.
pub struct WideBvh<const N: usize> {
    nodes: Vec<WideNode<N>>,
    leaves: Vec<LeafContents<N>>,
    /// Maps a leaf's primitive-range offset to its index in `leaves`.
    leaf_offsets: std::collections::HashMap<u32, usize>,
    max_prims_per_leaf: usize,
    /// One-time structural counters (node/leaf count, max leaf size),
    /// recorded once during [`Self::build`] — see [`Bvh::build_stats`] for
    /// why these aren't accumulated per query.
    ///
    /// [`Bvh::build_stats`]: crate::bvh::Bvh::build_stats
    build_stats: Stats,
}

impl<const N: usize> WideBvh<N> {
    pub fn build(primitives: &mut [Primitive], max_prims_per_leaf: usize, max_depth: usize) -> Self {
        assert!(N >= 2, "wide node width must be at least 2");

        if primitives.is_empty() {
            let mut node = WideNode::empty();
            node.set_lane(0, Aabb::EMPTY, WideChild::Leaf { offset: 0, count: 0 });
            let mut leaf_offsets = std::collections::HashMap::new();
            leaf_offsets.insert(0, 0);
            let nodes = vec![node];
            let leaves = vec![LeafContents::Mixed { offset: 0, count: 0 }];
            let build_stats = Self::compute_build_stats(&nodes, &leaves);
            return Self { nodes, leaves, leaf_offsets, max_prims_per_leaf, build_stats };
        }

        let mut build_prims = build_primitives(primitives);
        let bbox = build_prims.iter().fold(Aabb::EMPTY, |b, p| b.union(p.bbox));

        let root = Self::split_node(&mut build_prims, bbox, 1, max_prims_per_leaf, max_depth);

        let mut ordered: Vec<usize> = Vec::with_capacity(build_prims.len());
        Self::collect_order(&root, &build_prims, &mut ordered);
        drop(build_prims);
        reorder_by_indices(primitives, ordered);

        let mut nodes = Vec::new();
        let mut leaves = Vec::new();
        let mut leaf_offsets = std::collections::HashMap::new();
        Self::flatten(&root, primitives, &mut nodes, &mut leaves, &mut leaf_offsets);

        let build_stats = Self::compute_build_stats(&nodes, &leaves);
        Self { nodes, leaves, leaf_offsets, max_prims_per_leaf, build_stats }
    }

    /// One pass over the flattened wide-node array and leaf table, counting
    /// every wide node and every leaf (with its total primitive count)
    /// exactly once.
    fn compute_build_stats(nodes: &[WideNode<N>], leaves: &[LeafContents<N>]) -> Stats {
        let stats = Stats::default();
        for _ in nodes {
            stats.record_node();
        }
        for leaf in leaves {
            stats.record_leaf();
            stats.record_leaf_size(leaf_size(leaf));
        }
        stats
    }

    /// One-time structural statistics gathered during [`Self::build`] —
    /// distinct from the per-query [`Stats`] a caller passes into
    /// `intersect`/`intersect_any`/`intersect_k`.
    pub fn build_stats(&self) -> &Stats {
        &self.build_stats
    }

    /// Depth-first collects leaf primitive refs in final leaf-contiguous
    /// order, mirroring the binary builder's `ordered_primitives`.
    fn collect_order(node: &WideBuildNode<N>, build_prims: &[BuildPrimitive], out: &mut Vec<usize>) {
        if let Some((start, end)) = node.leaf_range {
            out.extend(build_prims[start..end].iter().map(|p| p.primitive_ref as usize));
        } else {
            for child in &node.children {
                Self::collect_order(child, build_prims, out);
            }
        }
    }

    fn split_node(
        prims: &mut [BuildPrimitive],
        node_bbox: Aabb,
        depth: usize,
        max_prims_per_leaf: usize,
        max_depth: usize,
    ) -> WideBuildNode<N> {
        let len = prims.len();
        if len <= max_prims_per_leaf || depth >= max_depth {
            return WideBuildNode::leaf(node_bbox, 0, len);
        }

        let mut to_split: VecDeque<(usize, usize)> = VecDeque::new();
        let mut done: Vec<(usize, usize)> = Vec::new();
        to_split.push_back((0, len));

        while !to_split.is_empty() && to_split.len() + done.len() < N {
            let (s, e) = to_split.pop_front().unwrap();
            let count = e - s;
            let slice = &mut prims[s..e];
            let centroid_bounds = slice.iter().fold(Aabb::EMPTY, |b, p| b.union_point(p.centroid));
            let sub_bbox = slice.iter().fold(Aabb::EMPTY, |b, p| b.union(p.bbox));

            let split = sah::best_split(slice, &centroid_bounds, sub_bbox.half_surface_area());
            match split {
                Some(sp) if sp.cost < count as f32 => {
                    let mid = sah::partition(slice, &centroid_bounds, &sp);
                    let mid_abs = s + mid;
                    if mid_abs == s || mid_abs == e {
                        done.push((s, e));
                    } else {
                        to_split.push_back((s, mid_abs));
                        to_split.push_back((mid_abs, e));
                    }
                }
                _ => done.push((s, e)),
            }
        }

        let mut ranges: Vec<(usize, usize)> = to_split.into_iter().collect();
        ranges.extend(done);

        if ranges.len() <= 1 {
            return WideBuildNode::leaf(node_bbox, 0, len);
        }

        // Visit ranges in increasing start order so this node's DFS leaf
        // emission order matches their physical layout in `prims` — the
        // builder reorders primitives to match DFS order (`collect_order`),
        // so leaf offsets only stay valid if the two agree.
        ranges.sort_unstable_by_key(|&(s, _)| s);

        let mut children = Vec::with_capacity(ranges.len());
        for (s, e) in ranges {
            let sub_bbox = prims[s..e].iter().fold(Aabb::EMPTY, |b, p| b.union(p.bbox));
            let child = Self::split_node(&mut prims[s..e], sub_bbox, depth + 1, max_prims_per_leaf, max_depth);
            children.push(shift_leaf_range(child, s));
        }

        WideBuildNode::interior(node_bbox, children)
    }

    fn flatten(
        node: &WideBuildNode<N>,
        primitives: &[Primitive],
        nodes: &mut Vec<WideNode<N>>,
        leaves: &mut Vec<LeafContents<N>>,
        leaf_offsets: &mut std::collections::HashMap<u32, usize>,
    ) -> WideChild {
        if let Some((start, end)) = node.leaf_range {
            let offset = start as u32;
            let count = (end - start) as u16;
            let all_triangles = end > start
                && primitives[start..end]
                    .iter()
                    .all(|p| p.shape_kind() == ShapeKind::Triangle);
            let all_lines = end > start
                && primitives[start..end].iter().all(|p| p.shape_kind() == ShapeKind::Line);

            let contents = if all_triangles {
                let triangles: Vec<(u32, &Triangle)> = primitives[start..end]
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let Primitive::Triangle(t) = p else { unreachable!() };
                        ((start + i) as u32, t)
                    })
                    .collect();
                let packs = triangles.chunks(N).map(TrianglePack::build).collect();
                LeafContents::Triangles(packs)
            } else if all_lines {
                let lines: Vec<(u32, &Line)> = primitives[start..end]
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let Primitive::Line(l) = p else { unreachable!() };
                        ((start + i) as u32, l)
                    })
                    .collect();
                let packs = lines.chunks(N).map(LinePack::build).collect();
                LeafContents::Lines(packs)
            } else {
                LeafContents::Mixed { offset, count }
            };

            leaf_offsets.insert(offset, leaves.len());
            leaves.push(contents);
            WideChild::Leaf { offset, count }
        } else {
            let mut wide_node = WideNode::empty();
            // Reserve this node's slot before recursing so children can
            // reference it, matching the binary builder's index reservation.
            let index = nodes.len();
            nodes.push(WideNode::empty());

            for (lane, child) in node.children.iter().enumerate() {
                let child_ref = Self::flatten(child, primitives, nodes, leaves, leaf_offsets);
                wide_node.set_lane(lane, child.bbox, child_ref);
            }
            nodes[index] = wide_node;
            WideChild::Node(index as u32)
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.root_bbox()
    }

    fn root_bbox(&self) -> Aabb {
        let root = &self.nodes[0];
        (0..N)
            .filter(|&i| root.valid[i])
            .fold(Aabb::EMPTY, |b, i| b.union(root.bbox(i)))
    }

    pub fn max_prims_per_leaf(&self) -> usize {
        self.max_prims_per_leaf
    }

    pub fn intersect(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> Option<Hit> {
        stats.record_ray();
        let mut t_max = ray.t_max;
        let mut closest = None;
        if self.nodes.is_empty() {
            return None;
        }
        self.traverse_node(0, ray, &mut t_max, primitives, stats, &mut closest, false);
        closest
    }

    pub fn intersect_any(&self, ray: &Ray, primitives: &[Primitive], stats: &Stats) -> bool {
        stats.record_ray();
        let mut t_max = ray.t_max;
        let mut found = None;
        if self.nodes.is_empty() {
            return false;
        }
        self.traverse_node(0, ray, &mut t_max, primitives, stats, &mut found, true);
        found.is_some()
    }

    /// Shared recursive traversal (spec 4.6.3 / grounded on
    /// `qbvh.cpp::traverseNode`'s nearest-first child ordering): tests all
    /// `N` children's bboxes, then repeatedly pops the nearest untested
    /// valid child, recursing into nodes and scanning leaves.
    fn traverse_node(
        &self,
        node_index: u32,
        ray: &Ray,
        t_max: &mut f32,
        primitives: &[Primitive],
        stats: &Stats,
        best: &mut Option<Hit>,
        any_hit: bool,
    ) -> bool {
        let node = &self.nodes[node_index as usize];

        let mut dist = [f32::INFINITY; N];
        for lane in 0..N {
            if node.valid[lane] {
                if let Some(t) = node.bbox(lane).intersect(ray, *t_max) {
                    dist[lane] = t;
                }
            }
        }

        loop {
            let mut k = None;
            let mut min_dist = f32::INFINITY;
            for lane in 0..N {
                if dist[lane] < min_dist {
                    min_dist = dist[lane];
                    k = Some(lane);
                }
            }
            let Some(lane) = k else { break };
            if dist[lane] > *t_max {
                // Every remaining lane is at least this far; none can beat
                // the current closest hit.
                break;
            }
            dist[lane] = f32::INFINITY;

            match node.children[lane] {
                WideChild::Empty => {}
                WideChild::Node(child_index) => {
                    if self.traverse_node(child_index, ray, t_max, primitives, stats, best, any_hit) && any_hit {
                        return true;
                    }
                }
                WideChild::Leaf { offset, .. } => {
                    if self.test_leaf(offset, ray, t_max, primitives, stats, best, any_hit) && any_hit {
                        return true;
                    }
                }
            }
        }

        best.is_some()
    }

    fn test_leaf(
        &self,
        offset: u32,
        ray: &Ray,
        t_max: &mut f32,
        primitives: &[Primitive],
        stats: &Stats,
        best: &mut Option<Hit>,
        any_hit: bool,
    ) -> bool {
        let contents = self.leaf_for_offset(offset);
        match contents {
            LeafContents::Triangles(packs) => {
                for pack in packs {
                    stats.record_intersection_test();
                    if let Some(hit) = pack.intersect(ray, *t_max) {
                        if any_hit {
                            return true;
                        }
                        *t_max = hit.t;
                        *best = Some(hit);
                    }
                }
            }
            LeafContents::Lines(packs) => {
                for pack in packs {
                    stats.record_intersection_test();
                    if let Some(hit) = pack.intersect(ray, *t_max) {
                        if any_hit {
                            return true;
                        }
                        *t_max = hit.t;
                        *best = Some(hit);
                    }
                }
            }
            LeafContents::Mixed { offset, count } => {
                for i in *offset..*offset + *count as u32 {
                    stats.record_intersection_test();
                    if let Some(mut hit) = primitives[i as usize].intersect(ray, *t_max) {
                        hit.primitive_index = i;
                        if any_hit {
                            return true;
                        }
                        *t_max = hit.t;
                        *best = Some(hit);
                    }
                }
            }
        }
        best.is_some()
    }

    /// Bounded multi-hit query (spec 4.6.4 / section 6), grounded on the
    /// separate `BSSRDFIntersections` overload of `traverseNode` in
    /// `qbvh.cpp`: rather than generalizing [`Self::traverse_node`] with an
    /// extra mode flag, the original duplicates the traversal for this case,
    /// since the bookkeeping (a capped hit list with worst-element eviction
    /// instead of a single running best) is different enough to not share
    /// cleanly. This follows the same duplication.
    pub fn intersect_k(
        &self,
        ray: &Ray,
        primitives: &[Primitive],
        k: usize,
        predicate: &impl Fn(&Hit) -> bool,
        stats: &Stats,
    ) -> Vec<Hit> {
        stats.record_ray();
        if k == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let mut t_max = ray.t_max;
        let mut hits: Vec<Hit> = Vec::with_capacity(k);
        self.traverse_node_k(0, ray, &mut t_max, primitives, stats, k, predicate, &mut hits);
        hits
    }

    fn traverse_node_k(
        &self,
        node_index: u32,
        ray: &Ray,
        t_max: &mut f32,
        primitives: &[Primitive],
        stats: &Stats,
        k: usize,
        predicate: &impl Fn(&Hit) -> bool,
        hits: &mut Vec<Hit>,
    ) {
        let node = &self.nodes[node_index as usize];

        let mut dist = [f32::INFINITY; N];
        for lane in 0..N {
            if node.valid[lane] {
                if let Some(t) = node.bbox(lane).intersect(ray, *t_max) {
                    dist[lane] = t;
                }
            }
        }

        loop {
            let mut lane_k = None;
            let mut min_dist = f32::INFINITY;
            for lane in 0..N {
                if dist[lane] < min_dist {
                    min_dist = dist[lane];
                    lane_k = Some(lane);
                }
            }
            let Some(lane) = lane_k else { break };
            if dist[lane] > *t_max {
                break;
            }
            dist[lane] = f32::INFINITY;

            match node.children[lane] {
                WideChild::Empty => {}
                WideChild::Node(child_index) => {
                    self.traverse_node_k(child_index, ray, t_max, primitives, stats, k, predicate, hits);
                }
                WideChild::Leaf { offset, .. } => {
                    self.test_leaf_k(offset, ray, t_max, primitives, stats, k, predicate, hits);
                }
            }
        }
    }

    fn test_leaf_k(
        &self,
        offset: u32,
        ray: &Ray,
        t_max: &mut f32,
        primitives: &[Primitive],
        stats: &Stats,
        k: usize,
        predicate: &impl Fn(&Hit) -> bool,
        hits: &mut Vec<Hit>,
    ) {
        let mut consider = |mut hit: Hit, index: Option<u32>| {
            if let Some(i) = index {
                hit.primitive_index = i;
            }
            if !predicate(&hit) {
                return;
            }
            if hits.len() < k {
                hits.push(hit);
                if hits.len() == k {
                    *t_max = worst_t(hits);
                }
            } else {
                let worst = worst_index(hits);
                if hit.t < hits[worst].t {
                    hits[worst] = hit;
                    *t_max = worst_t(hits);
                }
            }
        };

        match self.leaf_for_offset(offset) {
            LeafContents::Triangles(packs) => {
                for pack in packs {
                    stats.record_intersection_test();
                    pack.intersect_each(ray, *t_max, |hit| consider(hit, None));
                }
            }
            LeafContents::Lines(packs) => {
                for pack in packs {
                    stats.record_intersection_test();
                    pack.intersect_each(ray, *t_max, |hit| consider(hit, None));
                }
            }
            LeafContents::Mixed { offset, count } => {
                for i in *offset..*offset + *count as u32 {
                    stats.record_intersection_test();
                    if let Some(hit) = primitives[i as usize].intersect(ray, *t_max) {
                        consider(hit, Some(i));
                    }
                }
            }
        }
    }

    fn leaf_for_offset(&self, offset: u32) -> &LeafContents<N> {
        &self.leaves[self.leaf_index_of(offset)]
    }

    fn leaf_index_of(&self, offset: u32) -> usize {
        self.leaf_offsets[&offset]
    }

}

/// Total primitive count backing a leaf, across all of its packs when it's
/// pure triangles or pure lines.
fn leaf_size<const N: usize>(leaf: &LeafContents<N>) -> usize {
    match leaf {
        LeafContents::Triangles(packs) => packs.iter().map(|p| p.len()).sum(),
        LeafContents::Lines(packs) => packs.iter().map(|p| p.len()).sum(),
        LeafContents::Mixed { count, .. } => *count as usize,
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

/// Shifts a subtree's leaf primitive ranges from slice-local coordinates
/// (relative to the parent's split range) to the parent's absolute
/// coordinates within the whole build.
fn shift_leaf_range<const N: usize>(mut node: WideBuildNode<N>, shift: usize) -> WideBuildNode<N> {
    if let Some((s, e)) = node.leaf_range {
        node.leaf_range = Some((s + shift, e + shift));
    } else {
        node.children = node.children.into_iter().map(|c| shift_leaf_range(c, shift)).collect();
    }
    node
}
