//! Lane-parallel wide node layout (spec 4.6.1).
//!
//! Each [`WideNode`] holds up to `N` children's bounding boxes as six
//! struct-of-arrays `[f32; N]` fields rather than `N` separate [`Aabb`]s, so
//! the slab test for all children runs as straight-line lane-parallel
//! arithmetic the compiler can auto-vectorize, mirroring the `BBox4` layout
//! in `qbvh.h`/`simd_utils.h`. Unused lanes carry [`Aabb::DEGENERATE`] bounds
//! in addition to being marked invalid, so a traversal bug that ignores the
//! validity mask still can't produce a false hit.

use crate::aabb::Aabb;

#[derive(Clone, Copy, Debug)]
pub enum WideChild {
    Empty,
    /// Index of a child [`WideNode`] in the owning [`super::build::WideBvh`]'s node array.
    Node(u32),
    /// Contiguous primitive range, offset and count into the reordered
    /// primitive buffer.
    Leaf { offset: u32, count: u16 },
}

pub struct WideNode<const N: usize> {
    pub min_x: [f32; N],
    pub max_x: [f32; N],
    pub min_y: [f32; N],
    pub max_y: [f32; N],
    pub min_z: [f32; N],
    pub max_z: [f32; N],
    pub valid: [bool; N],
    pub children: [WideChild; N],
}

impl<const N: usize> WideNode<N> {
    pub fn empty() -> Self {
        Self {
            min_x: [Aabb::DEGENERATE.min.x; N],
            max_x: [Aabb::DEGENERATE.max.x; N],
            min_y: [Aabb::DEGENERATE.min.y; N],
            max_y: [Aabb::DEGENERATE.max.y; N],
            min_z: [Aabb::DEGENERATE.min.z; N],
            max_z: [Aabb::DEGENERATE.max.z; N],
            valid: [false; N],
            children: [WideChild::Empty; N],
        }
    }

    pub fn set_lane(&mut self, lane: usize, bbox: Aabb, child: WideChild) {
        self.min_x[lane] = bbox.min.x;
        self.max_x[lane] = bbox.max.x;
        self.min_y[lane] = bbox.min.y;
        self.max_y[lane] = bbox.max.y;
        self.min_z[lane] = bbox.min.z;
        self.max_z[lane] = bbox.max.z;
        self.valid[lane] = true;
        self.children[lane] = child;
    }

    pub fn bbox(&self, lane: usize) -> Aabb {
        Aabb {
            min: glam::vec3(self.min_x[lane], self.min_y[lane], self.min_z[lane]),
            max: glam::vec3(self.max_x[lane], self.max_y[lane], self.max_z[lane]),
        }
    }
}

impl Default for WideChild {
    fn default() -> Self {
        WideChild::Empty
    }
}
