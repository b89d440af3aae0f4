//! Spatial acceleration core for an offline ray tracer.
//!
//! Builds a binary BVH or a wide SIMD-packed QBVH/OBVH over a scene's
//! geometric primitives (triangles, quads, disks, lines, spheres) and
//! answers nearest-hit, any-hit, and bounded multi-hit ray queries against
//! it. Scene parsing, shading, and image output are out of scope; see
//! `DESIGN.md` for the reasoning behind what was and wasn't carried over.

pub mod aabb;
pub mod build;
pub mod bvh;
pub mod error;
pub mod math;
pub mod primitive;
pub mod ray;
pub mod sah;
pub mod stats;
pub mod tree;
pub mod wide;

pub use aabb::Aabb;
pub use build::{build_primitives, BuildPrimitive};
pub use bvh::Bvh;
pub use error::BuildError;
pub use primitive::{Hit, MaterialId, Primitive};
pub use ray::Ray;
pub use stats::Stats;
pub use tree::{BuildOptions, Tree, TreeVariant};
pub use wide::WideBvh;
