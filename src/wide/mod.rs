//! Wide, SIMD-packed bounding volume hierarchy (spec component C6).
//!
//! A quad tree (`N = 4`, QBVH) or oct tree (`N = 8`, OBVH) built by
//! repeatedly collapsing binary SAH splits into `N`-wide nodes, grounded on
//! `qbvh.h`/`qbvh.cpp` in the original renderer.

pub mod build;
pub mod node;
pub mod pack;

pub use build::WideBvh;
pub use node::{WideChild, WideNode};
