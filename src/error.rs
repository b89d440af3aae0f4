//! Build-time error type (spec section 7).
//!
//! Malformed scene data never reaches this core (spec non-goals), so the
//! only failures possible are misconfigured [`crate::tree::BuildOptions`].
//! Everything else — an empty primitive list, a primitive too deep to
//! split, a degenerate split — is handled without failing the build (spec
//! 4.6.5), matching how the teacher's own builder treats those cases as
//! ordinary leaf-creation paths rather than errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    #[error("sah_bins must be at least 1")]
    ZeroSahBins,
    #[error("max_depth must be at least 1")]
    ZeroMaxDepth,
}
