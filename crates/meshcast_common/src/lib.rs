//! Shared foundational types used across the meshcast router.
//!
//! This crate provides chip coordinates, the six link directions of a chip
//! router, per-edge route targets (link or local core), content hashing for
//! table fingerprints, and the common internal-error result type.

#![warn(missing_docs)]

pub mod coord;
pub mod direction;
pub mod hash;
pub mod result;

pub use coord::ChipCoord;
pub use direction::{CoreId, Direction, Route};
pub use hash::ContentHash;
pub use result::{InternalError, MeshResult};
