//! Machine topology models for the meshcast router.
//!
//! This crate provides the [`Topology`] trait that abstracts over the
//! machine a route is laid onto, and [`Machine`], the concrete mesh/torus of
//! six-link chips with optional dead chips and dead links.
//!
//! # Usage
//!
//! ```
//! use meshcast_common::{ChipCoord, Direction};
//! use meshcast_machine::{Machine, Topology};
//!
//! let machine = Machine::torus(8, 8).with_dead_link(ChipCoord::new(0, 1), Direction::North);
//! assert!(!machine.is_link_at(ChipCoord::new(0, 1), Direction::North));
//! assert_eq!(machine.vector_length(ChipCoord::new(0, 0), ChipCoord::new(7, 7)), 1);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod machine;
pub mod rings;
pub mod topology;
pub mod vector;

pub use error::MachineError;
pub use machine::Machine;
pub use rings::{concentric_hexagons, hexagon_cell_count};
pub use topology::Topology;
pub use vector::MeshVector;
