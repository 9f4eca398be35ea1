//! Errors raised while routing a net.
//!
//! Every variant aborts the net or source being processed. None of them is
//! turned into a partial result.

use crate::ids::{EntityId, PartitionId};
use meshcast_common::ChipCoord;
use meshcast_diagnostics::{Category, DiagnosticCode};

/// Errors that can occur while building, repairing, or flattening a route.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// No live path exists between two chips that must be connected.
    #[error("no live path from {from} to {to}")]
    DisconnectedRegion {
        /// Where the search started.
        from: ChipCoord,
        /// The chip the search was trying to reach.
        to: ChipCoord,
    },

    /// The source of a net sits on a dead chip.
    #[error("cannot root a route at dead chip {chip}")]
    InvalidRootChip {
        /// The dead source chip.
        chip: ChipCoord,
    },

    /// Two routes need different outgoing sets for the same table entry.
    #[error("conflicting routes for partition {partition} at {chip}")]
    MultiSourceConflict {
        /// The chip holding the entry.
        chip: ChipCoord,
        /// The partition of the entry.
        partition: PartitionId,
    },

    /// A repair or graft would add a second path to a chip already in the tree.
    #[error("route would revisit {chip}")]
    CycleDetected {
        /// The chip that would be visited twice.
        chip: ChipCoord,
    },

    /// A shortest-path retrace found no predecessor consistent with the
    /// recorded costs.
    #[error("cost retrace towards {origin} failed at {chip}")]
    InconsistentCostRetrace {
        /// The chip the retrace got stuck on.
        chip: ChipCoord,
        /// The source chip the costs were computed from.
        origin: ChipCoord,
    },

    /// An application partition names an entity that does not exist.
    #[error("unknown entity {entity}")]
    UnknownEntity {
        /// The missing entity.
        entity: EntityId,
    },

    /// An entity that must send or be grafted has no core endpoint.
    #[error("entity {entity} has no physical endpoint")]
    NoPhysicalEndpoint {
        /// The entity lacking a physical endpoint.
        entity: EntityId,
    },

    /// An endpoint lies outside the machine.
    #[error("endpoint chip {chip} is outside the machine")]
    OffMachine {
        /// The offending coordinate.
        chip: ChipCoord,
    },

    /// Routing was cancelled before this net was started.
    #[error("routing cancelled")]
    Cancelled,

    /// Link weight coefficients that would break cheapest-first ordering.
    #[error("invalid link weights: {reason}")]
    InvalidWeights {
        /// Which coefficient is out of range.
        reason: &'static str,
    },
}

impl RouteError {
    /// Returns the diagnostic code reported for this error.
    pub fn code(&self) -> DiagnosticCode {
        let number = match self {
            RouteError::DisconnectedRegion { .. } => 301,
            RouteError::InvalidRootChip { .. } => 302,
            RouteError::MultiSourceConflict { .. } => 303,
            RouteError::CycleDetected { .. } => 304,
            RouteError::InconsistentCostRetrace { .. } => 305,
            RouteError::UnknownEntity { .. } => 306,
            RouteError::NoPhysicalEndpoint { .. } => 307,
            RouteError::OffMachine { .. } => 308,
            RouteError::Cancelled => 309,
            RouteError::InvalidWeights { .. } => 310,
        };
        DiagnosticCode::new(Category::Error, number)
    }

    /// Returns the chip the error is about, if there is one.
    pub fn chip(&self) -> Option<ChipCoord> {
        match *self {
            RouteError::DisconnectedRegion { from, .. } => Some(from),
            RouteError::InvalidRootChip { chip }
            | RouteError::MultiSourceConflict { chip, .. }
            | RouteError::CycleDetected { chip }
            | RouteError::InconsistentCostRetrace { chip, .. }
            | RouteError::OffMachine { chip } => Some(chip),
            RouteError::UnknownEntity { .. }
            | RouteError::NoPhysicalEndpoint { .. }
            | RouteError::Cancelled
            | RouteError::InvalidWeights { .. } => None,
        }
    }
}
