//! Errors raised while building a machine model.

use meshcast_common::ChipCoord;

/// Errors that can occur when building a [`Machine`](crate::Machine) from a
/// description.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    /// The machine has no chips.
    #[error("machine dimensions {width}x{height} contain no chips")]
    Empty {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A dead chip or link refers to a chip outside the machine.
    #[error("chip {chip} is outside the machine")]
    OffMachine {
        /// The offending coordinate.
        chip: ChipCoord,
    },

    /// A dead link names a link id that does not exist.
    #[error("chip {chip} has no link {link}")]
    InvalidLink {
        /// The chip the link leaves from.
        chip: ChipCoord,
        /// The link id given.
        link: u8,
    },
}
