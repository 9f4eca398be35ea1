//! Endpoints and nets: the traffic a router is asked to carry.

use crate::ids::PartitionId;
use meshcast_common::{ChipCoord, CoreId, Direction, Route};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where multicast traffic starts or ends.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Endpoint {
    /// A processor core on a chip.
    Physical {
        /// The chip hosting the core.
        chip: ChipCoord,
        /// The core on that chip.
        core: CoreId,
    },
    /// An external device attached to one link of a chip.
    Virtual {
        /// The chip the device is wired to.
        chip: ChipCoord,
        /// The link of that chip the device hangs off.
        link: Direction,
    },
}

impl Endpoint {
    /// Creates a physical endpoint.
    pub fn physical(chip: ChipCoord, core: CoreId) -> Self {
        Endpoint::Physical { chip, core }
    }

    /// Creates a virtual endpoint.
    pub fn virtual_device(chip: ChipCoord, link: Direction) -> Self {
        Endpoint::Virtual { chip, link }
    }

    /// Returns the chip that hosts or connects to this endpoint.
    pub fn chip(&self) -> ChipCoord {
        match *self {
            Endpoint::Physical { chip, .. } | Endpoint::Virtual { chip, .. } => chip,
        }
    }

    /// Returns the table target that delivers traffic to this endpoint from
    /// its chip.
    pub fn route(&self) -> Route {
        match *self {
            Endpoint::Physical { core, .. } => Route::Core(core),
            Endpoint::Virtual { link, .. } => Route::Link(link),
        }
    }

    /// Returns `true` for a core endpoint.
    pub fn is_physical(&self) -> bool {
        matches!(self, Endpoint::Physical { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Physical { chip, core } => write!(f, "core {core} of {chip}"),
            Endpoint::Virtual { chip, link } => write!(f, "device on link {link} of {chip}"),
        }
    }
}

/// One multicast group: a single source fanning out to its sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    /// The table key the net's entries are stored under.
    pub partition: PartitionId,
    /// The sending endpoint.
    pub source: Endpoint,
    /// The receiving endpoints, without duplicates, in insertion order.
    pub sinks: Vec<Endpoint>,
}

impl Net {
    /// Creates a net, dropping repeated sinks while keeping first-seen order.
    pub fn new(
        partition: PartitionId,
        source: Endpoint,
        sinks: impl IntoIterator<Item = Endpoint>,
    ) -> Self {
        let mut unique = Vec::new();
        for sink in sinks {
            if !unique.contains(&sink) {
                unique.push(sink);
            }
        }
        Self {
            partition,
            source,
            sinks: unique,
        }
    }

    /// Returns the chips of the sinks, without duplicates, in sink order.
    pub fn sink_chips(&self) -> Vec<ChipCoord> {
        let mut chips = Vec::new();
        for sink in &self.sinks {
            let chip = sink.chip();
            if !chips.contains(&chip) {
                chips.push(chip);
            }
        }
        chips
    }
}
