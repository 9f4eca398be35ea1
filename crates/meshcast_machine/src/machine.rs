//! The concrete mesh/torus machine model.

use crate::error::MachineError;
use crate::topology::Topology;
use meshcast_common::{ChipCoord, Direction};
use meshcast_config::MachineConfig;
use std::collections::HashSet;

/// A rectangular grid of six-link chips, optionally wrapped into a torus.
///
/// Every grid position holds a chip unless it has been marked dead; every
/// link between two live chips works unless it has been marked dead.
/// Killing a link disables it in both directions.
#[derive(Debug, Clone)]
pub struct Machine {
    width: u32,
    height: u32,
    wrap_around: bool,
    dead_chips: HashSet<ChipCoord>,
    dead_links: HashSet<(ChipCoord, Direction)>,
    router_entries: u32,
    link_bandwidth: f64,
}

impl Machine {
    fn new(width: u32, height: u32, wrap_around: bool) -> Self {
        Self {
            width,
            height,
            wrap_around,
            dead_chips: HashSet::new(),
            dead_links: HashSet::new(),
            router_entries: 1024,
            link_bandwidth: 250.0,
        }
    }

    /// Creates a fully working `width` x `height` mesh (no wraparound).
    pub fn mesh(width: u32, height: u32) -> Self {
        Self::new(width, height, false)
    }

    /// Creates a fully working `width` x `height` torus.
    pub fn torus(width: u32, height: u32) -> Self {
        Self::new(width, height, true)
    }

    /// Builds a machine from its configuration section.
    pub fn from_config(config: &MachineConfig) -> Result<Self, MachineError> {
        if config.width == 0 || config.height == 0 {
            return Err(MachineError::Empty {
                width: config.width,
                height: config.height,
            });
        }
        let mut machine = Self::new(config.width, config.height, config.wrap_around);
        machine.router_entries = config.router_entries;
        machine.link_bandwidth = config.link_bandwidth;

        for &chip in &config.down_chips {
            if !machine.contains(chip) {
                return Err(MachineError::OffMachine { chip });
            }
            machine.kill_chip(chip);
        }
        for link in &config.down_links {
            if !machine.contains(link.chip) {
                return Err(MachineError::OffMachine { chip: link.chip });
            }
            let direction = Direction::from_id(link.link).ok_or(MachineError::InvalidLink {
                chip: link.chip,
                link: link.link,
            })?;
            machine.kill_link(link.chip, direction);
        }
        Ok(machine)
    }

    /// Marks `chip` as dead.
    pub fn kill_chip(&mut self, chip: ChipCoord) {
        self.dead_chips.insert(chip);
    }

    /// Marks the link leaving `chip` in `direction`, and its reverse, as dead.
    pub fn kill_link(&mut self, chip: ChipCoord, direction: Direction) {
        self.dead_links.insert((chip, direction));
        if let Some(neighbour) = self.xy_over_link(chip, direction) {
            self.dead_links.insert((neighbour, direction.opposite()));
        }
    }

    /// Returns this machine with `chip` marked dead.
    pub fn with_dead_chip(mut self, chip: ChipCoord) -> Self {
        self.kill_chip(chip);
        self
    }

    /// Returns this machine with the link from `chip` in `direction` marked dead.
    pub fn with_dead_link(mut self, chip: ChipCoord, direction: Direction) -> Self {
        self.kill_link(chip, direction);
        self
    }

    /// Returns this machine with every chip given a table capacity of `entries`.
    pub fn with_router_entries(mut self, entries: u32) -> Self {
        self.router_entries = entries;
        self
    }

    /// Returns the number of dead chips.
    pub fn dead_chip_count(&self) -> usize {
        self.dead_chips.len()
    }

    /// Returns the number of dead links, counting each direction separately.
    pub fn dead_link_count(&self) -> usize {
        self.dead_links.len()
    }
}

impl Topology for Machine {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn wrap_around(&self) -> bool {
        self.wrap_around
    }

    fn is_chip_at(&self, chip: ChipCoord) -> bool {
        self.contains(chip) && !self.dead_chips.contains(&chip)
    }

    fn is_link_at(&self, chip: ChipCoord, direction: Direction) -> bool {
        if !self.is_chip_at(chip) || self.dead_links.contains(&(chip, direction)) {
            return false;
        }
        match self.xy_over_link(chip, direction) {
            Some(neighbour) => neighbour != chip && self.is_chip_at(neighbour),
            None => false,
        }
    }

    fn router_entries(&self, _chip: ChipCoord) -> u32 {
        self.router_entries
    }

    fn link_bandwidth(&self, _chip: ChipCoord, _direction: Direction) -> f64 {
        self.link_bandwidth
    }
}
