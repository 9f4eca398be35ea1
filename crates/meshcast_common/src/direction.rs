//! Link directions of a chip router and the targets a route entry can name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a processor core local to a chip.
pub type CoreId = u8;

/// One of the six inter-chip links of a router.
///
/// The numeric identifiers (0–5) are the link ids used in routing table
/// entries. Each direction has a unit vector in the `(x, y)` grid; the two
/// diagonal links move along the `x == y` axis.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    /// Link 0, vector `(+1, 0)`.
    East,
    /// Link 1, vector `(+1, +1)`.
    NorthEast,
    /// Link 2, vector `(0, +1)`.
    North,
    /// Link 3, vector `(-1, 0)`.
    West,
    /// Link 4, vector `(-1, -1)`.
    SouthWest,
    /// Link 5, vector `(0, -1)`.
    South,
}

impl Direction {
    /// All six directions in link-id order.
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::NorthEast,
        Direction::North,
        Direction::West,
        Direction::SouthWest,
        Direction::South,
    ];

    /// Returns the link id (0–5) of this direction.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Returns the direction with the given link id, if it is in range.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Returns the link on the neighbouring chip that points back here.
    pub fn opposite(self) -> Self {
        Self::ALL[(self.id() as usize + 3) % 6]
    }

    /// Returns the `(dx, dy)` step taken when following this link.
    pub fn vector(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::NorthEast => (1, 1),
            Direction::North => (0, 1),
            Direction::West => (-1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::South => (0, -1),
        }
    }

    /// Returns the direction whose unit vector is `(dx, dy)`.
    pub fn from_vector(dx: i32, dy: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.vector() == (dx, dy))
    }

    /// Returns the short compass name used in reports (e.g. `"NE"`).
    pub fn short_name(self) -> &'static str {
        match self {
            Direction::East => "E",
            Direction::NorthEast => "NE",
            Direction::North => "N",
            Direction::West => "W",
            Direction::SouthWest => "SW",
            Direction::South => "S",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Where a packet is sent when it leaves a routing tree node along one edge.
///
/// A tree edge carrying `None` instead of a `Route` leaves the decision to
/// the endpoint it terminates at.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Route {
    /// Forward out of the chip over an inter-chip link.
    Link(Direction),
    /// Deliver to a processor core on this chip.
    Core(CoreId),
}

impl Route {
    /// Returns the link direction if this route leaves the chip.
    pub fn link(self) -> Option<Direction> {
        match self {
            Route::Link(d) => Some(d),
            Route::Core(_) => None,
        }
    }

    /// Returns the core id if this route delivers locally.
    pub fn core(self) -> Option<CoreId> {
        match self {
            Route::Link(_) => None,
            Route::Core(c) => Some(c),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Link(d) => write!(f, "link {d}"),
            Route::Core(c) => write!(f, "core {c}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_declaration_order() {
        for (i, d) in Direction::ALL.iter().enumerate() {
            assert_eq!(d.id() as usize, i);
            assert_eq!(Direction::from_id(i as u8), Some(*d));
        }
        assert_eq!(Direction::from_id(6), None);
    }

    #[test]
    fn opposite_is_involution() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            let (dx, dy) = d.vector();
            assert_eq!(d.opposite().vector(), (-dx, -dy));
        }
        assert_eq!(Direction::East.opposite(), Direction::West);
        assert_eq!(Direction::NorthEast.opposite(), Direction::SouthWest);
    }

    #[test]
    fn vector_lookup() {
        assert_eq!(Direction::from_vector(1, 1), Some(Direction::NorthEast));
        assert_eq!(Direction::from_vector(0, -1), Some(Direction::South));
        assert_eq!(Direction::from_vector(1, -1), None);
    }

    #[test]
    fn route_accessors() {
        assert_eq!(Route::Link(Direction::North).link(), Some(Direction::North));
        assert_eq!(Route::Link(Direction::North).core(), None);
        assert_eq!(Route::Core(3).core(), Some(3));
        assert_eq!(format!("{}", Route::Core(3)), "core 3");
        assert_eq!(format!("{}", Route::Link(Direction::SouthWest)), "link SW");
    }
}
