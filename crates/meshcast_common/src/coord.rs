//! Chip coordinates within the machine grid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `(x, y)` position of a chip in the machine grid.
///
/// Coordinates are compared and hashed by value. The derived ordering is
/// column-major (`x` first, then `y`), which gives routing tables a stable
/// iteration order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ChipCoord {
    /// Column index (0-based, west to east).
    pub x: u32,
    /// Row index (0-based, south to north).
    pub y: u32,
}

impl ChipCoord {
    /// Creates a coordinate from its two components.
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl From<(u32, u32)> for ChipCoord {
    fn from((x, y): (u32, u32)) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ChipCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn display_format() {
        assert_eq!(format!("{}", ChipCoord::new(3, 7)), "(3, 7)");
    }

    #[test]
    fn from_tuple() {
        let c: ChipCoord = (2, 5).into();
        assert_eq!(c, ChipCoord::new(2, 5));
    }

    #[test]
    fn ordering_is_x_major() {
        assert!(ChipCoord::new(0, 9) < ChipCoord::new(1, 0));
        assert!(ChipCoord::new(1, 0) < ChipCoord::new(1, 1));
    }

    #[test]
    fn hash_by_value() {
        let mut set = HashSet::new();
        set.insert(ChipCoord::new(1, 1));
        set.insert(ChipCoord::new(1, 1));
        set.insert(ChipCoord::new(1, 2));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn serde_roundtrip() {
        let c = ChipCoord::new(4, 2);
        let json = serde_json::to_string(&c).unwrap();
        let back: ChipCoord = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
