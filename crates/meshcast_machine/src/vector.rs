//! Signed three-axis hop vectors between chips.
//!
//! A hop on a six-link chip moves along one of three axes: `x` (east/west),
//! `y` (north/south) or `z` (the diagonal, where `+z` is south-west). Any
//! displacement has many `(x, y, z)` representations; the *minimal* one,
//! obtained by subtracting the median component, uses the fewest hops.

use meshcast_common::{ChipCoord, Direction};
use serde::{Deserialize, Serialize};

/// A displacement measured in hops along the three link axes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct MeshVector {
    /// Hops east (positive) or west (negative).
    pub x: i32,
    /// Hops north (positive) or south (negative).
    pub y: i32,
    /// Hops south-west (positive) or north-east (negative).
    pub z: i32,
}

impl MeshVector {
    /// Creates a vector from its three components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the equivalent vector with the fewest hops.
    pub fn minimise(self) -> Self {
        let mut sorted = [self.x, self.y, self.z];
        sorted.sort_unstable();
        let median = sorted[1];
        Self::new(self.x - median, self.y - median, self.z - median)
    }

    /// Returns the number of hops this vector takes.
    pub fn length(self) -> u32 {
        self.x.unsigned_abs() + self.y.unsigned_abs() + self.z.unsigned_abs()
    }

    /// Returns `true` if the vector does not move.
    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }

    /// Returns `(axis index, magnitude)` for the three axes in `x, y, z` order.
    pub fn components(self) -> [(usize, i32); 3] {
        [(0, self.x), (1, self.y), (2, self.z)]
    }

    /// Returns the link followed for one unit hop along `axis` with the
    /// sign of `magnitude`.
    ///
    /// # Panics
    ///
    /// Panics if `axis > 2` or `magnitude == 0`.
    pub fn hop_direction(axis: usize, magnitude: i32) -> Direction {
        let sign = magnitude.signum();
        assert!(sign != 0, "zero-length hop has no direction");
        let (dx, dy) = match axis {
            0 => (sign, 0),
            1 => (0, sign),
            2 => (-sign, -sign),
            _ => panic!("axis {axis} out of range"),
        };
        Direction::from_vector(dx, dy).unwrap_or_else(|| unreachable!("unit step ({dx}, {dy})"))
    }

    /// Shortest vector from `from` to `to` on a mesh without wraparound.
    pub fn mesh(from: ChipCoord, to: ChipCoord) -> Self {
        let dx = to.x as i64 - from.x as i64;
        let dy = to.y as i64 - from.y as i64;
        Self::new(dx as i32, dy as i32, 0).minimise()
    }

    /// Shortest vector from `from` to `to` on a `width` x `height` torus.
    ///
    /// Ties between equally short wrap choices are broken in a fixed order
    /// (no wrap, wrap x, wrap y, wrap both) so results are deterministic.
    pub fn torus(from: ChipCoord, to: ChipCoord, width: u32, height: u32) -> Self {
        let w = width as i64;
        let h = height as i64;
        let x = (to.x as i64 - from.x as i64).rem_euclid(w);
        let y = (to.y as i64 - from.y as i64).rem_euclid(h);

        let approaches = [
            (x.max(y), (x, y)),
            (w - x + y, (-(w - x), y)),
            (x + h - y, (x, -(h - y))),
            ((w - x).max(h - y), (-(w - x), -(h - y))),
        ];
        let mut best = approaches[0];
        for candidate in &approaches[1..] {
            if candidate.0 < best.0 {
                best = *candidate;
            }
        }
        let (vx, vy) = best.1;
        Self::new(vx as i32, vy as i32, 0).minimise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: u32, y: u32) -> ChipCoord {
        ChipCoord::new(x, y)
    }

    #[test]
    fn minimise_uses_diagonal() {
        assert_eq!(MeshVector::new(2, 2, 0).minimise(), MeshVector::new(0, 0, -2));
        assert_eq!(MeshVector::new(1, -1, 0).minimise(), MeshVector::new(1, -1, 0));
        assert_eq!(MeshVector::new(3, 1, 0).minimise(), MeshVector::new(2, 0, -1));
    }

    #[test]
    fn mesh_lengths() {
        assert_eq!(MeshVector::mesh(c(0, 0), c(0, 2)).length(), 2);
        assert_eq!(MeshVector::mesh(c(0, 0), c(3, 3)).length(), 3);
        assert_eq!(MeshVector::mesh(c(0, 3), c(3, 0)).length(), 6);
        assert!(MeshVector::mesh(c(5, 5), c(5, 5)).is_zero());
    }

    #[test]
    fn torus_wraps_when_shorter() {
        let v = MeshVector::torus(c(0, 0), c(7, 0), 8, 8);
        assert_eq!(v, MeshVector::new(-1, 0, 0));
        let v = MeshVector::torus(c(0, 0), c(7, 7), 8, 8);
        assert_eq!(v.length(), 1);
        assert_eq!(v, MeshVector::new(0, 0, 1));
    }

    #[test]
    fn torus_without_wrap_benefit_matches_mesh() {
        assert_eq!(
            MeshVector::torus(c(1, 1), c(3, 2), 8, 8),
            MeshVector::mesh(c(1, 1), c(3, 2))
        );
    }

    #[test]
    fn hop_directions() {
        assert_eq!(MeshVector::hop_direction(0, 4), Direction::East);
        assert_eq!(MeshVector::hop_direction(0, -1), Direction::West);
        assert_eq!(MeshVector::hop_direction(1, 2), Direction::North);
        assert_eq!(MeshVector::hop_direction(1, -2), Direction::South);
        assert_eq!(MeshVector::hop_direction(2, 1), Direction::SouthWest);
        assert_eq!(MeshVector::hop_direction(2, -3), Direction::NorthEast);
    }
}
