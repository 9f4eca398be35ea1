//! The read-only machine view every router works against.

use crate::vector::MeshVector;
use meshcast_common::{ChipCoord, Direction};

/// The core trait for a machine a route can be laid onto.
///
/// Implementors describe which chips and links are usable; coordinate
/// arithmetic (stepping over a link, shortest vectors) is provided in terms
/// of the dimensions and the wraparound flag. Routers share one topology
/// across worker threads, so implementations must be `Send + Sync` and must
/// not change while routing is in progress.
pub trait Topology: std::fmt::Debug + Send + Sync {
    /// Returns the number of chip columns.
    fn width(&self) -> u32;

    /// Returns the number of chip rows.
    fn height(&self) -> u32;

    /// Returns `true` if edge links wrap around to the far side.
    fn wrap_around(&self) -> bool;

    /// Returns `true` if a working chip exists at `chip`.
    fn is_chip_at(&self, chip: ChipCoord) -> bool;

    /// Returns `true` if the link leaving `chip` in `direction` works and
    /// lands on a working chip.
    fn is_link_at(&self, chip: ChipCoord, direction: Direction) -> bool;

    /// Returns the routing table capacity of `chip`.
    fn router_entries(&self, _chip: ChipCoord) -> u32 {
        1024
    }

    /// Returns the bandwidth available on the link leaving `chip` in `direction`.
    fn link_bandwidth(&self, _chip: ChipCoord, _direction: Direction) -> f64 {
        250.0
    }

    /// Returns the chip reached by following `direction` from `chip`.
    ///
    /// On a mesh this is `None` when the step leaves the grid. Says nothing
    /// about whether the link or the chip it reaches is alive.
    fn xy_over_link(&self, chip: ChipCoord, direction: Direction) -> Option<ChipCoord> {
        let (dx, dy) = direction.vector();
        self.offset(chip, dx, dy)
    }

    /// Returns the chip `(dx, dy)` away from `chip`, or `None` if that falls
    /// off a mesh.
    fn offset(&self, chip: ChipCoord, dx: i32, dy: i32) -> Option<ChipCoord> {
        let x = chip.x as i64 + dx as i64;
        let y = chip.y as i64 + dy as i64;
        let (w, h) = (self.width() as i64, self.height() as i64);
        if self.wrap_around() {
            Some(ChipCoord::new(x.rem_euclid(w) as u32, y.rem_euclid(h) as u32))
        } else if (0..w).contains(&x) && (0..h).contains(&y) {
            Some(ChipCoord::new(x as u32, y as u32))
        } else {
            None
        }
    }

    /// Returns the shortest hop vector from `from` to `to`.
    fn vector(&self, from: ChipCoord, to: ChipCoord) -> MeshVector {
        if self.wrap_around() {
            MeshVector::torus(from, to, self.width(), self.height())
        } else {
            MeshVector::mesh(from, to)
        }
    }

    /// Returns the number of hops between `from` and `to`, ignoring faults.
    fn vector_length(&self, from: ChipCoord, to: ChipCoord) -> u32 {
        self.vector(from, to).length()
    }

    /// Returns `true` if `chip` lies inside the machine's dimensions.
    fn contains(&self, chip: ChipCoord) -> bool {
        chip.x < self.width() && chip.y < self.height()
    }

    /// Returns every working chip in `x`-major order.
    fn chips(&self) -> Vec<ChipCoord> {
        let mut chips = Vec::new();
        for x in 0..self.width() {
            for y in 0..self.height() {
                let chip = ChipCoord::new(x, y);
                if self.is_chip_at(chip) {
                    chips.push(chip);
                }
            }
        }
        chips
    }

    /// Returns the working links out of `chip` with the chips they reach,
    /// in link-id order.
    fn live_links(&self, chip: ChipCoord) -> Vec<(Direction, ChipCoord)> {
        Direction::ALL
            .into_iter()
            .filter(|&d| self.is_link_at(chip, d))
            .filter_map(|d| self.xy_over_link(chip, d).map(|n| (d, n)))
            .collect()
    }
}
