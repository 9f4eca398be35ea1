//! Concentric hexagonal rings of chip offsets.
//!
//! The ring of radius `r` around a chip holds every offset exactly `r` hops
//! away, so walking the rings in order visits offsets nearest-first. Ring
//! tables are computed once per radius and shared by every thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Per-ring walking steps, starting from the offset directly south.
const RING_STEPS: [(i32, i32); 6] = [(1, 1), (0, 1), (-1, 0), (-1, -1), (0, -1), (1, 0)];

static RING_TABLES: OnceLock<Mutex<HashMap<u32, Arc<[(i32, i32)]>>>> = OnceLock::new();

/// Returns the number of offsets within `radius` hops, including the centre.
pub fn hexagon_cell_count(radius: u32) -> usize {
    let r = radius as usize;
    1 + 3 * r * (r + 1)
}

/// Returns every `(dx, dy)` offset within `radius` hops, ordered by ring.
///
/// The first entry is `(0, 0)`; ring `r` follows ring `r - 1`. The table for
/// a given radius is built on first use and never changes afterwards.
pub fn concentric_hexagons(radius: u32) -> Arc<[(i32, i32)]> {
    let tables = RING_TABLES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut tables = tables.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
        tables
            .entry(radius)
            .or_insert_with(|| build_rings(radius).into()),
    )
}

fn build_rings(radius: u32) -> Vec<(i32, i32)> {
    let mut offsets = Vec::with_capacity(hexagon_cell_count(radius));
    offsets.push((0, 0));
    let (mut x, mut y) = (0i32, 0i32);
    for r in 1..=radius as i32 {
        y -= 1;
        for (dx, dy) in RING_STEPS {
            for _ in 0..r {
                offsets.push((x, y));
                x += dx;
                y += dy;
            }
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::MeshVector;
    use std::collections::HashSet;

    fn hops(dx: i32, dy: i32) -> u32 {
        MeshVector::new(dx, dy, 0).minimise().length()
    }

    #[test]
    fn counts_match_formula() {
        assert_eq!(concentric_hexagons(0).len(), 1);
        assert_eq!(concentric_hexagons(1).len(), 7);
        assert_eq!(concentric_hexagons(20).len(), 1261);
        assert_eq!(hexagon_cell_count(20), 1261);
    }

    #[test]
    fn first_ring_is_the_six_neighbours() {
        let rings = concentric_hexagons(1);
        let ring: HashSet<_> = rings[1..].iter().copied().collect();
        let expected: HashSet<_> = [(0, -1), (1, 0), (1, 1), (0, 1), (-1, 0), (-1, -1)]
            .into_iter()
            .collect();
        assert_eq!(ring, expected);
    }

    #[test]
    fn offsets_are_unique_and_ordered_by_distance() {
        let rings = concentric_hexagons(6);
        let unique: HashSet<_> = rings.iter().copied().collect();
        assert_eq!(unique.len(), rings.len());
        let distances: Vec<u32> = rings.iter().map(|&(dx, dy)| hops(dx, dy)).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*distances.last().unwrap(), 6);
    }

    #[test]
    fn tables_are_shared() {
        let a = concentric_hexagons(3);
        let b = concentric_hexagons(3);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
