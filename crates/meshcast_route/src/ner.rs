//! Neighbour-exploring tree construction.
//!
//! Sinks are added to the tree nearest-first. Each sink is connected to the
//! closest chip already in the tree (its *anchor*) by a longest-dimension-first
//! hop sequence, which keeps branches short and shares as much of the tree as
//! possible. The builder assumes every link works; dead links are repaired
//! afterwards by [`crate::fault`].

use crate::data::Net;
use crate::error::RouteError;
use crate::ids::NodeId;
use crate::tree::{Child, RoutingTree};
use meshcast_common::{ChipCoord, Direction, Route};
use meshcast_machine::{concentric_hexagons, hexagon_cell_count, Topology};
use std::collections::HashMap;

/// Default anchor search radius in hops.
pub const DEFAULT_RADIUS: u32 = 20;

/// One hop of a path: the link taken and the chip it lands on.
pub type Hop = (Direction, ChipCoord);

/// Returns the longest-dimension-first hops from `from` to `to`.
///
/// The shortest vector is split into its axis magnitudes; axes are walked
/// in descending order of magnitude, ties keeping `x, y, z` order.
pub fn ldf_hops<T: Topology + ?Sized>(
    topology: &T,
    from: ChipCoord,
    to: ChipCoord,
) -> Result<Vec<Hop>, RouteError> {
    let vector = topology.vector(from, to);
    let mut axes = vector.components();
    axes.sort_by_key(|&(_, magnitude)| std::cmp::Reverse(magnitude.unsigned_abs()));

    let mut hops = Vec::with_capacity(vector.length() as usize);
    let mut current = from;
    for (axis, magnitude) in axes {
        if magnitude == 0 {
            break;
        }
        let direction = meshcast_machine::MeshVector::hop_direction(axis, magnitude);
        for _ in 0..magnitude.unsigned_abs() {
            current = topology
                .xy_over_link(current, direction)
                .ok_or(RouteError::OffMachine { chip: current })?;
            hops.push((direction, current));
        }
    }
    Ok(hops)
}

/// Coordinates already in a tree under construction, with their nodes.
///
/// Insertion order is kept so that tree scans are deterministic.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    nodes: HashMap<ChipCoord, NodeId>,
    order: Vec<ChipCoord>,
}

impl TreeIndex {
    /// Indexes every node reachable in `tree`.
    pub fn of(tree: &RoutingTree) -> Self {
        let mut index = Self::default();
        for (_, node) in tree.breadth_first() {
            index.insert(tree.chip(node), node);
        }
        index
    }

    /// Records that `chip` is served by `node`.
    pub fn insert(&mut self, chip: ChipCoord, node: NodeId) {
        if self.nodes.insert(chip, node).is_none() {
            self.order.push(chip);
        }
    }

    /// Returns the node on `chip`, if any.
    pub fn get(&self, chip: ChipCoord) -> Option<NodeId> {
        self.nodes.get(&chip).copied()
    }

    /// Returns `true` if `chip` is in the tree.
    pub fn contains(&self, chip: ChipCoord) -> bool {
        self.nodes.contains_key(&chip)
    }

    /// Returns the number of indexed chips.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the indexed chips in insertion order.
    pub fn chips(&self) -> &[ChipCoord] {
        &self.order
    }

    /// Consumes the index, returning the chip to node map.
    pub fn into_map(self) -> HashMap<ChipCoord, NodeId> {
        self.nodes
    }
}

/// Finds the tree chip nearest to `sink` within `radius` hops.
///
/// Small trees are scanned directly; large ones are probed ring by ring
/// around the sink. Both return `None` when nothing lies within `radius`.
pub fn find_anchor<T: Topology + ?Sized>(
    topology: &T,
    index: &TreeIndex,
    sink: ChipCoord,
    radius: u32,
) -> Option<ChipCoord> {
    if index.len() < hexagon_cell_count(radius) / 3 {
        let mut best: Option<(u32, ChipCoord)> = None;
        for &chip in index.chips() {
            let distance = topology.vector_length(chip, sink);
            if distance <= radius && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, chip));
            }
        }
        best.map(|(_, chip)| chip)
    } else {
        concentric_hexagons(radius)
            .iter()
            .filter_map(|&(dx, dy)| topology.offset(sink, dx, dy))
            .find(|&chip| index.contains(chip))
    }
}

/// Drops every hop up to and including the last one that lands on a chip
/// already in the tree, returning the new anchor and the remaining hops.
pub fn truncate_at_tree<'h>(
    index: &TreeIndex,
    anchor: ChipCoord,
    hops: &'h [Hop],
) -> (ChipCoord, &'h [Hop]) {
    match hops.iter().rposition(|&(_, chip)| index.contains(chip)) {
        Some(i) => (hops[i].1, &hops[i + 1..]),
        None => (anchor, hops),
    }
}

/// Hangs `hops` off the node on `anchor` as a chain of new nodes.
pub fn append_hops(
    tree: &mut RoutingTree,
    index: &mut TreeIndex,
    anchor: ChipCoord,
    hops: &[Hop],
) -> Result<(), RouteError> {
    let mut last = index
        .get(anchor)
        .ok_or(RouteError::CycleDetected { chip: anchor })?;
    for &(direction, chip) in hops {
        if index.contains(chip) {
            return Err(RouteError::CycleDetected { chip });
        }
        last = tree.add_child_node(last, Some(Route::Link(direction)), chip);
        index.insert(chip, last);
    }
    Ok(())
}

/// Connects `sink` to the tree from its nearest anchor, falling back to the
/// root when nothing is within `radius`.
pub fn attach_chip<T: Topology + ?Sized>(
    topology: &T,
    tree: &mut RoutingTree,
    index: &mut TreeIndex,
    sink: ChipCoord,
    radius: u32,
) -> Result<(), RouteError> {
    if index.contains(sink) {
        return Ok(());
    }
    let anchor = find_anchor(topology, index, sink, radius).unwrap_or(tree.root_chip());
    let hops = ldf_hops(topology, anchor, sink)?;
    let (anchor, hops) = truncate_at_tree(index, anchor, &hops);
    append_hops(tree, index, anchor, hops)
}

/// Builds a tree from `source` reaching every chip in `sinks`.
///
/// Sinks are connected in ascending distance from the source; equally
/// distant sinks keep their given order. The returned map covers every chip
/// in the tree. A dead `source` is rejected with
/// [`RouteError::InvalidRootChip`] before anything is built.
pub fn ner_tree<T: Topology + ?Sized>(
    topology: &T,
    source: ChipCoord,
    sinks: &[ChipCoord],
    radius: u32,
) -> Result<(RoutingTree, HashMap<ChipCoord, NodeId>), RouteError> {
    for &chip in std::iter::once(&source).chain(sinks) {
        if !topology.contains(chip) {
            return Err(RouteError::OffMachine { chip });
        }
    }
    if !topology.is_chip_at(source) {
        return Err(RouteError::InvalidRootChip { chip: source });
    }

    let mut tree = RoutingTree::new(source);
    let mut index = TreeIndex::default();
    index.insert(source, tree.root());

    let mut ordered = sinks.to_vec();
    ordered.sort_by_key(|&sink| topology.vector_length(source, sink));

    for sink in ordered {
        attach_chip(topology, &mut tree, &mut index, sink, radius)?;
    }
    Ok((tree, index.into_map()))
}

/// Builds the tree for `net`, with a terminal for every sink endpoint.
pub fn ner_net<T: Topology + ?Sized>(
    topology: &T,
    net: &Net,
    radius: u32,
) -> Result<(RoutingTree, HashMap<ChipCoord, NodeId>), RouteError> {
    let (mut tree, lookup) = ner_tree(topology, net.source.chip(), &net.sink_chips(), radius)?;
    for sink in &net.sinks {
        let chip = sink.chip();
        let node = *lookup
            .get(&chip)
            .ok_or(RouteError::DisconnectedRegion {
                from: net.source.chip(),
                to: chip,
            })?;
        tree.append_child(node, Some(sink.route()), Child::Terminal(*sink));
    }
    Ok((tree, lookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endpoint;
    use crate::ids::PartitionId;
    use meshcast_machine::Machine;
    use std::collections::HashSet;

    fn c(x: u32, y: u32) -> ChipCoord {
        ChipCoord::new(x, y)
    }

    #[test]
    fn ldf_walks_longest_axis_first() {
        let m = Machine::mesh(8, 8);
        let hops = ldf_hops(&m, c(0, 0), c(3, 1)).unwrap();
        // (3, 1) minimises to x = 2, z = -1.
        assert_eq!(
            hops,
            vec![
                (Direction::East, c(1, 0)),
                (Direction::East, c(2, 0)),
                (Direction::NorthEast, c(3, 1)),
            ]
        );
    }

    #[test]
    fn ldf_ties_keep_axis_order() {
        let m = Machine::mesh(8, 8);
        let hops = ldf_hops(&m, c(2, 0), c(0, 2)).unwrap();
        let dirs: Vec<_> = hops.iter().map(|h| h.0).collect();
        assert_eq!(
            dirs,
            vec![Direction::West, Direction::West, Direction::North, Direction::North]
        );
    }

    #[test]
    fn ldf_wraps_on_torus() {
        let m = Machine::torus(8, 8);
        let hops = ldf_hops(&m, c(0, 0), c(7, 7)).unwrap();
        assert_eq!(hops, vec![(Direction::SouthWest, c(7, 7))]);
    }

    #[test]
    fn ldf_to_self_is_empty() {
        let m = Machine::mesh(4, 4);
        assert!(ldf_hops(&m, c(1, 1), c(1, 1)).unwrap().is_empty());
    }

    #[test]
    fn truncation_reanchors_on_last_tree_chip() {
        let mut index = TreeIndex::default();
        index.insert(c(0, 0), NodeId::from_raw(0));
        index.insert(c(2, 0), NodeId::from_raw(1));
        let hops = vec![
            (Direction::East, c(1, 0)),
            (Direction::East, c(2, 0)),
            (Direction::East, c(3, 0)),
        ];
        let (anchor, rest) = truncate_at_tree(&index, c(0, 0), &hops);
        assert_eq!(anchor, c(2, 0));
        assert_eq!(rest, &hops[2..]);
    }

    #[test]
    fn both_anchor_strategies_agree_on_distance() {
        let m = Machine::torus(16, 16);
        let mut index = TreeIndex::default();
        for (i, x) in (0..6).enumerate() {
            index.insert(c(x, 0), NodeId::from_raw(i as u32));
        }
        let sink = c(4, 3);
        // Radius 2 has 19 ring cells: 6 >= 19 / 3 so rings are probed.
        let by_rings = find_anchor(&m, &index, sink, 2);
        // Radius 20 has 1261 cells: the tree is scanned.
        let by_scan = find_anchor(&m, &index, sink, 20).unwrap();
        assert_eq!(by_rings, None);
        assert_eq!(m.vector_length(by_scan, sink), 3);
        let by_rings = find_anchor(&m, &index, c(4, 2), 2).unwrap();
        assert_eq!(m.vector_length(by_rings, c(4, 2)), 2);
    }

    #[test]
    fn eight_by_eight_torus_two_branches() {
        let m = Machine::torus(8, 8);
        let (tree, lookup) = ner_tree(&m, c(0, 0), &[c(0, 2), c(2, 0)], 20).unwrap();
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.children(tree.root()).len(), 2);
        assert_eq!(tree.depth(), 2);
        for chip in [c(0, 1), c(0, 2), c(1, 0), c(2, 0)] {
            assert!(lookup.contains_key(&chip));
        }
    }

    #[test]
    fn sinks_share_existing_branches() {
        let m = Machine::mesh(8, 8);
        let (tree, _) = ner_tree(&m, c(0, 0), &[c(4, 0), c(2, 0), c(4, 1)], 20).unwrap();
        // (2, 0) lies on the way to (4, 0); (4, 1) hangs one hop off it.
        assert_eq!(tree.node_count(), 6);
        let chips: HashSet<_> = tree.chips().into_iter().collect();
        assert_eq!(chips.len(), tree.node_count());
    }

    #[test]
    fn zero_radius_routes_from_source() {
        let m = Machine::mesh(8, 8);
        let (tree, _) = ner_tree(&m, c(0, 0), &[c(3, 0), c(3, 2)], 0).unwrap();
        // The second sink cannot see (3, 0), so it walks from the source and
        // joins the first branch where the paths meet.
        let chips: HashSet<_> = tree.chips().into_iter().collect();
        assert_eq!(chips.len(), tree.node_count());
        assert!(chips.contains(&c(3, 2)));
    }

    #[test]
    fn ner_is_deterministic() {
        let m = Machine::torus(12, 12);
        let sinks = [c(5, 5), c(1, 9), c(11, 0), c(6, 2), c(3, 3)];
        let (a, _) = ner_tree(&m, c(2, 2), &sinks, 20).unwrap();
        let (b, _) = ner_tree(&m, c(2, 2), &sinks, 20).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ner_net_attaches_terminals() {
        let m = Machine::mesh(4, 4);
        let net = Net::new(
            PartitionId::from_raw(1),
            Endpoint::physical(c(0, 0), 1),
            [
                Endpoint::physical(c(0, 0), 2),
                Endpoint::virtual_device(c(3, 0), Direction::East),
            ],
        );
        let (tree, _) = ner_net(&m, &net, DEFAULT_RADIUS).unwrap();
        let terminals = tree.terminals();
        assert_eq!(terminals.len(), 2);
        assert!(terminals.contains(&(c(0, 0), Some(Route::Core(2)), net.sinks[0])));
        assert!(terminals.contains(&(
            c(3, 0),
            Some(Route::Link(Direction::East)),
            net.sinks[1]
        )));
    }

    #[test]
    fn dead_source_is_rejected_up_front() {
        let m = Machine::mesh(4, 4).with_dead_chip(c(1, 1));
        let err = ner_tree(&m, c(1, 1), &[c(3, 3)], 20).unwrap_err();
        assert_eq!(err, RouteError::InvalidRootChip { chip: c(1, 1) });
        // An off-machine sink is still reported first.
        let err = ner_tree(&m, c(1, 1), &[c(9, 9)], 20).unwrap_err();
        assert_eq!(err, RouteError::OffMachine { chip: c(9, 9) });
    }

    #[test]
    fn off_machine_sink_is_rejected() {
        let m = Machine::mesh(4, 4);
        let err = ner_tree(&m, c(0, 0), &[c(9, 9)], 20).unwrap_err();
        assert_eq!(err, RouteError::OffMachine { chip: c(9, 9) });
    }
}
