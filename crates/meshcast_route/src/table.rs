//! Flattening routing trees into per-chip routing table entries.
//!
//! Every chip a net passes through gets one [`RoutingTableEntry`] keyed by
//! the net's partition. Entries arriving for the same `(chip, partition)`
//! from different trees are merged; the merge fails if they disagree on
//! where traffic goes next.

use crate::data::Endpoint;
use crate::error::RouteError;
use crate::ids::PartitionId;
use crate::tree::{Child, RoutingTree};
use meshcast_common::{ChipCoord, ContentHash, CoreId, Direction, InternalError, MeshResult, Route};
use meshcast_machine::Topology;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Where traffic of one partition goes when it reaches one chip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTableEntry {
    /// Links the packet is copied onto.
    pub outgoing_links: BTreeSet<Direction>,
    /// Local cores the packet is delivered to.
    pub outgoing_cores: BTreeSet<CoreId>,
    /// The link the packet arrives on, when it is known and unique.
    pub incoming_link: Option<Direction>,
    /// The local core the packet originates from, if it starts here.
    pub incoming_core: Option<CoreId>,
}

impl RoutingTableEntry {
    /// Returns `true` if the entry sends the packet nowhere.
    pub fn is_empty(&self) -> bool {
        self.outgoing_links.is_empty() && self.outgoing_cores.is_empty()
    }

    /// Adds `route` to the outgoing sets.
    pub fn add_route(&mut self, route: Route) {
        match route {
            Route::Link(direction) => {
                self.outgoing_links.insert(direction);
            }
            Route::Core(core) => {
                self.outgoing_cores.insert(core);
            }
        }
    }

    /// Returns `true` if a router would forward the packet the same way
    /// without an entry: it passes straight through on one link.
    pub fn is_defaultable(&self) -> bool {
        if !self.outgoing_cores.is_empty() || self.incoming_core.is_some() {
            return false;
        }
        let (Some(incoming), Some(&outgoing)) = (self.incoming_link, self.outgoing_links.first())
        else {
            return false;
        };
        self.outgoing_links.len() == 1 && outgoing == incoming.opposite()
    }

    /// Folds `other` into this entry.
    ///
    /// Returns `false`, leaving this entry unchanged, if the outgoing sets
    /// differ. Incoming fields that disagree are cleared.
    pub fn merge(&mut self, other: &RoutingTableEntry) -> bool {
        if self.outgoing_links != other.outgoing_links || self.outgoing_cores != other.outgoing_cores
        {
            return false;
        }
        self.incoming_link = merge_incoming(self.incoming_link, other.incoming_link);
        self.incoming_core = merge_incoming(self.incoming_core, other.incoming_core);
        true
    }
}

fn merge_incoming<T: PartialEq>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) if a == b => Some(a),
        _ => None,
    }
}

/// Builds the entries for one tree, in breadth-first order.
///
/// `source` gives the root its incoming link or core. Nodes that forward
/// nowhere produce no entry.
pub fn tree_entries(
    tree: &RoutingTree,
    source: Option<&Endpoint>,
) -> Vec<(ChipCoord, RoutingTableEntry)> {
    let mut entries = Vec::new();
    for step in tree.traverse() {
        let mut entry = RoutingTableEntry::default();
        for &route in &step.outgoing {
            entry.add_route(route);
        }
        for &(route, child) in tree.children(step.node) {
            if let (None, Child::Terminal(endpoint)) = (route, child) {
                entry.add_route(endpoint.route());
            }
        }
        if entry.is_empty() {
            continue;
        }

        match step.arrival {
            Some(Route::Link(direction)) => entry.incoming_link = Some(direction.opposite()),
            Some(Route::Core(_)) => {}
            None => match source {
                Some(Endpoint::Physical { core, .. }) => entry.incoming_core = Some(*core),
                Some(Endpoint::Virtual { link, .. }) => entry.incoming_link = Some(*link),
                None => {}
            },
        }
        entries.push((step.chip, entry));
    }
    entries
}

/// Routing table entries for every chip, keyed by partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTables {
    entries: BTreeMap<ChipCoord, BTreeMap<PartitionId, RoutingTableEntry>>,
}

impl RoutingTables {
    /// Creates an empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry`, merging it with any entry already stored for the
    /// same chip and partition.
    pub fn insert(
        &mut self,
        chip: ChipCoord,
        partition: PartitionId,
        entry: RoutingTableEntry,
    ) -> Result<(), RouteError> {
        let chip_entries = self.entries.entry(chip).or_default();
        match chip_entries.get_mut(&partition) {
            Some(existing) => {
                if existing.merge(&entry) {
                    Ok(())
                } else {
                    Err(RouteError::MultiSourceConflict { chip, partition })
                }
            }
            None => {
                chip_entries.insert(partition, entry);
                Ok(())
            }
        }
    }

    /// Flattens `tree` and inserts its entries under `partition`.
    pub fn add_tree(
        &mut self,
        partition: PartitionId,
        tree: &RoutingTree,
        source: Option<&Endpoint>,
    ) -> Result<(), RouteError> {
        for (chip, entry) in tree_entries(tree, source) {
            self.insert(chip, partition, entry)?;
        }
        Ok(())
    }

    /// Returns the entry for `partition` on `chip`.
    pub fn get(&self, chip: ChipCoord, partition: PartitionId) -> Option<&RoutingTableEntry> {
        self.entries.get(&chip)?.get(&partition)
    }

    /// Returns every entry on `chip`, ordered by partition.
    pub fn chip_entries(&self, chip: ChipCoord) -> Option<&BTreeMap<PartitionId, RoutingTableEntry>> {
        self.entries.get(&chip)
    }

    /// Iterates over all entries in chip, then partition, order.
    pub fn iter(&self) -> impl Iterator<Item = (ChipCoord, PartitionId, &RoutingTableEntry)> {
        self.entries
            .iter()
            .flat_map(|(&chip, parts)| parts.iter().map(move |(&p, e)| (chip, p, e)))
    }

    /// Returns the total number of entries.
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns the number of chips holding at least one entry.
    pub fn chip_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the largest number of entries on any one chip.
    pub fn max_entries_per_chip(&self) -> usize {
        self.entries.values().map(BTreeMap::len).max().unwrap_or(0)
    }

    /// Returns chips whose entry count exceeds their router capacity.
    pub fn overfull_chips<T: Topology + ?Sized>(&self, topology: &T) -> Vec<(ChipCoord, usize)> {
        self.entries
            .iter()
            .filter(|(&chip, parts)| parts.len() > topology.router_entries(chip) as usize)
            .map(|(&chip, parts)| (chip, parts.len()))
            .collect()
    }

    /// Returns a content hash of the encoded tables.
    ///
    /// Equal tables always hash equally since every map is ordered.
    pub fn fingerprint(&self) -> MeshResult<ContentHash> {
        let bytes = bincode::serde::encode_to_vec(&self.entries, bincode::config::standard())
            .map_err(|e| InternalError::new(format!("cannot encode routing tables: {e}")))?;
        Ok(ContentHash::from_bytes(&bytes))
    }
}

/// [`RoutingTables`] shared between routing threads.
#[derive(Debug, Default)]
pub struct SharedRoutingTables {
    inner: Mutex<RoutingTables>,
}

impl SharedRoutingTables {
    /// Creates an empty shared table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one net's entries under a single lock.
    ///
    /// Stops at the first conflicting entry; entries inserted before it
    /// stay in place.
    pub fn merge_net(
        &self,
        partition: PartitionId,
        entries: Vec<(ChipCoord, RoutingTableEntry)>,
    ) -> Result<(), RouteError> {
        let mut tables = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for (chip, entry) in entries {
            tables.insert(chip, partition, entry)?;
        }
        Ok(())
    }

    /// Returns the collected tables.
    pub fn into_inner(self) -> RoutingTables {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Follows the entries of `partition` from `source` and returns every
/// endpoint a packet would be delivered to.
///
/// A link leads on to the neighbouring chip when the link is live and that
/// chip holds an entry for the partition; otherwise it is taken to be a
/// device attached to the link.
pub fn reachable_endpoints<T: Topology + ?Sized>(
    topology: &T,
    tables: &RoutingTables,
    partition: PartitionId,
    source: &Endpoint,
) -> BTreeSet<Endpoint> {
    let mut reached = BTreeSet::new();
    let mut visited = BTreeSet::from([source.chip()]);
    let mut queue = VecDeque::from([source.chip()]);

    while let Some(chip) = queue.pop_front() {
        let Some(entry) = tables.get(chip, partition) else {
            continue;
        };
        for &core in &entry.outgoing_cores {
            reached.insert(Endpoint::physical(chip, core));
        }
        for &link in &entry.outgoing_links {
            let next = topology
                .xy_over_link(chip, link)
                .filter(|&n| topology.is_link_at(chip, link) && tables.get(n, partition).is_some());
            match next {
                Some(next) => {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
                None => {
                    reached.insert(Endpoint::virtual_device(chip, link));
                }
            }
        }
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::ner_tree;
    use meshcast_machine::Machine;

    fn c(x: u32, y: u32) -> ChipCoord {
        ChipCoord::new(x, y)
    }

    fn entry(links: &[Direction], cores: &[CoreId]) -> RoutingTableEntry {
        RoutingTableEntry {
            outgoing_links: links.iter().copied().collect(),
            outgoing_cores: cores.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn torus_scenario_has_three_entries() {
        let m = Machine::torus(8, 8);
        let (tree, _) = ner_tree(&m, c(0, 0), &[c(0, 2), c(2, 0)], 20).unwrap();
        let entries = tree_entries(&tree, None);
        assert_eq!(entries.len(), 3);
        let sizes: Vec<usize> = entries.iter().map(|(_, e)| e.outgoing_links.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(entries[0].0, c(0, 0));
    }

    #[test]
    fn incoming_is_opposite_of_arrival() {
        let m = Machine::mesh(4, 4);
        let (tree, _) = ner_tree(&m, c(0, 0), &[c(2, 0)], 20).unwrap();
        let source = Endpoint::physical(c(0, 0), 1);
        let entries = tree_entries(&tree, Some(&source));
        assert_eq!(entries[0].1.incoming_core, Some(1));
        assert_eq!(entries[1].0, c(1, 0));
        assert_eq!(entries[1].1.incoming_link, Some(Direction::West));
        assert!(entries[1].1.is_defaultable());
        assert!(!entries[0].1.is_defaultable());
    }

    #[test]
    fn none_routed_terminal_resolves_from_endpoint() {
        let mut tree = RoutingTree::new(c(1, 1));
        let root = tree.root();
        let device = Endpoint::virtual_device(c(1, 1), Direction::South);
        tree.append_child(root, None, Child::Terminal(device));
        let source = Endpoint::virtual_device(c(1, 1), Direction::West);
        let entries = tree_entries(&tree, Some(&source));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.outgoing_links, BTreeSet::from([Direction::South]));
        assert_eq!(entries[0].1.incoming_link, Some(Direction::West));
    }

    #[test]
    fn merge_keeps_equal_and_clears_differing_incoming() {
        let mut a = entry(&[Direction::East], &[]);
        a.incoming_link = Some(Direction::West);
        let mut b = entry(&[Direction::East], &[]);
        b.incoming_link = Some(Direction::West);
        assert!(a.merge(&b));
        assert_eq!(a.incoming_link, Some(Direction::West));

        b.incoming_link = Some(Direction::South);
        assert!(a.merge(&b));
        assert_eq!(a.incoming_link, None);

        let mut c2 = entry(&[Direction::East], &[]);
        c2.incoming_core = Some(3);
        assert!(a.merge(&c2));
        assert_eq!(a.incoming_core, Some(3));
    }

    #[test]
    fn conflicting_outgoing_sets_are_rejected() {
        let mut tables = RoutingTables::new();
        let p = PartitionId::from_raw(4);
        tables.insert(c(2, 2), p, entry(&[Direction::North], &[])).unwrap();
        let err = tables
            .insert(c(2, 2), p, entry(&[Direction::East], &[]))
            .unwrap_err();
        assert_eq!(err, RouteError::MultiSourceConflict { chip: c(2, 2), partition: p });
        tables
            .insert(c(2, 2), PartitionId::from_raw(5), entry(&[Direction::East], &[]))
            .unwrap();
        assert_eq!(tables.entry_count(), 2);
        assert_eq!(tables.chip_count(), 1);
    }

    #[test]
    fn fingerprint_is_repeatable() {
        let m = Machine::torus(8, 8);
        let (tree, _) = ner_tree(&m, c(0, 0), &[c(5, 5), c(2, 6)], 20).unwrap();
        let mut a = RoutingTables::new();
        a.add_tree(PartitionId::from_raw(0), &tree, None).unwrap();
        let mut b = RoutingTables::new();
        b.add_tree(PartitionId::from_raw(0), &tree, None).unwrap();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        // Flattening the same tree twice merges cleanly.
        a.add_tree(PartitionId::from_raw(0), &tree, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_tables_collect_entries() {
        let shared = SharedRoutingTables::new();
        shared
            .merge_net(PartitionId::from_raw(1), vec![(c(0, 0), entry(&[], &[1]))])
            .unwrap();
        let tables = shared.into_inner();
        assert_eq!(tables.get(c(0, 0), PartitionId::from_raw(1)), Some(&entry(&[], &[1])));
    }

    #[test]
    fn reachability_follows_links_and_devices() {
        let m = Machine::mesh(4, 4);
        let p = PartitionId::from_raw(0);
        let mut tables = RoutingTables::new();
        tables.insert(c(0, 0), p, entry(&[Direction::East, Direction::West], &[])).unwrap();
        tables.insert(c(1, 0), p, entry(&[], &[5])).unwrap();
        let reached = reachable_endpoints(&m, &tables, p, &Endpoint::physical(c(0, 0), 1));
        assert_eq!(
            reached,
            BTreeSet::from([
                Endpoint::physical(c(1, 0), 5),
                Endpoint::virtual_device(c(0, 0), Direction::West),
            ])
        );
    }

    #[test]
    fn overfull_chips_are_reported() {
        let m = Machine::mesh(2, 2).with_router_entries(1);
        let mut tables = RoutingTables::new();
        for p in 0..3 {
            tables
                .insert(c(0, 0), PartitionId::from_raw(p), entry(&[Direction::East], &[]))
                .unwrap();
        }
        assert_eq!(tables.overfull_chips(&m), vec![(c(0, 0), 3)]);
        assert_eq!(tables.max_entries_per_chip(), 3);
    }
}
