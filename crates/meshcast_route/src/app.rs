//! Application-level traffic aggregation.
//!
//! Applications describe traffic between logical entities, each of which is
//! spread over many physical endpoints. Rather than routing every endpoint
//! pair independently, the router builds one spanning tree per entity chip
//! for distribution inside an entity, computes one representative path per
//! pair of communicating entities, and stitches the two together.

use crate::data::{Endpoint, Net};
use crate::error::RouteError;
use crate::fault::{avoid_dead_links, FaultReport};
use crate::ids::{EntityId, PartitionId};
use crate::ner::{append_hops, attach_chip, ldf_hops, truncate_at_tree, Hop, TreeIndex};
use crate::tree::{Child, RoutingTree};
use meshcast_common::{ChipCoord, Direction, Route};
use meshcast_machine::Topology;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Logical entities and the endpoints each is made of.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppGraph {
    entities: Vec<Vec<Endpoint>>,
}

impl AppGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity made of `endpoints` and returns its id.
    pub fn add_entity(&mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> EntityId {
        let id = EntityId::from_raw(self.entities.len() as u32);
        self.entities.push(endpoints.into_iter().collect());
        id
    }

    /// Returns the endpoints of `entity`.
    pub fn endpoints(&self, entity: EntityId) -> Result<&[Endpoint], RouteError> {
        self.entities
            .get(entity.as_raw() as usize)
            .map(Vec::as_slice)
            .ok_or(RouteError::UnknownEntity { entity })
    }

    /// Returns the number of entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Iterates over every entity with its endpoints.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &[Endpoint])> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId::from_raw(i as u32), e.as_slice()))
    }

    /// Returns the number of core endpoints of `entity`, which is the
    /// number of partition ids a partition sourced by it uses.
    pub fn physical_endpoint_count(&self, entity: EntityId) -> Result<u32, RouteError> {
        Ok(self
            .endpoints(entity)?
            .iter()
            .filter(|e| e.is_physical())
            .count() as u32)
    }

    /// Returns the chips of the core endpoints of `entity`, first-seen order.
    pub fn physical_chips(&self, entity: EntityId) -> Result<Vec<ChipCoord>, RouteError> {
        let mut chips = Vec::new();
        for endpoint in self.endpoints(entity)? {
            if endpoint.is_physical() && !chips.contains(&endpoint.chip()) {
                chips.push(endpoint.chip());
            }
        }
        Ok(chips)
    }
}

/// Traffic from one entity to a set of entities, sharing one partition base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPartition {
    /// Partition of the first physical source; later sources take the
    /// following ids.
    pub partition: PartitionId,
    /// The sending entity.
    pub source: EntityId,
    /// The receiving entities. Listing `source` here makes it self-connected.
    pub targets: Vec<EntityId>,
}

/// A breadth-first spanning tree over the chips of one entity, using live
/// links only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTree {
    root: ChipCoord,
    edges: Vec<(ChipCoord, Direction, ChipCoord)>,
    parent: HashMap<ChipCoord, (ChipCoord, Direction)>,
}

impl LocalTree {
    /// Spans every chip of `chips` reachable from `root` without leaving
    /// the set.
    pub fn build<T: Topology + ?Sized>(
        topology: &T,
        root: ChipCoord,
        chips: &BTreeSet<ChipCoord>,
    ) -> Self {
        let mut edges = Vec::new();
        let mut parent = HashMap::new();
        let mut seen = BTreeSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(chip) = queue.pop_front() {
            for (direction, next) in topology.live_links(chip) {
                if chips.contains(&next) && seen.insert(next) {
                    edges.push((chip, direction, next));
                    parent.insert(next, (chip, direction));
                    queue.push_back(next);
                }
            }
        }
        Self {
            root,
            edges,
            parent,
        }
    }

    /// Returns the chip the tree is rooted at.
    pub fn root(&self) -> ChipCoord {
        self.root
    }

    /// Returns the `(parent, link, child)` edges in breadth-first order.
    pub fn edges(&self) -> &[(ChipCoord, Direction, ChipCoord)] {
        &self.edges
    }

    /// Returns `true` if the tree spans `chip`.
    pub fn contains(&self, chip: ChipCoord) -> bool {
        chip == self.root || self.parent.contains_key(&chip)
    }

    /// Returns the hops from the root down to `chip`.
    pub fn path_to(&self, chip: ChipCoord) -> Option<Vec<Hop>> {
        let mut hops = Vec::new();
        let mut current = chip;
        while current != self.root {
            let &(parent, direction) = self.parent.get(&current)?;
            hops.push((direction, current));
            current = parent;
        }
        hops.reverse();
        Some(hops)
    }
}

/// The stretch of a representative path between two entities that lies
/// outside both of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPath {
    /// The last source-entity chip on the path.
    pub exit: ChipCoord,
    /// Hops from `exit` up to and including the first target-entity chip.
    pub hops: Vec<Hop>,
}

impl EntityPath {
    /// Returns the first target-entity chip reached.
    pub fn entry(&self) -> ChipCoord {
        self.hops.last().map_or(self.exit, |&(_, chip)| chip)
    }
}

/// One routed net produced from an application partition.
#[derive(Debug, Clone)]
pub struct RoutedNet {
    /// The net, keyed by its own partition.
    pub net: Net,
    /// Its routing tree after fault avoidance.
    pub tree: RoutingTree,
    /// What fault avoidance had to repair.
    pub report: FaultReport,
}

/// Routes application partitions, sharing per-entity work between them.
///
/// Local trees are built once when the router is created; entity-to-entity
/// paths are computed on first use and cached. The router can be shared
/// between threads.
#[derive(Debug)]
pub struct AppRouter<'a, T: Topology + ?Sized> {
    topology: &'a T,
    graph: &'a AppGraph,
    radius: u32,
    local_trees: HashMap<(EntityId, ChipCoord), LocalTree>,
    paths: Mutex<HashMap<(EntityId, EntityId), Arc<EntityPath>>>,
}

impl<'a, T: Topology + ?Sized> AppRouter<'a, T> {
    /// Creates a router, building the local tree of every entity chip in
    /// parallel.
    pub fn new(topology: &'a T, graph: &'a AppGraph, radius: u32) -> Self {
        let mut jobs = Vec::new();
        for (entity, endpoints) in graph.entities() {
            let chips: BTreeSet<ChipCoord> = endpoints
                .iter()
                .filter(|e| e.is_physical())
                .map(Endpoint::chip)
                .collect();
            let chips = Arc::new(chips);
            for &root in chips.iter() {
                jobs.push((entity, root, Arc::clone(&chips)));
            }
        }

        let local_trees = jobs
            .par_iter()
            .map(|(entity, root, chips)| {
                ((*entity, *root), LocalTree::build(topology, *root, chips))
            })
            .collect();

        Self {
            topology,
            graph,
            radius,
            local_trees,
            paths: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the local tree of `entity` rooted at `chip`.
    pub fn local_tree(&self, entity: EntityId, chip: ChipCoord) -> Option<&LocalTree> {
        self.local_trees.get(&(entity, chip))
    }

    /// Returns the cached path from `source` to `target`, computing it on
    /// first use.
    pub fn entity_path(
        &self,
        source: EntityId,
        target: EntityId,
    ) -> Result<Arc<EntityPath>, RouteError> {
        let key = (source, target);
        if let Some(path) = self.lock_paths().get(&key) {
            return Ok(Arc::clone(path));
        }
        let path = Arc::new(self.compute_entity_path(source, target)?);
        Ok(Arc::clone(self.lock_paths().entry(key).or_insert(path)))
    }

    fn lock_paths(&self) -> MutexGuard<'_, HashMap<(EntityId, EntityId), Arc<EntityPath>>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chips that count as being inside `entity` when cutting paths: its
    /// core chips, or the chips its devices hang off when it has no cores.
    fn group_chips(&self, entity: EntityId) -> Result<BTreeSet<ChipCoord>, RouteError> {
        let physical = self.graph.physical_chips(entity)?;
        if !physical.is_empty() {
            return Ok(physical.into_iter().collect());
        }
        Ok(self
            .graph
            .endpoints(entity)?
            .iter()
            .map(Endpoint::chip)
            .collect())
    }

    fn compute_entity_path(
        &self,
        source: EntityId,
        target: EntityId,
    ) -> Result<EntityPath, RouteError> {
        let from = *self
            .graph
            .physical_chips(source)?
            .first()
            .ok_or(RouteError::NoPhysicalEndpoint { entity: source })?;
        let to = match self.graph.physical_chips(target)?.first() {
            Some(&chip) => chip,
            None => self
                .graph
                .endpoints(target)?
                .first()
                .map(Endpoint::chip)
                .ok_or(RouteError::NoPhysicalEndpoint { entity: target })?,
        };
        if !self.topology.is_chip_at(from) {
            return Err(RouteError::InvalidRootChip { chip: from });
        }

        let hops = remove_loops(from, self.path_without_errors(from, to)?);
        let chips: Vec<ChipCoord> = std::iter::once(from)
            .chain(hops.iter().map(|&(_, chip)| chip))
            .collect();

        let source_chips = self.group_chips(source)?;
        let target_chips = self.group_chips(target)?;
        let last_source = chips
            .iter()
            .rposition(|chip| source_chips.contains(chip))
            .unwrap_or(0);
        let first_target = (last_source + 1..chips.len())
            .find(|&i| target_chips.contains(&chips[i]))
            .unwrap_or(chips.len() - 1)
            .max(last_source);

        Ok(EntityPath {
            exit: chips[last_source],
            hops: hops[last_source..first_target].to_vec(),
        })
    }

    /// Follows the longest-dimension-first path from `from` to `to`,
    /// replacing every stretch that crosses a dead link or chip with a
    /// breadth-first detour to the next live chip on the path.
    fn path_without_errors(&self, from: ChipCoord, to: ChipCoord) -> Result<Vec<Hop>, RouteError> {
        let ldf = ldf_hops(self.topology, from, to)?;
        let chips: Vec<ChipCoord> = std::iter::once(from)
            .chain(ldf.iter().map(|&(_, chip)| chip))
            .collect();

        let mut path = Vec::with_capacity(ldf.len());
        let mut i = 0;
        while i < ldf.len() {
            let (direction, next) = ldf[i];
            if self.topology.is_link_at(chips[i], direction) {
                path.push((direction, next));
                i += 1;
                continue;
            }
            let resume = (i + 1..chips.len())
                .find(|&k| self.topology.is_chip_at(chips[k]))
                .ok_or(RouteError::DisconnectedRegion {
                    from: chips[i],
                    to,
                })?;
            path.extend(bfs_path(self.topology, chips[i], chips[resume])?);
            i = resume;
        }
        Ok(path)
    }

    /// Routes every physical source of `partition`, one net each.
    pub fn route_partition(&self, partition: &AppPartition) -> Result<Vec<RoutedNet>, RouteError> {
        for &target in &partition.targets {
            self.graph.endpoints(target)?;
        }
        let sources: Vec<Endpoint> = self
            .graph
            .endpoints(partition.source)?
            .iter()
            .copied()
            .filter(Endpoint::is_physical)
            .collect();
        if sources.is_empty() {
            return Err(RouteError::NoPhysicalEndpoint {
                entity: partition.source,
            });
        }

        sources
            .into_iter()
            .enumerate()
            .map(|(n, source)| {
                self.route_source(partition, source, partition.partition.offset(n as u32))
            })
            .collect()
    }

    fn route_source(
        &self,
        partition: &AppPartition,
        source: Endpoint,
        key: PartitionId,
    ) -> Result<RoutedNet, RouteError> {
        let source_chip = source.chip();
        if !self.topology.is_chip_at(source_chip) {
            return Err(RouteError::InvalidRootChip { chip: source_chip });
        }

        let mut sinks = Vec::new();
        for &target in &partition.targets {
            let endpoints = self.graph.endpoints(target)?;
            sinks.extend(endpoints.iter().copied().filter(|&e| e != source));
        }
        let net = Net::new(key, source, sinks);

        let mut tree = RoutingTree::new(source_chip);
        let mut index = TreeIndex::default();
        index.insert(source_chip, tree.root());

        for &target in &partition.targets {
            if target == partition.source {
                if let Some(local) = self.local_tree(target, source_chip) {
                    graft_local(&mut tree, &mut index, local);
                }
                continue;
            }

            let path = self.entity_path(partition.source, target)?;
            if !index.contains(path.exit) {
                match self
                    .local_tree(partition.source, source_chip)
                    .and_then(|local| local.path_to(path.exit))
                {
                    Some(hops) => {
                        let (anchor, rest) = truncate_at_tree(&index, source_chip, &hops);
                        append_hops(&mut tree, &mut index, anchor, rest)?;
                    }
                    None => {
                        attach_chip(self.topology, &mut tree, &mut index, path.exit, self.radius)?
                    }
                }
            }
            let (anchor, rest) = truncate_at_tree(&index, path.exit, &path.hops);
            append_hops(&mut tree, &mut index, anchor, rest)?;
            if let Some(local) = self.local_tree(target, path.entry()) {
                graft_local(&mut tree, &mut index, local);
            }
        }

        for sink in &net.sinks {
            attach_chip(self.topology, &mut tree, &mut index, sink.chip(), self.radius)?;
        }
        for sink in &net.sinks {
            let node = index
                .get(sink.chip())
                .ok_or(RouteError::DisconnectedRegion {
                    from: source_chip,
                    to: sink.chip(),
                })?;
            tree.append_child(node, Some(sink.route()), Child::Terminal(*sink));
        }

        let (tree, _, report) = avoid_dead_links(self.topology, &tree)?;
        Ok(RoutedNet { net, tree, report })
    }
}

/// Adds the edges of `local` whose child chip is not yet in the tree.
fn graft_local(tree: &mut RoutingTree, index: &mut TreeIndex, local: &LocalTree) {
    if !index.contains(local.root()) {
        return;
    }
    for &(parent, direction, child) in local.edges() {
        if index.contains(child) {
            continue;
        }
        if let Some(parent_node) = index.get(parent) {
            let node = tree.add_child_node(parent_node, Some(Route::Link(direction)), child);
            index.insert(child, node);
        }
    }
}

/// Shortest path over live links from `from` to `to`.
fn bfs_path<T: Topology + ?Sized>(
    topology: &T,
    from: ChipCoord,
    to: ChipCoord,
) -> Result<Vec<Hop>, RouteError> {
    let mut came_from: HashMap<ChipCoord, (Direction, ChipCoord)> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen = BTreeSet::from([from]);
    while let Some(chip) = queue.pop_front() {
        if chip == to {
            let mut hops = Vec::new();
            let mut current = to;
            while current != from {
                let Some(&(direction, previous)) = came_from.get(&current) else {
                    break;
                };
                hops.push((direction, current));
                current = previous;
            }
            hops.reverse();
            return Ok(hops);
        }
        for (direction, next) in topology.live_links(chip) {
            if seen.insert(next) {
                came_from.insert(next, (direction, chip));
                queue.push_back(next);
            }
        }
    }
    Err(RouteError::DisconnectedRegion { from, to })
}

/// Cuts out every loop, so that no chip is visited twice.
fn remove_loops(start: ChipCoord, hops: Vec<Hop>) -> Vec<Hop> {
    let mut chips = vec![start];
    let mut position = HashMap::from([(start, 0usize)]);
    let mut path: Vec<Hop> = Vec::with_capacity(hops.len());
    for hop in hops {
        match position.get(&hop.1).copied() {
            Some(p) => {
                for chip in chips.drain(p + 1..) {
                    position.remove(&chip);
                }
                path.truncate(p);
            }
            None => {
                path.push(hop);
                chips.push(hop.1);
                position.insert(hop.1, chips.len() - 1);
            }
        }
    }
    path
}
