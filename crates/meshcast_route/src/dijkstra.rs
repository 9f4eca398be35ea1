//! Cost-weighted shortest-path routing.
//!
//! An alternative to the shared-tree builder: each destination is reached by
//! its own cheapest path from the source, where the cost of crossing a link
//! grows as the chip behind it runs out of table space and as the link runs
//! out of bandwidth. Paths are recovered by retracing recorded costs rather
//! than storing predecessors.

use crate::data::Net;
use crate::error::RouteError;
use crate::ner::Hop;
use crate::tree::{Child, RoutingTree};
use meshcast_common::{ChipCoord, Direction, Route};
use meshcast_config::DijkstraSettings;
use meshcast_machine::Topology;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Two costs closer than this are considered equal during retrace.
const COST_TOLERANCE: f64 = 1e-9;

/// Coefficients of the link weight
/// `k + l * (1/free_entries - 1/max_entries) + m * (1/free_bandwidth - 1/max_bandwidth)`.
///
/// `k` must be positive and the other coefficients non-negative; the
/// router checks this with [`DijkstraWeights::validate`] when it is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DijkstraWeights {
    /// Constant cost per hop.
    pub k: f64,
    /// Weight of routing table pressure.
    pub l: f64,
    /// Weight of link bandwidth pressure.
    pub m: f64,
    /// Bandwidth a committed route takes from each link it uses.
    pub bandwidth_per_route: f64,
}

impl Default for DijkstraWeights {
    fn default() -> Self {
        Self {
            k: 1.0,
            l: 0.0,
            m: 0.0,
            bandwidth_per_route: 1.0,
        }
    }
}

impl DijkstraWeights {
    /// Checks that every link costs at least `k > 0`, so costs grow strictly
    /// along a path and retrace can always find a predecessor.
    pub fn validate(&self) -> Result<(), RouteError> {
        if !(self.k > 0.0) {
            return Err(RouteError::InvalidWeights {
                reason: "k must be positive",
            });
        }
        if !(self.l >= 0.0 && self.m >= 0.0 && self.bandwidth_per_route >= 0.0) {
            return Err(RouteError::InvalidWeights {
                reason: "l, m and bandwidth_per_route must not be negative",
            });
        }
        Ok(())
    }
}

impl From<&DijkstraSettings> for DijkstraWeights {
    fn from(settings: &DijkstraSettings) -> Self {
        Self {
            k: settings.k,
            l: settings.l,
            m: settings.m,
            bandwidth_per_route: settings.bandwidth_per_route,
        }
    }
}

/// A search state in the Dijkstra priority queue.
#[derive(Debug, Clone)]
struct CostState {
    chip: ChipCoord,
    cost: f64,
}

impl PartialEq for CostState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CostState {}

impl Ord for CostState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; equal costs fall back to the chip so
        // the activation order is deterministic.
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.chip.cmp(&self.chip))
    }
}

impl PartialOrd for CostState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-destination paths from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct DijkstraPaths {
    /// The chip the paths start from.
    pub source: ChipCoord,
    /// For each destination, the hops leading to it from `source`.
    pub paths: Vec<(ChipCoord, Vec<Hop>)>,
}

impl DijkstraPaths {
    /// Merges the paths into one tree rooted at the source.
    ///
    /// Every retrace picks the same predecessor for a given chip, so
    /// overlapping paths share their common prefix.
    pub fn into_tree(self) -> Result<RoutingTree, RouteError> {
        let mut tree = RoutingTree::new(self.source);
        let mut lookup = HashMap::from([(self.source, tree.root())]);
        for (_, hops) in &self.paths {
            let mut last = tree.root();
            for &(direction, chip) in hops {
                last = match lookup.get(&chip) {
                    Some(&node) => {
                        let route = Some(Route::Link(direction));
                        if !tree
                            .children(last)
                            .iter()
                            .any(|&(r, c)| r == route && c == Child::Node(node))
                        {
                            return Err(RouteError::CycleDetected { chip });
                        }
                        node
                    }
                    None => {
                        let node = tree.add_child_node(last, Some(Route::Link(direction)), chip);
                        lookup.insert(chip, node);
                        node
                    }
                };
            }
        }
        Ok(tree)
    }
}

/// A cost-weighted router that remembers the resources earlier routes used.
#[derive(Debug)]
pub struct DijkstraRouter<'a, T: Topology + ?Sized> {
    topology: &'a T,
    weights: DijkstraWeights,
    used_entries: HashMap<ChipCoord, u32>,
    used_bandwidth: HashMap<(ChipCoord, Direction), f64>,
    max_entries: f64,
    max_bandwidth: f64,
}

impl<'a, T: Topology + ?Sized> DijkstraRouter<'a, T> {
    /// Creates a router over `topology` with nothing committed yet.
    ///
    /// Fails with [`RouteError::InvalidWeights`] if `weights` do not pass
    /// [`DijkstraWeights::validate`].
    pub fn new(topology: &'a T, weights: DijkstraWeights) -> Result<Self, RouteError> {
        weights.validate()?;
        let chips = topology.chips();
        let max_entries = chips
            .iter()
            .map(|&chip| topology.router_entries(chip))
            .max()
            .unwrap_or(0) as f64;
        let max_bandwidth = chips
            .iter()
            .flat_map(|&chip| {
                Direction::ALL
                    .into_iter()
                    .map(move |d| topology.link_bandwidth(chip, d))
            })
            .fold(0.0, f64::max);
        Ok(Self {
            topology,
            weights,
            used_entries: HashMap::new(),
            used_bandwidth: HashMap::new(),
            max_entries,
            max_bandwidth,
        })
    }

    /// Returns the cost of leaving `from` over `direction` to reach `to`, or
    /// `None` if the link or the chip behind it has no capacity left.
    fn weight(&self, from: ChipCoord, direction: Direction, to: ChipCoord) -> Option<f64> {
        let mut weight = self.weights.k;
        if self.weights.l != 0.0 {
            let capacity = self.topology.router_entries(to);
            let used = self.used_entries.get(&to).copied().unwrap_or(0);
            let free = capacity.checked_sub(used).filter(|&f| f > 0)?;
            weight += self.weights.l * (1.0 / free as f64 - 1.0 / self.max_entries);
        }
        if self.weights.m != 0.0 {
            let used = self.used_bandwidth.get(&(from, direction)).copied().unwrap_or(0.0);
            let free = self.topology.link_bandwidth(from, direction) - used;
            if free <= 0.0 {
                return None;
            }
            weight += self.weights.m * (1.0 / free - 1.0 / self.max_bandwidth);
        }
        Some(weight)
    }

    /// Finds the cheapest path from `source` to each of `destinations`.
    pub fn route(
        &self,
        source: ChipCoord,
        destinations: &[ChipCoord],
    ) -> Result<DijkstraPaths, RouteError> {
        if !self.topology.is_chip_at(source) {
            return Err(RouteError::InvalidRootChip { chip: source });
        }
        let costs = self.relax(source, destinations)?;
        let paths = destinations
            .iter()
            .map(|&dest| Ok((dest, self.retrace(&costs, source, dest)?)))
            .collect::<Result<_, RouteError>>()?;
        Ok(DijkstraPaths { source, paths })
    }

    /// Activates chips cheapest-first until every destination is activated,
    /// returning the final cost of each activated chip.
    fn relax(
        &self,
        source: ChipCoord,
        destinations: &[ChipCoord],
    ) -> Result<HashMap<ChipCoord, f64>, RouteError> {
        let mut cost: HashMap<ChipCoord, f64> = HashMap::from([(source, 0.0)]);
        let mut activated: HashMap<ChipCoord, f64> = HashMap::new();
        let mut remaining: HashSet<ChipCoord> = destinations.iter().copied().collect();
        let mut open = BinaryHeap::from([CostState {
            chip: source,
            cost: 0.0,
        }]);

        while !remaining.is_empty() {
            let Some(current) = open.pop() else {
                let mut unreached: Vec<_> = remaining.into_iter().collect();
                unreached.sort();
                return Err(RouteError::DisconnectedRegion {
                    from: source,
                    to: unreached[0],
                });
            };
            if activated.contains_key(&current.chip) {
                continue; // Stale entry
            }
            activated.insert(current.chip, current.cost);
            remaining.remove(&current.chip);

            for (direction, neighbour) in self.topology.live_links(current.chip) {
                if activated.contains_key(&neighbour) {
                    continue;
                }
                let Some(w) = self.weight(current.chip, direction, neighbour) else {
                    continue;
                };
                let tentative = current.cost + w;
                if cost.get(&neighbour).map_or(true, |&c| tentative < c) {
                    cost.insert(neighbour, tentative);
                    open.push(CostState {
                        chip: neighbour,
                        cost: tentative,
                    });
                }
            }
        }
        Ok(activated)
    }

    /// Walks back from `dest` to `source`, at each step taking the first
    /// neighbour (in link order) whose cost plus the link weight matches.
    fn retrace(
        &self,
        costs: &HashMap<ChipCoord, f64>,
        source: ChipCoord,
        dest: ChipCoord,
    ) -> Result<Vec<Hop>, RouteError> {
        let inconsistent = |chip| RouteError::InconsistentCostRetrace {
            chip,
            origin: source,
        };
        let mut hops = Vec::new();
        let mut current = dest;
        while current != source {
            if hops.len() > costs.len() {
                return Err(inconsistent(current));
            }
            let current_cost = *costs.get(&current).ok_or_else(|| inconsistent(current))?;
            if current_cost == 0.0 {
                return Err(inconsistent(current));
            }
            let predecessor = Direction::ALL.into_iter().find_map(|direction| {
                let neighbour = self.topology.xy_over_link(current, direction.opposite())?;
                if !self.topology.is_link_at(neighbour, direction)
                    || self.topology.xy_over_link(neighbour, direction) != Some(current)
                {
                    return None;
                }
                let neighbour_cost = *costs.get(&neighbour)?;
                let w = self.weight(neighbour, direction, current)?;
                ((current_cost - w - neighbour_cost).abs() < COST_TOLERANCE)
                    .then_some((direction, neighbour))
            });
            let (direction, neighbour) = predecessor.ok_or_else(|| inconsistent(current))?;
            hops.push((direction, current));
            current = neighbour;
        }
        hops.reverse();
        Ok(hops)
    }

    /// Records the table entries and link bandwidth `tree` consumes.
    pub fn commit(&mut self, tree: &RoutingTree) {
        for (_, node) in tree.breadth_first() {
            let chip = tree.chip(node);
            *self.used_entries.entry(chip).or_insert(0) += 1;
            for &(route, child) in tree.children(node) {
                if let (Some(Route::Link(direction)), Child::Node(_)) = (route, child) {
                    *self.used_bandwidth.entry((chip, direction)).or_insert(0.0) +=
                        self.weights.bandwidth_per_route;
                }
            }
        }
    }

    /// Routes `net`, attaches its terminals, and commits the result.
    pub fn route_net(&mut self, net: &Net) -> Result<RoutingTree, RouteError> {
        for chip in std::iter::once(net.source.chip()).chain(net.sink_chips()) {
            if !self.topology.contains(chip) {
                return Err(RouteError::OffMachine { chip });
            }
        }
        let paths = self.route(net.source.chip(), &net.sink_chips())?;
        let mut tree = paths.into_tree()?;
        let lookup = tree.lookup();
        for sink in &net.sinks {
            let node = *lookup.get(&sink.chip()).ok_or(RouteError::DisconnectedRegion {
                from: net.source.chip(),
                to: sink.chip(),
            })?;
            tree.append_child(node, Some(sink.route()), Child::Terminal(*sink));
        }
        self.commit(&tree);
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endpoint;
    use crate::ids::PartitionId;
    use meshcast_machine::Machine;

    fn c(x: u32, y: u32) -> ChipCoord {
        ChipCoord::new(x, y)
    }

    #[test]
    fn unit_weights_give_shortest_paths() {
        let m = Machine::mesh(6, 6);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let paths = router.route(c(0, 0), &[c(3, 3), c(4, 1)]).unwrap();
        assert_eq!(paths.paths[0].1.len(), 3);
        assert_eq!(paths.paths[1].1.len(), m.vector_length(c(0, 0), c(4, 1)) as usize);
        for (dest, hops) in &paths.paths {
            assert_eq!(hops.last().map(|h| h.1), Some(*dest));
        }
    }

    #[test]
    fn source_as_destination_has_empty_path() {
        let m = Machine::mesh(3, 3);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let paths = router.route(c(1, 1), &[c(1, 1)]).unwrap();
        assert!(paths.paths[0].1.is_empty());
    }

    #[test]
    fn avoids_dead_link() {
        let m = Machine::torus(8, 8).with_dead_link(c(0, 1), Direction::North);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let paths = router.route(c(0, 0), &[c(0, 2)]).unwrap();
        let hops = &paths.paths[0].1;
        assert!(hops.len() >= 2);
        let mut at = c(0, 0);
        for &(d, next) in hops {
            assert!(m.is_link_at(at, d));
            at = next;
        }
        assert_eq!(at, c(0, 2));
    }

    #[test]
    fn unreachable_destination_is_disconnected() {
        let m = Machine::mesh(3, 3)
            .with_dead_link(c(2, 2), Direction::West)
            .with_dead_link(c(2, 2), Direction::SouthWest)
            .with_dead_link(c(2, 2), Direction::South);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let err = router.route(c(0, 0), &[c(2, 2)]).unwrap_err();
        assert_eq!(
            err,
            RouteError::DisconnectedRegion {
                from: c(0, 0),
                to: c(2, 2)
            }
        );
    }

    #[test]
    fn dead_source_is_rejected() {
        let m = Machine::mesh(3, 3).with_dead_chip(c(0, 0));
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        assert!(matches!(
            router.route(c(0, 0), &[c(1, 1)]),
            Err(RouteError::InvalidRootChip { .. })
        ));
    }

    #[test]
    fn zero_cost_retrace_is_inconsistent() {
        let m = Machine::mesh(3, 3);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let costs = HashMap::from([(c(0, 0), 0.0), (c(1, 0), 0.0)]);
        let err = router.retrace(&costs, c(0, 0), c(1, 0)).unwrap_err();
        assert_eq!(
            err,
            RouteError::InconsistentCostRetrace {
                chip: c(1, 0),
                origin: c(0, 0)
            }
        );
    }

    #[test]
    fn mismatched_costs_are_inconsistent() {
        let m = Machine::mesh(3, 3);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let costs = HashMap::from([(c(0, 0), 0.0), (c(1, 0), 5.0)]);
        assert!(matches!(
            router.retrace(&costs, c(0, 0), c(1, 0)),
            Err(RouteError::InconsistentCostRetrace { .. })
        ));
    }

    #[test]
    fn paths_merge_into_tree() {
        let m = Machine::mesh(6, 6);
        let router = DijkstraRouter::new(&m, DijkstraWeights::default()).unwrap();
        let paths = router.route(c(0, 0), &[c(3, 0), c(5, 0)]).unwrap();
        let tree = paths.into_tree().unwrap();
        // Both destinations lie on one straight line east of the source.
        assert_eq!(tree.node_count(), 6);
    }

    #[test]
    fn weights_that_break_ordering_are_rejected() {
        let m = Machine::mesh(3, 3);
        let zero = DijkstraWeights {
            k: 0.0,
            ..DijkstraWeights::default()
        };
        assert_eq!(
            DijkstraRouter::new(&m, zero).err(),
            Some(RouteError::InvalidWeights {
                reason: "k must be positive"
            })
        );
        let negative = DijkstraWeights {
            m: -1.0,
            ..DijkstraWeights::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(RouteError::InvalidWeights { .. })
        ));
        assert!(DijkstraWeights::default().validate().is_ok());
    }

    #[test]
    fn table_pressure_spreads_routes() {
        let m = Machine::mesh(5, 5).with_router_entries(2);
        let weights = DijkstraWeights {
            k: 1.0,
            l: 10.0,
            m: 0.0,
            bandwidth_per_route: 1.0,
        };
        let mut router = DijkstraRouter::new(&m, weights).unwrap();
        let net = |p| {
            Net::new(
                PartitionId::from_raw(p),
                Endpoint::physical(c(0, 2), 1),
                [Endpoint::physical(c(4, 2), 1)],
            )
        };
        let first = router.route_net(&net(0)).unwrap();
        let second = router.route_net(&net(1)).unwrap();
        let first_chips: HashSet<_> = first.chips().into_iter().collect();
        let second_chips: HashSet<_> = second.chips().into_iter().collect();
        // The middle of the first route is full, so the second goes around.
        assert!(first_chips.contains(&c(2, 2)));
        assert!(!second_chips.contains(&c(2, 2)));
        assert_eq!(second.terminals().len(), 1);
    }
}
