//! Dead chip and dead link avoidance.
//!
//! Trees are built as if every link worked. This pass copies a tree while
//! dropping dead chips and cutting every edge whose link is down, then
//! reconnects each cut-off subtree to the rest of the tree with a best-first
//! search over live links.

use crate::error::RouteError;
use crate::ids::NodeId;
use crate::ner::Hop;
use crate::tree::{Child, RoutingTree};
use meshcast_common::{ChipCoord, Direction, Route};
use meshcast_machine::Topology;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// What fault avoidance changed in a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultReport {
    /// `(parent, child)` edges that crossed a dead link and were rerouted.
    pub broken_links: Vec<(ChipCoord, ChipCoord)>,
    /// Dead chips that were spliced out of the tree.
    pub dead_chips: Vec<ChipCoord>,
    /// Tree nodes added by the repairs.
    pub added_hops: usize,
    /// Nodes removed because every branch below them was rerouted.
    pub pruned_nodes: usize,
}

impl FaultReport {
    /// Returns `true` if the tree needed no repair.
    pub fn is_clean(&self) -> bool {
        self.broken_links.is_empty() && self.dead_chips.is_empty()
    }
}

/// A copied tree whose broken edges have been cut.
#[derive(Debug, Clone)]
pub struct DisconnectedTree {
    /// The copy; cut-off subtrees are in the arena but unreachable.
    pub tree: RoutingTree,
    /// Every surviving chip, reachable or not, with its node.
    pub lookup: HashMap<ChipCoord, NodeId>,
    /// `(parent, child)` pairs whose link was found dead.
    pub broken_links: Vec<(ChipCoord, ChipCoord)>,
    /// Chips dropped because they are dead.
    pub dead_chips: Vec<ChipCoord>,
}

/// Copies `tree` breadth-first, splicing out dead chips and cutting edges
/// that cross dead links.
///
/// The child nodes of a dead chip are re-homed onto its parent. A terminal
/// on a dead chip cannot be delivered anywhere else and fails with
/// [`RouteError::DisconnectedRegion`]. A cut edge's child keeps its own
/// subtree but is only reachable through the returned lookup.
pub fn copy_and_disconnect<T: Topology + ?Sized>(
    topology: &T,
    tree: &RoutingTree,
) -> Result<DisconnectedTree, RouteError> {
    let root_chip = tree.root_chip();
    if !topology.is_chip_at(root_chip) {
        return Err(RouteError::InvalidRootChip { chip: root_chip });
    }

    let mut copy = RoutingTree::new(root_chip);
    let mut lookup = HashMap::from([(root_chip, copy.root())]);
    let mut broken_links = Vec::new();
    let mut dead_chips = Vec::new();

    // (original node whose children to copy, copied node to hang them off)
    let mut queue = VecDeque::from([(tree.root(), copy.root())]);
    while let Some((old, new_parent)) = queue.pop_front() {
        let parent_chip = copy.chip(new_parent);
        let old_is_dead = !topology.is_chip_at(tree.chip(old));
        for &(route, child) in tree.children(old) {
            let old_child = match child {
                Child::Terminal(_) if old_is_dead => {
                    return Err(RouteError::DisconnectedRegion {
                        from: root_chip,
                        to: tree.chip(old),
                    });
                }
                Child::Terminal(_) => {
                    copy.append_child(new_parent, route, child);
                    continue;
                }
                Child::Node(node) => node,
            };

            let chip = tree.chip(old_child);
            if !topology.is_chip_at(chip) {
                dead_chips.push(chip);
                queue.push_back((old_child, new_parent));
                continue;
            }
            if lookup.contains_key(&chip) {
                return Err(RouteError::CycleDetected { chip });
            }

            let new_child = copy.add_node(chip);
            lookup.insert(chip, new_child);
            if link_lands_on(topology, parent_chip, route, chip) {
                copy.append_child(new_parent, route, Child::Node(new_child));
            } else {
                broken_links.push((parent_chip, chip));
            }
            queue.push_back((old_child, new_child));
        }
    }

    Ok(DisconnectedTree {
        tree: copy,
        lookup,
        broken_links,
        dead_chips,
    })
}

fn link_lands_on<T: Topology + ?Sized>(
    topology: &T,
    from: ChipCoord,
    route: Option<Route>,
    to: ChipCoord,
) -> bool {
    match route {
        Some(Route::Link(direction)) => {
            topology.is_link_at(from, direction)
                && topology.xy_over_link(from, direction) == Some(to)
        }
        _ => false,
    }
}

/// A search state in the best-first priority queue.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SearchState {
    /// The chip being explored.
    chip: ChipCoord,
    /// Hops from the chip to the guide target.
    estimate: u32,
    /// Discovery order, breaking estimate ties first-come first-served.
    sequence: u64,
}

impl Ord for SearchState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default)
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for SearchState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Searches backward from `start` for a chip satisfying `is_goal`, guided by
/// the distance to `guide`.
///
/// A chip is expanded by admitting each neighbour whose link towards it is
/// live, so the result can be followed forward from the goal. Returns the
/// goal chip and the hops leading from it to `start`.
pub fn a_star<T, F>(
    topology: &T,
    start: ChipCoord,
    guide: ChipCoord,
    is_goal: F,
) -> Result<(ChipCoord, Vec<Hop>), RouteError>
where
    T: Topology + ?Sized,
    F: Fn(ChipCoord) -> bool,
{
    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<ChipCoord, Hop> = HashMap::new();
    let mut visited = HashSet::from([start]);
    let mut sequence = 0u64;

    open.push(SearchState {
        chip: start,
        estimate: topology.vector_length(start, guide),
        sequence,
    });

    while let Some(current) = open.pop() {
        if is_goal(current.chip) {
            return Ok((current.chip, reconstruct_path(&came_from, current.chip, start)));
        }
        for direction in Direction::ALL {
            let Some(neighbour) = topology.xy_over_link(current.chip, direction.opposite()) else {
                continue;
            };
            if visited.contains(&neighbour) || !topology.is_link_at(neighbour, direction) {
                continue;
            }
            visited.insert(neighbour);
            came_from.insert(neighbour, (direction, current.chip));
            sequence += 1;
            open.push(SearchState {
                chip: neighbour,
                estimate: topology.vector_length(neighbour, guide),
                sequence,
            });
        }
    }

    Err(RouteError::DisconnectedRegion {
        from: start,
        to: guide,
    })
}

/// Follows `came_from` forward from the goal back to the search start.
fn reconstruct_path(came_from: &HashMap<ChipCoord, Hop>, goal: ChipCoord, start: ChipCoord) -> Vec<Hop> {
    let mut path = Vec::new();
    let mut current = goal;
    while current != start {
        match came_from.get(&current) {
            Some(&(direction, next)) => {
                path.push((direction, next));
                current = next;
            }
            None => break,
        }
    }
    path
}

/// Rebuilds `tree` so that it only uses live chips and links.
///
/// Returns the repaired tree, a lookup from every chip in it to its node,
/// and a report of what was changed. Fails with
/// [`RouteError::DisconnectedRegion`] when a cut-off subtree has no live path
/// back to the rest of the tree.
pub fn avoid_dead_links<T: Topology + ?Sized>(
    topology: &T,
    tree: &RoutingTree,
) -> Result<(RoutingTree, HashMap<ChipCoord, NodeId>, FaultReport), RouteError> {
    let DisconnectedTree {
        mut tree,
        mut lookup,
        broken_links,
        dead_chips,
    } = copy_and_disconnect(topology, tree)?;

    let mut added_hops = 0;
    let mut detached_from = Vec::new();
    for &(parent, child) in &broken_links {
        let child_node = lookup[&child];
        let subtree: HashSet<NodeId> = tree.subtree_nodes(child_node).into_iter().collect();
        let (goal, hops) = a_star(topology, child, parent, |chip| {
            lookup.get(&chip).is_some_and(|node| !subtree.contains(node))
        })?;
        added_hops += splice(&mut tree, &mut lookup, &subtree, goal, &hops, &mut detached_from)?;
    }

    // Parents of cut edges, and nodes a detour took a child away from, may
    // now forward nowhere.
    let mut pruned_nodes = 0;
    let candidates = broken_links
        .iter()
        .map(|&(parent, _)| parent)
        .chain(detached_from);
    for chip in candidates {
        pruned_nodes += prune_dangling(&mut tree, &mut lookup, chip);
    }

    Ok((
        tree,
        lookup,
        FaultReport {
            broken_links,
            dead_chips,
            added_hops,
            pruned_nodes,
        },
    ))
}

/// Removes the node on `chip` if it forwards nowhere, then its parent if
/// that leaves the parent forwarding nowhere, and so on up to the root.
///
/// Sink chips keep their terminals, so they are never leaves and never
/// removed.
fn prune_dangling(
    tree: &mut RoutingTree,
    lookup: &mut HashMap<ChipCoord, NodeId>,
    chip: ChipCoord,
) -> usize {
    let Some(&start) = lookup.get(&chip) else {
        return 0;
    };
    let mut node = start;
    let mut pruned = 0;
    while node != tree.root() && tree.is_leaf(node) {
        let Some(parent) = tree.find_parent(node) else {
            break;
        };
        tree.remove_child(parent, &Child::Node(node));
        lookup.remove(&tree.chip(node));
        pruned += 1;
        node = parent;
    }
    pruned
}

/// Threads `hops` from the node on `goal` down to the cut-off subtree root,
/// which is the final hop. Returns how many nodes were created; the chips
/// of parents that subtree nodes were detached from go to `detached_from`.
fn splice(
    tree: &mut RoutingTree,
    lookup: &mut HashMap<ChipCoord, NodeId>,
    subtree: &HashSet<NodeId>,
    goal: ChipCoord,
    hops: &[Hop],
    detached_from: &mut Vec<ChipCoord>,
) -> Result<usize, RouteError> {
    let Some((&(last_direction, child), path)) = hops.split_last() else {
        return Ok(0);
    };
    let mut last = lookup[&goal];
    let mut created = 0;

    for &(direction, chip) in path {
        let route = Some(Route::Link(direction));
        match lookup.get(&chip).copied() {
            Some(node) if subtree.contains(&node) => {
                if let Some(parent) = tree.find_parent(node) {
                    tree.remove_child(parent, &Child::Node(node));
                    detached_from.push(tree.chip(parent));
                }
                tree.append_child(last, route, Child::Node(node));
                last = node;
            }
            Some(_) => return Err(RouteError::CycleDetected { chip }),
            None => {
                last = tree.add_child_node(last, route, chip);
                lookup.insert(chip, last);
                created += 1;
            }
        }
    }

    tree.append_child(last, Some(Route::Link(last_direction)), Child::Node(lookup[&child]));
    Ok(created)
}
