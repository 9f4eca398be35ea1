//! Routing tree data structures representing a multicast route.
//!
//! A [`RoutingTree`] describes how one net's traffic spreads from its source
//! chip to all of its sinks. It is an arena of [`TreeNode`]s indexed by
//! [`NodeId`]; each node owns an ordered list of child edges, and each edge
//! carries the route the packet leaves the parent by. Parent pointers are
//! never stored, so a node has at most one parent exactly when it appears in
//! at most one child list. Nodes detached from the tree stay in the arena
//! but are no longer reachable from the root.

use crate::data::Endpoint;
use crate::ids::NodeId;
use meshcast_common::{ChipCoord, Route};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// What a tree edge leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Child {
    /// Routing continues on another chip.
    Node(NodeId),
    /// Traffic is delivered to an endpoint.
    Terminal(Endpoint),
}

/// A child edge: the route leaving the parent (or `None` when the endpoint
/// implies it) and what it leads to.
pub type ChildEdge = (Option<Route>, Child);

/// One chip on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// The chip this node sits on.
    pub chip: ChipCoord,
    /// Outgoing edges in insertion order.
    pub children: Vec<ChildEdge>,
}

/// One step of a breadth-first [`RoutingTree::traverse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalStep {
    /// The route the parent used to reach this node; `None` at the root.
    pub arrival: Option<Route>,
    /// The node visited.
    pub node: NodeId,
    /// The node's chip.
    pub chip: ChipCoord,
    /// Every concrete route leaving this node.
    pub outgoing: BTreeSet<Route>,
}

/// A routing solution for a single net, rooted at the source chip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl RoutingTree {
    /// Creates a tree holding only a root node on `chip`.
    pub fn new(chip: ChipCoord) -> Self {
        Self {
            nodes: vec![TreeNode {
                chip,
                children: Vec::new(),
            }],
            root: NodeId::from_raw(0),
        }
    }

    /// Returns the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the chip of the root node.
    pub fn root_chip(&self) -> ChipCoord {
        self.chip(self.root)
    }

    /// Returns the chip of `node`.
    pub fn chip(&self, node: NodeId) -> ChipCoord {
        self.nodes[node.index()].chip
    }

    /// Allocates a node on `chip` that is not yet attached to anything.
    pub fn add_node(&mut self, chip: ChipCoord) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            chip,
            children: Vec::new(),
        });
        id
    }

    /// Appends an edge from `parent` to `child`.
    pub fn append_child(&mut self, parent: NodeId, route: Option<Route>, child: Child) {
        self.nodes[parent.index()].children.push((route, child));
    }

    /// Allocates a node on `chip` and attaches it under `parent`.
    pub fn add_child_node(&mut self, parent: NodeId, route: Option<Route>, chip: ChipCoord) -> NodeId {
        let id = self.add_node(chip);
        self.append_child(parent, route, Child::Node(id));
        id
    }

    /// Removes the first edge from `parent` to `child`, returning its route.
    ///
    /// Returns `None` if `parent` has no such edge.
    pub fn remove_child(&mut self, parent: NodeId, child: &Child) -> Option<Option<Route>> {
        let children = &mut self.nodes[parent.index()].children;
        let position = children.iter().position(|(_, c)| c == child)?;
        Some(children.remove(position).0)
    }

    /// Returns the edges leaving `node` in insertion order.
    pub fn children(&self, node: NodeId) -> &[ChildEdge] {
        &self.nodes[node.index()].children
    }

    /// Returns `true` if `node` has no outgoing edges.
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node.index()].children.is_empty()
    }

    /// Returns every node reachable from the root in breadth-first order,
    /// each with the route its parent reached it by.
    pub fn breadth_first(&self) -> Vec<(Option<Route>, NodeId)> {
        let mut visited = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((None, self.root));
        visited[self.root.index()] = true;

        while let Some((arrival, node)) = queue.pop_front() {
            order.push((arrival, node));
            for &(route, child) in self.children(node) {
                if let Child::Node(next) = child {
                    if !visited[next.index()] {
                        visited[next.index()] = true;
                        queue.push_back((route, next));
                    }
                }
            }
        }
        order
    }

    /// Walks the reachable tree breadth-first, reporting for each node the
    /// arrival route and the set of concrete outgoing routes.
    ///
    /// Edges whose route is `None` are left out of the outgoing set.
    pub fn traverse(&self) -> Vec<TraversalStep> {
        self.breadth_first()
            .into_iter()
            .map(|(arrival, node)| TraversalStep {
                arrival,
                node,
                chip: self.chip(node),
                outgoing: self.children(node).iter().filter_map(|(r, _)| *r).collect(),
            })
            .collect()
    }

    /// Returns the number of nodes reachable from the root.
    pub fn node_count(&self) -> usize {
        self.breadth_first().len()
    }

    /// Returns the chips of all reachable nodes in breadth-first order.
    pub fn chips(&self) -> Vec<ChipCoord> {
        self.breadth_first()
            .into_iter()
            .map(|(_, node)| self.chip(node))
            .collect()
    }

    /// Returns every terminal reachable from the root with the chip it
    /// hangs off.
    pub fn terminals(&self) -> Vec<(ChipCoord, Option<Route>, Endpoint)> {
        let mut terminals = Vec::new();
        for (_, node) in self.breadth_first() {
            for &(route, child) in self.children(node) {
                if let Child::Terminal(endpoint) = child {
                    terminals.push((self.chip(node), route, endpoint));
                }
            }
        }
        terminals
    }

    /// Maps each reachable chip to its node.
    pub fn lookup(&self) -> HashMap<ChipCoord, NodeId> {
        self.breadth_first()
            .into_iter()
            .map(|(_, node)| (self.chip(node), node))
            .collect()
    }

    /// Finds the node holding an edge to `child`, searching the whole arena.
    pub fn find_parent(&self, child: NodeId) -> Option<NodeId> {
        let target = Child::Node(child);
        self.nodes
            .iter()
            .position(|n| n.children.iter().any(|(_, c)| *c == target))
            .map(|i| NodeId::from_raw(i as u32))
    }

    /// Returns `node` and every node below it.
    pub fn subtree_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        let mut nodes = Vec::new();
        visited[node.index()] = true;
        while let Some(current) = stack.pop() {
            nodes.push(current);
            for &(_, child) in self.children(current) {
                if let Child::Node(next) = child {
                    if !visited[next.index()] {
                        visited[next.index()] = true;
                        stack.push(next);
                    }
                }
            }
        }
        nodes
    }

    /// Returns the number of root-to-leaf hops on the longest branch.
    pub fn depth(&self) -> usize {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut deepest = 0;
        for (_, node) in self.breadth_first() {
            for &(_, child) in self.children(node) {
                if let Child::Node(next) = child {
                    depth[next.index()] = depth[node.index()] + 1;
                    deepest = deepest.max(depth[next.index()]);
                }
            }
        }
        deepest
    }
}
