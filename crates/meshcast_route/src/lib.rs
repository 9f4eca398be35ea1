//! Multicast route synthesis for two-dimensional six-link chip meshes.
//!
//! This crate takes multicast traffic (a source endpoint and its sinks, or
//! an application graph of communicating entities) and produces
//! [`RoutingTables`]: one entry per chip and partition naming the links and
//! cores a packet is copied to.
//!
//! # Pipeline
//!
//! 1. **Build**: each net gets a routing tree, grown by the
//!    neighbour-exploring builder ([`ner_net`]) or by the cost-weighted
//!    router ([`DijkstraRouter`])
//! 2. **Repair**: dead chips are spliced out and edges over dead links are
//!    rerouted ([`avoid_dead_links`])
//! 3. **Flatten**: each tree becomes per-chip entries ([`tree_entries`])
//! 4. **Merge**: entries from every net are inserted into one table set,
//!    rejecting conflicting entries under the same partition
//!
//! Neighbour-exploring nets are routed in parallel. Cost-weighted nets are
//! routed one after another because each committed net changes the link
//! weights seen by the next.
//!
//! # Usage
//!
//! ```ignore
//! use meshcast_route::{route_nets, RouterOptions};
//!
//! let tables = route_nets(&machine, &nets, &RouterOptions::default(), &sink)?;
//! println!("{} entries", tables.entry_count());
//! ```

#![warn(missing_docs)]

pub mod app;
pub mod data;
pub mod dijkstra;
pub mod error;
pub mod fault;
pub mod ids;
pub mod ner;
pub mod table;
pub mod tree;

pub use app::{AppGraph, AppPartition, AppRouter, EntityPath, LocalTree, RoutedNet};
pub use data::{Endpoint, Net};
pub use dijkstra::{DijkstraPaths, DijkstraRouter, DijkstraWeights};
pub use error::RouteError;
pub use fault::{avoid_dead_links, copy_and_disconnect, FaultReport};
pub use ids::{EntityId, NodeId, PartitionAllocator, PartitionId};
pub use ner::{ner_net, ner_tree, DEFAULT_RADIUS};
pub use table::{
    reachable_endpoints, tree_entries, RoutingTableEntry, RoutingTables, SharedRoutingTables,
};
pub use tree::{Child, RoutingTree, TraversalStep};

use meshcast_config::{Algorithm, MeshcastConfig};
use meshcast_diagnostics::{Category, Diagnostic, DiagnosticCode, DiagnosticSink, Label};
use meshcast_machine::Topology;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

const REROUTED_LINK: DiagnosticCode = DiagnosticCode::new(Category::Fault, 101);
const SPLICED_CHIP: DiagnosticCode = DiagnosticCode::new(Category::Fault, 102);
const OVERFULL_CHIP: DiagnosticCode = DiagnosticCode::new(Category::Warning, 101);
const ROUTING_SUMMARY: DiagnosticCode = DiagnosticCode::new(Category::Note, 101);

/// Which router to run and how.
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions<'c> {
    /// The tree builder.
    pub algorithm: Algorithm,
    /// Anchor search radius of the neighbour-exploring builder.
    pub radius: u32,
    /// Link weight coefficients of the cost-weighted router.
    pub weights: DijkstraWeights,
    /// Checked before each net; once set, routing stops with
    /// [`RouteError::Cancelled`].
    pub cancel: Option<&'c AtomicBool>,
}

impl Default for RouterOptions<'_> {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Ner,
            radius: DEFAULT_RADIUS,
            weights: DijkstraWeights::default(),
            cancel: None,
        }
    }
}

impl<'c> RouterOptions<'c> {
    /// Takes the router settings from a loaded configuration.
    pub fn from_config(config: &MeshcastConfig) -> Self {
        Self {
            algorithm: config.router.algorithm,
            radius: config.router.radius,
            weights: DijkstraWeights::from(&config.dijkstra),
            cancel: None,
        }
    }

    /// Polls `flag` for cancellation between nets.
    pub fn with_cancel(mut self, flag: &'c AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancelled(&self) -> Result<(), RouteError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(RouteError::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Routes every net and returns the merged routing tables.
///
/// The first failure aborts routing and is both returned and reported to
/// `sink`. Repairs made around dead chips and links are reported as
/// warnings; a summary note is emitted on success.
pub fn route_nets<T: Topology + ?Sized>(
    topology: &T,
    nets: &[Net],
    options: &RouterOptions<'_>,
    sink: &DiagnosticSink,
) -> Result<RoutingTables, RouteError> {
    let result = match options.algorithm {
        Algorithm::Ner => route_ner(topology, nets, options, sink),
        Algorithm::Dijkstra => route_dijkstra(topology, nets, options),
    };
    finish(topology, result.map(|tables| (tables, nets.len())), sink)
}

fn route_ner<T: Topology + ?Sized>(
    topology: &T,
    nets: &[Net],
    options: &RouterOptions<'_>,
    sink: &DiagnosticSink,
) -> Result<RoutingTables, RouteError> {
    let shared = SharedRoutingTables::new();
    nets.par_iter().try_for_each(|net| {
        options.check_cancelled()?;
        let (tree, _) = ner_net(topology, net, options.radius)?;
        let (tree, _, report) = avoid_dead_links(topology, &tree)?;
        report_faults(net.partition, &report, sink);
        shared.merge_net(net.partition, tree_entries(&tree, Some(&net.source)))
    })?;
    Ok(shared.into_inner())
}

fn route_dijkstra<T: Topology + ?Sized>(
    topology: &T,
    nets: &[Net],
    options: &RouterOptions<'_>,
) -> Result<RoutingTables, RouteError> {
    let mut router = DijkstraRouter::new(topology, options.weights)?;
    let mut tables = RoutingTables::new();
    for net in nets {
        options.check_cancelled()?;
        let tree = router.route_net(net)?;
        tables.add_tree(net.partition, &tree, Some(&net.source))?;
    }
    Ok(tables)
}

/// Routes application partitions over `graph` and returns the merged
/// routing tables.
///
/// Partitions are routed in parallel. Each one uses as many consecutive
/// partition ids as its source entity has core endpoints, starting at
/// [`AppPartition::partition`]; see [`PartitionAllocator`].
pub fn route_application<T: Topology + ?Sized>(
    topology: &T,
    graph: &AppGraph,
    partitions: &[AppPartition],
    options: &RouterOptions<'_>,
    sink: &DiagnosticSink,
) -> Result<RoutingTables, RouteError> {
    let router = AppRouter::new(topology, graph, options.radius);
    let shared = SharedRoutingTables::new();
    let routed = partitions
        .par_iter()
        .map(|partition| -> Result<usize, RouteError> {
            options.check_cancelled()?;
            let nets = router.route_partition(partition)?;
            for net in &nets {
                report_faults(net.net.partition, &net.report, sink);
                shared.merge_net(
                    net.net.partition,
                    tree_entries(&net.tree, Some(&net.net.source)),
                )?;
            }
            Ok(nets.len())
        })
        .try_reduce(|| 0, |a, b| Ok(a + b));
    finish(topology, routed.map(|count| (shared.into_inner(), count)), sink)
}

fn report_faults(partition: PartitionId, report: &FaultReport, sink: &DiagnosticSink) {
    for &(parent, child) in &report.broken_links {
        sink.emit(
            Diagnostic::warning(
                REROUTED_LINK,
                format!("link from {parent} to {child} is down; rerouted"),
            )
            .at(parent)
            .with_label(Label::new(child, "far end of dead link"))
            .with_note(format!("partition {partition}")),
        );
    }
    for &chip in &report.dead_chips {
        sink.emit(
            Diagnostic::warning(SPLICED_CHIP, format!("chip {chip} is dead; spliced out of the tree"))
                .at(chip)
                .with_note(format!("partition {partition}")),
        );
    }
}

fn finish<T: Topology + ?Sized>(
    topology: &T,
    result: Result<(RoutingTables, usize), RouteError>,
    sink: &DiagnosticSink,
) -> Result<RoutingTables, RouteError> {
    let (tables, routed) = match result {
        Ok(done) => done,
        Err(err) => {
            let mut diag = Diagnostic::error(err.code(), err.to_string());
            if let Some(chip) = err.chip() {
                diag = diag.at(chip);
            }
            sink.emit(diag);
            return Err(err);
        }
    };

    for (chip, count) in tables.overfull_chips(topology) {
        sink.emit(
            Diagnostic::warning(
                OVERFULL_CHIP,
                format!(
                    "chip {chip} needs {count} entries but holds {}",
                    topology.router_entries(chip)
                ),
            )
            .at(chip)
            .with_help("raise `router_entries` or route with the cost-weighted router"),
        );
    }
    sink.emit(Diagnostic::note(
        ROUTING_SUMMARY,
        format!(
            "routed {routed} net(s): {} entries on {} chips, at most {} per chip",
            tables.entry_count(),
            tables.chip_count(),
            tables.max_entries_per_chip()
        ),
    ));
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshcast_common::ChipCoord;
    use meshcast_diagnostics::Severity;
    use meshcast_machine::Machine;

    fn c(x: u32, y: u32) -> ChipCoord {
        ChipCoord::new(x, y)
    }

    fn star_nets() -> Vec<Net> {
        (0..4)
            .map(|i| {
                Net::new(
                    PartitionId::from_raw(i),
                    Endpoint::physical(c(i, 0), 1),
                    [Endpoint::physical(c(3, 3), 1), Endpoint::physical(c(0, 3), 2)],
                )
            })
            .collect()
    }

    #[test]
    fn options_from_config() {
        let config = meshcast_config::load_config_from_str(
            r#"
            [machine]
            width = 4
            height = 4

            [router]
            algorithm = "dijkstra"
            radius = 5

            [dijkstra]
            l = 2.5
            "#,
        )
        .unwrap();
        let options = RouterOptions::from_config(&config);
        assert_eq!(options.algorithm, Algorithm::Dijkstra);
        assert_eq!(options.radius, 5);
        assert_eq!(options.weights.l, 2.5);
        assert_eq!(options.weights.k, 1.0);
        assert!(options.cancel.is_none());
    }

    #[test]
    fn both_algorithms_route_the_same_nets() {
        let m = Machine::mesh(4, 4);
        let nets = star_nets();
        for algorithm in [Algorithm::Ner, Algorithm::Dijkstra] {
            let sink = DiagnosticSink::new();
            let options = RouterOptions {
                algorithm,
                ..RouterOptions::default()
            };
            let tables = route_nets(&m, &nets, &options, &sink).unwrap();
            for net in &nets {
                let reached = reachable_endpoints(&m, &tables, net.partition, &net.source);
                assert_eq!(reached.len(), 2, "{algorithm:?} net {}", net.partition);
            }
            assert!(!sink.has_errors());
            let notes = sink.take_all();
            assert!(notes.iter().any(|d| d.code == ROUTING_SUMMARY));
        }
    }

    #[test]
    fn cancelled_before_start() {
        let m = Machine::mesh(4, 4);
        let flag = AtomicBool::new(true);
        let sink = DiagnosticSink::new();
        let options = RouterOptions::default().with_cancel(&flag);
        let err = route_nets(&m, &star_nets(), &options, &sink).unwrap_err();
        assert_eq!(err, RouteError::Cancelled);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.diagnostics()[0].code.to_string(), "E309");
    }

    #[test]
    fn invalid_weights_are_reported() {
        let m = Machine::mesh(4, 4);
        let options = RouterOptions {
            algorithm: Algorithm::Dijkstra,
            weights: DijkstraWeights {
                k: 0.0,
                ..DijkstraWeights::default()
            },
            ..RouterOptions::default()
        };
        let sink = DiagnosticSink::new();
        let err = route_nets(&m, &star_nets(), &options, &sink).unwrap_err();
        assert!(matches!(err, RouteError::InvalidWeights { .. }));
        assert_eq!(sink.diagnostics()[0].code.to_string(), "E310");
    }

    #[test]
    fn failures_are_reported_at_their_chip() {
        let m = Machine::mesh(4, 4).with_dead_chip(c(1, 1));
        let nets = vec![Net::new(
            PartitionId::from_raw(0),
            Endpoint::physical(c(1, 1), 1),
            [Endpoint::physical(c(3, 3), 1)],
        )];
        let sink = DiagnosticSink::new();
        let err = route_nets(&m, &nets, &RouterOptions::default(), &sink).unwrap_err();
        assert_eq!(err, RouteError::InvalidRootChip { chip: c(1, 1) });
        let diags = sink.take_all();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].chip, Some(c(1, 1)));
    }

    #[test]
    fn repairs_are_reported_as_warnings() {
        let m = Machine::torus(8, 8).with_dead_link(c(0, 1), meshcast_common::Direction::North);
        let nets = vec![Net::new(
            PartitionId::from_raw(0),
            Endpoint::physical(c(0, 0), 1),
            [Endpoint::physical(c(0, 2), 1)],
        )];
        let sink = DiagnosticSink::new();
        route_nets(&m, &nets, &RouterOptions::default(), &sink).unwrap();
        let repairs: Vec<_> = sink
            .diagnostics()
            .into_iter()
            .filter(|d| d.code == REROUTED_LINK)
            .collect();
        assert_eq!(repairs.len(), 1);
        assert_eq!(repairs[0].chip, Some(c(0, 1)));
        assert_eq!(repairs[0].labels, vec![Label::new(c(0, 2), "far end of dead link")]);
    }

    #[test]
    fn overfull_chips_are_flagged() {
        let m = Machine::mesh(4, 4).with_router_entries(2);
        let nets = star_nets();
        let sink = DiagnosticSink::new();
        let tables = route_nets(&m, &nets, &RouterOptions::default(), &sink).unwrap();
        assert!(tables.max_entries_per_chip() > 2);
        assert!(sink.warning_count() > 0);
        assert!(sink.diagnostics().iter().any(|d| d.code == OVERFULL_CHIP));
    }
}
