//! # Network Builder
//!
//! Turns raw 3D line segments (beam axes drawn by hand) into a deduplicated
//! node set and an undirected edge list.
//!
//! ## Algorithm
//!
//! Each endpoint is compared against every node created so far. If one lies
//! strictly closer than the merge tolerance, the endpoint reuses that node;
//! otherwise a new node is created with the next dense id. A line whose two
//! endpoints resolve to the same node adds no edge.
//!
//! The scan is O(L·N) over lines and nodes, which is fine for hand-drawn
//! trusses of a few dozen members.
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::Point3;
//! use truss_core::config::NetworkConfig;
//! use truss_core::network::{build_network, LineSegment};
//!
//! let lines = vec![
//!     LineSegment::new("a", Point3::new(0.0, 0.0, 0.0), Point3::new(1000.0, 0.0, 0.0)),
//!     LineSegment::new("b", Point3::new(1000.05, 0.0, 0.0), Point3::new(1000.0, 800.0, 0.0)),
//! ];
//!
//! let (network, report) = build_network(&lines, &NetworkConfig::default()).unwrap();
//! assert_eq!(network.node_count(), 3);
//! assert_eq!(network.edge_count(), 2);
//! assert_eq!(network.degree(1), 2);
//! assert!(report.is_clean());
//! ```

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{NetworkConfig, PositionPolicy};
use crate::errors::{TrussError, TrussResult};
use crate::report::{Stage, StageReport};

/// One hand-drawn beam axis, endpoints only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    /// Identifier of the source curve in the drawing
    #[serde(rename = "id", default)]
    pub source_id: String,
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl LineSegment {
    pub fn new(source_id: impl Into<String>, start: Point3<f64>, end: Point3<f64>) -> Self {
        LineSegment {
            source_id: source_id.into(),
            start,
            end,
        }
    }

    fn is_finite(&self) -> bool {
        self.start.coords.iter().chain(self.end.coords.iter()).all(|c| c.is_finite())
    }
}

/// A joint in the truss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub position: Point3<f64>,
    /// Number of incident edges
    pub degree: usize,
}

/// A beam between two distinct nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Dense index in insertion order
    pub id: usize,
    pub start: usize,
    pub end: usize,
    /// Source line the edge came from
    #[serde(default)]
    pub source_id: String,
}

impl Edge {
    /// Node pair with the smaller id first
    pub fn key(&self) -> (usize, usize) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// Label used in reports and geometry names ("3-7")
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }

    pub fn touches(&self, node_id: usize) -> bool {
        self.start == node_id || self.end == node_id
    }

    /// The node at the other end, if `node_id` is one of the ends
    pub fn other(&self, node_id: usize) -> Option<usize> {
        if self.start == node_id {
            Some(self.end)
        } else if self.end == node_id {
            Some(self.start)
        } else {
            None
        }
    }
}

/// Counts of joints by connectivity, as reported after extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JointSummary {
    /// Degree 1
    pub end: usize,
    /// Degree 2
    pub two_way: usize,
    /// Degree 3 and above
    pub multi_way: usize,
    /// Degree 0 (only possible from degenerate lines)
    #[serde(default)]
    pub isolated: usize,
}

/// Finalized node/edge graph. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Network {
    /// Assemble a network from parts, checking that every edge is valid
    /// and recomputing degrees.
    pub fn from_parts(positions: Vec<Point3<f64>>, edges: Vec<(usize, usize)>) -> TrussResult<Self> {
        let edges = edges
            .into_iter()
            .enumerate()
            .map(|(id, (start, end))| Edge {
                id,
                start,
                end,
                source_id: String::new(),
            })
            .collect();
        Network::assemble(positions, edges)
    }

    pub(crate) fn assemble(positions: Vec<Point3<f64>>, edges: Vec<Edge>) -> TrussResult<Self> {
        let node_count = positions.len();
        for edge in &edges {
            if edge.start >= node_count || edge.end >= node_count {
                return Err(TrussError::invalid_input(
                    "edges",
                    edge.label(),
                    format!("Edge references a node outside 0..{}", node_count),
                ));
            }
            if edge.start == edge.end {
                return Err(TrussError::invalid_input("edges", edge.label(), "Edge endpoints must be distinct"));
            }
        }

        let mut degrees = vec![0usize; node_count];
        for edge in &edges {
            degrees[edge.start] += 1;
            degrees[edge.end] += 1;
        }

        let nodes = positions
            .into_iter()
            .zip(degrees)
            .enumerate()
            .map(|(id, (position, degree))| Node { id, position, degree })
            .collect();

        Ok(Network { nodes, edges })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: usize) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: usize) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Degree of a node (0 for unknown ids)
    pub fn degree(&self, id: usize) -> usize {
        self.nodes.get(id).map_or(0, |n| n.degree)
    }

    /// Edges incident to a node, in edge order
    pub fn incident_edges(&self, node_id: usize) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.touches(node_id))
    }

    /// Neighbour node ids, one entry per incident edge
    pub fn neighbors(&self, node_id: usize) -> Vec<usize> {
        self.incident_edges(node_id).filter_map(|e| e.other(node_id)).collect()
    }

    /// Vector from an edge's start node to its end node
    pub fn edge_vector(&self, edge: &Edge) -> Vector3<f64> {
        self.nodes[edge.end].position - self.nodes[edge.start].position
    }

    pub fn edge_length(&self, edge: &Edge) -> f64 {
        self.edge_vector(edge).norm()
    }

    /// Pairs of edge ids that connect the same two nodes
    pub fn duplicate_edges(&self) -> Vec<(usize, usize)> {
        let mut first_by_key: HashMap<(usize, usize), usize> = HashMap::new();
        let mut duplicates = Vec::new();
        for edge in &self.edges {
            match first_by_key.get(&edge.key()) {
                Some(&first) => duplicates.push((first, edge.id)),
                None => {
                    first_by_key.insert(edge.key(), edge.id);
                }
            }
        }
        duplicates
    }

    pub fn joint_summary(&self) -> JointSummary {
        let mut summary = JointSummary::default();
        for node in &self.nodes {
            match node.degree {
                0 => summary.isolated += 1,
                1 => summary.end += 1,
                2 => summary.two_way += 1,
                _ => summary.multi_way += 1,
            }
        }
        summary
    }
}

/// Growing node set used while lines are being merged
struct NodeAccumulator {
    tolerance: f64,
    policy: PositionPolicy,
    positions: Vec<Point3<f64>>,
    sums: Vec<Vector3<f64>>,
    counts: Vec<usize>,
}

impl NodeAccumulator {
    fn new(config: &NetworkConfig) -> Self {
        NodeAccumulator {
            tolerance: config.merge_tolerance_mm,
            policy: config.position_policy,
            positions: Vec::new(),
            sums: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// Return the id of the node within tolerance, creating one if needed
    fn resolve(&mut self, point: &Point3<f64>) -> usize {
        let existing = self
            .positions
            .iter()
            .position(|p| nalgebra::distance(p, point) < self.tolerance);

        match existing {
            Some(id) => {
                if self.policy == PositionPolicy::RunningAverage {
                    self.sums[id] += point.coords;
                    self.counts[id] += 1;
                    self.positions[id] = Point3::from(self.sums[id] / self.counts[id] as f64);
                }
                id
            }
            None => {
                let id = self.positions.len();
                self.positions.push(*point);
                self.sums.push(point.coords);
                self.counts.push(1);
                debug!(node = id, x = point.x, y = point.y, z = point.z, "Created node");
                id
            }
        }
    }
}

/// Build the node/edge network from line segments.
///
/// # Errors
///
/// * `TrussError::EmptyInput` - no lines were supplied
/// * `TrussError::InvalidInput` - the merge tolerance is not positive
///
/// Lines with non-finite coordinates and lines whose ends merge into one
/// node are left out of the network and listed in the returned report.
pub fn build_network(lines: &[LineSegment], config: &NetworkConfig) -> TrussResult<(Network, StageReport)> {
    if lines.is_empty() {
        return Err(TrussError::EmptyInput);
    }
    if !(config.merge_tolerance_mm.is_finite() && config.merge_tolerance_mm > 0.0) {
        return Err(TrussError::invalid_input(
            "merge_tolerance_mm",
            config.merge_tolerance_mm.to_string(),
            "Tolerance must be positive",
        ));
    }

    info!(lines = lines.len(), tolerance = config.merge_tolerance_mm, "Building network");

    let mut report = StageReport::new(Stage::Network);
    let mut accumulator = NodeAccumulator::new(config);
    let mut edges = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let item = if line.source_id.is_empty() {
            format!("line {}", index)
        } else {
            format!("line {} ({})", index, line.source_id)
        };

        if !line.is_finite() {
            report.record_skip(
                item,
                TrussError::invalid_input("line", format!("{:?} -> {:?}", line.start, line.end), "Non-finite coordinate"),
            );
            continue;
        }

        let start = accumulator.resolve(&line.start);
        let end = accumulator.resolve(&line.end);

        if start == end {
            report.record_skip(
                item,
                TrussError::invalid_input(
                    "line",
                    format!("node {}", start),
                    "Both endpoints merge into the same node",
                ),
            );
            continue;
        }

        debug!(edge = edges.len(), start, end, "Added edge");
        edges.push(Edge {
            id: edges.len(),
            start,
            end,
            source_id: line.source_id.clone(),
        });
        report.record_success();
    }

    let network = Network::assemble(accumulator.positions, edges)?;

    let duplicates = network.duplicate_edges();
    if !duplicates.is_empty() {
        warn!(count = duplicates.len(), "Parallel edges connect the same node pair; kept as separate members");
    }

    let summary = network.joint_summary();
    info!(
        nodes = network.node_count(),
        edges = network.edge_count(),
        end = summary.end,
        two_way = summary.two_way,
        multi_way = summary.multi_way,
        "Network built"
    );
    report.log_summary();

    Ok((network, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::spider_truss_lines;

    fn line(id: &str, a: [f64; 3], b: [f64; 3]) -> LineSegment {
        LineSegment::new(id, Point3::new(a[0], a[1], a[2]), Point3::new(b[0], b[1], b[2]))
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = build_network(&[], &NetworkConfig::default());
        assert_eq!(result.unwrap_err(), TrussError::EmptyInput);
    }

    #[test]
    fn test_endpoints_within_tolerance_merge() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("b", [100.0, 0.05, 0.0], [100.0, 100.0, 0.0]),
        ];
        let (network, _) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.edges()[1].start, 1);
    }

    #[test]
    fn test_tolerance_boundary_is_excluded() {
        // Exactly 0.125 apart with a 0.125 tolerance: strict < keeps them apart
        let config = NetworkConfig {
            merge_tolerance_mm: 0.125,
            ..NetworkConfig::default()
        };
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("b", [100.125, 0.0, 0.0], [200.0, 0.0, 0.0]),
        ];
        let (network, _) = build_network(&lines, &config).unwrap();
        assert_eq!(network.node_count(), 4);
    }

    #[test]
    fn test_first_point_position_kept() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("b", [100.08, 0.0, 0.0], [100.0, 100.0, 0.0]),
        ];
        let (network, _) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.node(1).unwrap().position, Point3::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn test_running_average_position() {
        let config = NetworkConfig {
            position_policy: PositionPolicy::RunningAverage,
            ..NetworkConfig::default()
        };
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("b", [100.08, 0.0, 0.0], [100.0, 100.0, 0.0]),
        ];
        let (network, _) = build_network(&lines, &config).unwrap();
        let x = network.node(1).unwrap().position.x;
        assert!((x - 100.04).abs() < 1e-9);
    }

    #[test]
    fn test_self_loop_dropped_and_reported() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("tiny", [100.0, 0.0, 0.0], [100.0, 0.02, 0.0]),
        ];
        let (network, report) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.edge_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert!(report.skipped[0].item.contains("tiny"));
    }

    #[test]
    fn test_degenerate_new_line_creates_isolated_node() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("speck", [500.0, 0.0, 0.0], [500.0, 0.0, 0.01]),
        ];
        let (network, _) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.node_count(), 3);
        assert_eq!(network.joint_summary().isolated, 1);
    }

    #[test]
    fn test_duplicate_edges_kept() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("b", [100.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
        ];
        let (network, _) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.edge_count(), 2);
        assert_eq!(network.duplicate_edges(), vec![(0, 1)]);
        assert_eq!(network.degree(0), 2);
    }

    #[test]
    fn test_non_finite_line_skipped() {
        let lines = vec![
            line("a", [0.0, 0.0, 0.0], [100.0, 0.0, 0.0]),
            line("bad", [f64::NAN, 0.0, 0.0], [100.0, 0.0, 0.0]),
        ];
        let (network, report) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert_eq!(network.edge_count(), 1);
        assert_eq!(report.skipped_count(), 1);
    }

    #[test]
    fn test_node_count_bound_and_distinct_endpoints() {
        let lines = spider_truss_lines();
        let (network, _) = build_network(&lines, &NetworkConfig::default()).unwrap();
        assert!(network.node_count() <= 2 * lines.len());
        assert!(network.edges().iter().all(|e| e.start != e.end));
        let degree_sum: usize = network.nodes().iter().map(|n| n.degree).sum();
        assert_eq!(degree_sum, 2 * network.edge_count());
    }

    #[test]
    fn test_spider_truss_scenario() {
        let (network, report) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        assert_eq!(network.node_count(), 13);
        assert_eq!(network.edge_count(), 12);
        assert_eq!(report.succeeded, 12);

        let summary = network.joint_summary();
        assert!(summary.end >= 1);
        assert!(summary.two_way >= 1);
        assert!(summary.multi_way >= 1);
        assert_eq!(summary.isolated, 0);
    }

    #[test]
    fn test_from_parts_rejects_bad_edges() {
        let positions = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert!(Network::from_parts(positions.clone(), vec![(0, 2)]).is_err());
        assert!(Network::from_parts(positions.clone(), vec![(1, 1)]).is_err());
        let network = Network::from_parts(positions, vec![(0, 1)]).unwrap();
        assert_eq!(network.neighbors(0), vec![1]);
    }
}
