//! # Joint Classifier
//!
//! Maps node degree to a connector archetype and a baseline rod count.
//! This is the topological baseline: no loads, only connectivity.
//!
//! | Degree | Archetype       | Rods |
//! |--------|-----------------|------|
//! | 1      | `END_CONNECTOR` | 2    |
//! | 2      | `LINEAR_SPLICE` | 3    |
//! | 3      | `Y_JOINT`       | 4    |
//! | ≥ 4    | `COMPLEX_JOINT` | 6    |
//!
//! Degree 0 has no archetype and is rejected with `IsolatedNode`.
//!
//! ## Example
//!
//! ```rust
//! use truss_core::joints::{classify, JointClass};
//!
//! let joint = classify(7, 3).unwrap();
//! assert_eq!(joint.class, JointClass::YJoint);
//! assert_eq!(joint.baseline_rods, 4);
//! assert!(classify(8, 0).is_err());
//! ```

use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{TrussError, TrussResult};
use crate::network::Network;
use crate::report::{Stage, StageReport};

/// Nuts per rod (one each side of the plate)
pub const NUTS_PER_ROD: usize = 2;
/// Washers per rod (one under each nut)
pub const WASHERS_PER_ROD: usize = 2;

/// Connector archetype, by node degree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JointClass {
    EndConnector,
    LinearSplice,
    YJoint,
    ComplexJoint,
}

impl JointClass {
    /// All archetypes in ascending degree order
    pub const ALL: [JointClass; 4] = [
        JointClass::EndConnector,
        JointClass::LinearSplice,
        JointClass::YJoint,
        JointClass::ComplexJoint,
    ];

    /// Archetype for a degree; `None` for isolated nodes
    pub fn from_degree(degree: usize) -> Option<JointClass> {
        match degree {
            0 => None,
            1 => Some(JointClass::EndConnector),
            2 => Some(JointClass::LinearSplice),
            3 => Some(JointClass::YJoint),
            _ => Some(JointClass::ComplexJoint),
        }
    }

    /// Rods a connector of this archetype gets before any load is applied
    pub fn baseline_rods(&self) -> usize {
        match self {
            JointClass::EndConnector => 2,
            JointClass::LinearSplice => 3,
            JointClass::YJoint => 4,
            JointClass::ComplexJoint => 6,
        }
    }

    /// Connector plate size used for voids when no engineered size exists (mm)
    pub fn plate_size_mm(&self) -> f64 {
        match self {
            JointClass::EndConnector => 100.0,
            JointClass::LinearSplice => 120.0,
            JointClass::YJoint => 150.0,
            JointClass::ComplexJoint => 180.0,
        }
    }

    /// Stable code used in artifacts and CSV files
    pub fn code(&self) -> &'static str {
        match self {
            JointClass::EndConnector => "END_CONNECTOR",
            JointClass::LinearSplice => "LINEAR_SPLICE",
            JointClass::YJoint => "Y_JOINT",
            JointClass::ComplexJoint => "COMPLEX_JOINT",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            JointClass::EndConnector => "End plate connector",
            JointClass::LinearSplice => "Linear splice or knee joint",
            JointClass::YJoint => "Y-shaped junction (3 members)",
            JointClass::ComplexJoint => "Multi-way junction",
        }
    }

    /// Description for a node of the given degree
    pub fn describe(&self, degree: usize) -> String {
        match self {
            JointClass::ComplexJoint => format!("{}-way junction", degree),
            other => other.display_name().to_string(),
        }
    }
}

impl fmt::Display for JointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of classifying one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointClassification {
    pub class: JointClass,
    pub baseline_rods: usize,
    pub description: String,
}

/// Classify a node by its degree.
///
/// # Errors
///
/// `TrussError::IsolatedNode` when `degree` is 0.
pub fn classify(node_id: usize, degree: usize) -> TrussResult<JointClassification> {
    let class = JointClass::from_degree(degree).ok_or(TrussError::IsolatedNode { node_id })?;
    Ok(JointClassification {
        class,
        baseline_rods: class.baseline_rods(),
        description: class.describe(degree),
    })
}

/// Topological connector specification for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    pub node_id: usize,
    pub class: JointClass,
    pub degree: usize,
    pub rods: usize,
    pub description: String,
    pub position: Point3<f64>,
    /// Neighbour node ids, one per incident beam
    pub neighbors: Vec<usize>,
}

/// Per-archetype line of the connector type summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorTypeSummary {
    pub class: JointClass,
    pub count: usize,
    pub rods_per_connector: usize,
    pub total_rods: usize,
    pub description: String,
}

/// Hardware totals for a set of connectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BillOfMaterials {
    pub rods: usize,
    pub nuts: usize,
    pub washers: usize,
    pub blocks: usize,
}

impl BillOfMaterials {
    /// Totals for `connectors` connectors using `rods` rods overall
    pub fn for_rods(rods: usize, connectors: usize) -> Self {
        BillOfMaterials {
            rods,
            nuts: rods * NUTS_PER_ROD,
            washers: rods * WASHERS_PER_ROD,
            blocks: connectors,
        }
    }
}

/// Output of the classification stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpecs {
    pub connectors: Vec<ConnectorSpec>,
}

impl ConnectorSpecs {
    pub fn get(&self, node_id: usize) -> Option<&ConnectorSpec> {
        self.connectors.iter().find(|c| c.node_id == node_id)
    }

    pub fn total_rods(&self) -> usize {
        self.connectors.iter().map(|c| c.rods).sum()
    }

    pub fn count_of(&self, class: JointClass) -> usize {
        self.connectors.iter().filter(|c| c.class == class).count()
    }

    pub fn bill_of_materials(&self) -> BillOfMaterials {
        BillOfMaterials::for_rods(self.total_rods(), self.connectors.len())
    }

    /// One row per archetype present, in archetype order
    pub fn type_summary(&self) -> Vec<ConnectorTypeSummary> {
        JointClass::ALL
            .iter()
            .filter_map(|&class| {
                let members: Vec<&ConnectorSpec> = self.connectors.iter().filter(|c| c.class == class).collect();
                if members.is_empty() {
                    return None;
                }
                let total_rods = members.iter().map(|c| c.rods).sum();
                Some(ConnectorTypeSummary {
                    class,
                    count: members.len(),
                    rods_per_connector: class.baseline_rods(),
                    total_rods,
                    description: class.display_name().to_string(),
                })
            })
            .collect()
    }
}

/// Classify every node of the network.
///
/// Isolated nodes are skipped and listed in the report.
pub fn specify_connectors(network: &Network) -> (ConnectorSpecs, StageReport) {
    let mut report = StageReport::new(Stage::Connectors);
    let mut connectors = Vec::with_capacity(network.node_count());

    for node in network.nodes() {
        match classify(node.id, node.degree) {
            Ok(joint) => {
                connectors.push(ConnectorSpec {
                    node_id: node.id,
                    class: joint.class,
                    degree: node.degree,
                    rods: joint.baseline_rods,
                    description: joint.description,
                    position: node.position,
                    neighbors: network.neighbors(node.id),
                });
                report.record_success();
            }
            Err(e) => report.record_skip(format!("node {}", node.id), e),
        }
    }

    let specs = ConnectorSpecs { connectors };
    let bom = specs.bill_of_materials();
    info!(
        connectors = specs.connectors.len(),
        rods = bom.rods,
        nuts = bom.nuts,
        washers = bom.washers,
        "Connector specifications generated"
    );
    report.log_summary();

    (specs, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::fixtures::spider_truss_lines;
    use crate::network::build_network;

    #[test]
    fn test_degree_mapping() {
        assert_eq!(classify(0, 1).unwrap().class, JointClass::EndConnector);
        assert_eq!(classify(0, 2).unwrap().class, JointClass::LinearSplice);
        assert_eq!(classify(0, 3).unwrap().class, JointClass::YJoint);
        assert_eq!(classify(0, 4).unwrap().class, JointClass::ComplexJoint);
        assert_eq!(classify(0, 9).unwrap().class, JointClass::ComplexJoint);
    }

    #[test]
    fn test_isolated_node_rejected() {
        assert_eq!(classify(5, 0).unwrap_err(), TrussError::IsolatedNode { node_id: 5 });
    }

    #[test]
    fn test_rods_non_decreasing_in_degree() {
        let rods: Vec<usize> = (1..=8).map(|d| classify(0, d).unwrap().baseline_rods).collect();
        assert_eq!(&rods[..4], &[2, 3, 4, 6]);
        assert!(rods.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(classify(0, 1).unwrap().description, "End plate connector");
        assert_eq!(classify(0, 5).unwrap().description, "5-way junction");
    }

    #[test]
    fn test_serialized_code() {
        let json = serde_json::to_string(&JointClass::YJoint).unwrap();
        assert_eq!(json, "\"Y_JOINT\"");
        assert_eq!(JointClass::ComplexJoint.to_string(), "COMPLEX_JOINT");
    }

    #[test]
    fn test_bill_of_materials() {
        let bom = BillOfMaterials::for_rods(39, 13);
        assert_eq!(bom.nuts, 78);
        assert_eq!(bom.washers, 78);
        assert_eq!(bom.blocks, 13);
    }

    #[test]
    fn test_spider_truss_connectors() {
        let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (specs, report) = specify_connectors(&network);

        assert!(report.is_clean());
        assert_eq!(specs.connectors.len(), 13);
        assert_eq!(specs.count_of(JointClass::EndConnector), 6);
        assert_eq!(specs.count_of(JointClass::LinearSplice), 4);
        assert_eq!(specs.count_of(JointClass::YJoint), 2);
        assert_eq!(specs.count_of(JointClass::ComplexJoint), 1);
        // 6×2 + 4×3 + 2×4 + 1×6
        assert_eq!(specs.total_rods(), 38);

        let summary = specs.type_summary();
        assert_eq!(summary.len(), 4);
        assert_eq!(summary.iter().map(|s| s.total_rods).sum::<usize>(), 38);

        let apex = specs.get(0).unwrap();
        assert_eq!(apex.neighbors.len(), 4);
    }

    #[test]
    fn test_isolated_node_skipped_in_stage() {
        use nalgebra::Point3;
        let network = Network::from_parts(
            vec![Point3::origin(), Point3::new(100.0, 0.0, 0.0), Point3::new(500.0, 0.0, 0.0)],
            vec![(0, 1)],
        )
        .unwrap();
        let (specs, report) = specify_connectors(&network);
        assert_eq!(specs.connectors.len(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skipped[0].error, TrussError::IsolatedNode { node_id: 2 });
    }
}
