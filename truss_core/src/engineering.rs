//! # Load-Based Connector Engineer
//!
//! Sizes each connector from the external load at its node instead of
//! its degree alone.
//!
//! ## Procedure
//!
//! ```text
//! P_comb   = √(V² + L² + T²)            (axes treated as orthogonal)
//! P_design = P_comb × load_factor
//! n_exact  = P_design / P_rod
//! n        = max(round(n_exact), minimum_rods)
//! util     = P_design / (n × P_rod) × 100
//!
//! A_req    = P_comb / F_perp'           (unfactored)
//! A_design = A_req × block_area_margin
//! side     = √A_design → smallest standard size ≥ side
//! ```
//!
//! `round` is [`RodRounding`](crate::config::RodRounding): ceiling by
//! default, or add-half-then-truncate.
//!
//! ## Example
//!
//! ```rust
//! use truss_core::config::PipelineConfig;
//! use truss_core::engineering::{engineer_load, NodeLoad};
//!
//! let config = PipelineConfig::default();
//! let load = NodeLoad::new(0, 4000.0, 0.0, 0.0);
//! let result = engineer_load(&load, &config).unwrap();
//!
//! assert!((result.design_load_n - 5000.0).abs() < 1e-9);
//! assert_eq!(result.rods, 4);
//! assert!(result.utilization_percent <= 100.0);
//! ```

use std::collections::{BTreeMap, HashSet};

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, SafetyConfig};
use crate::errors::{TrussError, TrussResult};
use crate::joints::{BillOfMaterials, ConnectorSpecs, JointClass};
use crate::report::{Stage, StageReport};

/// Structural role of a loaded node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Concentrated roof load at a peak
    ApexConcentrate,
    /// Load passing between members mid-span
    TransferJunction,
    /// Wind and sway resisted at the node
    LateralBracing,
    /// Foot resting on a support
    BearingSupport,
    /// Uplift or hanging load
    TensionMember,
    #[default]
    Unspecified,
}

impl NodeKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::ApexConcentrate => "apex_concentrate",
            NodeKind::TransferJunction => "transfer_junction",
            NodeKind::LateralBracing => "lateral_bracing",
            NodeKind::BearingSupport => "bearing_support",
            NodeKind::TensionMember => "tension_member",
            NodeKind::Unspecified => "unspecified",
        }
    }
}

/// External loads at one node (N, each ≥ 0).
///
/// ## JSON Example
///
/// ```json
/// {
///   "node_id": 3,
///   "name": "N3",
///   "kind": "lateral_bracing",
///   "vertical_n": 1500.0,
///   "lateral_n": 2800.0,
///   "tension_n": 0.0,
///   "note": "Wind on face"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLoad {
    pub node_id: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub vertical_n: f64,
    #[serde(default)]
    pub lateral_n: f64,
    #[serde(default)]
    pub tension_n: f64,
    #[serde(default)]
    pub note: String,
}

impl NodeLoad {
    pub fn new(node_id: usize, vertical_n: f64, lateral_n: f64, tension_n: f64) -> Self {
        NodeLoad {
            node_id,
            name: format!("N{}", node_id),
            kind: NodeKind::Unspecified,
            vertical_n,
            lateral_n,
            tension_n,
            note: String::new(),
        }
    }

    /// Zero load placeholder for a node without a schedule entry
    pub fn unloaded(node_id: usize) -> Self {
        NodeLoad {
            note: "No load specified".to_string(),
            ..NodeLoad::new(node_id, 0.0, 0.0, 0.0)
        }
    }

    /// Reject negative or non-finite components.
    pub fn validate(&self) -> TrussResult<()> {
        for (component, value) in [
            ("vertical_n", self.vertical_n),
            ("lateral_n", self.lateral_n),
            ("tension_n", self.tension_n),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(TrussError::invalid_load(self.node_id, component, value));
            }
        }
        Ok(())
    }

    /// Euclidean magnitude of the three components
    pub fn combined_n(&self) -> f64 {
        (self.vertical_n.powi(2) + self.lateral_n.powi(2) + self.tension_n.powi(2)).sqrt()
    }
}

/// Load input for the engineering stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadSchedule {
    pub loads: Vec<NodeLoad>,
}

/// OK when utilization ≤ 100%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CapacityStatus {
    Ok,
    Over,
}

/// Rod count for a design load
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RodSizing {
    pub rods_exact: f64,
    pub rods: usize,
    pub actual_capacity_n: f64,
    pub utilization_percent: f64,
    pub status: CapacityStatus,
}

/// Size rods for a design load at a given per-rod capacity.
pub fn size_rods(design_load_n: f64, capacity_per_rod_n: f64, safety: &SafetyConfig) -> RodSizing {
    let rods_exact = design_load_n / capacity_per_rod_n;
    let rods = safety.rounding.apply(rods_exact).max(safety.minimum_rods);
    let actual_capacity_n = rods as f64 * capacity_per_rod_n;
    let utilization_percent = if actual_capacity_n > 0.0 {
        design_load_n / actual_capacity_n * 100.0
    } else {
        0.0
    };
    let status = if utilization_percent <= 100.0 {
        CapacityStatus::Ok
    } else {
        CapacityStatus::Over
    };

    RodSizing {
        rods_exact,
        rods,
        actual_capacity_n,
        utilization_percent,
        status,
    }
}

/// Connector block (plate) size from bearing area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSizing {
    /// Unfactored bearing area (mm²)
    pub required_area_mm2: f64,
    /// Area after the flat margin (mm²)
    pub design_area_mm2: f64,
    /// √design area (mm)
    pub side_length_mm: f64,
    /// Chosen standard size (mm)
    pub size_mm: f64,
    /// (size² − required) / required × 100; 0 for zero load
    pub margin_percent: f64,
    /// No standard size reached the side length; largest used
    pub undersized: bool,
}

/// Pick the smallest standard block whose side covers the design area.
///
/// `sizes_mm` must be non-empty and ascending. Past the largest size the
/// largest is returned with `undersized` set.
pub fn size_block(combined_load_n: f64, bearing_stress_mpa: f64, area_margin: f64, sizes_mm: &[f64]) -> BlockSizing {
    let required_area_mm2 = combined_load_n / bearing_stress_mpa;
    let design_area_mm2 = required_area_mm2 * area_margin;
    let side_length_mm = design_area_mm2.sqrt();

    let largest = sizes_mm.last().copied().unwrap_or(0.0);
    let (size_mm, undersized) = match sizes_mm.iter().find(|&&s| s >= side_length_mm) {
        Some(&size) => (size, false),
        None => (largest, true),
    };

    let margin_percent = if required_area_mm2 > 0.0 {
        (size_mm * size_mm - required_area_mm2) / required_area_mm2 * 100.0
    } else {
        0.0
    };

    BlockSizing {
        required_area_mm2,
        design_area_mm2,
        side_length_mm,
        size_mm,
        margin_percent,
        undersized,
    }
}

/// Engineering result for one load
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineeringResult {
    pub combined_load_n: f64,
    pub design_load_n: f64,
    pub capacity_per_rod_n: f64,
    pub rods_exact: f64,
    pub rods: usize,
    pub actual_capacity_n: f64,
    pub utilization_percent: f64,
    pub status: CapacityStatus,
    pub block: BlockSizing,
}

/// Engineer one node load.
///
/// # Errors
///
/// `TrussError::InvalidLoad` if a component is negative or not finite.
pub fn engineer_load(load: &NodeLoad, config: &PipelineConfig) -> TrussResult<EngineeringResult> {
    load.validate()?;

    let combined_load_n = load.combined_n();
    let design_load_n = combined_load_n * config.safety.load_factor;
    let capacity_per_rod_n = config.fastener.capacity_per_rod_n(&config.material);
    let rods = size_rods(design_load_n, capacity_per_rod_n, &config.safety);
    let block = size_block(
        combined_load_n,
        config.material.bearing_stress_mpa(),
        config.safety.block_area_margin,
        &config.standard_block_sizes_mm,
    );

    Ok(EngineeringResult {
        combined_load_n,
        design_load_n,
        capacity_per_rod_n,
        rods_exact: rods.rods_exact,
        rods: rods.rods,
        actual_capacity_n: rods.actual_capacity_n,
        utilization_percent: rods.utilization_percent,
        status: rods.status,
        block,
    })
}

/// A connector sized from its load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredConnector {
    pub node_id: usize,
    pub name: String,
    pub kind: NodeKind,
    pub class: JointClass,
    pub degree: usize,
    pub position: Point3<f64>,
    /// Rods the topological stage gave this node
    pub baseline_rods: usize,
    pub vertical_n: f64,
    pub lateral_n: f64,
    pub tension_n: f64,
    /// False when the schedule had no entry for this node
    pub loaded: bool,
    pub note: String,
    pub result: EngineeringResult,
}

/// Rods per node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindBreakdown {
    pub kind: NodeKind,
    pub count: usize,
    pub total_rods: usize,
    pub average_rods: f64,
}

/// Aggregate figures for an engineered run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeringSummary {
    pub total_nodes: usize,
    pub total_rods: usize,
    /// Rods the topological stage asked for on the same nodes
    pub baseline_rods: usize,
    /// total_rods − baseline_rods
    pub rod_delta: i64,
    pub average_utilization_percent: f64,
    pub over_capacity: usize,
    /// Connectors above `utilization_target`
    pub above_target: usize,
    /// Connectors whose block hit the largest standard size
    pub undersized_blocks: usize,
    /// Nodes engineered at zero load
    pub unloaded_nodes: Vec<usize>,
    pub by_kind: Vec<KindBreakdown>,
}

impl EngineeringSummary {
    fn from_connectors(connectors: &[EngineeredConnector], utilization_target: f64) -> Self {
        let total_rods: usize = connectors.iter().map(|c| c.result.rods).sum();
        let baseline_rods: usize = connectors.iter().map(|c| c.baseline_rods).sum();
        let average_utilization_percent = if connectors.is_empty() {
            0.0
        } else {
            connectors.iter().map(|c| c.result.utilization_percent).sum::<f64>() / connectors.len() as f64
        };

        let mut kinds: BTreeMap<NodeKind, (usize, usize)> = BTreeMap::new();
        for c in connectors {
            let entry = kinds.entry(c.kind).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += c.result.rods;
        }

        EngineeringSummary {
            total_nodes: connectors.len(),
            total_rods,
            baseline_rods,
            rod_delta: total_rods as i64 - baseline_rods as i64,
            average_utilization_percent,
            over_capacity: connectors.iter().filter(|c| c.result.status == CapacityStatus::Over).count(),
            above_target: connectors
                .iter()
                .filter(|c| c.result.utilization_percent > utilization_target * 100.0)
                .count(),
            undersized_blocks: connectors.iter().filter(|c| c.result.block.undersized).count(),
            unloaded_nodes: connectors.iter().filter(|c| !c.loaded).map(|c| c.node_id).collect(),
            by_kind: kinds
                .into_iter()
                .map(|(kind, (count, total_rods))| KindBreakdown {
                    kind,
                    count,
                    total_rods,
                    average_rods: total_rods as f64 / count as f64,
                })
                .collect(),
        }
    }
}

/// Output of the engineering stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredConnectors {
    pub connectors: Vec<EngineeredConnector>,
    pub summary: EngineeringSummary,
}

impl EngineeredConnectors {
    pub fn get(&self, node_id: usize) -> Option<&EngineeredConnector> {
        self.connectors.iter().find(|c| c.node_id == node_id)
    }

    pub fn bill_of_materials(&self) -> BillOfMaterials {
        BillOfMaterials::for_rods(self.summary.total_rods, self.connectors.len())
    }

    /// Rod change against the topological baseline, as a percentage
    pub fn change_vs_baseline_percent(&self) -> f64 {
        if self.summary.baseline_rods == 0 {
            return 0.0;
        }
        self.summary.rod_delta as f64 / self.summary.baseline_rods as f64 * 100.0
    }
}

/// Engineer every classified connector from a load schedule.
///
/// Nodes with no entry get zero load. Entries for unknown nodes, repeated
/// entries and invalid loads are skipped and listed in the report.
pub fn engineer_connectors(
    specs: &ConnectorSpecs,
    schedule: &LoadSchedule,
    config: &PipelineConfig,
) -> (EngineeredConnectors, StageReport) {
    let mut report = StageReport::new(Stage::Engineering);

    let known: HashSet<usize> = specs.connectors.iter().map(|c| c.node_id).collect();
    let mut loads: BTreeMap<usize, &NodeLoad> = BTreeMap::new();
    for load in &schedule.loads {
        if !known.contains(&load.node_id) {
            report.record_skip(
                format!("load {}", load.name),
                TrussError::invalid_input("node_id", load.node_id.to_string(), "No connector at this node"),
            );
        } else if loads.contains_key(&load.node_id) {
            report.record_skip(
                format!("load {}", load.name),
                TrussError::invalid_input("node_id", load.node_id.to_string(), "Node already has a load entry"),
            );
        } else {
            loads.insert(load.node_id, load);
        }
    }

    info!(
        connectors = specs.connectors.len(),
        loads = loads.len(),
        load_factor = config.safety.load_factor,
        capacity_per_rod_n = config.fastener.capacity_per_rod_n(&config.material),
        "Engineering connectors"
    );

    let mut connectors = Vec::with_capacity(specs.connectors.len());
    for spec in &specs.connectors {
        let (load, loaded) = match loads.get(&spec.node_id) {
            Some(&load) => (load.clone(), true),
            None => (NodeLoad::unloaded(spec.node_id), false),
        };

        match engineer_load(&load, config) {
            Ok(result) => {
                debug!(
                    node = spec.node_id,
                    combined_n = result.combined_load_n,
                    rods = result.rods,
                    utilization = result.utilization_percent,
                    block_mm = result.block.size_mm,
                    "Engineered connector"
                );
                if result.block.undersized {
                    warn!(
                        node = spec.node_id,
                        side_mm = result.block.side_length_mm,
                        size_mm = result.block.size_mm,
                        "Load needs a block larger than the largest standard size"
                    );
                }
                if result.status == CapacityStatus::Over {
                    warn!(node = spec.node_id, utilization = result.utilization_percent, "Connector over capacity");
                }

                connectors.push(EngineeredConnector {
                    node_id: spec.node_id,
                    name: load.name,
                    kind: load.kind,
                    class: spec.class,
                    degree: spec.degree,
                    position: spec.position,
                    baseline_rods: spec.rods,
                    vertical_n: load.vertical_n,
                    lateral_n: load.lateral_n,
                    tension_n: load.tension_n,
                    loaded,
                    note: load.note,
                    result,
                });
                report.record_success();
            }
            Err(e) => report.record_skip(format!("node {}", spec.node_id), e),
        }
    }

    let summary = EngineeringSummary::from_connectors(&connectors, config.safety.utilization_target);
    if !summary.unloaded_nodes.is_empty() {
        info!(count = summary.unloaded_nodes.len(), "Nodes without a load entry engineered at zero load");
    }
    info!(
        total_rods = summary.total_rods,
        rod_delta = summary.rod_delta,
        average_utilization = summary.average_utilization_percent,
        over_capacity = summary.over_capacity,
        "Engineering complete"
    );
    report.log_summary();

    (EngineeredConnectors { connectors, summary }, report)
}
