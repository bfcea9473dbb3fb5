//! # Stage Artifacts
//!
//! JSON records each stage writes for the next one when the pipeline runs
//! as separate batch invocations. Every artifact carries an
//! [`ArtifactMeta`] header and has a fixed file name inside the working
//! directory.
//!
//! ```text
//! truss_network.json                     Network Builder
//! truss_connector_spec.json              Joint Classifier
//! truss_connector_engineered.json        Load Engineer
//! half_lap_specifications.json           Half-Lap Analyzer
//! connector_void_specifications.json     Connector voids
//! panel_specifications.json              Connector panels
//! panel_profiles_for_nesting.json        Panel outlines for sheet nesting
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nalgebra::Point3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{BeamSection, FastenerConfig, MaterialConfig, PanelConfig, PipelineConfig, SafetyConfig};
use crate::engineering::EngineeredConnectors;
use crate::errors::{TrussError, TrussResult};
use crate::half_lap::HalfLapAnalysis;
use crate::joints::{BillOfMaterials, ConnectorSpecs, ConnectorTypeSummary};
use crate::network::{Edge, JointSummary, Network};
use crate::panels::{ConnectorPanels, PanelProfile, PanelSummary};
use crate::report::Stage;
use crate::voids::ConnectorVoids;

/// Current schema version for artifact files
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Header shared by every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub schema_version: String,
    /// Shared by all artifacts written in one run
    pub run_id: Uuid,
    pub created: DateTime<Utc>,
    pub stage: Stage,
}

impl ArtifactMeta {
    pub fn new(stage: Stage, run_id: Uuid) -> Self {
        ArtifactMeta {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id,
            created: Utc::now(),
            stage,
        }
    }
}

/// A persisted stage output
pub trait Artifact: Serialize + DeserializeOwned {
    /// Name used in diagnostics
    const NAME: &'static str;
    /// File name inside the working directory
    const FILE_NAME: &'static str;

    fn meta(&self) -> &ArtifactMeta;
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkArtifact {
    pub meta: ArtifactMeta,
    /// Keyed by the node id as a string
    pub nodes: BTreeMap<String, NodeRecord>,
    pub edges: Vec<EdgeRecord>,
    pub statistics: NetworkStatistics,
    pub joint_summary: JointSummary,
    #[serde(default)]
    pub duplicate_edges: Vec<(usize, usize)>,
}

impl NetworkArtifact {
    pub fn from_network(network: &Network, run_id: Uuid) -> Self {
        let nodes = network
            .nodes()
            .iter()
            .map(|n| {
                (
                    n.id.to_string(),
                    NodeRecord {
                        x: n.position.x,
                        y: n.position.y,
                        z: n.position.z,
                        degree: n.degree,
                    },
                )
            })
            .collect();
        let edges = network
            .edges()
            .iter()
            .map(|e| EdgeRecord {
                start: e.start,
                end: e.end,
                source_id: e.source_id.clone(),
            })
            .collect();

        NetworkArtifact {
            meta: ArtifactMeta::new(Stage::Network, run_id),
            nodes,
            edges,
            statistics: NetworkStatistics {
                total_nodes: network.node_count(),
                total_edges: network.edge_count(),
            },
            joint_summary: network.joint_summary(),
            duplicate_edges: network.duplicate_edges(),
        }
    }

    /// Rebuild the network. Node ids must be dense from 0; degrees are
    /// recomputed from the edges.
    pub fn to_network(&self) -> TrussResult<Network> {
        let mut indexed = Vec::with_capacity(self.nodes.len());
        for (key, record) in &self.nodes {
            let id: usize = key
                .parse()
                .map_err(|_| TrussError::invalid_input("nodes", key.clone(), "Node key is not an integer id"))?;
            indexed.push((id, Point3::new(record.x, record.y, record.z)));
        }
        indexed.sort_by_key(|(id, _)| *id);

        for (expected, (id, _)) in indexed.iter().enumerate() {
            if *id != expected {
                return Err(TrussError::invalid_input(
                    "nodes",
                    id.to_string(),
                    format!("Node ids must run 0..{} without gaps", self.nodes.len()),
                ));
            }
        }

        let positions = indexed.into_iter().map(|(_, p)| p).collect();
        let edges = self
            .edges
            .iter()
            .enumerate()
            .map(|(id, e)| Edge {
                id,
                start: e.start,
                end: e.end,
                source_id: e.source_id.clone(),
            })
            .collect();
        Network::assemble(positions, edges)
    }
}

impl Artifact for NetworkArtifact {
    const NAME: &'static str = "network";
    const FILE_NAME: &'static str = "truss_network.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

// ---------------------------------------------------------------------------
// Connector specifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpecArtifact {
    pub meta: ArtifactMeta,
    #[serde(flatten)]
    pub specs: ConnectorSpecs,
    pub total_connectors: usize,
    pub total_rods: usize,
    pub connector_types: Vec<ConnectorTypeSummary>,
    pub bill_of_materials: BillOfMaterials,
}

impl ConnectorSpecArtifact {
    pub fn new(specs: &ConnectorSpecs, run_id: Uuid) -> Self {
        ConnectorSpecArtifact {
            meta: ArtifactMeta::new(Stage::Connectors, run_id),
            specs: specs.clone(),
            total_connectors: specs.connectors.len(),
            total_rods: specs.total_rods(),
            connector_types: specs.type_summary(),
            bill_of_materials: specs.bill_of_materials(),
        }
    }
}

impl Artifact for ConnectorSpecArtifact {
    const NAME: &'static str = "connector specifications";
    const FILE_NAME: &'static str = "truss_connector_spec.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

// ---------------------------------------------------------------------------
// Engineered connectors
// ---------------------------------------------------------------------------

/// Configuration the engineered numbers were produced with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignBasis {
    pub material: MaterialConfig,
    pub bearing_stress_mpa: f64,
    pub fastener: FastenerConfig,
    pub capacity_per_rod_n: f64,
    pub safety: SafetyConfig,
    pub standard_block_sizes_mm: Vec<f64>,
}

impl DesignBasis {
    pub fn from_config(config: &PipelineConfig) -> Self {
        DesignBasis {
            material: config.material.clone(),
            bearing_stress_mpa: config.material.bearing_stress_mpa(),
            fastener: config.fastener.clone(),
            capacity_per_rod_n: config.fastener.capacity_per_rod_n(&config.material),
            safety: config.safety.clone(),
            standard_block_sizes_mm: config.standard_block_sizes_mm.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredConnectorArtifact {
    pub meta: ArtifactMeta,
    pub design_basis: DesignBasis,
    #[serde(flatten)]
    pub engineered: EngineeredConnectors,
    pub bill_of_materials: BillOfMaterials,
    pub change_vs_baseline_percent: f64,
}

impl EngineeredConnectorArtifact {
    pub fn new(engineered: &EngineeredConnectors, config: &PipelineConfig, run_id: Uuid) -> Self {
        EngineeredConnectorArtifact {
            meta: ArtifactMeta::new(Stage::Engineering, run_id),
            design_basis: DesignBasis::from_config(config),
            engineered: engineered.clone(),
            bill_of_materials: engineered.bill_of_materials(),
            change_vs_baseline_percent: engineered.change_vs_baseline_percent(),
        }
    }
}

impl Artifact for EngineeredConnectorArtifact {
    const NAME: &'static str = "engineered connectors";
    const FILE_NAME: &'static str = "truss_connector_engineered.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

// ---------------------------------------------------------------------------
// Half-laps and voids
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfLapArtifact {
    pub meta: ArtifactMeta,
    #[serde(flatten)]
    pub analysis: HalfLapAnalysis,
    pub total_intersections: usize,
    pub average_angle_deg: f64,
}

impl HalfLapArtifact {
    pub fn new(analysis: &HalfLapAnalysis, run_id: Uuid) -> Self {
        HalfLapArtifact {
            meta: ArtifactMeta::new(Stage::HalfLap, run_id),
            analysis: analysis.clone(),
            total_intersections: analysis.joints.len(),
            average_angle_deg: analysis.average_angle_deg(),
        }
    }
}

impl Artifact for HalfLapArtifact {
    const NAME: &'static str = "half-lap specifications";
    const FILE_NAME: &'static str = "half_lap_specifications.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorVoidArtifact {
    pub meta: ArtifactMeta,
    #[serde(flatten)]
    pub voids: ConnectorVoids,
    pub total_voids: usize,
}

impl ConnectorVoidArtifact {
    pub fn new(voids: &ConnectorVoids, run_id: Uuid) -> Self {
        ConnectorVoidArtifact {
            meta: ArtifactMeta::new(Stage::Voids, run_id),
            voids: voids.clone(),
            total_voids: voids.voids.len(),
        }
    }
}

impl Artifact for ConnectorVoidArtifact {
    const NAME: &'static str = "connector voids";
    const FILE_NAME: &'static str = "connector_void_specifications.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

// ---------------------------------------------------------------------------
// Panels
// ---------------------------------------------------------------------------

/// Dimensions the panels were laid out with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelParameters {
    pub panel: PanelConfig,
    pub beam: BeamSection,
    pub rod_diameter_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelArtifact {
    pub meta: ArtifactMeta,
    pub parameters: PanelParameters,
    #[serde(flatten)]
    pub panels: ConnectorPanels,
    pub summary: PanelSummary,
}

impl PanelArtifact {
    pub fn new(panels: &ConnectorPanels, config: &PipelineConfig, run_id: Uuid) -> Self {
        PanelArtifact {
            meta: ArtifactMeta::new(Stage::Panels, run_id),
            parameters: PanelParameters {
                panel: config.panels.clone(),
                beam: config.beam,
                rod_diameter_mm: config.connector_geometry.rod_diameter_mm,
            },
            panels: panels.clone(),
            summary: panels.summary(),
        }
    }
}

impl Artifact for PanelArtifact {
    const NAME: &'static str = "panel specifications";
    const FILE_NAME: &'static str = "panel_specifications.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

/// Stock sheet the panels are cut from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetStock {
    pub width_mm: f64,
    pub height_mm: f64,
    pub material: String,
    pub thickness_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestingProfileArtifact {
    pub meta: ArtifactMeta,
    pub sheet: SheetStock,
    pub profiles: Vec<PanelProfile>,
    pub total_panels: usize,
    pub total_area_mm2: f64,
    /// Whole sheets the panel area needs before any nesting waste
    pub min_sheets_by_area: usize,
}

impl NestingProfileArtifact {
    pub fn new(panels: &ConnectorPanels, config: &PanelConfig, run_id: Uuid) -> Self {
        let profiles = panels.profiles(config);
        let total_area_mm2: f64 = profiles.iter().map(|p| p.area_mm2).sum();
        let sheet_area = config.sheet_width_mm * config.sheet_height_mm;
        NestingProfileArtifact {
            meta: ArtifactMeta::new(Stage::Panels, run_id),
            sheet: SheetStock {
                width_mm: config.sheet_width_mm,
                height_mm: config.sheet_height_mm,
                material: config.material.clone(),
                thickness_mm: config.thickness_mm,
            },
            total_panels: profiles.len(),
            total_area_mm2,
            min_sheets_by_area: (total_area_mm2 / sheet_area).ceil() as usize,
            profiles,
        }
    }
}

impl Artifact for NestingProfileArtifact {
    const NAME: &'static str = "panel nesting profiles";
    const FILE_NAME: &'static str = "panel_profiles_for_nesting.json";

    fn meta(&self) -> &ArtifactMeta {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::fixtures::spider_truss_lines;
    use crate::joints::specify_connectors;
    use crate::network::build_network;
    use crate::panels::design_panels;

    fn spider() -> Network {
        build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap().0
    }

    #[test]
    fn test_network_artifact_shape() {
        let artifact = NetworkArtifact::from_network(&spider(), Uuid::new_v4());
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(json["statistics"]["total_nodes"], 13);
        assert_eq!(json["statistics"]["total_edges"], 12);
        assert_eq!(json["nodes"]["0"]["degree"], 4);
        assert_eq!(json["nodes"]["0"]["z"], 3000.0);
        assert_eq!(json["edges"][0]["start"], 0);
        assert_eq!(json["meta"]["stage"], "network");
        assert_eq!(json["meta"]["schema_version"], SCHEMA_VERSION);
    }

    #[test]
    fn test_network_artifact_rebuilds_network() {
        let network = spider();
        let artifact = NetworkArtifact::from_network(&network, Uuid::new_v4());
        let json = serde_json::to_string(&artifact).unwrap();
        let parsed: NetworkArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.to_network().unwrap(), network);
    }

    #[test]
    fn test_network_artifact_rejects_gaps() {
        let mut artifact = NetworkArtifact::from_network(&spider(), Uuid::new_v4());
        artifact.nodes.remove("5");
        let err = artifact.to_network().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_connector_artifact_flattens_specs() {
        let (specs, _) = specify_connectors(&spider());
        let artifact = ConnectorSpecArtifact::new(&specs, Uuid::new_v4());
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(json["connectors"].as_array().unwrap().len(), 13);
        assert_eq!(json["total_rods"], 38);
        assert_eq!(json["bill_of_materials"]["nuts"], 76);
        assert_eq!(json["connector_types"][0]["class"], "END_CONNECTOR");
    }

    #[test]
    fn test_panel_artifacts() {
        let config = PipelineConfig::default();
        let network = spider();
        let (specs, _) = specify_connectors(&network);
        let (panels, _) = design_panels(&network, &specs, None, &config);
        let run_id = Uuid::new_v4();

        let json = serde_json::to_value(PanelArtifact::new(&panels, &config, run_id)).unwrap();
        assert_eq!(json["meta"]["stage"], "panels");
        assert_eq!(json["summary"]["total_panels"], 26);
        assert_eq!(json["panels"].as_array().unwrap().len(), 13);
        assert_eq!(json["parameters"]["panel"]["pocket_depth_mm"], 30.0);

        let nesting = NestingProfileArtifact::new(&panels, &config.panels, run_id);
        assert_eq!(nesting.total_panels, 26);
        assert_eq!(nesting.profiles[0].name, "N0_A");
        // Well under one 1220 × 2440 sheet
        assert_eq!(nesting.min_sheets_by_area, 1);
        assert_eq!(nesting.sheet.thickness_mm, 18.0);
    }

    #[test]
    fn test_design_basis_snapshot() {
        let basis = DesignBasis::from_config(&PipelineConfig::default());
        assert!((basis.bearing_stress_mpa - 2.79).abs() < 1e-9);
        assert!((basis.capacity_per_rod_n - 1339.2).abs() < 1e-6);
    }
}
