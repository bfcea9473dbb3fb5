//! # Connector Voids
//!
//! Pockets cut into the beams at each node so the connector plate and its
//! rods sit flush. The void goes through the full beam width and is
//! oriented on the average direction of the beams leaving the node.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::engineering::EngineeredConnectors;
use crate::errors::TrussError;
use crate::geometry::{safe_normalize, MIN_VECTOR_LENGTH};
use crate::joints::{ConnectorSpecs, JointClass};
use crate::network::Network;
use crate::report::{Stage, StageReport};

/// Void specification for one connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorVoid {
    pub node_id: usize,
    pub class: JointClass,
    pub degree: usize,
    pub position: Point3<f64>,
    /// Square plate side (mm)
    pub plate_size_mm: f64,
    /// Through the full beam width (mm)
    pub void_depth_mm: f64,
    /// Unit average of the outgoing beam directions
    pub direction: Vector3<f64>,
    pub connected_beams: usize,
    /// Plate size came from the engineering stage
    pub engineered: bool,
}

impl ConnectorVoid {
    /// Void length along `direction` (mm)
    pub fn length_mm(&self) -> f64 {
        self.plate_size_mm
    }

    /// Void width across `direction` (mm)
    pub fn width_mm(&self) -> f64 {
        self.plate_size_mm
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorVoids {
    pub voids: Vec<ConnectorVoid>,
}

impl ConnectorVoids {
    pub fn get(&self, node_id: usize) -> Option<&ConnectorVoid> {
        self.voids.iter().find(|v| v.node_id == node_id)
    }
}

/// Unit average of the directions from a node to its neighbours.
///
/// World Z when the node has no beams or they cancel out.
pub fn average_beam_direction(network: &Network, node_id: usize) -> Vector3<f64> {
    let Some(node) = network.node(node_id) else {
        return Vector3::z();
    };

    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for neighbor in network.neighbors(node_id) {
        if let Some(other) = network.node(neighbor) {
            sum += safe_normalize(&(other.position - node.position));
            count += 1;
        }
    }

    if count == 0 {
        return Vector3::z();
    }
    let average = sum / count as f64;
    if average.norm() < MIN_VECTOR_LENGTH {
        Vector3::z()
    } else {
        safe_normalize(&average)
    }
}

/// Compute voids for every classified connector.
///
/// Plate sizes come from the engineered block size where one exists and
/// from the archetype otherwise.
pub fn compute_voids(
    network: &Network,
    specs: &ConnectorSpecs,
    engineered: Option<&EngineeredConnectors>,
    config: &PipelineConfig,
) -> (ConnectorVoids, StageReport) {
    let mut report = StageReport::new(Stage::Voids);
    let mut voids = Vec::with_capacity(specs.connectors.len());

    for spec in &specs.connectors {
        if network.node(spec.node_id).is_none() {
            report.record_skip(
                format!("node {}", spec.node_id),
                TrussError::geometry_failure(format!("Void_{}", spec.node_id), "Node not in network"),
            );
            continue;
        }

        let engineered_size = engineered
            .and_then(|e| e.get(spec.node_id))
            .map(|c| c.result.block.size_mm);

        voids.push(ConnectorVoid {
            node_id: spec.node_id,
            class: spec.class,
            degree: spec.degree,
            position: spec.position,
            plate_size_mm: engineered_size.unwrap_or_else(|| spec.class.plate_size_mm()),
            void_depth_mm: config.beam.width_mm,
            direction: average_beam_direction(network, spec.node_id),
            connected_beams: network.degree(spec.node_id),
            engineered: engineered_size.is_some(),
        });
        report.record_success();
    }

    info!(
        voids = voids.len(),
        depth_mm = config.beam.width_mm,
        engineered = engineered.is_some(),
        "Connector voids computed"
    );
    report.log_summary();

    (ConnectorVoids { voids }, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::engineering::engineer_connectors;
    use crate::fixtures::{spider_truss_lines, spider_truss_loads};
    use crate::joints::specify_connectors;
    use crate::network::build_network;
    use approx::assert_relative_eq;

    #[test]
    fn test_average_direction() {
        let network = Network::from_parts(
            vec![Point3::origin(), Point3::new(100.0, 0.0, 0.0), Point3::new(0.0, 100.0, 0.0)],
            vec![(0, 1), (0, 2)],
        )
        .unwrap();
        let dir = average_beam_direction(&network, 0);
        let expected = Vector3::new(1.0, 1.0, 0.0).normalize();
        assert_relative_eq!(dir, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_opposing_beams_fall_back_to_z() {
        let network = Network::from_parts(
            vec![Point3::origin(), Point3::new(100.0, 0.0, 0.0), Point3::new(-100.0, 0.0, 0.0)],
            vec![(0, 1), (0, 2)],
        )
        .unwrap();
        assert_eq!(average_beam_direction(&network, 0), Vector3::z());
        assert_eq!(average_beam_direction(&network, 99), Vector3::z());
    }

    #[test]
    fn test_topological_plate_sizes() {
        let config = PipelineConfig::default();
        let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (specs, _) = specify_connectors(&network);
        let (voids, report) = compute_voids(&network, &specs, None, &config);

        assert!(report.is_clean());
        assert_eq!(voids.voids.len(), 13);
        let apex = voids.get(0).unwrap();
        assert_eq!(apex.plate_size_mm, 180.0);
        assert_eq!(apex.void_depth_mm, 46.0);
        assert_eq!(apex.connected_beams, 4);
        assert!(!apex.engineered);
        // Legs all drop away from the apex
        assert!(apex.direction.z < -0.99);
    }

    #[test]
    fn test_engineered_plate_sizes() {
        let config = PipelineConfig::default();
        let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (specs, _) = specify_connectors(&network);
        let (engineered, _) = engineer_connectors(&specs, &spider_truss_loads(), &config);
        let (voids, _) = compute_voids(&network, &specs, Some(&engineered), &config);

        for void in &voids.voids {
            assert!(void.engineered);
            assert!(config.standard_block_sizes_mm.contains(&void.plate_size_mm));
        }
    }
}
