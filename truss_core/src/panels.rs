//! # Connector Panels
//!
//! Each node gets a pair of square plywood panels that cross along the
//! average beam direction. The threaded rods pass through a hole grid in
//! the panels and every beam end sits in a pocket cut into each panel.
//!
//! ## Sizing
//!
//! ```text
//! by_beams = base + (beams - 1) × increment
//! by_rods  = (rod_d + 2 × edge) × ceil(√rods)
//! size     = min(round_up(max(by_beams, by_rods, base), step), max)
//! ```
//!
//! With the defaults an end connector is 150 mm, a two-way joint 200 mm
//! and a four-beam apex 300 mm.
//!
//! ## Orientation
//!
//! Both panels have their X axis on the average beam direction. Panel A
//! lies in the plane containing the reference axis, panel B is turned 90°
//! about X. Rod holes are laid out in panel A coordinates.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{PanelConfig, PipelineConfig};
use crate::engineering::EngineeredConnectors;
use crate::errors::TrussError;
use crate::geometry::{reference_axis, safe_normalize, Frame, MIN_VECTOR_LENGTH};
use crate::joints::{ConnectorSpecs, JointClass};
use crate::network::Network;
use crate::report::{Stage, StageReport};
use crate::voids::average_beam_direction;

/// Which of the two crossed panels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelSide {
    A,
    B,
}

impl PanelSide {
    pub fn code(&self) -> &'static str {
        match self {
            PanelSide::A => "A",
            PanelSide::B => "B",
        }
    }
}

/// One square panel, centered on its frame origin with the thickness
/// along the frame Z axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub side: PanelSide,
    pub frame: Frame,
    pub size_mm: f64,
    pub thickness_mm: f64,
}

impl Panel {
    /// Corner points of the mid-plane outline, counter-clockwise about Z
    pub fn outline(&self) -> [Point3<f64>; 4] {
        let h = self.size_mm / 2.0;
        [
            self.frame.to_world(&Vector3::new(-h, -h, 0.0)),
            self.frame.to_world(&Vector3::new(h, -h, 0.0)),
            self.frame.to_world(&Vector3::new(h, h, 0.0)),
            self.frame.to_world(&Vector3::new(-h, h, 0.0)),
        ]
    }

    pub fn area_mm2(&self) -> f64 {
        self.size_mm * self.size_mm
    }
}

/// Rod hole position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RodHole {
    /// From the lower-left panel corner (mm)
    pub x_mm: f64,
    pub y_mm: f64,
    /// On the panel A mid-plane
    pub position: Point3<f64>,
}

/// Slot a beam end sits in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamPocket {
    /// Node at the far end of the beam
    pub neighbor: usize,
    pub side: PanelSide,
    /// Box frame: X into the beam, centered on the pocket
    pub frame: Frame,
    pub depth_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Panel pair at one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePanels {
    pub node_id: usize,
    pub class: JointClass,
    pub position: Point3<f64>,
    pub beams: usize,
    pub rods: usize,
    /// Rod count came from the engineering stage
    pub engineered: bool,
    pub size_mm: f64,
    pub thickness_mm: f64,
    pub panel_a: Panel,
    pub panel_b: Panel,
    pub rod_holes: Vec<RodHole>,
    pub pockets: Vec<BeamPocket>,
}

impl NodePanels {
    pub fn name(&self) -> String {
        format!("N{}", self.node_id)
    }

    pub fn panels(&self) -> [&Panel; 2] {
        [&self.panel_a, &self.panel_b]
    }
}

/// Flat outline handed to nesting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelProfile {
    pub name: String,
    pub node_id: usize,
    pub side: PanelSide,
    pub size_mm: f64,
    pub thickness_mm: f64,
    pub rod_holes: usize,
    pub corner_radius_mm: f64,
    pub area_mm2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelSummary {
    pub total_panels: usize,
    pub total_rods: usize,
    pub total_beam_pockets: usize,
    pub total_area_mm2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorPanels {
    pub panels: Vec<NodePanels>,
}

impl ConnectorPanels {
    pub fn get(&self, node_id: usize) -> Option<&NodePanels> {
        self.panels.iter().find(|p| p.node_id == node_id)
    }

    pub fn summary(&self) -> PanelSummary {
        PanelSummary {
            total_panels: 2 * self.panels.len(),
            total_rods: self.panels.iter().map(|p| p.rods).sum(),
            total_beam_pockets: self.panels.iter().map(|p| p.pockets.len()).sum(),
            total_area_mm2: self
                .panels
                .iter()
                .flat_map(|p| p.panels())
                .map(Panel::area_mm2)
                .sum(),
        }
    }

    /// Two profiles per node, A then B
    pub fn profiles(&self, config: &PanelConfig) -> Vec<PanelProfile> {
        self.panels
            .iter()
            .flat_map(|node| {
                node.panels().map(|panel| PanelProfile {
                    name: format!("{}_{}", node.name(), panel.side.code()),
                    node_id: node.node_id,
                    side: panel.side,
                    size_mm: panel.size_mm,
                    thickness_mm: panel.thickness_mm,
                    rod_holes: node.rod_holes.len(),
                    corner_radius_mm: config.corner_radius_mm,
                    area_mm2: panel.area_mm2(),
                })
            })
            .collect()
    }
}

/// Square panel side for a node (mm)
pub fn panel_size_mm(beams: usize, rods: usize, rod_diameter_mm: f64, config: &PanelConfig) -> f64 {
    let by_beams = config.base_size_mm + beams.saturating_sub(1) as f64 * config.size_increment_mm;
    let grid = (rods as f64).sqrt().ceil();
    let by_rods = (rod_diameter_mm + 2.0 * config.rod_edge_distance_mm) * grid;

    let size = by_beams.max(by_rods).max(config.base_size_mm);
    let stepped = (size / config.size_step_mm).ceil() * config.size_step_mm;
    stepped.min(config.max_size_mm)
}

/// Rod hole grid on a panel, row by row from the lower-left corner.
///
/// A single rod sits in the middle; otherwise the outer holes keep the
/// edge distance and the last row may be partly filled.
pub fn rod_hole_grid(size_mm: f64, rods: usize, config: &PanelConfig) -> Vec<(f64, f64)> {
    let grid = (rods as f64).sqrt().ceil() as usize;
    if grid <= 1 {
        return (0..rods).map(|_| (size_mm / 2.0, size_mm / 2.0)).collect();
    }

    let edge = config.rod_edge_distance_mm;
    let spacing = (size_mm - 2.0 * edge) / (grid - 1) as f64;
    (0..rods)
        .map(|i| {
            let (row, col) = (i / grid, i % grid);
            (edge + col as f64 * spacing, edge + row as f64 * spacing)
        })
        .collect()
}

/// Crossed panel frames at `origin` for an average beam direction
pub fn panel_frames(origin: Point3<f64>, direction: &Vector3<f64>) -> (Frame, Frame) {
    let along = safe_normalize(direction);
    let normal = safe_normalize(&along.cross(&reference_axis(&along)));
    let in_plane = normal.cross(&along);
    (
        Frame::from_xy(origin, &along, &in_plane),
        Frame::from_xy(origin, &along, &normal),
    )
}

fn pocket(
    neighbor: usize,
    panel: &Panel,
    beam_direction: &Vector3<f64>,
    config: &PipelineConfig,
) -> BeamPocket {
    let depth = config.panels.pocket_depth_mm;
    let frame = if beam_direction.cross(&panel.frame.y_axis).norm() < MIN_VECTOR_LENGTH {
        Frame::along(panel.frame.origin, beam_direction)
    } else {
        Frame::from_xy(panel.frame.origin, beam_direction, &panel.frame.y_axis)
    };
    BeamPocket {
        neighbor,
        side: panel.side,
        frame: frame.translated(&(frame.x_axis * (depth / 2.0))),
        depth_mm: depth,
        width_mm: config.beam.width_mm,
        height_mm: config.beam.height_mm,
    }
}

/// Lay out the panel pair for every classified connector.
///
/// Rod counts come from the engineered connector where one exists and
/// from the archetype otherwise. Nodes missing from the network or left
/// without beams are skipped and reported.
pub fn design_panels(
    network: &Network,
    specs: &ConnectorSpecs,
    engineered: Option<&EngineeredConnectors>,
    config: &PipelineConfig,
) -> (ConnectorPanels, StageReport) {
    let mut report = StageReport::new(Stage::Panels);
    let mut panels = Vec::with_capacity(specs.connectors.len());
    let panel_config = &config.panels;

    for spec in &specs.connectors {
        let Some(node) = network.node(spec.node_id) else {
            report.record_skip(
                format!("node {}", spec.node_id),
                TrussError::geometry_failure(format!("Panel_N{}", spec.node_id), "Node not in network"),
            );
            continue;
        };
        let beams = network.degree(spec.node_id);
        if beams == 0 {
            report.record_skip(
                format!("node {}", spec.node_id),
                TrussError::IsolatedNode { node_id: spec.node_id },
            );
            continue;
        }

        let engineered_rods = engineered.and_then(|e| e.get(spec.node_id)).map(|c| c.result.rods);
        let rods = engineered_rods.unwrap_or(spec.rods);
        let size_mm = panel_size_mm(beams, rods, config.connector_geometry.rod_diameter_mm, panel_config);

        let direction = average_beam_direction(network, spec.node_id);
        let (frame_a, frame_b) = panel_frames(node.position, &direction);
        if !(frame_a.is_finite() && frame_b.is_finite()) {
            report.record_skip(
                format!("node {}", spec.node_id),
                TrussError::geometry_failure(format!("Panel_N{}", spec.node_id), "Panel frame is not finite"),
            );
            continue;
        }
        let panel = |side, frame| Panel {
            side,
            frame,
            size_mm,
            thickness_mm: panel_config.thickness_mm,
        };
        let panel_a = panel(PanelSide::A, frame_a);
        let panel_b = panel(PanelSide::B, frame_b);

        let half = size_mm / 2.0;
        let rod_holes = rod_hole_grid(size_mm, rods, panel_config)
            .into_iter()
            .map(|(x, y)| RodHole {
                x_mm: x,
                y_mm: y,
                position: frame_a.to_world(&Vector3::new(x - half, y - half, 0.0)),
            })
            .collect();

        let mut pockets = Vec::with_capacity(2 * beams);
        for neighbor in network.neighbors(spec.node_id) {
            let Some(other) = network.node(neighbor) else {
                continue;
            };
            let beam_direction = safe_normalize(&(other.position - node.position));
            for panel in [&panel_a, &panel_b] {
                pockets.push(pocket(neighbor, panel, &beam_direction, config));
            }
        }

        debug!(node = spec.node_id, beams, rods, size_mm, "Panels laid out");
        panels.push(NodePanels {
            node_id: spec.node_id,
            class: spec.class,
            position: node.position,
            beams,
            rods,
            engineered: engineered_rods.is_some(),
            size_mm,
            thickness_mm: panel_config.thickness_mm,
            panel_a,
            panel_b,
            rod_holes,
            pockets,
        });
        report.record_success();
    }

    let panels = ConnectorPanels { panels };
    let summary = panels.summary();
    info!(
        panels = summary.total_panels,
        rods = summary.total_rods,
        pockets = summary.total_beam_pockets,
        area_m2 = summary.total_area_mm2 / 1.0e6,
        "Connector panels designed"
    );
    report.log_summary();

    (panels, report)
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

    fn spider() -> (Network, ConnectorSpecs) {
        let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (specs, _) = specify_connectors(&network);
        (network, specs)
    }

    #[test]
    fn test_panel_sizes() {
        let config = PanelConfig::default();
        assert_relative_eq!(panel_size_mm(1, 2, 8.0, &config), 150.0);
        assert_relative_eq!(panel_size_mm(2, 4, 8.0, &config), 200.0);
        assert_relative_eq!(panel_size_mm(3, 4, 8.0, &config), 250.0);
        assert_relative_eq!(panel_size_mm(4, 6, 8.0, &config), 300.0);
        assert_relative_eq!(panel_size_mm(1, 0, 8.0, &config), 150.0);
        // 58 × 4 = 232, rounded up to the next 10
        assert_relative_eq!(panel_size_mm(1, 16, 8.0, &config), 240.0);
        // 150 + 7 × 50 = 500, capped
        assert_relative_eq!(panel_size_mm(8, 2, 8.0, &config), 400.0);
    }

    #[test]
    fn test_rod_hole_grid() {
        let config = PanelConfig::default();
        assert!(rod_hole_grid(150.0, 0, &config).is_empty());
        assert_eq!(rod_hole_grid(150.0, 1, &config), vec![(75.0, 75.0)]);
        assert_eq!(
            rod_hole_grid(150.0, 4, &config),
            vec![(25.0, 25.0), (125.0, 25.0), (25.0, 125.0), (125.0, 125.0)]
        );

        let partial = rod_hole_grid(200.0, 5, &config);
        assert_eq!(partial.len(), 5);
        assert_eq!(partial[2], (175.0, 25.0));
        assert_eq!(partial[4], (100.0, 100.0));
        assert!(partial.iter().all(|&(x, y)| (25.0..=175.0).contains(&x) && (25.0..=175.0).contains(&y)));
    }

    #[test]
    fn test_panels_cross_at_right_angles() {
        let direction = Vector3::new(1.0, 1.0, -2.0);
        let (a, b) = panel_frames(Point3::new(10.0, 20.0, 30.0), &direction);
        assert!(a.is_orthonormal(1e-9));
        assert!(b.is_orthonormal(1e-9));
        assert_relative_eq!(a.x_axis, direction.normalize(), epsilon = 1e-12);
        assert_relative_eq!(b.x_axis, a.x_axis, epsilon = 1e-12);
        assert_relative_eq!(a.z_axis.dot(&b.z_axis), 0.0, epsilon = 1e-12);

        // Upright direction still gives two distinct panels
        let (a, b) = panel_frames(Point3::origin(), &Vector3::z());
        assert_relative_eq!(a.z_axis.dot(&b.z_axis), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_outline_corners() {
        let panel = Panel {
            side: PanelSide::A,
            frame: Frame::world(Point3::new(0.0, 0.0, 100.0)),
            size_mm: 150.0,
            thickness_mm: 18.0,
        };
        let corners = panel.outline();
        assert_relative_eq!(corners[0], Point3::new(-75.0, -75.0, 100.0), epsilon = 1e-12);
        assert_relative_eq!(corners[2], Point3::new(75.0, 75.0, 100.0), epsilon = 1e-12);
        assert_relative_eq!(panel.area_mm2(), 22500.0);
    }

    #[test]
    fn test_spider_topological_panels() {
        let config = PipelineConfig::default();
        let (network, specs) = spider();
        let (panels, report) = design_panels(&network, &specs, None, &config);

        assert!(report.is_clean());
        assert_eq!(panels.panels.len(), 13);

        let apex = panels.get(0).unwrap();
        assert_eq!((apex.beams, apex.rods), (4, 6));
        assert!(!apex.engineered);
        assert_relative_eq!(apex.size_mm, 300.0);
        assert_eq!(apex.rod_holes.len(), 6);
        assert_eq!(apex.pockets.len(), 8);
        assert_eq!(apex.name(), "N0");

        for hole in &apex.rod_holes {
            let offset = hole.position - apex.position;
            assert_relative_eq!(offset.dot(&apex.panel_a.frame.z_axis), 0.0, epsilon = 1e-9);
        }
        for pocket in &apex.pockets {
            assert!(pocket.frame.is_orthonormal(1e-9));
            assert_relative_eq!((pocket.frame.origin - apex.position).norm(), 15.0, epsilon = 1e-9);
        }

        let summary = panels.summary();
        assert_eq!(summary.total_panels, 26);
        assert_eq!(summary.total_rods, 38);
        // Two pockets per beam end, 24 beam ends
        assert_eq!(summary.total_beam_pockets, 48);
    }

    #[test]
    fn test_engineered_rods_drive_panels() {
        let config = PipelineConfig::default();
        let (network, specs) = spider();
        let (engineered, _) = engineer_connectors(&specs, &spider_truss_loads(), &config);
        let (panels, _) = design_panels(&network, &specs, Some(&engineered), &config);

        for node in &panels.panels {
            assert!(node.engineered);
            let expected = engineered.get(node.node_id).unwrap().result.rods;
            assert_eq!(node.rods, expected);
            assert_eq!(node.rod_holes.len(), expected);
            assert!(node.size_mm >= 150.0 && node.size_mm <= 400.0);
        }
        assert_eq!(panels.summary().total_rods, engineered.summary.total_rods);
    }

    #[test]
    fn test_nesting_profiles() {
        let config = PipelineConfig::default();
        let (network, specs) = spider();
        let (panels, _) = design_panels(&network, &specs, None, &config);
        let profiles = panels.profiles(&config.panels);

        assert_eq!(profiles.len(), 26);
        assert_eq!(profiles[0].name, "N0_A");
        assert_eq!(profiles[1].name, "N0_B");
        assert_relative_eq!(profiles[0].area_mm2, 90000.0);
        let total: f64 = profiles.iter().map(|p| p.area_mm2).sum();
        assert_relative_eq!(total, panels.summary().total_area_mm2);
    }

    #[test]
    fn test_unknown_node_skipped() {
        let config = PipelineConfig::default();
        let (network, mut specs) = spider();
        let mut stray = specs.connectors[0].clone();
        stray.node_id = 99;
        specs.connectors.push(stray);

        let (panels, report) = design_panels(&network, &specs, None, &config);
        assert_eq!(panels.panels.len(), 13);
        assert_eq!(report.skipped_count(), 1);
        assert!(report.skipped[0].error.is_item_level());
    }
}
