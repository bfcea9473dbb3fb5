//! # Geometry Emitter
//!
//! Turns the stage outputs into solid construction requests and hands them
//! to a [`GeometrySink`]. A sink is whatever builds the solids: a CAD host,
//! a file, or the in-memory [`RecordingSink`] used in tests.
//!
//! ## Emitted Solids
//!
//! | Role            | Shape  | Frame                         | Operation           |
//! |-----------------|--------|-------------------------------|---------------------|
//! | `beam`          | box    | along the beam axis           | add                 |
//! | `connector_plate` | box  | average beam direction        | add                 |
//! | `rod_hole`      | sphere | on the plate, by rod layout   | add                 |
//! | `connector_void`| box    | plate frame, beam-width deep  | subtract from beams |
//! | `half_lap_cut`  | box    | beam axis, one side of plane  | subtract from beam  |
//!
//! ## Example
//!
//! ```rust
//! use truss_core::config::{NetworkConfig, PipelineConfig};
//! use truss_core::emitter::{emit_geometry, GeometryInputs, RecordingSink, SolidRole};
//! use truss_core::fixtures::spider_truss_lines;
//! use truss_core::joints::specify_connectors;
//! use truss_core::network::build_network;
//!
//! let config = PipelineConfig::default();
//! let (network, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
//! let (connectors, _) = specify_connectors(&network);
//!
//! let mut sink = RecordingSink::default();
//! let inputs = GeometryInputs::new(&network, &connectors);
//! let report = emit_geometry(&mut sink, &inputs, &config);
//!
//! assert!(report.is_clean());
//! assert_eq!(sink.count(SolidRole::Beam), 12);
//! assert_eq!(sink.count(SolidRole::ConnectorPlate), 13);
//! ```

use std::f64::consts::PI;
use std::io::Write;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::engineering::EngineeredConnectors;
use crate::errors::{TrussError, TrussResult};
use crate::geometry::{midpoint, reference_axis, safe_normalize, Frame, MIN_VECTOR_LENGTH};
use crate::half_lap::{BeamRef, CutSide, HalfLapAnalysis, HalfLapJoint};
use crate::joints::{ConnectorSpec, ConnectorSpecs};
use crate::network::{Edge, Network};
use crate::report::{Stage, StageReport};
use crate::voids::{average_beam_direction, ConnectorVoids};

pub const LAYER_BEAMS: &str = "Truss_Beams";
pub const LAYER_CONNECTORS: &str = "Truss_Connectors";
pub const LAYER_VOIDS: &str = "Truss_Voids";
pub const LAYER_HALF_LAP_CUTS: &str = "Truss_HalfLapCuts";

/// Ring radius for layouts of five or more rods (mm)
const ROD_RING_RADIUS_MM: f64 = 40.0;

/// Slack allowed on unit length and perpendicularity of request frames
const FRAME_TOLERANCE: f64 = 1e-6;

/// Primitive solid, centered on its frame origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// Length along frame X, width along Y, height along Z (mm)
    Box { length: f64, width: f64, height: f64 },
    Sphere { radius: f64 },
}

impl Shape {
    fn is_valid(&self) -> bool {
        match *self {
            Shape::Box { length, width, height } => [length, width, height].iter().all(|d| d.is_finite() && *d > 0.0),
            Shape::Sphere { radius } => radius.is_finite() && radius > 0.0,
        }
    }
}

/// What a solid is in the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolidRole {
    Beam,
    ConnectorPlate,
    RodHole,
    ConnectorVoid,
    HalfLapCut,
}

/// How the solid combines with the rest of the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Add,
    /// Boolean difference from the solids with these labels
    Subtract { targets: Vec<String> },
}

/// One solid for the sink to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolidRequest {
    pub label: String,
    pub layer: String,
    pub role: SolidRole,
    pub shape: Shape,
    pub frame: Frame,
    pub operation: Operation,
}

impl SolidRequest {
    /// Reject requests a solid modeler cannot build
    pub fn validate(&self) -> TrussResult<()> {
        if !self.frame.is_finite() {
            return Err(TrussError::geometry_failure(&self.label, "Frame has non-finite components"));
        }
        if !self.frame.is_orthonormal(FRAME_TOLERANCE) {
            return Err(TrussError::geometry_failure(&self.label, "Frame axes are not orthonormal"));
        }
        if !self.shape.is_valid() {
            return Err(TrussError::geometry_failure(
                &self.label,
                format!("Invalid dimensions {:?}", self.shape),
            ));
        }
        Ok(())
    }
}

/// Receiver of solid construction requests.
pub trait GeometrySink {
    /// Build one solid. Errors are per-solid and do not stop emission.
    fn submit(&mut self, request: &SolidRequest) -> TrussResult<()>;
}

/// Keeps every request in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    pub requests: Vec<SolidRequest>,
}

impl RecordingSink {
    pub fn count(&self, role: SolidRole) -> usize {
        self.requests.iter().filter(|r| r.role == role).count()
    }

    pub fn find(&self, label: &str) -> Option<&SolidRequest> {
        self.requests.iter().find(|r| r.label == label)
    }
}

impl GeometrySink for RecordingSink {
    fn submit(&mut self, request: &SolidRequest) -> TrussResult<()> {
        self.requests.push(request.clone());
        Ok(())
    }
}

/// Writes each request as one JSON line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the writer
    pub fn finish(mut self) -> TrussResult<W> {
        self.writer
            .flush()
            .map_err(|e| TrussError::file_error("flush", "geometry stream", e.to_string()))?;
        Ok(self.writer)
    }
}

impl<W: Write> GeometrySink for JsonLinesSink<W> {
    fn submit(&mut self, request: &SolidRequest) -> TrussResult<()> {
        let line = serde_json::to_string(request).map_err(|e| TrussError::geometry_failure(&request.label, e.to_string()))?;
        writeln!(self.writer, "{}", line).map_err(|e| TrussError::geometry_failure(&request.label, e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}

/// Everything the emitter draws from. Only network and connectors are
/// required; the rest adds solids when present.
#[derive(Debug, Clone, Copy)]
pub struct GeometryInputs<'a> {
    pub network: &'a Network,
    pub connectors: &'a ConnectorSpecs,
    pub engineered: Option<&'a EngineeredConnectors>,
    pub voids: Option<&'a ConnectorVoids>,
    pub half_laps: Option<&'a HalfLapAnalysis>,
}

impl<'a> GeometryInputs<'a> {
    pub fn new(network: &'a Network, connectors: &'a ConnectorSpecs) -> Self {
        GeometryInputs {
            network,
            connectors,
            engineered: None,
            voids: None,
            half_laps: None,
        }
    }

    pub fn with_engineered(mut self, engineered: &'a EngineeredConnectors) -> Self {
        self.engineered = Some(engineered);
        self
    }

    pub fn with_voids(mut self, voids: &'a ConnectorVoids) -> Self {
        self.voids = Some(voids);
        self
    }

    pub fn with_half_laps(mut self, half_laps: &'a HalfLapAnalysis) -> Self {
        self.half_laps = Some(half_laps);
        self
    }
}

/// Rod hole offsets from the plate center, in plate (x, y)
pub fn rod_layout(rods: usize) -> Vec<(f64, f64)> {
    match rods {
        0 => Vec::new(),
        1 => vec![(0.0, 0.0)],
        2 => vec![(-25.0, 0.0), (25.0, 0.0)],
        3 => vec![(-40.0, 0.0), (0.0, 0.0), (40.0, 0.0)],
        4 => vec![(0.0, -35.0), (-35.0, 20.0), (35.0, 20.0), (0.0, 45.0)],
        n => (0..n)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / n as f64;
                (ROD_RING_RADIUS_MM * angle.cos(), ROD_RING_RADIUS_MM * angle.sin())
            })
            .collect(),
    }
}

/// Frame of a connector plate: X on the average beam direction, Z normal
/// to the plate.
pub fn plate_frame(position: Point3<f64>, direction: &Vector3<f64>) -> Frame {
    let along = safe_normalize(direction);
    let normal = safe_normalize(&along.cross(&reference_axis(&along)));
    let plate_y = normal.cross(&along);
    Frame::from_xy(position, &along, &plate_y)
}

pub fn beam_label(edge: &Edge) -> String {
    format!("Beam_{}", edge.label())
}

fn beam_request(network: &Network, edge: &Edge, config: &PipelineConfig) -> TrussResult<SolidRequest> {
    let (start, end) = match (network.node(edge.start), network.node(edge.end)) {
        (Some(s), Some(e)) => (s.position, e.position),
        _ => return Err(TrussError::geometry_failure(beam_label(edge), "Beam endpoint missing")),
    };
    Ok(SolidRequest {
        label: beam_label(edge),
        layer: LAYER_BEAMS.to_string(),
        role: SolidRole::Beam,
        shape: Shape::Box {
            length: nalgebra::distance(&start, &end),
            width: config.beam.width_mm,
            height: config.beam.height_mm,
        },
        frame: Frame::along(midpoint(&start, &end), &(end - start)),
        operation: Operation::Add,
    })
}

fn connector_requests(inputs: &GeometryInputs<'_>, spec: &ConnectorSpec, config: &PipelineConfig) -> Vec<SolidRequest> {
    let engineered = inputs.engineered.and_then(|e| e.get(spec.node_id));
    let (size, rods) = match engineered {
        Some(c) => (c.result.block.size_mm, c.result.rods),
        None => (spec.class.plate_size_mm(), spec.rods),
    };
    let frame = plate_frame(spec.position, &average_beam_direction(inputs.network, spec.node_id));
    let block_label = format!("Block_N{}", spec.node_id);

    let mut requests = vec![SolidRequest {
        label: block_label,
        layer: LAYER_CONNECTORS.to_string(),
        role: SolidRole::ConnectorPlate,
        shape: Shape::Box {
            length: size,
            width: size,
            height: config.connector_geometry.plywood_thickness_mm,
        },
        frame,
        operation: Operation::Add,
    }];

    for (index, (x, y)) in rod_layout(rods).into_iter().enumerate() {
        requests.push(SolidRequest {
            label: format!("Rod_N{}_{}", spec.node_id, index + 1),
            layer: LAYER_CONNECTORS.to_string(),
            role: SolidRole::RodHole,
            shape: Shape::Sphere {
                radius: config.connector_geometry.rod_diameter_mm / 2.0,
            },
            frame: Frame {
                origin: frame.to_world(&Vector3::new(x, y, 0.0)),
                ..frame
            },
            operation: Operation::Add,
        });
    }
    requests
}

fn void_requests(network: &Network, voids: &ConnectorVoids) -> Vec<SolidRequest> {
    voids
        .voids
        .iter()
        .map(|void| {
            let targets = network.incident_edges(void.node_id).map(beam_label).collect();
            SolidRequest {
                label: format!("Void_N{}_{}mm", void.node_id, void.plate_size_mm.round()),
                layer: LAYER_VOIDS.to_string(),
                role: SolidRole::ConnectorVoid,
                shape: Shape::Box {
                    length: void.length_mm(),
                    width: void.width_mm(),
                    height: void.void_depth_mm,
                },
                frame: plate_frame(void.position, &void.direction),
                operation: Operation::Subtract { targets },
            }
        })
        .collect()
}

/// The two cut boxes of a half-lap, one on each side of the cut plane
pub fn half_lap_requests(network: &Network, joint: &HalfLapJoint) -> TrussResult<[SolidRequest; 2]> {
    let cut_box = |beam: BeamRef, side: CutSide| -> TrussResult<SolidRequest> {
        let edge = network
            .edge(beam.edge_id)
            .ok_or_else(|| TrussError::geometry_failure(joint.label(), format!("Beam {} not in network", beam.label())))?;
        let direction = network.edge_vector(edge);
        let mut across = joint.cut_normal.cross(&direction);
        if across.norm() < MIN_VECTOR_LENGTH {
            across = direction.cross(&reference_axis(&direction));
        }
        let frame = Frame::from_xy(joint.point, &direction, &across);
        let sign = match side {
            CutSide::Positive => 1.0,
            CutSide::Negative => -1.0,
        };

        Ok(SolidRequest {
            label: format!("HalfLap_{}_on_{}", joint.label(), beam.label()),
            layer: LAYER_HALF_LAP_CUTS.to_string(),
            role: SolidRole::HalfLapCut,
            shape: Shape::Box {
                length: joint.cut.length_mm,
                width: joint.cut.width_mm,
                height: joint.cut.depth_mm,
            },
            frame: frame.translated(&(frame.z_axis * (sign * joint.cut.depth_mm / 2.0))),
            operation: Operation::Subtract {
                targets: vec![beam_label(edge)],
            },
        })
    };

    Ok([
        cut_box(joint.beam1, joint.beam1_side)?,
        cut_box(joint.beam2, joint.beam2_side)?,
    ])
}

fn submit<S: GeometrySink>(sink: &mut S, report: &mut StageReport, request: TrussResult<SolidRequest>) {
    let result = request.and_then(|r| {
        r.validate()?;
        sink.submit(&r)?;
        debug!(label = %r.label, role = ?r.role, "Solid submitted");
        Ok(())
    });
    match result {
        Ok(()) => report.record_success(),
        Err(e) => {
            let item = match &e {
                TrussError::GeometryConstructionFailure { label, .. } => label.clone(),
                other => other.error_code().to_string(),
            };
            report.record_skip(item, e);
        }
    }
}

/// Emit every solid for the given inputs. Failed solids are skipped and
/// listed in the report.
pub fn emit_geometry<S: GeometrySink>(sink: &mut S, inputs: &GeometryInputs<'_>, config: &PipelineConfig) -> StageReport {
    let mut report = StageReport::new(Stage::Geometry);

    for edge in inputs.network.edges() {
        submit(sink, &mut report, beam_request(inputs.network, edge, config));
    }

    for spec in &inputs.connectors.connectors {
        for request in connector_requests(inputs, spec, config) {
            submit(sink, &mut report, Ok(request));
        }
    }

    if let Some(voids) = inputs.voids {
        for request in void_requests(inputs.network, voids) {
            submit(sink, &mut report, Ok(request));
        }
    }

    if let Some(half_laps) = inputs.half_laps {
        for joint in &half_laps.joints {
            match half_lap_requests(inputs.network, joint) {
                Ok(pair) => {
                    for request in pair {
                        submit(sink, &mut report, Ok(request));
                    }
                }
                Err(e) => submit(sink, &mut report, Err(e)),
            }
        }
    }

    info!(solids = report.succeeded, failed = report.skipped_count(), "Geometry emitted");
    report.log_summary();
    report
}
