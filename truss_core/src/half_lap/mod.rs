//! # Half-Lap Analyzer
//!
//! Finds every pair of beams whose solids overlap and sizes a half-lap
//! joint for each.
//!
//! ## Cut Sizing
//!
//! ```text
//! θ       = acos(|d₁ · d₂|)                        (0° to 90°)
//! L_min   = min_length_factor × W                  (3W)
//! L       = L_min / sin θ                          θ ≥ min_angle
//!         = parallel_fallback                      θ < min_angle
//! L_final = clamp(L, clamp_min_factor × W, max_cut_length)
//! depth   = W / 2,  width = W
//! ```
//!
//! Shallow crossings need longer laps to keep the same bearing face;
//! below the angle floor the division is unstable, so a fixed length is
//! used.
//!
//! Overlap is strictly volumetric. Beams that only share an endpoint meet
//! face to face and produce no record. Beams at an angle that share a node
//! do interpenetrate near the node and are reported like any crossing.
//!
//! ## Example
//!
//! ```rust
//! use truss_core::config::{BeamSection, HalfLapConfig};
//! use truss_core::half_lap::cut_length_mm;
//!
//! let beam = BeamSection::default();
//! let length = cut_length_mm(90.0, &beam, &HalfLapConfig::default());
//! assert!((length - 138.0).abs() < 1e-9);
//! ```

pub mod solid;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{BeamSection, HalfLapConfig, PipelineConfig};
use crate::errors::{TrussError, TrussResult};
use crate::geometry::{axis_angle_deg, reference_axis, safe_normalize, segment_distance, MIN_VECTOR_LENGTH};
use crate::network::{Edge, Network};
use crate::report::{Stage, StageReport};

pub use solid::{overlap, BeamSolid, Overlap};

/// One member of a beam pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamRef {
    pub edge_id: usize,
    pub start: usize,
    pub end: usize,
}

impl BeamRef {
    pub fn from_edge(edge: &Edge) -> Self {
        BeamRef {
            edge_id: edge.id,
            start: edge.start,
            end: edge.end,
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Which side of the cut plane material is removed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutSide {
    /// Along +cut_normal
    Positive,
    /// Along −cut_normal
    Negative,
}

/// Half-lap cut dimensions (mm), same for both beams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfLapCut {
    pub length_mm: f64,
    pub width_mm: f64,
    pub depth_mm: f64,
}

/// A beam pair that overlaps, with its joint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfLapJoint {
    pub beam1: BeamRef,
    pub beam2: BeamRef,
    /// Centroid of the overlap volume
    pub point: Point3<f64>,
    pub overlap_volume_mm3: f64,
    pub angle_deg: f64,
    /// Closest approach of the two beam axes (mm)
    pub centerline_distance_mm: f64,
    pub cut: HalfLapCut,
    /// Normal of the plane the two laps meet on (d₁ × d₂, world Z if parallel)
    pub cut_normal: Vector3<f64>,
    pub beam1_side: CutSide,
    pub beam2_side: CutSide,
}

impl HalfLapJoint {
    pub fn label(&self) -> String {
        format!("{}_x_{}", self.beam1.label(), self.beam2.label())
    }
}

/// Output of the half-lap stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HalfLapAnalysis {
    pub beam: BeamSection,
    pub pairs_tested: usize,
    pub joints: Vec<HalfLapJoint>,
}

impl HalfLapAnalysis {
    pub fn average_angle_deg(&self) -> f64 {
        if self.joints.is_empty() {
            return 0.0;
        }
        self.joints.iter().map(|j| j.angle_deg).sum::<f64>() / self.joints.len() as f64
    }

    /// (shortest, longest) cut length, if any joints exist
    pub fn cut_length_range_mm(&self) -> Option<(f64, f64)> {
        let mut lengths = self.joints.iter().map(|j| j.cut.length_mm);
        let first = lengths.next()?;
        Some(lengths.fold((first, first), |(lo, hi), l| (lo.min(l), hi.max(l))))
    }

    /// Joints that touch a given edge
    pub fn joints_for_edge(&self, edge_id: usize) -> impl Iterator<Item = &HalfLapJoint> {
        self.joints
            .iter()
            .filter(move |j| j.beam1.edge_id == edge_id || j.beam2.edge_id == edge_id)
    }
}

/// Angle-dependent half-lap length (mm), clamped to the fabrication range.
///
/// The upper clamp wins when the two bounds cross.
pub fn cut_length_mm(angle_deg: f64, beam: &BeamSection, config: &HalfLapConfig) -> f64 {
    let min_cut = config.min_length_factor * beam.width_mm;
    let sin_angle = angle_deg.to_radians().sin();
    let raw = if sin_angle < config.min_angle_deg.to_radians().sin() {
        config.parallel_fallback_mm
    } else {
        min_cut / sin_angle
    };
    raw.max(config.clamp_min_factor * beam.width_mm)
        .min(config.max_cut_length_mm)
}

/// Full cut for a given crossing angle
pub fn size_cut(angle_deg: f64, beam: &BeamSection, config: &HalfLapConfig) -> HalfLapCut {
    HalfLapCut {
        length_mm: cut_length_mm(angle_deg, beam, config),
        width_mm: beam.width_mm,
        depth_mm: beam.width_mm / 2.0,
    }
}

/// Normal of the plane two beam directions span.
///
/// Parallel beams span no plane; the normal is then perpendicular to `d1`,
/// world Z for lying beams and off the reference axis for upright ones.
pub fn cut_normal(d1: &Vector3<f64>, d2: &Vector3<f64>) -> Vector3<f64> {
    let cross = d1.cross(d2);
    if cross.norm() >= MIN_VECTOR_LENGTH {
        return safe_normalize(&cross);
    }
    let axis = safe_normalize(d1);
    let reference = reference_axis(&axis);
    safe_normalize(&(reference - axis * axis.dot(&reference)))
}

fn beam_axis(network: &Network, edge: &Edge) -> TrussResult<(Point3<f64>, Point3<f64>)> {
    let start = network
        .node(edge.start)
        .ok_or_else(|| TrussError::geometry_failure(edge.label(), "Start node missing"))?;
    let end = network
        .node(edge.end)
        .ok_or_else(|| TrussError::geometry_failure(edge.label(), "End node missing"))?;
    Ok((start.position, end.position))
}

/// Test one beam pair; `Ok(None)` when the solids do not overlap.
pub fn analyze_pair(
    network: &Network,
    first: &Edge,
    second: &Edge,
    config: &PipelineConfig,
) -> TrussResult<Option<HalfLapJoint>> {
    let (p1, q1) = beam_axis(network, first)?;
    let (p2, q2) = beam_axis(network, second)?;
    let a = BeamSolid::from_axis(&format!("Beam_{}", first.label()), &p1, &q1, &config.beam)?;
    let b = BeamSolid::from_axis(&format!("Beam_{}", second.label()), &p2, &q2, &config.beam)?;

    let found = match overlap(&a, &b) {
        Some(found) if found.volume_mm3 > config.half_lap.overlap_volume_tolerance_mm3 => found,
        _ => return Ok(None),
    };
    if !found.centroid.coords.iter().all(|c| c.is_finite()) {
        return Err(TrussError::geometry_failure(
            format!("{}_x_{}", first.label(), second.label()),
            "Overlap centroid is not finite",
        ));
    }

    let angle_deg = axis_angle_deg(&a.direction(), &b.direction());
    Ok(Some(HalfLapJoint {
        beam1: BeamRef::from_edge(first),
        beam2: BeamRef::from_edge(second),
        point: found.centroid,
        overlap_volume_mm3: found.volume_mm3,
        angle_deg,
        centerline_distance_mm: segment_distance(&p1, &q1, &p2, &q2),
        cut: size_cut(angle_deg, &config.beam, &config.half_lap),
        cut_normal: cut_normal(&a.direction(), &b.direction()),
        beam1_side: CutSide::Positive,
        beam2_side: CutSide::Negative,
    }))
}

/// Test every unordered pair of beams.
///
/// O(E²) pairs, each pruned by bounding spheres before the exact test. A
/// pair whose solids cannot be built is skipped and reported.
pub fn analyze_half_laps(network: &Network, config: &PipelineConfig) -> (HalfLapAnalysis, StageReport) {
    let edges = network.edges();
    let pairs = edges.len() * edges.len().saturating_sub(1) / 2;
    info!(beams = edges.len(), pairs, "Testing beam pairs for overlap");

    let mut report = StageReport::new(Stage::HalfLap);
    let mut joints = Vec::new();

    for (i, first) in edges.iter().enumerate() {
        for second in &edges[i + 1..] {
            match analyze_pair(network, first, second, config) {
                Ok(Some(joint)) => {
                    debug!(
                        beam1 = %joint.beam1.label(),
                        beam2 = %joint.beam2.label(),
                        angle = joint.angle_deg,
                        volume_mm3 = joint.overlap_volume_mm3,
                        cut_mm = joint.cut.length_mm,
                        "Beams intersect"
                    );
                    joints.push(joint);
                    report.record_success();
                }
                Ok(None) => report.record_success(),
                Err(e) => report.record_skip(format!("beams {} x {}", first.label(), second.label()), e),
            }
        }
    }

    let analysis = HalfLapAnalysis {
        beam: config.beam,
        pairs_tested: pairs,
        joints,
    };
    info!(
        intersections = analysis.joints.len(),
        average_angle = analysis.average_angle_deg(),
        "Half-lap analysis complete"
    );
    report.log_summary();

    (analysis, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::fixtures::spider_truss_lines;
    use crate::network::build_network;
    use approx::assert_relative_eq;

    fn network(points: Vec<[f64; 3]>, edges: Vec<(usize, usize)>) -> Network {
        let positions = points.into_iter().map(|p| Point3::new(p[0], p[1], p[2])).collect();
        Network::from_parts(positions, edges).unwrap()
    }

    fn crossing(angle_deg: f64) -> Network {
        let (s, c) = angle_deg.to_radians().sin_cos();
        network(
            vec![
                [-500.0, 0.0, 0.0],
                [500.0, 0.0, 0.0],
                [-500.0 * c, -500.0 * s, 0.0],
                [500.0 * c, 500.0 * s, 0.0],
            ],
            vec![(0, 1), (2, 3)],
        )
    }

    #[test]
    fn test_perpendicular_crossing() {
        let config = PipelineConfig::default();
        let (analysis, report) = analyze_half_laps(&crossing(90.0), &config);

        assert!(report.is_clean());
        assert_eq!(analysis.pairs_tested, 1);
        assert_eq!(analysis.joints.len(), 1);

        let joint = &analysis.joints[0];
        assert_relative_eq!(joint.angle_deg, 90.0, epsilon = 1e-9);
        assert_relative_eq!(joint.cut.length_mm, 3.0 * 46.0, epsilon = 1e-9);
        assert_relative_eq!(joint.cut.depth_mm, 23.0);
        assert_relative_eq!(joint.cut.width_mm, 46.0);
        assert_relative_eq!(joint.point, Point3::origin(), epsilon = 1e-6);
        assert_relative_eq!(joint.overlap_volume_mm3, 46.0 * 46.0 * 97.0, max_relative = 1e-6);
        assert_relative_eq!(joint.cut_normal.z.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_oblique_crossing_volume() {
        // Two slabs of width w crossing at θ meet in a parallelogram of
        // area w²/sinθ, extruded through the beam height
        let config = PipelineConfig::default();
        let (w, h) = (config.beam.width_mm, config.beam.height_mm);
        for angle in [30.0_f64, 60.0] {
            let (analysis, _) = analyze_half_laps(&crossing(angle), &config);
            assert_eq!(analysis.joints.len(), 1);
            let joint = &analysis.joints[0];
            let expected = w * w * h / angle.to_radians().sin();
            assert_relative_eq!(joint.overlap_volume_mm3, expected, max_relative = 1e-6);
            assert_relative_eq!(joint.angle_deg, angle, epsilon = 1e-6);
            assert_relative_eq!(joint.point, Point3::origin(), epsilon = 1e-6);
            assert_relative_eq!(joint.centerline_distance_mm, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_legs_meeting_at_apex_are_recorded() {
        let config = PipelineConfig::default();
        let (net, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (analysis, _) = analyze_half_laps(&net, &config);

        let at_apex = |b: &BeamRef| b.start == 0 || b.end == 0;
        let apex: Vec<&HalfLapJoint> = analysis
            .joints
            .iter()
            .filter(|j| at_apex(&j.beam1) && at_apex(&j.beam2))
            .collect();

        // Four legs give six pairs: opposite legs at 90°, neighbours at 60°
        assert_eq!(apex.len(), 6);
        let square = apex.iter().filter(|j| (j.angle_deg - 90.0).abs() < 1e-6).count();
        let sixty = apex.iter().filter(|j| (j.angle_deg - 60.0).abs() < 1e-6).count();
        assert_eq!((square, sixty), (2, 4));

        let node = net.node(0).unwrap().position;
        for joint in apex {
            assert_relative_eq!(joint.centerline_distance_mm, 0.0, epsilon = 1e-6);
            assert!(joint.overlap_volume_mm3 > 1.0e3, "{}", joint.overlap_volume_mm3);
            assert!((joint.point - node).norm() < 200.0);
            assert_ne!(joint.beam1_side, joint.beam2_side);
        }
    }

    #[test]
    fn test_parallel_normal_is_perpendicular() {
        let lying = cut_normal(&Vector3::x(), &Vector3::x());
        assert_relative_eq!(lying, Vector3::z(), epsilon = 1e-12);

        let upright = cut_normal(&Vector3::z(), &-Vector3::z());
        assert_relative_eq!(upright.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(upright.dot(&Vector3::z()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shallow_crossing_uses_fallback() {
        let config = PipelineConfig::default();
        let (analysis, _) = analyze_half_laps(&crossing(3.0), &config);
        assert_eq!(analysis.joints.len(), 1);
        assert_relative_eq!(analysis.joints[0].angle_deg, 3.0, epsilon = 1e-6);
        assert_relative_eq!(analysis.joints[0].cut.length_mm, 200.0);
    }

    #[test]
    fn test_shared_endpoint_only_is_not_an_intersection() {
        let config = PipelineConfig::default();
        let net = network(
            vec![[0.0, 0.0, 0.0], [1000.0, 0.0, 0.0], [2000.0, 0.0, 0.0]],
            vec![(0, 1), (1, 2)],
        );
        let (analysis, report) = analyze_half_laps(&net, &config);
        assert!(analysis.joints.is_empty());
        assert_eq!(report.succeeded, 1);
    }

    #[test]
    fn test_pair_is_symmetric() {
        let config = PipelineConfig::default();
        let net = crossing(37.0);
        let e = net.edges();
        let ab = analyze_pair(&net, &e[0], &e[1], &config).unwrap().unwrap();
        let ba = analyze_pair(&net, &e[1], &e[0], &config).unwrap().unwrap();
        assert_relative_eq!(ab.angle_deg, ba.angle_deg, epsilon = 1e-12);
        assert_relative_eq!(ab.cut.length_mm, ba.cut.length_mm, epsilon = 1e-12);
        assert_relative_eq!(ab.overlap_volume_mm3, ba.overlap_volume_mm3, max_relative = 1e-6);
    }

    #[test]
    fn test_cut_length_always_in_range() {
        let beam = BeamSection::default();
        let config = HalfLapConfig::default();
        for tenth in 0..=900 {
            let length = cut_length_mm(tenth as f64 / 10.0, &beam, &config);
            assert!(length >= 2.0 * beam.width_mm && length <= 300.0, "{}", length);
        }
    }

    #[test]
    fn test_cut_length_clamps() {
        let beam = BeamSection::default();
        let config = HalfLapConfig::default();
        // 138 / sin 10° ≈ 795, clamped
        assert_relative_eq!(cut_length_mm(10.0, &beam, &config), 300.0);
        // 138 / sin 45° ≈ 195
        assert_relative_eq!(cut_length_mm(45.0, &beam, &config), 138.0 * 2f64.sqrt(), epsilon = 1e-9);

        let short = HalfLapConfig {
            min_length_factor: 1.0,
            ..HalfLapConfig::default()
        };
        assert_relative_eq!(cut_length_mm(90.0, &beam, &short), 92.0);
    }

    #[test]
    fn test_crossed_clamp_bounds_do_not_panic() {
        let beam = BeamSection::default();
        // Lower bound 460 mm sits above the 300 mm upper clamp
        let crossed = HalfLapConfig {
            clamp_min_factor: 10.0,
            ..HalfLapConfig::default()
        };
        assert_relative_eq!(cut_length_mm(90.0, &beam, &crossed), 300.0);
        assert_relative_eq!(cut_length_mm(1.0, &beam, &crossed), 300.0);
    }

    #[test]
    fn test_failed_pair_is_skipped() {
        let config = PipelineConfig::default();
        let net = network(
            vec![
                [-500.0, 0.0, 0.0],
                [500.0, 0.0, 0.0],
                [0.0, -500.0, 0.0],
                [0.0, 500.0, 0.0],
                [f64::NAN, 0.0, 0.0],
            ],
            vec![(0, 1), (2, 3), (3, 4)],
        );
        let (analysis, report) = analyze_half_laps(&net, &config);
        assert_eq!(analysis.joints.len(), 1);
        assert_eq!(report.processed, 3);
        assert_eq!(report.skipped_count(), 2);
        assert!(report.skipped.iter().all(|s| s.error.is_item_level()));
    }

    #[test]
    fn test_spider_truss_records_are_well_formed() {
        let config = PipelineConfig::default();
        let (net, _) = build_network(&spider_truss_lines(), &NetworkConfig::default()).unwrap();
        let (analysis, report) = analyze_half_laps(&net, &config);

        assert!(report.is_clean());
        assert_eq!(analysis.pairs_tested, 66);
        for joint in &analysis.joints {
            assert!(joint.beam1.edge_id < joint.beam2.edge_id);
            assert!((0.0..=90.0).contains(&joint.angle_deg));
            assert!(joint.cut.length_mm >= 92.0 && joint.cut.length_mm <= 300.0);
            assert!(joint.overlap_volume_mm3 > config.half_lap.overlap_volume_tolerance_mm3);
        }
    }
}
