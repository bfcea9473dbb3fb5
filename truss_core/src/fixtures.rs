//! # Reference Skeleton
//!
//! The spider truss used by the `demo` command and the end-to-end tests:
//! one apex with four legs, two legs that fork and two that kink, drawn
//! with the small endpoint jitter a hand-drawn model has.
//!
//! ```text
//!                 A (apex, degree 4)
//!        ┌────────┼────────┬────────┐
//!       B1       B2       B3       B4
//!        │        │      ┌─┴─┐    ┌─┴─┐
//!       C1       C2     D3  E3   D4  E4
//!        │        │
//!       F1       F2
//! ```
//!
//! 13 lines (one of them a 0.05 mm stray at the apex) give 13 nodes and
//! 12 beams.

use nalgebra::Point3;

use crate::engineering::{LoadSchedule, NodeLoad, NodeKind};
use crate::network::LineSegment;

fn line(id: &str, a: [f64; 3], b: [f64; 3]) -> LineSegment {
    LineSegment::new(id, Point3::new(a[0], a[1], a[2]), Point3::new(b[0], b[1], b[2]))
}

/// The 13-line spider-truss skeleton (mm)
pub fn spider_truss_lines() -> Vec<LineSegment> {
    vec![
        line("L00", [0.0, 0.0, 3000.0], [-1500.0, 0.0, 1500.0]),
        line("L01", [0.03, 0.0, 3000.0], [1500.0, 0.0, 1500.0]),
        line("L02", [0.0, -0.02, 3000.04], [0.0, -1500.0, 1500.0]),
        line("L03", [0.0, 0.0, 2999.95], [0.0, 1500.0, 1500.0]),
        line("L04", [-1500.04, 0.0, 1500.0], [-3000.0, 0.0, 0.0]),
        line("L05", [1500.0, 0.06, 1500.0], [3000.0, 0.0, 0.0]),
        line("L06", [0.0, -1500.0, 1500.0], [0.0, -3000.0, 0.0]),
        line("L07", [0.01, -1500.01, 1500.0], [-500.0, -2000.0, 0.0]),
        line("L08", [0.0, 1500.0, 1500.05], [0.0, 3000.0, 0.0]),
        line("L09", [0.0, 1500.0, 1500.0], [500.0, 2000.0, 0.0]),
        line("L10", [-3000.0, 0.0, 0.03], [-4000.0, 0.0, -500.0]),
        line("L11", [3000.0, 0.0, 0.0], [4000.0, 0.0, -500.0]),
        // Stray stroke at the apex; both ends merge into node 0
        line("L12", [0.02, 0.0, 3000.0], [0.02, 0.05, 3000.0]),
    ]
}

/// Reference loads for the spider truss, keyed by the node ids the
/// builder assigns to [`spider_truss_lines`].
///
/// Apex carries the roof; the kinks and forks take wind; the feet are
/// anchored in tension.
pub fn spider_truss_loads() -> LoadSchedule {
    let entry = |node_id: usize, name: &str, kind: NodeKind, v: f64, l: f64, t: f64, note: &str| NodeLoad {
        node_id,
        name: name.to_string(),
        kind,
        vertical_n: v,
        lateral_n: l,
        tension_n: t,
        note: note.to_string(),
    };

    LoadSchedule {
        loads: vec![
            entry(0, "N0", NodeKind::ApexConcentrate, 4000.0, 0.0, 0.0, "Roof load concentrated at apex"),
            entry(1, "N1", NodeKind::TransferJunction, 2000.0, 1500.0, 0.0, "West leg knee, wind"),
            entry(2, "N2", NodeKind::TransferJunction, 2000.0, 1500.0, 0.0, "East leg knee, wind"),
            entry(3, "N3", NodeKind::LateralBracing, 1500.0, 2800.0, 0.0, "South fork, wind on face"),
            entry(4, "N4", NodeKind::LateralBracing, 1500.0, 2800.0, 0.0, "North fork, wind on face"),
            entry(5, "N5", NodeKind::TensionMember, 0.0, 0.0, 1200.0, "West lower knee, uplift"),
            entry(6, "N6", NodeKind::TensionMember, 0.0, 0.0, 1200.0, "East lower knee, uplift"),
            entry(7, "N7", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "South foot"),
            entry(8, "N8", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "South brace foot"),
            entry(9, "N9", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "North foot"),
            entry(10, "N10", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "North brace foot"),
            entry(11, "N11", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "West foot"),
            entry(12, "N12", NodeKind::BearingSupport, 1500.0, 0.0, 0.0, "East foot"),
        ],
    }
}
