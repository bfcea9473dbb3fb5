//! Beam solids and convex box–box overlap.
//!
//! A beam is an oriented box on its axis. The overlap of two beams is found
//! by clipping one box, as a set of convex polygon faces, against the six
//! half-spaces of the other. Each clip cuts every face Sutherland–Hodgman
//! style and closes the hole with a cap polygon on the clipping plane.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::BeamSection;
use crate::errors::{TrussError, TrussResult};
use crate::geometry::{midpoint, safe_normalize, Frame, MIN_VECTOR_LENGTH};

/// Distances within this of a plane count as on it (mm)
const CLIP_EPSILON: f64 = 1e-9;

/// Cap points closer than this are the same point (mm)
const MERGE_EPSILON: f64 = 1e-7;

/// Clipped faces smaller than this are slivers and dropped (mm²)
const AREA_EPSILON: f64 = 1e-9;

/// Rectangular prism centered on a beam axis.
///
/// Length runs along `frame.x_axis`, width along `frame.y_axis`, height
/// along `frame.z_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSolid {
    pub frame: Frame,
    pub length_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl BeamSolid {
    /// Box spanning `start`..`end` with the given cross-section.
    ///
    /// # Errors
    ///
    /// `GeometryConstructionFailure` for non-finite or coincident endpoints.
    pub fn from_axis(label: &str, start: &Point3<f64>, end: &Point3<f64>, section: &BeamSection) -> TrussResult<Self> {
        let axis = *end - *start;
        let length_mm = axis.norm();
        if !length_mm.is_finite() {
            return Err(TrussError::geometry_failure(label, "Beam axis has non-finite coordinates"));
        }
        if length_mm < MIN_VECTOR_LENGTH {
            return Err(TrussError::geometry_failure(
                label,
                format!("Beam axis is degenerate ({:.4} mm)", length_mm),
            ));
        }

        Ok(BeamSolid {
            frame: Frame::along(midpoint(start, end), &axis),
            length_mm,
            width_mm: section.width_mm,
            height_mm: section.height_mm,
        })
    }

    /// Unit axis direction
    pub fn direction(&self) -> Vector3<f64> {
        self.frame.x_axis
    }

    pub fn half_extents(&self) -> Vector3<f64> {
        Vector3::new(self.length_mm / 2.0, self.width_mm / 2.0, self.height_mm / 2.0)
    }

    /// Radius of the sphere around the box center that contains the box
    pub fn bounding_radius(&self) -> f64 {
        self.half_extents().norm()
    }

    pub fn volume_mm3(&self) -> f64 {
        self.length_mm * self.width_mm * self.height_mm
    }

    /// The eight corners, indexed by bit pattern (x, y, z) of the sign
    fn corners(&self) -> [Point3<f64>; 8] {
        let h = self.half_extents();
        let mut corners = [self.frame.origin; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let sx = if i & 1 == 0 { -h.x } else { h.x };
            let sy = if i & 2 == 0 { -h.y } else { h.y };
            let sz = if i & 4 == 0 { -h.z } else { h.z };
            *corner = self.frame.to_world(&Vector3::new(sx, sy, sz));
        }
        corners
    }

    /// Bounding planes, normals pointing out
    fn half_spaces(&self) -> [HalfSpace; 6] {
        let h = self.half_extents();
        let center = self.frame.origin.coords;
        let axes = [(self.frame.x_axis, h.x), (self.frame.y_axis, h.y), (self.frame.z_axis, h.z)];
        let mut planes = [HalfSpace {
            normal: Vector3::zeros(),
            offset: 0.0,
        }; 6];
        for (i, (axis, half)) in axes.iter().enumerate() {
            planes[2 * i] = HalfSpace {
                normal: *axis,
                offset: axis.dot(&center) + half,
            };
            planes[2 * i + 1] = HalfSpace {
                normal: -axis,
                offset: -axis.dot(&center) + half,
            };
        }
        planes
    }

    fn to_polyhedron(&self) -> ConvexPolyhedron {
        let c = self.corners();
        let quad = |a: usize, b: usize, d: usize, e: usize| vec![c[a], c[b], c[d], c[e]];
        ConvexPolyhedron {
            faces: vec![
                quad(0, 2, 6, 4), // -x
                quad(1, 3, 7, 5), // +x
                quad(0, 1, 5, 4), // -y
                quad(2, 3, 7, 6), // +y
                quad(0, 1, 3, 2), // -z
                quad(4, 5, 7, 6), // +z
            ],
        }
    }
}

/// Common volume of two beam solids
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlap {
    pub volume_mm3: f64,
    pub centroid: Point3<f64>,
}

/// Intersect two beam solids.
///
/// Returns `None` when the boxes are disjoint or only touch. Any positive
/// volume is returned; callers decide what counts as a real overlap.
pub fn overlap(a: &BeamSolid, b: &BeamSolid) -> Option<Overlap> {
    let separation = nalgebra::distance(&a.frame.origin, &b.frame.origin);
    if separation > a.bounding_radius() + b.bounding_radius() {
        return None;
    }

    let mut clipped = a.to_polyhedron();
    for plane in b.half_spaces().iter() {
        clipped = clipped.clip(plane)?;
    }

    let (volume_mm3, centroid) = clipped.volume_and_centroid();
    if volume_mm3 > 0.0 && volume_mm3.is_finite() {
        Some(Overlap { volume_mm3, centroid })
    } else {
        None
    }
}

/// Points x with `normal · x <= offset`
#[derive(Debug, Clone, Copy)]
struct HalfSpace {
    normal: Vector3<f64>,
    offset: f64,
}

impl HalfSpace {
    fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }
}

/// Convex solid as a list of planar convex polygons
#[derive(Debug, Clone)]
struct ConvexPolyhedron {
    faces: Vec<Vec<Point3<f64>>>,
}

impl ConvexPolyhedron {
    /// Keep the part inside `plane`; `None` when nothing is left.
    fn clip(&self, plane: &HalfSpace) -> Option<ConvexPolyhedron> {
        let mut faces = Vec::with_capacity(self.faces.len() + 1);
        let mut cap = Vec::new();
        let mut face_on_plane = false;

        for face in &self.faces {
            let mut kept = Vec::with_capacity(face.len() + 1);
            for (i, current) in face.iter().enumerate() {
                let next = &face[(i + 1) % face.len()];
                let dc = plane.signed_distance(current);
                let dn = plane.signed_distance(next);
                let current_inside = dc <= CLIP_EPSILON;
                let next_inside = dn <= CLIP_EPSILON;

                if current_inside {
                    kept.push(*current);
                    if dc.abs() <= CLIP_EPSILON {
                        cap.push(*current);
                    }
                }
                if current_inside != next_inside {
                    let t = dc / (dc - dn);
                    let crossing = *current + (*next - *current) * t;
                    kept.push(crossing);
                    cap.push(crossing);
                }
            }

            if kept.len() >= 3 && polygon_area(&kept) > AREA_EPSILON {
                if kept.iter().all(|p| plane.signed_distance(p).abs() <= CLIP_EPSILON) {
                    face_on_plane = true;
                }
                faces.push(kept);
            }
        }

        if faces.is_empty() {
            return None;
        }
        // A face lying in the plane already closes the solid
        if !face_on_plane {
            if let Some(cap_face) = order_cap(cap, &plane.normal) {
                faces.push(cap_face);
            }
        }
        Some(ConvexPolyhedron { faces })
    }

    /// Volume and centroid from tetrahedra fanned out of the vertex mean
    fn volume_and_centroid(&self) -> (f64, Point3<f64>) {
        let mut sum = Vector3::zeros();
        let mut count = 0usize;
        for p in self.faces.iter().flatten() {
            sum += p.coords;
            count += 1;
        }
        if count == 0 {
            return (0.0, Point3::origin());
        }
        let reference = Point3::from(sum / count as f64);

        let mut volume = 0.0;
        let mut weighted = Vector3::zeros();
        for face in &self.faces {
            let a = face[0];
            for k in 1..face.len() - 1 {
                let b = face[k];
                let c = face[k + 1];
                let tet = (a - reference).dot(&(b - reference).cross(&(c - reference))).abs() / 6.0;
                volume += tet;
                weighted += (reference.coords + a.coords + b.coords + c.coords) * (tet / 4.0);
            }
        }

        if volume > 0.0 {
            (volume, Point3::from(weighted / volume))
        } else {
            (0.0, reference)
        }
    }
}

/// Area of a planar convex polygon, fanned from its first vertex
fn polygon_area(points: &[Point3<f64>]) -> f64 {
    let origin = points[0];
    let mut normal = Vector3::zeros();
    for pair in points[1..].windows(2) {
        normal += (pair[0] - origin).cross(&(pair[1] - origin));
    }
    normal.norm() / 2.0
}

/// Order coplanar points into a convex polygon around their mean.
fn order_cap(points: Vec<Point3<f64>>, normal: &Vector3<f64>) -> Option<Vec<Point3<f64>>> {
    let mut unique: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if !unique.iter().any(|q| nalgebra::distance(q, &p) < MERGE_EPSILON) {
            unique.push(p);
        }
    }
    if unique.len() < 3 {
        return None;
    }

    let center = Point3::from(unique.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / unique.len() as f64);
    let u_raw = unique
        .iter()
        .map(|p| *p - center)
        .find(|v| v.norm() > MERGE_EPSILON)?;
    let u = safe_normalize(&u_raw);
    let v = normal.cross(&u);

    let mut keyed: Vec<(f64, Point3<f64>)> = unique
        .into_iter()
        .map(|p| {
            let d = p - center;
            (d.dot(&v).atan2(d.dot(&u)), p)
        })
        .collect();
    keyed.sort_by(|x, y| x.0.total_cmp(&y.0));
    Some(keyed.into_iter().map(|(_, p)| p).collect())
}
