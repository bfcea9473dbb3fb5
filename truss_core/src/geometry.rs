//! # Geometry Primitives
//!
//! Thin helpers over `nalgebra` points and vectors: safe normalization,
//! orthonormal frames built from a single direction, and the axis angle
//! used for half-lap sizing. All coordinates are millimeters.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Vectors shorter than this normalize to world Z
pub const MIN_VECTOR_LENGTH: f64 = 0.001;

/// Normalize a vector, falling back to world Z for near-zero input.
pub fn safe_normalize(v: &Vector3<f64>) -> Vector3<f64> {
    let length = v.norm();
    if length < MIN_VECTOR_LENGTH || !length.is_finite() {
        Vector3::z()
    } else {
        *v / length
    }
}

/// Reference axis for building a frame around `direction`.
///
/// World Z unless the direction is nearly vertical, then world X.
pub fn reference_axis(direction: &Vector3<f64>) -> Vector3<f64> {
    if direction.z.abs() < 0.9 {
        Vector3::z()
    } else {
        Vector3::x()
    }
}

/// Angle between two undirected axes in degrees, in [0, 90].
pub fn axis_angle_deg(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let dot = safe_normalize(a).dot(&safe_normalize(b)).clamp(-1.0, 1.0);
    dot.abs().acos().to_degrees()
}

/// Midpoint of two points
pub fn midpoint(a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    Point3::from((a.coords + b.coords) * 0.5)
}

/// Shortest distance between segments `p1`-`q1` and `p2`-`q2`.
pub fn segment_distance(p1: &Point3<f64>, q1: &Point3<f64>, p2: &Point3<f64>, q2: &Point3<f64>) -> f64 {
    let d1 = *q1 - *p1;
    let d2 = *q2 - *p2;
    let r = *p1 - *p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);
    let eps = MIN_VECTOR_LENGTH * MIN_VECTOR_LENGTH;

    let (s, t) = if a <= eps && e <= eps {
        (0.0, 0.0)
    } else if a <= eps {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e <= eps {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > eps { ((b * f - c * e) / denom).clamp(0.0, 1.0) } else { 0.0 };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };

    let closest1 = *p1 + d1 * s;
    let closest2 = *p2 + d2 * t;
    (closest1 - closest2).norm()
}

/// Right-handed orthonormal frame placed at `origin`.
///
/// Shapes built on a frame are centered on the origin with their
/// length along `x_axis`, width along `y_axis` and height along `z_axis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Point3<f64>,
    pub x_axis: Vector3<f64>,
    pub y_axis: Vector3<f64>,
    pub z_axis: Vector3<f64>,
}

impl Frame {
    /// World-aligned frame at a point
    pub fn world(origin: Point3<f64>) -> Self {
        Frame {
            origin,
            x_axis: Vector3::x(),
            y_axis: Vector3::y(),
            z_axis: Vector3::z(),
        }
    }

    /// Frame whose X axis follows `direction`.
    ///
    /// Y is `direction × reference`, Z completes the right-handed set.
    pub fn along(origin: Point3<f64>, direction: &Vector3<f64>) -> Self {
        let x_axis = safe_normalize(direction);
        let y_axis = safe_normalize(&x_axis.cross(&reference_axis(&x_axis)));
        let z_axis = safe_normalize(&x_axis.cross(&y_axis));
        Frame {
            origin,
            x_axis,
            y_axis,
            z_axis,
        }
    }

    /// Frame from an X axis and an in-plane Y hint (Y is re-orthogonalized).
    pub fn from_xy(origin: Point3<f64>, x_hint: &Vector3<f64>, y_hint: &Vector3<f64>) -> Self {
        let x_axis = safe_normalize(x_hint);
        let z_axis = safe_normalize(&x_axis.cross(y_hint));
        let y_axis = safe_normalize(&z_axis.cross(&x_axis));
        Frame {
            origin,
            x_axis,
            y_axis,
            z_axis,
        }
    }

    /// Same axes, new origin
    pub fn translated(&self, offset: &Vector3<f64>) -> Self {
        Frame {
            origin: self.origin + *offset,
            ..*self
        }
    }

    /// Map local coordinates (along x, y, z axes) to world space
    pub fn to_world(&self, local: &Vector3<f64>) -> Point3<f64> {
        self.origin + self.x_axis * local.x + self.y_axis * local.y + self.z_axis * local.z
    }

    /// True when all components are finite numbers
    pub fn is_finite(&self) -> bool {
        self.origin.coords.iter().all(|c| c.is_finite())
            && self.x_axis.iter().all(|c| c.is_finite())
            && self.y_axis.iter().all(|c| c.is_finite())
            && self.z_axis.iter().all(|c| c.is_finite())
    }

    /// Unit axes, pairwise perpendicular and right-handed within `tolerance`
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let axes = [self.x_axis, self.y_axis, self.z_axis];
        axes.iter().all(|a| (a.norm() - 1.0).abs() <= tolerance)
            && self.x_axis.dot(&self.y_axis).abs() <= tolerance
            && self.y_axis.dot(&self.z_axis).abs() <= tolerance
            && self.z_axis.dot(&self.x_axis).abs() <= tolerance
            && (self.x_axis.cross(&self.y_axis) - self.z_axis).norm() <= tolerance
    }
}
