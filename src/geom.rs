use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use serde::Serialize;

use crate::config::VEC_LENGTH_THRESHOLD;

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn bbox_from_points() {
        let points = vec![
            Point3::new(-1.0, 2.0, 0.5),
            Point3::new(3.0, -4.0, 1.0),
            Point3::new(0.0, 0.0, -2.0),
        ];
        let bbox = BoundingBox::from_points(&points).unwrap();
        assert_eq!(bbox.p_min, Point3::new(-1.0, -4.0, -2.0));
        assert_eq!(bbox.p_max, Point3::new(3.0, 2.0, 1.0));
        assert_eq!(bbox.bounds, Vector3::new(4.0, 6.0, 3.0));
        assert_eq!(bbox.center, Point3::new(1.0, -1.0, -0.5));
    }

    #[test]
    fn bbox_from_no_points() {
        let points: Vec<Point3<f32>> = Vec::new();
        assert!(BoundingBox::from_points(&points).is_none());
    }

    #[test]
    fn bbox_union_contains_both() {
        let a = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Point3::new(-2.0, 0.5, 0.5), Point3::new(0.5, 3.0, 0.7));
        let u = a.union(&b);
        assert!(u.contains_box(&a));
        assert!(u.contains_box(&b));
        assert_eq!(u.p_min, Point3::new(-2.0, 0.0, 0.0));
        assert_eq!(u.p_max, Point3::new(1.0, 3.0, 1.0));
    }

    #[test]
    fn bbox_extend_and_back() {
        let a = BoundingBox::new(Point3::new(-1.5, 0.0, 2.0), Point3::new(4.0, 1.0, 3.0));
        let delta = Vector3::new(0.3, 1.7, 10.0);
        let b = a.extend(&delta).extend(&-delta);
        assert!((a.p_min - b.p_min).norm() < 1e-5);
        assert!((a.p_max - b.p_max).norm() < 1e-5);
        assert!((a.center - b.center).norm() < 1e-5);
    }

    #[test]
    fn bbox_unify_is_cube() {
        let a = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 2.0, 1.0));
        let u = a.unify();
        assert_eq!(u.bounds, Vector3::new(4.0, 4.0, 4.0));
        assert_eq!(u.center, a.center);
    }

    #[test]
    fn rotation_between_antiparallel() {
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(0.0, 0.0, -1.0);
        let rotated = rotation_between(&a, &b) * a;
        assert!((rotated - b).norm() < 1e-5, "rotated: {:?}", rotated);
    }

    #[test]
    fn basis_is_orthonormal() {
        let n = Vector3::new(0.3, -2.0, 0.5).normalize();
        let (u, v) = orthonormal_basis(&n);
        assert!(u.dot(&n).abs() < 1e-5);
        assert!(v.dot(&n).abs() < 1e-5);
        assert!(u.dot(&v).abs() < 1e-5);
        assert!((u.cross(&v) - n).norm() < 1e-5);
    }
}

/// An axis-aligned bounding box.
/// The center and bounds are always derived from the two corners, such that
/// `center = p_min + bounds / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub p_min: Point3<f32>,
    pub p_max: Point3<f32>,
    pub center: Point3<f32>,
    pub bounds: Vector3<f32>,
}

impl BoundingBox {
    pub fn new(p_min: Point3<f32>, p_max: Point3<f32>) -> Self {
        let bounds = p_max - p_min;
        Self {
            p_min,
            p_max,
            center: p_min + bounds / 2.0,
            bounds,
        }
    }

    /// Returns the tightest box around a set of points, or `None` if there are no points.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f32>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (p_min, p_max) = iter.fold((*first, *first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        });
        Some(Self::new(p_min, p_max))
    }

    /// Returns the union of many boxes, or `None` if there are none.
    pub fn union_all<'a, I>(boxes: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BoundingBox>, b| match acc {
                Some(a) => Some(a.union(b)),
                None => Some(*b),
            })
    }

    /// Returns the smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> Self {
        Self::new(self.p_min.inf(&other.p_min), self.p_max.sup(&other.p_max))
    }

    /// Grows the box by `delta` on every side. A negative delta shrinks it.
    pub fn extend(&self, delta: &Vector3<f32>) -> Self {
        Self::new(self.p_min - delta, self.p_max + delta)
    }

    /// Expands the box into a cube with the largest dimension, keeping the center.
    pub fn unify(&self) -> Self {
        let half = Vector3::repeat(self.largest_dimension() / 2.0);
        Self::new(self.center - half, self.center + half)
    }

    pub fn largest_dimension(&self) -> f32 {
        self.bounds.max()
    }

    pub fn contains_point(&self, point: &Point3<f32>) -> bool {
        (0..3).all(|i| point[i] >= self.p_min[i] && point[i] <= self.p_max[i])
    }

    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains_point(&other.p_min) && self.contains_point(&other.p_max)
    }
}

/// Returns two unit vectors `u`, `v` such that `(u, v, n)` is a right-handed
/// orthonormal frame.
pub fn orthonormal_basis(n: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = helper.cross(n).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Returns the rotation taking direction `from` onto direction `to`.
/// Antiparallel inputs rotate by a half turn about an arbitrary perpendicular axis.
pub fn rotation_between(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    match UnitQuaternion::rotation_between(from, to) {
        Some(rotation) => rotation,
        None => {
            let (axis, _) = orthonormal_basis(&from.normalize());
            UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), std::f32::consts::PI)
        }
    }
}

/// Angle in radians between two vectors. Degenerate vectors give zero.
pub fn angle_between(a: &Vector3<f32>, b: &Vector3<f32>) -> f32 {
    if a.norm() < VEC_LENGTH_THRESHOLD || b.norm() < VEC_LENGTH_THRESHOLD {
        return 0.0;
    }
    a.angle(b)
}

/// Normalizes a vector, falling back to `fallback` when it is too short.
pub fn normalize_or(v: &Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    let norm = v.norm();
    if norm < VEC_LENGTH_THRESHOLD {
        fallback
    } else {
        v / norm
    }
}
