//! Bevel sweeps: tubes made by sweeping a regular polygon profile along a poly-line.
//!
//! Each point of the poly-line gets a ring of `sides` vertices perpendicular
//! to the local tangent, scaled by the point's radius. Ring frames are
//! parallel-transported along the line so the tube does not twist.

use std::f32::consts::PI;

use nalgebra::Vector3;

use crate::geom::{normalize_or, orthonormal_basis, rotation_between};
use crate::mesh::Mesh;
use crate::skeleton::PolyLine;

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::Point3;

    fn line(points: &[[f32; 3]], radius: f32) -> PolyLine {
        PolyLine {
            samples: points
                .iter()
                .map(|p| (Point3::new(p[0], p[1], p[2]), radius))
                .collect(),
            material_index: 1,
        }
    }

    #[test]
    fn capped_tube_is_closed() {
        let polyline = line(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 1.0, 0.0], [2.0, 3.0, 1.0]], 0.5);
        let tube = sweep(&polyline, 8, true);
        assert_eq!(tube.num_vertices(), 4 * 8);
        assert_eq!(tube.num_faces(), 3 * 8 + 2);
        assert!(tube.is_watertight());
        assert!(tube.signed_volume() > 0.0);
    }

    #[test]
    fn open_tube_has_two_boundaries() {
        let polyline = line(&[[0.0, 0.0, 0.0], [0.0, 0.0, 4.0]], 1.0);
        let tube = sweep(&polyline, 6, false);
        assert_eq!(tube.boundary_edges().len(), 12);
    }

    #[test]
    fn ring_radius_matches_sample() {
        let polyline = line(&[[0.0, 0.0, 0.0], [0.0, 3.0, 0.0]], 0.75);
        let tube = sweep(&polyline, 12, true);
        for v in &tube.vertices {
            let radial = Vector3::new(v.x, 0.0, v.z).norm();
            assert!((radial - 0.75).abs() < 1e-5);
        }
    }

    #[test]
    fn degenerate_lines_give_nothing() {
        let polyline = line(&[[1.0, 1.0, 1.0]], 1.0);
        assert_eq!(sweep(&polyline, 8, true).num_faces(), 0);
    }
}

/// Sweeps a `sides`-gon along the poly-line. With `caps` the ends are closed
/// so the tube is watertight.
pub fn sweep(polyline: &PolyLine, sides: usize, caps: bool) -> Mesh {
    let mut mesh = Mesh::new();
    let points = &polyline.samples;
    let n = points.len();
    let sides = sides.max(3);
    if n < 2 {
        return mesh;
    }

    let tangents = tangents(polyline);
    let (mut u, _) = orthonormal_basis(&tangents[0]);

    let mut rings: Vec<Vec<usize>> = Vec::with_capacity(n);
    for i in 0..n {
        let t = tangents[i];
        if i > 0 {
            u = rotation_between(&tangents[i - 1], &t) * u;
            u = normalize_or(&(u - t * u.dot(&t)), orthonormal_basis(&t).0);
        }
        let v = t.cross(&u);
        let (center, radius) = points[i];
        let ring = (0..sides)
            .map(|k| {
                let theta = 2.0 * PI * k as f32 / sides as f32;
                mesh.add_vertex(center + (u * theta.cos() + v * theta.sin()) * radius)
            })
            .collect();
        rings.push(ring);
    }

    for w in rings.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        for k in 0..sides {
            let k1 = (k + 1) % sides;
            mesh.add_face(vec![a[k], a[k1], b[k1], b[k]]);
        }
    }

    if caps {
        let mut start = rings[0].clone();
        start.reverse();
        mesh.add_face(start);
        mesh.add_face(rings[n - 1].clone());
    }

    mesh
}

/// Unit tangent at every point: central differences inside, one-sided at the ends.
fn tangents(polyline: &PolyLine) -> Vec<Vector3<f32>> {
    let points = &polyline.samples;
    let n = points.len();
    let mut tangents = Vec::with_capacity(n);
    let mut previous = normalize_or(&(points[n - 1].0 - points[0].0), Vector3::z());
    for i in 0..n {
        let ahead = points[(i + 1).min(n - 1)].0;
        let behind = points[i.saturating_sub(1)].0;
        let t = normalize_or(&(ahead - behind), previous);
        tangents.push(t);
        previous = t;
    }
    tangents
}
