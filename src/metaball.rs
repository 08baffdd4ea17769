//! Meta-ball somata.
//!
//! The soma is modelled as an implicit field summed over a set of balls (the
//! soma sphere plus the first few samples of every connected root section) and
//! polygonized with surface nets: one vertex per grid cell straddling the
//! iso-surface, one quad per grid edge crossing it.

use log::debug;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::config::{METABALL_ROOT_SAMPLES, METABALL_THRESHOLD};
use crate::mesh::Mesh;
use crate::morphology::Morphology;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::fixtures::bifurcating;
    use std::f32::consts::PI;

    #[test]
    fn single_ball_is_a_closed_sphere() {
        let balls = [Ball::new(Point3::new(1.0, 2.0, 3.0), 2.0)];
        let mesh = polygonize(&balls, 0.2);
        assert!(mesh.is_watertight());
        assert_eq!(mesh.connected_components(), 1);

        let expected = 4.0 / 3.0 * PI * 8.0;
        let volume = mesh.signed_volume();
        assert!((volume - expected).abs() / expected < 0.1, "volume {}", volume);

        for v in &mesh.vertices {
            let d = (v - Point3::new(1.0, 2.0, 3.0)).norm();
            assert!((d - 2.0).abs() < 0.2, "vertex at distance {}", d);
        }
    }

    #[test]
    fn overlapping_balls_merge() {
        let balls = [
            Ball::new(Point3::origin(), 1.0),
            Ball::new(Point3::new(1.5, 0.0, 0.0), 1.0),
        ];
        let mesh = polygonize(&balls, 0.15);
        assert_eq!(mesh.connected_components(), 1);
        assert!(mesh.signed_volume() > 4.0 / 3.0 * PI);
    }

    #[test]
    fn distant_balls_stay_apart() {
        let balls = [
            Ball::new(Point3::origin(), 1.0),
            Ball::new(Point3::new(10.0, 0.0, 0.0), 1.0),
        ];
        let mesh = polygonize(&balls, 0.25);
        assert_eq!(mesh.connected_components(), 2);
    }

    #[test]
    fn soma_grows_towards_arbors() {
        let morph = bifurcating();
        let balls = soma_balls(&morph);
        assert_eq!(balls.len(), 1 + 2 * METABALL_ROOT_SAMPLES);

        let mesh = meta_soma(&morph, 8);
        let bbox = mesh.bounding_box().unwrap();
        assert!(mesh.smooth);
        // the trunk pulls the surface out along +x past the bare soma radius
        assert!(bbox.p_max.x > morph.soma.mean_radius);
        assert!(mesh.signed_volume() > 0.0);
    }

    #[test]
    fn empty_field_gives_empty_mesh() {
        assert_eq!(polygonize(&[], 0.5).num_faces(), 0);
    }
}

/// A single field source: contributes `r² / d²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl Ball {
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Field value at `p`. Equals 1 on the surface of an isolated ball.
pub fn field(balls: &[Ball], p: &Point3<f32>) -> f32 {
    balls
        .iter()
        .map(|b| b.radius * b.radius / (p - b.center).norm_squared().max(1e-12))
        .sum()
}

/// Balls describing the soma: the soma sphere plus the leading samples of
/// every arbor connected to it.
pub fn soma_balls(morph: &Morphology) -> Vec<Ball> {
    let mut balls = vec![Ball::new(morph.soma.centroid, morph.soma.mean_radius)];
    for arbor in morph.arbors.iter().filter(|a| a.connected_to_soma) {
        balls.extend(
            morph
                .section(arbor.root)
                .samples
                .iter()
                .take(METABALL_ROOT_SAMPLES)
                .map(|s| Ball::new(s.point, s.radius)),
        );
    }
    balls
}

/// Grid cells per soma radius for a tessellation level in (0, 1].
pub fn metaball_resolution(tessellation_level: f32) -> usize {
    ((tessellation_level * 16.0).round() as usize).max(4)
}

/// Builds the meta-ball soma of a morphology.
pub fn meta_soma(morph: &Morphology, resolution: usize) -> Mesh {
    let cell = morph.soma.mean_radius / resolution.max(1) as f32;
    let mut mesh = polygonize(&soma_balls(morph), cell);
    mesh.smooth = true;
    mesh
}

/// Regular sampling lattice.
struct Grid {
    origin: Point3<f32>,
    cell: f32,
    dims: [usize; 3],
}

impl Grid {
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.dims[1] + j) * self.dims[0] + i
    }

    fn point(&self, i: usize, j: usize, k: usize) -> Point3<f32> {
        self.origin + Vector3::new(i as f32, j as f32, k as f32) * self.cell
    }

    fn len(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Extracts the `METABALL_THRESHOLD` iso-surface of the field with surface nets.
pub fn polygonize(balls: &[Ball], cell: f32) -> Mesh {
    let mut mesh = Mesh::new();
    if balls.is_empty() || cell <= 0.0 {
        return mesh;
    }

    // far from the centers the field is bounded by Σr²/d², so the surface
    // cannot reach further than sqrt(Σr²) from the hull of the centers
    let reach = balls.iter().map(|b| b.radius * b.radius).sum::<f32>().sqrt() + 2.0 * cell;
    let mut lo = balls[0].center;
    let mut hi = balls[0].center;
    for b in balls {
        lo = lo.inf(&b.center);
        hi = hi.sup(&b.center);
    }
    let lo = lo - Vector3::repeat(reach);
    let hi = hi + Vector3::repeat(reach);
    let extent = hi - lo;
    let dims = [
        (extent.x / cell).ceil() as usize + 1,
        (extent.y / cell).ceil() as usize + 1,
        (extent.z / cell).ceil() as usize + 1,
    ];
    let grid = Grid { origin: lo, cell, dims };
    debug!("polygonizing {} balls on a {:?} grid", balls.len(), dims);

    // positive inside
    let values: Vec<f32> = (0..grid.len())
        .into_par_iter()
        .map(|n| {
            let i = n % dims[0];
            let j = (n / dims[0]) % dims[1];
            let k = n / (dims[0] * dims[1]);
            field(balls, &grid.point(i, j, k)) - METABALL_THRESHOLD
        })
        .collect();

    // one vertex per cell with a sign change
    let cells = [dims[0] - 1, dims[1] - 1, dims[2] - 1];
    let cell_index = |i: usize, j: usize, k: usize| (k * cells[1] + j) * cells[0] + i;
    let mut cell_vertex = vec![usize::MAX; cells.iter().product()];
    for k in 0..cells[2] {
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                if let Some(p) = cell_surface_point(&grid, &values, i, j, k) {
                    cell_vertex[cell_index(i, j, k)] = mesh.add_vertex(p);
                }
            }
        }
    }

    // one quad per lattice edge crossing the surface
    for k in 1..dims[2] - 1 {
        for j in 1..dims[1] - 1 {
            for i in 1..dims[0] - 1 {
                let here = values[grid.index(i, j, k)];
                for axis in 0..3 {
                    let mut next = [i, j, k];
                    next[axis] += 1;
                    if next[axis] >= dims[axis] {
                        continue;
                    }
                    let there = values[grid.index(next[0], next[1], next[2])];
                    if (here > 0.0) == (there > 0.0) {
                        continue;
                    }

                    let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
                    let corner = |db: usize, dc: usize| {
                        let mut at = [i, j, k];
                        at[b] -= db;
                        at[c] -= dc;
                        cell_vertex[cell_index(at[0], at[1], at[2])]
                    };
                    let mut quad = vec![corner(1, 1), corner(0, 1), corner(0, 0), corner(1, 0)];
                    if quad.contains(&usize::MAX) {
                        continue;
                    }
                    if here <= 0.0 {
                        quad.reverse();
                    }
                    mesh.add_face(quad);
                }
            }
        }
    }

    mesh.remove_unused_vertices();
    mesh.recalculate_normals();
    mesh
}

/// Mean of the edge crossings of a cell, if the surface passes through it.
fn cell_surface_point(grid: &Grid, values: &[f32], i: usize, j: usize, k: usize) -> Option<Point3<f32>> {
    const EDGES: [([usize; 3], [usize; 3]); 12] = [
        ([0, 0, 0], [1, 0, 0]),
        ([0, 1, 0], [1, 1, 0]),
        ([0, 0, 1], [1, 0, 1]),
        ([0, 1, 1], [1, 1, 1]),
        ([0, 0, 0], [0, 1, 0]),
        ([1, 0, 0], [1, 1, 0]),
        ([0, 0, 1], [0, 1, 1]),
        ([1, 0, 1], [1, 1, 1]),
        ([0, 0, 0], [0, 0, 1]),
        ([1, 0, 0], [1, 0, 1]),
        ([0, 1, 0], [0, 1, 1]),
        ([1, 1, 0], [1, 1, 1]),
    ];

    let mut sum = Vector3::zeros();
    let mut count = 0;
    for (a, b) in EDGES {
        let (ia, ja, ka) = (i + a[0], j + a[1], k + a[2]);
        let (ib, jb, kb) = (i + b[0], j + b[1], k + b[2]);
        let va = values[grid.index(ia, ja, ka)];
        let vb = values[grid.index(ib, jb, kb)];
        if (va > 0.0) == (vb > 0.0) {
            continue;
        }
        let t = va / (va - vb);
        let pa = grid.point(ia, ja, ka);
        let pb = grid.point(ib, jb, kb);
        sum += pa.coords + (pb - pa) * t;
        count += 1;
    }
    (count > 0).then(|| Point3::from(sum / count as f32))
}
