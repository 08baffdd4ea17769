//! Closed primitive meshes used for somata and articulation joints.

use nalgebra::{Point3, Vector3};

use crate::mesh::Mesh;


/// Cube faces as (normal, u, v) with `u × v = normal`, so quads come out
/// counter-clockwise when seen from outside.
const CUBE_FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
    ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
    ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
];

/// An all-quad sphere made by projecting a subdivided cube. With an even
/// resolution there is a vertex on each axis pole.
pub fn cube_sphere(center: Point3<f32>, radius: f32, resolution: usize) -> Mesh {
    let n = resolution.max(1);
    let mut mesh = Mesh::new();

    for (normal, u, v) in CUBE_FACES {
        let normal = Vector3::from(normal);
        let u = Vector3::from(u);
        let v = Vector3::from(v);
        let base = mesh.num_vertices();
        for j in 0..=n {
            for i in 0..=n {
                let s = -1.0 + 2.0 * i as f32 / n as f32;
                let t = -1.0 + 2.0 * j as f32 / n as f32;
                mesh.add_vertex(Point3::from(normal + u * s + v * t));
            }
        }
        let index = |i: usize, j: usize| base + j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                mesh.add_face(vec![index(i, j), index(i + 1, j), index(i + 1, j + 1), index(i, j + 1)]);
            }
        }
    }

    // weld the cube seams before projecting onto the sphere
    mesh.remove_doubles(1e-4);
    for p in mesh.vertices.iter_mut() {
        *p = center + p.coords.normalize() * radius;
    }
    mesh
}

/// Quad-sphere resolution for a tessellation level in (0, 1].
pub fn sphere_resolution(tessellation_level: f32) -> usize {
    let n = (tessellation_level * 12.0).round().max(2.0) as usize;
    n + n % 2
}
