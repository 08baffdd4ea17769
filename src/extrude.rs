//! Face extrusion of a labeled section tree into a single connected tube mesh.
//!
//! Each arbor starts from a quad "extrusion face" sitting on the soma surface,
//! facing away from the soma center. The face is then pushed to every sample
//! in turn: translated to the sample, rotated to the joint direction and
//! resized to the sample radius. At a bifurcation the primary child keeps
//! pushing the parent's face, while each secondary child grows out of one of
//! the side faces created by the parent's last extrusion step.
//!
//! Every step leaves the mesh closed: the start of the arbor keeps a root cap
//! and every terminal keeps its moving face. Duplicate consecutive samples are
//! not filtered here and produce zero-area quads.

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::config::DUPLICATE_SAMPLE_DISTANCE;
use crate::geom::{normalize_or, orthonormal_basis, rotation_between};
use crate::mesh::Mesh;
use crate::morphology::{Arbor, Morphology, Sample, SectionId};


/// Result of extruding one arbor.
#[derive(Debug, Clone)]
pub struct ArborMesh {
    pub mesh: Mesh,
    /// The face closing the start of the arbor, facing the soma.
    pub root_cap: Option<usize>,
    /// Center of the root cap.
    pub start: Point3<f32>,
    /// Secondary children that found no joint face and start their own tube.
    pub standalone_faces: usize,
}

/// A face being pushed along a section.
#[derive(Debug, Clone, Copy)]
struct Cap {
    face: usize,
    normal: Vector3<f32>,
}

/// Work item: extrude `section` starting from `cap`, skipping samples before `from`.
struct Task {
    section: SectionId,
    cap: Cap,
    from: usize,
}

/// Builds the tube mesh of one arbor, never descending past `max_order`.
pub fn extrude_arbor(morph: &Morphology, arbor: &Arbor, max_order: usize) -> ArborMesh {
    let mut mesh = Mesh::new();
    let root = morph.section(arbor.root);
    let Some(first) = root.samples.first() else {
        return ArborMesh {
            mesh,
            root_cap: None,
            start: morph.soma.centroid,
            standalone_faces: 0,
        };
    };

    let direction = morph.root_direction(arbor);
    let soma = &morph.soma;
    let outside_soma = (first.point - soma.centroid).norm() > soma.mean_radius;
    let (start, from) = if arbor.connected_to_soma && outside_soma {
        (morph.root_intersection(arbor), 0)
    } else {
        (first.point, 1)
    };

    let (root_cap, cap) = start_face(&mut mesh, start, &direction, first.radius);
    let mut standalone_faces = 0;
    let mut stack = vec![Task {
        section: arbor.root,
        cap,
        from,
    }];

    while let Some(Task { section, cap, from }) = stack.pop() {
        let section = morph.section(section);
        let (mut cap, joint) = extrude_samples(&mut mesh, cap, &section.samples[from.min(section.samples.len())..]);

        let children: Vec<SectionId> = section
            .children
            .iter()
            .copied()
            .filter(|&c| morph.section(c).branching_order <= max_order)
            .collect();
        let Some((&primary, secondaries)) = children.split_first() else {
            continue;
        };

        let mut pool = joint;
        // a section that made no extrusion step has no side faces to branch from
        let stepped = pool.is_empty() && !secondaries.is_empty();
        if stepped {
            let radius = section.samples.last().map_or(first.radius, |s| s.radius);
            let center = mesh.face_center(cap.face);
            let normal = cap.normal;
            pool = extrude_face(&mut mesh, &mut cap, center + normal * radius, &normal);
        }
        let branch_point = section.last_point().unwrap_or(start);
        for &child in secondaries {
            let samples = &morph.section(child).samples;
            if samples.is_empty() {
                continue;
            }
            let child_dir = child_direction(samples, &branch_point);
            match take_nearest_face(&mesh, &mut pool, &child_dir) {
                Some(face) => {
                    let cap = Cap {
                        face,
                        normal: mesh.face_normal(face),
                    };
                    let center = mesh.face_center(face);
                    let from = samples
                        .iter()
                        .position(|s| (s.point - center).dot(&cap.normal) > 0.0)
                        .unwrap_or(samples.len() - 1);
                    stack.push(Task {
                        section: child,
                        cap,
                        from,
                    });
                }
                None => {
                    debug!(
                        "no joint face left for section {}, starting a standalone tube",
                        child.0
                    );
                    let (_, cap) = start_face(&mut mesh, samples[0].point, &child_dir, samples[0].radius);
                    standalone_faces += 1;
                    stack.push(Task {
                        section: child,
                        cap,
                        from: 1,
                    });
                }
            }
        }

        // the primary child keeps pushing the parent's face
        let samples = &morph.section(primary).samples;
        let center = mesh.face_center(cap.face);
        let from = if stepped {
            samples
                .iter()
                .position(|s| (s.point - center).dot(&cap.normal) > DUPLICATE_SAMPLE_DISTANCE)
                .unwrap_or(samples.len())
        } else {
            let continues = samples
                .first()
                .map_or(false, |s| (s.point - center).norm() < DUPLICATE_SAMPLE_DISTANCE);
            if continues {
                1
            } else {
                0
            }
        };
        stack.push(Task {
            section: primary,
            cap,
            from,
        });
    }

    ArborMesh {
        mesh,
        root_cap: Some(root_cap),
        start,
        standalone_faces,
    }
}

/// Adds a root cap and a coincident moving face at `center`. Returns
/// `(root cap, moving face)`; the root cap faces backwards.
fn start_face(mesh: &mut Mesh, center: Point3<f32>, normal: &Vector3<f32>, radius: f32) -> (usize, Cap) {
    let face = add_quad(mesh, center, normal, radius);
    let mut back = mesh.faces[face].clone();
    back.reverse();
    let root_cap = mesh.add_face(back);
    (
        root_cap,
        Cap {
            face,
            normal: *normal,
        },
    )
}

/// Adds a square quad centered on `center`, wound counter-clockwise about
/// `normal`, whose edge midpoints lie at `radius` from the center.
pub fn add_quad(mesh: &mut Mesh, center: Point3<f32>, normal: &Vector3<f32>, radius: f32) -> usize {
    let (u, v) = orthonormal_basis(normal);
    let corners = [u + v, -u + v, -u - v, u - v];
    let face = corners
        .iter()
        .map(|c| mesh.add_vertex(center + c * radius))
        .collect();
    mesh.add_face(face)
}

/// Pushes the cap through every sample. Returns the final cap and the side
/// faces created by the last step, which serve as joint faces for branching.
fn extrude_samples(mesh: &mut Mesh, mut cap: Cap, samples: &[Sample]) -> (Cap, Vec<usize>) {
    let mut joint = Vec::new();
    for (i, sample) in samples.iter().enumerate() {
        let previous = mesh.face_center(cap.face);
        let incoming = normalize_or(&(sample.point - previous), cap.normal);
        let facing = match samples.get(i + 1) {
            Some(next) => {
                let outgoing = normalize_or(&(next.point - sample.point), incoming);
                normalize_or(&(incoming + outgoing), incoming)
            }
            None => incoming,
        };
        joint = extrude_face(mesh, &mut cap, sample.point, &facing);
        set_face_radius(mesh, cap.face, sample.radius);
    }
    (cap, joint)
}

/// Moves the cap face to `target`, rotated to face `facing`, bridging the old
/// and new loops with side quads. Returns the new side faces.
fn extrude_face(mesh: &mut Mesh, cap: &mut Cap, target: Point3<f32>, facing: &Vector3<f32>) -> Vec<usize> {
    let old = mesh.faces[cap.face].clone();
    let center = mesh.face_center(cap.face);
    let rotation = rotation_between(&cap.normal, facing);

    let new: Vec<usize> = old
        .iter()
        .map(|&v| {
            let offset = rotation * (mesh.vertices[v] - center);
            mesh.add_vertex(target + offset)
        })
        .collect();

    let n = old.len();
    let sides = (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            mesh.add_face(vec![old[i], old[j], new[j], new[i]])
        })
        .collect();

    mesh.faces[cap.face] = new;
    cap.normal = *facing;
    sides
}

/// Resizes a face so its edge midpoints lie `radius` away from its center.
///
/// Each corner is moved along the bisector of the directions from the face
/// center to the midpoints of its two edges. This keeps square faces square,
/// but distorts strongly rectangular or skewed faces.
pub fn set_face_radius(mesh: &mut Mesh, face: usize, radius: f32) {
    let loop_ = mesh.faces[face].clone();
    let n = loop_.len();
    let center = mesh.face_center(face);
    let directions: Vec<Vector3<f32>> = (0..n)
        .map(|i| {
            let a = mesh.vertices[loop_[i]];
            let b = mesh.vertices[loop_[(i + 1) % n]];
            let midpoint = Point3::from((a.coords + b.coords) / 2.0);
            normalize_or(&(midpoint - center), Vector3::zeros())
        })
        .collect();

    let corners: Vec<Option<Point3<f32>>> = (0..n)
        .map(|i| {
            let before = directions[(i + n - 1) % n];
            let after = directions[i];
            let bisector = before + after;
            let half_cos = (bisector.norm() / 2.0).max(0.0);
            if half_cos < 1e-3 {
                None
            } else {
                Some(center + bisector.normalize() * (radius / half_cos))
            }
        })
        .collect();

    for (&v, corner) in loop_.iter().zip(corners) {
        if let Some(corner) = corner {
            mesh.vertices[v] = corner;
        }
    }
}

/// Direction a child section leaves its branch point in.
fn child_direction(samples: &[Sample], branch_point: &Point3<f32>) -> Vector3<f32> {
    let raw = if samples.len() > 1 {
        samples[1].point - samples[0].point
    } else {
        samples[0].point - branch_point
    };
    normalize_or(&raw, Vector3::x())
}

/// Removes and returns the pool face whose normal is closest to `direction`.
fn take_nearest_face(mesh: &Mesh, pool: &mut Vec<usize>, direction: &Vector3<f32>) -> Option<usize> {
    let index = (0..pool.len()).max_by(|&a, &b| {
        let da = mesh.face_normal(pool[a]).dot(direction);
        let db = mesh.face_normal(pool[b]).dot(direction);
        da.total_cmp(&db)
    })?;
    Some(pool.swap_remove(index))
}
