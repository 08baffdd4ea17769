//! Stitching arbor meshes onto the soma mesh.
//!
//! An arbor is either left standalone (it was never verified as connected to
//! the soma) or bridged: the soma face nearest to where the arbor leaves the
//! soma and the arbor's own start face are both deleted, the meshes are
//! joined, and the two open loops are stitched with a ring of faces. Coincident
//! seam vertices are welded and normals are made consistent afterwards.

use log::debug;

use crate::config::VERTEX_MERGE_DISTANCE;
use crate::extrude::ArborMesh;
use crate::mesh::Mesh;
use crate::morphology::{Arbor, Morphology};


/// Whether an arbor gets merged into the soma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Left standalone.
    Unconnected,
    /// Bridged into the soma mesh.
    Connectable,
}

pub fn connection_state(arbor: &Arbor) -> ConnectionState {
    if arbor.connected_to_soma {
        ConnectionState::Connectable
    } else {
        ConnectionState::Unconnected
    }
}

/// A soma mesh that arbors get bridged into.
///
/// The soma's own faces stay at the front of the face list: bridging removes
/// one of them and appends the arbor and the bridge behind. Only that front
/// range is searched for the face to replace, so an arbor never opens up a
/// tube or a bridge added before it.
#[derive(Debug, Clone)]
pub struct SomaBridge {
    mesh: Mesh,
    soma_faces: usize,
}

impl SomaBridge {
    pub fn new(soma: Mesh) -> Self {
        let soma_faces = soma.num_faces();
        Self { mesh: soma, soma_faces }
    }

    /// Number of faces left from the original soma.
    pub fn soma_faces(&self) -> usize {
        self.soma_faces
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    /// Merges an extruded arbor into the soma. Arbors that are not connected
    /// to the soma leave the mesh untouched. Returns whether a bridge was made.
    pub fn connect(&mut self, arbor_mesh: &ArborMesh, arbor: &Arbor, morph: &Morphology) -> bool {
        if connection_state(arbor) == ConnectionState::Unconnected {
            debug!(
                "{} arbor is not connected to the soma, leaving it standalone",
                arbor.kind.label()
            );
            return false;
        }

        let intersection = morph.root_intersection(arbor);
        let Some(soma_face) = self.mesh.nearest_face_in(&intersection, 0..self.soma_faces) else {
            debug!("no soma faces left, nothing to connect to");
            return false;
        };
        let arbor_face = match arbor_mesh.root_cap {
            Some(face) => face,
            None => match arbor_mesh.mesh.nearest_face(&arbor_mesh.start) {
                Some(face) => face,
                None => return false,
            },
        };

        let soma = std::mem::take(&mut self.mesh);
        self.mesh = bridge_meshes(soma, soma_face, &arbor_mesh.mesh, arbor_face);
        self.soma_faces -= 1;
        true
    }
}

/// Joins `other` into `base`, replacing the two given faces by a bridge
/// between their loops, then welds doubles and fixes normals.
pub fn bridge_meshes(mut base: Mesh, base_face: usize, other: &Mesh, other_face: usize) -> Mesh {
    let base_loop = base.faces[base_face].clone();
    let offset = base.num_vertices();
    let other_loop: Vec<usize> = other.faces[other_face].iter().map(|&v| v + offset).collect();

    base.remove_faces(&[base_face]);
    let mut other = other.clone();
    other.remove_faces(&[other_face]);
    base.join(&other);

    bridge_loops(&mut base, &base_loop, &other_loop);
    base.remove_doubles(VERTEX_MERGE_DISTANCE);
    base.recalculate_normals();
    base
}

/// Stitches two facing loops. `a` is wound like the face it came from and
/// `b` like its own face, so `b` is walked in reverse. Equal loops get quads;
/// otherwise the shorter loop is fanned with triangles.
pub fn bridge_loops(mesh: &mut Mesh, a: &[usize], b: &[usize]) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    let mut b: Vec<usize> = b.to_vec();
    b.reverse();

    // rotate b so its start lies closest to a's start
    let start = (0..b.len())
        .min_by(|&i, &j| {
            let di = (mesh.vertices[b[i]] - mesh.vertices[a[0]]).norm_squared();
            let dj = (mesh.vertices[b[j]] - mesh.vertices[a[0]]).norm_squared();
            di.total_cmp(&dj)
        })
        .unwrap_or(0);
    b.rotate_left(start);

    let (n, m) = (a.len(), b.len());
    if n == m {
        for i in 0..n {
            let j = (i + 1) % n;
            mesh.add_face(vec![a[i], a[j], b[j], b[i]]);
        }
        return;
    }

    // walk both loops by parametric position, emitting triangles
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let ti = (i + 1) as f32 / n as f32;
        let tj = (j + 1) as f32 / m as f32;
        if j >= m || (i < n && ti <= tj) {
            mesh.add_face(vec![a[i % n], a[(i + 1) % n], b[j % m]]);
            i += 1;
        } else {
            mesh.add_face(vec![a[i % n], b[(j + 1) % m], b[j % m]]);
            j += 1;
        }
    }
}
