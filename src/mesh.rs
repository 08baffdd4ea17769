//! Editable polygon meshes.
//!
//! A [`Mesh`] is an explicit geometry handle: every operation takes the mesh
//! it acts on, and faces are addressed by index rather than through any
//! notion of a current selection. Faces are polygons given as vertex index
//! loops, wound counter-clockwise when seen from outside.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::path::Path;

use nalgebra::{Point3, Vector3};

use crate::error::{MorphError, Result};
use crate::geom::BoundingBox;


/// A polygon mesh with shared vertices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub vertices: Vec<Point3<f32>>,
    pub faces: Vec<Vec<usize>>,
    /// Export with averaged vertex normals instead of flat faces.
    pub smooth: bool,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every object of an OBJ file into a single mesh.
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Mesh> {
        let options = tobj::LoadOptions {
            single_index: true,
            ..Default::default()
        };
        let (models, _) =
            tobj::load_obj(path.as_ref(), &options).map_err(|e| MorphError::Obj(e.to_string()))?;

        let mut mesh = Mesh::new();
        for model in &models {
            let m = &model.mesh;
            let offset = mesh.vertices.len();
            for p in m.positions.chunks_exact(3) {
                mesh.add_vertex(Point3::new(p[0], p[1], p[2]));
            }

            if m.face_arities.is_empty() {
                for tri in m.indices.chunks_exact(3) {
                    mesh.add_face(tri.iter().map(|&i| offset + i as usize).collect());
                }
            } else {
                let mut next = 0;
                for &arity in &m.face_arities {
                    let end = next + arity as usize;
                    mesh.add_face(m.indices[next..end].iter().map(|&i| offset + i as usize).collect());
                    next = end;
                }
            }
        }
        Ok(mesh)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn add_vertex(&mut self, vertex: Point3<f32>) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn add_face(&mut self, face: Vec<usize>) -> usize {
        self.faces.push(face);
        self.faces.len() - 1
    }

    pub fn face_points(&self, face: usize) -> Vec<Point3<f32>> {
        self.faces[face].iter().map(|&v| self.vertices[v]).collect()
    }

    pub fn face_center(&self, face: usize) -> Point3<f32> {
        let loop_ = &self.faces[face];
        let sum = loop_
            .iter()
            .fold(Vector3::zeros(), |acc, &v| acc + self.vertices[v].coords);
        Point3::from(sum / loop_.len() as f32)
    }

    /// Unit normal of a face by Newell's method, robust to non-planar polygons.
    pub fn face_normal(&self, face: usize) -> Vector3<f32> {
        let n = self.newell_normal(face);
        let norm = n.norm();
        if norm > 0.0 {
            n / norm
        } else {
            n
        }
    }

    /// Newell normal, whose length is twice the polygon area.
    fn newell_normal(&self, face: usize) -> Vector3<f32> {
        let loop_ = &self.faces[face];
        let mut n = Vector3::zeros();
        for i in 0..loop_.len() {
            let a = self.vertices[loop_[i]];
            let b = self.vertices[loop_[(i + 1) % loop_.len()]];
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n
    }

    pub fn face_area(&self, face: usize) -> f32 {
        self.newell_normal(face).norm() / 2.0
    }

    pub fn surface_area(&self) -> f32 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    pub fn flip_face(&mut self, face: usize) {
        self.faces[face].reverse();
    }

    /// Face whose center is closest to `point`.
    pub fn nearest_face(&self, point: &Point3<f32>) -> Option<usize> {
        self.nearest_face_in(point, 0..self.faces.len())
    }

    /// Like [`Mesh::nearest_face`], considering only the faces in `range`.
    pub fn nearest_face_in(&self, point: &Point3<f32>, range: Range<usize>) -> Option<usize> {
        let range = range.start..range.end.min(self.faces.len());
        range.min_by(|&a, &b| {
            let da = (self.face_center(a) - point).norm_squared();
            let db = (self.face_center(b) - point).norm_squared();
            da.total_cmp(&db)
        })
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.vertices)
    }

    /// Appends another mesh and returns the index offset of its vertices.
    pub fn join(&mut self, other: &Mesh) -> usize {
        let offset = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| f.iter().map(|&v| v + offset).collect::<Vec<_>>()),
        );
        offset
    }

    /// Deletes the given faces. Their vertices stay in place.
    pub fn remove_faces(&mut self, faces: &[usize]) {
        let doomed: HashSet<usize> = faces.iter().copied().collect();
        let mut index = 0;
        self.faces.retain(|_| {
            let keep = !doomed.contains(&index);
            index += 1;
            keep
        });
    }

    /// Welds vertices closer than `distance`, drops faces that collapse to fewer
    /// than three distinct vertices and compacts unused vertices. Returns the
    /// number of vertices removed.
    pub fn remove_doubles(&mut self, distance: f32) -> usize {
        let before = self.vertices.len();
        let cell = distance.max(f32::EPSILON);
        let key = |p: &Point3<f32>| {
            (
                (p.x / cell).floor() as i64,
                (p.y / cell).floor() as i64,
                (p.z / cell).floor() as i64,
            )
        };

        let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
        let mut remap = vec![0; self.vertices.len()];
        for (i, p) in self.vertices.iter().enumerate() {
            let (kx, ky, kz) = key(p);
            let mut representative = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        if let Some(candidates) = grid.get(&(kx + dx, ky + dy, kz + dz)) {
                            for &c in candidates {
                                if (self.vertices[c] - p).norm() <= distance {
                                    representative = Some(c);
                                    break 'search;
                                }
                            }
                        }
                    }
                }
            }
            remap[i] = match representative {
                Some(c) => c,
                None => {
                    grid.entry((kx, ky, kz)).or_default().push(i);
                    i
                }
            };
        }

        for face in self.faces.iter_mut() {
            let mut welded: Vec<usize> = Vec::with_capacity(face.len());
            for &v in face.iter() {
                let v = remap[v];
                if welded.last() != Some(&v) {
                    welded.push(v);
                }
            }
            while welded.len() > 1 && welded.first() == welded.last() {
                welded.pop();
            }
            *face = welded;
        }
        self.faces.retain(|f| {
            let distinct: HashSet<&usize> = f.iter().collect();
            distinct.len() >= 3
        });

        self.remove_unused_vertices();
        before - self.vertices.len()
    }

    /// Drops vertices that no face references, renumbering the rest.
    pub fn remove_unused_vertices(&mut self) {
        let mut used = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                used[v] = true;
            }
        }
        let mut new_index = vec![usize::MAX; self.vertices.len()];
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for (i, p) in self.vertices.iter().enumerate() {
            if used[i] {
                new_index[i] = vertices.len();
                vertices.push(*p);
            }
        }
        for face in self.faces.iter_mut() {
            for v in face.iter_mut() {
                *v = new_index[*v];
            }
        }
        self.vertices = vertices;
    }

    /// Maps each undirected edge to the faces using it.
    pub fn edge_faces(&self) -> HashMap<(usize, usize), Vec<usize>> {
        let mut edges: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (f, face) in self.faces.iter().enumerate() {
            for i in 0..face.len() {
                let (a, b) = (face[i], face[(i + 1) % face.len()]);
                edges.entry((a.min(b), a.max(b))).or_default().push(f);
            }
        }
        edges
    }

    /// Edges used by exactly one face.
    pub fn boundary_edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .edge_faces()
            .into_iter()
            .filter(|(_, faces)| faces.len() == 1)
            .map(|(edge, _)| edge)
            .collect();
        edges.sort_unstable();
        edges
    }

    /// True when every edge is shared by exactly two faces.
    pub fn is_watertight(&self) -> bool {
        !self.faces.is_empty() && self.edge_faces().values().all(|faces| faces.len() == 2)
    }

    /// Number of face-connected components.
    pub fn connected_components(&self) -> usize {
        self.face_components().len()
    }

    /// Groups faces that share vertices.
    fn face_components(&self) -> Vec<Vec<usize>> {
        let mut vertex_faces: HashMap<usize, Vec<usize>> = HashMap::new();
        for (f, face) in self.faces.iter().enumerate() {
            for &v in face {
                vertex_faces.entry(v).or_default().push(f);
            }
        }

        let mut seen = vec![false; self.faces.len()];
        let mut components = Vec::new();
        for start in 0..self.faces.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(f) = queue.pop_front() {
                component.push(f);
                for v in &self.faces[f] {
                    for &g in &vertex_faces[v] {
                        if !seen[g] {
                            seen[g] = true;
                            queue.push_back(g);
                        }
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Signed enclosed volume. Positive for a closed mesh with outward normals.
    pub fn signed_volume(&self) -> f32 {
        self.signed_volume_of(&(0..self.faces.len()).collect::<Vec<_>>())
    }

    fn signed_volume_of(&self, faces: &[usize]) -> f32 {
        let mut volume = 0.0;
        for &f in faces {
            let face = &self.faces[f];
            let a = self.vertices[face[0]].coords;
            for i in 1..face.len().saturating_sub(1) {
                let b = self.vertices[face[i]].coords;
                let c = self.vertices[face[i + 1]].coords;
                volume += a.dot(&b.cross(&c));
            }
        }
        volume / 6.0
    }

    /// Makes the winding of adjacent faces consistent, then flips each
    /// component so that its normals point outward.
    pub fn recalculate_normals(&mut self) {
        let edges = self.edge_faces();
        let mut visited = vec![false; self.faces.len()];
        let mut components = Vec::new();

        for start in 0..self.faces.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(f) = queue.pop_front() {
                component.push(f);
                let face = self.faces[f].clone();
                for i in 0..face.len() {
                    let (a, b) = (face[i], face[(i + 1) % face.len()]);
                    for &g in &edges[&(a.min(b), a.max(b))] {
                        if visited[g] {
                            continue;
                        }
                        visited[g] = true;
                        if has_directed_edge(&self.faces[g], a, b) {
                            self.faces[g].reverse();
                        }
                        queue.push_back(g);
                    }
                }
            }
            components.push(component);
        }

        for component in components {
            if self.signed_volume_of(&component) < 0.0 {
                for f in component {
                    self.faces[f].reverse();
                }
            }
        }
    }

    /// Area-weighted vertex normals.
    pub fn vertex_normals(&self) -> Vec<Vector3<f32>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for f in 0..self.faces.len() {
            let n = self.newell_normal(f);
            for &v in &self.faces[f] {
                normals[v] += n;
            }
        }
        for n in normals.iter_mut() {
            let norm = n.norm();
            if norm > 0.0 {
                *n /= norm;
            }
        }
        normals
    }
}

fn has_directed_edge(face: &[usize], a: usize, b: usize) -> bool {
    (0..face.len()).any(|i| face[i] == a && face[(i + 1) % face.len()] == b)
}
