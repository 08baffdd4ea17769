//! Skeleton data model for neuron morphologies.
//!
//! A morphology owns one soma and a flat arena of sections. Arbors refer to
//! their root section by index and sections refer to their parent and
//! children by index, so the tree has no reference cycles and a deep copy is
//! a plain `clone`.
//!
//! # Key Components
//!
//! - [`Sample`]: a measured point with a radius
//! - [`Section`]: a run of samples between branch points
//! - [`Arbor`]: a rooted axon or dendrite
//! - [`Soma`]: the cell body with its plausible radius range
//! - [`Morphology`]: the owning container

use log::debug;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{SOMA_CONNECTION_FACTOR, SOMA_PROFILE_OUTLIER_FRACTION};
use crate::geom::{normalize_or, BoundingBox};


/// A single measured point along a section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub id: usize,
    pub point: Point3<f32>,
    pub radius: f32,
}

impl Sample {
    pub fn new(id: usize, point: Point3<f32>, radius: f32) -> Self {
        Self { id, point, radius }
    }
}

/// Index of a section in its morphology's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectionId(pub usize);

/// The kind of a rooted arbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArborKind {
    Axon,
    ApicalDendrite,
    BasalDendrite,
}

impl ArborKind {
    /// Material slot used by the renderer. Slot 0 is the soma.
    pub fn material_index(&self) -> usize {
        match self {
            ArborKind::Axon => 1,
            ArborKind::ApicalDendrite => 2,
            ArborKind::BasalDendrite => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ArborKind::Axon => "axon",
            ArborKind::ApicalDendrite => "apical_dendrite",
            ArborKind::BasalDendrite => "basal_dendrite",
        }
    }
}

/// A maximal run of samples between two branch points, or a branch point and a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: SectionId,
    pub samples: Vec<Sample>,
    pub branching_order: usize,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
    pub is_primary: bool,
    pub arbor: ArborKind,
}

impl Section {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn first_point(&self) -> Option<Point3<f32>> {
        self.samples.first().map(|s| s.point)
    }

    pub fn last_point(&self) -> Option<Point3<f32>> {
        self.samples.last().map(|s| s.point)
    }

    /// Total polyline length of the section.
    pub fn length(&self) -> f32 {
        self.samples
            .windows(2)
            .map(|w| (w[1].point - w[0].point).norm())
            .sum()
    }
}

/// A rooted branching structure emanating from the soma.
#[derive(Debug, Clone, PartialEq)]
pub struct Arbor {
    pub kind: ArborKind,
    pub root: SectionId,
    pub connected_to_soma: bool,
}

/// The cell body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Soma {
    pub centroid: Point3<f32>,
    pub mean_radius: f32,
    pub profile_points: Vec<Point3<f32>>,
    pub smallest_radius: f32,
    pub largest_radius: f32,
}

impl Soma {
    /// Creates a soma and derives its plausible radius range from the spread of
    /// the profile points around the centroid.
    pub fn new(centroid: Point3<f32>, reported_radius: f32, profile_points: Vec<Point3<f32>>) -> Self {
        let distances: Vec<f32> = profile_points
            .iter()
            .map(|p| (p - centroid).norm())
            .collect();

        if distances.is_empty() {
            return Self {
                centroid,
                mean_radius: reported_radius,
                profile_points,
                smallest_radius: reported_radius,
                largest_radius: reported_radius,
            };
        }

        let mean = distances.iter().sum::<f32>() / distances.len() as f32;
        if mean <= 0.0 {
            return Self::new(centroid, reported_radius, Vec::new());
        }
        let cutoff = mean * SOMA_PROFILE_OUTLIER_FRACTION;
        let kept: Vec<f32> = distances.into_iter().filter(|&d| d >= cutoff).collect();

        let smallest_radius = kept.iter().copied().fold(f32::INFINITY, f32::min);
        let largest_radius = kept.iter().copied().fold(0.0, f32::max);
        let kept_mean = kept.iter().sum::<f32>() / kept.len() as f32;

        let mean_radius = if (smallest_radius..=largest_radius).contains(&reported_radius) {
            reported_radius
        } else {
            debug!(
                "reported soma radius {} outside profile range [{}, {}], using {}",
                reported_radius, smallest_radius, largest_radius, kept_mean
            );
            kept_mean
        };

        Self {
            centroid,
            mean_radius,
            profile_points,
            smallest_radius,
            largest_radius,
        }
    }
}

/// A neuron skeleton: one soma plus zero or more arbors.
#[derive(Debug, Clone, PartialEq)]
pub struct Morphology {
    pub label: String,
    pub soma: Soma,
    pub sections: Vec<Section>,
    pub arbors: Vec<Arbor>,
    revision: u64,
}

impl Morphology {
    pub fn new(label: &str, soma: Soma) -> Self {
        Self {
            label: label.to_string(),
            soma,
            sections: Vec::new(),
            arbors: Vec::new(),
            revision: 0,
        }
    }

    /// Number of mutating passes applied since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.0]
    }

    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.0]
    }

    pub fn parent(&self, id: SectionId) -> Option<&Section> {
        self.section(id).parent.map(|p| self.section(p))
    }

    pub fn children(&self, id: SectionId) -> impl Iterator<Item = &Section> {
        self.section(id).children.iter().map(move |&c| self.section(c))
    }

    /// Adds a new arbor with a root section and returns the root's id.
    pub fn add_arbor(&mut self, kind: ArborKind, samples: Vec<Sample>) -> SectionId {
        let id = self.push_section(samples, 1, None, kind);
        self.arbors.push(Arbor {
            kind,
            root: id,
            connected_to_soma: true,
        });
        id
    }

    /// Adds a child section below `parent` and returns its id.
    pub fn add_section(&mut self, parent: SectionId, samples: Vec<Sample>) -> SectionId {
        let (order, kind) = {
            let p = self.section(parent);
            (p.branching_order + 1, p.arbor)
        };
        let id = self.push_section(samples, order, Some(parent), kind);
        self.section_mut(parent).children.push(id);
        id
    }

    fn push_section(
        &mut self,
        samples: Vec<Sample>,
        branching_order: usize,
        parent: Option<SectionId>,
        arbor: ArborKind,
    ) -> SectionId {
        let id = SectionId(self.sections.len());
        self.sections.push(Section {
            id,
            samples,
            branching_order,
            parent,
            children: Vec::new(),
            is_primary: true,
            arbor,
        });
        id
    }

    pub fn arbors_of(&self, kind: ArborKind) -> impl Iterator<Item = &Arbor> {
        self.arbors.iter().filter(move |a| a.kind == kind)
    }

    pub fn axon(&self) -> Option<&Arbor> {
        self.arbors_of(ArborKind::Axon).next()
    }

    pub fn apical_dendrites(&self) -> impl Iterator<Item = &Arbor> {
        self.arbors_of(ArborKind::ApicalDendrite)
    }

    pub fn basal_dendrites(&self) -> impl Iterator<Item = &Arbor> {
        self.arbors_of(ArborKind::BasalDendrite)
    }

    /// Pre-order traversal from `root`, visiting children in their stored order
    /// and never descending past `max_order`.
    pub fn traverse(&self, root: SectionId, max_order: usize) -> Vec<SectionId> {
        let mut visited = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let section = self.section(id);
            if section.branching_order > max_order {
                continue;
            }
            visited.push(id);
            stack.extend(section.children.iter().rev().copied());
        }
        visited
    }

    /// Ids of every section in every arbor.
    pub fn all_sections(&self) -> Vec<SectionId> {
        self.arbors
            .iter()
            .flat_map(|a| self.traverse(a.root, usize::MAX))
            .collect()
    }

    /// Bounding box of every sample, grown by its radius, plus the soma sphere.
    pub fn samples_bounding_box(&self) -> BoundingBox {
        let r = self.soma.mean_radius;
        let soma_box = BoundingBox::new(
            self.soma.centroid - Vector3::repeat(r),
            self.soma.centroid + Vector3::repeat(r),
        );
        self.sections
            .iter()
            .flat_map(|s| s.samples.iter())
            .fold(soma_box, |acc, s| {
                let r = Vector3::repeat(s.radius);
                acc.union(&BoundingBox::new(s.point - r, s.point + r))
            })
    }

    /// Marks every arbor whose first sample lies within reach of the soma as connected.
    pub fn verify_soma_connectivity(&mut self) {
        let threshold = SOMA_CONNECTION_FACTOR * self.soma.largest_radius;
        let centroid = self.soma.centroid;
        for i in 0..self.arbors.len() {
            let root = self.arbors[i].root;
            let connected = match self.section(root).first_point() {
                Some(p) => (p - centroid).norm() <= threshold,
                None => false,
            };
            if !connected {
                debug!(
                    "{} arbor rooted at section {} is too far from the soma and stays disconnected",
                    self.arbors[i].kind.label(),
                    root.0
                );
            }
            self.arbors[i].connected_to_soma = connected;
        }
    }

    /// Direction from the soma centroid to the first sample of an arbor.
    pub fn root_direction(&self, arbor: &Arbor) -> Vector3<f32> {
        let first = self
            .section(arbor.root)
            .first_point()
            .unwrap_or(self.soma.centroid);
        normalize_or(&(first - self.soma.centroid), Vector3::x())
    }

    /// Point on the soma sphere where the arbor leaves the soma.
    pub fn root_intersection(&self, arbor: &Arbor) -> Point3<f32> {
        self.soma.centroid + self.root_direction(arbor) * self.soma.mean_radius
    }
}
