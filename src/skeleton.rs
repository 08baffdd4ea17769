//! Skeleton styling and poly-line descriptors.
//!
//! Skeletonization styles alter the samples before meshing (tapering the
//! radii, zigzagging the interior points). Poly-lines are the transient
//! bridge between the section tree and the sweep builders, and are also
//! handed out directly for skeleton-only rendering.

use log::debug;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::DUPLICATE_SAMPLE_DISTANCE;
use crate::geom::{normalize_or, orthonormal_basis};
use crate::morphology::{Arbor, Morphology, Sample, SectionId};


/// Style applied to the skeleton before reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Skeletonization {
    Original,
    Tapered,
    Zigzag,
    TaperedZigzag,
}

/// An ordered run of (position, radius) pairs with a material slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolyLine {
    pub samples: Vec<(Point3<f32>, f32)>,
    pub material_index: usize,
}

impl PolyLine {
    fn from_samples(samples: &[Sample], material_index: usize) -> Self {
        Self {
            samples: samples.iter().map(|s| (s.point, s.radius)).collect(),
            material_index,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Applies a skeleton style to every section. Endpoints never move.
pub fn skeletonize(morph: &mut Morphology, style: Skeletonization, seed: Option<u64>) {
    if style == Skeletonization::Original {
        return;
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    for section in morph.sections.iter_mut() {
        if matches!(style, Skeletonization::Tapered | Skeletonization::TaperedZigzag) {
            taper(&mut section.samples);
        }
        if matches!(style, Skeletonization::Zigzag | Skeletonization::TaperedZigzag) {
            zigzag(&mut section.samples, &mut rng);
        }
    }
    debug!("skeletonized {} sections as {:?}", morph.num_sections(), style);
    morph.bump_revision();
}

/// Interpolates the radius linearly in arc length between the first and last sample.
pub fn taper(samples: &mut [Sample]) {
    let n = samples.len();
    if n < 3 {
        return;
    }
    let mut lengths = vec![0.0; n];
    for i in 1..n {
        lengths[i] = lengths[i - 1] + (samples[i].point - samples[i - 1].point).norm();
    }
    let total = lengths[n - 1];
    if total <= 0.0 {
        return;
    }
    let (r0, r1) = (samples[0].radius, samples[n - 1].radius);
    for i in 1..n - 1 {
        samples[i].radius = r0 + (r1 - r0) * lengths[i] / total;
    }
}

/// Displaces every interior sample sideways by a random amount bounded by its radius.
pub fn zigzag(samples: &mut [Sample], rng: &mut StdRng) {
    let n = samples.len();
    if n < 3 {
        return;
    }
    for i in 1..n - 1 {
        let tangent = normalize_or(&(samples[i + 1].point - samples[i - 1].point), Vector3::x());
        let (u, v) = orthonormal_basis(&tangent);
        let angle = rng.random_range(0.0f32..std::f32::consts::TAU);
        let amount = rng.random_range(-1.0f32..1.0) * samples[i].radius;
        samples[i].point += (u * angle.cos() + v * angle.sin()) * amount;
    }
}

/// Poly-lines following primary chains: the primary child extends its
/// parent's line and every secondary child starts a new line at the branch
/// point. A connected root starts on the soma surface when `to_soma` is set.
pub fn connected_sections(
    morph: &Morphology,
    arbor: &Arbor,
    max_order: usize,
    to_soma: bool,
) -> Vec<PolyLine> {
    let material = arbor.kind.material_index();
    let mut lines = Vec::new();

    let mut start = Vec::new();
    if to_soma && arbor.connected_to_soma {
        let radius = morph
            .section(arbor.root)
            .samples
            .first()
            .map_or(0.0, |s| s.radius);
        start.push((morph.root_intersection(arbor), radius));
    }

    let mut stack: Vec<(SectionId, Vec<(Point3<f32>, f32)>)> = vec![(arbor.root, start)];
    while let Some((id, mut line)) = stack.pop() {
        let section = morph.section(id);
        for sample in &section.samples {
            let duplicate = line
                .last()
                .map_or(false, |(p, _)| (sample.point - p).norm() < DUPLICATE_SAMPLE_DISTANCE);
            if !duplicate {
                line.push((sample.point, sample.radius));
            }
        }

        let children: Vec<SectionId> = section
            .children
            .iter()
            .copied()
            .filter(|&c| morph.section(c).branching_order <= max_order)
            .collect();
        let Some((&primary, secondaries)) = children.split_first() else {
            lines.push(PolyLine {
                samples: line,
                material_index: material,
            });
            continue;
        };

        let branch = *line.last().unwrap_or(&(Point3::origin(), 0.0));
        for &child in secondaries.iter().rev() {
            stack.push((child, vec![branch]));
        }
        stack.push((primary, line));
    }
    lines
}

/// One poly-line per section.
pub fn disconnected_sections(morph: &Morphology, arbor: &Arbor, max_order: usize) -> Vec<PolyLine> {
    let material = arbor.kind.material_index();
    morph
        .traverse(arbor.root, max_order)
        .into_iter()
        .map(|id| PolyLine::from_samples(&morph.section(id).samples, material))
        .collect()
}

/// One two-point poly-line per segment between consecutive samples.
pub fn disconnected_segments(morph: &Morphology, arbor: &Arbor, max_order: usize) -> Vec<PolyLine> {
    let material = arbor.kind.material_index();
    morph
        .traverse(arbor.root, max_order)
        .into_iter()
        .flat_map(|id| {
            morph
                .section(id)
                .samples
                .windows(2)
                .map(|w| PolyLine::from_samples(w, material))
                .collect::<Vec<_>>()
        })
        .collect()
}
