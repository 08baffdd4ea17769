//! Resampling and repair of the samples along each section.
//!
//! Raw morphologies are often unevenly sampled, which shows up as kinks and
//! pinches once a tube is swept along them. Every pass here keeps the first
//! and the last sample of a section exactly where they are, since those are
//! the branch and connection points of the tree.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::DUPLICATE_SAMPLE_DISTANCE;
use crate::morphology::{Morphology, Sample};


/// Resampling strategy applied to every section before meshing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resampling {
    None,
    /// Regular spacing of `resampling_step` microns along the section.
    FixedStep,
    /// Drops samples whose spheres overlap their predecessor.
    AdaptiveRelaxed,
    /// Drops samples whose center falls inside their predecessor's sphere.
    AdaptivePacked,
}

/// Resamples one section's samples. Sections with fewer than two samples are returned as is.
pub fn resample_samples(samples: &[Sample], method: Resampling, step: f32) -> Vec<Sample> {
    if samples.len() < 2 {
        return samples.to_vec();
    }
    match method {
        Resampling::None => samples.to_vec(),
        Resampling::FixedStep => fixed_step(samples, step),
        Resampling::AdaptiveRelaxed => adaptive(samples, false),
        Resampling::AdaptivePacked => adaptive(samples, true),
    }
}

/// Emits a sample every `step` microns of arc length, interpolating position
/// and radius between the original samples.
pub fn fixed_step(samples: &[Sample], step: f32) -> Vec<Sample> {
    let n = samples.len();
    if n < 2 || step <= 0.0 {
        return samples.to_vec();
    }

    let total = arc_length(samples);
    let mut resampled = vec![samples[0]];
    let mut target = step;
    let mut travelled = 0.0;

    for w in samples.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        let length = (b.point - a.point).norm();
        // stop short of the end so the last sample is never doubled
        while target < travelled + length && target < total - step * 1e-3 {
            let t = (target - travelled) / length;
            resampled.push(Sample::new(
                a.id,
                a.point + (b.point - a.point) * t,
                a.radius + (b.radius - a.radius) * t,
            ));
            target += step;
        }
        travelled += length;
    }

    resampled.push(samples[n - 1]);
    resampled
}

/// Keeps the samples that are far enough from the previously kept one.
/// In relaxed mode neighboring spheres may not overlap; in packed mode a
/// sample is dropped only when its center lies inside the previous sphere.
pub fn adaptive(samples: &[Sample], packed: bool) -> Vec<Sample> {
    let n = samples.len();
    if n < 2 {
        return samples.to_vec();
    }

    let far_enough = |a: &Sample, b: &Sample| {
        let d = (b.point - a.point).norm();
        if packed {
            d >= a.radius.max(b.radius)
        } else {
            d >= a.radius + b.radius
        }
    };

    let mut kept = vec![samples[0]];
    for sample in &samples[1..n - 1] {
        if far_enough(kept.last().unwrap_or(&samples[0]), sample) {
            kept.push(*sample);
        }
    }

    let last = samples[n - 1];
    while kept.len() > 1 && !far_enough(&kept[kept.len() - 1], &last) {
        kept.pop();
    }
    kept.push(last);
    kept
}

/// Collapses consecutive samples closer than [`DUPLICATE_SAMPLE_DISTANCE`].
/// When the last sample duplicates its predecessor, the predecessor goes.
pub fn remove_duplicate_samples(samples: &[Sample]) -> Vec<Sample> {
    let n = samples.len();
    if n < 2 {
        return samples.to_vec();
    }

    let mut kept: Vec<Sample> = vec![samples[0]];
    for sample in &samples[1..n - 1] {
        let prev = kept[kept.len() - 1];
        if (sample.point - prev.point).norm() >= DUPLICATE_SAMPLE_DISTANCE {
            kept.push(*sample);
        }
    }

    let last = samples[n - 1];
    while kept.len() > 1 && (last.point - kept[kept.len() - 1].point).norm() < DUPLICATE_SAMPLE_DISTANCE {
        kept.pop();
    }
    kept.push(last);
    kept
}

fn arc_length(samples: &[Sample]) -> f32 {
    samples
        .windows(2)
        .map(|w| (w[1].point - w[0].point).norm())
        .sum()
}

/// Resamples every section of the morphology in place.
pub fn resample_morphology(morph: &mut Morphology, method: Resampling, step: f32) {
    if method == Resampling::None {
        return;
    }
    let mut before = 0;
    let mut after = 0;
    for section in morph.sections.iter_mut() {
        before += section.samples.len();
        section.samples = resample_samples(&section.samples, method, step);
        after += section.samples.len();
    }
    renumber_samples(morph);
    morph.bump_revision();
    debug!("resampled {:?}: {} samples -> {}", method, before, after);
}

/// Removes duplicate consecutive samples from every section and returns how many were dropped.
pub fn repair_duplicates(morph: &mut Morphology) -> usize {
    let mut removed = 0;
    for section in morph.sections.iter_mut() {
        let repaired = remove_duplicate_samples(&section.samples);
        removed += section.samples.len() - repaired.len();
        section.samples = repaired;
    }
    if removed > 0 {
        debug!("removed {} duplicate samples", removed);
        morph.bump_revision();
    }
    removed
}

/// Assigns fresh, morphology-wide unique ids to every sample.
fn renumber_samples(morph: &mut Morphology) {
    let mut next = 0;
    for section in morph.sections.iter_mut() {
        for sample in section.samples.iter_mut() {
            sample.id = next;
            next += 1;
        }
    }
}
