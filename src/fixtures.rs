//! Synthetic skeletons shared by the unit tests.

use nalgebra::{Point3, Vector3};

use crate::morphology::{ArborKind, Morphology, Sample, Soma};

/// Evenly spaced samples along a straight line with linearly varying radius.
pub(crate) fn straight_section(
    start: Point3<f32>,
    direction: Vector3<f32>,
    count: usize,
    spacing: f32,
    r0: f32,
    r1: f32,
) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let t = if count > 1 {
                i as f32 / (count - 1) as f32
            } else {
                0.0
            };
            Sample::new(i, start + direction * spacing * i as f32, r0 + (r1 - r0) * t)
        })
        .collect()
}

/// A soma of radius 5 at the origin with a single axon along +x made of three
/// chained straight sections of 10 samples, tapering from 1.0 to 0.2.
pub(crate) fn straight_axon() -> Morphology {
    let soma = Soma::new(Point3::origin(), 5.0, Vec::new());
    let mut morph = Morphology::new("straight_axon", soma);
    let radii = [(1.0, 0.75), (0.75, 0.45), (0.45, 0.2)];
    let mut start = Point3::new(6.0, 0.0, 0.0);
    let mut parent = None;
    for (r0, r1) in radii {
        let samples = straight_section(start, Vector3::x(), 10, 1.0, r0, r1);
        start = samples.last().unwrap().point;
        parent = Some(match parent {
            None => morph.add_arbor(ArborKind::Axon, samples),
            Some(p) => morph.add_section(p, samples),
        });
    }
    morph
}

/// A soma with one axon that bifurcates once, and one basal dendrite.
pub(crate) fn bifurcating() -> Morphology {
    let soma = Soma::new(Point3::origin(), 4.0, Vec::new());
    let mut morph = Morphology::new("bifurcating", soma);

    let trunk = straight_section(Point3::new(5.0, 0.0, 0.0), Vector3::x(), 6, 1.5, 1.2, 1.0);
    let fork = trunk.last().unwrap().point;
    let root = morph.add_arbor(ArborKind::Axon, trunk);
    let up = straight_section(fork, Vector3::new(1.0, 1.0, 0.0).normalize(), 6, 1.5, 0.8, 0.5);
    let down = straight_section(fork, Vector3::new(1.0, -0.3, 0.0).normalize(), 6, 1.5, 0.6, 0.4);
    morph.add_section(root, up);
    morph.add_section(root, down);

    let dendrite = straight_section(Point3::new(0.0, -5.0, 0.0), -Vector3::y(), 8, 1.0, 1.0, 0.5);
    morph.add_arbor(ArborKind::BasalDendrite, dendrite);
    morph
}
