//! Primary/secondary labeling of bifurcations.
//!
//! At every branch point exactly one child is marked primary. The primary
//! child continues the parent's tube without interruption, while secondary
//! children start their own tubes from a joint. Labeling also tapers the
//! first radius of the secondary children and reorders the children so the
//! primary one is visited first.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ANGLES_SECONDARY_RATIO, RADII_SECONDARY_RATIO};
use crate::geom::angle_between;
use crate::morphology::{Morphology, SectionId};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::fixtures::{bifurcating, straight_section};
    use crate::morphology::{ArborKind, Soma};
    use nalgebra::{Point3, Vector3};

    fn three_way() -> (Morphology, SectionId) {
        let mut morph = Morphology::new("three_way", Soma::new(Point3::origin(), 2.0, Vec::new()));
        let trunk = straight_section(Point3::new(3.0, 0.0, 0.0), Vector3::x(), 4, 1.0, 1.0, 1.0);
        let fork = trunk.last().unwrap().point;
        let root = morph.add_arbor(ArborKind::Axon, trunk);
        // nearly straight, thin
        let a = straight_section(fork, Vector3::new(1.0, 0.05, 0.0).normalize(), 3, 1.0, 0.4, 0.3);
        // sharp turn, thick
        let b = straight_section(fork, Vector3::new(0.0, 1.0, 0.0), 3, 1.0, 1.4, 0.9);
        // moderate turn
        let c = straight_section(fork, Vector3::new(1.0, -1.0, 0.0).normalize(), 3, 1.0, 0.8, 0.5);
        morph.add_section(root, a);
        morph.add_section(root, b);
        morph.add_section(root, c);
        (morph, root)
    }

    fn primaries(morph: &Morphology, id: SectionId) -> usize {
        morph.children(id).filter(|c| c.is_primary).count()
    }

    #[test]
    fn radii_exactly_one_primary() {
        let (mut morph, root) = three_way();
        label_by_radii(&mut morph, root);
        assert_eq!(primaries(&morph, root), 1);

        let first = morph.section(root).children[0];
        assert!(morph.section(first).is_primary);
        assert_eq!(morph.section(first).samples[0].radius, 1.4);
        for child in morph.children(root).skip(1) {
            assert!(!child.is_primary);
            assert!((child.samples[0].radius - 0.7).abs() < 1e-6);
        }
    }

    #[test]
    fn angles_exactly_one_primary() {
        let (mut morph, root) = three_way();
        label_by_angles(&mut morph, root);
        assert_eq!(primaries(&morph, root), 1);

        // the child bending the most is flagged primary and moved first
        let first = morph.section(root).children[0];
        let direction = morph.section(first).samples[1].point - morph.section(first).samples[0].point;
        assert!((direction.normalize() - Vector3::y()).norm() < 1e-5);

        // parent raised to the greatest child radius
        assert_eq!(morph.section(root).samples.last().unwrap().radius, 1.4);
        for child in morph.children(root).skip(1) {
            assert!((child.samples[0].radius - 0.7).abs() < 1e-6);
        }
    }

    #[test]
    fn angles_skip_short_parent() {
        let mut morph = Morphology::new("short", Soma::new(Point3::origin(), 2.0, Vec::new()));
        let root = morph.add_arbor(
            ArborKind::Axon,
            straight_section(Point3::new(3.0, 0.0, 0.0), Vector3::x(), 1, 1.0, 1.0, 1.0),
        );
        let fork = Point3::new(3.0, 0.0, 0.0);
        morph.add_section(root, straight_section(fork, Vector3::y(), 2, 1.0, 0.5, 0.5));
        morph.add_section(root, straight_section(fork, Vector3::x(), 2, 1.0, 0.5, 0.5));
        morph.section_mut(SectionId(1)).is_primary = false;
        let before = morph.clone();
        label_by_angles(&mut morph, root);
        assert_eq!(morph.sections, before.sections);
    }

    #[test]
    fn label_whole_morphology() {
        for policy in [Branching::Angles, Branching::Radii] {
            let mut morph = bifurcating();
            label_morphology(&mut morph, policy);
            for section in &morph.sections {
                if !section.is_leaf() {
                    assert_eq!(primaries(&morph, section.id), 1, "policy {:?}", policy);
                }
            }
        }
    }
}

/// Policy used to pick the primary child at a bifurcation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Branching {
    Angles,
    Radii,
}

/// Labels the children of `id` using the given policy.
pub fn label_section(morph: &mut Morphology, id: SectionId, policy: Branching) {
    match policy {
        Branching::Angles => label_by_angles(morph, id),
        Branching::Radii => label_by_radii(morph, id),
    }
}

/// Labels every bifurcation in every arbor of the morphology.
pub fn label_morphology(morph: &mut Morphology, policy: Branching) {
    for id in morph.all_sections() {
        if !morph.section(id).is_leaf() {
            label_section(morph, id, policy);
        }
    }
    morph.bump_revision();
}

/// The child whose first sample is thickest becomes primary. Secondary
/// children start at half the largest radius.
pub fn label_by_radii(morph: &mut Morphology, id: SectionId) {
    let children = morph.section(id).children.clone();
    if children.is_empty() {
        return;
    }

    let first_radius = |morph: &Morphology, c: SectionId| {
        morph.section(c).samples.first().map_or(0.0, |s| s.radius)
    };

    let mut primary = children[0];
    let mut largest = first_radius(&*morph, primary);
    for &child in &children[1..] {
        let r = first_radius(&*morph, child);
        if r > largest {
            largest = r;
            primary = child;
        }
    }

    for &child in &children {
        let section = morph.section_mut(child);
        section.is_primary = child == primary;
        if child != primary {
            if let Some(first) = section.samples.first_mut() {
                first.radius = largest * RADII_SECONDARY_RATIO;
            }
        }
    }

    promote_primary(morph, id, primary);
}

/// The child deviating the most from the parent's incoming direction becomes
/// primary. Secondary children start at a fraction of the greatest child
/// radius, and the parent's last radius is raised to the greatest child radius.
///
/// Parents with fewer than two samples have no direction and are left unlabeled.
pub fn label_by_angles(morph: &mut Morphology, id: SectionId) {
    let parent = morph.section(id);
    let children = parent.children.clone();
    if children.is_empty() {
        return;
    }
    let n = parent.samples.len();
    if n < 2 {
        debug!("section {} has fewer than two samples, skipping angle labeling", id.0);
        return;
    }
    let parent_end = parent.samples[n - 1].point;
    let parent_dir = parent_end - parent.samples[n - 2].point;

    let mut primary = children[0];
    let mut greatest_angle = f32::NEG_INFINITY;
    let mut greatest_radius: f32 = 0.0;
    for &child in &children {
        let samples = &morph.section(child).samples;
        let child_dir = match samples.len() {
            0 => continue,
            1 => samples[0].point - parent_end,
            _ => samples[1].point - samples[0].point,
        };
        let angle = angle_between(&parent_dir, &child_dir);
        if angle > greatest_angle {
            greatest_angle = angle;
            primary = child;
        }
        greatest_radius = greatest_radius.max(samples[0].radius);
    }

    for &child in &children {
        let section = morph.section_mut(child);
        section.is_primary = child == primary;
        if child != primary {
            if let Some(first) = section.samples.first_mut() {
                first.radius = greatest_radius * ANGLES_SECONDARY_RATIO;
            }
        }
    }

    if let Some(last) = morph.section_mut(id).samples.last_mut() {
        if last.radius < greatest_radius {
            last.radius = greatest_radius;
        }
    }

    promote_primary(morph, id, primary);
}

/// Moves the primary child to the front, keeping the order of the others.
fn promote_primary(morph: &mut Morphology, id: SectionId, primary: SectionId) {
    let children = &mut morph.section_mut(id).children;
    if let Some(index) = children.iter().position(|&c| c == primary) {
        let child = children.remove(index);
        children.insert(0, child);
    }
}
