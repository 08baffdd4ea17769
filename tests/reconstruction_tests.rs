use std::io::Write;

use nalgebra::{Point3, Vector3};
use neuromesh::{
    branching::Branching,
    export::export_all,
    framing::compute_360_bounding_box,
    geom::BoundingBox,
    mesh::Mesh,
    morphology::{ArborKind, Morphology, Sample, Soma},
    reconstruct::Reconstruction,
    settings::{self, Edges, SomaConnection},
    swc::read_swc,
};
use proptest::prelude::*;

// Tolerance for comparing box extents
const TOL: f32 = 1e-3;

fn line(start: Point3<f32>, count: usize, r0: f32, r1: f32) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let t = i as f32 / (count - 1) as f32;
            Sample::new(i, start + Vector3::x() * i as f32, r0 + (r1 - r0) * t)
        })
        .collect()
}

/// Soma of radius 5 with one axon of three straight sections of 10 samples.
fn straight_axon() -> Morphology {
    let soma = Soma::new(
        Point3::origin(),
        5.0,
        vec![Point3::new(-5.0, 0.0, 0.0), Point3::new(5.0, 0.0, 0.0)],
    );
    let mut morph = Morphology::new("axon", soma);
    let first = line(Point3::new(6.0, 0.0, 0.0), 10, 1.0, 0.75);
    let second = line(first[9].point, 10, 0.75, 0.45);
    let third = line(second[9].point, 10, 0.45, 0.2);
    let root = morph.add_arbor(ArborKind::Axon, first);
    let middle = morph.add_section(root, second);
    morph.add_section(middle, third);
    morph
}

#[test]
fn straight_axon_connected_hard_radii() {
    let morph = straight_axon();
    let mut settings = settings::load_default_config().unwrap();
    settings.soma_connection = SomaConnection::Connected;
    settings.edges = Edges::Hard;
    settings.branching = Branching::Radii;

    let recon = Reconstruction::build(&morph, &settings).unwrap();
    assert_eq!(recon.objects.len(), 1);
    let mesh = &recon.objects[0].mesh;
    assert_eq!(mesh.connected_components(), 1);
    assert!(mesh.is_watertight());
    assert!(!mesh.smooth);

    // soma diameter plus the arbor's projection on each axis
    let soma_radius = morph.soma.mean_radius;
    let arbor_x = 33.0 - 6.0;
    let bounds = recon.bounding_box.bounds;
    assert!(bounds.x >= 2.0 * soma_radius + arbor_x - TOL, "bounds: {:?}", bounds);
    assert!(bounds.y >= 2.0 * soma_radius - TOL, "bounds: {:?}", bounds);
    assert!(bounds.z >= 2.0 * soma_radius - TOL, "bounds: {:?}", bounds);
}

#[test]
fn union_box_contains_every_arbor() {
    let mut morph = straight_axon();
    let up = (0..6)
        .map(|i| Sample::new(i, Point3::new(0.0, 6.0 + i as f32, 0.0), 0.8))
        .collect();
    morph.add_arbor(ArborKind::ApicalDendrite, up);
    let down = (0..6)
        .map(|i| Sample::new(i, Point3::new(0.0, -6.0 - i as f32, 1.0), 0.5))
        .collect();
    morph.add_arbor(ArborKind::BasalDendrite, down);

    let mut settings = settings::load_default_config().unwrap();
    settings.soma_connection = SomaConnection::Disconnected;
    let recon = Reconstruction::build(&morph, &settings).unwrap();
    assert_eq!(recon.objects.len(), 4);
    for object in &recon.objects {
        let arbor_box = object.mesh.bounding_box().unwrap();
        assert!(recon.bounding_box.contains_box(&arbor_box), "{}", object.name);
    }
}

#[test]
fn turntable_box_scenario() {
    let bbox = BoundingBox::new(Point3::new(-5.0, -2.0, -5.0), Point3::new(5.0, 8.0, 5.0));
    let spun = compute_360_bounding_box(&bbox, &Point3::origin());
    assert!((spun.bounds.x - spun.bounds.z).abs() < TOL);
    assert!((spun.bounds.x - 2.0 * 50.0f32.sqrt()).abs() < TOL);
    assert_eq!((spun.p_min.y, spun.p_max.y), (-2.0, 8.0));
}

#[test]
fn swc_to_files() {
    let dir = tempfile::tempdir().unwrap();
    let swc_path = dir.path().join("cell.swc");
    let mut file = std::fs::File::create(&swc_path).unwrap();
    writeln!(file, "# id type x y z radius parent").unwrap();
    writeln!(file, "1 1 0 0 0 4 -1").unwrap();
    for i in 0..8 {
        let parent = if i == 0 { 1 } else { i + 1 };
        writeln!(file, "{} 2 {} 0 0 1.0 {}", i + 2, 5 + 2 * i, parent).unwrap();
    }
    for i in 0..5 {
        let parent = if i == 0 { 1 } else { i + 9 };
        writeln!(file, "{} 3 0 {} 0 0.7 {}", i + 10, -5 - 2 * i, parent).unwrap();
    }
    drop(file);

    let morph = read_swc(&swc_path).unwrap();
    assert_eq!(morph.label, "cell");
    assert_eq!(morph.arbors.len(), 2);

    let settings = settings::load_default_config().unwrap();
    let recon = Reconstruction::build(&morph, &settings).unwrap();
    let out = dir.path().join("out");
    let written = export_all(&out, &recon, &settings).unwrap();
    assert_eq!(written.len(), 3);

    let mesh = Mesh::from_obj(out.join("cell.obj")).unwrap();
    let total_vertices: usize = recon.objects.iter().map(|o| o.mesh.num_vertices()).sum();
    assert_eq!(mesh.num_vertices(), total_vertices);

    let summary: serde_json::Value =
        serde_json::from_reader(std::fs::File::open(out.join("cell.json")).unwrap()).unwrap();
    assert_eq!(summary["label"], "cell");
    assert_eq!(summary["stats"]["arbors"], 2);
    assert!(summary["generated"].is_string());

    let saved = std::fs::read_to_string(out.join("settings.toml")).unwrap();
    assert!(saved.contains("method = \"EXTRUSION\""));
}

proptest! {
    #[test]
    fn union_contains_both(
        a in prop::array::uniform3(-100.0f32..100.0),
        da in prop::array::uniform3(0.0f32..50.0),
        b in prop::array::uniform3(-100.0f32..100.0),
        db in prop::array::uniform3(0.0f32..50.0),
    ) {
        let first = BoundingBox::new(Point3::from(a), Point3::from(a) + Vector3::from(da));
        let second = BoundingBox::new(Point3::from(b), Point3::from(b) + Vector3::from(db));
        let union = first.union(&second);
        prop_assert!(union.contains_box(&first));
        prop_assert!(union.contains_box(&second));
    }

    #[test]
    fn extend_then_shrink_is_identity(
        a in prop::array::uniform3(-100.0f32..100.0),
        da in prop::array::uniform3(0.0f32..50.0),
        delta in prop::array::uniform3(-10.0f32..10.0),
    ) {
        let bbox = BoundingBox::new(Point3::from(a), Point3::from(a) + Vector3::from(da));
        let delta = Vector3::from(delta);
        let back = bbox.extend(&delta).extend(&-delta);
        prop_assert!((back.p_min - bbox.p_min).norm() < 1e-3);
        prop_assert!((back.p_max - bbox.p_max).norm() < 1e-3);
    }
}
