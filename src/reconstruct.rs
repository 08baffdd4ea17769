//! The morphology to geometry pipeline.
//!
//! A reconstruction never touches its input: the morphology is deep copied,
//! then repaired, resampled, skeletonized, checked for soma connectivity and
//! labeled before any geometry is built. Arbors are built in parallel, each
//! into its own mesh, and only joined afterwards.

use std::path::Path;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::bevel::sweep;
use crate::branching::label_morphology;
use crate::connect::SomaBridge;
use crate::error::Result;
use crate::extrude::{extrude_arbor, ArborMesh};
use crate::framing::{compute_360_bounding_box, Framing};
use crate::geom::BoundingBox;
use crate::mesh::Mesh;
use crate::morphology::{Arbor, ArborKind, Morphology};
use crate::primitives::{cube_sphere, sphere_resolution};
use crate::resample::{repair_duplicates, resample_morphology};
use crate::settings::{validate_config, Edges, FramingMode, Method, Settings, SomaConnection};
use crate::skeleton::{
    connected_sections, disconnected_sections, disconnected_segments, skeletonize, PolyLine,
};
use crate::soma::{build_soma, SomaStyle};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::fixtures::{bifurcating, straight_axon};
    use crate::settings::load_default_config;

    fn settings() -> Settings {
        load_default_config().unwrap()
    }

    #[test]
    fn connected_extrusion_is_one_piece() {
        let morph = straight_axon();
        let recon = Reconstruction::build(&morph, &settings()).unwrap();
        assert_eq!(recon.objects.len(), 1);
        let neuron = &recon.objects[0];
        assert_eq!(neuron.material_index, 0);
        assert_eq!(neuron.mesh.connected_components(), 1);
        assert!(neuron.mesh.is_watertight());
        assert_eq!(recon.stats.connected_arbors, 1);
    }

    #[test]
    fn input_is_left_untouched() {
        let morph = bifurcating();
        let before = morph.clone();
        let mut settings = settings();
        settings.resampling_method = crate::resample::Resampling::FixedStep;
        Reconstruction::build(&morph, &settings).unwrap();
        assert_eq!(morph, before);
    }

    #[test]
    fn disconnected_soma_keeps_objects_apart() {
        let morph = bifurcating();
        let mut settings = settings();
        settings.soma_connection = SomaConnection::Disconnected;
        let recon = Reconstruction::build(&morph, &settings).unwrap();
        // soma plus one object per arbor
        assert_eq!(recon.objects.len(), 3);
        assert_eq!(recon.objects[0].material_index, 0);
        let kinds: Vec<usize> = recon.objects[1..].iter().map(|o| o.material_index).collect();
        assert_eq!(kinds, vec![1, 3]);
    }

    #[test]
    fn every_method_builds() {
        for method in [
            Method::Extrusion,
            Method::ConnectedSections,
            Method::DisconnectedSections,
            Method::DisconnectedSegments,
            Method::ArticulatedSections,
            Method::Skeleton,
        ] {
            let mut settings = settings();
            settings.method = method;
            let recon = Reconstruction::build(&bifurcating(), &settings).unwrap();
            assert!(!recon.objects.is_empty(), "{:?}", method);
            for object in &recon.objects {
                assert!(recon.bounding_box.contains_box(&object.mesh.bounding_box().unwrap()));
            }
            if method == Method::Skeleton {
                assert_eq!(recon.objects.len(), 1);
                assert_eq!(recon.polylines.len(), 3);
            }
        }
    }

    #[test]
    fn hidden_soma_and_toggles() {
        let mut settings = settings();
        settings.soma_style = SomaStyle::Hidden;
        settings.arbors.draw_basal_dendrites = false;
        let recon = Reconstruction::build(&bifurcating(), &settings).unwrap();
        assert_eq!(recon.objects.len(), 1);
        assert_eq!(recon.objects[0].material_index, ArborKind::Axon.material_index());
    }

    #[test]
    fn smooth_edges_mark_meshes() {
        let mut settings = settings();
        settings.edges = Edges::Smooth;
        let recon = Reconstruction::build(&straight_axon(), &settings).unwrap();
        assert!(recon.objects.iter().all(|o| o.mesh.smooth));
    }

    #[test]
    fn turntable_framing_is_square() {
        let mut settings = settings();
        settings.framing.rotation_360 = true;
        let recon = Reconstruction::build(&straight_axon(), &settings).unwrap();
        let framed = recon.framing_box;
        assert!((framed.bounds.x - framed.bounds.z).abs() < 1e-4);
        assert_eq!(framed.p_min.y, recon.bounding_box.p_min.y);
        assert!(framed.contains_box(&recon.bounding_box));
    }
}

/// A named mesh handed to the renderer or exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshObject {
    pub name: String,
    pub mesh: Mesh,
    /// 0 for the soma (and arbors merged into it), otherwise the arbor's slot.
    pub material_index: usize,
}

impl MeshObject {
    pub fn new(name: String, mesh: Mesh, material_index: usize) -> Self {
        Self {
            name,
            mesh,
            material_index,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconstructionStats {
    pub arbors: usize,
    pub connected_arbors: usize,
    pub sections: usize,
    pub samples: usize,
    pub duplicates_removed: usize,
    pub standalone_faces: usize,
    pub objects: usize,
    pub vertices: usize,
    pub faces: usize,
    pub seconds: f64,
}

/// Everything produced from one morphology.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// The processed copy the geometry was built from.
    pub morphology: Morphology,
    pub objects: Vec<MeshObject>,
    pub polylines: Vec<PolyLine>,
    /// Union of every object (or poly-line) extent.
    pub bounding_box: BoundingBox,
    /// The box the camera frames, after any turntable expansion.
    pub framing_box: BoundingBox,
    pub framing: Framing,
    pub stats: ReconstructionStats,
}

impl Reconstruction {
    pub fn build(morphology: &Morphology, settings: &Settings) -> Result<Reconstruction> {
        let start = Instant::now();
        validate_config(settings)?;
        info!("reconstructing {} with {:?}", morphology.label, settings.method);

        let (morph, duplicates_removed) = prepare(morphology, settings);
        let mut stats = ReconstructionStats {
            duplicates_removed,
            ..Default::default()
        };

        let arbors = selected_arbors(&morph, settings);
        stats.arbors = arbors.len();
        stats.connected_arbors = arbors.iter().filter(|(a, _)| a.connected_to_soma).count();
        stats.sections = arbors
            .iter()
            .map(|(a, order)| morph.traverse(a.root, *order).len())
            .sum();
        stats.samples = morph.sections.iter().map(|s| s.samples.len()).sum();

        let external = settings.soma_mesh.as_deref().map(Path::new);
        let soma = build_soma(&morph, settings.soma_style, settings.tessellation_level, external)?;

        let progress = progress_bar(arbors.len());
        let (mut objects, polylines) = match settings.method {
            Method::Extrusion => {
                let built: Vec<ArborMesh> = arbors
                    .par_iter()
                    .map(|(arbor, order)| {
                        let built = extrude_arbor(&morph, arbor, *order);
                        progress.inc(1);
                        built
                    })
                    .collect();
                stats.standalone_faces = built.iter().map(|b| b.standalone_faces).sum();
                (assemble_extrusion(&morph, settings, soma, &arbors, built), Vec::new())
            }
            Method::Skeleton => {
                let lines: Vec<PolyLine> = arbors
                    .iter()
                    .flat_map(|(arbor, order)| {
                        progress.inc(1);
                        connected_sections(&morph, arbor, *order, true)
                    })
                    .collect();
                (soma_object(&morph, soma).into_iter().collect(), lines)
            }
            method => {
                let swept: Vec<MeshObject> = arbors
                    .par_iter()
                    .map(|(arbor, order)| {
                        let object = sweep_arbor(&morph, settings, method, arbor, *order);
                        progress.inc(1);
                        object
                    })
                    .collect();
                let mut objects: Vec<MeshObject> = soma_object(&morph, soma).into_iter().collect();
                objects.extend(swept);
                (objects, Vec::new())
            }
        };
        progress.finish_and_clear();

        let smooth = settings.edges == Edges::Smooth;
        for object in objects.iter_mut() {
            object.mesh.smooth = smooth;
        }

        let bounding_box = bounding_box(&morph, &objects, &polylines);
        let framing_box = if settings.framing.rotation_360 {
            compute_360_bounding_box(&bounding_box, &morph.soma.centroid)
        } else {
            bounding_box
        };
        let framing = match settings.framing.mode {
            FramingMode::FixedResolution => {
                Framing::fixed_resolution(&framing_box, settings.framing.view, settings.framing.resolution)?
            }
            FramingMode::ToScale => {
                Framing::to_scale(&framing_box, settings.framing.view, settings.framing.pixels_per_unit)?
            }
        };

        stats.objects = objects.len();
        stats.vertices = objects.iter().map(|o| o.mesh.num_vertices()).sum();
        stats.faces = objects.iter().map(|o| o.mesh.num_faces()).sum();
        stats.seconds = start.elapsed().as_secs_f64();
        info!(
            "built {} objects ({} vertices, {} faces) in {:.2?}",
            stats.objects,
            stats.vertices,
            stats.faces,
            start.elapsed()
        );

        Ok(Reconstruction {
            morphology: morph,
            objects,
            polylines,
            bounding_box,
            framing_box,
            framing,
            stats,
        })
    }
}

/// Deep copy followed by every destructive pass. Returns the processed copy
/// and the number of duplicate samples removed.
fn prepare(morphology: &Morphology, settings: &Settings) -> (Morphology, usize) {
    let mut morph = morphology.clone();
    let removed = repair_duplicates(&mut morph);
    resample_morphology(&mut morph, settings.resampling_method, settings.resampling_step);
    skeletonize(&mut morph, settings.skeletonization, settings.seed);

    match settings.soma_connection {
        SomaConnection::Connected => morph.verify_soma_connectivity(),
        SomaConnection::Disconnected => {
            for arbor in morph.arbors.iter_mut() {
                arbor.connected_to_soma = false;
            }
        }
    }

    label_morphology(&mut morph, settings.branching);
    (morph, removed)
}

/// Arbors enabled in the settings, with their branching order limit.
fn selected_arbors(morph: &Morphology, settings: &Settings) -> Vec<(Arbor, usize)> {
    let toggles = &settings.arbors;
    morph
        .arbors
        .iter()
        .filter_map(|arbor| {
            let (enabled, order) = match arbor.kind {
                ArborKind::Axon => (toggles.draw_axon, toggles.axon_branch_order),
                ArborKind::ApicalDendrite => (toggles.draw_apical_dendrites, toggles.apical_branch_order),
                ArborKind::BasalDendrite => (toggles.draw_basal_dendrites, toggles.basal_branch_order),
            };
            if !enabled {
                debug!("{} arbor disabled, skipping", arbor.kind.label());
            }
            enabled.then(|| (arbor.clone(), order))
        })
        .collect()
}

fn soma_object(morph: &Morphology, soma: Option<Mesh>) -> Option<MeshObject> {
    soma.map(|mesh| MeshObject::new(format!("{}_soma", morph.label), mesh, 0))
}

/// Bridges connected arbors into the soma and keeps the rest as their own objects.
fn assemble_extrusion(
    morph: &Morphology,
    settings: &Settings,
    soma: Option<Mesh>,
    arbors: &[(Arbor, usize)],
    built: Vec<ArborMesh>,
) -> Vec<MeshObject> {
    let mut objects = Vec::new();
    let mut standalone = Vec::new();
    let mut soma = soma.map(SomaBridge::new);
    let connect = settings.soma_connection == SomaConnection::Connected;

    for ((arbor, _), arbor_mesh) in arbors.iter().zip(built) {
        let bridged = match soma.as_mut() {
            Some(bridge) if connect => bridge.connect(&arbor_mesh, arbor, morph),
            _ => false,
        };
        if !bridged {
            standalone.push(arbor_object(morph, arbor, arbor_mesh.mesh));
        }
    }

    if let Some(mesh) = soma.map(SomaBridge::into_mesh) {
        let name = if settings.soma_connection == SomaConnection::Connected {
            morph.label.clone()
        } else {
            format!("{}_soma", morph.label)
        };
        objects.push(MeshObject::new(name, mesh, 0));
    }
    objects.extend(standalone);
    objects
}

fn arbor_object(morph: &Morphology, arbor: &Arbor, mesh: Mesh) -> MeshObject {
    MeshObject::new(
        format!("{}_{}_{}", morph.label, arbor.kind.label(), arbor.root.0),
        mesh,
        arbor.kind.material_index(),
    )
}

/// Builds one arbor out of swept tubes.
fn sweep_arbor(morph: &Morphology, settings: &Settings, method: Method, arbor: &Arbor, order: usize) -> MeshObject {
    let to_soma = settings.soma_connection == SomaConnection::Connected;
    let lines = match method {
        Method::ConnectedSections => connected_sections(morph, arbor, order, to_soma),
        Method::DisconnectedSegments => disconnected_segments(morph, arbor, order),
        _ => disconnected_sections(morph, arbor, order),
    };

    let mut mesh = Mesh::new();
    for line in &lines {
        mesh.join(&sweep(line, settings.bevel_object_sides, settings.caps));
    }

    if method == Method::ArticulatedSections {
        let resolution = sphere_resolution(settings.tessellation_level);
        for id in morph.traverse(arbor.root, order) {
            let section = morph.section(id);
            if section.is_leaf() {
                continue;
            }
            if let Some(last) = section.samples.last() {
                mesh.join(&cube_sphere(last.point, last.radius, resolution));
            }
        }
    }

    arbor_object(morph, arbor, mesh)
}

/// Union of the produced geometry, falling back to the samples themselves.
fn bounding_box(morph: &Morphology, objects: &[MeshObject], polylines: &[PolyLine]) -> BoundingBox {
    let boxes: Vec<BoundingBox> = objects
        .iter()
        .filter_map(|o| o.mesh.bounding_box())
        .chain(polylines.iter().filter_map(|line| {
            BoundingBox::from_points(line.samples.iter().map(|(p, _)| p))
        }))
        .collect();
    BoundingBox::union_all(&boxes).unwrap_or_else(|| morph.samples_bounding_box())
}

fn progress_bar(n: usize) -> ProgressBar {
    let pb = ProgressBar::new(n as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("arbor".to_string());
    pb
}
