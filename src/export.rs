use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::framing::Framing;
use crate::geom::BoundingBox;
use crate::reconstruct::{MeshObject, Reconstruction, ReconstructionStats};
use crate::settings::Settings;
use crate::skeleton::PolyLine;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::primitives::cube_sphere;
    use nalgebra::Point3;

    fn triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        mesh.add_face(vec![0, 1, 2]);
        mesh
    }

    #[test]
    fn obj_text_offsets_indices() {
        let objects = vec![
            MeshObject::new("a".to_string(), triangle(), 0),
            MeshObject::new("b".to_string(), triangle(), 2),
        ];
        let mut buffer = Vec::new();
        write_obj_to(&mut buffer, &objects).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("o a\n"));
        assert!(text.contains("usemtl material_2\n"));
        assert!(text.contains("f 1 2 3\n"));
        assert!(text.contains("f 4 5 6\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 6);
        assert!(!text.contains("vn "));
    }

    #[test]
    fn smooth_objects_carry_normals() {
        let mut mesh = triangle();
        mesh.smooth = true;
        let mut buffer = Vec::new();
        write_obj_to(&mut buffer, &[MeshObject::new("s".to_string(), mesh, 1)]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().filter(|l| l.starts_with("vn ")).count(), 3);
        assert!(text.contains("f 1//1 2//2 3//3\n"));
    }

    #[test]
    fn obj_round_trips_through_tobj() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sphere.obj");
        let sphere = cube_sphere(Point3::new(1.0, 2.0, 3.0), 2.0, 4);
        write_obj(&path, &[MeshObject::new("sphere".to_string(), sphere.clone(), 0)]).unwrap();

        let loaded = Mesh::from_obj(&path).unwrap();
        assert_eq!(loaded.num_vertices(), sphere.num_vertices());
        assert_eq!(loaded.num_faces(), sphere.num_faces());
        assert!(loaded.is_watertight());
        assert!((loaded.signed_volume() - sphere.signed_volume()).abs() < 1e-3);
    }
}

/// Writes every object into one Wavefront OBJ file, one `o` group each.
pub fn write_obj(path: &Path, objects: &[MeshObject]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_obj_to(&mut writer, objects)?;
    writer.flush()?;
    Ok(())
}

pub fn write_obj_to<W: Write>(writer: &mut W, objects: &[MeshObject]) -> Result<()> {
    writeln!(writer, "# neuromesh {}", env!("CARGO_PKG_VERSION"))?;
    let mut vertex_offset = 1;
    let mut normal_offset = 1;

    for object in objects {
        let mesh = &object.mesh;
        writeln!(writer, "o {}", object.name)?;
        writeln!(writer, "usemtl material_{}", object.material_index)?;
        for v in &mesh.vertices {
            writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
        }

        if mesh.smooth {
            for n in mesh.vertex_normals() {
                writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
            }
            writeln!(writer, "s 1")?;
            for face in &mesh.faces {
                let indices = face
                    .iter()
                    .map(|&v| format!("{}//{}", v + vertex_offset, v + normal_offset))
                    .join(" ");
                writeln!(writer, "f {}", indices)?;
            }
            normal_offset += mesh.num_vertices();
        } else {
            writeln!(writer, "s off")?;
            for face in &mesh.faces {
                writeln!(writer, "f {}", face.iter().map(|&v| v + vertex_offset).join(" "))?;
            }
        }
        vertex_offset += mesh.num_vertices();
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ObjectSummary<'a> {
    name: &'a str,
    material_index: usize,
    vertices: usize,
    faces: usize,
    watertight: bool,
    components: usize,
    surface_area: f32,
    bounding_box: Option<BoundingBox>,
}

/// Everything a renderer needs besides the meshes themselves.
#[derive(Debug, Serialize)]
struct Summary<'a> {
    label: &'a str,
    generated: String,
    settings: &'a Settings,
    bounding_box: BoundingBox,
    framing_box: BoundingBox,
    framing: Framing,
    stats: &'a ReconstructionStats,
    objects: Vec<ObjectSummary<'a>>,
    polylines: &'a [PolyLine],
}

/// Writes a JSON summary of a reconstruction.
pub fn write_summary(path: &Path, recon: &Reconstruction, settings: &Settings) -> Result<()> {
    let summary = Summary {
        label: &recon.morphology.label,
        generated: Utc::now().to_rfc3339(),
        settings,
        bounding_box: recon.bounding_box,
        framing_box: recon.framing_box,
        framing: recon.framing,
        stats: &recon.stats,
        objects: recon
            .objects
            .iter()
            .map(|o| ObjectSummary {
                name: &o.name,
                material_index: o.material_index,
                vertices: o.mesh.num_vertices(),
                faces: o.mesh.num_faces(),
                watertight: o.mesh.is_watertight(),
                components: o.mesh.connected_components(),
                surface_area: o.mesh.surface_area(),
                bounding_box: o.mesh.bounding_box(),
            })
            .collect(),
        polylines: &recon.polylines,
    };

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
    Ok(())
}

/// Writes the effective settings as TOML, loadable as `config/local.toml`.
pub fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let text = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Writes the meshes, the summary and the settings into `dir`. Returns the
/// paths written.
pub fn export_all(dir: &Path, recon: &Reconstruction, settings: &Settings) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let label = &recon.morphology.label;
    let mut written = Vec::new();

    if !recon.objects.is_empty() {
        let path = dir.join(format!("{}.obj", label));
        write_obj(&path, &recon.objects)?;
        written.push(path);
    }

    let path = dir.join(format!("{}.json", label));
    write_summary(&path, recon, settings)?;
    written.push(path);

    let path = dir.join("settings.toml");
    write_settings(&path, settings)?;
    written.push(path);

    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(written)
}
