//! Soma meshes.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mesh::Mesh;
use crate::metaball::{meta_soma, metaball_resolution};
use crate::morphology::Morphology;
use crate::primitives::{cube_sphere, sphere_resolution};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::fixtures::straight_axon;
    use std::io::Write;

    #[test]
    fn sphere_soma_sits_on_centroid() {
        let morph = straight_axon();
        let soma = build_soma(&morph, SomaStyle::Sphere, 0.5, None).unwrap().unwrap();
        let bbox = soma.bounding_box().unwrap();
        assert!((bbox.center - morph.soma.centroid).norm() < 1e-4);
        assert!((bbox.bounds.x - 2.0 * morph.soma.mean_radius).abs() < 1e-4);
        assert!(soma.is_watertight());
    }

    #[test]
    fn hidden_soma_has_no_mesh() {
        let morph = straight_axon();
        assert!(build_soma(&morph, SomaStyle::Hidden, 0.5, None).unwrap().is_none());
    }

    #[test]
    fn external_soma_is_loaded() {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 1").unwrap();
        writeln!(file, "f 1 3 2\nf 1 2 4\nf 1 4 3\nf 2 3 4").unwrap();
        file.flush().unwrap();

        let morph = straight_axon();
        let soma = build_soma(&morph, SomaStyle::Sphere, 0.5, Some(file.path()))
            .unwrap()
            .unwrap();
        assert_eq!(soma.num_vertices(), 4);
        assert_eq!(soma.num_faces(), 4);
        assert!(soma.signed_volume() > 0.0);
    }

    #[test]
    fn missing_external_soma_is_an_error() {
        let morph = straight_axon();
        let result = build_soma(&morph, SomaStyle::Sphere, 0.5, Some(Path::new("/nonexistent/soma.obj")));
        assert!(result.is_err());
    }
}

/// How the soma is represented in the reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SomaStyle {
    Sphere,
    MetaBall,
    Hidden,
}

/// Builds the soma mesh for a style, or `None` when the soma is hidden. An
/// external OBJ replaces the generated sphere.
pub fn build_soma(
    morph: &Morphology,
    style: SomaStyle,
    tessellation_level: f32,
    external: Option<&Path>,
) -> Result<Option<Mesh>> {
    let mesh = match style {
        SomaStyle::Hidden => {
            debug!("soma hidden, no soma mesh built");
            return Ok(None);
        }
        SomaStyle::Sphere => match external {
            Some(path) => {
                info!("loading soma mesh from {}", path.display());
                let mut mesh = Mesh::from_obj(path)?;
                mesh.recalculate_normals();
                mesh
            }
            None => cube_sphere(
                morph.soma.centroid,
                morph.soma.mean_radius,
                sphere_resolution(tessellation_level),
            ),
        },
        SomaStyle::MetaBall => meta_soma(morph, metaball_resolution(tessellation_level)),
    };
    Ok(Some(mesh))
}
