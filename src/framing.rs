//! Camera framing derived from bounding boxes.
//!
//! The renderer is external; this module only decides what it needs to know:
//! an orthographic scale, an image resolution and where the camera sits.

use log::debug;
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::FRAMING_MARGIN;
use crate::error::{MorphError, Result};
use crate::geom::BoundingBox;


/// Viewing direction of the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    /// Looking down -z.
    Front,
    /// Looking down -x.
    Side,
    /// Looking down -y.
    Top,
}

impl View {
    /// Unit vector from the subject towards the camera.
    pub fn axis(&self) -> Vector3<f32> {
        match self {
            View::Front => Vector3::z(),
            View::Side => Vector3::x(),
            View::Top => Vector3::y(),
        }
    }

    /// Image-plane (width, height) and depth extents of a box.
    fn extents(&self, bbox: &BoundingBox) -> (f32, f32, f32) {
        let b = bbox.bounds;
        match self {
            View::Front => (b.x, b.y, b.z),
            View::Side => (b.z, b.y, b.x),
            View::Top => (b.x, b.z, b.y),
        }
    }
}

/// What a renderer needs to frame a reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Framing {
    pub view: View,
    /// Width of the orthographic view volume along its larger image axis.
    pub ortho_scale: f32,
    /// Image size in pixels as (width, height).
    pub resolution: (u32, u32),
    pub camera_position: Point3<f32>,
    pub look_at: Point3<f32>,
    /// Distance from the camera to the far side of the box.
    pub clip_end: f32,
}

impl Framing {
    /// Frames `bbox` so its larger image-plane extent spans `pixels`.
    pub fn fixed_resolution(bbox: &BoundingBox, view: View, pixels: u32) -> Result<Framing> {
        if pixels == 0 {
            return Err(MorphError::InvalidSettings(
                "image resolution must be at least one pixel".to_string(),
            ));
        }
        let plane = padded_plane(bbox, view);
        let longest = plane.x.max(plane.y).max(f32::EPSILON);
        let scale = pixels as f32 / longest;
        Ok(Self::build(bbox, view, plane, scale))
    }

    /// Frames `bbox` at a fixed number of pixels per unit length.
    pub fn to_scale(bbox: &BoundingBox, view: View, pixels_per_unit: f32) -> Result<Framing> {
        if pixels_per_unit <= 0.0 {
            return Err(MorphError::InvalidSettings(format!(
                "pixels per unit must be positive, got {}",
                pixels_per_unit
            )));
        }
        Ok(Self::build(bbox, view, padded_plane(bbox, view), pixels_per_unit))
    }

    fn build(bbox: &BoundingBox, view: View, plane: Point2<f32>, scale: f32) -> Framing {
        let (_, _, depth) = view.extents(bbox);
        let distance = depth / 2.0 + bbox.largest_dimension();
        let resolution = (
            ((plane.x * scale).round() as u32).max(1),
            ((plane.y * scale).round() as u32).max(1),
        );
        let framing = Framing {
            view,
            ortho_scale: plane.x.max(plane.y),
            resolution,
            camera_position: bbox.center + view.axis() * distance,
            look_at: bbox.center,
            clip_end: distance + depth / 2.0,
        };
        debug!("framing {:?}: {:?}", view, framing.resolution);
        framing
    }
}

/// Image-plane extents grown by the framing margin on both sides.
fn padded_plane(bbox: &BoundingBox, view: View) -> Point2<f32> {
    let (w, h, _) = view.extents(bbox);
    let pad = 1.0 + 2.0 * FRAMING_MARGIN;
    Point2::new(w * pad, h * pad)
}

/// Box swept by rotating `bbox` around the vertical axis through the soma.
/// The XZ extents become a square of the farthest XZ corner distance; Y is
/// left unchanged.
pub fn compute_360_bounding_box(bbox: &BoundingBox, soma_center: &Point3<f32>) -> BoundingBox {
    let corners = [
        (bbox.p_min.x, bbox.p_min.z),
        (bbox.p_min.x, bbox.p_max.z),
        (bbox.p_max.x, bbox.p_min.z),
        (bbox.p_max.x, bbox.p_max.z),
    ];
    let radius = corners
        .iter()
        .map(|(x, z)| ((x - soma_center.x).powi(2) + (z - soma_center.z).powi(2)).sqrt())
        .fold(0.0, f32::max);

    BoundingBox::new(
        Point3::new(soma_center.x - radius, bbox.p_min.y, soma_center.z - radius),
        Point3::new(soma_center.x + radius, bbox.p_max.y, soma_center.z + radius),
    )
}
