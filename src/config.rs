/// Minimum distance for vertices to be considered the same when welding meshes.
pub const VERTEX_MERGE_DISTANCE: f32 = 0.001;
/// Consecutive samples closer than this (in microns) are treated as duplicates.
pub const DUPLICATE_SAMPLE_DISTANCE: f32 = 0.001;
/// Minimum vector length (in microns) to be considered non-degenerate.
pub const VEC_LENGTH_THRESHOLD: f32 = 1e-6;
/// An arbor whose first sample lies further than this many largest soma radii
/// from the soma centroid is treated as disconnected from the soma.
pub const SOMA_CONNECTION_FACTOR: f32 = 4.0;
/// Profile distances below this fraction of the mean distance are discarded as outliers.
pub const SOMA_PROFILE_OUTLIER_FRACTION: f32 = 0.1;
/// Radius ratio applied to secondary children when labeling by radii.
pub const RADII_SECONDARY_RATIO: f32 = 0.5;
/// Radius ratio applied to secondary children when labeling by angles.
pub const ANGLES_SECONDARY_RATIO: f32 = 0.5;
/// Padding applied around the geometry when framing a camera, as a fraction of the bounds.
pub const FRAMING_MARGIN: f32 = 0.1;
/// Number of leading root samples that contribute to a meta-ball soma.
pub const METABALL_ROOT_SAMPLES: usize = 3;
/// Field threshold of the meta-ball surface.
pub const METABALL_THRESHOLD: f32 = 1.0;
