//! Reconstruction of neuron morphologies into polygon meshes.
//!
//! A [`morphology::Morphology`] (soma plus axon and dendrite arbors) is turned
//! into mesh objects or poly-lines by [`reconstruct::Reconstruction::build`],
//! together with the bounding box and camera framing an external renderer
//! needs.

pub mod bevel;
pub mod branching;
pub mod config;
pub mod connect;
pub mod error;
pub mod export;
pub mod extrude;
pub mod framing;
pub mod geom;
pub mod mesh;
pub mod metaball;
pub mod morphology;
pub mod primitives;
pub mod reconstruct;
pub mod resample;
pub mod settings;
pub mod skeleton;
pub mod soma;
pub mod swc;

#[cfg(test)]
mod fixtures;
