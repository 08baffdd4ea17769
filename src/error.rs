//! Error types for morphology loading and reconstruction.

use thiserror::Error;

/// Errors raised while loading a morphology or preparing a reconstruction.
///
/// Degenerate geometry is never reported here: zero-length segments and
/// duplicate samples propagate into the mesh unchecked.
#[derive(Debug, Error)]
pub enum MorphError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("morphology has no soma samples")]
    MissingSoma,

    #[error("sample {sample} references unknown parent {parent}")]
    UnknownParent { sample: usize, parent: usize },

    #[error("morphology has no samples")]
    EmptyMorphology,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("failed to load OBJ: {0}")]
    Obj(String),
}

pub type Result<T> = std::result::Result<T, MorphError>;
