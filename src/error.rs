//! Error types for the detection pipeline
//!
//! Asset and engine failures are fatal to initialization. Per-frame failures
//! (bad rotation, raster conversion, malformed engine output) drop the frame.
//! Out-of-range values inside a well-formed engine output are clamped by the
//! decoder and never surface here.

use std::path::PathBuf;
use thiserror::Error;

use crate::vision::engine::OutputRole;

/// Errors produced by the detection pipeline
#[derive(Debug, Error)]
pub enum DetectorError {
    /// A model or label file could not be read
    #[error("failed to read asset {path:?}: {source}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The label file contained no class names
    #[error("label file {0:?} contains no labels")]
    EmptyLabels(PathBuf),

    /// The model file does not match its pinned checksum
    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The model graph does not expose the expected inputs/outputs
    #[error("invalid model: {0}")]
    ModelInvalid(String),

    /// ONNX Runtime failure
    #[error("ONNX Runtime error: {0}")]
    Onnx(#[from] ort::Error),

    /// Frame rotation is not a multiple of 90 degrees
    #[error("unsupported rotation {0} (must be a multiple of 90 degrees)")]
    InvalidRotation(i32),

    /// The planar source could not be converted into a raster
    #[error("raster conversion failed: {0}")]
    RasterConversion(String),

    /// The engine produced a tensor of the wrong size for its role
    #[error("output {role:?} has {actual} elements, expected {expected}")]
    OutputShape {
        role: OutputRole,
        expected: usize,
        actual: usize,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl DetectorError {
    /// Build an asset load error for `path`
    pub fn asset(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DetectorError::AssetLoad {
            path: path.into(),
            source,
        }
    }

    /// Whether this error prevents the pipeline from starting at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DetectorError::AssetLoad { .. }
                | DetectorError::EmptyLabels(_)
                | DetectorError::ChecksumMismatch { .. }
                | DetectorError::ModelInvalid(_)
                | DetectorError::Onnx(_)
                | DetectorError::Config(_)
        )
    }
}
