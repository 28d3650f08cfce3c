//! Vision Layer
//!
//! Runs object detection on camera frames:
//! - Raster conversion of planar frames into RGBA
//! - Preprocessing (resize, rotate upright, normalize)
//! - Inference through ONNX Runtime
//! - Decoding into labeled, screen-space boxes

pub mod decode;
pub mod detector;
pub mod engine;
pub mod models;
pub mod preprocess;
pub mod raster;

pub use decode::{DetectionDecoder, FilterPolicy, DEFAULT_MAX_RESULTS};
pub use detector::ObjectDetector;
pub use engine::{InferenceEngine, InputTensor, OutputBuffers, OutputLayout, OutputRole};
pub use models::{LabelTable, ModelAssets, OnnxSession};
pub use preprocess::{ImageProcessor, InputSize, Normalization, ProcessorCache};
pub use raster::{RasterBuffer, RasterConverter, Yuv420Converter};

/// Size of the destination view detections are mapped into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned box in destination view pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// One detected object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Confidence score (0.0 - 1.0)
    pub score: f32,
    /// Class label from the label table
    pub label: String,
    /// Location in destination view pixels
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(score: f32, label: String, bounding_box: BoundingBox) -> Self {
        Self {
            score,
            label,
            bounding_box,
        }
    }

    /// Box width in view pixels
    pub fn width(&self) -> f32 {
        self.bounding_box.right - self.bounding_box.left
    }

    /// Box height in view pixels
    pub fn height(&self) -> f32 {
        self.bounding_box.bottom - self.bounding_box.top
    }

    /// Display text, e.g. `person 93.21%`
    pub fn caption(&self) -> String {
        format!("{} {:.2}%", self.label, self.score * 100.0)
    }
}
