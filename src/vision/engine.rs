//! Inference engine contract
//!
//! One NHWC input tensor in, four fixed-capacity output buffers filled in
//! place. Which model output feeds which buffer is positional and fixed by
//! the model's export graph, so it is spelled out as an `OutputLayout`.

use ndarray::{Array1, Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;

/// Semantic role of one model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRole {
    /// `[1, N, 4]` normalized boxes as (top, left, bottom, right)
    Boxes,
    /// `[1, N]` class indices stored as floats
    Classes,
    /// `[1, N]` confidence scores, descending
    Scores,
    /// `[1]` number of valid entries stored as a float
    Count,
}

/// Positional order of the model's four outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<OutputRole>", into = "Vec<OutputRole>")]
pub struct OutputLayout([OutputRole; 4]);

impl OutputLayout {
    /// SSD MobileNet v1 TFLite export: boxes, classes, scores, count
    pub const SSD_MOBILENET_V1: Self = Self([
        OutputRole::Boxes,
        OutputRole::Classes,
        OutputRole::Scores,
        OutputRole::Count,
    ]);

    /// Newer TensorFlow 2 detection exports: scores, boxes, count, classes
    pub const TF2_DETECTION: Self = Self([
        OutputRole::Scores,
        OutputRole::Boxes,
        OutputRole::Count,
        OutputRole::Classes,
    ]);

    /// Build a layout; every role must appear exactly once
    pub fn new(roles: [OutputRole; 4]) -> Result<Self, DetectorError> {
        for (i, role) in roles.iter().enumerate() {
            if roles[..i].contains(role) {
                return Err(DetectorError::Config(format!(
                    "output layout lists {:?} more than once",
                    role
                )));
            }
        }
        Ok(Self(roles))
    }

    /// Roles in model output order
    pub fn roles(&self) -> &[OutputRole; 4] {
        &self.0
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::SSD_MOBILENET_V1
    }
}

impl TryFrom<Vec<OutputRole>> for OutputLayout {
    type Error = DetectorError;

    fn try_from(roles: Vec<OutputRole>) -> Result<Self, Self::Error> {
        let roles: [OutputRole; 4] = roles.try_into().map_err(|v: Vec<OutputRole>| {
            DetectorError::Config(format!("output layout needs 4 roles, got {}", v.len()))
        })?;
        Self::new(roles)
    }
}

impl From<OutputLayout> for Vec<OutputRole> {
    fn from(layout: OutputLayout) -> Self {
        layout.0.to_vec()
    }
}

/// Preprocessed model input, NHWC with batch size 1
#[derive(Debug, Clone, PartialEq)]
pub enum InputTensor {
    /// Quantized model input (raw bytes)
    U8(Array4<u8>),
    /// Float model input (normalized values)
    F32(Array4<f32>),
}

impl InputTensor {
    /// Tensor shape as [batch, height, width, channels]
    pub fn shape(&self) -> [usize; 4] {
        let (n, h, w, c) = match self {
            InputTensor::U8(a) => a.dim(),
            InputTensor::F32(a) => a.dim(),
        };
        [n, h, w, c]
    }
}

/// Fixed-capacity output buffers, filled in place on every inference
///
/// Contents are whatever the last call wrote; only the first `count` entries
/// of the last call are meaningful.
#[derive(Debug, Clone)]
pub struct OutputBuffers {
    pub boxes: Array3<f32>,
    pub classes: Array2<f32>,
    pub scores: Array2<f32>,
    pub count: Array1<f32>,
}

impl OutputBuffers {
    /// Allocate buffers for `capacity` detections
    pub fn new(capacity: usize) -> Self {
        Self {
            boxes: Array3::zeros((1, capacity, 4)),
            classes: Array2::zeros((1, capacity)),
            scores: Array2::zeros((1, capacity)),
            count: Array1::zeros(1),
        }
    }

    /// Maximum number of detections the buffers hold
    pub fn capacity(&self) -> usize {
        self.scores.ncols()
    }

    /// Number of floats the buffer for `role` holds
    pub fn expected_len(&self, role: OutputRole) -> usize {
        match role {
            OutputRole::Boxes => self.boxes.len(),
            OutputRole::Classes => self.classes.len(),
            OutputRole::Scores => self.scores.len(),
            OutputRole::Count => self.count.len(),
        }
    }

    /// Overwrite the buffer for `role` with `values` (row-major)
    pub fn fill(&mut self, role: OutputRole, values: &[f32]) -> Result<(), DetectorError> {
        let expected = self.expected_len(role);
        if values.len() != expected {
            return Err(DetectorError::OutputShape {
                role,
                expected,
                actual: values.len(),
            });
        }

        let targets: Box<dyn Iterator<Item = &mut f32>> = match role {
            OutputRole::Boxes => Box::new(self.boxes.iter_mut()),
            OutputRole::Classes => Box::new(self.classes.iter_mut()),
            OutputRole::Scores => Box::new(self.scores.iter_mut()),
            OutputRole::Count => Box::new(self.count.iter_mut()),
        };
        for (dst, src) in targets.zip(values) {
            *dst = *src;
        }
        Ok(())
    }
}

/// Executes the detection model
pub trait InferenceEngine: Send {
    /// Run the model synchronously on `input`, writing all four `outputs`
    fn run(&mut self, input: &InputTensor, outputs: &mut OutputBuffers) -> Result<(), DetectorError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn run(&mut self, input: &InputTensor, outputs: &mut OutputBuffers) -> Result<(), DetectorError> {
        (**self).run(input, outputs)
    }
}
