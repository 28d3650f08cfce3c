//! Model and label assets, and the ONNX Runtime engine
//!
//! Handles reading (and optionally checksumming) the detection model,
//! loading the label table, and running the model through ONNX Runtime.

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use ort::value::Tensor;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::DetectorError;
use crate::vision::engine::{InferenceEngine, InputTensor, OutputBuffers, OutputLayout};

/// Default model file name
pub const DEFAULT_MODEL_FILE: &str = "ssd_mobilenet_v1.onnx";

/// Default label file name
pub const DEFAULT_LABELS_FILE: &str = "coco_labels.txt";

/// Ordered class names, indexed by the model's class id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Build a table; `None` if `labels` is empty
    pub fn new(labels: Vec<String>) -> Option<Self> {
        if labels.is_empty() {
            None
        } else {
            Some(Self { labels })
        }
    }

    /// Parse one label per line (line number = class id)
    pub fn parse(text: &str) -> Option<Self> {
        Self::new(text.lines().map(str::to_string).collect())
    }

    /// Load a label file
    pub fn from_file(path: &Path) -> Result<Self, DetectorError> {
        let text = std::fs::read_to_string(path).map_err(|e| DetectorError::asset(path, e))?;
        let table = Self::parse(&text).ok_or_else(|| DetectorError::EmptyLabels(path.to_path_buf()))?;
        info!("Loaded {} labels from {:?}", table.len(), path);
        Ok(table)
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false; an empty table cannot be built
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label for class `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Label for a raw float class index, truncated and clamped into range
    pub fn get_clamped(&self, raw: f32) -> &str {
        // `as` saturates: NaN and negatives become 0
        let index = (raw.trunc() as usize).min(self.labels.len() - 1);
        &self.labels[index]
    }
}

/// Locations of the model and label assets
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    /// Expected SHA-256 of the model file (lowercase hex), if pinned
    pub sha256: Option<String>,
}

impl ModelAssets {
    /// Create asset locations without a checksum pin
    pub fn new(model_path: impl Into<PathBuf>, labels_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            labels_path: labels_path.into(),
            sha256: None,
        }
    }

    /// Asset locations from the `[model]` config section
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model_path: config.path.clone(),
            labels_path: config.labels_path.clone(),
            sha256: config.sha256.clone(),
        }
    }

    /// Asset locations under a models directory, with default file names
    pub fn in_dir(models_dir: &Path) -> Self {
        Self::new(models_dir.join(DEFAULT_MODEL_FILE), models_dir.join(DEFAULT_LABELS_FILE))
    }

    /// Read the model file, verifying the checksum if one is pinned
    pub fn read_model(&self) -> Result<Vec<u8>, DetectorError> {
        info!("Loading model file {:?}", self.model_path);
        let data = std::fs::read(&self.model_path).map_err(|e| DetectorError::asset(&self.model_path, e))?;
        debug!(
            "Model file size: {:.2} MB",
            data.len() as f64 / (1024.0 * 1024.0)
        );

        if let Some(expected) = &self.sha256 {
            let actual = sha256_hex(&data);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(DetectorError::ChecksumMismatch {
                    path: self.model_path.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
            info!("Checksum verified for {:?}", self.model_path);
        }

        Ok(data)
    }

    /// Load the label table
    pub fn load_labels(&self) -> Result<LabelTable, DetectorError> {
        LabelTable::from_file(&self.labels_path)
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// ONNX Runtime session running the detection model
pub struct OnnxSession {
    session: Session,
    output_names: Vec<String>,
    layout: OutputLayout,
}

impl OnnxSession {
    /// Create a session from a model file
    pub fn new(model_path: &Path, layout: OutputLayout, intra_threads: usize) -> Result<Self, DetectorError> {
        info!("Loading ONNX model from {:?}", model_path);
        let session = Self::builder(intra_threads)?
            .commit_from_file(model_path)
            .map_err(|e| DetectorError::ModelInvalid(format!("failed to load {:?}: {}", model_path, e)))?;
        Self::from_session(session, layout)
    }

    /// Create a session from model bytes already in memory
    pub fn from_memory(model: &[u8], layout: OutputLayout, intra_threads: usize) -> Result<Self, DetectorError> {
        let session = Self::builder(intra_threads)?
            .commit_from_memory(model)
            .map_err(|e| DetectorError::ModelInvalid(format!("failed to load model: {}", e)))?;
        Self::from_session(session, layout)
    }

    fn builder(intra_threads: usize) -> Result<SessionBuilder, DetectorError> {
        Session::builder()
            .map_err(setup_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(setup_error)?
            .with_intra_threads(intra_threads)
            .map_err(setup_error)
    }

    fn from_session(session: Session, layout: OutputLayout) -> Result<Self, DetectorError> {
        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        if session.inputs.len() != 1 {
            return Err(DetectorError::ModelInvalid(format!(
                "expected 1 input, model has {}",
                session.inputs.len()
            )));
        }
        if output_names.len() != 4 {
            return Err(DetectorError::ModelInvalid(format!(
                "expected 4 outputs, model has {}",
                output_names.len()
            )));
        }

        let this = Self {
            session,
            output_names,
            layout,
        };

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}, layout: {:?}",
            this.input_info(),
            this.output_names,
            this.layout.roles()
        );

        Ok(this)
    }

    /// Get input tensor info
    pub fn input_info(&self) -> Vec<TensorInfo> {
        self.session
            .inputs
            .iter()
            .map(|input| TensorInfo {
                name: input.name.clone(),
                shape: extract_shape(&input.input_type),
            })
            .collect()
    }
}

impl InferenceEngine for OnnxSession {
    fn run(&mut self, input: &InputTensor, outputs: &mut OutputBuffers) -> Result<(), DetectorError> {
        let shape = input.shape();
        let results = match input {
            InputTensor::U8(array) => {
                let data: Vec<u8> = array.iter().copied().collect();
                let tensor = Tensor::from_array((shape, data.into_boxed_slice()))?;
                self.session.run(ort::inputs![tensor])?
            }
            InputTensor::F32(array) => {
                let data: Vec<f32> = array.iter().copied().collect();
                let tensor = Tensor::from_array((shape, data.into_boxed_slice()))?;
                self.session.run(ort::inputs![tensor])?
            }
        };

        for (name, role) in self.output_names.iter().zip(self.layout.roles()) {
            let (_shape, data) = results[name.as_str()].try_extract_tensor::<f32>()?;
            outputs.fill(*role, data)?;
        }

        Ok(())
    }
}

fn setup_error(e: impl std::fmt::Display) -> DetectorError {
    DetectorError::ModelInvalid(format!("session setup failed: {}", e))
}

/// Tensor shape information
#[derive(Debug, Clone)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<i64>,
}

/// Extract shape from ONNX value type
fn extract_shape(value_type: &ort::value::ValueType) -> Vec<i64> {
    if let Some(shape) = value_type.tensor_shape() {
        shape.iter().copied().collect()
    } else {
        vec![]
    }
}
