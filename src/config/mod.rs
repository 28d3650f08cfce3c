//! Application Configuration
//!
//! Model, detection and view settings stored in TOML format. Every field has
//! a default, so a partial file (or none at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DetectorError;
use crate::vision::decode::{FilterPolicy, DEFAULT_MAX_RESULTS};
use crate::vision::engine::OutputLayout;
use crate::vision::models::{DEFAULT_LABELS_FILE, DEFAULT_MODEL_FILE};
use crate::vision::preprocess::{InputSize, Normalization};
use crate::vision::ViewSize;

/// Default score threshold
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model and label assets
    pub model: ModelConfig,
    /// Result filtering
    pub detection: DetectionConfig,
    /// Destination view
    pub view: ViewConfig,
}

impl AppConfig {
    /// Check values that serde alone cannot
    pub fn validate(&self) -> Result<(), DetectorError> {
        let t = self.detection.score_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(DetectorError::Config(format!(
                "detection.score_threshold must be within [0, 1], got {}",
                t
            )));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(DetectorError::Config(
                "model input dimensions must be non-zero".to_string(),
            ));
        }
        if self.model.capacity == 0 {
            return Err(DetectorError::Config(
                "model.capacity must be non-zero".to_string(),
            ));
        }
        if self.model.intra_threads == 0 {
            return Err(DetectorError::Config(
                "model.intra_threads must be non-zero".to_string(),
            ));
        }
        let (w, h) = (self.view.width, self.view.height);
        if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
            return Err(DetectorError::Config(format!(
                "view size must be positive, got {}x{}",
                w, h
            )));
        }
        Ok(())
    }
}

/// Model-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX model file
    pub path: PathBuf,
    /// Label file, one class name per line
    pub labels_path: PathBuf,
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Quantized (uint8) model input; float models are normalized to [-1, 1]
    pub quantized: bool,
    /// Positional order of the model outputs
    pub output_layout: OutputLayout,
    /// Maximum detections per inference (size of the output buffers)
    pub capacity: usize,
    /// Expected SHA-256 of the model file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models").join(DEFAULT_MODEL_FILE),
            labels_path: PathBuf::from("models").join(DEFAULT_LABELS_FILE),
            input_width: 300,
            input_height: 300,
            quantized: true,
            output_layout: OutputLayout::default(),
            capacity: 10,
            sha256: None,
            intra_threads: 4,
        }
    }
}

impl ModelConfig {
    /// Model input dimensions
    pub fn input_size(&self) -> InputSize {
        InputSize::new(self.input_width, self.input_height)
    }

    /// Input normalization matching the model type
    pub fn normalization(&self) -> Normalization {
        if self.quantized {
            Normalization::QUANTIZED
        } else {
            Normalization::FLOAT
        }
    }
}

/// Detection filtering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum score for a detection to be shown (0.0 - 1.0)
    pub score_threshold: f32,
    /// Maximum detections shown per frame
    pub max_results: usize,
    /// How entries below the threshold are handled
    pub filter_policy: FilterPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            filter_policy: FilterPolicy::default(),
        }
    }
}

/// Destination view settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// View width in pixels
    pub width: f32,
    /// View height in pixels
    pub height: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 1080.0,
            height: 1920.0,
        }
    }
}

impl ViewConfig {
    pub fn size(&self) -> ViewSize {
        ViewSize::new(self.width, self.height)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}
