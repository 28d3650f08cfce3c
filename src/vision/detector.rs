//! Synchronous per-frame detection
//!
//! `ObjectDetector` owns every buffer that is reused between frames (raster,
//! cached transform, output tensors), so it must only ever run on one thread
//! at a time. `DetectionService` moves it onto a dedicated worker.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::capture::CameraFrame;
use crate::config::AppConfig;
use crate::error::DetectorError;
use crate::shared::ParamsHandle;
use crate::vision::decode::DetectionDecoder;
use crate::vision::engine::{InferenceEngine, OutputBuffers};
use crate::vision::models::{LabelTable, ModelAssets, OnnxSession};
use crate::vision::preprocess::ProcessorCache;
use crate::vision::raster::{RasterBuffer, RasterConverter, Yuv420Converter};
use crate::vision::Detection;

/// Frame in, detections out
pub struct ObjectDetector {
    converter: Box<dyn RasterConverter>,
    raster: RasterBuffer,
    processors: ProcessorCache,
    engine: Box<dyn InferenceEngine>,
    outputs: OutputBuffers,
    labels: Arc<LabelTable>,
    params: ParamsHandle,
    decoder: DetectionDecoder,
}

impl ObjectDetector {
    /// Assemble a detector around an already loaded engine
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        labels: Arc<LabelTable>,
        params: ParamsHandle,
        config: &AppConfig,
    ) -> Self {
        let decoder = DetectionDecoder::new(config.view.size())
            .with_max_results(config.detection.max_results)
            .with_policy(config.detection.filter_policy);

        Self {
            converter: Box::new(Yuv420Converter),
            raster: RasterBuffer::new(),
            processors: ProcessorCache::new(config.model.input_size(), config.model.normalization()),
            engine,
            outputs: OutputBuffers::new(config.model.capacity),
            labels,
            params,
            decoder,
        }
    }

    /// Load the model and labels named by `config` and build a detector
    pub fn from_config(config: &AppConfig, params: ParamsHandle) -> Result<Self, DetectorError> {
        let assets = ModelAssets::from_config(&config.model);
        let labels = Arc::new(assets.load_labels()?);
        let model = assets.read_model()?;
        let session = OnnxSession::from_memory(&model, config.model.output_layout, config.model.intra_threads)?;

        info!(
            "Detector ready: {} labels, input {}x{}, threshold {}",
            labels.len(),
            config.model.input_width,
            config.model.input_height,
            params.score_threshold()
        );

        Ok(Self::new(Box::new(session), labels, params, config))
    }

    /// Replace the raster converter
    pub fn with_converter(mut self, converter: impl RasterConverter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    /// Label table used for decoding
    pub fn labels(&self) -> &Arc<LabelTable> {
        &self.labels
    }

    /// Parameters read at every decode
    pub fn params(&self) -> &ParamsHandle {
        &self.params
    }

    /// Number of preprocessing transforms built so far
    pub fn transform_builds(&self) -> usize {
        self.processors.builds()
    }

    /// Number of rasters allocated so far
    pub fn raster_allocations(&self) -> usize {
        self.raster.allocations()
    }

    /// Run the full pipeline on one frame
    pub fn detect(&mut self, frame: &CameraFrame) -> Result<Vec<Detection>, DetectorError> {
        let start = Instant::now();

        let payload = frame
            .payload()
            .ok_or_else(|| DetectorError::RasterConversion("frame has no pixel payload".to_string()))?;
        let rotation = frame.rotation()?;

        let raster = self.raster.acquire(payload.width, payload.height);
        self.converter.convert(payload, raster)?;

        let input = self.processors.get(rotation).process(raster);
        self.engine.run(&input, &mut self.outputs)?;

        let threshold = self.params.score_threshold();
        let detections = self.decoder.decode(&self.outputs, &self.labels, threshold);

        debug!(
            "Detected {} objects in {:?} (threshold {})",
            detections.len(),
            start.elapsed(),
            threshold
        );

        Ok(detections)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted engine for pipeline tests

    use super::*;
    use crate::capture::PlanarImage;
    use crate::vision::engine::{InputTensor, OutputRole};
    use image::{Rgb, RgbImage};
    use parking_lot::Mutex;

    /// Writes fixed outputs on every run and records the input shapes
    pub struct ScriptedEngine {
        pub count: f32,
        pub scores: Vec<f32>,
        pub classes: Vec<f32>,
        pub inputs: Arc<Mutex<Vec<[usize; 4]>>>,
        /// Write a wrongly sized score tensor
        pub malformed: bool,
    }

    impl ScriptedEngine {
        pub fn new(count: f32, scores: &[f32]) -> Self {
            Self {
                count,
                scores: scores.to_vec(),
                classes: (0..scores.len()).map(|i| i as f32).collect(),
                inputs: Arc::new(Mutex::new(Vec::new())),
                malformed: false,
            }
        }
    }

    impl InferenceEngine for ScriptedEngine {
        fn run(&mut self, input: &InputTensor, outputs: &mut OutputBuffers) -> Result<(), DetectorError> {
            self.inputs.lock().push(input.shape());
            if self.malformed {
                return outputs.fill(OutputRole::Scores, &[0.9]);
            }

            let capacity = outputs.capacity();
            let mut scores = vec![0.0; capacity];
            let mut classes = vec![0.0; capacity];
            let n = self.scores.len().min(capacity);
            scores[..n].copy_from_slice(&self.scores[..n]);
            classes[..n].copy_from_slice(&self.classes[..n]);

            let boxes: Vec<f32> = (0..capacity).flat_map(|_| [0.1, 0.2, 0.5, 0.6]).collect();

            outputs.fill(OutputRole::Boxes, &boxes)?;
            outputs.fill(OutputRole::Classes, &classes)?;
            outputs.fill(OutputRole::Scores, &scores)?;
            outputs.fill(OutputRole::Count, &[self.count])
        }
    }

    /// Converter that always reports a conversion failure
    pub struct FailingConverter;

    impl RasterConverter for FailingConverter {
        fn convert(&self, _src: &PlanarImage, _dst: &mut image::RgbaImage) -> Result<(), DetectorError> {
            Err(DetectorError::RasterConversion("sensor buffer unreadable".to_string()))
        }
    }

    pub fn labels() -> Arc<LabelTable> {
        Arc::new(LabelTable::parse("person\nbicycle\ncar\nmotorcycle\nairplane\nbus").unwrap())
    }

    pub fn detector(engine: ScriptedEngine, params: ParamsHandle) -> ObjectDetector {
        ObjectDetector::new(Box::new(engine), labels(), params, &AppConfig::default())
    }

    pub fn frame(width: u32, height: u32, rotation_degrees: i32) -> CameraFrame {
        let rgb = RgbImage::from_pixel(width, height, Rgb([120, 60, 30]));
        CameraFrame::new(PlanarImage::from_rgb(&rgb), rotation_degrees)
    }
}
