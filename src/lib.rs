//! frame-detector - per-frame object detection for live camera preview
//!
//! Planar camera frames go in, labeled screen-space boxes come out. The
//! pipeline converts each frame to RGBA, preprocesses it for an SSD-style
//! detection model, runs the model through ONNX Runtime and decodes the
//! fixed-capacity outputs into at most a handful of detections.

pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod shared;
pub mod storage;
pub mod vision;

pub use app::{DetectionListener, DetectionService};
pub use capture::{CameraFrame, LatestFrameSlot, PlanarImage, Plane, Rotation};
pub use config::AppConfig;
pub use error::DetectorError;
pub use shared::{DetectionParameters, InitState, InitStatus, LatestDetections, ParamsHandle};
pub use vision::{BoundingBox, Detection, ObjectDetector, ViewSize};
