//! Shared state between the detection worker and its callers
//!
//! Thread-safe handles for the runtime parameters, initialization status
//! and the latest delivered detections.

pub mod state;

pub use state::{DetectionParameters, InitState, InitStatus, LatestDetections, ParamsHandle};
