//! Shared state between the detection worker and its callers

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::DetectionListener;
use crate::config::DEFAULT_SCORE_THRESHOLD;
use crate::vision::Detection;

/// Runtime-adjustable detection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParameters {
    /// Minimum score for a detection to be delivered (0.0 - 1.0)
    pub score_threshold: f32,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

/// Shared handle to the detection parameters
///
/// Writers swap values at any time; the worker reads a snapshot once per
/// decode, so a change takes effect from the next frame on.
#[derive(Debug, Clone, Default)]
pub struct ParamsHandle {
    inner: Arc<RwLock<DetectionParameters>>,
}

impl ParamsHandle {
    pub fn new(params: DetectionParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(params)),
        }
    }

    /// Current parameters
    pub fn snapshot(&self) -> DetectionParameters {
        *self.inner.read()
    }

    /// Current score threshold
    pub fn score_threshold(&self) -> f32 {
        self.inner.read().score_threshold
    }

    /// Set the score threshold, clamped into [0, 1]. NaN is ignored.
    pub fn set_score_threshold(&self, threshold: f32) {
        if threshold.is_nan() {
            warn!("Ignoring NaN score threshold");
            return;
        }
        let clamped = threshold.clamp(0.0, 1.0);
        debug!("Score threshold set to {}", clamped);
        self.inner.write().score_threshold = clamped;
    }
}

/// Status of model and label loading
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InitState {
    /// Assets are being loaded
    #[default]
    Loading,
    /// Pipeline is ready for frames
    Ready,
    /// Loading failed; no frames will be processed
    Failed(String),
}

impl InitState {
    pub fn is_ready(&self) -> bool {
        matches!(self, InitState::Ready)
    }
}

/// Shared handle to an `InitState`
#[derive(Debug, Clone, Default)]
pub struct InitStatus {
    inner: Arc<RwLock<InitState>>,
}

impl InitStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn get(&self) -> InitState {
        self.inner.read().clone()
    }

    pub fn set(&self, state: InitState) {
        *self.inner.write() = state;
    }
}

/// Most recent non-empty detection list
///
/// Empty deliveries leave the previous list in place, so a display reading
/// from here keeps showing the last objects seen.
#[derive(Debug, Clone, Default)]
pub struct LatestDetections {
    inner: Arc<RwLock<Vec<Detection>>>,
}

impl LatestDetections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current list
    pub fn get(&self) -> Vec<Detection> {
        self.inner.read().clone()
    }

    /// Replace the list unless `detections` is empty
    pub fn set(&self, detections: Vec<Detection>) {
        if detections.is_empty() {
            return;
        }
        *self.inner.write() = detections;
    }
}

impl DetectionListener for LatestDetections {
    fn on_detections(&mut self, detections: Vec<Detection>) {
        self.set(detections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::BoundingBox;

    fn detection(score: f32) -> Detection {
        Detection::new(
            score,
            "person".to_string(),
            BoundingBox {
                left: 0.0,
                top: 0.0,
                right: 1.0,
                bottom: 1.0,
            },
        )
    }

    #[test]
    fn test_default_threshold() {
        let params = ParamsHandle::default();
        assert!((params.score_threshold() - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_threshold_clamped() {
        let params = ParamsHandle::default();

        params.set_score_threshold(1.7);
        assert_eq!(params.score_threshold(), 1.0);

        params.set_score_threshold(-0.2);
        assert_eq!(params.score_threshold(), 0.0);

        params.set_score_threshold(0.35);
        assert_eq!(params.snapshot().score_threshold, 0.35);
    }

    #[test]
    fn test_nan_threshold_ignored() {
        let params = ParamsHandle::default();
        params.set_score_threshold(0.4);
        params.set_score_threshold(f32::NAN);
        assert_eq!(params.score_threshold(), 0.4);
    }

    #[test]
    fn test_handles_share_state() {
        let params = ParamsHandle::default();
        let other = params.clone();
        other.set_score_threshold(0.9);
        assert_eq!(params.score_threshold(), 0.9);
    }

    #[test]
    fn test_init_status() {
        let status = InitStatus::new();
        assert_eq!(status.get(), InitState::Loading);

        status.set(InitState::Failed("missing model".to_string()));
        assert!(!status.get().is_ready());

        status.set(InitState::Ready);
        assert!(status.clone().get().is_ready());
    }

    #[test]
    fn test_latest_detections_ignores_empty() {
        let mut latest = LatestDetections::new();
        assert!(latest.get().is_empty());

        latest.on_detections(vec![detection(0.9), detection(0.8)]);
        assert_eq!(latest.get().len(), 2);

        latest.on_detections(Vec::new());
        assert_eq!(latest.get().len(), 2);

        latest.on_detections(vec![detection(0.7)]);
        assert_eq!(latest.get(), vec![detection(0.7)]);
    }
}
