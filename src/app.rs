//! Detection Service
//!
//! Runs an `ObjectDetector` on a dedicated worker thread. Frames are handed
//! over through a channel so the caller never blocks on inference; results
//! go to a `DetectionListener` from the worker thread.

use crossbeam_channel::{unbounded, Sender};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::CameraFrame;
use crate::config::AppConfig;
use crate::error::DetectorError;
use crate::shared::{DetectionParameters, InitState, InitStatus, ParamsHandle};
use crate::vision::{Detection, ObjectDetector};

/// Receives the detections of each processed frame
pub trait DetectionListener: Send {
    /// Called once per successfully decoded frame, possibly with an empty list
    fn on_detections(&mut self, detections: Vec<Detection>);
}

impl<F> DetectionListener for F
where
    F: FnMut(Vec<Detection>) + Send,
{
    fn on_detections(&mut self, detections: Vec<Detection>) {
        self(detections)
    }
}

impl DetectionListener for Sender<Vec<Detection>> {
    fn on_detections(&mut self, detections: Vec<Detection>) {
        if self.send(detections).is_err() {
            debug!("Detection receiver dropped");
        }
    }
}

/// Background detection pipeline
pub struct DetectionService {
    /// Frame queue to the worker; `None` once shut down
    frames: Option<Sender<CameraFrame>>,
    /// Handle to the worker thread
    worker: Option<JoinHandle<()>>,
    params: ParamsHandle,
    status: InitStatus,
}

impl DetectionService {
    /// Load assets from `config` and start the worker
    pub fn start(config: &AppConfig, listener: impl DetectionListener + 'static) -> Result<Self, DetectorError> {
        Self::start_with_status(config, listener, InitStatus::new())
    }

    /// Like `start`, reporting progress through `status`
    pub fn start_with_status(
        config: &AppConfig,
        listener: impl DetectionListener + 'static,
        status: InitStatus,
    ) -> Result<Self, DetectorError> {
        status.set(InitState::Loading);

        let params = ParamsHandle::new(DetectionParameters {
            score_threshold: config.detection.score_threshold,
        });

        let loaded = config
            .validate()
            .and_then(|()| ObjectDetector::from_config(config, params.clone()));

        match loaded {
            Ok(detector) => Ok(Self::spawn(detector, listener, status)),
            Err(e) => {
                error!("Failed to initialize detector: {}", e);
                status.set(InitState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Start the worker around an already built detector
    pub fn with_detector(detector: ObjectDetector, listener: impl DetectionListener + 'static) -> Self {
        Self::spawn(detector, listener, InitStatus::new())
    }

    fn spawn(mut detector: ObjectDetector, mut listener: impl DetectionListener + 'static, status: InitStatus) -> Self {
        let params = detector.params().clone();
        let (frames, rx) = unbounded::<CameraFrame>();

        let handle = std::thread::spawn(move || {
            debug!("Detection worker starting");
            for frame in rx {
                match detector.detect(&frame) {
                    Ok(detections) => listener.on_detections(detections),
                    Err(e) => warn!("Dropping frame: {}", e),
                }
                frame.release();
            }
            debug!("Detection worker exiting");
        });

        status.set(InitState::Ready);
        info!("Detection service started");

        Self {
            frames: Some(frames),
            worker: Some(handle),
            params,
            status,
        }
    }

    /// Queue a frame for detection
    ///
    /// Returns whether the frame was accepted. Frames without pixels, and
    /// frames arriving after shutdown, are released right away.
    pub fn analyze(&self, frame: CameraFrame) -> bool {
        if !frame.has_payload() {
            debug!("Dropping frame without payload");
            frame.release();
            return false;
        }

        let Some(frames) = &self.frames else {
            frame.release();
            return false;
        };

        match frames.send(frame) {
            Ok(()) => true,
            // The frame comes back inside the error and is released on drop
            Err(_) => {
                warn!("Detection worker is gone, frame dropped");
                false
            }
        }
    }

    /// Shared handle to the runtime parameters
    pub fn params(&self) -> ParamsHandle {
        self.params.clone()
    }

    /// Current initialization state
    pub fn status(&self) -> InitState {
        self.status.get()
    }

    /// Check if the worker is running
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop accepting frames, finish queued ones and join the worker
    pub fn shutdown(&mut self) {
        // Closing the channel ends the worker loop once the queue drains
        self.frames.take();

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("Detection worker panicked");
            }
            info!("Detection service stopped");
        }
    }
}

impl Drop for DetectionService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
