//! Frame Supply Layer
//!
//! Frames come from an upstream camera producer. The detection pipeline only
//! needs the `CameraFrame` type; `LatestFrameSlot` is the keep-only-latest
//! hand-off producers can use when detection runs slower than capture.

pub mod frame;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub use frame::{CameraFrame, PlanarImage, Plane, ReleaseHook, Rotation};

/// Depth-1 frame queue that drops stale frames under backpressure
///
/// `offer` replaces any frame still waiting; the superseded frame is released
/// back to its supplier immediately.
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    pending: Mutex<Option<CameraFrame>>,
    dropped: AtomicU64,
}

impl LatestFrameSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` as the newest, releasing any frame it supersedes
    pub fn offer(&self, frame: CameraFrame) {
        let stale = self.pending.lock().replace(frame);
        if let Some(stale) = stale {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping stale frame {}x{}", stale.width, stale.height);
            stale.release();
        }
    }

    /// Take the newest frame, leaving the slot empty
    pub fn take(&self) -> Option<CameraFrame> {
        self.pending.lock().take()
    }

    /// Whether a frame is waiting
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_none()
    }

    /// Number of frames superseded before they were taken
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
