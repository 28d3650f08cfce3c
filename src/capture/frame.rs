//! Frame data structures for camera content
//!
//! A `CameraFrame` carries planar YUV 4:2:0 pixels, the sensor rotation and a
//! release hook that hands the underlying buffer back to the frame supplier.
//! The hook runs exactly once: on an explicit `release()` or on drop.

use image::RgbImage;
use std::fmt;
use std::time::Instant;

use crate::error::DetectorError;

/// Sensor rotation reported with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Rotation in degrees (0, 90, 180 or 270)
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Clockwise quarter turns that bring the content upright
    ///
    /// Equivalent to `-degrees / 90` counter-clockwise turns.
    pub fn upright_turns(self) -> u8 {
        (self.degrees() / 90) as u8
    }

    /// Whether width and height swap when this rotation is undone
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<i32> for Rotation {
    type Error = DetectorError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        if degrees % 90 != 0 {
            return Err(DetectorError::InvalidRotation(degrees));
        }
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            _ => Ok(Rotation::Deg270),
        }
    }
}

/// One plane of a planar image
#[derive(Debug, Clone)]
pub struct Plane {
    /// Raw plane bytes
    pub data: Vec<u8>,
    /// Bytes between the starts of two consecutive rows
    pub row_stride: usize,
    /// Bytes between two consecutive samples in a row
    pub pixel_stride: usize,
}

impl Plane {
    /// Tightly packed plane (`pixel_stride` 1, `row_stride` == width)
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self {
            data,
            row_stride: width,
            pixel_stride: 1,
        }
    }

    /// Sample at column `x`, row `y`, if inside the buffer
    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> Option<u8> {
        self.data.get(y * self.row_stride + x * self.pixel_stride).copied()
    }

    /// Minimum byte length for a plane of `width` x `height` samples
    pub fn required_len(&self, width: usize, height: usize) -> usize {
        if width == 0 || height == 0 {
            return 0;
        }
        (height - 1) * self.row_stride + (width - 1) * self.pixel_stride + 1
    }
}

/// Planar YUV 4:2:0 image (luma at full resolution, chroma halved both ways)
#[derive(Debug, Clone)]
pub struct PlanarImage {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
}

impl PlanarImage {
    /// Chroma plane dimensions for this image
    pub fn chroma_dimensions(&self) -> (u32, u32) {
        (self.width.div_ceil(2), self.height.div_ceil(2))
    }

    /// Encode an RGB raster into tightly packed I420 planes (BT.601 full range)
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let (width, height) = rgb.dimensions();
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));

        let mut y_plane = vec![0u8; w * h];
        for (x, y, px) in rgb.enumerate_pixels() {
            let [r, g, b] = px.0.map(f32::from);
            y_plane[y as usize * w + x as usize] = to_u8(0.299 * r + 0.587 * g + 0.114 * b);
        }

        let mut u_plane = vec![0u8; cw * ch];
        let mut v_plane = vec![0u8; cw * ch];
        for cy in 0..ch {
            for cx in 0..cw {
                // Average the 2x2 block, clipped at the right/bottom edges
                let (mut r, mut g, mut b, mut n) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
                for y in (cy * 2)..((cy * 2 + 2).min(h)) {
                    for x in (cx * 2)..((cx * 2 + 2).min(w)) {
                        let px = rgb.get_pixel(x as u32, y as u32).0;
                        r += f32::from(px[0]);
                        g += f32::from(px[1]);
                        b += f32::from(px[2]);
                        n += 1.0;
                    }
                }
                let (r, g, b) = (r / n, g / n, b / n);
                u_plane[cy * cw + cx] = to_u8(-0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0);
                v_plane[cy * cw + cx] = to_u8(0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0);
            }
        }

        Self {
            width,
            height,
            y: Plane::packed(y_plane, w),
            u: Plane::packed(u_plane, cw),
            v: Plane::packed(v_plane, cw),
        }
    }
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Hook invoked when a frame's buffer goes back to its supplier
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A frame from the camera
pub struct CameraFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Sensor rotation in degrees as reported by the camera
    pub rotation_degrees: i32,
    /// Timestamp when the frame was received
    pub timestamp: Instant,
    payload: Option<PlanarImage>,
    on_release: Option<ReleaseHook>,
}

impl CameraFrame {
    /// Create a frame backed by `payload`
    pub fn new(payload: PlanarImage, rotation_degrees: i32) -> Self {
        Self {
            width: payload.width,
            height: payload.height,
            rotation_degrees,
            timestamp: Instant::now(),
            payload: Some(payload),
            on_release: None,
        }
    }

    /// Create a frame with no pixel payload
    pub fn empty(width: u32, height: u32, rotation_degrees: i32) -> Self {
        Self {
            width,
            height,
            rotation_degrees,
            timestamp: Instant::now(),
            payload: None,
            on_release: None,
        }
    }

    /// Attach the hook that returns this frame's buffer to its supplier
    pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Pixel payload, if the frame has one
    pub fn payload(&self) -> Option<&PlanarImage> {
        self.payload.as_ref()
    }

    /// Whether the frame carries pixels
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Parsed sensor rotation
    pub fn rotation(&self) -> Result<Rotation, DetectorError> {
        Rotation::try_from(self.rotation_degrees)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Return the buffer to the supplier now
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("has_payload", &self.payload.is_some())
            .field("releasable", &self.on_release.is_some())
            .finish()
    }
}
