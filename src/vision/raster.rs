//! Planar YUV to packed RGBA conversion
//!
//! The pipeline only depends on the `RasterConverter` contract: same
//! dimensions in and out, every pixel fully opaque. `RasterBuffer` keeps the
//! destination raster alive across frames of the same size.

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::capture::{PlanarImage, Plane};
use crate::error::DetectorError;

/// Converts a planar camera image into a packed RGBA raster
pub trait RasterConverter: Send {
    /// Fill `dst` from `src`; `dst` has exactly the dimensions of `src`
    fn convert(&self, src: &PlanarImage, dst: &mut RgbaImage) -> Result<(), DetectorError>;
}

/// BT.601 full-range YUV 4:2:0 converter
///
/// Honors per-plane row and pixel strides, so I420 as well as interleaved
/// chroma layouts (pixel stride 2) convert correctly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Yuv420Converter;

impl Yuv420Converter {
    fn check_plane(name: &str, plane: &Plane, width: usize, height: usize) -> Result<(), DetectorError> {
        let required = plane.required_len(width, height);
        if plane.data.len() < required {
            return Err(DetectorError::RasterConversion(format!(
                "{} plane has {} bytes, needs {} for {}x{}",
                name,
                plane.data.len(),
                required,
                width,
                height
            )));
        }
        Ok(())
    }
}

impl RasterConverter for Yuv420Converter {
    fn convert(&self, src: &PlanarImage, dst: &mut RgbaImage) -> Result<(), DetectorError> {
        if dst.dimensions() != (src.width, src.height) {
            return Err(DetectorError::RasterConversion(format!(
                "destination is {}x{}, source is {}x{}",
                dst.width(),
                dst.height(),
                src.width,
                src.height
            )));
        }

        let (w, h) = (src.width as usize, src.height as usize);
        let (cw, ch) = src.chroma_dimensions();
        Self::check_plane("Y", &src.y, w, h)?;
        Self::check_plane("U", &src.u, cw as usize, ch as usize)?;
        Self::check_plane("V", &src.v, cw as usize, ch as usize)?;

        for (x, y, px) in dst.enumerate_pixels_mut() {
            let (x, y) = (x as usize, y as usize);
            // Lengths were checked above, so these lookups always hit
            let luma = src.y.sample(x, y).unwrap_or(0);
            let cb = src.u.sample(x / 2, y / 2).unwrap_or(128);
            let cr = src.v.sample(x / 2, y / 2).unwrap_or(128);
            *px = yuv_to_rgba(luma, cb, cr);
        }

        Ok(())
    }
}

#[inline]
fn yuv_to_rgba(y: u8, u: u8, v: u8) -> Rgba<u8> {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;

    Rgba([clamp_u8(r), clamp_u8(g), clamp_u8(b), 255])
}

#[inline]
fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Reusable destination raster
#[derive(Debug, Default)]
pub struct RasterBuffer {
    raster: Option<RgbaImage>,
    allocations: usize,
}

impl RasterBuffer {
    /// Create an empty buffer (first `acquire` allocates)
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a raster of exactly `width` x `height`
    ///
    /// Reuses the previous raster when its size matches, otherwise replaces it.
    pub fn acquire(&mut self, width: u32, height: u32) -> &mut RgbaImage {
        let raster = match self.raster.take() {
            Some(r) if r.dimensions() == (width, height) => r,
            _ => {
                debug!("Allocating {}x{} raster", width, height);
                self.allocations += 1;
                RgbaImage::new(width, height)
            }
        };
        self.raster.insert(raster)
    }

    /// Number of rasters allocated so far
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}
