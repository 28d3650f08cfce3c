//! Image preprocessing for the detection model
//!
//! Resize, rotate upright, normalize, in that order. The transform depends
//! only on the frame rotation, so `ProcessorCache` keeps the one built for
//! the last rotation seen and rebuilds only when it changes.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use ndarray::Array4;
use tracing::debug;

use crate::capture::Rotation;
use crate::vision::engine::InputTensor;

/// Model input dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(300, 300)
    }
}

/// Per-channel affine normalization `(value - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Mean values [R, G, B]
    pub mean: [f32; 3],
    /// Std values [R, G, B]
    pub std: [f32; 3],
}

impl Normalization {
    /// Quantized models take raw bytes: mean 0, std 1
    pub const QUANTIZED: Self = Self {
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    /// Float models expect [-1, 1]: mean 127.5, std 127.5
    pub const FLOAT: Self = Self {
        mean: [127.5; 3],
        std: [127.5; 3],
    };

    /// Whether the normalization leaves values untouched
    pub fn is_identity(&self) -> bool {
        self.mean == [0.0; 3] && self.std == [1.0; 3]
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::QUANTIZED
    }
}

/// Three-step preprocessing transform built for one rotation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageProcessor {
    input_size: InputSize,
    rotation: Rotation,
    normalization: Normalization,
}

impl ImageProcessor {
    /// Build the transform for frames reported at `rotation`
    pub fn new(input_size: InputSize, rotation: Rotation, normalization: Normalization) -> Self {
        Self {
            input_size,
            rotation,
            normalization,
        }
    }

    /// Rotation this transform was built for
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Model input dimensions produced by this transform
    pub fn input_size(&self) -> InputSize {
        self.input_size
    }

    /// Turn a raster into an NHWC model input tensor
    pub fn process(&self, raster: &RgbaImage) -> InputTensor {
        // 1. Resize (bilinear). For quarter turns the target is transposed so
        //    the rotated result has the model's declared shape.
        let InputSize { width, height } = self.input_size;
        let (resize_w, resize_h) = if self.rotation.is_transposed() {
            (height, width)
        } else {
            (width, height)
        };
        let resized = imageops::resize(raster, resize_w, resize_h, FilterType::Triangle);

        // 2. Rotate upright
        let upright = match self.rotation.upright_turns() {
            1 => imageops::rotate90(&resized),
            2 => imageops::rotate180(&resized),
            3 => imageops::rotate270(&resized),
            _ => resized,
        };

        // 3. Normalize (alpha is dropped here)
        let shape = (1, upright.height() as usize, upright.width() as usize, 3);
        if self.normalization.is_identity() {
            InputTensor::U8(Array4::from_shape_fn(shape, |(_, y, x, c)| {
                upright.get_pixel(x as u32, y as u32).0[c]
            }))
        } else {
            let Normalization { mean, std } = self.normalization;
            InputTensor::F32(Array4::from_shape_fn(shape, |(_, y, x, c)| {
                let value = f32::from(upright.get_pixel(x as u32, y as u32).0[c]);
                (value - mean[c]) / std[c]
            }))
        }
    }
}

/// Single-entry cache of the preprocessing transform, keyed by rotation
#[derive(Debug)]
pub struct ProcessorCache {
    input_size: InputSize,
    normalization: Normalization,
    cached: Option<ImageProcessor>,
    builds: usize,
}

impl ProcessorCache {
    /// Create an empty cache for the given model input
    pub fn new(input_size: InputSize, normalization: Normalization) -> Self {
        Self {
            input_size,
            normalization,
            cached: None,
            builds: 0,
        }
    }

    /// Transform for `rotation`, rebuilt only if the rotation changed
    pub fn get(&mut self, rotation: Rotation) -> &ImageProcessor {
        let processor = match self.cached.take() {
            Some(p) if p.rotation() == rotation => p,
            _ => {
                debug!(
                    "Building preprocessing transform for {} degrees",
                    rotation.degrees()
                );
                self.builds += 1;
                ImageProcessor::new(self.input_size, rotation, self.normalization)
            }
        };
        self.cached.insert(processor)
    }

    /// Number of transforms built so far
    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// 4x4 raster with only the top-left 2x2 quadrant white
    fn quadrant_raster() -> RgbaImage {
        RgbaImage::from_fn(4, 4, |x, y| {
            if x < 2 && y < 2 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    fn u8_tensor(tensor: InputTensor) -> Array4<u8> {
        match tensor {
            InputTensor::U8(a) => a,
            InputTensor::F32(_) => panic!("expected quantized tensor"),
        }
    }

    #[test]
    fn test_resize_to_model_input() {
        let raster = RgbaImage::from_pixel(640, 480, Rgba([10, 20, 30, 255]));
        let processor = ImageProcessor::new(InputSize::default(), Rotation::Deg0, Normalization::QUANTIZED);

        let tensor = processor.process(&raster);
        assert_eq!(tensor.shape(), [1, 300, 300, 3]);

        let a = u8_tensor(tensor);
        // Uniform input stays uniform; alpha is gone
        assert_eq!(a[[0, 150, 150, 0]], 10);
        assert_eq!(a[[0, 150, 150, 1]], 20);
        assert_eq!(a[[0, 150, 150, 2]], 30);
    }

    #[test]
    fn test_no_rotation_keeps_orientation() {
        let processor = ImageProcessor::new(InputSize::new(4, 4), Rotation::Deg0, Normalization::QUANTIZED);
        let a = u8_tensor(processor.process(&quadrant_raster()));

        assert!(a[[0, 0, 0, 0]] > 200);
        assert!(a[[0, 0, 3, 0]] < 50);
    }

    #[test]
    fn test_rotation_90_turns_clockwise() {
        let processor = ImageProcessor::new(InputSize::new(4, 4), Rotation::Deg90, Normalization::QUANTIZED);
        let a = u8_tensor(processor.process(&quadrant_raster()));

        // Top-left quadrant ends up top-right
        assert!(a[[0, 0, 3, 0]] > 200);
        assert!(a[[0, 0, 0, 0]] < 50);
        assert!(a[[0, 3, 3, 0]] < 50);
    }

    #[test]
    fn test_rotation_180_turns_upside_down() {
        let processor = ImageProcessor::new(InputSize::new(4, 4), Rotation::Deg180, Normalization::QUANTIZED);
        let a = u8_tensor(processor.process(&quadrant_raster()));

        // Top-left quadrant ends up bottom-right
        assert!(a[[0, 3, 3, 0]] > 200);
        assert!(a[[0, 0, 0, 0]] < 50);
        assert!(a[[0, 0, 3, 0]] < 50);
        assert!(a[[0, 3, 0, 0]] < 50);
    }

    #[test]
    fn test_rotation_270_turns_counter_clockwise() {
        let processor = ImageProcessor::new(InputSize::new(4, 4), Rotation::Deg270, Normalization::QUANTIZED);
        let a = u8_tensor(processor.process(&quadrant_raster()));

        // Top-left quadrant ends up bottom-left
        assert!(a[[0, 3, 0, 0]] > 200);
        assert!(a[[0, 0, 0, 0]] < 50);
    }

    #[test]
    fn test_non_square_input_keeps_declared_shape() {
        let raster = RgbaImage::new(640, 480);
        let processor = ImageProcessor::new(InputSize::new(320, 240), Rotation::Deg90, Normalization::QUANTIZED);
        // [batch, height, width, channels]
        assert_eq!(processor.process(&raster).shape(), [1, 240, 320, 3]);
    }

    #[test]
    fn test_quantized_normalization_is_identity() {
        assert!(Normalization::QUANTIZED.is_identity());
        assert!(!Normalization::FLOAT.is_identity());

        let raster = RgbaImage::from_pixel(4, 4, Rgba([7, 8, 9, 255]));
        let processor = ImageProcessor::new(InputSize::new(4, 4), Rotation::Deg0, Normalization::QUANTIZED);
        let a = u8_tensor(processor.process(&raster));
        assert_eq!(a[[0, 1, 1, 0]], 7);
        assert_eq!(a[[0, 1, 1, 2]], 9);
    }

    #[test]
    fn test_float_normalization() {
        let raster = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let processor = ImageProcessor::new(InputSize::new(2, 1), Rotation::Deg0, Normalization::FLOAT);

        match processor.process(&raster) {
            InputTensor::F32(a) => {
                assert!((a[[0, 0, 0, 0]] + 1.0).abs() < 0.01);
                assert!((a[[0, 0, 1, 2]] - 1.0).abs() < 0.01);
            }
            InputTensor::U8(_) => panic!("expected float tensor"),
        }
    }

    #[test]
    fn test_cache_builds_once_per_rotation() {
        let mut cache = ProcessorCache::new(InputSize::default(), Normalization::QUANTIZED);

        for _ in 0..5 {
            assert_eq!(cache.get(Rotation::Deg90).rotation(), Rotation::Deg90);
        }
        assert_eq!(cache.builds(), 1);

        cache.get(Rotation::Deg0);
        assert_eq!(cache.builds(), 2);

        // Single entry: going back rebuilds
        cache.get(Rotation::Deg90);
        assert_eq!(cache.builds(), 3);
        cache.get(Rotation::Deg90);
        assert_eq!(cache.builds(), 3);
    }
}
