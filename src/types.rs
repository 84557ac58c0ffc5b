//! Core types for segmentation and compositing

use crate::error::{NoBackError, Result};
use crate::services::ImageIOService;
use image::{GrayImage, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-pixel foreground probabilities at model resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    /// Probabilities indexed `[y, x]`
    pub data: Array2<f32>,
}

impl ProbabilityMap {
    #[must_use]
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Map dimensions as `(width, height)`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width) = self.data.dim();
        (width as u32, height as u32)
    }
}

/// Binary segmentation mask
///
/// Every value is `0` (background) or `1` (foreground).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMask {
    /// Row-major mask values
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl BinaryMask {
    /// Create a mask from raw 0/1 values
    ///
    /// # Errors
    /// - Data length does not match the dimensions
    /// - Values other than 0 and 1
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(NoBackError::processing(format!(
                "Mask data length {} does not match {}x{}",
                data.len(),
                dimensions.0,
                dimensions.1
            )));
        }
        if data.iter().any(|&v| v > 1) {
            return Err(NoBackError::processing("Mask values must be 0 or 1"));
        }
        Ok(Self { data, dimensions })
    }

    /// Threshold a probability map: values strictly greater than `threshold`
    /// become foreground
    #[must_use]
    pub fn from_probabilities(probabilities: &ProbabilityMap, threshold: f32) -> Self {
        let dimensions = probabilities.dimensions();
        let data = probabilities
            .data
            .iter()
            .map(|&p| u8::from(p > threshold))
            .collect();
        Self { data, dimensions }
    }

    /// Resize the mask with nearest-neighbour sampling so it stays binary
    ///
    /// # Errors
    /// - Zero target dimensions
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<BinaryMask> {
        if new_width == 0 || new_height == 0 {
            return Err(NoBackError::processing_stage_error(
                "mask resize",
                "target dimensions must be non-zero",
                Some(&format!("{new_width}x{new_height}")),
            ));
        }
        if (new_width, new_height) == self.dimensions {
            return Ok(self.clone());
        }

        let (width, height) = self.dimensions;
        let current = GrayImage::from_raw(width, height, self.data.clone())
            .ok_or_else(|| NoBackError::processing("Failed to create image from mask data"))?;
        let resized = image::imageops::resize(
            &current,
            new_width,
            new_height,
            image::imageops::FilterType::Nearest,
        );

        Ok(Self {
            data: resized.into_raw(),
            dimensions: (new_width, new_height),
        })
    }

    /// Keep foreground pixels of `image` and zero the rest
    ///
    /// Each channel is AND-ed with `0xFF` for foreground and `0x00` for
    /// background.
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn apply_to_image(&self, image: &RgbImage) -> Result<RgbImage> {
        if image.dimensions() != self.dimensions {
            return Err(NoBackError::processing_stage_error(
                "mask application",
                "image and mask dimensions do not match",
                Some(&format!(
                    "image {}x{}, mask {}x{}",
                    image.width(),
                    image.height(),
                    self.dimensions.0,
                    self.dimensions.1
                )),
            ));
        }

        let mut foreground = image.clone();
        for (pixel, &m) in foreground.pixels_mut().zip(&self.data) {
            let bits = if m == 1 { 0xFF } else { 0x00 };
            for channel in &mut pixel.0 {
                *channel &= bits;
            }
        }
        Ok(foreground)
    }

    /// Get mask statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&v| v == 1).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a binary mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Solid background layer the foreground is added onto
#[must_use]
pub fn solid_background(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, image::Rgb(color))
}

/// Add the masked foreground onto a background layer with saturating addition
///
/// # Errors
/// - Layer dimensions differ
pub fn add_layers(foreground: &RgbImage, background: &RgbImage) -> Result<RgbImage> {
    if foreground.dimensions() != background.dimensions() {
        return Err(NoBackError::processing_stage_error(
            "compositing",
            "foreground and background dimensions do not match",
            None,
        ));
    }

    let mut composite = background.clone();
    for (out, fg) in composite.pixels_mut().zip(foreground.pixels()) {
        for (o, f) in out.0.iter_mut().zip(fg.0) {
            *o = o.saturating_add(f);
        }
    }
    Ok(composite)
}

/// Result of one segmentation + compositing run
#[derive(Debug, Clone)]
pub struct CompositeResult {
    /// Original image with the background replaced by black
    pub image: RgbImage,

    /// Binary mask at the original resolution
    pub mask: BinaryMask,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Per-stage timings
    pub timings: ProcessingTimings,
}

impl CompositeResult {
    #[must_use]
    pub fn new(
        image: RgbImage,
        mask: BinaryMask,
        original_dimensions: (u32, u32),
        timings: ProcessingTimings,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            timings,
        }
    }

    /// Save the composite as JPEG, overwriting any existing file
    ///
    /// The parent directory must already exist.
    ///
    /// # Errors
    /// - Output file cannot be created
    /// - JPEG encoding failures
    pub fn save_jpeg<P: AsRef<Path>>(&self, path: P, quality: u8) -> Result<()> {
        ImageIOService::save_jpeg(&self.image, path, quality)
    }

    /// Get the composite dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get the processing timings
    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.timings
    }

    /// One-line human readable timing summary
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.timings;
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Preprocess: {}ms | Inference: {}ms | Postprocess: {}ms",
            t.total_ms, t.image_decode_ms, t.preprocessing_ms, t.inference_ms, t.postprocessing_ms
        );
        if let Some(encode) = t.image_encode_ms {
            summary.push_str(&format!(" | Encode: {encode}ms"));
        }
        summary
    }
}

/// Detailed timing breakdown for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image loading and decoding
    pub image_decode_ms: u64,

    /// Resize and tensor conversion
    pub preprocessing_ms: u64,

    /// Model inference
    pub inference_ms: u64,

    /// Thresholding, mask resize and compositing
    pub postprocessing_ms: u64,

    /// JPEG encoding (if written to a file)
    pub image_encode_ms: Option<u64>,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of total time spent in inference
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.image_decode_ms
            + self.preprocessing_ms
            + self.inference_ms
            + self.postprocessing_ms
            + self.image_encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(measured)
    }
}
