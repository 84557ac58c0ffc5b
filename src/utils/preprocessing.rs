//! Image preprocessing for model inference
//!
//! The network was trained on 64×64 RGB images with raw 0-255 values, so the
//! input is stretched (not letterboxed) to the target size and laid out NHWC.

use crate::{
    error::{NoBackError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Resize filter used to reach the model resolution
    pub filter: image::imageops::FilterType,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            filter: image::imageops::FilterType::Triangle,
        }
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess an image for model inference
    ///
    /// - RGB conversion (alpha and extra channels are discarded)
    /// - Resize to exactly `target_size`, ignoring aspect ratio
    /// - Conversion to an NHWC tensor scaled by `pixel_scale`
    ///
    /// # Errors
    /// - Empty input image
    /// - Zero target size
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;

        if image.width() == 0 || image.height() == 0 {
            return Err(NoBackError::processing_stage_error(
                "preprocessing",
                "image has no pixels",
                Some(&format!("{}x{}", image.width(), image.height())),
            ));
        }
        if target_width == 0 || target_height == 0 {
            return Err(NoBackError::invalid_config(
                "Model target size must be non-zero",
            ));
        }

        let rgb_image = image.to_rgb8();
        let resized = image::imageops::resize(&rgb_image, target_width, target_height, options.filter);

        Ok(Self::image_to_tensor(&resized, preprocessing_config.pixel_scale))
    }

    /// Convert an RGB image to a `(1, H, W, 3)` tensor
    fn image_to_tensor(image: &RgbImage, pixel_scale: f32) -> Array4<f32> {
        let (width, height) = image.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match the image
        for (x, y, pixel) in image.enumerate_pixels() {
            for (c, &value) in pixel.0.iter().enumerate() {
                tensor[[0, y as usize, x as usize, c]] = f32::from(value) * pixel_scale;
            }
        }

        tensor
    }

    /// Preprocess with default options (tensor only)
    ///
    /// # Errors
    /// - See [`ImagePreprocessor::preprocess_image`]
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())
    }
}
