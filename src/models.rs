//! Model loading and metadata
//!
//! The segmentation model is a single ONNX file exported from the trained
//! Keras network. It is read from disk exactly once, at startup, and handed to
//! an inference backend.

use crate::error::{NoBackError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Spatial resolution the segmentation network was trained on
pub const MODEL_INPUT_SIZE: usize = 64;

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    /// NHWC input shape
    pub input_shape: (usize, usize, usize, usize),
    /// NHWC output shape (single probability channel)
    pub output_shape: (usize, usize, usize, usize),
}

impl ModelInfo {
    /// Metadata for the 64×64 RGB → 64×64×1 segmentation network
    #[must_use]
    pub fn segmentation<S: Into<String>>(name: S, size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            input_shape: (1, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, 3),
            output_shape: (1, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, 1),
        }
    }
}

/// Preprocessing parameters expected by the model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Target `[width, height]`; images are stretched to this size
    pub target_size: [u32; 2],
    /// Multiplier applied to raw 0-255 channel values
    pub pixel_scale: f32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [MODEL_INPUT_SIZE as u32, MODEL_INPUT_SIZE as u32],
            pixel_scale: 1.0,
        }
    }
}

/// Owns the model bytes and metadata read from disk
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    data: Vec<u8>,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Load a model file from disk
    ///
    /// # Errors
    /// - Model file does not exist or is not a regular file
    /// - File I/O errors when reading model data
    /// - Empty model file
    pub fn from_path<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref().to_path_buf();

        if !model_path.is_file() {
            return Err(NoBackError::model_error_with_context(
                "load",
                &model_path,
                "file not found",
                &[
                    "export the trained network to ONNX",
                    "pass --model with the correct path",
                ],
            ));
        }

        let data = fs::read(&model_path)
            .map_err(|e| NoBackError::file_io_error("read model file", &model_path, &e))?;

        Self::from_bytes(model_path, data)
    }

    /// Wrap model bytes already in memory
    ///
    /// # Errors
    /// - Empty model data
    pub fn from_bytes<P: Into<PathBuf>>(model_path: P, data: Vec<u8>) -> Result<Self> {
        let model_path = model_path.into();
        if data.is_empty() {
            return Err(NoBackError::model_error_with_context(
                "load",
                &model_path,
                "model file is empty",
                &[],
            ));
        }

        let name = model_path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned());
        let info = ModelInfo::segmentation(name, data.len());

        log::debug!(
            "Loaded model '{}' ({} bytes) from {}",
            info.name,
            info.size_bytes,
            model_path.display()
        );

        Ok(Self {
            model_path,
            data,
            info,
            preprocessing: PreprocessingConfig::default(),
        })
    }

    /// Override the pixel scale applied during preprocessing
    #[must_use]
    pub fn with_pixel_scale(mut self, pixel_scale: f32) -> Self {
        self.preprocessing.pixel_scale = pixel_scale;
        self
    }

    /// Model bytes
    #[must_use]
    pub fn model_data(&self) -> &[u8] {
        &self.data
    }

    /// Model information
    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    /// Preprocessing configuration
    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Path the model was loaded from
    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}
