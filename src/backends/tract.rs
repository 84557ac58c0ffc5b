//! Tract backend implementation
//!
//! Pure Rust ONNX inference; the default backend.

use crate::config::ServerConfig;
use crate::error::{NoBackError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the optimized, runnable Tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Tract backend for running the segmentation model with pure Rust inference
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Create a new uninitialized Tract backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Create a Tract backend with a loaded model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    /// Parse, pin the input shape, optimize and make the model runnable
    fn load_model(&mut self) -> Result<Duration> {
        let model_load_start = Instant::now();

        let Some(ref model_manager) = self.model_manager else {
            return Err(NoBackError::model(
                "No model manager available for Tract backend",
            ));
        };

        let model_info = model_manager.info();
        let (n, h, w, c) = model_info.input_shape;

        log::info!("Initializing Tract backend");
        log::info!("Model: {} ({} bytes)", model_info.name, model_info.size_bytes);
        log::debug!("Pinning input fact to f32 [{n}, {h}, {w}, {c}]");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_manager.model_data()))
            .map_err(|e| NoBackError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([n, h, w, c]).into())
            .map_err(|e| NoBackError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| NoBackError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| NoBackError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl Default for TractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for TractBackend {
    fn initialize(&mut self, _config: &ServerConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model()?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| NoBackError::inference("Tract model not initialized"))?;

        log::debug!("Running Tract inference on input {:?}", input.shape());
        let inference_start = Instant::now();

        let standard = input.as_standard_layout();
        let input_data = standard
            .as_slice()
            .ok_or_else(|| NoBackError::inference("Input tensor is not contiguous"))?;
        let input_tensor = Tensor::from_shape(input.shape(), input_data).map_err(|e| {
            NoBackError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| NoBackError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| NoBackError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_shape = output_tensor.shape().to_vec();
        let [d0, d1, d2, d3] = output_shape[..] else {
            return Err(NoBackError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };

        let output_data = output_tensor.as_slice::<f32>().map_err(|e| {
            NoBackError::inference(format!("Failed to read output tensor: {e}"))
        })?;

        let output_array = Array4::from_shape_vec((d0, d1, d2, d3), output_data.to_vec())
            .map_err(|e| {
                NoBackError::inference(format!("Failed to reshape output tensor: {e}"))
            })?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .map_or((1, 64, 64, 3), |manager| manager.info().input_shape)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.model_manager
            .as_ref()
            .map_or((1, 64, 64, 1), |manager| manager.info().output_shape)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager
            .as_ref()
            .map(|manager| manager.preprocessing_config().clone())
            .ok_or_else(|| NoBackError::internal("Model manager not initialized"))
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .map(|manager| manager.info().clone())
            .ok_or_else(|| NoBackError::internal("Model manager not initialized"))
    }
}
