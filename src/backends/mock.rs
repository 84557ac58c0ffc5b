//! Mock backend for testing and benchmarking
//!
//! Produces deterministic probability maps without a model file, and counts
//! how often inference ran so tests can assert the model was (or was not)
//! invoked.

use crate::config::ServerConfig;
use crate::error::{NoBackError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, PreprocessingConfig, MODEL_INPUT_SIZE};
use instant::Duration;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What the mock model predicts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockOutput {
    /// High probability inside the central half of the frame, low elsewhere
    CenteredBlock,
    /// The same probability everywhere
    Constant(f32),
    /// Every inference call fails
    Failure,
}

/// Mock backend for testing without model files
#[derive(Debug, Clone)]
pub struct MockBackend {
    output: MockOutput,
    output_shape: (usize, usize, usize, usize),
    initialized: bool,
    invocations: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Mock that predicts a centred foreground block
    #[must_use]
    pub fn new() -> Self {
        Self::with_output(MockOutput::CenteredBlock)
    }

    /// Mock with a specific prediction pattern
    #[must_use]
    pub fn with_output(output: MockOutput) -> Self {
        Self {
            output,
            output_shape: (1, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, 1),
            initialized: false,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mock that predicts the same probability everywhere
    #[must_use]
    pub fn constant(probability: f32) -> Self {
        Self::with_output(MockOutput::Constant(probability))
    }

    /// Mock whose inference always fails
    #[must_use]
    pub fn failing() -> Self {
        Self::with_output(MockOutput::Failure)
    }

    /// Override the produced output shape (NHWC)
    #[must_use]
    pub fn with_output_shape(mut self, shape: (usize, usize, usize, usize)) -> Self {
        self.output_shape = shape;
        self
    }

    /// Number of inference calls so far
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Shared handle on the invocation counter, usable after the backend is moved
    #[must_use]
    pub fn invocation_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }

    fn probability_at(&self, y: usize, x: usize, height: usize, width: usize) -> f32 {
        match self.output {
            MockOutput::Constant(p) => p,
            MockOutput::CenteredBlock | MockOutput::Failure => {
                let inside_y = y >= height / 4 && y < height - height / 4;
                let inside_x = x >= width / 4 && x < width - width / 4;
                if inside_y && inside_x {
                    0.9
                } else {
                    0.1
                }
            },
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ServerConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if self.output == MockOutput::Failure {
            return Err(NoBackError::inference("Mock inference failure"));
        }

        let (batch, _, _, _) = input.dim();
        let (_, height, width, channels) = self.output_shape;
        let mut output = Array4::<f32>::zeros((batch, height, width, channels));

        for ((_, y, x, _), value) in output.indexed_iter_mut() {
            *value = self.probability_at(y, x, height, width);
        }

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE, 3)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.output_shape
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        Ok(PreprocessingConfig::default())
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo::segmentation("mock", 0))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
