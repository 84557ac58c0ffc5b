//! Inference backend abstraction

use crate::{
    config::ServerConfig,
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// Backends are `Send` so the loaded model can live in shared server state and
/// be driven from a blocking worker thread.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time on first initialization, `None` when the
    /// backend was already initialized.
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Model parsing or optimization errors
    fn initialize(&mut self, config: &ServerConfig) -> Result<Option<Duration>>;

    /// Run inference on an NHWC input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Tensor conversion errors
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Expected NHWC input shape
    fn input_shape(&self) -> (usize, usize, usize, usize);

    /// Expected NHWC output shape
    fn output_shape(&self) -> (usize, usize, usize, usize);

    /// Preprocessing configuration for this backend's model
    ///
    /// # Errors
    /// - Model manager not available
    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Model information for this backend
    ///
    /// # Errors
    /// - Model manager not available
    fn get_model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;

    #[test]
    fn test_backend_trait_object() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(MockBackend::new());
        assert!(!backend.is_initialized());

        backend.initialize(&ServerConfig::default()).unwrap();
        assert!(backend.is_initialized());

        let input_shape = backend.input_shape();
        let output_shape = backend.output_shape();
        assert_eq!(input_shape.0, 1); // Batch size
        assert_eq!(input_shape.3, 3); // RGB channels (NHWC)
        assert_eq!(output_shape.0, 1);
        assert_eq!(output_shape.3, 1); // Single probability channel
    }

    #[test]
    fn test_backend_is_send() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<dyn InferenceBackend>();
    }
}
