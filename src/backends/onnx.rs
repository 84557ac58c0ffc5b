//! ONNX Runtime backend implementation
//!
//! Runs the segmentation model through ONNX Runtime with CPU, CUDA or `CoreML`
//! execution providers.

use crate::config::{ExecutionProvider, ServerConfig};
use crate::error::{NoBackError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime backend for running the segmentation model
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability status
    ///
    /// Returns `(name, available, description)` tuples.
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda = OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
            .unwrap_or(false);
        let coreml = OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
            .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU cores".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda,
                "NVIDIA GPU acceleration".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml,
                "Apple Silicon acceleration".to_string(),
            ),
        ]
    }

    /// Create a new uninitialized ONNX backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            model_manager: None,
            initialized: false,
        }
    }

    /// Create an ONNX backend with a loaded model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn load_model(&mut self, config: &ServerConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| NoBackError::model("No model manager available for ONNX backend"))?;

        let mut session_builder = Session::builder()
            .map_err(|e| {
                NoBackError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                NoBackError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        session_builder = match config.execution_provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();

                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda_provider.build());
                }

                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml_provider.with_subgraphs(true).build());
                }

                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                    session_builder
                } else {
                    session_builder
                        .with_execution_providers(providers)
                        .map_err(|e| {
                            NoBackError::inference(format!(
                                "Failed to set auto execution providers: {e}"
                            ))
                        })?
                }
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                session_builder
            },
            ExecutionProvider::Cuda => {
                let cuda_provider = CUDAExecutionProvider::default();
                if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                    log::info!("Using CUDA execution provider");
                    session_builder
                        .with_execution_providers([cuda_provider.build()])
                        .map_err(|e| {
                            NoBackError::inference(format!(
                                "Failed to set CUDA execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
            ExecutionProvider::CoreMl => {
                let coreml_provider = CoreMLExecutionProvider::default();
                if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                    log::info!("Using CoreML execution provider");
                    session_builder
                        .with_execution_providers([coreml_provider.with_subgraphs(true).build()])
                        .map_err(|e| {
                            NoBackError::inference(format!(
                                "Failed to set CoreML execution provider: {e}"
                            ))
                        })?
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                    session_builder
                }
            },
        };

        let intra_threads = resolve_intra_threads(config.intra_threads);

        let session = session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| NoBackError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_manager.model_data())
            .map_err(|e| {
                NoBackError::model(format!("Failed to create session from model data: {e}"))
            })?;

        log::debug!(
            "ONNX Runtime session created: provider {}, {} intra-op threads, model {}",
            config.execution_provider,
            intra_threads,
            model_manager.info().name
        );

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "ONNX backend initialized in {}ms",
            model_load_time.as_millis()
        );

        Ok(model_load_time)
    }
}

impl Default for OnnxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &ServerConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| NoBackError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        log::debug!("Running ONNX inference on input {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            NoBackError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs: exported Keras graphs use generated tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| NoBackError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| NoBackError::inference("No output tensors found"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| NoBackError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| NoBackError::inference(format!("Failed to extract output tensor: {e}")))?;

        let output_shape = output_tensor.shape().to_vec();
        let [d0, d1, d2, d3] = output_shape[..] else {
            return Err(NoBackError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };

        let output_data = output_tensor.iter().copied().collect::<Vec<f32>>();
        let output_array = Array4::from_shape_vec((d0, d1, d2, d3), output_data).map_err(|e| {
            NoBackError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::debug!(
            "ONNX inference completed in {}ms, output {:?}",
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

/// `0` means one thread per available core
fn resolve_intra_threads(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;

    #[test]
    fn test_onnx_backend_creation() {
        let backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_shape(), (1, 64, 64, 3));
        assert_eq!(backend.output_shape(), (1, 64, 64, 1));
        assert!(backend.get_model_info().is_err());
    }

    #[test]
    fn test_onnx_infer_requires_initialization() {
        let mut backend = OnnxBackend::new();
        let input = Array4::<f32>::zeros((1, 64, 64, 3));
        assert!(backend.infer(&input).is_err());
    }

    #[test]
    fn test_list_providers_includes_cpu() {
        let providers = OnnxBackend::list_providers();
        assert!(providers
            .iter()
            .any(|(name, available, _)| name == "CPU" && *available));
    }

    #[test]
    fn test_intra_threads_resolution() {
        assert_eq!(resolve_intra_threads(3), 3);
        assert!(resolve_intra_threads(0) >= 1);
    }
}
