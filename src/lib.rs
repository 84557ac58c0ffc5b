#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # noback
//!
//! A small web service that replaces the background of a photo with black using
//! a pretrained binary segmentation model.
//!
//! The user uploads an image through a form, the server resizes a copy to the
//! model's 64x64 input, thresholds the predicted foreground probabilities into a
//! binary mask, scales the mask back up to the original resolution and keeps only
//! the foreground pixels. The composite is written as a JPEG and displayed on the
//! result page.
//!
//! ## Features
//!
//! - **Multiple Backends**: Tract (pure Rust, default) and ONNX Runtime (GPU acceleration)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Single Model Load**: the model is loaded once at startup and shared by all requests
//! - **Server Binary**: `noback-server` (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use noback::{SegmentationPipeline, ServerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServerConfig::builder()
//!     .model_path("back_removal.onnx")
//!     .port(5001)
//!     .create_dirs(true)
//!     .build()?;
//!
//! let pipeline = SegmentationPipeline::from_config(config)?;
//! noback::serve(pipeline).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Library Usage
//!
//! The pipeline also works without the HTTP layer:
//!
//! ```rust,no_run
//! use noback::{SegmentationPipeline, ServerConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut pipeline = SegmentationPipeline::from_config(ServerConfig::default())?;
//! let result = pipeline.process_file("portrait.jpg", "portrait_nobg.jpg")?;
//! println!("{}", result.timing_summary());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust backend
//! - `onnx`: ONNX Runtime backend with GPU acceleration support
//! - `cli` (default): server binary with argument parsing and log output
//! - `tracing-json`: JSON log output for the server binary

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{ExecutionProvider, ServerConfig, ServerConfigBuilder, DEFAULT_PORT};
pub use error::{NoBackError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, PreprocessingConfig};
pub use processor::{BackendFactory, BackendType, DefaultBackendFactory, SegmentationPipeline};
pub use server::{build_router, serve, AppState};
pub use services::ImageIOService;
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::{BinaryMask, CompositeResult, MaskStatistics, ProbabilityMap, ProcessingTimings};
pub use utils::{ExecutionProviderManager, ImagePreprocessor, PreprocessingOptions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_servable() {
        let config = ServerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.socket_addr().is_ok());
    }

    #[test]
    fn test_mock_pipeline_through_public_api() {
        let pipeline =
            SegmentationPipeline::new(ServerConfig::default(), Box::new(MockBackend::new()));
        assert!(pipeline.is_ok());
    }
}
