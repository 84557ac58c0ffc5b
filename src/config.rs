//! Configuration types for the segmentation server

use crate::processor::BackendType;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default port the server binds to
pub const DEFAULT_PORT: u16 = 5001;

/// URL prefix under which the composited result is served
pub const OUTPUT_ROUTE_PREFIX: &str = "/NoBackImages";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Configuration for the server and its image pipeline
///
/// Defaults reproduce the fixed layout the service has always used: model at
/// `back_removal.onnx`, uploads in `uploads/input_image.jpg`, results in
/// `NoBackImages/output_image.jpg`, port 5001.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,

    /// Path to the trained segmentation model (ONNX)
    pub model_path: PathBuf,

    /// Inference backend
    pub backend_type: BackendType,

    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Directory the upload is written into
    pub upload_dir: PathBuf,

    /// File name of the saved upload
    pub upload_filename: String,

    /// Directory the composited result is written into
    pub output_dir: PathBuf,

    /// File name of the composited result
    pub output_filename: String,

    /// Probabilities strictly above this value are foreground
    pub mask_threshold: f32,

    /// Multiplier applied to 0-255 pixel values before inference
    pub pixel_scale: f32,

    /// JPEG quality for the result (1-100)
    pub jpeg_quality: u8,

    /// Maximum accepted request body size in bytes
    pub max_upload_bytes: usize,

    /// Create the upload and output directories at startup
    pub create_dirs: bool,

    /// Enable debug mode (verbose logging of intermediate shapes)
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            model_path: PathBuf::from("back_removal.onnx"),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            upload_dir: PathBuf::from("uploads"),
            upload_filename: "input_image.jpg".to_string(),
            output_dir: PathBuf::from("NoBackImages"),
            output_filename: "output_image.jpg".to_string(),
            mask_threshold: 0.5,
            pixel_scale: 1.0,
            jpeg_quality: 90,
            max_upload_bytes: 16 * 1024 * 1024,
            create_dirs: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use noback::ServerConfig;
    ///
    /// let config = ServerConfig::builder()
    ///     .port(8080)
    ///     .mask_threshold(0.6)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.port, 8080);
    /// ```
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Full path of the saved upload
    #[must_use]
    pub fn upload_path(&self) -> PathBuf {
        self.upload_dir.join(&self.upload_filename)
    }

    /// Full path of the composited result
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_filename)
    }

    /// URL path under which the composited result is served
    #[must_use]
    pub fn output_url(&self) -> String {
        format!("{}/{}", OUTPUT_ROUTE_PREFIX, self.output_filename)
    }

    /// Socket address assembled from `host` and `port`
    ///
    /// # Errors
    /// - `host` is not a valid IP address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                crate::error::NoBackError::invalid_config(format!(
                    "Invalid bind address '{}:{}': {}",
                    self.host, self.port, e
                ))
            })
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Empty host or model path
    /// - File names that are empty or contain path separators
    /// - Mask threshold outside 0.0-1.0
    /// - Non-positive pixel scale
    /// - JPEG quality outside 1-100
    /// - Zero upload limit
    ///
    /// # Examples
    /// ```rust
    /// use noback::ServerConfig;
    ///
    /// let mut config = ServerConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.mask_threshold = 1.5;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.trim().is_empty() {
            return Err(crate::error::NoBackError::invalid_config(
                "Host must not be empty",
            ));
        }

        if self.model_path.as_os_str().is_empty() {
            return Err(crate::error::NoBackError::invalid_config(
                "Model path must not be empty",
            ));
        }

        validate_file_name("upload file name", &self.upload_filename)?;
        validate_file_name("output file name", &self.output_filename)?;

        if !self.mask_threshold.is_finite() || !(0.0..=1.0).contains(&self.mask_threshold) {
            return Err(crate::error::NoBackError::config_value_error(
                "mask threshold",
                self.mask_threshold,
                "0.0-1.0",
                Some(0.5),
            ));
        }

        if !self.pixel_scale.is_finite() || self.pixel_scale <= 0.0 {
            return Err(crate::error::NoBackError::config_value_error(
                "pixel scale",
                self.pixel_scale,
                "> 0.0",
                Some(1.0),
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(crate::error::NoBackError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(90),
            ));
        }

        if self.max_upload_bytes == 0 {
            return Err(crate::error::NoBackError::invalid_config(
                "Maximum upload size must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn validate_file_name(parameter: &str, name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::error::NoBackError::invalid_config(format!(
            "{parameter} must not be empty"
        )));
    }
    let mut components = Path::new(name).components();
    let is_plain = matches!(
        (components.next(), components.next()),
        (Some(std::path::Component::Normal(_)), None)
    );
    if !is_plain {
        return Err(crate::error::NoBackError::invalid_config(format!(
            "{parameter} must be a plain file name, got '{name}'"
        )));
    }
    Ok(())
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model_path = path.into();
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn upload_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    #[must_use]
    pub fn upload_filename<S: Into<String>>(mut self, name: S) -> Self {
        self.config.upload_filename = name.into();
        self
    }

    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn output_filename<S: Into<String>>(mut self, name: S) -> Self {
        self.config.output_filename = name.into();
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: f32) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    #[must_use]
    pub fn pixel_scale(mut self, scale: f32) -> Self {
        self.config.pixel_scale = scale;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn create_dirs(mut self, create: bool) -> Self {
        self.config.create_dirs = create;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`ServerConfig::validate`]
    pub fn build(self) -> crate::Result<ServerConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
