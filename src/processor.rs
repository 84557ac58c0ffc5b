//! Segmentation pipeline
//!
//! `SegmentationPipeline` owns the loaded model and runs the whole
//! resize → infer → threshold → composite sequence for one image. The HTTP
//! layer and the benchmarks both drive it through the same entry points.

use crate::{
    config::ServerConfig,
    error::{NoBackError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager},
    services::ImageIOService,
    types::{
        add_layers, solid_background, BinaryMask, CompositeResult, ProbabilityMap,
        ProcessingTimings,
    },
    utils::ImagePreprocessor,
};
use image::DynamicImage;
use instant::{Duration, Instant};
use log::{debug, info};
use ndarray::{Array2, Array4};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Level};

/// Colour of the layer that replaces the background
pub const BACKGROUND_COLOR: [u8; 3] = [0, 0, 0];

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackendType {
    /// Tract backend (pure Rust, no external dependencies)
    #[default]
    Tract,
    /// ONNX Runtime backend (supports GPU acceleration)
    Onnx,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend not compiled into this build
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the backends enabled through cargo features
pub struct DefaultBackendFactory;

impl DefaultBackendFactory {
    #[cfg(feature = "tract")]
    fn create_tract(model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(crate::backends::TractBackend::with_model_manager(
            model_manager,
        )))
    }

    #[cfg(not(feature = "tract"))]
    fn create_tract(_model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Err(NoBackError::invalid_config(
            "Tract backend not available. Rebuild with the 'tract' feature.",
        ))
    }

    #[cfg(feature = "onnx")]
    fn create_onnx(model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
            model_manager,
        )))
    }

    #[cfg(not(feature = "onnx"))]
    fn create_onnx(_model_manager: ModelManager) -> Result<Box<dyn InferenceBackend>> {
        Err(NoBackError::invalid_config(
            "ONNX backend not available. Rebuild with the 'onnx' feature.",
        ))
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            BackendType::Tract => Self::create_tract(model_manager),
            BackendType::Onnx => Self::create_onnx(model_manager),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        if cfg!(feature = "tract") {
            backends.push(BackendType::Tract);
        }
        if cfg!(feature = "onnx") {
            backends.push(BackendType::Onnx);
        }
        backends
    }
}

/// Loaded model plus the fixed-path processing pipeline
pub struct SegmentationPipeline {
    config: ServerConfig,
    backend: Box<dyn InferenceBackend>,
    model_load_time: Option<Duration>,
}

impl std::fmt::Debug for SegmentationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationPipeline")
            .field("backend_type", &self.config.backend_type)
            .field("model_path", &self.config.model_path)
            .field("initialized", &self.backend.is_initialized())
            .finish_non_exhaustive()
    }
}

impl SegmentationPipeline {
    /// Create a pipeline around an existing backend and initialize it
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Backend initialization failures
    pub fn new(config: ServerConfig, mut backend: Box<dyn InferenceBackend>) -> Result<Self> {
        config.validate()?;
        let model_load_time = backend.initialize(&config)?;

        if let Some(load_time) = model_load_time {
            info!(
                "Segmentation model ready in {}ms ({} backend)",
                load_time.as_millis(),
                config.backend_type
            );
        }

        Ok(Self {
            config,
            backend,
            model_load_time,
        })
    }

    /// Load the model from `config.model_path` and build the configured backend
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model file missing, empty or unreadable
    /// - Backend not compiled in or failing to initialize
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Same as [`SegmentationPipeline::from_config`] with a custom backend factory
    ///
    /// # Errors
    /// - See [`SegmentationPipeline::from_config`]
    pub fn with_factory(config: ServerConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;

        debug!("Loading model from {}", config.model_path.display());
        debug!("Backend type: {}", config.backend_type);
        debug!("Execution provider: {}", config.execution_provider);

        let model_manager =
            ModelManager::from_path(&config.model_path)?.with_pixel_scale(config.pixel_scale);
        let backend = factory.create_backend(config.backend_type, model_manager)?;
        Self::new(config, backend)
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Time spent loading the model, if this pipeline loaded it
    #[must_use]
    pub fn model_load_time(&self) -> Option<Duration> {
        self.model_load_time
    }

    /// Model metadata reported by the backend
    ///
    /// # Errors
    /// - Backend has no model information
    pub fn model_info(&self) -> Result<ModelInfo> {
        self.backend.get_model_info()
    }

    /// Save an upload to the fixed upload path, process it, and write the
    /// result to the fixed output path
    ///
    /// Both files are overwritten on every call.
    ///
    /// # Errors
    /// - Upload directory missing or not writable
    /// - Upload is not a decodable image
    /// - Inference or compositing failures
    /// - Output directory missing or not writable
    pub fn process_upload(&mut self, bytes: &[u8]) -> Result<CompositeResult> {
        let upload_path = self.config.upload_path();
        let output_path = self.config.output_path();

        ImageIOService::save_upload(bytes, &upload_path)?;
        self.process_file(&upload_path, &output_path)
    }

    /// Process an image file and write the composite to `output_path` as JPEG
    ///
    /// # Errors
    /// - Input missing or not a decodable image
    /// - Inference or compositing failures
    /// - Output directory missing or not writable
    #[instrument(skip(self, input_path, output_path), fields(input = %input_path.as_ref().display()))]
    pub fn process_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input_path: P,
        output_path: Q,
    ) -> Result<CompositeResult> {
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let image = ImageIOService::load_image(input_path.as_ref())?;
        let decode_ms = elapsed_ms(decode_start);

        let mut result = self.process_image(&image)?;

        let encode_start = Instant::now();
        result.save_jpeg(output_path.as_ref(), self.config.jpeg_quality)?;

        result.timings.image_decode_ms = decode_ms;
        result.timings.image_encode_ms = Some(elapsed_ms(encode_start));
        result.timings.total_ms = elapsed_ms(total_start);

        trace_info!(
            output = %output_path.as_ref().display(),
            total_ms = result.timings.total_ms,
            "Composite written"
        );
        debug!("{}", result.timing_summary());

        Ok(result)
    }

    /// Segment a decoded image and replace its background with black
    ///
    /// The returned composite has the same dimensions as `image`.
    ///
    /// # Errors
    /// - Empty image
    /// - Inference failures or unexpected output shape
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<CompositeResult> {
        let mut timings = ProcessingTimings::new();
        let total_start = Instant::now();
        let original_dimensions = (image.width(), image.height());

        let probabilities = self.predict_with_timings(image, &mut timings)?;

        let (mask, composite) = {
            let _span = span!(
                Level::DEBUG,
                "compositing",
                width = %original_dimensions.0,
                height = %original_dimensions.1
            )
            .entered();
            let postprocess_start = Instant::now();

            let mask = self.mask_from_probabilities(&probabilities, original_dimensions)?;
            let foreground = mask.apply_to_image(&image.to_rgb8())?;
            let background =
                solid_background(original_dimensions.0, original_dimensions.1, BACKGROUND_COLOR);
            let composite = add_layers(&foreground, &background)?;

            timings.postprocessing_ms = elapsed_ms(postprocess_start);
            (mask, composite)
        };

        timings.total_ms = elapsed_ms(total_start);

        if self.config.debug {
            let stats = mask.statistics();
            info!(
                "Mask {}x{}: {} foreground / {} background pixels ({:.1}% foreground)",
                mask.dimensions.0,
                mask.dimensions.1,
                stats.foreground_pixels,
                stats.background_pixels,
                stats.foreground_ratio * 100.0
            );
        }

        Ok(CompositeResult::new(
            composite,
            mask,
            original_dimensions,
            timings,
        ))
    }

    /// Binary foreground mask at the image's original resolution
    ///
    /// # Errors
    /// - Empty image
    /// - Inference failures or unexpected output shape
    pub fn segment(&mut self, image: &DynamicImage) -> Result<BinaryMask> {
        let mut timings = ProcessingTimings::new();
        let probabilities = self.predict_with_timings(image, &mut timings)?;
        self.mask_from_probabilities(&probabilities, (image.width(), image.height()))
    }

    /// Foreground probabilities at model resolution
    ///
    /// # Errors
    /// - Empty image
    /// - Inference failures or unexpected output shape
    pub fn predict(&mut self, image: &DynamicImage) -> Result<ProbabilityMap> {
        let mut timings = ProcessingTimings::new();
        self.predict_with_timings(image, &mut timings)
    }

    fn predict_with_timings(
        &mut self,
        image: &DynamicImage,
        timings: &mut ProcessingTimings,
    ) -> Result<ProbabilityMap> {
        let input_tensor = {
            let _span = span!(
                Level::DEBUG,
                "preprocessing",
                original_width = %image.width(),
                original_height = %image.height()
            )
            .entered();
            let preprocess_start = Instant::now();

            let mut preprocessing_config = self.backend.get_preprocessing_config()?;
            preprocessing_config.pixel_scale = self.config.pixel_scale;
            let tensor = ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;

            timings.preprocessing_ms = elapsed_ms(preprocess_start);
            tensor
        };

        let output_tensor = {
            let _span = span!(
                Level::INFO,
                "inference",
                backend = %self.config.backend_type
            )
            .entered();
            let inference_start = Instant::now();

            let output = self.backend.infer(&input_tensor)?;

            timings.inference_ms = elapsed_ms(inference_start);
            output
        };

        if self.config.debug {
            info!(
                "Input tensor {:?} -> output tensor {:?}",
                input_tensor.shape(),
                output_tensor.shape()
            );
        }

        Self::extract_probability_map(&output_tensor)
    }

    fn mask_from_probabilities(
        &self,
        probabilities: &ProbabilityMap,
        (width, height): (u32, u32),
    ) -> Result<BinaryMask> {
        let mask = BinaryMask::from_probabilities(probabilities, self.config.mask_threshold);
        trace_debug!(
            threshold = self.config.mask_threshold,
            foreground_ratio = mask.statistics().foreground_ratio,
            "Thresholded probability map"
        );
        mask.resize(width, height)
    }

    /// Take batch element 0 and its single channel from the model output
    ///
    /// NHWC `(N, H, W, 1)` is the native layout; NCHW `(N, 1, H, W)` is also
    /// accepted.
    ///
    /// # Errors
    /// - Empty batch or spatial dimensions
    /// - More than one output channel
    pub fn extract_probability_map(tensor: &Array4<f32>) -> Result<ProbabilityMap> {
        let (batch, d1, d2, d3) = tensor.dim();
        let shape_info = format!("{batch}x{d1}x{d2}x{d3}");

        if batch == 0 {
            return Err(NoBackError::inference(format!(
                "Model output has an empty batch ({shape_info})"
            )));
        }

        let data = if d3 == 1 && d1 > 0 && d2 > 0 {
            Array2::from_shape_fn((d1, d2), |(y, x)| tensor[[0, y, x, 0]])
        } else if d1 == 1 && d2 > 0 && d3 > 0 {
            Array2::from_shape_fn((d2, d3), |(y, x)| tensor[[0, 0, y, x]])
        } else {
            return Err(NoBackError::inference(format!(
                "Expected a single-channel probability map (N,H,W,1) or (N,1,H,W), got {shape_info}"
            )));
        };

        Ok(ProbabilityMap::new(data))
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use image::{Rgb, RgbImage};

    fn pipeline_with(backend: MockBackend) -> SegmentationPipeline {
        SegmentationPipeline::new(ServerConfig::default(), Box::new(backend)).unwrap()
    }

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 200])
        }))
    }

    #[test]
    fn test_backend_type_display_and_default() {
        assert_eq!(BackendType::default(), BackendType::Tract);
        assert_eq!(BackendType::Tract.to_string(), "tract");
        assert_eq!(BackendType::Onnx.to_string(), "onnx");
    }

    #[test]
    fn test_default_factory_reports_enabled_backends() {
        let factory = DefaultBackendFactory;
        let backends = factory.available_backends();
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_disabled_backend_is_config_error() {
        let manager = ModelManager::from_bytes("m.onnx", vec![1]).unwrap();
        let result = DefaultBackendFactory.create_backend(BackendType::Onnx, manager);
        assert!(matches!(result, Err(NoBackError::InvalidConfig(_))));
    }

    #[test]
    fn test_from_config_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder()
            .model_path(dir.path().join("back_removal.onnx"))
            .build()
            .unwrap();
        let err = SegmentationPipeline::from_config(config).unwrap_err();
        assert!(matches!(err, NoBackError::Model(_)));
    }

    #[test]
    fn test_new_initializes_backend() {
        let pipeline = pipeline_with(MockBackend::new());
        assert!(pipeline.model_load_time().is_some());
        assert_eq!(pipeline.model_info().unwrap().name, "mock");
    }

    #[test]
    fn test_output_matches_input_dimensions() {
        let mut pipeline = pipeline_with(MockBackend::new());
        let result = pipeline.process_image(&gradient_image(300, 200)).unwrap();

        assert_eq!(result.dimensions(), (300, 200));
        assert_eq!(result.original_dimensions, (300, 200));
        assert_eq!(result.mask.dimensions, (300, 200));
    }

    #[test]
    fn test_background_is_black_and_foreground_kept() {
        let mut pipeline = pipeline_with(MockBackend::new());
        let image = gradient_image(128, 128);
        let result = pipeline.process_image(&image).unwrap();

        // Corner is outside the mock's centred block
        assert_eq!(result.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        // Centre pixel is foreground and unchanged
        assert_eq!(result.image.get_pixel(64, 64), image.to_rgb8().get_pixel(64, 64));
    }

    #[test]
    fn test_threshold_boundary_is_background() {
        let mut pipeline = pipeline_with(MockBackend::constant(0.5));
        let result = pipeline.process_image(&gradient_image(20, 10)).unwrap();
        assert!(result.mask.data.iter().all(|&v| v == 0));
        assert!(result.image.pixels().all(|p| *p == Rgb([0, 0, 0])));

        let mut pipeline = pipeline_with(MockBackend::constant(0.51));
        let mask = pipeline.segment(&gradient_image(20, 10)).unwrap();
        assert!(mask.data.iter().all(|&v| v == 1));
    }

    #[test]
    fn test_results_are_deterministic() {
        let mut pipeline = pipeline_with(MockBackend::new());
        let image = gradient_image(97, 61);
        let first = pipeline.process_image(&image).unwrap();
        let second = pipeline.process_image(&image).unwrap();
        assert_eq!(first.mask, second.mask);
        assert_eq!(first.image, second.image);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let mut pipeline = pipeline_with(MockBackend::failing());
        let err = pipeline.process_image(&gradient_image(10, 10)).unwrap_err();
        assert!(matches!(err, NoBackError::Inference(_)));
    }

    #[test]
    fn test_extract_probability_map_layouts() {
        let nhwc = Array4::from_shape_fn((1, 4, 6, 1), |(_, y, x, _)| (y * 10 + x) as f32);
        let map = SegmentationPipeline::extract_probability_map(&nhwc).unwrap();
        assert_eq!(map.dimensions(), (6, 4));
        assert!((map.data[[2, 3]] - 23.0).abs() < f32::EPSILON);

        let nchw = Array4::from_shape_fn((1, 1, 4, 6), |(_, _, y, x)| (y * 10 + x) as f32);
        let map = SegmentationPipeline::extract_probability_map(&nchw).unwrap();
        assert_eq!(map.dimensions(), (6, 4));
        assert!((map.data[[3, 5]] - 35.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_extract_probability_map_rejects_bad_shapes() {
        let multi_channel = Array4::<f32>::zeros((1, 64, 64, 3));
        assert!(matches!(
            SegmentationPipeline::extract_probability_map(&multi_channel),
            Err(NoBackError::Inference(_))
        ));

        let empty = Array4::<f32>::zeros((0, 64, 64, 1));
        assert!(SegmentationPipeline::extract_probability_map(&empty).is_err());
    }

    #[test]
    fn test_unexpected_model_output_is_error() {
        let backend = MockBackend::new().with_output_shape((1, 64, 64, 2));
        let mut pipeline = pipeline_with(backend);
        assert!(pipeline.process_image(&gradient_image(8, 8)).is_err());
    }

    #[test]
    fn test_process_upload_writes_fixed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("NoBackImages"))
            .create_dirs(true)
            .build()
            .unwrap();
        ImageIOService::ensure_dirs(&[&config.upload_dir, &config.output_dir]).unwrap();

        let mut bytes = Vec::new();
        gradient_image(300, 200)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let mut pipeline = SegmentationPipeline::new(config.clone(), Box::new(MockBackend::new())).unwrap();
        let result = pipeline.process_upload(&bytes).unwrap();

        assert!(config.upload_path().is_file());
        assert!(config.output_path().is_file());
        assert!(result.timings.image_encode_ms.is_some());

        let written = image::open(config.output_path()).unwrap();
        assert_eq!((written.width(), written.height()), (300, 200));
    }

    #[test]
    fn test_process_upload_missing_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("NoBackImages"))
            .build()
            .unwrap();
        let backend = MockBackend::new();
        let invocations = backend.invocation_counter();
        let mut pipeline = SegmentationPipeline::new(config, Box::new(backend)).unwrap();

        assert!(matches!(
            pipeline.process_upload(b"anything"),
            Err(NoBackError::Io(_))
        ));
        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
