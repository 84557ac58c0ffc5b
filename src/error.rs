//! Error types for segmentation and compositing operations

use thiserror::Error;

/// Result type alias for noback operations
pub type Result<T> = std::result::Result<T, NoBackError>;

/// Error types for model loading, image processing and request handling
#[derive(Error, Debug)]
pub enum NoBackError {
    /// Input/output errors (file not found, missing directory, permission denied)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors, including unexpected output shapes
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Pipeline stage errors (mask extraction, compositing)
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NoBackError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create image loading error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_display = path.as_ref().display();
        let extension = path
            .as_ref()
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");

        Self::Image(image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Failed to load image '{}' (extension: {}): {}",
                path_display, extension, error
            ),
        )))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = NoBackError::invalid_config("test config error");
        assert!(matches!(err, NoBackError::InvalidConfig(_)));

        let err = NoBackError::inference("bad shape");
        assert!(matches!(err, NoBackError::Inference(_)));
    }

    #[test]
    fn test_error_display() {
        let err = NoBackError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory");
        let err = NoBackError::file_io_error(
            "write upload",
            Path::new("uploads/input_image.jpg"),
            &io_error,
        );
        let error_string = err.to_string();
        assert!(error_string.contains("write upload"));
        assert!(error_string.contains("uploads/input_image.jpg"));

        let err = NoBackError::model_error_with_context(
            "load",
            Path::new("back_removal.onnx"),
            "file not found",
            &["export the Keras model to ONNX", "pass --model"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("back_removal.onnx"));
        assert!(error_string.contains("Suggestions"));

        let err = NoBackError::config_value_error("mask threshold", 1.5, "0.0-1.0", Some(0.5));
        let error_string = err.to_string();
        assert!(error_string.contains("mask threshold"));
        assert!(error_string.contains("1.5"));
        assert!(error_string.contains("Recommended: 0.5"));

        let err =
            NoBackError::processing_stage_error("mask extraction", "bad layout", Some("1x3x64x64"));
        let error_string = err.to_string();
        assert!(error_string.contains("mask extraction"));
        assert!(error_string.contains("1x3x64x64"));
    }

    #[test]
    fn test_image_load_error_mentions_extension() {
        let inner = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "garbage",
        ));
        let err = NoBackError::image_load_error(Path::new("uploads/input_image.jpg"), &inner);
        assert!(matches!(err, NoBackError::Image(_)));
        assert!(err.to_string().contains("extension: jpg"));
    }
}
