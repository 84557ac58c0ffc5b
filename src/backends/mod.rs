//! Backend implementations for different inference engines
//!
//! - Tract backend (pure Rust, no external dependencies)
//! - ONNX Runtime backend (GPU acceleration)
//! - Mock backend (deterministic, model-free; `test-utils` feature)

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(any(test, feature = "test-utils"))]
pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
