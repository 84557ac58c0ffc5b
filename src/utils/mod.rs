//! Shared utilities for preprocessing and provider selection

pub mod preprocessing;
pub mod providers;

pub use preprocessing::{ImagePreprocessor, PreprocessingOptions};
pub use providers::{ExecutionProviderManager, ProviderInfo};
