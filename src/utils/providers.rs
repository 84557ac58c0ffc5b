//! Backend and execution provider parsing
//!
//! Provider strings take the form `backend:provider` (`onnx:auto`,
//! `tract:cpu`) or a bare backend name.

use crate::{
    config::ExecutionProvider,
    error::{NoBackError, Result},
    processor::BackendType,
};

/// Information about a backend/provider combination
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse execution provider string in format "backend:provider"
    ///
    /// # Examples
    /// ```rust
    /// use noback::utils::ExecutionProviderManager;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda")?;
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// - Unknown backend name
    /// - Provider not supported by the backend
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_lowercase();

        let Some((backend, provider)) = normalized.split_once(':') else {
            return match normalized.as_str() {
                "onnx" => Ok((
                    BackendType::Onnx,
                    Self::default_provider_for_backend(BackendType::Onnx),
                )),
                "tract" => Ok((
                    BackendType::Tract,
                    Self::default_provider_for_backend(BackendType::Tract),
                )),
                _ => Err(NoBackError::invalid_config(format!(
                    "Invalid provider '{provider_str}'. Use backend:provider (e.g., onnx:auto, tract:cpu)"
                ))),
            };
        };

        match backend {
            "onnx" => {
                let execution_provider = match provider {
                    "auto" => ExecutionProvider::Auto,
                    "cpu" => ExecutionProvider::Cpu,
                    "cuda" => ExecutionProvider::Cuda,
                    "coreml" => ExecutionProvider::CoreMl,
                    _ => {
                        return Err(NoBackError::invalid_config(format!(
                            "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                        )));
                    },
                };
                Ok((BackendType::Onnx, execution_provider))
            },
            "tract" => match provider {
                "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(NoBackError::invalid_config(format!(
                    "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
                ))),
            },
            _ => Err(NoBackError::invalid_config(format!(
                "Unknown backend: {backend}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// All provider combinations with availability in this build
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;
            let availability: std::collections::HashMap<String, bool> =
                OnnxBackend::list_providers()
                    .into_iter()
                    .map(|(name, available, _)| (name.to_lowercase(), available))
                    .collect();
            let auto_available = availability.values().any(|&available| available);

            for (provider, available) in [
                (ExecutionProvider::Auto, auto_available),
                (
                    ExecutionProvider::Cpu,
                    availability.get("cpu").copied().unwrap_or(false),
                ),
                (
                    ExecutionProvider::Cuda,
                    availability.get("cuda").copied().unwrap_or(false),
                ),
                (
                    ExecutionProvider::CoreMl,
                    availability.get("coreml").copied().unwrap_or(false),
                ),
            ] {
                providers.push(Self::onnx_info(provider, available, ""));
            }
        }

        #[cfg(not(feature = "onnx"))]
        for provider in [
            ExecutionProvider::Auto,
            ExecutionProvider::Cpu,
            ExecutionProvider::Cuda,
            ExecutionProvider::CoreMl,
        ] {
            providers.push(Self::onnx_info(provider, false, " (feature disabled)"));
        }

        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: cfg!(feature = "tract"),
            description: if cfg!(feature = "tract") {
                "Pure Rust CPU inference via Tract".to_string()
            } else {
                "Pure Rust CPU inference via Tract (feature disabled)".to_string()
            },
        });

        providers
    }

    fn onnx_info(provider: ExecutionProvider, available: bool, suffix: &str) -> ProviderInfo {
        let description = match provider {
            ExecutionProvider::Auto => "ONNX Runtime with auto-selected provider",
            ExecutionProvider::Cpu => "ONNX Runtime CPU execution",
            ExecutionProvider::Cuda => "ONNX Runtime CUDA GPU acceleration",
            ExecutionProvider::CoreMl => "ONNX Runtime CoreML (Apple Silicon) acceleration",
        };
        ProviderInfo {
            name: Self::provider_to_string(BackendType::Onnx, provider),
            backend_type: BackendType::Onnx,
            execution_provider: provider,
            available,
            description: format!("{description}{suffix}"),
        }
    }

    /// Default provider for a backend type
    #[must_use]
    pub fn default_provider_for_backend(backend_type: BackendType) -> ExecutionProvider {
        match backend_type {
            BackendType::Onnx => ExecutionProvider::Auto,
            BackendType::Tract => ExecutionProvider::Cpu,
        }
    }

    /// Convert backend type and execution provider back to a provider string
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }
}
