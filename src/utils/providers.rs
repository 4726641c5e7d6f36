//! Backend and execution provider selection
//!
//! Providers are named `backend:provider` (`onnx:cuda`, `tract:cpu`); a bare
//! backend name selects that backend's default provider.

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{InferError, Result},
};

/// Every selectable backend/provider pair with its description
const PROVIDERS: &[(BackendType, ExecutionProvider, &str)] = &[
    (
        BackendType::Onnx,
        ExecutionProvider::Auto,
        "ONNX Runtime with the best available delegate",
    ),
    (BackendType::Onnx, ExecutionProvider::Cpu, "ONNX Runtime on the CPU, no delegate"),
    (
        BackendType::Onnx,
        ExecutionProvider::Cuda,
        "ONNX Runtime with the CUDA GPU delegate",
    ),
    (
        BackendType::Onnx,
        ExecutionProvider::CoreMl,
        "ONNX Runtime with the CoreML (Apple Silicon) delegate",
    ),
    (BackendType::Tract, ExecutionProvider::Cpu, "Pure Rust CPU inference via Tract"),
];

/// Information about an execution provider
#[derive(Debug, Clone, serde::Serialize)]
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
    /// Parse a provider string in format `backend:provider` or `backend`
    ///
    /// # Errors
    /// - Unknown backend, or provider not offered by that backend
    ///
    /// # Examples
    /// ```rust
    /// use image_infer::config::{BackendType, ExecutionProvider};
    /// use image_infer::utils::ExecutionProviderManager;
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cuda").unwrap();
    /// assert_eq!(backend, BackendType::Onnx);
    /// assert_eq!(provider, ExecutionProvider::Cuda);
    /// ```
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let (backend_str, provider) = match provider_str.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (provider_str, None),
        };

        let backend_type = match backend_str {
            "onnx" => BackendType::Onnx,
            "tract" => BackendType::Tract,
            other => {
                return Err(InferError::argument(format!(
                    "Unknown backend: {other}. Supported backends: onnx, tract"
                )))
            },
        };

        let Some(provider) = provider else {
            return Ok((backend_type, Self::default_provider_for_backend(backend_type)));
        };

        PROVIDERS
            .iter()
            .find(|(backend, execution_provider, _)| {
                *backend == backend_type && execution_provider.to_string() == provider
            })
            .map(|(backend, execution_provider, _)| (*backend, *execution_provider))
            .ok_or_else(|| {
                let supported: Vec<String> = PROVIDERS
                    .iter()
                    .filter(|(backend, _, _)| *backend == backend_type)
                    .map(|(_, execution_provider, _)| execution_provider.to_string())
                    .collect();
                InferError::argument(format!(
                    "Unknown {backend_type} provider: {provider}. Supported: {}",
                    supported.join(", ")
                ))
            })
    }

    /// Default provider for a backend
    #[must_use]
    pub fn default_provider_for_backend(backend_type: BackendType) -> ExecutionProvider {
        match backend_type {
            BackendType::Onnx => ExecutionProvider::Auto,
            BackendType::Tract => ExecutionProvider::Cpu,
        }
    }

    /// Render a backend/provider pair as `backend:provider`
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }

    /// List all backend/provider pairs with availability in this build
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let onnx = Self::onnx_availability();
        let tract_available = Self::tract_available();

        PROVIDERS
            .iter()
            .map(|&(backend_type, execution_provider, description)| {
                let available = match backend_type {
                    BackendType::Onnx => onnx
                        .iter()
                        .find(|(provider, _)| *provider == execution_provider)
                        .is_some_and(|(_, available)| *available),
                    BackendType::Tract => tract_available,
                };
                let compiled_in = match backend_type {
                    BackendType::Onnx => cfg!(feature = "onnx"),
                    BackendType::Tract => cfg!(feature = "tract"),
                };
                ProviderInfo {
                    name: Self::provider_to_string(backend_type, execution_provider),
                    backend_type,
                    execution_provider,
                    available,
                    description: if compiled_in {
                        description.to_string()
                    } else {
                        format!("{description} (feature disabled)")
                    },
                }
            })
            .collect()
    }

    #[cfg(feature = "onnx")]
    fn onnx_availability() -> Vec<(ExecutionProvider, bool)> {
        let mut availability: Vec<(ExecutionProvider, bool)> =
            crate::backends::OnnxBackend::list_providers()
                .into_iter()
                .filter_map(|(name, available, _)| {
                    let provider = match name.to_lowercase().as_str() {
                        "cpu" => ExecutionProvider::Cpu,
                        "cuda" => ExecutionProvider::Cuda,
                        "coreml" => ExecutionProvider::CoreMl,
                        _ => return None,
                    };
                    Some((provider, available))
                })
                .collect();
        // Auto always resolves, falling back to the CPU
        availability.push((ExecutionProvider::Auto, true));
        availability
    }

    #[cfg(not(feature = "onnx"))]
    fn onnx_availability() -> Vec<(ExecutionProvider, bool)> {
        Vec::new()
    }

    fn tract_available() -> bool {
        #[cfg(feature = "tract")]
        {
            crate::backends::TractBackend::list_providers()
                .iter()
                .any(|(_, available, _)| *available)
        }
        #[cfg(not(feature = "tract"))]
        {
            false
        }
    }
}
