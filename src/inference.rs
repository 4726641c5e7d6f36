//! Inference engine abstraction and backend factory

use crate::config::{BackendType, RunConfig};
use crate::error::{InferError, Result};
use crate::tensor::{TensorData, TensorInfo};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// A loaded model session that maps input tensors to output tensors
pub trait InferenceBackend {
    /// Load the model named by `config` and prepare it for invocation
    ///
    /// Returns the time spent loading.
    ///
    /// # Errors
    /// - Model file missing or unparsable
    /// - Requested delegate unavailable or rejecting its options
    /// - Session creation failures
    fn load(&mut self, config: &RunConfig) -> Result<Duration>;

    /// Declared input tensors, in model order
    fn input_tensors(&self) -> &[TensorInfo];

    /// Declared output tensors, in model order
    fn output_tensors(&self) -> &[TensorInfo];

    /// Run a forward pass
    ///
    /// # Errors
    /// - Backend not loaded
    /// - Input count or byte size not matching the model
    /// - Engine inference failures
    fn invoke(&mut self, inputs: &[TensorData]) -> Result<Vec<TensorData>>;

    /// Check if a model has been loaded
    fn is_loaded(&self) -> bool;

    /// Short engine name used in logs and reports
    fn name(&self) -> &'static str;
}

/// Creates backends by engine type
pub trait BackendFactory: Send + Sync {
    /// Create an unloaded backend instance of the given type
    ///
    /// # Errors
    /// - Engine not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>>;

    /// List engines this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the engines enabled by cargo features
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::new())),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(InferError::invalid_config(format!(
                "{other} backend is not enabled in this build"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}
