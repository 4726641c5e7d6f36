//! In-memory backend for exercising the pipeline without a model file
//!
//! [`MockBackend`] declares whatever tensors a test needs and computes its
//! outputs with a closure, so shape handling, pixel conversion and error paths
//! can be driven deterministically. Loading never touches the filesystem.

use crate::{
    config::{BackendType, RunConfig},
    error::{InferError, Result},
    inference::{BackendFactory, InferenceBackend},
    tensor::{TensorData, TensorInfo},
};
use instant::Duration;
use std::sync::{Arc, Mutex};

type Transform = Arc<dyn Fn(&[TensorData]) -> Result<Vec<TensorData>> + Send + Sync>;

/// Scriptable backend with recorded call history
#[derive(Clone)]
pub struct MockBackend {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    transform: Transform,
    loaded: bool,
    load_error: Option<String>,
    invoke_error: Option<String>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Backend with the given tensors whose outputs are computed by `transform`
    pub fn new<F>(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>, transform: F) -> Self
    where
        F: Fn(&[TensorData]) -> Result<Vec<TensorData>> + Send + Sync + 'static,
    {
        Self {
            inputs,
            outputs,
            transform: Arc::new(transform),
            loaded: false,
            load_error: None,
            invoke_error: None,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// One input, one output of the same description; outputs echo the inputs
    #[must_use]
    pub fn identity(tensor: TensorInfo) -> Self {
        let mut output = tensor.clone();
        output.name = format!("{}_out", tensor.name);
        Self::new(vec![tensor], vec![output], |inputs| Ok(inputs.to_vec()))
    }

    /// Fail every `load` call with a model load error
    #[must_use]
    pub fn failing_load<S: Into<String>>(mut self, message: S) -> Self {
        self.load_error = Some(message.into());
        self
    }

    /// Fail every `invoke` call with an inference error
    #[must_use]
    pub fn failing_invoke<S: Into<String>>(mut self, message: S) -> Self {
        self.invoke_error = Some(message.into());
        self
    }

    /// Methods called so far, shared between clones
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }
}

impl InferenceBackend for MockBackend {
    fn load(&mut self, config: &RunConfig) -> Result<Duration> {
        self.record_call("load");

        if let Some(message) = &self.load_error {
            return Err(InferError::model_load(&config.model_path, message.clone()));
        }

        log::debug!(
            "Mock backend loaded '{}' with {} input(s), {} output(s)",
            config.model_path.display(),
            self.inputs.len(),
            self.outputs.len()
        );
        self.loaded = true;
        Ok(Duration::from_millis(1))
    }

    fn input_tensors(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn output_tensors(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn invoke(&mut self, inputs: &[TensorData]) -> Result<Vec<TensorData>> {
        self.record_call("invoke");

        if !self.loaded {
            return Err(InferError::interpreter("Backend not loaded"));
        }
        if let Some(message) = &self.invoke_error {
            return Err(InferError::inference(message.clone()));
        }
        if inputs.len() != self.inputs.len() {
            return Err(InferError::inference(format!(
                "model takes {} input(s), got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }

        (self.transform)(inputs)
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Factory handing out clones of a prepared [`MockBackend`]
#[derive(Debug, Clone)]
pub struct MockBackendFactory {
    backend: MockBackend,
}

impl MockBackendFactory {
    #[must_use]
    pub fn new(backend: MockBackend) -> Self {
        Self { backend }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend>> {
        Ok(Box::new(self.backend.clone()))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Onnx, BackendType::Tract]
    }
}
