//! Single-image inference pipeline
//!
//! [`InferenceRunner::run`] performs one pass: load the model, check that it
//! has exactly one input and one output tensor, interpret both as images,
//! decode the input file, invoke, and encode the produced tensor. Every failure
//! aborts the run; the output file only appears when the whole pass succeeded.

use crate::{
    config::RunConfig,
    error::{InferError, Result, TensorRole},
    geometry::{classify, ImageGeometry},
    inference::{BackendFactory, DefaultBackendFactory, InferenceBackend},
    services::ImageIOService,
    tensor::{TensorData, TensorInfo},
    tracing_config::{events, spans},
};
use instant::{Duration, Instant};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub backend: String,
    pub model_path: PathBuf,
    pub output_path: PathBuf,
    pub input_geometry: ImageGeometry,
    pub output_geometry: ImageGeometry,
    pub model_load_ms: f64,
    pub inference_ms: f64,
}

/// One tensor of a loaded model and its image interpretation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorSummary {
    #[serde(flatten)]
    pub info: TensorInfo,
    /// `None` when the tensor cannot be read as an image
    pub geometry: Option<ImageGeometry>,
    /// Why the tensor cannot be read as an image
    pub problem: Option<String>,
}

impl TensorSummary {
    fn new(info: &TensorInfo, role: TensorRole) -> Self {
        let geometry = info
            .static_shape()
            .and_then(|shape| classify_shape(&shape, role));
        match geometry {
            Ok(geometry) => Self {
                info: info.clone(),
                geometry: Some(geometry),
                problem: None,
            },
            Err(e) => Self {
                info: info.clone(),
                geometry: None,
                problem: Some(e.to_string()),
            },
        }
    }
}

/// Tensors of a model, as reported by `--inspect`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub backend: String,
    pub model_path: PathBuf,
    pub model_load_ms: f64,
    pub inputs: Vec<TensorSummary>,
    pub outputs: Vec<TensorSummary>,
}

impl ModelSummary {
    /// Whether the model can be run by [`InferenceRunner::run`]
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        matches!((self.inputs.as_slice(), self.outputs.as_slice()), ([input], [_]) if input.geometry.is_some())
    }
}

/// Runs one image through one model
pub struct InferenceRunner {
    config: RunConfig,
    backend_factory: Box<dyn BackendFactory>,
}

impl std::fmt::Debug for InferenceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl InferenceRunner {
    /// Create a runner with the engines compiled into this build
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RunConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a runner with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(config: RunConfig, backend_factory: Box<dyn BackendFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `input` through the model and write the produced tensor to `output`
    ///
    /// # Errors
    /// - Model load, delegate or interpreter failures
    /// - Model without exactly one input and one output tensor
    /// - Tensor shapes that cannot be read as images
    /// - Input image missing, undecodable, or of the wrong width/height
    /// - Forward pass failures
    /// - Output encoding failures (no output file is left behind)
    #[instrument(skip_all, fields(input = %input.as_ref().display(), output = %output.as_ref().display()))]
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(&self, input: P, output: Q) -> Result<RunReport> {
        let input = input.as_ref();
        let output = output.as_ref();

        let (mut backend, model_load_time) = self.load_backend()?;

        let input_info = single_tensor(backend.input_tensors(), TensorRole::Input)?.clone();
        let output_info = single_tensor(backend.output_tensors(), TensorRole::Output)?.clone();
        info!("Input tensor: {}", input_info.name);
        input_info.describe();
        info!("Output tensor: {}", output_info.name);
        output_info.describe();

        let input_shape = input_info.static_shape()?;
        let input_geometry = classify_shape(&input_shape, TensorRole::Input)?;
        if !input_info.element_type.supports_pixels() {
            return Err(InferError::UnsupportedElementType(
                input_info.element_type.to_string(),
            ));
        }

        let declared_output = if output_info.is_static() {
            Some(classify_shape(&output_info.static_shape()?, TensorRole::Output)?)
        } else {
            debug!(
                "Output shape {} is dynamic, classifying the produced tensor",
                output_info.dims_display()
            );
            None
        };

        let input_data = {
            let _span = spans::file_processing(input, "decode").entered();
            let decoded = ImageIOService::decode(input, input_geometry.channels)?;
            if !input_geometry.matches(decoded.width, decoded.height) {
                return Err(InferError::DimensionMismatch {
                    path: input.display().to_string(),
                    expected_width: input_geometry.width,
                    expected_height: input_geometry.height,
                    actual_width: decoded.width,
                    actual_height: decoded.height,
                });
            }
            info!("Input image: {}", decoded.geometry());
            TensorData::from_pixels(
                input_shape,
                input_info.element_type.clone(),
                &decoded.pixels,
                self.config.scaling,
            )?
        };

        let (produced, inference_time) = {
            let _span = spans::inference(
                backend.name(),
                (input_geometry.width, input_geometry.height),
            )
            .entered();
            let start = Instant::now();
            let outputs = backend.invoke(std::slice::from_ref(&input_data))?;
            let inference_time = start.elapsed();
            info!(
                "Inference time: {:.2} ms",
                inference_time.as_secs_f64() * 1000.0
            );
            (single_output(outputs)?, inference_time)
        };
        drop(input_data);
        drop(backend);

        let output_geometry = classify_shape(produced.shape(), TensorRole::Output)?;
        if let Some(declared) = declared_output {
            if declared != output_geometry {
                warn!(
                    "Produced output {} differs from declared {}; using the produced shape",
                    output_geometry, declared
                );
            }
        }
        info!("Output image: {}", output_geometry);

        {
            let _span = spans::file_processing(output, "encode").entered();
            let pixels = produced.to_pixels(self.config.scaling)?;
            drop(produced);
            let format = self.config.output_format_for(output);
            ImageIOService::encode(output, output_geometry, pixels, format)?;
        }
        info!("Wrote {}", output.display());

        Ok(RunReport {
            backend: self.config.backend_type.to_string(),
            model_path: self.config.model_path.clone(),
            output_path: output.to_path_buf(),
            input_geometry,
            output_geometry,
            model_load_ms: millis(model_load_time),
            inference_ms: millis(inference_time),
        })
    }

    /// Load the model and describe its tensors without running it
    ///
    /// # Errors
    /// - Model load, delegate or interpreter failures
    pub fn inspect(&self) -> Result<ModelSummary> {
        let (backend, model_load_time) = self.load_backend()?;

        let summarize = |tensors: &[TensorInfo], role: TensorRole| -> Vec<TensorSummary> {
            tensors
                .iter()
                .map(|info| {
                    info!("{} tensor: {}", role, info.name);
                    info.describe();
                    TensorSummary::new(info, role)
                })
                .collect()
        };

        Ok(ModelSummary {
            backend: backend.name().to_string(),
            model_path: self.config.model_path.clone(),
            model_load_ms: millis(model_load_time),
            inputs: summarize(backend.input_tensors(), TensorRole::Input),
            outputs: summarize(backend.output_tensors(), TensorRole::Output),
        })
    }

    fn load_backend(&self) -> Result<(Box<dyn InferenceBackend>, Duration)> {
        let provider = format!(
            "{}:{}",
            self.config.backend_type, self.config.execution_provider
        );
        let _span = spans::model_loading(&self.config.model_path, &provider).entered();

        let mut backend = self
            .backend_factory
            .create_backend(self.config.backend_type)?;
        let model_load_time = backend.load(&self.config)?;
        events::performance_metric("model_loading", millis(model_load_time));
        info!(
            "Loaded {} with {} backend ({:.0} ms)",
            self.config.model_path.display(),
            backend.name(),
            millis(model_load_time)
        );
        Ok((backend, model_load_time))
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Enforce the single-tensor policy for one side of the model
fn single_tensor(tensors: &[TensorInfo], role: TensorRole) -> Result<&TensorInfo> {
    match tensors {
        [tensor] => Ok(tensor),
        _ => Err(InferError::TensorCount {
            role,
            actual: tensors.len(),
        }),
    }
}

fn single_output(outputs: Vec<TensorData>) -> Result<TensorData> {
    let actual = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), outputs.next()) {
        (Some(tensor), None) => Ok(tensor),
        _ => Err(InferError::TensorCount {
            role: TensorRole::Output,
            actual,
        }),
    }
}

fn classify_shape(shape: &[usize], role: TensorRole) -> Result<ImageGeometry> {
    classify(shape).map_err(|source| InferError::Classification { role, source })
}
