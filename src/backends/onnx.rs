//! ONNX Runtime backend
//!
//! Loads a model file into an ONNX Runtime session and optionally attaches a
//! hardware delegate (CUDA or `CoreML` execution provider). Tensor descriptors are
//! read from the session's declared inputs and outputs.

use crate::config::{DelegateOptions, ExecutionProvider, RunConfig};
use crate::error::{InferError, Result};
use crate::inference::InferenceBackend;
use crate::tensor::{ElementType, TensorData, TensorInfo};
use instant::{Duration, Instant};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::{DynValue, Tensor, ValueType};

/// Options understood by the CUDA delegate
const CUDA_OPTIONS: &[&str] = &["device_id"];
/// Options understood by the `CoreML` delegate
const COREML_OPTIONS: &[&str] = &["subgraphs"];

/// ONNX Runtime backend with optional hardware delegate
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// List ONNX Runtime execution providers with availability and description
    ///
    /// # Examples
    /// ```rust
    /// use image_infer::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{name}: {available} - {description}");
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("System: {} on {}", std::env::consts::OS, std::env::consts::ARCH);

        let cuda_available = cuda_available();
        let coreml_available = coreml_available();
        log::debug!("CUDA available: {cuda_available}, CoreML available: {coreml_available}");

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, no delegate attached".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Neural Engine and GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Resolve the requested provider into the delegates to attach
    ///
    /// # Errors
    /// - Explicitly requested delegate is not available
    /// - Delegate option unknown to the selected delegate or not parsable
    fn build_execution_providers(
        provider: ExecutionProvider,
        options: &DelegateOptions,
    ) -> Result<Vec<ExecutionProviderDispatch>> {
        let mut providers = Vec::new();

        match provider {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
            },
            ExecutionProvider::Cuda => {
                check_option_keys("cuda", options, CUDA_OPTIONS)?;
                if !cuda_available() {
                    return Err(InferError::delegate(
                        "CUDA execution provider requested but not available",
                    ));
                }
                log::info!("Using CUDA execution provider");
                providers.push(cuda_provider(options)?.build());
            },
            ExecutionProvider::CoreMl => {
                check_option_keys("coreml", options, COREML_OPTIONS)?;
                if !coreml_available() {
                    return Err(InferError::delegate(
                        "CoreML execution provider requested but not available",
                    ));
                }
                log::info!("Using CoreML execution provider");
                providers.push(coreml_provider(options)?.build());
            },
            ExecutionProvider::Auto => {
                let known: Vec<&str> = CUDA_OPTIONS.iter().chain(COREML_OPTIONS).copied().collect();
                check_option_keys("auto", options, &known)?;

                if cuda_available() {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda_provider(options)?.build());
                } else {
                    log::debug!("CUDA execution provider is not available");
                }

                if coreml_available() {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml_provider(options)?.build());
                } else {
                    log::debug!("CoreML execution provider is not available");
                }

                if providers.is_empty() {
                    log::warn!("No hardware delegate available, falling back to CPU");
                }
            },
        }

        Ok(providers)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session
            .as_mut()
            .ok_or_else(|| InferError::interpreter("ONNX session not loaded"))
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

fn check_option_keys(delegate: &str, options: &DelegateOptions, known: &[&str]) -> Result<()> {
    if let Some((key, _)) = options.iter().find(|(key, _)| !known.contains(key)) {
        return Err(InferError::delegate(format!(
            "unknown option '{key}' for the {delegate} delegate (supported: {})",
            known.join(", ")
        )));
    }
    Ok(())
}

fn cuda_provider(options: &DelegateOptions) -> Result<CUDAExecutionProvider> {
    let mut provider = CUDAExecutionProvider::default();
    if let Some(value) = options.get("device_id") {
        let id = value.parse::<i32>().map_err(|e| {
            InferError::delegate(format!("invalid CUDA device_id '{value}': {e}"))
        })?;
        log::debug!("CUDA device id: {id}");
        provider = provider.with_device_id(id);
    }
    Ok(provider)
}

fn coreml_provider(options: &DelegateOptions) -> Result<CoreMLExecutionProvider> {
    let subgraphs = match options.get("subgraphs") {
        Some(value) => value.parse::<bool>().map_err(|e| {
            InferError::delegate(format!("invalid CoreML subgraphs '{value}': {e}"))
        })?,
        None => true,
    };
    log::debug!("CoreML subgraphs: {subgraphs}");
    Ok(CoreMLExecutionProvider::default().with_subgraphs(subgraphs))
}

fn element_type(ty: TensorElementType) -> ElementType {
    match ty {
        TensorElementType::Float16 => ElementType::F16,
        TensorElementType::Float32 => ElementType::F32,
        TensorElementType::Uint8 => ElementType::U8,
        TensorElementType::Uint32 => ElementType::U32,
        TensorElementType::Int8 => ElementType::I8,
        TensorElementType::Int32 => ElementType::I32,
        TensorElementType::Int64 => ElementType::I64,
        other => ElementType::Other(format!("{other:?}")),
    }
}

fn tensor_info(name: &str, value_type: &ValueType) -> TensorInfo {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => {
            TensorInfo::new(name, shape.iter().copied().collect(), element_type(*ty))
        },
        other => TensorInfo::new(name, Vec::new(), ElementType::Other(format!("{other:?}"))),
    }
}

fn to_ort_value(data: &TensorData) -> Result<DynValue> {
    let shape: Vec<i64> = data.shape().iter().map(|&d| d as i64).collect();
    let value = match data.element_type() {
        ElementType::F32 => Tensor::from_array((shape, data.f32_values()?)).map(Tensor::into_dyn),
        ElementType::U8 => Tensor::from_array((shape, data.as_bytes().to_vec())).map(Tensor::into_dyn),
        ElementType::I8 => Tensor::from_array((shape, data.i8_values()?)).map(Tensor::into_dyn),
        other => return Err(InferError::UnsupportedElementType(other.to_string())),
    };
    value.map_err(|e| InferError::inference(format!("Failed to convert input tensor: {e}")))
}

fn produced_shape(shape: &[i64]) -> Result<Vec<usize>> {
    shape
        .iter()
        .map(|&d| {
            usize::try_from(d)
                .map_err(|_| InferError::shape(format!("engine produced negative extent {d}")))
        })
        .collect()
}

fn from_ort_value(info: &TensorInfo, value: &DynValue) -> Result<TensorData> {
    let extract_error =
        |e: ort::Error| InferError::inference(format!("Failed to extract output '{}': {e}", info.name));

    match info.element_type {
        ElementType::F32 => {
            let (shape, values) = value.try_extract_tensor::<f32>().map_err(extract_error)?;
            TensorData::from_f32_values(produced_shape(shape)?, values)
        },
        ElementType::U8 => {
            let (shape, values) = value.try_extract_tensor::<u8>().map_err(extract_error)?;
            TensorData::from_bytes(produced_shape(shape)?, ElementType::U8, values.to_vec())
        },
        ElementType::I8 => {
            let (shape, values) = value.try_extract_tensor::<i8>().map_err(extract_error)?;
            TensorData::from_i8_values(produced_shape(shape)?, values)
        },
        ref other => Err(InferError::UnsupportedElementType(other.to_string())),
    }
}

impl InferenceBackend for OnnxBackend {
    fn load(&mut self, config: &RunConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_path = &config.model_path;

        if !model_path.is_file() {
            return Err(InferError::model_load(model_path, "file does not exist"));
        }

        let providers =
            Self::build_execution_providers(config.execution_provider, &config.delegate_options)?;
        let provider_count = providers.len();

        let mut session_builder = Session::builder()
            .map_err(|e| InferError::interpreter(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| InferError::interpreter(format!("Failed to set optimization level: {e}")))?;

        if !providers.is_empty() {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| InferError::delegate(format!("Failed to attach delegate: {e}")))?;
        }

        if config.intra_threads > 0 {
            session_builder = session_builder
                .with_intra_threads(config.intra_threads)
                .map_err(|e| InferError::interpreter(format!("Failed to set intra threads: {e}")))?;
        }

        let session = session_builder
            .commit_from_file(model_path)
            .map_err(|e| InferError::model_load(model_path, e.to_string()))?;

        self.inputs = session
            .inputs
            .iter()
            .map(|input| tensor_info(&input.name, &input.input_type))
            .collect();
        self.outputs = session
            .outputs
            .iter()
            .map(|output| tensor_info(&output.name, &output.output_type))
            .collect();
        self.session = Some(session);

        log::debug!("ONNX Runtime session created");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!("  - Delegates attached: {provider_count}");
        log::debug!(
            "  - Tensors: {} input(s), {} output(s)",
            self.inputs.len(),
            self.outputs.len()
        );

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }

    fn input_tensors(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn output_tensors(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn invoke(&mut self, inputs: &[TensorData]) -> Result<Vec<TensorData>> {
        if inputs.len() != self.inputs.len() {
            return Err(InferError::inference(format!(
                "model takes {} input(s), got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }

        let named_inputs = self
            .inputs
            .iter()
            .zip(inputs)
            .map(|(info, data)| Ok((info.name.clone(), to_ort_value(data)?)))
            .collect::<Result<Vec<(String, DynValue)>>>()?;

        let output_infos = self.outputs.clone();
        let session = self.session_mut()?;

        let start = Instant::now();
        let outputs = session
            .run(named_inputs)
            .map_err(|e| InferError::inference(format!("ONNX inference failed: {e}")))?;
        log::debug!(
            "Core inference: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        output_infos
            .iter()
            .map(|info| {
                let value = outputs.get(info.name.as_str()).ok_or_else(|| {
                    InferError::inference(format!("Output tensor '{}' not produced", info.name))
                })?;
                from_ort_value(info, value)
            })
            .collect()
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}
